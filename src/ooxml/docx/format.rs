//! Formatting types and the property-element plumbing behind them.
//!
//! WordprocessingML requires the children of `w:rPr` and `w:pPr` to appear
//! in schema order, so properties are always inserted at their ordered
//! position rather than appended.

use bitflags::bitflags;

use crate::common::xml::XmlElement;

bitflags! {
    /// Character formatting toggles applied to a run.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
    pub struct RunFormat: u16 {
        const BOLD = 1;
        const ITALIC = 1 << 1;
        const UNDERLINE = 1 << 2;
        const STRIKETHROUGH = 1 << 3;
        const SUPERSCRIPT = 1 << 4;
        const SUBSCRIPT = 1 << 5;
        const SMALL_CAPS = 1 << 6;
        const SHADOW = 1 << 7;
    }
}

/// Paragraph alignment options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParagraphAlignment {
    Left,
    Center,
    Right,
    Justify,
}

impl ParagraphAlignment {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Center => "center",
            Self::Right => "right",
            Self::Justify => "both",
        }
    }

    /// Parse a `w:jc` value. Bidi-aware names map onto their LTR meaning.
    pub(crate) fn from_xml(value: &str) -> Option<Self> {
        match value {
            "left" | "start" => Some(Self::Left),
            "center" => Some(Self::Center),
            "right" | "end" => Some(Self::Right),
            "both" | "distribute" => Some(Self::Justify),
            _ => None,
        }
    }
}

/// Line spacing options for paragraphs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LineSpacing {
    /// Multiple of single spacing (1.0, 1.5, 2.0, ...)
    Multiple(f64),
    /// Exact spacing in points
    Exact(f64),
    /// At least this many points
    AtLeast(f64),
}

impl LineSpacing {
    /// `w:line` and `w:lineRule` values. Multiples are in 240ths of a line,
    /// fixed spacing in twentieths of a point.
    pub(crate) fn to_xml(self) -> (String, &'static str) {
        match self {
            Self::Multiple(m) => (((m * 240.0).round() as i64).to_string(), "auto"),
            Self::Exact(pt) => (((pt * 20.0).round() as i64).to_string(), "exact"),
            Self::AtLeast(pt) => (((pt * 20.0).round() as i64).to_string(), "atLeast"),
        }
    }

    pub(crate) fn from_xml(line: &str, rule: Option<&str>) -> Option<Self> {
        let value: f64 = line.parse().ok()?;
        Some(match rule.unwrap_or("auto") {
            "exact" => Self::Exact(value / 20.0),
            "atLeast" => Self::AtLeast(value / 20.0),
            _ => Self::Multiple(value / 240.0),
        })
    }
}

/// Underline styles for text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnderlineStyle {
    #[default]
    Single,
    Double,
    Thick,
    Dotted,
    Dashed,
    Wave,
}

impl UnderlineStyle {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Double => "double",
            Self::Thick => "thick",
            Self::Dotted => "dotted",
            Self::Dashed => "dash",
            Self::Wave => "wave",
        }
    }
}

/// Paragraph indentation in twentieths of a point (twips).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Indentation {
    pub left: i32,
    pub right: i32,
    /// Positive for a first-line indent, negative for a hanging indent
    pub first_line: i32,
}

const RPR_ORDER: &[&str] = &[
    "w:rStyle", "w:rFonts", "w:b", "w:bCs", "w:i", "w:iCs", "w:caps", "w:smallCaps",
    "w:strike", "w:dstrike", "w:outline", "w:shadow", "w:emboss", "w:imprint", "w:noProof",
    "w:snapToGrid", "w:vanish", "w:webHidden", "w:color", "w:spacing", "w:w", "w:kern",
    "w:position", "w:sz", "w:szCs", "w:highlight", "w:u", "w:effect", "w:bdr", "w:shd",
    "w:fitText", "w:vertAlign", "w:rtl", "w:cs", "w:em", "w:lang", "w:eastAsianLayout",
    "w:specVanish", "w:oMath",
];

const PPR_ORDER: &[&str] = &[
    "w:pStyle", "w:keepNext", "w:keepLines", "w:pageBreakBefore", "w:framePr",
    "w:widowControl", "w:numPr", "w:suppressLineNumbers", "w:pBdr", "w:shd", "w:tabs",
    "w:suppressAutoHyphens", "w:kinsoku", "w:wordWrap", "w:overflowPunct", "w:topLinePunct",
    "w:autoSpaceDE", "w:autoSpaceDN", "w:bidi", "w:adjustRightInd", "w:snapToGrid",
    "w:spacing", "w:ind", "w:contextualSpacing", "w:mirrorIndents", "w:suppressOverlap",
    "w:jc", "w:textDirection", "w:textAlignment", "w:textboxTightWrap", "w:outlineLvl",
    "w:divId", "w:cnfStyle", "w:rPr", "w:sectPr", "w:pPrChange",
];

/// Which property container an element belongs to.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Props {
    Run,
    Paragraph,
}

impl Props {
    fn order(self) -> &'static [&'static str] {
        match self {
            Props::Run => RPR_ORDER,
            Props::Paragraph => PPR_ORDER,
        }
    }
}

/// Return the child `name` of a property container, inserting it at its
/// schema position if absent. Unknown names go after every known one.
pub(crate) fn ensure_property<'e>(props: &'e mut XmlElement, kind: Props, name: &str) -> &'e mut XmlElement {
    let order = kind.order();
    let rank = |n: &str| order.iter().position(|o| *o == n).unwrap_or(order.len());
    let own = rank(name);
    let index = props
        .children()
        .iter()
        .position(|node| node.as_element().is_some_and(|e| rank(e.name()) > own))
        .unwrap_or(props.children().len());
    props.ensure_child_at(name, index)
}

/// Return the `w:rPr`/`w:pPr` container of a run or paragraph, creating it
/// as the first child when absent.
pub(crate) fn ensure_container<'e>(owner: &'e mut XmlElement, kind: Props) -> &'e mut XmlElement {
    owner.ensure_child_at(container_name(kind), 0)
}

/// Set or clear an on/off property such as `w:b`.
pub(crate) fn set_toggle(owner: &mut XmlElement, kind: Props, name: &str, on: bool) {
    if on {
        let props = ensure_container(owner, kind);
        let element = ensure_property(props, kind, name);
        element.remove_attr("w:val");
    } else if let Some(props) = owner.child_mut(container_name(kind)) {
        props.remove_children_named(name);
    }
}

pub(crate) fn container_name(kind: Props) -> &'static str {
    match kind {
        Props::Run => "w:rPr",
        Props::Paragraph => "w:pPr",
    }
}

/// True if an on/off property is present and not explicitly switched off.
pub(crate) fn toggle_is_on(props: Option<&XmlElement>, name: &str) -> bool {
    props
        .and_then(|p| p.child(name))
        .is_some_and(|e| !matches!(e.attr("w:val"), Some("0" | "false" | "off")))
}

/// Apply every flag of `format` to a run that has no formatting yet.
pub(crate) fn apply_run_format(run: &mut XmlElement, format: RunFormat) {
    const TOGGLES: &[(RunFormat, &str)] = &[
        (RunFormat::BOLD, "w:b"),
        (RunFormat::ITALIC, "w:i"),
        (RunFormat::STRIKETHROUGH, "w:strike"),
        (RunFormat::SMALL_CAPS, "w:smallCaps"),
        (RunFormat::SHADOW, "w:shadow"),
    ];
    for (flag, name) in TOGGLES {
        if format.contains(*flag) {
            set_toggle(run, Props::Run, name, true);
        }
    }
    if format.contains(RunFormat::UNDERLINE) {
        let props = ensure_container(run, Props::Run);
        ensure_property(props, Props::Run, "w:u").set_attr("w:val", UnderlineStyle::Single.as_str());
    }
    // Superscript wins when both are requested.
    let vert = if format.contains(RunFormat::SUPERSCRIPT) {
        Some("superscript")
    } else if format.contains(RunFormat::SUBSCRIPT) {
        Some("subscript")
    } else {
        None
    };
    if let Some(vert) = vert {
        let props = ensure_container(run, Props::Run);
        ensure_property(props, Props::Run, "w:vertAlign").set_attr("w:val", vert);
    }
}

/// Read the flags of a run's `w:rPr`.
pub(crate) fn read_run_format(props: Option<&XmlElement>) -> RunFormat {
    let mut format = RunFormat::empty();
    format.set(RunFormat::BOLD, toggle_is_on(props, "w:b"));
    format.set(RunFormat::ITALIC, toggle_is_on(props, "w:i"));
    format.set(RunFormat::STRIKETHROUGH, toggle_is_on(props, "w:strike"));
    format.set(RunFormat::SMALL_CAPS, toggle_is_on(props, "w:smallCaps"));
    format.set(RunFormat::SHADOW, toggle_is_on(props, "w:shadow"));
    let underline = props
        .and_then(|p| p.child("w:u"))
        .is_some_and(|u| u.attr("w:val") != Some("none"));
    format.set(RunFormat::UNDERLINE, underline);
    match props.and_then(|p| p.child("w:vertAlign")).and_then(|v| v.attr("w:val")) {
        Some("superscript") => format.insert(RunFormat::SUPERSCRIPT),
        Some("subscript") => format.insert(RunFormat::SUBSCRIPT),
        _ => {},
    }
    format
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(element: &XmlElement) -> Vec<&str> {
        element.elements().map(XmlElement::name).collect()
    }

    #[test]
    fn test_properties_keep_schema_order() {
        let mut run = XmlElement::new("w:r").with_child(XmlElement::new("w:t"));
        set_toggle(&mut run, Props::Run, "w:i", true);
        let props = ensure_container(&mut run, Props::Run);
        ensure_property(props, Props::Run, "w:sz").set_attr("w:val", "24");
        ensure_property(props, Props::Run, "w:rFonts");
        ensure_property(props, Props::Run, "w:x-unknown");
        set_toggle(&mut run, Props::Run, "w:b", true);

        assert_eq!(names(&run), ["w:rPr", "w:t"]);
        let props = run.child("w:rPr").unwrap();
        assert_eq!(names(props), ["w:rFonts", "w:b", "w:i", "w:sz", "w:x-unknown"]);
    }

    #[test]
    fn test_toggle_off_and_explicit_false() {
        let mut run = XmlElement::new("w:r");
        set_toggle(&mut run, Props::Run, "w:b", true);
        assert!(toggle_is_on(run.child("w:rPr"), "w:b"));
        set_toggle(&mut run, Props::Run, "w:b", false);
        assert!(!toggle_is_on(run.child("w:rPr"), "w:b"));

        let props = XmlElement::new("w:rPr").with_child(XmlElement::new("w:i").with_attr("w:val", "0"));
        assert!(!toggle_is_on(Some(&props), "w:i"));
    }

    #[test]
    fn test_run_format_round_trip() {
        let format = RunFormat::BOLD | RunFormat::UNDERLINE | RunFormat::SUPERSCRIPT | RunFormat::SMALL_CAPS;
        let mut run = XmlElement::new("w:r");
        apply_run_format(&mut run, format);
        assert_eq!(read_run_format(run.child("w:rPr")), format);
        assert_eq!(
            names(run.child("w:rPr").unwrap()),
            ["w:b", "w:smallCaps", "w:u", "w:vertAlign"]
        );
    }

    #[test]
    fn test_line_spacing_units() {
        assert_eq!(LineSpacing::Multiple(1.5).to_xml(), ("360".to_string(), "auto"));
        assert_eq!(LineSpacing::Exact(12.0).to_xml(), ("240".to_string(), "exact"));
        assert_eq!(LineSpacing::from_xml("480", None), Some(LineSpacing::Multiple(2.0)));
        assert_eq!(
            LineSpacing::from_xml("300", Some("atLeast")),
            Some(LineSpacing::AtLeast(15.0))
        );
        assert_eq!(ParagraphAlignment::from_xml("both"), Some(ParagraphAlignment::Justify));
        assert_eq!(ParagraphAlignment::Center.as_str(), "center");
    }
}

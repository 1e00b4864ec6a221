//! Paragraphs (`w:p`) and runs (`w:r`).
//!
//! [`Paragraph`] and [`Run`] are cheap read-only views over the parsed main
//! document. [`ParagraphMut`] and [`RunMut`] edit the element in place; the
//! owning part has already been flagged as modified when they are handed out.
use crate::common::xml::{XmlElement, XmlNode};
use crate::ooxml::docx::format::{
    self, Indentation, LineSpacing, ParagraphAlignment, Props, RunFormat, UnderlineStyle,
};

pub(crate) const PARAGRAPH: &str = "w:p";
pub(crate) const RUN: &str = "w:r";
const HYPERLINK: &str = "w:hyperlink";

/// Append the visible text of a run's content children to `out`.
pub(crate) fn collect_run_text(run: &XmlElement, out: &mut String) {
    for child in run.elements() {
        match child.name() {
            "w:t" => out.push_str(&child.text()),
            "w:tab" => out.push('\t'),
            "w:br" | "w:cr" => out.push('\n'),
            "w:noBreakHyphen" => out.push('-'),
            _ => {},
        }
    }
}

/// Runs of a paragraph in document order, including those nested in
/// hyperlinks.
fn paragraph_runs(paragraph: &XmlElement) -> impl Iterator<Item = &XmlElement> {
    paragraph.elements().flat_map(|child| {
        let direct = (child.name() == RUN).then_some(child);
        let nested = (child.name() == HYPERLINK)
            .then(|| child.children_named(RUN))
            .into_iter()
            .flatten();
        direct.into_iter().chain(nested)
    })
}

fn paragraph_text(paragraph: &XmlElement) -> String {
    let mut text = String::new();
    for run in paragraph_runs(paragraph) {
        collect_run_text(run, &mut text);
    }
    text
}

/// A paragraph in a Word document.
///
/// # Example
///
/// ```rust,no_run
/// use quince::ooxml::docx::Document;
///
/// let doc = Document::open("letter.docx")?;
/// for para in doc.paragraphs() {
///     println!("{:?}: {}", para.style(), para.text());
///     for run in para.runs() {
///         println!("  {} (bold: {})", run.text(), run.is_bold());
///     }
/// }
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Paragraph<'a> {
    element: &'a XmlElement,
}

impl<'a> Paragraph<'a> {
    pub(crate) fn new(element: &'a XmlElement) -> Self {
        Self { element }
    }

    /// The underlying `w:p` element.
    #[inline]
    pub fn element(&self) -> &'a XmlElement {
        self.element
    }

    /// Text of every run, with tabs and breaks as `\t` and `\n`.
    pub fn text(&self) -> String {
        paragraph_text(self.element)
    }

    pub fn runs(&self) -> Vec<Run<'a>> {
        paragraph_runs(self.element).map(Run::new).collect()
    }

    pub fn run_count(&self) -> usize {
        paragraph_runs(self.element).count()
    }

    /// Paragraph style id (`w:pStyle`).
    pub fn style(&self) -> Option<&'a str> {
        self.element
            .child("w:pPr")?
            .child("w:pStyle")?
            .attr("w:val")
    }

    pub fn alignment(&self) -> Option<ParagraphAlignment> {
        let value = self.element.child("w:pPr")?.child("w:jc")?.attr("w:val")?;
        ParagraphAlignment::from_xml(value)
    }

    pub fn line_spacing(&self) -> Option<LineSpacing> {
        let spacing = self.element.child("w:pPr")?.child("w:spacing")?;
        LineSpacing::from_xml(spacing.attr("w:line")?, spacing.attr("w:lineRule"))
    }

    /// Space before and after the paragraph, in twips.
    pub fn spacing(&self) -> (Option<u32>, Option<u32>) {
        let spacing = self.element.child("w:pPr").and_then(|p| p.child("w:spacing"));
        let read = |key: &str| -> Option<u32> { spacing?.attr(key)?.parse().ok() };
        (read("w:before"), read("w:after"))
    }

    pub fn indentation(&self) -> Option<Indentation> {
        let ind = self.element.child("w:pPr")?.child("w:ind")?;
        let read = |key: &str| ind.attr(key).and_then(|v| v.parse::<i32>().ok());
        Some(Indentation {
            left: read("w:left").or_else(|| read("w:start")).unwrap_or(0),
            right: read("w:right").or_else(|| read("w:end")).unwrap_or(0),
            first_line: match (read("w:firstLine"), read("w:hanging")) {
                (_, Some(hanging)) => -hanging,
                (Some(first), None) => first,
                (None, None) => 0,
            },
        })
    }
}

/// A run of uniformly formatted text.
#[derive(Debug, Clone, Copy)]
pub struct Run<'a> {
    element: &'a XmlElement,
}

impl<'a> Run<'a> {
    pub(crate) fn new(element: &'a XmlElement) -> Self {
        Self { element }
    }

    #[inline]
    pub fn element(&self) -> &'a XmlElement {
        self.element
    }

    pub fn text(&self) -> String {
        let mut text = String::new();
        collect_run_text(self.element, &mut text);
        text
    }

    fn props(&self) -> Option<&'a XmlElement> {
        self.element.child("w:rPr")
    }

    pub fn format(&self) -> RunFormat {
        format::read_run_format(self.props())
    }

    pub fn is_bold(&self) -> bool {
        format::toggle_is_on(self.props(), "w:b")
    }

    pub fn is_italic(&self) -> bool {
        format::toggle_is_on(self.props(), "w:i")
    }

    pub fn is_underline(&self) -> bool {
        self.format().contains(RunFormat::UNDERLINE)
    }

    /// Text colour as hex `RRGGBB`, or `auto`.
    pub fn color(&self) -> Option<&'a str> {
        self.props()?.child("w:color")?.attr("w:val")
    }

    /// Font size in points.
    pub fn font_size(&self) -> Option<f32> {
        let half_points: u32 = self.props()?.child("w:sz")?.attr("w:val")?.parse().ok()?;
        Some(half_points as f32 / 2.0)
    }

    pub fn font_name(&self) -> Option<&'a str> {
        let fonts = self.props()?.child("w:rFonts")?;
        fonts.attr("w:ascii").or_else(|| fonts.attr("w:hAnsi"))
    }
}

/// Editable paragraph.
#[derive(Debug)]
pub struct ParagraphMut<'a> {
    element: &'a mut XmlElement,
}

impl<'a> ParagraphMut<'a> {
    pub(crate) fn new(element: &'a mut XmlElement) -> Self {
        Self { element }
    }

    /// Read-only view of the same paragraph.
    pub fn as_paragraph(&self) -> Paragraph<'_> {
        Paragraph::new(self.element)
    }

    pub fn element_mut(&mut self) -> &mut XmlElement {
        self.element
    }

    pub fn text(&self) -> String {
        paragraph_text(self.element)
    }

    /// Number of direct runs, the ones [`run_mut`](Self::run_mut) addresses.
    pub fn run_count(&self) -> usize {
        self.element.children_named(RUN).count()
    }

    pub fn run_mut(&mut self, index: usize) -> Option<RunMut<'_>> {
        self.element.children_named_mut(RUN).nth(index).map(RunMut::new)
    }

    /// Append a run with the given text and formatting.
    pub fn add_run(&mut self, text: &str, run_format: RunFormat) -> RunMut<'_> {
        let mut run = XmlElement::new(RUN);
        format::apply_run_format(&mut run, run_format);
        write_run_text(&mut run, text);
        RunMut::new(self.element.append(run))
    }

    /// Remove the direct run at `index`.
    pub fn remove_run(&mut self, index: usize) -> bool {
        match self.element.position_of(RUN, index) {
            Some(pos) => self.element.remove(pos).is_some(),
            None => false,
        }
    }

    /// Replace every run (and hyperlink) with a single plain run.
    pub fn set_text(&mut self, text: &str) {
        self.element
            .children_mut()
            .retain(|node| !matches!(node, XmlNode::Element(e) if e.name() == RUN || e.name() == HYPERLINK));
        if !text.is_empty() {
            self.add_run(text, RunFormat::empty());
        }
    }

    fn property(&mut self, name: &str) -> &mut XmlElement {
        let props = format::ensure_container(self.element, Props::Paragraph);
        format::ensure_property(props, Props::Paragraph, name)
    }

    pub fn set_alignment(&mut self, alignment: ParagraphAlignment) {
        self.property("w:jc").set_attr("w:val", alignment.as_str());
    }

    /// Apply a paragraph style by id, e.g. `Heading1`.
    pub fn set_style(&mut self, style_id: &str) {
        self.property("w:pStyle").set_attr("w:val", style_id);
    }

    pub fn set_line_spacing(&mut self, spacing: LineSpacing) {
        let (line, rule) = spacing.to_xml();
        let element = self.property("w:spacing");
        element.set_attr("w:line", line);
        element.set_attr("w:lineRule", rule);
    }

    /// Space before the paragraph in twips.
    pub fn set_spacing_before(&mut self, twips: u32) {
        self.property("w:spacing").set_attr("w:before", twips.to_string());
    }

    /// Space after the paragraph in twips.
    pub fn set_spacing_after(&mut self, twips: u32) {
        self.property("w:spacing").set_attr("w:after", twips.to_string());
    }

    pub fn set_indent(&mut self, indent: Indentation) {
        let ind = self.property("w:ind");
        ind.set_attr("w:left", indent.left.to_string());
        ind.set_attr("w:right", indent.right.to_string());
        ind.remove_attr("w:firstLine");
        ind.remove_attr("w:hanging");
        if indent.first_line < 0 {
            ind.set_attr("w:hanging", (-indent.first_line).to_string());
        } else if indent.first_line > 0 {
            ind.set_attr("w:firstLine", indent.first_line.to_string());
        }
    }
}

/// Editable run.
#[derive(Debug)]
pub struct RunMut<'a> {
    element: &'a mut XmlElement,
}

impl<'a> RunMut<'a> {
    pub(crate) fn new(element: &'a mut XmlElement) -> Self {
        Self { element }
    }

    pub fn as_run(&self) -> Run<'_> {
        Run::new(self.element)
    }

    pub fn text(&self) -> String {
        self.as_run().text()
    }

    /// Replace the run's text, keeping its formatting.
    pub fn set_text(&mut self, text: &str) -> &mut Self {
        write_run_text(self.element, text);
        self
    }

    pub fn set_bold(&mut self, on: bool) -> &mut Self {
        format::set_toggle(self.element, Props::Run, "w:b", on);
        self
    }

    pub fn set_italic(&mut self, on: bool) -> &mut Self {
        format::set_toggle(self.element, Props::Run, "w:i", on);
        self
    }

    pub fn set_strikethrough(&mut self, on: bool) -> &mut Self {
        format::set_toggle(self.element, Props::Run, "w:strike", on);
        self
    }

    /// Underline with the given style, or remove underlining with `None`.
    pub fn set_underline(&mut self, style: Option<UnderlineStyle>) -> &mut Self {
        match style {
            Some(style) => {
                self.property("w:u").set_attr("w:val", style.as_str());
            },
            None => self.remove_property("w:u"),
        }
        self
    }

    /// Text colour as hex `RRGGBB`; a leading `#` is accepted.
    pub fn set_color(&mut self, hex: &str) -> &mut Self {
        let hex = hex.trim_start_matches('#').to_ascii_uppercase();
        self.property("w:color").set_attr("w:val", hex);
        self
    }

    /// Font size in points, stored in half-points for both scripts.
    pub fn set_font_size(&mut self, points: f32) -> &mut Self {
        let half_points = ((points * 2.0).round().max(1.0) as u32).to_string();
        self.property("w:sz").set_attr("w:val", half_points.clone());
        self.property("w:szCs").set_attr("w:val", half_points);
        self
    }

    pub fn set_font_name(&mut self, name: &str) -> &mut Self {
        let fonts = self.property("w:rFonts");
        for key in ["w:ascii", "w:hAnsi", "w:cs", "w:eastAsia"] {
            fonts.set_attr(key, name);
        }
        self
    }

    fn property(&mut self, name: &str) -> &mut XmlElement {
        let props = format::ensure_container(self.element, Props::Run);
        format::ensure_property(props, Props::Run, name)
    }

    fn remove_property(&mut self, name: &str) {
        if let Some(props) = self.element.child_mut("w:rPr") {
            props.remove_children_named(name);
        }
    }
}

/// Replace the content of a run with `text`. Tabs and line breaks become
/// `w:tab` and `w:br`.
pub(crate) fn write_run_text(run: &mut XmlElement, text: &str) {
    run.children_mut().retain(|node| match node {
        XmlNode::Element(e) => !matches!(e.name(), "w:t" | "w:tab" | "w:br" | "w:cr" | "w:noBreakHyphen"),
        _ => false,
    });

    let mut segment = String::new();
    for ch in text.chars() {
        match ch {
            '\t' | '\n' => {
                push_text(run, &mut segment);
                run.append(XmlElement::new(if ch == '\t' { "w:tab" } else { "w:br" }));
            },
            '\r' => {},
            _ => segment.push(ch),
        }
    }
    push_text(run, &mut segment);
}

fn push_text(run: &mut XmlElement, segment: &mut String) {
    if segment.is_empty() {
        return;
    }
    let mut t = XmlElement::new("w:t");
    if segment.starts_with(char::is_whitespace) || segment.ends_with(char::is_whitespace) {
        t.set_attr("xml:space", "preserve");
    }
    t.set_text(std::mem::take(segment));
    run.append(t);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::xml::XmlDocument;

    const PARA: &str = r#"<w:p xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:pPr><w:pStyle w:val="Heading1"/><w:jc w:val="center"/></w:pPr><w:r><w:rPr><w:b/><w:color w:val="FF0000"/><w:sz w:val="28"/></w:rPr><w:t>Hello</w:t></w:r><w:hyperlink r:id="rId3"><w:r><w:t xml:space="preserve"> linked</w:t></w:r></w:hyperlink><w:r><w:tab/><w:t>end</w:t><w:br/></w:r></w:p>"#;

    fn parse() -> XmlDocument {
        XmlDocument::parse(PARA.as_bytes()).unwrap()
    }

    #[test]
    fn test_read_paragraph() {
        let doc = parse();
        let para = Paragraph::new(doc.root());
        assert_eq!(para.text(), "Hello linked\tend\n");
        assert_eq!(para.run_count(), 3);
        assert_eq!(para.style(), Some("Heading1"));
        assert_eq!(para.alignment(), Some(ParagraphAlignment::Center));

        let first = para.runs()[0];
        assert!(first.is_bold());
        assert!(!first.is_italic());
        assert_eq!(first.font_size(), Some(14.0));
        assert_eq!(first.color(), Some("FF0000"));
    }

    #[test]
    fn test_add_and_remove_runs() {
        let mut doc = parse();
        let mut para = ParagraphMut::new(doc.root_mut());
        para.add_run(" tail ", RunFormat::ITALIC | RunFormat::UNDERLINE);
        assert_eq!(para.run_count(), 3);
        assert!(para.text().ends_with(" tail "));

        let added = para.as_paragraph().runs()[3];
        assert!(added.is_italic() && added.is_underline());
        let t = added.element().child("w:t").unwrap();
        assert_eq!(t.attr("xml:space"), Some("preserve"));

        assert!(para.remove_run(0));
        assert!(!para.remove_run(10));
        assert_eq!(para.text(), " linked\tend\n tail ");
    }

    #[test]
    fn test_run_edits_keep_formatting() {
        let mut doc = parse();
        let mut para = ParagraphMut::new(doc.root_mut());
        let mut run = para.run_mut(0).unwrap();
        run.set_text("Bye\tnow").set_italic(true).set_font_size(10.5).set_color("#00ff00");
        run.set_font_name("Arial").set_underline(Some(UnderlineStyle::Double));

        let view = run.as_run();
        assert_eq!(view.text(), "Bye\tnow");
        assert!(view.is_bold() && view.is_italic());
        assert_eq!(view.font_size(), Some(10.5));
        assert_eq!(view.color(), Some("00FF00"));
        assert_eq!(view.font_name(), Some("Arial"));
        let props: Vec<_> = view.element().child("w:rPr").unwrap().elements().map(XmlElement::name).collect();
        assert_eq!(props, ["w:rFonts", "w:b", "w:i", "w:color", "w:sz", "w:szCs", "w:u"]);

        run.set_bold(false).set_underline(None);
        assert!(!run.as_run().is_bold());
        assert!(!run.as_run().is_underline());
    }

    #[test]
    fn test_paragraph_properties() {
        let mut p = XmlElement::new(PARAGRAPH);
        let mut para = ParagraphMut::new(&mut p);
        para.set_indent(Indentation { left: 720, right: 0, first_line: -360 });
        para.set_line_spacing(LineSpacing::Multiple(1.5));
        para.set_spacing_after(120);
        para.set_style("Quote");
        para.set_alignment(ParagraphAlignment::Justify);
        para.set_text("body");

        let view = para.as_paragraph();
        assert_eq!(view.text(), "body");
        assert_eq!(view.style(), Some("Quote"));
        assert_eq!(view.alignment(), Some(ParagraphAlignment::Justify));
        assert_eq!(view.line_spacing(), Some(LineSpacing::Multiple(1.5)));
        assert_eq!(view.spacing(), (None, Some(120)));
        assert_eq!(
            view.indentation(),
            Some(Indentation { left: 720, right: 0, first_line: -360 })
        );
        let order: Vec<_> = p.child("w:pPr").unwrap().elements().map(XmlElement::name).collect();
        assert_eq!(order, ["w:pStyle", "w:spacing", "w:ind", "w:jc"]);
    }
}

use std::borrow::Cow;

use aho_corasick::AhoCorasick;
use once_cell::sync::Lazy;

// Character data only needs the markup-significant characters replaced.
static TEXT_ESCAPER: Lazy<AhoCorasick> = Lazy::new(|| {
    AhoCorasick::builder()
        .build(["&", "<", ">"])
        .expect("Failed to build XML text escaper")
});

// Attribute values are always written with double quotes. Whitespace control
// characters are written as references so attribute normalization on re-read
// gives back the same value.
static ATTR_ESCAPER: Lazy<AhoCorasick> = Lazy::new(|| {
    AhoCorasick::builder()
        .build(["&", "<", ">", "\"", "\t", "\n", "\r"])
        .expect("Failed to build XML attribute escaper")
});

/// Escape character data for use between tags.
///
/// # Examples
///
/// ```
/// use quince::common::xml::escape_text;
/// assert_eq!(escape_text("a & b"), "a &amp; b");
/// assert_eq!(escape_text("\"quoted\" <tag>"), "\"quoted\" &lt;tag&gt;");
/// ```
#[inline]
pub fn escape_text(s: &str) -> Cow<'_, str> {
    if !s.bytes().any(|b| matches!(b, b'&' | b'<' | b'>')) {
        return Cow::Borrowed(s);
    }
    Cow::Owned(TEXT_ESCAPER.replace_all(s, &["&amp;", "&lt;", "&gt;"]))
}

/// Escape a value for use inside a double-quoted attribute.
///
/// # Examples
///
/// ```
/// use quince::common::xml::escape_attr;
/// assert_eq!(escape_attr("say \"hi\""), "say &quot;hi&quot;");
/// assert_eq!(escape_attr("a\tb"), "a&#9;b");
/// ```
#[inline]
pub fn escape_attr(s: &str) -> Cow<'_, str> {
    if !s
        .bytes()
        .any(|b| matches!(b, b'&' | b'<' | b'>' | b'"' | b'\t' | b'\n' | b'\r'))
    {
        return Cow::Borrowed(s);
    }
    Cow::Owned(ATTR_ESCAPER.replace_all(
        s,
        &["&amp;", "&lt;", "&gt;", "&quot;", "&#9;", "&#10;", "&#13;"],
    ))
}

/// Resolve the name of an entity or character reference (the part between
/// `&` and `;`) to the character it stands for.
///
/// Handles the five predefined entities and decimal/hexadecimal character
/// references. Returns `None` for anything else.
pub fn resolve_reference(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let digits = name.strip_prefix('#')?;
            let code = match digits.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => digits.parse::<u32>().ok()?,
            };
            char::from_u32(code)
        },
    }
}

/// Unescape entity and character references.
///
/// Unknown or malformed references are left unchanged.
///
/// # Examples
///
/// ```
/// use quince::common::xml::unescape_xml;
/// assert_eq!(unescape_xml("&lt;a &amp; b&gt;"), "<a & b>");
/// assert_eq!(unescape_xml("&#65;&#x42;"), "AB");
/// assert_eq!(unescape_xml("&amp;lt;"), "&lt;");
/// assert_eq!(unescape_xml("&invalid;"), "&invalid;");
/// assert_eq!(unescape_xml("&amp"), "&amp");
/// ```
pub fn unescape_xml(s: &str) -> Cow<'_, str> {
    let Some(first) = memchr::memchr(b'&', s.as_bytes()) else {
        return Cow::Borrowed(s);
    };

    let mut out = String::with_capacity(s.len());
    out.push_str(&s[..first]);
    let mut rest = &s[first..];

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp + 1..];
        match tail.find(';').and_then(|semi| {
            resolve_reference(&tail[..semi]).map(|c| (c, semi))
        }) {
            Some((c, semi)) => {
                out.push(c);
                rest = &tail[semi + 1..];
            },
            None => {
                out.push('&');
                rest = tail;
            },
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_text_borrows_when_clean() {
        assert!(matches!(escape_text("plain"), Cow::Borrowed(_)));
        assert_eq!(escape_text("1 < 2 && 3 > 2"), "1 &lt; 2 &amp;&amp; 3 &gt; 2");
    }

    #[test]
    fn test_escape_attr_whitespace() {
        assert_eq!(escape_attr("line\r\nnext"), "line&#13;&#10;next");
    }

    #[test]
    fn test_resolve_reference() {
        assert_eq!(resolve_reference("amp"), Some('&'));
        assert_eq!(resolve_reference("#x263A"), Some('\u{263A}'));
        assert_eq!(resolve_reference("#160"), Some('\u{a0}'));
        assert_eq!(resolve_reference("#xD800"), None);
        assert_eq!(resolve_reference("nbsp"), None);
    }

    #[test]
    fn test_unescape_mixed() {
        assert_eq!(unescape_xml("a &quot;b&quot; &#x26; c"), "a \"b\" & c");
        assert_eq!(unescape_xml("trailing &"), "trailing &");
        assert_eq!(unescape_xml("&&amp;"), "&&");
    }
}

//! Owned, mutable XML tree used for every parsed package part.
//!
//! Parsing is driven by `quick-xml` events and keeps everything needed to
//! write the part back: the declaration, comments and processing
//! instructions around the root, CDATA sections and whitespace-only text.
//! Attribute order is preserved.

use std::borrow::Cow;
use std::fmt;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use super::escape::{escape_attr, escape_text, resolve_reference, unescape_xml};

/// Errors produced while parsing XML.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum XmlError {
    #[error("malformed XML: {0}")]
    Syntax(String),

    #[error("XML is not valid UTF-8")]
    Encoding,

    #[error("document has no root element")]
    NoRoot,

    #[error("document has more than one root element")]
    MultipleRoots,

    #[error("character data outside the root element")]
    TextOutsideRoot,

    #[error("element <{0}> is never closed")]
    Unclosed(String),
}

pub type Result<T> = std::result::Result<T, XmlError>;

/// The `<?xml ...?>` declaration of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlDeclaration {
    pub version: String,
    pub encoding: Option<String>,
    pub standalone: Option<String>,
}

impl Default for XmlDeclaration {
    /// The declaration Word writes on every part.
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            encoding: Some("UTF-8".to_string()),
            standalone: Some("yes".to_string()),
        }
    }
}

/// A node in the element tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
    CData(String),
    Comment(String),
    ProcessingInstruction { target: String, content: String },
}

impl XmlNode {
    #[inline]
    pub fn as_element(&self) -> Option<&XmlElement> {
        match self {
            XmlNode::Element(e) => Some(e),
            _ => None,
        }
    }

    #[inline]
    pub fn as_element_mut(&mut self) -> Option<&mut XmlElement> {
        match self {
            XmlNode::Element(e) => Some(e),
            _ => None,
        }
    }

    #[inline]
    fn is_element_named(&self, name: &str) -> bool {
        matches!(self, XmlNode::Element(e) if e.name == name)
    }
}

/// An element with its qualified name, ordered attributes and children.
///
/// Names are compared as written (`w:p`, not the expanded namespace form).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct XmlElement {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<XmlNode>,
}

impl XmlElement {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Builder form of [`set_attr`](Self::set_attr).
    pub fn with_attr<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.set_attr(key, value);
        self
    }

    /// Builder form of [`append`](Self::append).
    pub fn with_child(mut self, child: XmlElement) -> Self {
        self.children.push(XmlNode::Element(child));
        self
    }

    /// Builder form of [`set_text`](Self::set_text).
    pub fn with_text<S: Into<String>>(mut self, text: S) -> Self {
        self.set_text(text);
        self
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name without its namespace prefix.
    pub fn local_name(&self) -> &str {
        match self.name.split_once(':') {
            Some((_, local)) => local,
            None => &self.name,
        }
    }

    #[inline]
    pub fn attributes(&self) -> &[(String, String)] {
        &self.attributes
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Set an attribute, replacing the value in place if it already exists.
    pub fn set_attr<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) {
        let key = key.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((key, value)),
        }
    }

    pub fn remove_attr(&mut self, key: &str) -> Option<String> {
        let pos = self.attributes.iter().position(|(k, _)| k == key)?;
        Some(self.attributes.remove(pos).1)
    }

    #[inline]
    pub fn children(&self) -> &[XmlNode] {
        &self.children
    }

    #[inline]
    pub fn children_mut(&mut self) -> &mut Vec<XmlNode> {
        &mut self.children
    }

    /// Child elements, skipping text and other node types.
    pub fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(XmlNode::as_element)
    }

    pub fn elements_mut(&mut self) -> impl Iterator<Item = &mut XmlElement> {
        self.children.iter_mut().filter_map(XmlNode::as_element_mut)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.elements().filter(move |e| e.name == name)
    }

    pub fn children_named_mut<'a>(
        &'a mut self,
        name: &'a str,
    ) -> impl Iterator<Item = &'a mut XmlElement> {
        self.elements_mut().filter(move |e| e.name == name)
    }

    /// First child element with the given name.
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.elements().find(|e| e.name == name)
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut XmlElement> {
        self.elements_mut().find(|e| e.name == name)
    }

    /// Position in `children()` of the `n`th child element named `name`.
    pub fn position_of(&self, name: &str, n: usize) -> Option<usize> {
        self.children
            .iter()
            .enumerate()
            .filter(|(_, node)| node.is_element_named(name))
            .nth(n)
            .map(|(i, _)| i)
    }

    /// Return the first child named `name`, appending an empty one if absent.
    pub fn ensure_child(&mut self, name: &str) -> &mut XmlElement {
        let idx = match self.children.iter().position(|n| n.is_element_named(name)) {
            Some(idx) => idx,
            None => {
                self.children.push(XmlNode::Element(XmlElement::new(name)));
                self.children.len() - 1
            },
        };
        self.element_at(idx)
    }

    /// Return the first child named `name`, inserting an empty one at `index`
    /// if absent.
    pub fn ensure_child_at(&mut self, name: &str, index: usize) -> &mut XmlElement {
        let idx = match self.children.iter().position(|n| n.is_element_named(name)) {
            Some(idx) => idx,
            None => {
                let index = index.min(self.children.len());
                self.children
                    .insert(index, XmlNode::Element(XmlElement::new(name)));
                index
            },
        };
        self.element_at(idx)
    }

    fn element_at(&mut self, idx: usize) -> &mut XmlElement {
        match &mut self.children[idx] {
            XmlNode::Element(e) => e,
            _ => unreachable!("index was taken from an element node"),
        }
    }

    /// Append a child element and return it for further building.
    pub fn append(&mut self, child: XmlElement) -> &mut XmlElement {
        self.children.push(XmlNode::Element(child));
        let idx = self.children.len() - 1;
        self.element_at(idx)
    }

    /// Insert a child element at `index` in `children()` (clamped to the end).
    pub fn insert(&mut self, index: usize, child: XmlElement) -> &mut XmlElement {
        let index = index.min(self.children.len());
        self.children.insert(index, XmlNode::Element(child));
        self.element_at(index)
    }

    pub fn remove(&mut self, index: usize) -> Option<XmlNode> {
        (index < self.children.len()).then(|| self.children.remove(index))
    }

    /// Remove every child element named `name`; returns how many went.
    pub fn remove_children_named(&mut self, name: &str) -> usize {
        let before = self.children.len();
        self.children.retain(|n| !n.is_element_named(name));
        before - self.children.len()
    }

    /// Concatenated character data of this element and its descendants.
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        for child in &self.children {
            match child {
                XmlNode::Text(t) | XmlNode::CData(t) => out.push_str(t),
                XmlNode::Element(e) => e.collect_text(out),
                _ => {},
            }
        }
    }

    /// Replace all children with a single text node.
    pub fn set_text<S: Into<String>>(&mut self, text: S) {
        self.children.clear();
        let text = text.into();
        if !text.is_empty() {
            self.children.push(XmlNode::Text(text));
        }
    }

    fn write_to(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for (key, value) in &self.attributes {
            out.push(' ');
            out.push_str(key);
            out.push_str("=\"");
            out.push_str(&escape_attr(value));
            out.push('"');
        }
        if self.children.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        for child in &self.children {
            write_node(child, out);
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }
}

fn write_node(node: &XmlNode, out: &mut String) {
    match node {
        XmlNode::Element(e) => e.write_to(out),
        XmlNode::Text(t) => out.push_str(&escape_text(t)),
        XmlNode::CData(t) => {
            out.push_str("<![CDATA[");
            out.push_str(t);
            out.push_str("]]>");
        },
        XmlNode::Comment(t) => {
            out.push_str("<!--");
            out.push_str(t);
            out.push_str("-->");
        },
        XmlNode::ProcessingInstruction { target, content } => {
            out.push_str("<?");
            out.push_str(target);
            if !content.is_empty() {
                out.push(' ');
                out.push_str(content);
            }
            out.push_str("?>");
        },
    }
}

/// A parsed XML document with exactly one root element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlDocument {
    declaration: Option<XmlDeclaration>,
    doctype: Option<String>,
    prolog: Vec<XmlNode>,
    root: XmlElement,
    epilog: Vec<XmlNode>,
}

impl XmlDocument {
    /// Create a document around `root` with the standard declaration.
    pub fn new(root: XmlElement) -> Self {
        Self {
            declaration: Some(XmlDeclaration::default()),
            doctype: None,
            prolog: Vec::new(),
            root,
            epilog: Vec::new(),
        }
    }

    /// Parse a document from raw bytes.
    ///
    /// The input must be UTF-8 with a single root element. Whitespace between
    /// top-level nodes is dropped, everything else is kept.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
        let mut reader = Reader::from_reader(bytes);
        reader.config_mut().trim_text(false);

        let mut declaration = None;
        let mut doctype = None;
        let mut prolog = Vec::new();
        let mut epilog = Vec::new();
        let mut root: Option<XmlElement> = None;
        let mut stack: Vec<XmlElement> = Vec::new();
        let mut buf = Vec::new();

        loop {
            let event = reader
                .read_event_into(&mut buf)
                .map_err(|e| XmlError::Syntax(e.to_string()))?;
            match event {
                Event::Start(e) => stack.push(element_from_start(&e)?),
                Event::Empty(e) => {
                    let element = element_from_start(&e)?;
                    attach_element(element, &mut stack, &mut root)?;
                },
                Event::End(_) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| XmlError::Syntax("unexpected end tag".to_string()))?;
                    attach_element(element, &mut stack, &mut root)?;
                },
                Event::Text(e) => {
                    let raw = utf8(e.as_ref())?;
                    match stack.last_mut() {
                        Some(parent) => push_text(parent, &unescape_xml(raw)),
                        None if raw.trim().is_empty() => {},
                        None => return Err(XmlError::TextOutsideRoot),
                    }
                },
                Event::GeneralRef(e) => {
                    let name = utf8(e.as_ref())?;
                    let parent = stack.last_mut().ok_or(XmlError::TextOutsideRoot)?;
                    match resolve_reference(name) {
                        Some(c) => push_text(parent, c.encode_utf8(&mut [0u8; 4])),
                        // Unknown entities are kept literally.
                        None => push_text(parent, &format!("&{name};")),
                    }
                },
                Event::CData(e) => {
                    let text = utf8(e.as_ref())?.to_string();
                    let parent = stack.last_mut().ok_or(XmlError::TextOutsideRoot)?;
                    parent.children.push(XmlNode::CData(text));
                },
                Event::Comment(e) => {
                    let node = XmlNode::Comment(utf8(e.as_ref())?.to_string());
                    attach_misc(node, &mut stack, &root, &mut prolog, &mut epilog);
                },
                Event::PI(e) => {
                    let node = XmlNode::ProcessingInstruction {
                        target: utf8(e.target())?.to_string(),
                        content: utf8(e.content())?.trim_start().to_string(),
                    };
                    attach_misc(node, &mut stack, &root, &mut prolog, &mut epilog);
                },
                Event::Decl(e) => {
                    let version = e
                        .version()
                        .map_err(|err| XmlError::Syntax(err.to_string()))?;
                    declaration = Some(XmlDeclaration {
                        version: lossy(version),
                        encoding: optional_decl_value(e.encoding()),
                        standalone: optional_decl_value(e.standalone()),
                    });
                },
                Event::DocType(e) => {
                    doctype = Some(utf8(e.as_ref())?.trim().to_string());
                },
                Event::Eof => break,
            }
            buf.clear();
        }

        if let Some(open) = stack.last() {
            return Err(XmlError::Unclosed(open.name.clone()));
        }
        let root = root.ok_or(XmlError::NoRoot)?;

        Ok(Self {
            declaration,
            doctype,
            prolog,
            root,
            epilog,
        })
    }

    #[inline]
    pub fn root(&self) -> &XmlElement {
        &self.root
    }

    #[inline]
    pub fn root_mut(&mut self) -> &mut XmlElement {
        &mut self.root
    }

    #[inline]
    pub fn declaration(&self) -> Option<&XmlDeclaration> {
        self.declaration.as_ref()
    }

    pub fn set_declaration(&mut self, declaration: Option<XmlDeclaration>) {
        self.declaration = declaration;
    }

    /// Serialize to a string.
    pub fn to_xml_string(&self) -> String {
        let mut out = String::with_capacity(256);
        if let Some(decl) = &self.declaration {
            out.push_str("<?xml version=\"");
            out.push_str(&escape_attr(&decl.version));
            out.push('"');
            if let Some(encoding) = &decl.encoding {
                out.push_str(" encoding=\"");
                out.push_str(&escape_attr(encoding));
                out.push('"');
            }
            if let Some(standalone) = &decl.standalone {
                out.push_str(" standalone=\"");
                out.push_str(&escape_attr(standalone));
                out.push('"');
            }
            out.push_str("?>\r\n");
        }
        if let Some(doctype) = &self.doctype {
            out.push_str("<!DOCTYPE ");
            out.push_str(doctype);
            out.push('>');
        }
        for node in &self.prolog {
            write_node(node, &mut out);
        }
        self.root.write_to(&mut out);
        for node in &self.epilog {
            write_node(node, &mut out);
        }
        out
    }

    #[inline]
    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_xml_string().into_bytes()
    }
}

impl fmt::Display for XmlDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_xml_string())
    }
}

#[inline]
fn utf8(bytes: &[u8]) -> Result<&str> {
    std::str::from_utf8(bytes).map_err(|_| XmlError::Encoding)
}

#[inline]
fn lossy(bytes: Cow<'_, [u8]>) -> String {
    String::from_utf8_lossy(&bytes).into_owned()
}

fn optional_decl_value<E>(value: Option<std::result::Result<Cow<'_, [u8]>, E>>) -> Option<String> {
    match value {
        Some(Ok(v)) => Some(lossy(v)),
        _ => None,
    }
}

fn element_from_start(start: &BytesStart<'_>) -> Result<XmlElement> {
    let mut element = XmlElement::new(utf8(start.name().as_ref())?);
    for attr in start.attributes() {
        let attr = attr.map_err(|e| XmlError::Syntax(e.to_string()))?;
        let key = utf8(attr.key.as_ref())?;
        let value = unescape_xml(utf8(&attr.value)?).into_owned();
        element.attributes.push((key.to_string(), value));
    }
    Ok(element)
}

fn attach_element(
    element: XmlElement,
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(XmlNode::Element(element));
            Ok(())
        },
        None if root.is_some() => Err(XmlError::MultipleRoots),
        None => {
            *root = Some(element);
            Ok(())
        },
    }
}

fn attach_misc(
    node: XmlNode,
    stack: &mut [XmlElement],
    root: &Option<XmlElement>,
    prolog: &mut Vec<XmlNode>,
    epilog: &mut Vec<XmlNode>,
) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None if root.is_some() => epilog.push(node),
        None => prolog.push(node),
    }
}

// Entity references arrive as separate events; fold them into the
// surrounding text so each run of character data stays one node.
fn push_text(parent: &mut XmlElement, text: &str) {
    if let Some(XmlNode::Text(last)) = parent.children.last_mut() {
        last.push_str(text);
    } else {
        parent.children.push(XmlNode::Text(text.to_string()));
    }
}

//! XML helpers shared by every package part.

pub mod dom;
pub mod escape;

pub use dom::{XmlDeclaration, XmlDocument, XmlElement, XmlError, XmlNode};
pub use escape::{escape_attr, escape_text, resolve_reference, unescape_xml};

/// Error types for document-level operations.
use thiserror::Error;

use crate::common::xml::XmlError;

/// Result type for document-level operations.
pub type Result<T> = std::result::Result<T, OoxmlError>;

/// Error types for document-level operations.
#[derive(Error, Debug)]
pub enum OoxmlError {
    /// OPC package error
    #[error("OPC error: {0}")]
    Opc(#[from] crate::ooxml::opc::error::OpcError),

    /// XML parsing error
    #[error("XML error: {0}")]
    Xml(String),

    /// Part not found
    #[error("Part not found: {0}")]
    PartNotFound(String),

    /// Index past the end of a collection
    #[error("No {kind} at index {index}")]
    OutOfRange { kind: &'static str, index: usize },

    /// Invalid format
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<XmlError> for OoxmlError {
    fn from(err: XmlError) -> Self {
        OoxmlError::Xml(err.to_string())
    }
}

impl From<quick_xml::Error> for OoxmlError {
    fn from(err: quick_xml::Error) -> Self {
        OoxmlError::Xml(err.to_string())
    }
}

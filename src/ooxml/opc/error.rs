/// Error types for OPC package operations
use thiserror::Error;

use crate::common::xml::XmlError;

#[derive(Error, Debug)]
pub enum OpcError {
    #[error("Package not found: {0}")]
    PackageNotFound(String),

    #[error("Package is not open")]
    NotOpen,

    #[error("No target path: the package was never opened from or saved to a file")]
    NoTargetPath,

    #[error("Main document part is missing or unreadable: {0}")]
    MissingMainDocument(String),

    #[error("Invalid pack URI: {0}")]
    InvalidPackUri(String),

    #[error("Part not found: {0}")]
    PartNotFound(String),

    #[error("Media not found: {0}")]
    MediaNotFound(String),

    #[error("Unsupported media file: {0}")]
    UnsupportedMedia(String),

    #[error("Media file '{name}' is {size} bytes, above the {limit}-byte limit")]
    MediaTooLarge { name: String, size: u64, limit: u64 },

    #[error("Path conflict: {0}")]
    PathConflict(String),

    #[error("XML error: {0}")]
    Xml(#[from] XmlError),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<tempfile::PersistError> for OpcError {
    fn from(err: tempfile::PersistError) -> Self {
        OpcError::Io(err.error)
    }
}

pub type Result<T> = std::result::Result<T, OpcError>;

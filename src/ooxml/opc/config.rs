//! Package options.

use serde::{Deserialize, Serialize};

/// Compression method for entries written on save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Compression {
    #[default]
    Deflated,
    Stored,
}

impl Compression {
    pub(crate) fn method(self) -> zip::CompressionMethod {
        match self {
            Compression::Deflated => zip::CompressionMethod::Deflated,
            Compression::Stored => zip::CompressionMethod::Stored,
        }
    }
}

/// Options controlling how packages are opened, created and saved.
///
/// # Examples
///
/// ```rust
/// use quince::ooxml::opc::{Compression, PackageOptions};
///
/// let options = PackageOptions::new()
///     .with_compression(Compression::Stored)
///     .with_author("Build bot")
///     .with_require_main_document(true);
/// assert_eq!(options.media_dir, "word/media");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackageOptions {
    /// Compression for every entry written on save
    pub compression: Compression,
    /// Compression level; `None` uses the method's default
    pub compression_level: Option<i64>,
    /// Directory holding embedded media, relative to the package root
    pub media_dir: String,
    /// Written to `docProps/app.xml` when a new package is created
    pub application_name: String,
    /// Creator recorded in `docProps/core.xml` when a new package is created
    pub author: String,
    /// Fail `open` when the main document part is missing or unreadable
    pub require_main_document: bool,
    /// Largest media file accepted, in bytes; `None` accepts any size
    pub max_media_size: Option<u64>,
}

impl Default for PackageOptions {
    fn default() -> Self {
        Self {
            compression: Compression::Deflated,
            compression_level: None,
            media_dir: "word/media".to_string(),
            application_name: "quince".to_string(),
            author: String::new(),
            require_main_document: false,
            max_media_size: None,
        }
    }
}

impl PackageOptions {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    #[inline]
    pub fn with_compression_level(mut self, level: Option<i64>) -> Self {
        self.compression_level = level;
        self
    }

    /// Set the media directory. Leading and trailing slashes are ignored.
    #[inline]
    pub fn with_media_dir<S: Into<String>>(mut self, dir: S) -> Self {
        self.media_dir = dir.into().trim_matches('/').to_string();
        self
    }

    #[inline]
    pub fn with_application_name<S: Into<String>>(mut self, name: S) -> Self {
        self.application_name = name.into();
        self
    }

    #[inline]
    pub fn with_author<S: Into<String>>(mut self, author: S) -> Self {
        self.author = author.into();
        self
    }

    #[inline]
    pub fn with_require_main_document(mut self, require: bool) -> Self {
        self.require_main_document = require;
        self
    }

    #[inline]
    pub fn with_max_media_size(mut self, limit: Option<u64>) -> Self {
        self.max_media_size = limit;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let options = PackageOptions::new()
            .with_media_dir("/word/images/")
            .with_compression_level(Some(9))
            .with_max_media_size(Some(1 << 20));
        assert_eq!(options.media_dir, "word/images");
        assert_eq!(options.max_media_size, Some(1 << 20));
        assert_eq!(options.compression_level, Some(9));
        assert_eq!(options.compression.method(), zip::CompressionMethod::Deflated);
    }
}

//! Embedded media: images stored under the package media directory.
//!
//! Media are addressed by their file name inside the media directory
//! (`image1.png` for `word/media/image1.png`).

use std::path::Path;

use phf::phf_map;
use tracing::debug;

use crate::ooxml::opc::constants::{content_type as ct, relationship_type};
use crate::ooxml::opc::error::{OpcError, Result};
use crate::ooxml::opc::package::OpcPackage;
use crate::ooxml::opc::packuri::PackURI;
use crate::ooxml::opc::rel::TargetMode;
use crate::ooxml::opc::tree::NodeKind;

/// Image formats accepted as media, by lower-case extension.
static MEDIA_TYPES: phf::Map<&'static str, &'static str> = phf_map! {
    "png" => ct::PNG,
    "jpg" => ct::JPEG,
    "jpeg" => ct::JPEG,
    "gif" => ct::GIF,
    "bmp" => ct::BMP,
    "tif" => ct::TIFF,
    "tiff" => ct::TIFF,
    "webp" => ct::WEBP,
    "svg" => ct::SVG,
    "emf" => ct::X_EMF,
    "wmf" => ct::X_WMF,
};

fn extension(name: &str) -> Option<String> {
    let file = name.rsplit('/').next().unwrap_or(name);
    let (_, ext) = file.rsplit_once('.')?;
    Some(ext.to_ascii_lowercase())
}

/// Content type of a media file from its extension, or
/// `application/octet-stream` for anything unrecognised.
pub fn content_type_for_name(name: &str) -> &'static str {
    extension(name)
        .and_then(|ext| MEDIA_TYPES.get(ext.as_str()).copied())
        .unwrap_or(ct::OCTET_STREAM)
}

/// True if `name` has one of the supported image extensions.
pub fn is_supported_media(name: &str) -> bool {
    extension(name).is_some_and(|ext| MEDIA_TYPES.contains_key(ext.as_str()))
}

/// Reject media above the configured size limit.
fn check_media_size(name: &str, size: u64, limit: Option<u64>) -> Result<()> {
    match limit {
        Some(limit) if size > limit => Err(OpcError::MediaTooLarge {
            name: name.to_string(),
            size,
            limit,
        }),
        _ => Ok(()),
    }
}

/// Split `name.ext` into (`name`, `.ext`); the extension part may be empty.
fn split_name(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(pos) if pos > 0 => name.split_at(pos),
        _ => (name, ""),
    }
}

impl OpcPackage {
    fn media_path(&self, name: &str) -> String {
        format!("{}{}", self.tree().media_prefix(), name.trim_start_matches('/'))
    }

    /// First free name among `name`, `stem_1.ext`, `stem_2.ext`, ...
    fn unique_media_name(&self, name: &str) -> String {
        if !self.has_part(&self.media_path(name)) {
            return name.to_string();
        }
        let (stem, ext) = split_name(name);
        let mut counter = 1usize;
        loop {
            let candidate = format!("{stem}_{counter}{ext}");
            if !self.has_part(&self.media_path(&candidate)) {
                debug!(requested = name, stored = %candidate, "media name taken, disambiguated");
                return candidate;
            }
            counter += 1;
        }
    }

    /// Store image bytes under the media directory.
    ///
    /// Returns the name the image was stored under, which differs from
    /// `name` when a part of that name already exists.
    ///
    /// # Arguments
    /// * `bytes` - Image data; must not be empty or larger than
    ///   [`PackageOptions::max_media_size`](crate::ooxml::opc::PackageOptions::max_media_size)
    /// * `name` - File name such as `logo.png`; the extension selects the
    ///   content type and must be a supported image format
    pub fn add_media(&mut self, bytes: Vec<u8>, name: &str) -> Result<String> {
        if !self.is_open() {
            return Err(OpcError::NotOpen);
        }
        let name = name.rsplit('/').next().unwrap_or(name);
        if name.is_empty() || !is_supported_media(name) {
            return Err(OpcError::UnsupportedMedia(name.to_string()));
        }
        if bytes.is_empty() {
            return Err(OpcError::UnsupportedMedia(format!("'{name}' is empty")));
        }
        check_media_size(name, bytes.len() as u64, self.options().max_media_size)?;

        let stored = self.unique_media_name(name);
        let path = self.media_path(&stored);
        self.put_part(&path, bytes, Some(content_type_for_name(&stored)))?;
        Ok(stored)
    }

    /// Read an image file and store it as media. `name` defaults to the
    /// file name of `path`.
    pub fn add_media_file<P: AsRef<Path>>(&mut self, path: P, name: Option<&str>) -> Result<String> {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| OpcError::UnsupportedMedia(path.display().to_string()))?;
        if !is_supported_media(file_name) {
            return Err(OpcError::UnsupportedMedia(file_name.to_string()));
        }
        // Checked before reading so an oversized file is never loaded.
        check_media_size(file_name, std::fs::metadata(path)?.len(), self.options().max_media_size)?;
        let bytes = std::fs::read(path)?;
        self.add_media(bytes, name.filter(|n| !n.is_empty()).unwrap_or(file_name))
    }

    /// Store media and relate it to the main document as an image.
    ///
    /// Returns the stored media name and the new relationship id.
    pub fn add_media_with_relationship(&mut self, bytes: Vec<u8>, name: &str) -> Result<(String, String)> {
        let main = self
            .main_document_path()
            .ok_or_else(|| OpcError::PartNotFound("main document".to_string()))?;
        let stored = self.add_media(bytes, name)?;

        let main_uri = PackURI::from_membername(&main);
        let target = PackURI::from_membername(&self.media_path(&stored)).relative_ref(main_uri.base_uri());
        let id = self.add_relationship(
            &OpcPackage::rels_path_for(&main),
            relationship_type::IMAGE,
            &target,
            TargetMode::Internal,
        )?;
        Ok((stored, id))
    }

    /// Remove a media file and every relationship pointing at it.
    pub fn delete_media(&mut self, name: &str) -> bool {
        let path = self.media_path(name);
        self.has_media(name) && self.remove_part(&path)
    }

    /// Replace the bytes of an existing media file, keeping its name.
    pub fn replace_media(&mut self, name: &str, bytes: Vec<u8>) -> Result<()> {
        if !self.has_media(name) {
            return Err(OpcError::MediaNotFound(name.to_string()));
        }
        if bytes.is_empty() {
            return Err(OpcError::UnsupportedMedia(format!("'{name}' is empty")));
        }
        check_media_size(name, bytes.len() as u64, self.options().max_media_size)?;
        let path = self.media_path(name);
        self.put_part(&path, bytes, None)
    }

    pub fn replace_media_file<P: AsRef<Path>>(&mut self, name: &str, path: P) -> Result<()> {
        if !self.has_media(name) {
            return Err(OpcError::MediaNotFound(name.to_string()));
        }
        let bytes = std::fs::read(path)?;
        self.replace_media(name, bytes)
    }

    pub fn has_media(&self, name: &str) -> bool {
        self.part(&self.media_path(name))
            .is_some_and(|node| node.kind() == NodeKind::MediaPart)
    }

    /// Names of every live media file.
    pub fn list_media(&self) -> Vec<String> {
        let prefix = self.tree().media_prefix();
        let mut names = Vec::new();
        if !self.is_open() {
            return names;
        }
        self.tree().iterate_files(|_, node| {
            if node.kind() == NodeKind::MediaPart
                && let Some(name) = node.full_path().strip_prefix(prefix)
            {
                names.push(name.to_string());
            }
        });
        names
    }

    pub fn media_count(&self) -> usize {
        self.list_media().len()
    }

    pub fn media_bytes(&self, name: &str) -> Option<&[u8]> {
        let node = self.part(&self.media_path(name))?;
        if node.kind() != NodeKind::MediaPart {
            return None;
        }
        node.bytes()
    }

    /// Write a media file out to `destination`.
    pub fn export_media<P: AsRef<Path>>(&self, name: &str, destination: P) -> Result<()> {
        let bytes = self
            .media_bytes(name)
            .ok_or_else(|| OpcError::MediaNotFound(name.to_string()))?;
        std::fs::write(destination, bytes)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ooxml::opc::config::PackageOptions;

    fn package() -> OpcPackage {
        let mut pkg = OpcPackage::new();
        pkg.create_empty(None::<&Path>).unwrap();
        pkg
    }

    #[test]
    fn test_content_type_lookup() {
        assert_eq!(content_type_for_name("word/media/a.PNG"), ct::PNG);
        assert_eq!(content_type_for_name("photo.jpeg"), ct::JPEG);
        assert_eq!(content_type_for_name("drawing.emf"), ct::X_EMF);
        assert_eq!(content_type_for_name("notes.txt"), ct::OCTET_STREAM);
        assert_eq!(content_type_for_name("noext"), ct::OCTET_STREAM);
        assert!(is_supported_media("x.TIF"));
        assert!(!is_supported_media("x.pdf"));
    }

    #[test]
    fn test_add_disambiguates_names() {
        let mut pkg = package();
        assert_eq!(pkg.add_media(vec![1], "logo.png").unwrap(), "logo.png");
        assert_eq!(pkg.add_media(vec![2], "logo.png").unwrap(), "logo_1.png");
        assert_eq!(pkg.add_media(vec![3], "logo.png").unwrap(), "logo_2.png");
        assert_eq!(pkg.media_count(), 3);
        assert_eq!(pkg.media_bytes("logo_1.png"), Some(&[2u8][..]));
        assert_eq!(
            pkg.content_type_of("word/media/logo_2.png"),
            Some(ct::PNG)
        );
    }

    #[test]
    fn test_rejects_unsupported_and_empty() {
        let mut pkg = package();
        assert!(matches!(
            pkg.add_media(vec![1], "doc.pdf"),
            Err(OpcError::UnsupportedMedia(_))
        ));
        assert!(matches!(
            pkg.add_media(Vec::new(), "a.png"),
            Err(OpcError::UnsupportedMedia(_))
        ));
        assert!(pkg.list_media().is_empty());
    }

    #[test]
    fn test_relationship_and_delete() {
        let mut pkg = package();
        let (name, id) = pkg.add_media_with_relationship(vec![7, 7], "chart.gif").unwrap();
        assert_eq!(name, "chart.gif");
        let rels = pkg.relationships("word/_rels/document.xml.rels").unwrap();
        let rel = rels.get(&id).unwrap();
        assert_eq!(rel.target(), "media/chart.gif");
        assert_eq!(rel.reltype(), relationship_type::IMAGE);

        assert!(pkg.delete_media("chart.gif"));
        assert!(!pkg.delete_media("chart.gif"));
        assert!(!pkg.has_media("chart.gif"));
        assert!(pkg.find_relationship_id("word/_rels/document.xml.rels", "media/chart.gif").is_none());
    }

    #[test]
    fn test_replace_and_export() {
        let dir = tempfile::tempdir().unwrap();
        let mut pkg = package();
        pkg.add_media(vec![1, 2], "a.bmp").unwrap();
        pkg.replace_media("a.bmp", vec![3, 4, 5]).unwrap();
        assert_eq!(pkg.media_bytes("a.bmp"), Some(&[3u8, 4, 5][..]));
        assert!(matches!(
            pkg.replace_media("missing.png", vec![1]),
            Err(OpcError::MediaNotFound(_))
        ));

        let source = dir.path().join("new.webp");
        std::fs::write(&source, [9u8; 4]).unwrap();
        pkg.replace_media_file("a.bmp", &source).unwrap();
        assert_eq!(pkg.media_bytes("a.bmp"), Some(&[9u8; 4][..]));

        let out = dir.path().join("out.bmp");
        pkg.export_media("a.bmp", &out).unwrap();
        assert_eq!(std::fs::read(&out).unwrap(), vec![9u8; 4]);
        assert!(pkg.export_media("nope.png", &out).is_err());
    }

    #[test]
    fn test_size_limit() {
        let dir = tempfile::tempdir().unwrap();
        let options = PackageOptions::new().with_max_media_size(Some(4));
        let mut pkg = OpcPackage::with_options(options);
        pkg.create_empty(None::<&Path>).unwrap();

        assert_eq!(pkg.add_media(vec![1; 4], "small.png").unwrap(), "small.png");
        assert!(matches!(
            pkg.add_media(vec![1; 5], "big.png"),
            Err(OpcError::MediaTooLarge { size: 5, limit: 4, .. })
        ));
        assert!(matches!(
            pkg.replace_media("small.png", vec![1; 8]),
            Err(OpcError::MediaTooLarge { .. })
        ));

        let source = dir.path().join("big.gif");
        std::fs::write(&source, [0u8; 16]).unwrap();
        assert!(matches!(
            pkg.add_media_file(&source, None),
            Err(OpcError::MediaTooLarge { size: 16, .. })
        ));
        assert_eq!(pkg.list_media(), ["small.png"]);
    }

    #[test]
    fn test_add_media_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("scan.tiff");
        std::fs::write(&source, [1u8, 2, 3]).unwrap();

        let mut pkg = package();
        assert_eq!(pkg.add_media_file(&source, None).unwrap(), "scan.tiff");
        assert_eq!(pkg.add_media_file(&source, Some("renamed.tiff")).unwrap(), "renamed.tiff");
        assert!(matches!(
            pkg.add_media_file(dir.path().join("missing.png"), None),
            Err(OpcError::Io(_))
        ));

        let text = dir.path().join("notes.txt");
        std::fs::write(&text, b"x").unwrap();
        assert!(matches!(
            pkg.add_media_file(&text, None),
            Err(OpcError::UnsupportedMedia(_))
        ));
    }
}

//! The `[Content_Types].xml` declarations of a package.
//!
//! Defaults map a file extension to a content type; overrides map a single
//! part name. An override always wins over a default for the same part.

use std::collections::BTreeMap;

use tracing::debug;

use crate::common::xml::{XmlDocument, XmlElement};
use crate::ooxml::opc::constants::{content_type as ct, namespace};
use crate::ooxml::opc::packuri::{CONTENT_TYPES_PATH, PackURI};
use crate::ooxml::opc::tree::{NodeContent, PackageTree};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentTypeTable {
    /// Lower-case extension (no period) to content type
    defaults: BTreeMap<String, String>,
    /// Part name (with leading slash) to content type
    overrides: BTreeMap<String, String>,
}

impl ContentTypeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the declarations from a parsed `[Content_Types].xml`.
    ///
    /// Entries missing either attribute are ignored.
    pub fn from_document(document: &XmlDocument) -> Self {
        let mut table = Self::new();
        for entry in document.root().elements() {
            match entry.local_name() {
                "Default" => {
                    if let (Some(ext), Some(content_type)) =
                        (entry.attr("Extension"), entry.attr("ContentType"))
                    {
                        table.add_default(ext, content_type);
                    }
                },
                "Override" => {
                    if let (Some(part), Some(content_type)) =
                        (entry.attr("PartName"), entry.attr("ContentType"))
                    {
                        table.add_override(part, content_type);
                    }
                },
                _ => {},
            }
        }
        table
    }

    /// Content type declared for an extension, or `application/octet-stream`.
    pub fn type_for_extension(&self, ext: &str) -> &str {
        self.defaults
            .get(&ext.trim_start_matches('.').to_ascii_lowercase())
            .map_or(ct::OCTET_STREAM, String::as_str)
    }

    /// Content type of a part: its override, else its extension default,
    /// else `application/octet-stream`.
    pub fn type_for(&self, part_name: &str) -> &str {
        let partname = PackURI::from_membername(part_name);
        match self.overrides.get(partname.as_str()) {
            Some(content_type) => content_type,
            None => self.type_for_extension(partname.ext()),
        }
    }

    /// Declare a default. An existing declaration for the extension is kept.
    pub fn add_default(&mut self, ext: &str, content_type: &str) {
        self.defaults
            .entry(ext.trim_start_matches('.').to_ascii_lowercase())
            .or_insert_with(|| content_type.to_string());
    }

    /// Declare an override. An existing override for the part is kept.
    pub fn add_override(&mut self, part_name: &str, content_type: &str) {
        self.overrides
            .entry(PackURI::from_membername(part_name).as_str().to_string())
            .or_insert_with(|| content_type.to_string());
    }

    /// Declare an override, replacing any existing one.
    pub fn set_override(&mut self, part_name: &str, content_type: &str) {
        self.overrides.insert(
            PackURI::from_membername(part_name).as_str().to_string(),
            content_type.to_string(),
        );
    }

    pub fn remove_override(&mut self, part_name: &str) -> Option<String> {
        self.overrides
            .remove(PackURI::from_membername(part_name).as_str())
    }

    pub fn has_override(&self, part_name: &str) -> bool {
        self.overrides
            .contains_key(PackURI::from_membername(part_name).as_str())
    }

    pub fn defaults(&self) -> impl Iterator<Item = (&str, &str)> {
        self.defaults.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn overrides(&self) -> impl Iterator<Item = (&str, &str)> {
        self.overrides.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Build the `[Content_Types].xml` document for the live parts of `tree`.
    ///
    /// Overrides for parts that no longer exist are left out of the output
    /// but kept in the table. A live part that no declaration covers, or
    /// whose well-known role disagrees with its extension default, gets an
    /// override synthesized from its path; those are added to the table.
    pub fn regenerate(&mut self, tree: &PackageTree) -> XmlDocument {
        let mut synthesized = Vec::new();
        tree.iterate_files(|_, node| {
            let path = node.full_path();
            if path == CONTENT_TYPES_PATH || self.has_override(path) {
                return;
            }
            let ext = PackURI::from_membername(path).ext().to_ascii_lowercase();
            let default = self.defaults.get(&ext).map(String::as_str);
            let needed = match (well_known_type(path), default) {
                (Some(known), Some(default)) if known == default => None,
                (Some(known), _) => Some(known.to_string()),
                (None, Some(_)) => None,
                (None, None) => Some(match node.content() {
                    NodeContent::Media { content_type, .. } => content_type.clone(),
                    NodeContent::Xml(_) => ct::XML.to_string(),
                    _ => ct::OCTET_STREAM.to_string(),
                }),
            };
            if let Some(content_type) = needed {
                synthesized.push((path.to_string(), content_type));
            }
        });
        for (path, content_type) in synthesized {
            debug!(part = %path, content_type = %content_type, "synthesized content type override");
            self.add_override(&path, &content_type);
        }

        let mut root = XmlElement::new("Types").with_attr("xmlns", namespace::OPC_CONTENT_TYPES);
        for (ext, content_type) in &self.defaults {
            root.append(
                XmlElement::new("Default")
                    .with_attr("Extension", ext.as_str())
                    .with_attr("ContentType", content_type.as_str()),
            );
        }
        for (partname, content_type) in &self.overrides {
            if !tree.is_live(partname) {
                continue;
            }
            root.append(
                XmlElement::new("Override")
                    .with_attr("PartName", partname.as_str())
                    .with_attr("ContentType", content_type.as_str()),
            );
        }
        XmlDocument::new(root)
    }
}

/// Content type implied by the location of a WordprocessingML part.
pub fn well_known_type(path: &str) -> Option<&'static str> {
    let path = path.trim_start_matches('/');
    let numbered = |prefix: &str| {
        path.strip_prefix(prefix)
            .and_then(|rest| rest.strip_suffix(".xml"))
            .is_some_and(|digits| digits.bytes().all(|b| b.is_ascii_digit()))
    };

    let content_type = match path {
        "word/document.xml" => ct::WML_DOCUMENT_MAIN,
        "word/styles.xml" => ct::WML_STYLES,
        "word/settings.xml" => ct::WML_SETTINGS,
        "word/webSettings.xml" => ct::WML_WEB_SETTINGS,
        "word/fontTable.xml" => ct::WML_FONT_TABLE,
        "word/numbering.xml" => ct::WML_NUMBERING,
        "word/footnotes.xml" => ct::WML_FOOTNOTES,
        "word/endnotes.xml" => ct::WML_ENDNOTES,
        "word/comments.xml" => ct::WML_COMMENTS,
        "docProps/core.xml" => ct::OPC_CORE_PROPERTIES,
        "docProps/app.xml" => ct::OFC_EXTENDED_PROPERTIES,
        "docProps/custom.xml" => ct::OFC_CUSTOM_PROPERTIES,
        _ if path.ends_with(".rels") => ct::OPC_RELATIONSHIPS,
        _ if numbered("word/theme/theme") => ct::OFC_THEME,
        _ if numbered("word/header") => ct::WML_HEADER,
        _ if numbered("word/footer") => ct::WML_FOOTER,
        _ => return None,
    };
    Some(content_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ooxml::opc::tree::XmlPart;

    const TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
  <Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
  <Default Extension="XML" ContentType="application/xml"/>
  <Default Extension="png" ContentType="image/png"/>
  <Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>
</Types>"#;

    fn table() -> ContentTypeTable {
        ContentTypeTable::from_document(&XmlDocument::parse(TYPES.as_bytes()).unwrap())
    }

    fn xml_node() -> NodeContent {
        NodeContent::Xml(XmlPart::new(XmlDocument::new(XmlElement::new("r"))))
    }

    #[test]
    fn test_override_beats_default() {
        let table = table();
        assert_eq!(table.type_for("word/document.xml"), ct::WML_DOCUMENT_MAIN);
        assert_eq!(table.type_for("/word/other.xml"), ct::XML);
        assert_eq!(table.type_for("word/media/a.PNG"), ct::PNG);
        assert_eq!(table.type_for("word/vbaProject.bin"), ct::OCTET_STREAM);
    }

    #[test]
    fn test_extension_lookup_is_case_insensitive() {
        let table = table();
        assert_eq!(table.type_for_extension("xml"), ct::XML);
        assert_eq!(table.type_for_extension(".Png"), ct::PNG);
        assert_eq!(table.type_for_extension("tiff"), ct::OCTET_STREAM);
    }

    #[test]
    fn test_first_writer_wins() {
        let mut table = table();
        table.add_default("png", "image/x-other");
        table.add_override("word/document.xml", ct::XML);
        assert_eq!(table.type_for("word/media/x.png"), ct::PNG);
        assert_eq!(table.type_for("word/document.xml"), ct::WML_DOCUMENT_MAIN);
        table.set_override("word/document.xml", ct::XML);
        assert_eq!(table.type_for("word/document.xml"), ct::XML);
        assert!(table.remove_override("word/document.xml").is_some());
        assert!(table.remove_override("word/document.xml").is_none());
    }

    #[test]
    fn test_regenerate_synthesizes_and_skips_dead_parts() {
        let mut table = table();
        let mut tree = PackageTree::new("word/media");
        tree.upsert("word/styles.xml", xml_node()).unwrap();
        tree.upsert("word/header1.xml", xml_node()).unwrap();
        tree.upsert("customXml/item1.xml", xml_node()).unwrap();
        tree.upsert(
            "word/media/pic.webp",
            NodeContent::Media {
                bytes: vec![0],
                content_type: ct::WEBP.to_string(),
            },
        )
        .unwrap();
        tree.upsert("word/data.bin", NodeContent::Binary(vec![0])).unwrap();

        let doc = table.regenerate(&tree);
        let regenerated = ContentTypeTable::from_document(&doc);

        assert_eq!(regenerated.type_for("word/styles.xml"), ct::WML_STYLES);
        assert_eq!(regenerated.type_for("word/header1.xml"), ct::WML_HEADER);
        assert_eq!(regenerated.type_for("customXml/item1.xml"), ct::XML);
        assert!(!regenerated.has_override("customXml/item1.xml"));
        assert_eq!(regenerated.type_for("word/media/pic.webp"), ct::WEBP);
        assert_eq!(regenerated.type_for("word/data.bin"), ct::OCTET_STREAM);
        // word/document.xml is not in the tree, so its override is not written.
        assert!(!regenerated.has_override("word/document.xml"));
        assert!(table.has_override("word/document.xml"));
    }

    #[test]
    fn test_well_known_type() {
        assert_eq!(well_known_type("word/theme/theme1.xml"), Some(ct::OFC_THEME));
        assert_eq!(well_known_type("word/footer12.xml"), Some(ct::WML_FOOTER));
        assert_eq!(well_known_type("word/footerx.xml"), None);
        assert_eq!(well_known_type("_rels/.rels"), Some(ct::OPC_RELATIONSHIPS));
        assert_eq!(well_known_type("customXml/item1.xml"), None);
    }
}

//! Relationship lists (`_rels/*.rels`) and their bookkeeping.
//!
//! Every relationships file is owned by one source part (or by the package
//! itself for `_rels/.rels`). Targets are stored exactly as written, relative
//! to the directory of the source part.

use std::collections::BTreeMap;

use tracing::debug;

use crate::common::xml::{XmlDocument, XmlElement};
use crate::ooxml::opc::constants::{namespace, target_mode};
use crate::ooxml::opc::error::Result;
use crate::ooxml::opc::packuri::PackURI;
use crate::ooxml::opc::tree::{NodeContent, PackageTree, XmlPart};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TargetMode {
    #[default]
    Internal,
    External,
}

impl TargetMode {
    fn parse(value: Option<&str>) -> Self {
        match value {
            Some(v) if v.eq_ignore_ascii_case(target_mode::EXTERNAL) => TargetMode::External,
            _ => TargetMode::Internal,
        }
    }
}

/// A single relationship from a source part to a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    id: String,
    reltype: String,
    target: String,
    target_mode: TargetMode,
}

impl Relationship {
    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[inline]
    pub fn reltype(&self) -> &str {
        &self.reltype
    }

    /// Target as written: relative to the source part, or a URL when external.
    #[inline]
    pub fn target(&self) -> &str {
        &self.target
    }

    #[inline]
    pub fn target_mode(&self) -> TargetMode {
        self.target_mode
    }

    #[inline]
    pub fn is_external(&self) -> bool {
        self.target_mode == TargetMode::External
    }

    /// Absolute part name of an internal target, resolved against the
    /// directory of the source part. `None` for external targets.
    pub fn target_partname(&self, base_uri: &str) -> Option<PackURI> {
        if self.is_external() {
            return None;
        }
        PackURI::from_rel_ref(base_uri, &self.target).ok()
    }
}

/// Numeric part of an `rId<n>` id.
fn id_number(id: &str) -> Option<u32> {
    let digits = id.strip_prefix("rId")?;
    if digits.is_empty() {
        return None;
    }
    atoi_simd::parse::<u32, false, false>(digits.as_bytes()).ok()
}

/// The ordered relationships of one source part.
///
/// Ids are allocated as `rId<n>` one above the highest number seen in this
/// list during the session, so an id that was removed is never handed out
/// again before the package is reopened.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Relationships {
    rels: Vec<Relationship>,
    high_water: u32,
}

impl Relationships {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a relationships document. Entries without an id or a target are
    /// skipped; a missing type is kept as empty.
    pub fn from_document(document: &XmlDocument) -> Self {
        let mut list = Self::new();
        for entry in document.root().elements() {
            if entry.local_name() != "Relationship" {
                continue;
            }
            let (Some(id), Some(target)) = (entry.attr("Id"), entry.attr("Target")) else {
                continue;
            };
            list.push(Relationship {
                id: id.to_string(),
                reltype: entry.attr("Type").unwrap_or_default().to_string(),
                target: target.to_string(),
                target_mode: TargetMode::parse(entry.attr("TargetMode")),
            });
        }
        list
    }

    fn push(&mut self, rel: Relationship) {
        if let Some(n) = id_number(&rel.id) {
            self.high_water = self.high_water.max(n);
        }
        self.rels.push(rel);
    }

    /// Serialize to a relationships document.
    pub fn to_document(&self) -> XmlDocument {
        let mut root =
            XmlElement::new("Relationships").with_attr("xmlns", namespace::OPC_RELATIONSHIPS);
        for rel in &self.rels {
            let mut element = XmlElement::new("Relationship")
                .with_attr("Id", rel.id.as_str())
                .with_attr("Type", rel.reltype.as_str())
                .with_attr("Target", rel.target.as_str());
            if rel.is_external() {
                element.set_attr("TargetMode", target_mode::EXTERNAL);
            }
            root.append(element);
        }
        XmlDocument::new(root)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.rels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Relationship> {
        self.rels.iter()
    }

    pub fn get(&self, id: &str) -> Option<&Relationship> {
        self.rels.iter().find(|r| r.id == id)
    }

    /// First relationship of the given type.
    pub fn part_with_reltype(&self, reltype: &str) -> Option<&Relationship> {
        self.rels.iter().find(|r| r.reltype == reltype)
    }

    /// Id of the first relationship whose target is exactly `target`.
    pub fn find_id_by_target(&self, target: &str) -> Option<&str> {
        self.rels
            .iter()
            .find(|r| r.target == target)
            .map(|r| r.id.as_str())
    }

    /// Append a relationship and return its newly allocated id.
    ///
    /// Once the numbering is exhausted at `rId4294967295`, the lowest unused
    /// `rId<n>` is handed out instead.
    pub fn add(&mut self, reltype: &str, target: &str, mode: TargetMode) -> String {
        let id = self
            .rels
            .iter()
            .filter_map(|r| id_number(&r.id))
            .max()
            .unwrap_or(0)
            .max(self.high_water)
            .checked_add(1)
            .map(|next| format!("rId{next}"))
            .unwrap_or_else(|| self.lowest_free_id());
        self.push(Relationship {
            id: id.clone(),
            reltype: reltype.to_string(),
            target: target.to_string(),
            target_mode: mode,
        });
        id
    }

    fn lowest_free_id(&self) -> String {
        (1..=u32::MAX)
            .map(|n| format!("rId{n}"))
            .find(|candidate| self.get(candidate).is_none())
            .unwrap_or_default()
    }

    /// Remove the first relationship with `id`.
    pub fn remove(&mut self, id: &str) -> Option<Relationship> {
        let pos = self.rels.iter().position(|r| r.id == id)?;
        Some(self.rels.remove(pos))
    }

    /// Remove every internal relationship whose target resolves to `partname`.
    pub fn remove_targeting(&mut self, base_uri: &str, partname: &PackURI) -> Vec<Relationship> {
        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.rels)
            .into_iter()
            .partition(|r| r.target_partname(base_uri).as_ref() == Some(partname));
        self.rels = kept;
        removed
    }

    /// Point every internal relationship targeting `from` at `to` instead.
    pub fn retarget(&mut self, base_uri: &str, from: &PackURI, to: &PackURI) -> usize {
        let mut count = 0;
        for rel in &mut self.rels {
            if rel.target_partname(base_uri).as_ref() == Some(from) {
                rel.target = to.relative_ref(base_uri);
                count += 1;
            }
        }
        count
    }

    /// Rewrite internal targets after the source part moved from the
    /// directory `old_base` to `new_base`.
    pub fn rebase(&mut self, old_base: &str, new_base: &str) {
        for rel in &mut self.rels {
            if let Some(partname) = rel.target_partname(old_base) {
                rel.target = partname.relative_ref(new_base);
            }
        }
    }
}

/// All relationship lists of a package, keyed by the path of the
/// relationships file.
#[derive(Debug, Clone, Default)]
pub struct RelationshipTables {
    tables: BTreeMap<String, Relationships>,
}

impl RelationshipTables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read every live, parsed `.rels` part of the tree.
    pub fn load(tree: &PackageTree) -> Self {
        let mut tables = Self::new();
        tree.iterate_files(|_, node| {
            if !node.full_path().ends_with(".rels") {
                return;
            }
            if let Some(document) = node.xml() {
                tables
                    .tables
                    .insert(node.full_path().to_string(), Relationships::from_document(document));
            }
        });
        tables
    }

    pub fn clear(&mut self) {
        self.tables.clear();
    }

    pub fn get(&self, rels_path: &str) -> Option<&Relationships> {
        self.tables.get(rels_path.trim_start_matches('/'))
    }

    /// Add a relationship to `rels_path`, creating the list if needed.
    pub fn add(&mut self, rels_path: &str, reltype: &str, target: &str, mode: TargetMode) -> String {
        let id = self
            .tables
            .entry(rels_path.trim_start_matches('/').to_string())
            .or_default()
            .add(reltype, target, mode);
        debug!(rels = rels_path, id = %id, to = target, "added relationship");
        id
    }

    /// Remove a relationship; false if the list or id does not exist.
    pub fn remove(&mut self, rels_path: &str, id: &str) -> bool {
        let removed = self
            .tables
            .get_mut(rels_path.trim_start_matches('/'))
            .and_then(|list| list.remove(id))
            .is_some();
        if removed {
            debug!(rels = rels_path, id, "removed relationship");
        }
        removed
    }

    pub fn find_id_by_target(&self, rels_path: &str, target: &str) -> Option<&str> {
        self.get(rels_path)?.find_id_by_target(target)
    }

    /// Install a list parsed from a relationships part, replacing any
    /// previous list at the same path.
    pub fn insert_table(&mut self, rels_path: &str, list: Relationships) {
        self.tables.insert(rels_path.trim_start_matches('/').to_string(), list);
    }

    /// Drop a whole list, e.g. when its source part goes away.
    pub fn drop_table(&mut self, rels_path: &str) -> Option<Relationships> {
        self.tables.remove(rels_path.trim_start_matches('/'))
    }

    /// Remove every relationship, in any list, that points at `partname`.
    pub fn remove_targeting(&mut self, partname: &PackURI) -> usize {
        let mut count = 0;
        for (rels_path, list) in &mut self.tables {
            let Some(source) = PackURI::source_of_rels(rels_path) else {
                continue;
            };
            for rel in list.remove_targeting(source.base_uri(), partname) {
                debug!(rels = %rels_path, id = rel.id(), "dropped relationship to removed part");
                count += 1;
            }
        }
        count
    }

    /// Re-point every relationship targeting `from` at `to`.
    pub fn retarget(&mut self, from: &PackURI, to: &PackURI) -> usize {
        let mut count = 0;
        for (rels_path, list) in &mut self.tables {
            if let Some(source) = PackURI::source_of_rels(rels_path) {
                count += list.retarget(source.base_uri(), from, to);
            }
        }
        count
    }

    /// Move a list to a new relationships path (its source part was renamed)
    /// and return it. Any list already at `to` is replaced.
    pub fn rename_table(&mut self, from: &str, to: &str) -> Option<&mut Relationships> {
        let list = self.drop_table(from)?;
        let key = to.trim_start_matches('/').to_string();
        self.tables.insert(key.clone(), list);
        self.tables.get_mut(&key)
    }

    /// Write one list into its relationships part. The part is only touched
    /// when its content actually changes.
    pub fn regenerate(&self, rels_path: &str, tree: &mut PackageTree) -> Result<()> {
        let Some(list) = self.get(rels_path) else {
            return Ok(());
        };
        let document = list.to_document();
        if tree.find_live(rels_path).and_then(|n| n.xml()) == Some(&document) {
            return Ok(());
        }
        tree.upsert(rels_path, NodeContent::Xml(XmlPart::new(document)))?;
        Ok(())
    }

    /// Write every list back into the tree.
    pub fn regenerate_all(&self, tree: &mut PackageTree) -> Result<()> {
        for rels_path in self.tables.keys() {
            self.regenerate(rels_path, tree)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ooxml::opc::constants::relationship_type as rt;
    use proptest::prelude::*;

    const DOC_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/><Relationship Id="rId7" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/image" Target="media/image1.png"/><Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink" Target="https://example.com/a?b=1&amp;c=2" TargetMode="External"/><Relationship Id="custom" Type="x" Target="media/image1.png"/></Relationships>"#;

    fn list() -> Relationships {
        Relationships::from_document(&XmlDocument::parse(DOC_RELS.as_bytes()).unwrap())
    }

    #[test]
    fn test_parse_keeps_order_and_modes() {
        let rels = list();
        let ids: Vec<_> = rels.iter().map(Relationship::id).collect();
        assert_eq!(ids, ["rId1", "rId7", "rId3", "custom"]);
        let link = rels.get("rId3").unwrap();
        assert!(link.is_external());
        assert_eq!(link.target(), "https://example.com/a?b=1&c=2");
        assert!(link.target_partname("/word").is_none());
        assert_eq!(
            rels.get("rId7").unwrap().target_partname("/word").unwrap().as_str(),
            "/word/media/image1.png"
        );
    }

    #[test]
    fn test_add_allocates_above_max() {
        let mut rels = list();
        assert_eq!(rels.add(rt::NUMBERING, "numbering.xml", TargetMode::Internal), "rId8");
        assert_eq!(rels.len(), 5);
        assert_eq!(rels.iter().last().unwrap().target(), "numbering.xml");
    }

    #[test]
    fn test_removed_ids_are_not_reissued() {
        let mut rels = list();
        assert!(rels.remove("rId7").is_some());
        assert!(rels.remove("rId7").is_none());
        assert_eq!(rels.add(rt::IMAGE, "media/image2.png", TargetMode::Internal), "rId8");
    }

    #[test]
    fn test_find_by_target_first_match_wins() {
        let rels = list();
        assert_eq!(rels.find_id_by_target("media/image1.png"), Some("rId7"));
        assert_eq!(rels.find_id_by_target("missing.xml"), None);
        assert_eq!(rels.part_with_reltype(rt::STYLES).unwrap().id(), "rId1");
    }

    #[test]
    fn test_document_round_trip() {
        let rels = list();
        let again = Relationships::from_document(&rels.to_document());
        assert_eq!(rels.rels, again.rels);
        let external = again.to_document();
        let last = external.root().elements().nth(2).unwrap();
        assert_eq!(last.attr("TargetMode"), Some("External"));
    }

    #[test]
    fn test_tables_remove_targeting_resolves_relative_targets() {
        let mut tree = PackageTree::new("word/media");
        tree.add_entry_from_bytes("word/_rels/document.xml.rels", DOC_RELS.as_bytes().to_vec())
            .unwrap();
        tree.add_entry_from_bytes(
            "word/_rels/header1.xml.rels",
            br#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="x" Target="../word/media/image1.png"/></Relationships>"#.to_vec(),
        )
        .unwrap();
        let mut tables = RelationshipTables::load(&tree);
        let removed = tables.remove_targeting(&PackURI::new("/word/media/image1.png").unwrap());
        assert_eq!(removed, 3);
        assert!(tables.get("word/_rels/header1.xml.rels").unwrap().is_empty());
        assert_eq!(tables.get("word/_rels/document.xml.rels").unwrap().len(), 2);
    }

    #[test]
    fn test_regenerate_writes_into_tree_only_on_change() {
        let mut tree = PackageTree::new("word/media");
        tree.add_entry_from_bytes("word/_rels/document.xml.rels", DOC_RELS.as_bytes().to_vec())
            .unwrap();
        let mut tables = RelationshipTables::load(&tree);
        let path = "word/_rels/document.xml.rels";

        tables.regenerate_all(&mut tree).unwrap();
        tree.commit_saved();
        tables.regenerate_all(&mut tree).unwrap();
        assert!(!tree.find(path).unwrap().is_modified());

        let id = tables.add(path, rt::NUMBERING, "numbering.xml", TargetMode::Internal);
        tables.regenerate(path, &mut tree).unwrap();
        let node = tree.find(path).unwrap();
        assert!(node.is_modified());
        let reread = Relationships::from_document(node.xml().unwrap());
        assert_eq!(reread.get(&id).unwrap().target(), "numbering.xml");
    }

    #[test]
    fn test_rebase_rewrites_relative_targets() {
        let mut rels = list();
        rels.rebase("/word", "/word/sub");
        assert_eq!(rels.get("rId1").unwrap().target(), "../styles.xml");
        assert_eq!(rels.get("rId7").unwrap().target(), "../media/image1.png");
        // External targets are left alone.
        assert_eq!(rels.get("rId3").unwrap().target(), "https://example.com/a?b=1&c=2");
    }

    #[test]
    fn test_add_after_highest_possible_id() {
        let xml = br#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="x" Target="a.xml"/><Relationship Id="rId4294967295" Type="x" Target="b.xml"/></Relationships>"#;
        let mut rels = Relationships::from_document(&XmlDocument::parse(xml).unwrap());
        let first = rels.add(rt::IMAGE, "media/a.png", TargetMode::Internal);
        let second = rels.add(rt::IMAGE, "media/b.png", TargetMode::Internal);
        assert_eq!(first, "rId2");
        assert_eq!(second, "rId3");
        let ids: std::collections::HashSet<_> = rels.iter().map(Relationship::id).collect();
        assert_eq!(ids.len(), rels.len());
    }

    proptest! {
        #[test]
        fn prop_ids_are_unique_and_increasing(ops in proptest::collection::vec(any::<bool>(), 1..64)) {
            let mut rels = Relationships::new();
            let mut last = 0u32;
            let mut issued = std::collections::HashSet::new();
            for add in ops {
                if add || rels.is_empty() {
                    let id = rels.add(rt::IMAGE, "media/x.png", TargetMode::Internal);
                    let n = id_number(&id).unwrap();
                    prop_assert!(n > last);
                    prop_assert!(issued.insert(id));
                    last = n;
                } else {
                    let victim = rels.iter().next().map(|r| r.id().to_string()).unwrap();
                    rels.remove(&victim);
                }
            }
        }
    }
}

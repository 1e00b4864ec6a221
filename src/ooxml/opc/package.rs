//! The package lifecycle: open, mutate, save, close.
//!
//! [`OpcPackage`] owns the package tree and the two side tables derived from
//! it (relationships and content types). Every structural change goes through
//! a single private entry point, [`OpcPackage::apply`], which updates the tree
//! and both tables together so they cannot drift apart.

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::common::xml::XmlDocument;
use crate::ooxml::docx::skeleton;
use crate::ooxml::opc::config::PackageOptions;
use crate::ooxml::opc::constants::relationship_type;
use crate::ooxml::opc::content_types::ContentTypeTable;
use crate::ooxml::opc::error::{OpcError, Result};
use crate::ooxml::opc::packuri::{CONTENT_TYPES_PATH, PACKAGE_RELS_PATH, PACKAGE_URI, PackURI};
use crate::ooxml::opc::phys_pkg::{PhysPkgReader, PhysPkgWriter};
use crate::ooxml::opc::rel::{RelationshipTables, Relationships, TargetMode};
use crate::ooxml::opc::tree::{NodeContent, NodeId, NodeKind, PackageNode, PackageTree, XmlPart};

/// Fallback location of the main document when `_rels/.rels` does not name one.
const DEFAULT_MAIN_DOCUMENT: &str = "word/document.xml";

/// A structural change to the package.
enum PartMutation<'a> {
    /// Create or replace a part, optionally declaring its content type.
    Put {
        path: &'a str,
        content: NodeContent,
        content_type: Option<&'a str>,
    },
    Remove {
        path: &'a str,
    },
    Rename {
        from: &'a str,
        to: &'a str,
    },
}

/// An Office Open XML package held entirely in memory.
///
/// # Example
/// ```no_run
/// use quince::ooxml::opc::OpcPackage;
///
/// let mut pkg = OpcPackage::new();
/// pkg.open("report.docx").unwrap();
/// pkg.remove_xml_part("word/numbering.xml");
/// pkg.save_as("report-trimmed.docx").unwrap();
/// ```
#[derive(Debug)]
pub struct OpcPackage {
    options: PackageOptions,
    tree: PackageTree,
    content_types: ContentTypeTable,
    rels: RelationshipTables,
    path: Option<PathBuf>,
    open: bool,
}

impl Default for OpcPackage {
    fn default() -> Self {
        Self::new()
    }
}

impl OpcPackage {
    /// Create a closed package with default options.
    pub fn new() -> Self {
        Self::with_options(PackageOptions::default())
    }

    pub fn with_options(options: PackageOptions) -> Self {
        Self {
            tree: PackageTree::new(&options.media_dir),
            options,
            content_types: ContentTypeTable::new(),
            rels: RelationshipTables::new(),
            path: None,
            open: false,
        }
    }

    // ---------------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------------

    /// Open the package stored at `path`.
    ///
    /// Any package already open is closed first. If the archive cannot be
    /// read the package is left closed.
    ///
    /// # Arguments
    /// * `path` - Path to the `.docx` file
    pub fn open<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.close();
        let path = path.as_ref();
        if let Err(e) = self.load(path) {
            self.close();
            return Err(e);
        }
        info!(
            path = %path.display(),
            parts = self.tree.live_file_count(),
            "opened package"
        );
        Ok(())
    }

    fn load(&mut self, path: &Path) -> Result<()> {
        let entries = PhysPkgReader::read_entries(path)?;
        debug!(entries = entries.len(), "read archive entries");

        for entry in entries {
            let name = entry.name;
            if let Err(e) = self.tree.add_entry_from_bytes(&name, entry.bytes) {
                warn!(entry = %name, error = %e, "skipping archive entry");
            }
        }
        // Commit step for the bulk load.
        self.tree.rebuild_path_index();
        self.load_side_tables();

        self.open = true;
        self.path = Some(path.to_path_buf());

        if self.options.require_main_document && self.main_document_path().is_none() {
            return Err(OpcError::MissingMainDocument(path.display().to_string()));
        }
        Ok(())
    }

    fn load_side_tables(&mut self) {
        self.rels = RelationshipTables::load(&self.tree);
        self.content_types = self
            .tree
            .find_live(CONTENT_TYPES_PATH)
            .and_then(PackageNode::xml)
            .map(ContentTypeTable::from_document)
            .unwrap_or_default();
    }

    /// Replace the package with a new, empty Word document.
    ///
    /// `path` becomes the target of a later [`save`](Self::save); with `None`
    /// the package can only be written with [`save_as`](Self::save_as).
    pub fn create_empty<P: AsRef<Path>>(&mut self, path: Option<P>) -> Result<()> {
        self.close();
        if let Err(e) = self.build_empty() {
            self.close();
            return Err(e);
        }
        self.path = path.map(|p| p.as_ref().to_path_buf());
        info!(parts = self.tree.live_file_count(), "created empty package");
        Ok(())
    }

    fn build_empty(&mut self) -> Result<()> {
        for (name, xml) in skeleton::empty_package_parts(&self.options) {
            let document = XmlDocument::parse(xml.as_bytes())?;
            self.tree
                .upsert(name, NodeContent::Xml(XmlPart::new(document)))?;
        }
        self.load_side_tables();
        self.open = true;
        Ok(())
    }

    /// Write the package back to the path it was opened from or created for.
    ///
    /// Saving a closed package does nothing.
    pub fn save(&mut self) -> Result<()> {
        if !self.open {
            return Ok(());
        }
        let path = self.path.clone().ok_or(OpcError::NoTargetPath)?;
        self.write_to(&path)
    }

    /// Write the package to `path`, which becomes the package path.
    pub fn save_as<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        if !self.open {
            return Ok(());
        }
        let path = path.as_ref().to_path_buf();
        self.write_to(&path)?;
        self.path = Some(path);
        Ok(())
    }

    fn write_to(&mut self, destination: &Path) -> Result<()> {
        self.rels.regenerate_all(&mut self.tree)?;
        let types = self.content_types.regenerate(&self.tree);
        let current = self.tree.find_live(CONTENT_TYPES_PATH).and_then(PackageNode::xml);
        if current != Some(&types) {
            self.tree
                .upsert(CONTENT_TYPES_PATH, NodeContent::Xml(XmlPart::new(types)))?;
        }

        let mut writer = PhysPkgWriter::create(destination, &self.options)?;
        if let Some(node) = self.tree.find_live(CONTENT_TYPES_PATH) {
            writer.write(CONTENT_TYPES_PATH, &node.to_bytes())?;
        }
        let mut written = Ok(());
        self.tree.iterate_files(|_, node| {
            if written.is_err() || node.full_path() == CONTENT_TYPES_PATH {
                return;
            }
            written = writer.write(node.full_path(), &node.to_bytes());
        });
        written?;
        writer.commit(destination)?;

        self.tree.commit_saved();
        info!(
            path = %destination.display(),
            parts = self.tree.live_file_count(),
            "saved package"
        );
        Ok(())
    }

    /// Drop all content. The package path is forgotten as well.
    pub fn close(&mut self) {
        self.tree.clear();
        self.rels.clear();
        self.content_types = ContentTypeTable::new();
        self.path = None;
        self.open = false;
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Path used by [`save`](Self::save), if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    #[inline]
    pub fn options(&self) -> &PackageOptions {
        &self.options
    }

    #[inline]
    pub fn tree(&self) -> &PackageTree {
        &self.tree
    }

    #[inline]
    pub fn content_types(&self) -> &ContentTypeTable {
        &self.content_types
    }

    // ---------------------------------------------------------------------
    // Mutation entry point
    // ---------------------------------------------------------------------

    fn apply(&mut self, mutation: PartMutation<'_>) -> Result<Option<NodeId>> {
        if !self.open {
            return Err(OpcError::NotOpen);
        }
        match mutation {
            PartMutation::Put {
                path,
                content,
                content_type,
            } => self.put(path.trim_matches('/'), content, content_type).map(Some),
            PartMutation::Remove { path } => Ok(self.remove(path.trim_matches('/'))),
            PartMutation::Rename { from, to } => self
                .rename(from.trim_matches('/'), to.trim_matches('/'))
                .map(Some),
        }
    }

    fn put(&mut self, path: &str, content: NodeContent, content_type: Option<&str>) -> Result<NodeId> {
        if path.is_empty() {
            return Err(OpcError::InvalidPackUri("empty part name".to_string()));
        }
        let id = self.tree.upsert(path, content)?;
        // An override already declared for the part is kept.
        if let Some(content_type) = content_type {
            self.content_types.add_override(path, content_type);
        }

        // The side tables follow their backing parts.
        if path == CONTENT_TYPES_PATH {
            if let Some(document) = self.tree.get(id).xml() {
                self.content_types = ContentTypeTable::from_document(document);
            }
        } else if path.ends_with(".rels") {
            match self.tree.get(id).xml() {
                Some(document) => self
                    .rels
                    .insert_table(path, Relationships::from_document(document)),
                None => {
                    self.rels.drop_table(path);
                },
            }
        }
        Ok(id)
    }

    fn remove(&mut self, path: &str) -> Option<NodeId> {
        if !self.tree.is_live(path) {
            return None;
        }
        let id = self.tree.find_id(path);
        self.tree.remove(path);
        self.content_types.remove_override(path);

        if path.ends_with(".rels") {
            self.rels.drop_table(path);
            return id;
        }

        let partname = PackURI::from_membername(path);
        let own_rels = partname.rels_uri();
        self.rels.drop_table(own_rels.membername());
        if self.tree.remove(own_rels.membername()) {
            self.content_types.remove_override(own_rels.membername());
        }
        let dropped = self.rels.remove_targeting(&partname);
        debug!(part = path, dropped_relationships = dropped, "removed part");
        id
    }

    fn rename(&mut self, from: &str, to: &str) -> Result<NodeId> {
        if !self.tree.is_live(from) {
            return Err(OpcError::PartNotFound(from.to_string()));
        }
        for path in [from, to] {
            if path == CONTENT_TYPES_PATH || path.ends_with(".rels") {
                return Err(OpcError::PathConflict(format!(
                    "'{path}' is maintained by the package and cannot be renamed"
                )));
            }
        }
        let id = self.tree.rename(from, to)?;

        if let Some(content_type) = self.content_types.remove_override(from) {
            self.content_types.set_override(to, &content_type);
        }

        let old = PackURI::from_membername(from);
        let new = PackURI::from_membername(to);
        let retargeted = self.rels.retarget(&old, &new);

        let old_rels = old.rels_uri();
        let new_rels = new.rels_uri();
        if let Some(list) = self.rels.rename_table(old_rels.membername(), new_rels.membername()) {
            list.rebase(old.base_uri(), new.base_uri());
            // A stale relationships part at the destination belongs to nobody.
            self.tree.remove(new_rels.membername());
            if self.tree.is_live(old_rels.membername()) {
                self.tree.rename(old_rels.membername(), new_rels.membername())?;
            }
        }
        debug!(from, to, retargeted, "renamed part");
        Ok(id)
    }

    // ---------------------------------------------------------------------
    // Parts
    // ---------------------------------------------------------------------

    /// The live part at `path` (file nodes only).
    pub fn part(&self, path: &str) -> Option<&PackageNode> {
        if !self.open {
            return None;
        }
        self.tree.find_live(path).filter(|n| n.is_file())
    }

    pub fn xml_part(&self, path: &str) -> Option<&XmlDocument> {
        self.part(path)?.xml()
    }

    /// Mutable access to an XML part; the part is flagged as modified.
    pub fn xml_part_mut(&mut self, path: &str) -> Option<&mut XmlDocument> {
        self.xml_part(path)?;
        self.tree.mark_modified(path);
        self.tree.find_live_mut(path)?.xml_mut()
    }

    pub fn has_part(&self, path: &str) -> bool {
        self.part(path).is_some()
    }

    pub fn has_xml_part(&self, path: &str) -> bool {
        self.xml_part(path).is_some()
    }

    /// Paths of every live part.
    pub fn part_paths(&self) -> Vec<String> {
        if !self.open {
            return Vec::new();
        }
        self.tree.live_file_paths()
    }

    /// Paths of every live, parsed XML part.
    pub fn xml_part_paths(&self) -> Vec<String> {
        let mut paths = Vec::new();
        if self.open {
            self.tree.iterate_files(|_, node| {
                if node.kind() == NodeKind::XmlPart {
                    paths.push(node.full_path().to_string());
                }
            });
        }
        paths
    }

    pub fn part_count(&self) -> usize {
        if !self.open {
            return 0;
        }
        self.tree.live_file_count()
    }

    /// Bytes the part would be saved as.
    pub fn part_bytes(&self, path: &str) -> Option<Cow<'_, [u8]>> {
        self.part(path).map(PackageNode::to_bytes)
    }

    /// Declared content type of a live part.
    pub fn content_type_of(&self, path: &str) -> Option<&str> {
        self.part(path)?;
        Some(self.content_types.type_for(path))
    }

    /// Add (or replace) an XML part and return it for editing.
    ///
    /// # Arguments
    /// * `path` - Part path such as `word/header1.xml`
    /// * `document` - The part content
    /// * `content_type` - Override to declare; `None` leaves the type to the
    ///   extension default or to the well-known role of the path on save
    pub fn create_xml_part(
        &mut self,
        path: &str,
        document: XmlDocument,
        content_type: Option<&str>,
    ) -> Result<&mut XmlDocument> {
        let id = self
            .apply(PartMutation::Put {
                path,
                content: NodeContent::Xml(XmlPart::new(document)),
                content_type,
            })?
            .ok_or_else(|| OpcError::PartNotFound(path.to_string()))?;
        self.tree
            .get_mut(id)
            .xml_mut()
            .ok_or_else(|| OpcError::PartNotFound(path.to_string()))
    }

    /// Add or replace a part from raw bytes, classified the same way as
    /// entries read from an archive.
    pub fn put_part(&mut self, path: &str, bytes: Vec<u8>, content_type: Option<&str>) -> Result<()> {
        let content = NodeContent::classify(path.trim_matches('/'), bytes, self.tree.media_prefix());
        self.apply(PartMutation::Put {
            path,
            content,
            content_type,
        })?;
        Ok(())
    }

    /// Remove a part together with its own relationships, every relationship
    /// pointing at it and its content-type override.
    ///
    /// Returns false if no such live part exists or the package is closed.
    pub fn remove_part(&mut self, path: &str) -> bool {
        matches!(self.apply(PartMutation::Remove { path }), Ok(Some(_)))
    }

    /// Like [`remove_part`](Self::remove_part), but only for parsed XML parts.
    pub fn remove_xml_part(&mut self, path: &str) -> bool {
        self.has_xml_part(path) && self.remove_part(path)
    }

    /// Move a part to a new path. Relationships pointing at it and its own
    /// relationships move along.
    pub fn rename_part(&mut self, from: &str, to: &str) -> Result<()> {
        self.apply(PartMutation::Rename { from, to })?;
        Ok(())
    }

    /// Flag a part as modified so it is re-serialized on save.
    pub fn mark_modified(&mut self, path: &str) -> bool {
        self.has_part(path) && self.tree.mark_modified(path)
    }

    // ---------------------------------------------------------------------
    // Main document
    // ---------------------------------------------------------------------

    /// Path of the main document part, resolved through the package
    /// relationships with `word/document.xml` as a fallback.
    pub fn main_document_path(&self) -> Option<String> {
        let from_rels = self
            .rels
            .get(PACKAGE_RELS_PATH)
            .and_then(|rels| rels.part_with_reltype(relationship_type::OFFICE_DOCUMENT))
            .and_then(|rel| rel.target_partname(PACKAGE_URI))
            .map(|uri| uri.membername().to_string());

        from_rels
            .into_iter()
            .chain(std::iter::once(DEFAULT_MAIN_DOCUMENT.to_string()))
            .find(|path| self.has_xml_part(path))
    }

    pub fn main_document(&self) -> Option<&XmlDocument> {
        let path = self.main_document_path()?;
        self.xml_part(&path)
    }

    pub fn main_document_mut(&mut self) -> Option<&mut XmlDocument> {
        let path = self.main_document_path()?;
        self.xml_part_mut(&path)
    }

    // ---------------------------------------------------------------------
    // Relationships
    // ---------------------------------------------------------------------

    /// Relationships part path for a source part: `word/_rels/document.xml.rels`
    /// for `word/document.xml`.
    pub fn rels_path_for(part: &str) -> String {
        PackURI::from_membername(part).rels_uri().membername().to_string()
    }

    pub fn relationships(&self, rels_path: &str) -> Option<&Relationships> {
        if !self.open {
            return None;
        }
        self.rels.get(rels_path)
    }

    /// Append a relationship to `rels_path` and return its new id.
    ///
    /// The list (and on save, its part) is created if it does not exist yet.
    pub fn add_relationship(
        &mut self,
        rels_path: &str,
        reltype: &str,
        target: &str,
        mode: TargetMode,
    ) -> Result<String> {
        if !self.open {
            return Err(OpcError::NotOpen);
        }
        Ok(self.rels.add(rels_path, reltype, target, mode))
    }

    pub fn remove_relationship(&mut self, rels_path: &str, id: &str) -> bool {
        self.open && self.rels.remove(rels_path, id)
    }

    pub fn find_relationship_id(&self, rels_path: &str, target: &str) -> Option<&str> {
        if !self.open {
            return None;
        }
        self.rels.find_id_by_target(rels_path, target)
    }
}

//! In-memory tree of every entry in a package.
//!
//! Nodes live in an arena and refer to each other by [`NodeId`]. A path index
//! maps each node's full path to its id and is kept in step with every
//! structural change. Removal is soft: a removed node keeps its place and
//! path but is flagged [`NodeFlags::DELETED`], so it is skipped on save and
//! by existence queries until the tree is cleared.

use std::borrow::Cow;
use std::collections::HashMap;

use bitflags::bitflags;
use smallvec::SmallVec;
use tracing::warn;

use crate::common::xml::XmlDocument;
use crate::ooxml::opc::error::{OpcError, Result};
use crate::ooxml::opc::media::content_type_for_name;

/// Handle to a node in a [`PackageTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

impl NodeId {
    pub const ROOT: NodeId = NodeId(0);
}

bitflags! {
    /// Mutation state of a node. The flags are independent of each other.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct NodeFlags: u8 {
        /// Content changed since load or the last save.
        const MODIFIED = 1;
        /// Created since load or the last save.
        const NEW = 1 << 1;
        /// Removed; excluded from save and existence queries.
        const DELETED = 1 << 2;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Root,
    Directory,
    XmlPart,
    MediaPart,
    BinaryPart,
}

/// A parsed XML part.
///
/// Parts read from an archive keep their original bytes so an untouched part
/// is written back exactly as it was read.
#[derive(Debug, Clone)]
pub struct XmlPart {
    document: XmlDocument,
    source: Option<Vec<u8>>,
}

impl XmlPart {
    pub fn new(document: XmlDocument) -> Self {
        Self {
            document,
            source: None,
        }
    }

    fn with_source(document: XmlDocument, source: Vec<u8>) -> Self {
        Self {
            document,
            source: Some(source),
        }
    }

    #[inline]
    pub fn document(&self) -> &XmlDocument {
        &self.document
    }
}

/// Payload of a node; exactly one per kind.
#[derive(Debug, Clone)]
pub enum NodeContent {
    Root,
    Directory,
    Xml(XmlPart),
    Media { bytes: Vec<u8>, content_type: String },
    Binary(Vec<u8>),
}

impl NodeContent {
    /// Classify a raw archive entry.
    ///
    /// Entries under `media_prefix` are media. `.xml` and `.rels` entries are
    /// parsed and fall back to binary when they are not well-formed. Anything
    /// else is binary.
    pub fn classify(path: &str, bytes: Vec<u8>, media_prefix: &str) -> Self {
        if path.starts_with(media_prefix) {
            return NodeContent::Media {
                content_type: content_type_for_name(path).to_string(),
                bytes,
            };
        }

        let lower = path.to_ascii_lowercase();
        if lower.ends_with(".xml") || lower.ends_with(".rels") {
            match XmlDocument::parse(&bytes) {
                Ok(document) => return NodeContent::Xml(XmlPart::with_source(document, bytes)),
                Err(e) => warn!(path, error = %e, "keeping unparsable XML part as binary"),
            }
        }
        NodeContent::Binary(bytes)
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            NodeContent::Root => NodeKind::Root,
            NodeContent::Directory => NodeKind::Directory,
            NodeContent::Xml(_) => NodeKind::XmlPart,
            NodeContent::Media { .. } => NodeKind::MediaPart,
            NodeContent::Binary(_) => NodeKind::BinaryPart,
        }
    }

    #[inline]
    fn is_file(&self) -> bool {
        !matches!(self, NodeContent::Root | NodeContent::Directory)
    }
}

#[derive(Debug, Clone)]
pub struct PackageNode {
    name: String,
    full_path: String,
    parent: Option<NodeId>,
    children: SmallVec<[NodeId; 8]>,
    content: NodeContent,
    flags: NodeFlags,
}

impl PackageNode {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn full_path(&self) -> &str {
        &self.full_path
    }

    #[inline]
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    #[inline]
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    #[inline]
    pub fn kind(&self) -> NodeKind {
        self.content.kind()
    }

    #[inline]
    pub fn content(&self) -> &NodeContent {
        &self.content
    }

    #[inline]
    pub fn flags(&self) -> NodeFlags {
        self.flags
    }

    #[inline]
    pub fn is_deleted(&self) -> bool {
        self.flags.contains(NodeFlags::DELETED)
    }

    #[inline]
    pub fn is_modified(&self) -> bool {
        self.flags.contains(NodeFlags::MODIFIED)
    }

    #[inline]
    pub fn is_new(&self) -> bool {
        self.flags.contains(NodeFlags::NEW)
    }

    #[inline]
    pub fn is_file(&self) -> bool {
        self.content.is_file()
    }

    pub fn xml(&self) -> Option<&XmlDocument> {
        match &self.content {
            NodeContent::Xml(part) => Some(&part.document),
            _ => None,
        }
    }

    /// Mutable document access. Callers are responsible for flagging the
    /// node as modified.
    pub(crate) fn xml_mut(&mut self) -> Option<&mut XmlDocument> {
        match &mut self.content {
            NodeContent::Xml(part) => Some(&mut part.document),
            _ => None,
        }
    }

    /// Raw bytes of a media or binary part.
    pub fn bytes(&self) -> Option<&[u8]> {
        match &self.content {
            NodeContent::Media { bytes, .. } | NodeContent::Binary(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Bytes to store in the archive for this node.
    pub fn to_bytes(&self) -> Cow<'_, [u8]> {
        match &self.content {
            NodeContent::Xml(part) => match &part.source {
                Some(source) if !self.is_modified() => Cow::Borrowed(source.as_slice()),
                _ => Cow::Owned(part.document.to_bytes()),
            },
            NodeContent::Media { bytes, .. } | NodeContent::Binary(bytes) => {
                Cow::Borrowed(bytes.as_slice())
            },
            NodeContent::Root | NodeContent::Directory => Cow::Borrowed(&[]),
        }
    }
}

/// Arena-backed package tree with an eager path index.
#[derive(Debug, Clone)]
pub struct PackageTree {
    nodes: Vec<PackageNode>,
    index: HashMap<String, NodeId>,
    media_prefix: String,
}

impl PackageTree {
    /// Create an empty tree. Entries under `media_dir` are classified as media.
    pub fn new(media_dir: &str) -> Self {
        let mut tree = Self {
            nodes: Vec::new(),
            index: HashMap::new(),
            media_prefix: format!("{}/", media_dir.trim_matches('/')),
        };
        tree.clear();
        tree
    }

    /// Drop every node except the root.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.nodes.push(PackageNode {
            name: String::new(),
            full_path: String::new(),
            parent: None,
            children: SmallVec::new(),
            content: NodeContent::Root,
            flags: NodeFlags::empty(),
        });
        self.index.clear();
        self.index.insert(String::new(), NodeId::ROOT);
    }

    #[inline]
    pub fn media_prefix(&self) -> &str {
        &self.media_prefix
    }

    #[inline]
    pub fn root(&self) -> &PackageNode {
        &self.nodes[NodeId::ROOT.0]
    }

    #[inline]
    pub fn get(&self, id: NodeId) -> &PackageNode {
        &self.nodes[id.0]
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, id: NodeId) -> &mut PackageNode {
        &mut self.nodes[id.0]
    }

    /// Look up a node by path, including soft-deleted nodes.
    pub fn find_id(&self, path: &str) -> Option<NodeId> {
        self.index.get(trim_path(path)).copied()
    }

    pub fn find(&self, path: &str) -> Option<&PackageNode> {
        self.find_id(path).map(|id| self.get(id))
    }

    /// Look up a node that has not been removed.
    pub fn find_live(&self, path: &str) -> Option<&PackageNode> {
        self.find(path).filter(|n| !n.is_deleted())
    }

    pub(crate) fn find_live_mut(&mut self, path: &str) -> Option<&mut PackageNode> {
        let id = self.find_id(path)?;
        let node = self.get_mut(id);
        (!node.is_deleted()).then_some(node)
    }

    /// True if a live file (not a directory) exists at `path`.
    pub fn is_live(&self, path: &str) -> bool {
        self.find_live(path).is_some_and(PackageNode::is_file)
    }

    /// Return the node at `path`, creating it and any missing parent
    /// directories.
    ///
    /// An existing live node is returned untouched. A soft-deleted node is
    /// revived with fresh content from `make`. A live file standing where a
    /// directory is needed is a [`OpcError::PathConflict`].
    pub fn find_or_create<F>(&mut self, path: &str, make: F) -> Result<NodeId>
    where
        F: FnOnce() -> NodeContent,
    {
        let path = trim_path(path);
        if path.is_empty() {
            return Ok(NodeId::ROOT);
        }

        if let Some(id) = self.find_id(path) {
            if !self.get(id).is_deleted() {
                return Ok(id);
            }
            let content = make();
            self.revive(id, content)?;
            return Ok(id);
        }

        let (parent_path, name) = match path.rsplit_once('/') {
            Some((parent, name)) => (parent, name),
            None => ("", path),
        };
        let parent = self.find_or_create_dir(parent_path)?;
        Ok(self.attach(parent, name, path.to_string(), make()))
    }

    /// Create or replace the file at `path`, flagging it as modified.
    pub fn upsert(&mut self, path: &str, content: NodeContent) -> Result<NodeId> {
        let mut content = Some(content);
        let id = self.find_or_create(path, || content.take().unwrap_or(NodeContent::Directory))?;
        if let Some(content) = content {
            // The node already existed and was live.
            self.replace_content(id, content)?;
        }
        Ok(id)
    }

    /// Replace a node's payload and flag it as modified.
    pub fn replace_content(&mut self, id: NodeId, content: NodeContent) -> Result<()> {
        let node = self.get(id);
        let has_live_children = node
            .children
            .iter()
            .any(|&child| !self.get(child).is_deleted());
        if content.is_file() && has_live_children {
            return Err(OpcError::PathConflict(format!(
                "'{}' is a directory",
                node.full_path
            )));
        }
        let node = self.get_mut(id);
        node.content = content;
        node.flags.insert(NodeFlags::MODIFIED);
        Ok(())
    }

    /// Classify raw archive bytes and insert them at `path`.
    pub fn add_entry_from_bytes(&mut self, path: &str, bytes: Vec<u8>) -> Result<NodeId> {
        let content = NodeContent::classify(trim_path(path), bytes, &self.media_prefix);
        let id = self.upsert(path, content)?;
        // Entries read from an archive are neither new nor modified.
        self.get_mut(id).flags = NodeFlags::empty();
        Ok(id)
    }

    fn find_or_create_dir(&mut self, path: &str) -> Result<NodeId> {
        let mut current = NodeId::ROOT;
        let mut current_path = String::new();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            if !current_path.is_empty() {
                current_path.push('/');
            }
            current_path.push_str(segment);

            current = match self.find_id(&current_path) {
                Some(id) => {
                    let node = self.get(id);
                    if node.is_deleted() {
                        self.revive(id, NodeContent::Directory)?;
                    } else if node.is_file() {
                        return Err(OpcError::PathConflict(format!(
                            "'{current_path}' is a file"
                        )));
                    }
                    id
                },
                None => self.attach(
                    current,
                    segment,
                    current_path.clone(),
                    NodeContent::Directory,
                ),
            };
        }
        Ok(current)
    }

    fn attach(
        &mut self,
        parent: NodeId,
        name: &str,
        full_path: String,
        content: NodeContent,
    ) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(PackageNode {
            name: name.to_string(),
            full_path: full_path.clone(),
            parent: Some(parent),
            children: SmallVec::new(),
            content,
            flags: NodeFlags::NEW | NodeFlags::MODIFIED,
        });
        self.nodes[parent.0].children.push(id);
        self.index.insert(full_path, id);
        id
    }

    fn revive(&mut self, id: NodeId, content: NodeContent) -> Result<()> {
        // Parents of a deleted node may be deleted too.
        if let Some(parent) = self.get(id).parent {
            let parent_path = self.get(parent).full_path.clone();
            self.find_or_create_dir(&parent_path)?;
        }
        let node = self.get_mut(id);
        node.content = content;
        node.flags = NodeFlags::NEW | NodeFlags::MODIFIED;
        Ok(())
    }

    /// Soft-delete the node at `path` and, for directories, everything below
    /// it. Returns false if there is no live node there.
    pub fn remove(&mut self, path: &str) -> bool {
        let Some(id) = self.find_id(path) else {
            return false;
        };
        if id == NodeId::ROOT || self.get(id).is_deleted() {
            return false;
        }

        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let node = self.get_mut(current);
            node.flags.insert(NodeFlags::DELETED);
            stack.extend(node.children.iter().copied());
        }
        true
    }

    /// Move a live node (and its subtree) to a new path.
    pub fn rename(&mut self, from: &str, to: &str) -> Result<NodeId> {
        let to = trim_path(to);
        let id = self
            .find_id(from)
            .filter(|&id| id != NodeId::ROOT && !self.get(id).is_deleted())
            .ok_or_else(|| OpcError::PartNotFound(from.to_string()))?;
        if to.is_empty() {
            return Err(OpcError::PathConflict("cannot rename to the root".to_string()));
        }
        if let Some(existing) = self.find_id(to) {
            if !self.get(existing).is_deleted() {
                return Err(OpcError::PathConflict(format!("'{to}' already exists")));
            }
            self.purge(existing);
        }

        let (parent_path, name) = to.rsplit_once('/').unwrap_or(("", to));
        let own_path = &self.get(id).full_path;
        if parent_path == own_path || parent_path.starts_with(&format!("{own_path}/")) {
            return Err(OpcError::PathConflict(format!(
                "cannot move '{from}' below itself"
            )));
        }
        let new_parent = self.find_or_create_dir(parent_path)?;

        if let Some(old_parent) = self.get(id).parent {
            self.nodes[old_parent.0].children.retain(|c| *c != id);
        }
        self.nodes[new_parent.0].children.push(id);
        let node = self.get_mut(id);
        node.parent = Some(new_parent);
        node.name = name.to_string();
        node.flags.insert(NodeFlags::NEW | NodeFlags::MODIFIED);

        // Re-key the moved subtree.
        let mut stack = vec![(id, to.to_string())];
        while let Some((current, path)) = stack.pop() {
            let old_path = std::mem::replace(&mut self.nodes[current.0].full_path, path.clone());
            if self.index.get(&old_path) == Some(&current) {
                self.index.remove(&old_path);
            }
            for &child in &self.nodes[current.0].children {
                stack.push((child, format!("{path}/{}", self.nodes[child.0].name)));
            }
            self.index.insert(path, current);
        }
        Ok(id)
    }

    // Detach a node from the tree entirely. Its arena slot stays but nothing
    // reaches it any more.
    fn purge(&mut self, id: NodeId) {
        if let Some(parent) = self.get(id).parent {
            self.nodes[parent.0].children.retain(|c| *c != id);
        }
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let node = &self.nodes[current.0];
            if self.index.get(&node.full_path) == Some(&current) {
                self.index.remove(&node.full_path);
            }
            stack.extend(node.children.iter().copied());
        }
    }

    /// Visit every live file node, depth first.
    pub fn iterate_files<F: FnMut(NodeId, &PackageNode)>(&self, mut visitor: F) {
        self.iterate_all(|id, node| {
            if node.is_file() {
                visitor(id, node);
            }
        });
    }

    /// Visit every live node including directories and the root, depth first.
    pub fn iterate_all<F: FnMut(NodeId, &PackageNode)>(&self, mut visitor: F) {
        let mut stack = vec![NodeId::ROOT];
        while let Some(id) = stack.pop() {
            let node = self.get(id);
            if node.is_deleted() {
                continue;
            }
            visitor(id, node);
            stack.extend(node.children.iter().rev().copied());
        }
    }

    /// Paths of every live file.
    pub fn live_file_paths(&self) -> Vec<String> {
        let mut paths = Vec::new();
        self.iterate_files(|_, node| paths.push(node.full_path.clone()));
        paths
    }

    pub fn live_file_count(&self) -> usize {
        let mut count = 0;
        self.iterate_files(|_, _| count += 1);
        count
    }

    /// Rebuild the path index from the tree structure.
    pub fn rebuild_path_index(&mut self) {
        self.index.clear();
        let mut stack = vec![NodeId::ROOT];
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id.0];
            self.index.insert(node.full_path.clone(), id);
            stack.extend(node.children.iter().copied());
        }
    }

    /// Flag a live node as modified.
    pub fn mark_modified(&mut self, path: &str) -> bool {
        match self.find_live_mut(path) {
            Some(node) => {
                node.flags.insert(NodeFlags::MODIFIED);
                true
            },
            None => false,
        }
    }

    /// Record a successful save: XML parts adopt their serialized form as
    /// their source bytes and the modified/new flags are cleared.
    pub(crate) fn commit_saved(&mut self) {
        for node in &mut self.nodes {
            if node.is_deleted() {
                continue;
            }
            if node.is_modified()
                && let NodeContent::Xml(part) = &mut node.content
            {
                part.source = Some(part.document.to_bytes());
            }
            node.flags.remove(NodeFlags::MODIFIED | NodeFlags::NEW);
        }
    }
}

#[inline]
fn trim_path(path: &str) -> &str {
    path.trim_matches('/')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::xml::XmlElement;

    fn xml(root: &str) -> NodeContent {
        NodeContent::Xml(XmlPart::new(XmlDocument::new(XmlElement::new(root))))
    }

    #[test]
    fn test_find_or_create_builds_directories() {
        let mut tree = PackageTree::new("word/media");
        let id = tree.find_or_create("word/theme/theme1.xml", || xml("a:theme")).unwrap();
        assert_eq!(tree.get(id).full_path(), "word/theme/theme1.xml");
        assert_eq!(tree.get(id).name(), "theme1.xml");
        assert_eq!(tree.find("word").unwrap().kind(), NodeKind::Directory);
        assert_eq!(tree.find("word/theme").unwrap().kind(), NodeKind::Directory);

        // Second call returns the same node without building a new payload.
        let again = tree
            .find_or_create("/word/theme/theme1.xml", || panic!("should not be called"))
            .unwrap();
        assert_eq!(id, again);
    }

    #[test]
    fn test_file_used_as_directory_conflicts() {
        let mut tree = PackageTree::new("word/media");
        tree.upsert("word/document.xml", xml("w:document")).unwrap();
        let err = tree.find_or_create("word/document.xml/x.xml", || xml("x"));
        assert!(matches!(err, Err(OpcError::PathConflict(_))));
    }

    #[test]
    fn test_classification() {
        let mut tree = PackageTree::new("word/media");
        let id = tree.add_entry_from_bytes("word/media/image1.PNG", vec![1, 2, 3]).unwrap();
        assert_eq!(tree.get(id).kind(), NodeKind::MediaPart);
        match tree.get(id).content() {
            NodeContent::Media { content_type, .. } => assert_eq!(content_type, "image/png"),
            other => panic!("unexpected content {other:?}"),
        }

        let id = tree.add_entry_from_bytes("word/document.xml", b"<w:document/>".to_vec()).unwrap();
        assert_eq!(tree.get(id).kind(), NodeKind::XmlPart);
        assert!(tree.get(id).flags().is_empty());

        let id = tree.add_entry_from_bytes("word/broken.xml", b"<a><b></a>".to_vec()).unwrap();
        assert_eq!(tree.get(id).kind(), NodeKind::BinaryPart);
        assert_eq!(tree.get(id).bytes(), Some(&b"<a><b></a>"[..]));

        let id = tree.add_entry_from_bytes("word/vbaData.bin", vec![0xff]).unwrap();
        assert_eq!(tree.get(id).kind(), NodeKind::BinaryPart);
    }

    #[test]
    fn test_untouched_xml_keeps_source_bytes() {
        let mut tree = PackageTree::new("word/media");
        let raw = b"<a  x='1'><b/></a>".to_vec();
        let id = tree.add_entry_from_bytes("a.xml", raw.clone()).unwrap();
        assert_eq!(tree.get(id).to_bytes().as_ref(), raw.as_slice());

        tree.mark_modified("a.xml");
        assert_eq!(tree.get(id).to_bytes().as_ref(), b"<a x=\"1\"><b/></a>".as_slice());
    }

    #[test]
    fn test_soft_delete_visibility() {
        let mut tree = PackageTree::new("word/media");
        tree.upsert("word/numbering.xml", xml("w:numbering")).unwrap();
        tree.upsert("word/styles.xml", xml("w:styles")).unwrap();

        assert!(tree.remove("word/numbering.xml"));
        assert!(!tree.remove("word/numbering.xml"));
        assert!(!tree.is_live("word/numbering.xml"));
        assert!(tree.find("word/numbering.xml").unwrap().is_deleted());
        assert_eq!(tree.live_file_paths(), vec!["word/styles.xml".to_string()]);

        // Re-creating the path revives the node.
        tree.upsert("word/numbering.xml", xml("w:numbering")).unwrap();
        assert!(tree.is_live("word/numbering.xml"));
        assert!(tree.find("word/numbering.xml").unwrap().is_new());
    }

    #[test]
    fn test_remove_directory_cascades() {
        let mut tree = PackageTree::new("word/media");
        tree.upsert("word/media/a.png", NodeContent::Binary(vec![1])).unwrap();
        tree.upsert("word/media/b.png", NodeContent::Binary(vec![2])).unwrap();
        assert!(tree.remove("word/media"));
        assert_eq!(tree.live_file_count(), 0);
        assert!(!tree.remove(""));
    }

    #[test]
    fn test_rename_moves_subtree() {
        let mut tree = PackageTree::new("word/media");
        tree.upsert("word/media/a.png", NodeContent::Binary(vec![1])).unwrap();
        tree.rename("word/media", "word/images").unwrap();
        assert!(tree.find("word/media/a.png").is_none());
        let moved = tree.find_live("word/images/a.png").unwrap();
        assert_eq!(moved.full_path(), "word/images/a.png");

        tree.upsert("x.xml", xml("x")).unwrap();
        assert!(matches!(
            tree.rename("x.xml", "word/images/a.png"),
            Err(OpcError::PathConflict(_))
        ));
        assert!(matches!(tree.rename("nope.xml", "y.xml"), Err(OpcError::PartNotFound(_))));
    }

    #[test]
    fn test_rebuild_index_matches_eager_index() {
        let mut tree = PackageTree::new("word/media");
        for path in ["a.xml", "word/document.xml", "word/_rels/document.xml.rels"] {
            tree.upsert(path, xml("r")).unwrap();
        }
        tree.remove("a.xml");
        let before: Vec<_> = {
            let mut v: Vec<_> = tree.index.iter().map(|(k, v)| (k.clone(), *v)).collect();
            v.sort_by(|a, b| a.0.cmp(&b.0));
            v
        };
        tree.rebuild_path_index();
        let mut after: Vec<_> = tree.index.iter().map(|(k, v)| (k.clone(), *v)).collect();
        after.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(before, after);
    }

    #[test]
    fn test_commit_saved_clears_flags() {
        let mut tree = PackageTree::new("word/media");
        let id = tree.upsert("word/document.xml", xml("w:document")).unwrap();
        assert!(tree.get(id).is_new() && tree.get(id).is_modified());
        tree.commit_saved();
        assert!(tree.get(id).flags().is_empty());
    }
}

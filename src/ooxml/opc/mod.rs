/// Open Packaging Conventions (OPC) implementation.
///
/// A package is held as a tree of its ZIP entries plus two side tables that
/// are kept consistent with it on every mutation:
///
/// - Package tree: every entry, XML parts parsed, everything else as bytes
/// - Relationship tables: one list per `.rels` part
/// - Content-type table: `[Content_Types].xml` defaults and overrides
///
/// `OpcPackage` drives the load / mutate / save lifecycle over them.
pub mod config;
pub mod constants;
pub mod content_types;
pub mod error;
pub mod media;
pub mod package;
pub mod packuri;
pub mod phys_pkg;
pub mod rel;
pub mod tree;

// Re-export commonly used types
pub use config::{Compression, PackageOptions};
pub use content_types::ContentTypeTable;
pub use error::{OpcError, Result};
pub use media::{content_type_for_name, is_supported_media};
pub use package::OpcPackage;
pub use packuri::PackURI;
pub use rel::{Relationship, RelationshipTables, Relationships, TargetMode};
pub use tree::{NodeContent, NodeFlags, NodeId, NodeKind, PackageNode, PackageTree, XmlPart};

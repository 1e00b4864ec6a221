//! Quince - an in-memory model and mutation engine for Word `.docx` packages
//!
//! A package is loaded whole into a tree of parts. XML parts are parsed into
//! an editable DOM, media and other binaries are kept as bytes, and the
//! relationship and content-type bookkeeping is maintained alongside every
//! edit. Saving writes a fresh archive next to the destination and
//! atomically replaces it, so untouched parts round-trip byte for byte.
//!
//! # Features
//!
//! - **Package layer**: parts, relationships, content types, media
//! - **Word layer**: paragraphs, runs, formatting, tables
//! - **Templates**: `{{key}}` substitution, including placeholders split
//!   across runs
//!
//! # Example - Editing a DOCX file
//!
//! ```no_run
//! use quince::ooxml::docx::{Document, ParagraphAlignment, RunFormat};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut doc = Document::open("document.docx")?;
//!
//! // Extract all text
//! println!("Document text: {}", doc.text());
//!
//! // Append a centred, bold heading
//! let mut para = doc.add_paragraph("")?;
//! para.set_alignment(ParagraphAlignment::Center);
//! para.add_run("Appendix", RunFormat::BOLD);
//!
//! doc.save()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Example - Low-level package access
//!
//! ```no_run
//! use quince::ooxml::opc::OpcPackage;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut pkg = OpcPackage::new();
//! pkg.open("document.docx")?;
//!
//! // List all parts
//! for path in pkg.part_paths() {
//!     println!("Part: {} ({:?})", path, pkg.content_type_of(&path));
//! }
//!
//! // Embed an image and relate it to the main document
//! let (name, rel_id) = pkg.add_media_with_relationship(std::fs::read("logo.png")?, "logo.png")?;
//! println!("Stored {name} as {rel_id}");
//! pkg.save()?;
//! # Ok(())
//! # }
//! ```

/// Shared XML utilities
pub mod common;

/// OOXML (Office Open XML) packages and Word content
pub mod ooxml;

// Re-export commonly used types for convenience
pub use ooxml::docx::{Document, Template};
pub use ooxml::opc::{OpcError, OpcPackage, PackageOptions};
pub use ooxml::{OoxmlError, Result};

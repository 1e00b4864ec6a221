//! Office Open XML (OOXML) word-processing packages.
//!
//! The module is organized into two layers:
//!
//! 1. **OPC Layer** (`opc`): the package tree, relationships, content types,
//!    media and the load / save lifecycle
//! 2. **Word Layer** (`docx`): paragraphs, runs, tables and templates on top
//!    of the main document part
//!
//! # Example: Working with Word Documents
//!
//! ```rust,no_run
//! use quince::ooxml::docx::Document;
//!
//! let mut doc = Document::open("document.docx")?;
//! println!("Document contains {} paragraphs", doc.paragraph_count());
//!
//! doc.add_paragraph("Appended on the way through")?;
//! doc.save()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
pub mod docx;
pub mod error;
pub mod opc;

// Re-export commonly used types from OPC layer
pub use opc::{OpcPackage, PackURI, PackageOptions};

// Re-export error types
pub use error::{OoxmlError, Result};

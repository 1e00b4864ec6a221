/// Word (.docx) document support.
///
/// Content-level access on top of the package layer in [`crate::ooxml::opc`].
///
/// # Architecture
///
/// The module is organized around these key types:
/// - `Document`: owns the package and exposes the body
/// - `Paragraph` / `ParagraphMut`: a paragraph with runs
/// - `Run` / `RunMut`: a text run with formatting
/// - `Table` / `TableMut`: a table with rows and cells
/// - `Template`: `{{key}}` placeholder substitution
///
/// # Example
///
/// ```rust,no_run
/// use quince::ooxml::docx::Document;
///
/// let doc = Document::open("document.docx")?;
///
/// // Access paragraphs and runs
/// for para in doc.paragraphs() {
///     println!("Paragraph: {}", para.text());
///     for run in para.runs() {
///         println!("  Run: {} (bold: {})", run.text(), run.is_bold());
///     }
/// }
///
/// // Access tables
/// for table in doc.tables() {
///     for row in table.rows() {
///         for cell in row.cells() {
///             println!("Cell: {}", cell.text());
///         }
///     }
/// }
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub mod document;
pub mod format;
pub mod paragraph;
pub mod skeleton;
pub mod table;
pub mod template;

pub use document::{Document, SharedDocument};
pub use format::{Indentation, LineSpacing, ParagraphAlignment, RunFormat, UnderlineStyle};
pub use paragraph::{Paragraph, ParagraphMut, Run, RunMut};
pub use table::{Cell, CellMut, Row, Table, TableMut};
pub use template::Template;

/// Document - the main API for working with Word document content.
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::common::xml::{XmlDocument, XmlElement, XmlNode};
use crate::ooxml::docx::paragraph::{PARAGRAPH, Paragraph, ParagraphMut};
use crate::ooxml::docx::table::{self, TABLE, Table, TableMut};
use crate::ooxml::error::{OoxmlError, Result};
use crate::ooxml::opc::constants::relationship_type;
use crate::ooxml::opc::{OpcPackage, PackURI, PackageOptions};

const BODY: &str = "w:body";
const SECTION_PROPERTIES: &str = "w:sectPr";

/// A [`Document`] behind one exclusive lock, for use across threads.
pub type SharedDocument = Arc<Mutex<Document>>;

/// A Word document.
///
/// This is the main API for reading and manipulating Word document content.
/// It owns the underlying [`OpcPackage`]; every edit made through it is
/// written out by [`save`](Self::save).
///
/// A package without a readable main document behaves as an empty document:
/// queries return nothing and body edits fail with
/// [`OoxmlError::PartNotFound`].
///
/// # Examples
///
/// ```rust,no_run
/// use quince::ooxml::docx::{Document, RunFormat};
///
/// let mut doc = Document::create(Some("report.docx"))?;
/// doc.add_paragraph("Quarterly report")?
///     .add_run(" (draft)", RunFormat::ITALIC);
///
/// let mut table = doc.add_table(2, 2)?;
/// if let Some(mut cell) = table.cell_mut(0, 0) {
///     cell.set_text("Revenue");
/// }
/// doc.save()?;
///
/// println!("{}", doc.text());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Default)]
pub struct Document {
    package: OpcPackage,
}

impl Document {
    /// Open an existing `.docx` file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_options(path, PackageOptions::default())
    }

    pub fn open_with_options<P: AsRef<Path>>(path: P, options: PackageOptions) -> Result<Self> {
        let mut package = OpcPackage::with_options(options);
        package.open(path)?;
        Ok(Self { package })
    }

    /// Create a new document holding one empty paragraph.
    ///
    /// # Arguments
    /// * `path` - Where [`save`](Self::save) writes; `None` requires
    ///   [`save_as`](Self::save_as)
    pub fn create<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        Self::create_with_options(path, PackageOptions::default())
    }

    pub fn create_with_options<P: AsRef<Path>>(path: Option<P>, options: PackageOptions) -> Result<Self> {
        let mut package = OpcPackage::with_options(options);
        package.create_empty(path)?;
        Ok(Self { package })
    }

    /// Wrap an already opened package.
    #[inline]
    pub fn from_package(package: OpcPackage) -> Self {
        Self { package }
    }

    pub fn save(&mut self) -> Result<()> {
        Ok(self.package.save()?)
    }

    pub fn save_as<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        Ok(self.package.save_as(path)?)
    }

    pub fn close(&mut self) {
        self.package.close();
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.package.is_open()
    }

    #[inline]
    pub fn package(&self) -> &OpcPackage {
        &self.package
    }

    /// Direct access to the package for part, media and relationship work.
    #[inline]
    pub fn package_mut(&mut self) -> &mut OpcPackage {
        &mut self.package
    }

    #[inline]
    pub fn into_package(self) -> OpcPackage {
        self.package
    }

    /// Move the document behind an `Arc<Mutex<_>>`.
    pub fn into_shared(self) -> SharedDocument {
        Arc::new(Mutex::new(self))
    }

    // ---------------------------------------------------------------------
    // Body
    // ---------------------------------------------------------------------

    fn body(&self) -> Option<&XmlElement> {
        self.package.main_document()?.root().child(BODY)
    }

    // Handing out the body flags the main part as modified, so every caller
    // checks its target on the read-only body first.
    fn body_mut(&mut self) -> Result<&mut XmlElement> {
        if self.body().is_none() {
            return Err(OoxmlError::PartNotFound("main document body".to_string()));
        }
        self.package
            .main_document_mut()
            .and_then(|doc| doc.root_mut().child_mut(BODY))
            .ok_or_else(|| OoxmlError::PartNotFound("main document body".to_string()))
    }

    fn has_block(&self, name: &str, index: usize) -> bool {
        self.body()
            .is_some_and(|body| body.position_of(name, index).is_some())
    }

    /// Top-level body paragraphs in document order.
    pub fn paragraphs(&self) -> Vec<Paragraph<'_>> {
        self.body()
            .map(|body| body.children_named(PARAGRAPH).map(Paragraph::new).collect())
            .unwrap_or_default()
    }

    pub fn paragraph_count(&self) -> usize {
        self.body()
            .map_or(0, |body| body.children_named(PARAGRAPH).count())
    }

    /// Top-level body tables in document order.
    pub fn tables(&self) -> Vec<Table<'_>> {
        self.body()
            .map(|body| body.children_named(TABLE).map(Table::new).collect())
            .unwrap_or_default()
    }

    pub fn table_count(&self) -> usize {
        self.body().map_or(0, |body| body.children_named(TABLE).count())
    }

    /// All body text: one line per paragraph, tables rendered with
    /// [`Table::text`].
    pub fn text(&self) -> String {
        let Some(body) = self.body() else {
            return String::new();
        };
        body.elements()
            .filter_map(|element| match element.name() {
                PARAGRAPH => Some(Paragraph::new(element).text()),
                TABLE => Some(Table::new(element).text()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn paragraph_mut(&mut self, index: usize) -> Option<ParagraphMut<'_>> {
        if !self.has_block(PARAGRAPH, index) {
            return None;
        }
        self.body_mut()
            .ok()?
            .children_named_mut(PARAGRAPH)
            .nth(index)
            .map(ParagraphMut::new)
    }

    pub fn table_mut(&mut self, index: usize) -> Option<TableMut<'_>> {
        if !self.has_block(TABLE, index) {
            return None;
        }
        self.body_mut()
            .ok()?
            .children_named_mut(TABLE)
            .nth(index)
            .map(TableMut::new)
    }

    /// Append a paragraph at the end of the body, ahead of the final
    /// section properties.
    pub fn add_paragraph(&mut self, text: &str) -> Result<ParagraphMut<'_>> {
        let body = self.body_mut()?;
        let index = content_end(body);
        let mut paragraph = ParagraphMut::new(body.insert(index, XmlElement::new(PARAGRAPH)));
        paragraph.set_text(text);
        Ok(paragraph)
    }

    /// Insert a paragraph directly after the top-level paragraph at `index`.
    pub fn insert_paragraph_after(&mut self, index: usize, text: &str) -> Result<ParagraphMut<'_>> {
        if self.body().is_some() && !self.has_block(PARAGRAPH, index) {
            return Err(OoxmlError::OutOfRange { kind: "paragraph", index });
        }
        let body = self.body_mut()?;
        let position = body
            .position_of(PARAGRAPH, index)
            .ok_or(OoxmlError::OutOfRange { kind: "paragraph", index })?;
        let mut paragraph = ParagraphMut::new(body.insert(position + 1, XmlElement::new(PARAGRAPH)));
        paragraph.set_text(text);
        Ok(paragraph)
    }

    pub fn remove_paragraph(&mut self, index: usize) -> bool {
        if !self.has_block(PARAGRAPH, index) {
            return false;
        }
        let Ok(body) = self.body_mut() else {
            return false;
        };
        match body.position_of(PARAGRAPH, index) {
            Some(position) => body.remove(position).is_some(),
            None => false,
        }
    }

    /// Append an empty `rows` x `cols` table at the end of the body.
    pub fn add_table(&mut self, rows: usize, cols: usize) -> Result<TableMut<'_>> {
        let body = self.body_mut()?;
        let index = content_end(body);
        Ok(TableMut::new(body.insert(index, table::new_table_element(rows, cols))))
    }

    pub fn remove_table(&mut self, index: usize) -> bool {
        if !self.has_block(TABLE, index) {
            return false;
        }
        let Ok(body) = self.body_mut() else {
            return false;
        };
        match body.position_of(TABLE, index) {
            Some(position) => body.remove(position).is_some(),
            None => false,
        }
    }

    /// Copy the top-level paragraphs and tables of `source` into this
    /// document.
    ///
    /// The copies go before the block (paragraph or table) at `position`, or
    /// at the end of the body when `position` is `None` or past the last
    /// block. Relationship ids inside the copies are kept as they are, so
    /// images and hyperlinks of `source` are not carried across.
    ///
    /// Returns the number of blocks copied.
    pub fn insert_document(&mut self, source: &Document, position: Option<usize>) -> Result<usize> {
        let blocks: Vec<XmlElement> = source
            .body()
            .map(|body| body.elements().filter(|e| is_block(e)).cloned().collect())
            .unwrap_or_default();

        let body = self.body_mut()?;
        let mut index = position
            .and_then(|n| {
                body.children()
                    .iter()
                    .enumerate()
                    .filter(|(_, node)| node.as_element().is_some_and(is_block))
                    .nth(n)
                    .map(|(i, _)| i)
            })
            .unwrap_or_else(|| content_end(body));

        let count = blocks.len();
        for block in blocks {
            body.insert(index, block);
            index += 1;
        }
        Ok(count)
    }

    // ---------------------------------------------------------------------
    // Related parts
    // ---------------------------------------------------------------------

    /// Paths of the parts the main document relates to with `reltype`.
    fn related_part_paths(&self, reltype: &str) -> Vec<String> {
        let Some(main) = self.package.main_document_path() else {
            return Vec::new();
        };
        let Some(rels) = self.package.relationships(&OpcPackage::rels_path_for(&main)) else {
            return Vec::new();
        };
        let main_uri = PackURI::from_membername(&main);
        rels.iter()
            .filter(|rel| rel.reltype() == reltype && !rel.is_external())
            .filter_map(|rel| rel.target_partname(main_uri.base_uri()))
            .map(|uri| uri.membername().to_string())
            .filter(|path| self.package.has_xml_part(path))
            .collect()
    }

    fn related_part(&self, reltype: &str) -> Option<&XmlDocument> {
        let path = self.related_part_paths(reltype).into_iter().next()?;
        self.package.xml_part(&path)
    }

    pub fn styles(&self) -> Option<&XmlDocument> {
        self.related_part(relationship_type::STYLES)
    }

    pub fn settings(&self) -> Option<&XmlDocument> {
        self.related_part(relationship_type::SETTINGS)
    }

    pub fn numbering(&self) -> Option<&XmlDocument> {
        self.related_part(relationship_type::NUMBERING)
    }

    /// Paths of every header part, e.g. `word/header1.xml`.
    pub fn header_paths(&self) -> Vec<String> {
        self.related_part_paths(relationship_type::HEADER)
    }

    /// Paths of every footer part.
    pub fn footer_paths(&self) -> Vec<String> {
        self.related_part_paths(relationship_type::FOOTER)
    }

    /// Ids of the styles defined in the styles part.
    pub fn style_ids(&self) -> Vec<&str> {
        self.styles()
            .map(|styles| {
                styles
                    .root()
                    .children_named("w:style")
                    .filter_map(|style| style.attr("w:styleId"))
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn is_block(element: &XmlElement) -> bool {
    matches!(element.name(), PARAGRAPH | TABLE)
}

/// Child index where new body content goes: before a trailing `w:sectPr`,
/// otherwise at the end.
fn content_end(body: &XmlElement) -> usize {
    let children = body.children();
    let last_element = children.iter().rposition(|node| matches!(node, XmlNode::Element(_)));
    match last_element {
        Some(pos) if children[pos].as_element().is_some_and(|e| e.name() == SECTION_PROPERTIES) => pos,
        _ => children.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ooxml::docx::format::{ParagraphAlignment, RunFormat};
    use crate::ooxml::opc::TargetMode;
    use crate::ooxml::opc::constants::content_type;
    use std::io::Write;

    fn last_body_element(doc: &Document) -> String {
        doc.body()
            .and_then(|body| body.elements().last())
            .map(|e| e.name().to_string())
            .unwrap_or_default()
    }

    #[test]
    fn test_new_document_has_one_empty_paragraph() {
        let doc = Document::create(None::<&Path>).unwrap();
        assert_eq!(doc.paragraph_count(), 1);
        assert_eq!(doc.text(), "");
        assert_eq!(doc.table_count(), 0);
        assert!(doc.styles().is_some());
        assert!(doc.settings().is_some());
        assert!(doc.numbering().is_none());
        assert_eq!(doc.style_ids(), vec!["Normal"]);
    }

    #[test]
    fn test_build_save_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("built.docx");

        let mut doc = Document::create(Some(&path)).unwrap();
        {
            let mut title = doc.add_paragraph("Title").unwrap();
            title.set_alignment(ParagraphAlignment::Center);
            title.run_mut(0).unwrap().set_bold(true).set_font_size(16.0);
        }
        doc.add_paragraph("Body text").unwrap()
            .add_run(" continued", RunFormat::ITALIC);
        {
            let mut table = doc.add_table(2, 2).unwrap();
            table.cell_mut(0, 0).unwrap().set_text("a");
            table.cell_mut(1, 1).unwrap().set_text("d");
        }
        assert_eq!(last_body_element(&doc), SECTION_PROPERTIES);
        doc.save().unwrap();

        let reopened = Document::open(&path).unwrap();
        assert_eq!(reopened.paragraph_count(), 3);
        let paragraphs = reopened.paragraphs();
        assert_eq!(paragraphs[1].text(), "Title");
        assert_eq!(paragraphs[1].alignment(), Some(ParagraphAlignment::Center));
        assert!(paragraphs[1].runs()[0].is_bold());
        assert_eq!(paragraphs[1].runs()[0].font_size(), Some(16.0));
        assert_eq!(paragraphs[2].text(), "Body text continued");
        assert!(paragraphs[2].runs()[1].is_italic());

        let tables = reopened.tables();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].text(), "a\t\n\td");
        assert_eq!(reopened.text(), "\nTitle\nBody text continued\na\t\n\td");
        assert_eq!(last_body_element(&reopened), SECTION_PROPERTIES);
    }

    #[test]
    fn test_missed_lookups_leave_main_part_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clean.docx");
        Document::create(Some(&path)).unwrap().save().unwrap();

        let mut doc = Document::open(&path).unwrap();
        let main = "word/document.xml";
        assert!(doc.paragraph_mut(99).is_none());
        assert!(doc.table_mut(0).is_none());
        assert!(!doc.remove_paragraph(99));
        assert!(!doc.remove_table(0));
        assert!(matches!(
            doc.insert_paragraph_after(99, "x"),
            Err(OoxmlError::OutOfRange { kind: "paragraph", index: 99 })
        ));
        assert!(!doc.package().part(main).unwrap().is_modified());

        assert!(doc.paragraph_mut(0).is_some());
        assert!(doc.package().part(main).unwrap().is_modified());
    }

    #[test]
    fn test_insert_and_remove_paragraphs() {
        let mut doc = Document::create(None::<&Path>).unwrap();
        doc.paragraph_mut(0).unwrap().set_text("one");
        doc.add_paragraph("three").unwrap();
        doc.insert_paragraph_after(0, "two").unwrap();
        let texts: Vec<String> = doc.paragraphs().iter().map(Paragraph::text).collect();
        assert_eq!(texts, ["one", "two", "three"]);

        assert!(matches!(
            doc.insert_paragraph_after(9, "x"),
            Err(OoxmlError::OutOfRange { kind: "paragraph", index: 9 })
        ));

        assert!(doc.remove_paragraph(1));
        assert!(!doc.remove_paragraph(5));
        assert_eq!(doc.text(), "one\nthree");

        doc.add_table(1, 1).unwrap();
        assert!(doc.table_mut(0).is_some());
        assert!(doc.remove_table(0));
        assert!(!doc.remove_table(0));
    }

    #[test]
    fn test_insert_document_blocks() {
        let mut source = Document::create(None::<&Path>).unwrap();
        source.paragraph_mut(0).unwrap().set_text("s1");
        source.add_table(1, 1).unwrap().cell_mut(0, 0).unwrap().set_text("t");

        let mut target = Document::create(None::<&Path>).unwrap();
        target.paragraph_mut(0).unwrap().set_text("a");
        target.add_paragraph("b").unwrap();

        assert_eq!(target.insert_document(&source, Some(1)).unwrap(), 2);
        assert_eq!(target.text(), "a\ns1\nt\nb");

        assert_eq!(target.insert_document(&source, None).unwrap(), 2);
        assert_eq!(target.text(), "a\ns1\nt\nb\ns1\nt");
        assert_eq!(target.table_count(), 2);
        assert_eq!(last_body_element(&target), SECTION_PROPERTIES);
    }

    #[test]
    fn test_package_without_main_document_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bare.docx");
        {
            let file = std::fs::File::create(&path).unwrap();
            let mut zip = zip::ZipWriter::new(file);
            let options = zip::write::SimpleFileOptions::default();
            zip.start_file("[Content_Types].xml", options).unwrap();
            zip.write_all(
                br#"<?xml version="1.0" encoding="UTF-8"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"/>"#,
            )
            .unwrap();
            zip.finish().unwrap();
        }

        let mut doc = Document::open(&path).unwrap();
        assert!(doc.is_open());
        assert!(doc.paragraphs().is_empty());
        assert_eq!(doc.text(), "");
        assert!(doc.paragraph_mut(0).is_none());
        assert!(matches!(
            doc.add_paragraph("x"),
            Err(OoxmlError::PartNotFound(_))
        ));
        assert!(!doc.remove_paragraph(0));
    }

    #[test]
    fn test_header_and_footer_paths() {
        let mut doc = Document::create(None::<&Path>).unwrap();
        let header = XmlDocument::parse(
            br#"<w:hdr xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:p/></w:hdr>"#,
        )
        .unwrap();
        let package = doc.package_mut();
        package
            .create_xml_part("word/header1.xml", header, Some(content_type::WML_HEADER))
            .unwrap();
        package
            .add_relationship(
                "word/_rels/document.xml.rels",
                relationship_type::HEADER,
                "header1.xml",
                TargetMode::Internal,
            )
            .unwrap();

        assert_eq!(doc.header_paths(), vec!["word/header1.xml".to_string()]);
        assert!(doc.footer_paths().is_empty());
    }

    #[test]
    fn test_shared_document_across_threads() {
        let shared = Document::create(None::<&Path>).unwrap().into_shared();
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let shared = Arc::clone(&shared);
                std::thread::spawn(move || {
                    shared.lock().add_paragraph(&format!("line {i}")).map(|_| ()).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(shared.lock().paragraph_count(), 5);
    }

    #[test]
    fn test_closed_document() {
        let mut doc = Document::create(None::<&Path>).unwrap();
        doc.close();
        assert!(!doc.is_open());
        assert!(doc.paragraphs().is_empty());
        assert!(doc.save().is_ok());
        assert!(doc.add_table(1, 1).is_err());
    }
}

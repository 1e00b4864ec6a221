//! Tables (`w:tbl`), their rows (`w:tr`) and cells (`w:tc`).
use crate::common::xml::XmlElement;
use crate::ooxml::docx::paragraph::{PARAGRAPH, Paragraph, ParagraphMut};

pub(crate) const TABLE: &str = "w:tbl";
const ROW: &str = "w:tr";
const CELL: &str = "w:tc";

/// Width of a text column on the default A4 page, in twips.
const TEXT_WIDTH: u32 = 8306;

/// A table in a Word document.
#[derive(Debug, Clone, Copy)]
pub struct Table<'a> {
    element: &'a XmlElement,
}

impl<'a> Table<'a> {
    pub(crate) fn new(element: &'a XmlElement) -> Self {
        Self { element }
    }

    #[inline]
    pub fn element(&self) -> &'a XmlElement {
        self.element
    }

    pub fn rows(&self) -> Vec<Row<'a>> {
        self.element.children_named(ROW).map(|element| Row { element }).collect()
    }

    pub fn row_count(&self) -> usize {
        self.element.children_named(ROW).count()
    }

    /// Number of grid columns, or the widest row when the grid is missing.
    pub fn column_count(&self) -> usize {
        match self.element.child("w:tblGrid") {
            Some(grid) => grid.children_named("w:gridCol").count(),
            None => self.rows().iter().map(Row::cell_count).max().unwrap_or(0),
        }
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<Cell<'a>> {
        self.element
            .children_named(ROW)
            .nth(row)?
            .children_named(CELL)
            .nth(col)
            .map(|element| Cell { element })
    }

    /// Cell texts, tab-separated within a row and newline-separated between
    /// rows.
    pub fn text(&self) -> String {
        self.rows()
            .iter()
            .map(|row| {
                row.cells()
                    .iter()
                    .map(Cell::text)
                    .collect::<Vec<_>>()
                    .join("\t")
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A table row.
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    element: &'a XmlElement,
}

impl<'a> Row<'a> {
    pub fn cells(&self) -> Vec<Cell<'a>> {
        self.element.children_named(CELL).map(|element| Cell { element }).collect()
    }

    pub fn cell_count(&self) -> usize {
        self.element.children_named(CELL).count()
    }
}

/// A table cell.
#[derive(Debug, Clone, Copy)]
pub struct Cell<'a> {
    element: &'a XmlElement,
}

impl<'a> Cell<'a> {
    pub fn paragraphs(&self) -> Vec<Paragraph<'a>> {
        self.element.children_named(PARAGRAPH).map(Paragraph::new).collect()
    }

    /// Paragraph texts joined with newlines.
    pub fn text(&self) -> String {
        self.paragraphs()
            .iter()
            .map(Paragraph::text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Tables nested in this cell.
    pub fn tables(&self) -> Vec<Table<'a>> {
        self.element.children_named(TABLE).map(Table::new).collect()
    }
}

/// Editable table.
#[derive(Debug)]
pub struct TableMut<'a> {
    element: &'a mut XmlElement,
}

impl<'a> TableMut<'a> {
    pub(crate) fn new(element: &'a mut XmlElement) -> Self {
        Self { element }
    }

    pub fn as_table(&self) -> Table<'_> {
        Table::new(self.element)
    }

    pub fn cell_mut(&mut self, row: usize, col: usize) -> Option<CellMut<'_>> {
        self.element
            .children_named_mut(ROW)
            .nth(row)?
            .children_named_mut(CELL)
            .nth(col)
            .map(|element| CellMut { element })
    }

    /// Append a row with one empty cell per grid column.
    pub fn add_row(&mut self) -> usize {
        let cols = self.as_table().column_count().max(1);
        let width = column_width(cols);
        self.element.append(new_row(cols, width));
        self.as_table().row_count() - 1
    }

    /// Remove the row at `index`.
    pub fn remove_row(&mut self, index: usize) -> bool {
        match self.element.position_of(ROW, index) {
            Some(pos) => self.element.remove(pos).is_some(),
            None => false,
        }
    }
}

/// Editable table cell.
#[derive(Debug)]
pub struct CellMut<'a> {
    element: &'a mut XmlElement,
}

impl<'a> CellMut<'a> {
    pub fn text(&self) -> String {
        Cell { element: self.element }.text()
    }

    /// Replace the cell content with a single paragraph holding `text`.
    ///
    /// Paragraph properties of the first paragraph are kept.
    pub fn set_text(&mut self, text: &str) {
        let mut first = true;
        self.element.children_mut().retain(|node| match node.as_element() {
            Some(e) if e.name() == PARAGRAPH => std::mem::take(&mut first),
            _ => true,
        });
        let paragraph = match self.element.position_of(PARAGRAPH, 0) {
            Some(_) => self.paragraph_mut(0),
            None => Some(ParagraphMut::new(self.element.append(XmlElement::new(PARAGRAPH)))),
        };
        if let Some(mut paragraph) = paragraph {
            paragraph.set_text(text);
        }
    }

    pub fn paragraph_mut(&mut self, index: usize) -> Option<ParagraphMut<'_>> {
        self.element
            .children_named_mut(PARAGRAPH)
            .nth(index)
            .map(ParagraphMut::new)
    }

    pub fn add_paragraph(&mut self, text: &str) -> ParagraphMut<'_> {
        let mut paragraph = ParagraphMut::new(self.element.append(XmlElement::new(PARAGRAPH)));
        paragraph.set_text(text);
        paragraph
    }
}

fn column_width(cols: usize) -> u32 {
    TEXT_WIDTH / cols.max(1) as u32
}

fn new_row(cols: usize, width: u32) -> XmlElement {
    let mut row = XmlElement::new(ROW);
    for _ in 0..cols {
        row.append(
            XmlElement::new(CELL)
                .with_child(
                    XmlElement::new("w:tcPr").with_child(
                        XmlElement::new("w:tcW")
                            .with_attr("w:w", width.to_string())
                            .with_attr("w:type", "dxa"),
                    ),
                )
                .with_child(XmlElement::new(PARAGRAPH)),
        );
    }
    row
}

/// Build an empty `rows` x `cols` table with single-line borders and equal
/// column widths.
pub(crate) fn new_table_element(rows: usize, cols: usize) -> XmlElement {
    let cols = cols.max(1);
    let width = column_width(cols);

    let mut borders = XmlElement::new("w:tblBorders");
    for side in ["w:top", "w:left", "w:bottom", "w:right", "w:insideH", "w:insideV"] {
        borders.append(
            XmlElement::new(side)
                .with_attr("w:val", "single")
                .with_attr("w:sz", "4")
                .with_attr("w:space", "0")
                .with_attr("w:color", "auto"),
        );
    }
    let properties = XmlElement::new("w:tblPr")
        .with_child(
            XmlElement::new("w:tblW")
                .with_attr("w:w", "0")
                .with_attr("w:type", "auto"),
        )
        .with_child(borders)
        .with_child(XmlElement::new("w:tblLook").with_attr("w:val", "04A0"));

    let mut grid = XmlElement::new("w:tblGrid");
    for _ in 0..cols {
        grid.append(XmlElement::new("w:gridCol").with_attr("w:w", width.to_string()));
    }

    let mut table = XmlElement::new(TABLE).with_child(properties).with_child(grid);
    for _ in 0..rows {
        table.append(new_row(cols, width));
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_table_shape() {
        let element = new_table_element(2, 3);
        let table = Table::new(&element);
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.column_count(), 3);
        assert_eq!(table.rows()[1].cell_count(), 3);
        assert_eq!(table.cell(1, 2).unwrap().paragraphs().len(), 1);
        assert!(table.cell(2, 0).is_none());
        let grid = element.child("w:tblGrid").unwrap();
        assert_eq!(grid.elements().next().unwrap().attr("w:w"), Some("2768"));
    }

    #[test]
    fn test_edit_cells_and_rows() {
        let mut element = new_table_element(1, 2);
        let mut table = TableMut::new(&mut element);
        table.cell_mut(0, 0).unwrap().set_text("Name");
        let mut cell = table.cell_mut(0, 1).unwrap();
        cell.add_paragraph("second line");
        cell.set_text("Value");
        assert_eq!(cell.text(), "Value");

        assert_eq!(table.add_row(), 1);
        table.cell_mut(1, 1).unwrap().set_text("x");
        assert_eq!(table.as_table().text(), "Name\tValue\n\tx");

        assert!(table.remove_row(0));
        assert!(!table.remove_row(5));
        assert_eq!(table.as_table().text(), "\tx");
    }
}

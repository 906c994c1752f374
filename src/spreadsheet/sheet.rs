use crate::database::range::Range;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::CellValue;

/// A worksheet read from a spreadsheet file.
///
/// Cells are stored sparsely in row-major order. The first row inside the
/// read range is the header; every later row is data and is handed out
/// densely, padded with [`CellValue::Empty`] to the header width.
#[derive(Debug)]
pub struct Sheet {
    /// Sheet name as stored in the workbook
    pub(crate) name: String,
    /// All non-empty cells, sorted by (row, col) once finished
    pub(crate) cells: Vec<Cell>,
    /// Expected data range (user-specified)
    pub(super) range: Range,
    /// Maximum number of data rows to read
    pub(super) limit: Option<usize>,
    /// Whether rows without any cell are dropped
    pub(super) skip_empty_rows: bool,
    /// Actual data range (determined from cell data)
    pub(crate) row_lower_bound: Option<usize>,
    pub(crate) row_upper_bound: Option<usize>,
    pub(crate) col_lower_bound: Option<usize>,
    pub(crate) col_upper_bound: Option<usize>,
}

impl Sheet {
    pub(crate) fn new(name: &str, range: Option<Range>, limit: Option<usize>, skip_empty_rows: bool) -> Self {
        Self {
            name: name.to_owned(),
            cells: Vec::new(),
            range: range.unwrap_or_default(),
            limit,
            skip_empty_rows,
            row_lower_bound: None,
            row_upper_bound: None,
            col_lower_bound: None,
            col_upper_bound: None,
        }
    }

    /// Sheet name as stored in the workbook.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns true if the sheet contains no cells.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Row index of the header row.
    fn header_row(&self) -> Option<usize> {
        self.range.row_lower_bound.or(self.row_lower_bound)
    }

    /// Checks if a row is before the lower bound of the specified range.
    pub(super) fn before_row_lower_bound(&self, row: usize) -> bool {
        self.range.row_lower_bound.map(|lower| row < lower).unwrap_or(false)
    }

    /// Checks if a row is after the upper bound of the specified range, or
    /// past the header row plus the row limit.
    pub(super) fn after_row_upper_bound(&self, row: usize) -> bool {
        let is_out_of_bound = self.range.row_upper_bound.map(|upper| upper < row).unwrap_or(false);
        let is_more_than_limit = self
            .header_row()
            .zip(self.limit)
            .map(|(header_row, limit)| header_row + limit < row)
            .unwrap_or(false);
        is_out_of_bound || is_more_than_limit
    }

    /// Checks if a column is before the lower bound of the specified range.
    pub(super) fn before_col_lower_bound(&self, col: usize) -> bool {
        self.range.col_lower_bound.map(|lower| col < lower).unwrap_or(false)
    }

    /// Checks if a column is after the upper bound of the specified range.
    pub(super) fn after_col_upper_bound(&self, col: usize) -> bool {
        self.range.col_upper_bound.map(|upper| upper < col).unwrap_or(false)
    }

    /// Checks if a cell at (row, col) is within the specified range and limits.
    pub(super) fn contains(&self, row: usize, col: usize) -> bool {
        !self.before_row_lower_bound(row)
            && !self.after_row_upper_bound(row)
            && !self.before_col_lower_bound(col)
            && !self.after_col_upper_bound(col)
    }

    /// Adds a cell to the sheet, updating the observed bounds.
    pub(crate) fn push(&mut self, cell: Cell) {
        let (row, col) = (cell.row, cell.col);
        self.row_lower_bound = Some(self.row_lower_bound.map_or(row, |lower| lower.min(row)));
        self.row_upper_bound = Some(self.row_upper_bound.map_or(row, |upper| upper.max(row)));
        self.col_lower_bound = Some(self.col_lower_bound.map_or(col, |lower| lower.min(col)));
        self.col_upper_bound = Some(self.col_upper_bound.map_or(col, |upper| upper.max(col)));
        self.cells.push(cell);
    }

    /// Finalizes the sheet after all cells have been added.
    pub(crate) fn finish(&mut self) {
        self.cells.sort_by_key(|cell| (cell.row, cell.col));
    }

    /// Column span (inclusive) covered by the header.
    fn col_span(&self) -> Option<(usize, usize)> {
        let lower = self.range.col_lower_bound.or(self.col_lower_bound)?;
        let upper = self.range.col_upper_bound.or(self.col_upper_bound)?;
        Some((lower, upper.max(lower)))
    }

    /// Number of columns, zero for an empty sheet.
    pub fn width(&self) -> usize {
        self.col_span().map(|(lower, upper)| upper - lower + 1).unwrap_or(0)
    }

    /// Raw header texts, one per column; blank headers are empty strings.
    pub fn header(&self) -> Vec<String> {
        let mut header = vec![String::new(); self.width()];
        if let Some(((col_lower, _), header_row)) = self.col_span().zip(self.header_row()) {
            for cell in self.cells.iter().filter(|cell| cell.row == header_row) {
                if let Some(title) = header.get_mut(cell.col - col_lower) {
                    *title = cell.to_value().as_text().trim().to_owned();
                }
            }
        }
        header
    }

    /// Iterates the data rows below the header.
    pub fn rows(&self) -> Rows<'_> {
        let header_row = self.header_row().unwrap_or(0);
        let start = self.cells.partition_point(|cell| cell.row <= header_row);
        Rows {
            sheet: self,
            index: start,
            row: header_row + 1,
            last_row: self.row_upper_bound.filter(|_| self.header_row().is_some()),
        }
    }
}

/// Dense iterator over the data rows of a [`Sheet`].
pub struct Rows<'a> {
    sheet: &'a Sheet,
    /// Next unread position in `sheet.cells`
    index: usize,
    /// Next row to produce
    row: usize,
    last_row: Option<usize>,
}

impl Iterator for Rows<'_> {
    type Item = Vec<CellValue>;

    fn next(&mut self) -> Option<Self::Item> {
        let (col_lower, col_upper) = self.sheet.col_span()?;
        let cells = &self.sheet.cells;
        loop {
            let last_row = self.last_row?;
            if self.row > last_row {
                return None;
            }
            if self.sheet.skip_empty_rows {
                // Jump straight to the next row that has a cell
                match cells.get(self.index) {
                    Some(cell) if cell.row > self.row => self.row = cell.row,
                    Some(_) => (),
                    None => return None,
                }
            }

            let mut record = vec![CellValue::Empty; col_upper - col_lower + 1];
            let mut filled = false;
            while let Some(cell) = cells.get(self.index).filter(|cell| cell.row == self.row) {
                if col_lower <= cell.col && cell.col <= col_upper {
                    let value = cell.to_value();
                    filled |= !value.is_empty();
                    record[cell.col - col_lower] = value;
                }
                self.index += 1;
            }
            self.row += 1;
            if filled || !self.sheet.skip_empty_rows {
                return Some(record);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spreadsheet::cell::CellType;

    fn push(sheet: &mut Sheet, row: usize, col: usize, value: &str) {
        sheet.push(Cell {
            row,
            col,
            kind: CellType::Text,
            value: value.to_owned(),
        });
    }

    fn text(value: &str) -> CellValue {
        CellValue::Text(value.to_owned())
    }

    #[test]
    fn sheet_initial() {
        let sheet = Sheet::new("", None, None, true);

        assert!(sheet.is_empty());
        assert_eq!(sheet.width(), 0);
        assert!(sheet.header().is_empty());
        assert_eq!(sheet.rows().count(), 0);
    }

    #[test]
    fn sheet_update() {
        let mut sheet = Sheet::new("Data", None, None, true);
        push(&mut sheet, 3, 1, "d");
        push(&mut sheet, 1, 1, "a");
        push(&mut sheet, 1, 3, "b");
        push(&mut sheet, 3, 3, "e");
        push(&mut sheet, 2, 2, "c");
        sheet.finish();

        assert_eq!(sheet.row_lower_bound, Some(1));
        assert_eq!(sheet.row_upper_bound, Some(3));
        assert_eq!(sheet.col_lower_bound, Some(1));
        assert_eq!(sheet.col_upper_bound, Some(3));

        assert_eq!(sheet.header(), vec!["a", "", "b"]);
        let rows: Vec<_> = sheet.rows().collect();
        assert_eq!(rows, vec![
            vec![CellValue::Empty, text("c"), CellValue::Empty],
            vec![text("d"), CellValue::Empty, text("e")],
        ]);
    }

    #[test]
    fn sheet_skip_empty_rows() {
        let mut sheet = Sheet::new("", None, None, true);
        push(&mut sheet, 0, 0, "id");
        push(&mut sheet, 1, 0, "1");
        push(&mut sheet, 5, 0, "2");
        sheet.finish();
        assert_eq!(sheet.rows().count(), 2);

        let mut sheet = Sheet::new("", None, None, false);
        push(&mut sheet, 0, 0, "id");
        push(&mut sheet, 1, 0, "1");
        push(&mut sheet, 5, 0, "2");
        sheet.finish();
        let rows: Vec<_> = sheet.rows().collect();
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[1], vec![CellValue::Empty]);
    }

    #[test]
    fn sheet_header_only() {
        let mut sheet = Sheet::new("", None, None, true);
        push(&mut sheet, 0, 0, "id");
        push(&mut sheet, 0, 1, "name");
        sheet.finish();
        assert_eq!(sheet.header(), vec!["id", "name"]);
        assert_eq!(sheet.rows().count(), 0);
    }

    #[test]
    fn sheet_with_range() {
        let range = Range {
            row_lower_bound: Some(2),
            row_upper_bound: None,
            col_lower_bound: Some(0),
            col_upper_bound: Some(2),
        };
        let mut sheet = Sheet::new("", Some(range), Some(1), true);
        assert!(!sheet.contains(1, 0));
        assert!(sheet.contains(2, 0));
        assert!(sheet.contains(3, 2));
        assert!(!sheet.contains(3, 3));
        assert!(!sheet.contains(4, 0));
        push(&mut sheet, 2, 0, "id");
        push(&mut sheet, 3, 0, "1");
        sheet.finish();
        assert_eq!(sheet.header(), vec!["id", "", ""]);
        assert_eq!(sheet.rows().next(), Some(vec![text("1"), CellValue::Empty, CellValue::Empty]));
    }
}

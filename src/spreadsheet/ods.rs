use crate::error::Sheet2SqlError;
use crate::helpers::xml::XmlNodeHelper;
use crate::helpers::xml::XmlTextContextHelper;
use crate::helpers::zip::ZipHelper;
use crate::match_xml_events;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::CellType;
use crate::spreadsheet::criteria::Criteria;
use crate::spreadsheet::reference::MAX_COLS;
use crate::spreadsheet::reference::MAX_ROWS;
use crate::spreadsheet::sheet::Sheet;
use crate::spreadsheet::Spreadsheet;
use crate::spreadsheet::SpreadsheetError;
use quick_xml::events::BytesStart;
use quick_xml::events::Event;
use quick_xml::name::QName;
use std::io::Cursor;
use std::io::Read;
use tracing::debug;
use zip::ZipArchive;

/// Most cells a single repeated cell element may fill
const MAX_REPEATED_CELLS: usize = MAX_ROWS;
/// Most characters in a cell, and so in one run of spaces
const MAX_SPACES: usize = 32_767;
/// ODS file MIME type identifier
const MIME_TYPE: &str = "application/vnd.oasis.opendocument.spreadsheet";
/// Spreadsheet body, the parent of all tables
const SPREADSHEET: QName = QName(b"office:spreadsheet");
/// Table (sheet)
const TABLE: QName = QName(b"table:table");
const TABLE_ROW: QName = QName(b"table:table-row");
const TABLE_CELL: QName = QName(b"table:table-cell");
/// Covered table cell (hidden by a merged cell)
const TABLE_COVERED_CELL: QName = QName(b"table:covered-table-cell");
/// Annotations (comments) attached to a cell
const ANNOTATION: QName = QName(b"office:annotation");
/// Paragraph text
const PARAGRAPH: QName = QName(b"text:p");
/// Run of spaces, counted by text:c
const SPACE: QName = QName(b"text:s");
const TAB: QName = QName(b"text:tab");
const LINE_BREAK: QName = QName(b"text:line-break");
const MANIFEST_FILE_ENTRY: QName = QName(b"manifest:file-entry");
const MANIFEST_ENCRYPTION_DATA: QName = QName(b"manifest:encryption-data");

/// An OpenDocument spreadsheet (.ods) held in memory.
pub(crate) struct OdsSpreadsheet<'a> {
    zip: ZipArchive<Cursor<&'a [u8]>>,
}

impl<'a> OdsSpreadsheet<'a> {
    /// Validates the MIME type and rejects encrypted documents.
    pub(crate) fn open(mut zip: ZipArchive<Cursor<&'a [u8]>>) -> Result<Self, Sheet2SqlError> {
        check_mime(&mut zip)?;
        if is_password_protected(&mut zip)? {
            Err(SpreadsheetError::SpreadsheetPasswordProtectedError)?;
        }
        debug!("opened ods document");
        Ok(OdsSpreadsheet { zip })
    }
}

impl Spreadsheet for OdsSpreadsheet<'_> {
    fn read_sheets(&mut self, criteria: &Criteria) -> Result<Vec<Sheet>, Sheet2SqlError> {
        let mut sheets = Vec::<Sheet>::new();
        let mut table_count = 0usize;
        let mut sheet_name = String::new();
        let mut reader = self
            .zip
            .xml_reader("content.xml")?
            .ok_or_else(|| SpreadsheetError::MissingPartError("content.xml".to_owned()))?;
        'sheets: loop {
            // Skip forward to the next selected table
            let mut found = false;
            match_xml_events!(reader => {
                Event::End(event) if event.name() == SPREADSHEET => break 'sheets,
                Event::Start(event) if event.name() == TABLE => {
                    table_count += 1;
                    sheet_name.clear();
                    sheet_name.push_str(&event.get_attribute_value("table:name")?.unwrap_or_default());
                    if criteria.accept(&sheet_name) {
                        found = true;
                        break;
                    } else {
                        debug!(sheet = %sheet_name, "sheet filtered out");
                    }
                }
            });
            if !found {
                break;
            }

            let mut sheet = Sheet::new(&sheet_name, criteria.range, criteria.rows_limit, criteria.skip_empty_rows);
            let mut row = 0usize;
            let mut col = 0usize;
            let mut row_count = 1usize;
            let mut col_count = 1usize;
            let mut kind = CellType::default();
            let mut value = String::new();
            let mut element_context = false; // cell text is read from child paragraphs
            let mut paragraph_context = false;
            let mut paragraph_count = 0usize;
            let mut comment_context = false;
            match_xml_events!(reader => {
                Event::End(event) if event.name() == TABLE => break,
                Event::Start(event) if event.name() == TABLE_ROW => {
                    row_count = repeat_count(&event, "table:number-rows-repeated", MAX_ROWS)?;
                    col = 0;
                }
                Event::End(event) if event.name() == TABLE_ROW => {
                    row = row.saturating_add(row_count);
                    if row >= MAX_ROWS || sheet.after_row_upper_bound(row) {
                        break;
                    }
                }
                Event::Start(event) if event.name() == TABLE_CELL || event.name() == TABLE_COVERED_CELL => {
                    value.clear();
                    element_context = false;
                    paragraph_count = 0;
                    col_count = repeat_count(&event, "table:number-columns-repeated", MAX_COLS)?;
                    kind = match event.get_attribute_value("office:value-type")?.as_deref() {
                        None | Some("void") => CellType::Empty,
                        Some("boolean") => {
                            let is_true = event
                                .get_attribute_value("office:boolean-value")?
                                .map(|flag| flag != "false" && flag != "0")
                                .unwrap_or(false);
                            value.push_str(if is_true { "1" } else { "0" });
                            CellType::Boolean
                        }
                        Some("date") => {
                            value.push_str(&event.get_attribute_value("office:date-value")?.unwrap_or_default());
                            CellType::IsoDateTime
                        }
                        Some("time") => {
                            value.push_str(&event.get_attribute_value("office:time-value")?.unwrap_or_default());
                            CellType::IsoDuration
                        }
                        Some("string") => {
                            let is_error = event
                                .get_attribute_value("calcext:value-type")?
                                .map(|calc_type| calc_type == "error")
                                .unwrap_or(false);
                            if let Some(text) = event.get_attribute_value("office:string-value")? {
                                value.push_str(&text);
                            } else {
                                element_context = true;
                            }
                            match is_error {
                                true if criteria.error_as_null => CellType::Empty,
                                true => CellType::Error,
                                false => CellType::Text,
                            }
                        }
                        // float, percentage, currency
                        Some(_) => {
                            value.push_str(&event.get_attribute_value("office:value")?.unwrap_or_default());
                            CellType::Number
                        }
                    };
                }
                Event::End(event) if event.name() == TABLE_CELL || event.name() == TABLE_COVERED_CELL => {
                    if kind != CellType::Empty && !value.is_empty() {
                        let cells = row_count.saturating_mul(col_count);
                        if cells > MAX_REPEATED_CELLS {
                            Err(SpreadsheetError::RepeatedCellError(sheet_name.to_owned(), cells))?
                        }
                        for row_number in row..row.saturating_add(row_count) {
                            if sheet.before_row_lower_bound(row_number) {
                                continue;
                            } else if sheet.after_row_upper_bound(row_number) {
                                break;
                            }
                            for col_number in col..col.saturating_add(col_count) {
                                if sheet.before_col_lower_bound(col_number) {
                                    continue;
                                } else if sheet.after_col_upper_bound(col_number) {
                                    break;
                                }
                                let cell = Cell {
                                    row: row_number,
                                    col: col_number,
                                    kind,
                                    value: value.to_owned(),
                                };
                                if kind == CellType::Error {
                                    Err(cell.value_error(&sheet_name))?
                                }
                                sheet.push(cell);
                            }
                        }
                    }
                    col = col.saturating_add(col_count);
                    element_context = false;
                    paragraph_context = false;
                    comment_context = false;
                }
                Event::Start(event) if element_context && event.name() == ANNOTATION => comment_context = true,
                Event::End(event) if element_context && event.name() == ANNOTATION => comment_context = false,
                Event::Start(event) if element_context && !comment_context && event.name() == PARAGRAPH => {
                    if paragraph_count > 0 {
                        value.push('\n');
                    }
                    paragraph_count += 1;
                    paragraph_context = true;
                }
                Event::End(event) if paragraph_context && event.name() == PARAGRAPH => paragraph_context = false,
                Event::Start(event) if element_context && !comment_context && event.name() == SPACE => {
                    value.push_str(&" ".repeat(repeat_count(&event, "text:c", MAX_SPACES)?));
                }
                Event::Start(event) if element_context && !comment_context && event.name() == TAB => value.push('\t'),
                Event::Start(event) if element_context && !comment_context && event.name() == LINE_BREAK => value.push('\n'),
                Event::Text(event) if paragraph_context && !comment_context => value.push_bytes_text(&event)?,
                Event::GeneralRef(event) if paragraph_context && !comment_context => value.push_bytes_ref(&event)?,
            });
            sheet.finish();
            debug!(sheet = %sheet_name, cells = sheet.cells.len(), "read ods sheet");
            sheets.push(sheet);
        }

        if table_count == 0 {
            Err(SpreadsheetError::SpreadsheetEmptyError)?
        }
        Ok(sheets)
    }
}

/// Reads a repetition attribute, 1 when absent.
fn repeat_count(event: &BytesStart, name: &str, max: usize) -> Result<usize, Sheet2SqlError> {
    let count = event.parse_attribute_value::<usize>(name)?.unwrap_or(1);
    if count == 0 || count > max {
        Err(SpreadsheetError::RepeatCountError(name.to_owned(), count))?
    }
    Ok(count)
}

/// Checks the `mimetype` part when present.
fn check_mime(zip: &mut ZipArchive<Cursor<&[u8]>>) -> Result<(), Sheet2SqlError> {
    if let Some(mut file) = zip.file("mimetype")? {
        let mut mime_type = String::new();
        file.read_to_string(&mut mime_type)?;
        let mime_type = mime_type.trim();
        if mime_type != MIME_TYPE {
            Err(SpreadsheetError::MimeTypeError(mime_type.to_owned()))?;
        }
    }
    Ok(())
}

/// Looks for encryption data in the manifest, when there is one.
fn is_password_protected(zip: &mut ZipArchive<Cursor<&[u8]>>) -> Result<bool, Sheet2SqlError> {
    let mut reader = match zip.xml_reader("META-INF/manifest.xml")? {
        Some(reader) => reader,
        None => return Ok(false),
    };
    let mut in_file_entry = false;
    match_xml_events!(reader => {
        Event::Start(event) if event.name() == MANIFEST_FILE_ENTRY => in_file_entry = true,
        Event::End(event) if event.name() == MANIFEST_FILE_ENTRY => in_file_entry = false,
        Event::Start(event) if in_file_entry && event.name() == MANIFEST_ENCRYPTION_DATA => return Ok(true),
    });
    Ok(false)
}

use crate::error::Sheet2SqlError;
use crate::helpers::xml::XmlNodeHelper;
use crate::helpers::xml::XmlReader;
use crate::helpers::xml::XmlTextContextHelper;
use crate::helpers::zip::ZipHelper;
use crate::match_xml_events;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::CellType;
use crate::spreadsheet::criteria::Criteria;
use crate::spreadsheet::reference::reference_to_index;
use crate::spreadsheet::sheet::Sheet;
use crate::spreadsheet::Spreadsheet;
use crate::spreadsheet::SpreadsheetError;
use quick_xml::events::Event;
use std::collections::HashMap;
use std::io::BufRead;
use std::io::Cursor;
use tracing::debug;
use zip::ZipArchive;

// Local names of the SpreadsheetML elements we read
const TAG_RELATIONSHIP: &[u8] = b"Relationship";
const TAG_CUSTOM_FORMATS: &[u8] = b"numFmts"; // Custom number formats container
const TAG_CUSTOM_FORMAT: &[u8] = b"numFmt"; // Individual custom number format
const TAG_FORMAT_INDEXES: &[u8] = b"cellXfs"; // Cell format indexes container
const TAG_FORMAT_INDEX: &[u8] = b"xf"; // Individual cell format index
const TAG_SHARED_STRING_ITEM: &[u8] = b"si"; // Shared string table item
const TAG_PHONETIC_TEXT: &[u8] = b"rPh"; // Phonetic text for Asian languages
const TAG_TEXT: &[u8] = b"t"; // Text content within strings
const TAG_WORKBOOK_PROPERTIES: &[u8] = b"workbookPr";
const TAG_SHEET: &[u8] = b"sheet";
const TAG_ROW: &[u8] = b"row";
const TAG_CELL: &[u8] = b"c";
const TAG_INLINE_STRING: &[u8] = b"is";
const TAG_VALUE: &[u8] = b"v";

/// An Office Open XML workbook (.xlsx, .xlsm) held in memory.
pub(crate) struct XlsxSpreadsheet<'a> {
    zip: ZipArchive<Cursor<&'a [u8]>>,
    /// Cell type per style index, from styles.xml
    number_formats: Vec<CellType>,
    /// Worksheets as (name, zip path), in workbook order
    sheets: Vec<(String, String)>,
    shared_strings: Vec<String>,
}

impl<'a> XlsxSpreadsheet<'a> {
    /// Loads the workbook structure, styles and shared strings.
    pub(crate) fn open(mut zip: ZipArchive<Cursor<&'a [u8]>>) -> Result<Self, Sheet2SqlError> {
        let (sheets, is_1904) = load_workbook(&mut zip)?;
        if sheets.is_empty() {
            Err(SpreadsheetError::SpreadsheetEmptyError)?
        }
        let number_formats = load_number_formats(&mut zip, is_1904)?;
        let shared_strings = load_shared_strings(&mut zip)?;
        debug!(
            sheets = sheets.len(),
            styles = number_formats.len(),
            shared_strings = shared_strings.len(),
            is_1904,
            "opened xlsx workbook"
        );
        Ok(XlsxSpreadsheet {
            zip,
            number_formats,
            sheets,
            shared_strings,
        })
    }
}

impl Spreadsheet for XlsxSpreadsheet<'_> {
    fn read_sheets(&mut self, criteria: &Criteria) -> Result<Vec<Sheet>, Sheet2SqlError> {
        let mut sheets = Vec::<Sheet>::new();
        for (sheet_name, zip_path) in &self.sheets {
            if !criteria.accept(sheet_name) {
                debug!(sheet = %sheet_name, "sheet filtered out");
                continue;
            }

            let mut sheet = Sheet::new(sheet_name, criteria.range, criteria.rows_limit, criteria.skip_empty_rows);
            let mut reader = self
                .zip
                .xml_reader(zip_path)?
                .ok_or_else(|| SpreadsheetError::MissingPartError(zip_path.to_owned()))?;
            let mut row_count = 0usize;
            let mut col_count = 0usize;
            let mut row = 0usize;
            let mut col = 0usize;
            let mut kind = CellType::default();
            let mut is_shared_string = false;
            let mut value = String::new();
            match_xml_events!(reader => {
                Event::Start(event) if event.local_name().as_ref() == TAG_ROW => {
                    row_count = event
                        .parse_attribute_value::<usize>("r")?
                        .and_then(|number| number.checked_sub(1))
                        .unwrap_or(row_count);
                    col_count = 0;
                }
                Event::End(event) if event.local_name().as_ref() == TAG_ROW => row_count += 1,
                Event::Start(event) if event.local_name().as_ref() == TAG_CELL => {
                    value.clear();
                    is_shared_string = false;
                    (row, col) = event
                        .get_attribute_value("r")?
                        .and_then(|reference| reference_to_index(&reference))
                        .unwrap_or((row_count, col_count));
                    col_count = col + 1;
                    if sheet.after_row_upper_bound(row) {
                        break;
                    } else if sheet.contains(row, col) {
                        kind = match event.get_attribute_value("t")?.as_deref() {
                            Some("s") => {
                                is_shared_string = true;
                                CellType::Text
                            }
                            Some("inlineStr" | "str") => CellType::Text,
                            Some("d") => CellType::IsoDateTime,
                            Some("b") => CellType::Boolean,
                            Some("e") if criteria.error_as_null => CellType::Empty,
                            Some("e") => CellType::Error,
                            _ => CellType::Number,
                        };
                        if kind == CellType::Number {
                            if let Some(style) = event.parse_attribute_value::<usize>("s")? {
                                kind = self.number_formats.get(style).copied().unwrap_or(CellType::Number);
                            }
                        }
                    } else {
                        kind = CellType::Empty;
                    }
                }
                Event::Start(event) if kind != CellType::Empty && event.local_name().as_ref() == TAG_INLINE_STRING => {
                    value = read_string_value(&mut reader, TAG_INLINE_STRING, false)?;
                }
                Event::Start(event) if kind != CellType::Empty && event.local_name().as_ref() == TAG_VALUE => {
                    value = read_string_value(&mut reader, TAG_VALUE, true)?;
                }
                Event::End(event) if event.local_name().as_ref() == TAG_CELL => {
                    let mut cell = Cell {
                        row,
                        col,
                        kind,
                        value: std::mem::take(&mut value),
                    };
                    kind = CellType::Empty;
                    if cell.kind == CellType::Error {
                        Err(cell.value_error(sheet_name))?
                    }
                    if cell.kind != CellType::Empty && !cell.value.is_empty() {
                        if is_shared_string {
                            let text = cell
                                .value
                                .trim()
                                .parse::<usize>()
                                .ok()
                                .and_then(|index| self.shared_strings.get(index))
                                .cloned()
                                .ok_or_else(|| cell.value_error(sheet_name))?;
                            cell.value = text;
                        }
                        sheet.push(cell);
                    }
                }
            });
            sheet.finish();
            debug!(sheet = %sheet_name, cells = sheet.cells.len(), "read xlsx sheet");
            sheets.push(sheet);
        }

        Ok(sheets)
    }
}

/// Loads worksheet relationships as id -> zip path.
fn load_relationships(zip: &mut ZipArchive<Cursor<&[u8]>>, path: &str) -> Result<HashMap<String, String>, Sheet2SqlError> {
    let mut reader = zip
        .xml_reader(path)?
        .ok_or_else(|| SpreadsheetError::MissingPartError(path.to_owned()))?;
    let mut relationships = HashMap::<String, String>::new();
    match_xml_events!(reader => {
        Event::Start(event) if event.local_name().as_ref() == TAG_RELATIONSHIP => {
            let id = event.get_attribute_value("Id")?;
            let kind = event.get_attribute_value("Type")?;
            let target = event.get_attribute_value("Target")?;
            // Only worksheets; chartsheets and dialog sheets hold no cells
            if kind.map(|it| it.ends_with("/worksheet")).unwrap_or(true) {
                if let Some((id, target)) = id.zip(target) {
                    relationships.insert(id.to_string(), to_zip_path(&target));
                }
            }
        }
    });
    Ok(relationships)
}

/// Normalizes a relationship target to a path inside the archive.
fn to_zip_path(path: &str) -> String {
    if let Some(absolute) = path.strip_prefix('/') {
        absolute.to_owned()
    } else if path.starts_with("xl/") {
        path.to_owned()
    } else {
        format!("xl/{path}")
    }
}

/// Reads sheet names with their part paths, and whether the workbook uses
/// the 1904 date system.
fn load_workbook(zip: &mut ZipArchive<Cursor<&[u8]>>) -> Result<(Vec<(String, String)>, bool), Sheet2SqlError> {
    let relationships = load_relationships(zip, "xl/_rels/workbook.xml.rels")?;
    let mut reader = zip
        .xml_reader("xl/workbook.xml")?
        .ok_or_else(|| SpreadsheetError::MissingPartError("xl/workbook.xml".to_owned()))?;
    let mut sheets = Vec::<(String, String)>::new();
    let mut is_1904 = false;
    match_xml_events!(reader => {
        Event::Start(event) if event.local_name().as_ref() == TAG_SHEET => {
            let name = event.get_attribute_value("name")?;
            let id = event.get_local_attribute_value("id")?;
            if let Some((name, id)) = name.zip(id) {
                if let Some(path) = relationships.get(id.as_ref()) {
                    sheets.push((name.to_string(), path.to_owned()));
                }
            }
        }
        Event::Start(event) if event.local_name().as_ref() == TAG_WORKBOOK_PROPERTIES => {
            is_1904 = event
                .get_attribute_value("date1904")?
                .map(|value| value == "1" || value == "true")
                .unwrap_or(false);
        }
    });
    Ok((sheets, is_1904))
}

/// Maps every cell style index of styles.xml to the cell type its number
/// format implies.
fn load_number_formats(zip: &mut ZipArchive<Cursor<&[u8]>>, is_1904: bool) -> Result<Vec<CellType>, Sheet2SqlError> {
    let mut reader = match zip.xml_reader("xl/styles.xml")? {
        Some(reader) => reader,
        None => return Ok(Vec::new()),
    };

    let mut custom_formats_context = false;
    let mut custom_formats = HashMap::<String, String>::new();
    let mut format_indexes_context = false;
    let mut format_indexes = Vec::<String>::new();
    match_xml_events!(reader => {
        Event::Start(event) if event.local_name().as_ref() == TAG_CUSTOM_FORMATS => custom_formats_context = true,
        Event::End(event) if event.local_name().as_ref() == TAG_CUSTOM_FORMATS => custom_formats_context = false,
        Event::Start(event) if custom_formats_context && event.local_name().as_ref() == TAG_CUSTOM_FORMAT => {
            let id = event.get_attribute_value("numFmtId")?;
            let format = event.get_attribute_value("formatCode")?;
            if let Some((id, format)) = id.zip(format) {
                custom_formats.insert(id.to_string(), format.to_string());
            }
        }
        Event::Start(event) if event.local_name().as_ref() == TAG_FORMAT_INDEXES => format_indexes_context = true,
        Event::End(event) if event.local_name().as_ref() == TAG_FORMAT_INDEXES => format_indexes_context = false,
        Event::Start(event) if format_indexes_context && event.local_name().as_ref() == TAG_FORMAT_INDEX => {
            let id = event.get_attribute_value("numFmtId")?.unwrap_or_default();
            format_indexes.push(id.to_string());
        }
    });

    Ok(CellType::resolve_number_formats(&format_indexes, &custom_formats, is_1904))
}

/// Loads the shared string table; a workbook without one has no shared strings.
fn load_shared_strings(zip: &mut ZipArchive<Cursor<&[u8]>>) -> Result<Vec<String>, Sheet2SqlError> {
    let mut shared_strings = Vec::<String>::new();
    let mut reader = match zip.xml_reader("xl/sharedStrings.xml")? {
        Some(reader) => reader,
        None => return Ok(shared_strings),
    };
    match_xml_events!(reader => {
        Event::Start(event) if event.local_name().as_ref() == TAG_SHARED_STRING_ITEM => {
            shared_strings.push(read_string_value(&mut reader, TAG_SHARED_STRING_ITEM, false)?);
        }
    });
    Ok(shared_strings)
}

/// Reads the text up to `end_tag`, skipping phonetic runs. Rich text runs
/// are concatenated.
fn read_string_value<R: BufRead>(reader: &mut XmlReader<R>, end_tag: &[u8], is_text_content: bool) -> Result<String, Sheet2SqlError> {
    let mut is_phonetic_text = false;
    let mut is_text = is_text_content;
    let mut text = String::new();
    match_xml_events!(reader => {
        Event::End(event) if event.local_name().as_ref() == end_tag => break,
        Event::Start(event) if event.local_name().as_ref() == TAG_PHONETIC_TEXT => is_phonetic_text = true,
        Event::End(event) if event.local_name().as_ref() == TAG_PHONETIC_TEXT => is_phonetic_text = false,
        Event::Start(event) if !is_phonetic_text && event.local_name().as_ref() == TAG_TEXT => is_text = true,
        Event::End(event) if is_text && event.local_name().as_ref() == TAG_TEXT => is_text = false,
        Event::Text(event) if is_text => text.push_bytes_text(&event)?,
        Event::CData(event) if is_text => text.push_str(&String::from_utf8_lossy(&event)),
        Event::GeneralRef(event) if is_text => text.push_bytes_ref(&event)?,
    });
    Ok(text)
}

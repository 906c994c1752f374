use crate::error::Sheet2SqlError;
use crate::helpers::biff8::Biff8Reader;
use crate::helpers::cfb::Cfb;
use crate::match_biff8_record;
use crate::spreadsheet::cell::to_error_value;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::CellType;
use crate::spreadsheet::criteria::Criteria;
use crate::spreadsheet::sheet::Sheet;
use crate::spreadsheet::Spreadsheet;
use crate::spreadsheet::SpreadsheetError;
use either::Either;
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

// BIFF8 record types
const FORMULA: u16 = 6;
const EOF: u16 = 10; // End of a substream
const DATE1904: u16 = 34;
const FILE_PASS: u16 = 47; // Workbook is encrypted
const CODE_PAGE: u16 = 66;
const BOUND_SHEET8: u16 = 133; // Sheet name, type and substream position
const MUL_RK: u16 = 189; // Run of RK numbers in one row
const XF: u16 = 224; // Cell style
const SST: u16 = 252; // Shared string table
const LABEL_SST: u16 = 253;
const NUMBER: u16 = 515;
const LABEL: u16 = 516;
const BOOL_ERR: u16 = 517;
const STRING: u16 = 519; // String result of the preceding formula
const ARRAY: u16 = 545;
const TABLE: u16 = 566;
const RK: u16 = 638;
const FORMAT: u16 = 1054;
const SHARED_FORMULA: u16 = 1212;
const BOF: u16 = 2057; // Start of a substream

const BIFF8_VERSION: u16 = 0x0600;
/// BOUNDSHEET8 sheet type of a worksheet or dialog sheet
const WORKSHEET: u8 = 0;

#[derive(Error, Debug)]
pub enum XlsError {
    #[error("Unsupported Excel binary version 0x{0:04X}; save the file as .xlsx")]
    BiffVersionError(u16),

    #[error("Missing BOF record at stream position {0}")]
    BofError(usize),

    #[error("Invalid code page '{0}'")]
    CodePageError(u16),

    #[error("Invalid formula value '{0:#018X}'")]
    FormulaValueError(u64),

    #[error("Shared string index {0} is out of range")]
    SharedStringError(usize),
}

/// An Excel 97-2003 workbook (.xls) with its global records loaded.
pub(crate) struct XlsSpreadsheet {
    reader: Biff8Reader,
    shared_strings: Vec<String>,
    /// Cell type per XF index
    number_formats: Vec<CellType>,
    /// Worksheets as (name, BOF position), in workbook order
    sheets: Vec<(String, usize)>,
}

impl XlsSpreadsheet {
    /// Reads the workbook globals substream.
    pub(crate) fn open(cfb: &Cfb) -> Result<Self, Sheet2SqlError> {
        let stream = match cfb.read("Workbook")? {
            Some(stream) => stream,
            None => cfb.read("Book")?.ok_or(SpreadsheetError::CompoundFileError)?,
        };
        let mut reader = Biff8Reader::new(stream);
        read_bof(&mut reader, 0)?;

        let mut is_1904 = false;
        let mut shared_strings = Vec::new();
        let mut custom_formats = HashMap::<String, String>::new();
        let mut format_ids = Vec::<String>::new();
        let mut sheets = Vec::<(String, usize)>::new();
        match_biff8_record!(reader => {
            EOF => break,
            FILE_PASS => Err(SpreadsheetError::SpreadsheetPasswordProtectedError)?,
            DATE1904 => is_1904 = reader.read_u16()? == 1,
            CODE_PAGE => {
                let code_page = reader.read_u16()?;
                reader.encoding = codepage::to_encoding(code_page).ok_or(XlsError::CodePageError(code_page))?;
            }
            FORMAT => {
                let id = reader.read_u16()?;
                let format = reader.read_xl_unicode_string()?;
                custom_formats.insert(id.to_string(), format);
            }
            XF => {
                reader.skip(2)?;
                format_ids.push(reader.read_u16()?.to_string());
            }
            SST => shared_strings = load_shared_strings(&mut reader)?,
            BOUND_SHEET8 => {
                let pointer = reader.read_usize()?;
                reader.skip(1)?;
                let sheet_type = reader.read_u8()?;
                let sheet_name = reader.read_short_xl_unicode_string()?;
                // Charts and macro sheets hold no cell table
                if sheet_type == WORKSHEET {
                    sheets.push((sheet_name, pointer));
                }
            }
        });
        if sheets.is_empty() {
            Err(SpreadsheetError::SpreadsheetEmptyError)?
        }

        let number_formats = CellType::resolve_number_formats(&format_ids, &custom_formats, is_1904);
        debug!(
            sheets = sheets.len(),
            styles = number_formats.len(),
            shared_strings = shared_strings.len(),
            is_1904,
            "opened xls workbook"
        );
        Ok(XlsSpreadsheet {
            reader,
            shared_strings,
            number_formats,
            sheets,
        })
    }

    fn number_format(&self, index: usize) -> CellType {
        self.number_formats.get(index).copied().unwrap_or(CellType::Number)
    }
}

impl Spreadsheet for XlsSpreadsheet {
    fn read_sheets(&mut self, criteria: &Criteria) -> Result<Vec<Sheet>, Sheet2SqlError> {
        let mut sheets = Vec::<Sheet>::new();
        for (sheet_name, pointer) in &self.sheets {
            if !criteria.accept(sheet_name) {
                debug!(sheet = %sheet_name, "sheet filtered out");
                continue;
            }

            self.reader.goto(*pointer);
            read_bof(&mut self.reader, *pointer)?;
            let mut sheet = Sheet::new(sheet_name, criteria.range, criteria.rows_limit, criteria.skip_empty_rows);
            while let Some(tag) = self.reader.next()? {
                match tag {
                    BOF | EOF => break,
                    MUL_RK => {
                        let row = self.reader.read_u16()? as usize;
                        let first_col = self.reader.read_u16()? as usize;
                        let last_col = self.reader.get_u16_back(2)? as usize;
                        for col in first_col..=last_col {
                            let index = self.reader.read_u16()? as usize;
                            let value = self.reader.read_rk_number()?;
                            if sheet.contains(row, col) {
                                sheet.push(Cell {
                                    row,
                                    col,
                                    kind: self.number_format(index),
                                    value,
                                });
                            }
                        }
                    }
                    BOOL_ERR | NUMBER | RK | LABEL_SST | LABEL | FORMULA => {
                        let row = self.reader.read_u16()? as usize;
                        let col = self.reader.read_u16()? as usize;
                        if !sheet.contains(row, col) {
                            continue;
                        }
                        let (kind, value) = match tag {
                            BOOL_ERR => read_bool_or_error_cell(&mut self.reader)?,
                            NUMBER => read_number_cell(&mut self.reader)?,
                            RK => read_rk_cell(&mut self.reader)?,
                            LABEL_SST => read_label_sst_cell(&mut self.reader, &self.shared_strings)?,
                            LABEL => read_label_cell(&mut self.reader)?,
                            _ => read_formula_cell(&mut self.reader)?,
                        };
                        let cell = Cell {
                            row,
                            col,
                            kind: kind.right_or_else(|index| self.number_format(index)),
                            value,
                        };
                        match cell.kind {
                            CellType::Error if criteria.error_as_null => (),
                            CellType::Error => Err(cell.value_error(sheet_name))?,
                            _ if cell.value.is_empty() => (),
                            _ => sheet.push(cell),
                        }
                    }
                    _ => (),
                }
            }
            sheet.finish();
            debug!(sheet = %sheet_name, cells = sheet.cells.len(), "read xls sheet");
            sheets.push(sheet);
        }

        Ok(sheets)
    }
}

/// Expects a BIFF8 BOF record at the reader position.
fn read_bof(reader: &mut Biff8Reader, pointer: usize) -> Result<(), Sheet2SqlError> {
    if reader.next()? != Some(BOF) {
        Err(XlsError::BofError(pointer))?
    }
    let version = reader.read_u16()?;
    if version != BIFF8_VERSION {
        Err(XlsError::BiffVersionError(version))?
    }
    Ok(())
}

fn load_shared_strings(reader: &mut Biff8Reader) -> Result<Vec<String>, Sheet2SqlError> {
    reader.skip(4)?; // total references
    let count = reader.read_usize()?;
    let mut shared_strings = Vec::<String>::new();
    for _ in 0..count {
        shared_strings.push(reader.read_xl_unicode_rich_extended_string()?);
    }
    Ok(shared_strings)
}

/// A cell's type, or the XF index its number format comes from, with the
/// raw value.
type CellRecord = (Either<usize, CellType>, String);

fn read_bool_or_error_cell(reader: &mut Biff8Reader) -> Result<CellRecord, Sheet2SqlError> {
    reader.skip(2)?;
    let value = reader.read_u8()?;
    let is_error = reader.read_u8()? != 0;
    Ok(if is_error {
        (Either::Right(CellType::Error), to_error_value(value).to_owned())
    } else {
        (Either::Right(CellType::Boolean), value.to_string())
    })
}

fn read_number_cell(reader: &mut Biff8Reader) -> Result<CellRecord, Sheet2SqlError> {
    let index = reader.read_u16()? as usize;
    let value = reader.read_f64()?;
    Ok((Either::Left(index), value.to_string()))
}

fn read_rk_cell(reader: &mut Biff8Reader) -> Result<CellRecord, Sheet2SqlError> {
    let index = reader.read_u16()? as usize;
    let value = reader.read_rk_number()?;
    Ok((Either::Left(index), value))
}

fn read_label_sst_cell(reader: &mut Biff8Reader, shared_strings: &[String]) -> Result<CellRecord, Sheet2SqlError> {
    reader.skip(2)?;
    let index = reader.read_usize()?;
    let value = shared_strings.get(index).cloned().ok_or(XlsError::SharedStringError(index))?;
    Ok((Either::Right(CellType::Text), value))
}

fn read_label_cell(reader: &mut Biff8Reader) -> Result<CellRecord, Sheet2SqlError> {
    reader.skip(2)?;
    let value = reader.read_xl_unicode_string()?;
    Ok((Either::Right(CellType::Text), value))
}

/// Reads the cached result of a formula. A string result lives in the
/// STRING record that follows, possibly after the shared formula.
fn read_formula_cell(reader: &mut Biff8Reader) -> Result<CellRecord, Sheet2SqlError> {
    let index = reader.read_u16()? as usize;
    let result = reader.read_u64()?;
    if (result & 0xFFFF_0000_0000_0000) != 0xFFFF_0000_0000_0000 {
        return Ok((Either::Left(index), f64::from_bits(result).to_string()));
    }
    match result & 0xFF {
        0 => {
            while let Some(kind) = reader.next()? {
                match kind {
                    STRING => return Ok((Either::Right(CellType::Text), reader.read_xl_unicode_string()?)),
                    SHARED_FORMULA | ARRAY | TABLE => (),
                    _ => break,
                }
            }
            Err(XlsError::FormulaValueError(result).into())
        }
        1 => {
            let value = if (result >> 16) & 0xFF != 0 { "1" } else { "0" };
            Ok((Either::Right(CellType::Boolean), value.to_owned()))
        }
        2 => Ok((Either::Right(CellType::Error), to_error_value(((result >> 16) & 0xFF) as u8).to_owned())),
        // Empty string
        3 => Ok((Either::Right(CellType::Text), String::new())),
        _ => Err(XlsError::FormulaValueError(result).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::spreadsheet::cell::CellValue;
    use crate::spreadsheet::read_workbook;
    use crate::spreadsheet::testing;
    use crate::spreadsheet::testing::record;

    fn criteria() -> Criteria {
        Criteria {
            error_as_null: true,
            ..Criteria::default()
        }
    }

    fn position(row: u16, col: u16, xf: u16) -> Vec<u8> {
        [row.to_le_bytes(), col.to_le_bytes(), xf.to_le_bytes()].concat()
    }

    fn number(row: u16, col: u16, xf: u16, value: f64) -> Vec<u8> {
        record(NUMBER, &[position(row, col, xf), value.to_le_bytes().to_vec()].concat())
    }

    fn label(row: u16, col: u16, text: &str) -> Vec<u8> {
        record(LABEL, &[position(row, col, 0), testing::xl_string(text)].concat())
    }

    fn bool_err(row: u16, col: u16, value: u8, is_error: bool) -> Vec<u8> {
        record(BOOL_ERR, &[position(row, col, 0), vec![value, is_error as u8]].concat())
    }

    fn formula(row: u16, col: u16, result: u64) -> Vec<u8> {
        // Result, flags, chn and an empty token array
        record(FORMULA, &[position(row, col, 0), result.to_le_bytes().to_vec(), vec![0; 8]].concat())
    }

    /// XF 0 is General, XF 1 a built-in date, XF 2 a custom date/time format.
    fn styles() -> Vec<Vec<u8>> {
        let xf = |format: u16| record(XF, &[vec![0, 0], format.to_le_bytes().to_vec(), vec![0; 16]].concat());
        vec![
            record(FORMAT, &[164u16.to_le_bytes().to_vec(), testing::xl_string("yyyy-mm-dd hh:mm")].concat()),
            xf(0),
            xf(14),
            xf(164),
        ]
    }

    fn book(globals: Vec<Vec<u8>>, cells: Vec<Vec<u8>>) -> Vec<u8> {
        let stream = testing::biff8_workbook(&globals, &[("Orders", cells)]);
        testing::cfb(&[("Workbook", stream)])
    }

    #[test]
    fn reads_typed_cells() {
        let mut mul_rk = position(2, 0, 0);
        mul_rk.extend_from_slice(&((3u32 << 2) | 0x02).to_le_bytes());
        mul_rk.extend_from_slice(&1u16.to_le_bytes());
        mul_rk.extend_from_slice(&((45306u32 << 2) | 0x02).to_le_bytes());
        // Last column
        mul_rk.extend_from_slice(&1u16.to_le_bytes());
        let cells = vec![
            label(0, 0, "id"),
            label(0, 1, "placed"),
            label(0, 2, "paid"),
            label(0, 3, "note"),
            number(1, 0, 0, 1.0),
            number(1, 1, 1, 45306.0),
            bool_err(1, 2, 1, false),
            label(1, 3, "Überweisung"),
            record(MUL_RK, &mul_rk),
            formula(2, 2, 0xFFFF_0000_0000_0001),
            formula(2, 3, 0xFFFF_0000_0000_0000),
            record(SHARED_FORMULA, &[0; 10]),
            record(STRING, &testing::xl_string("pending")),
            number(3, 0, 0, 2.5),
            number(3, 1, 2, 45306.75),
            formula(3, 3, 0xFFFF_0000_0000_0003),
        ];
        let workbook = read_workbook(&book(styles(), cells), &criteria()).unwrap();
        let sheet = &workbook.sheets()[0];
        assert_eq!(sheet.name(), "Orders");
        assert_eq!(sheet.header(), vec!["id", "placed", "paid", "note"]);
        let rows: Vec<_> = sheet.rows().collect();
        assert_eq!(rows, vec![
            vec![
                CellValue::Number("1".to_owned()),
                CellValue::DateTime("2024-01-15".to_owned()),
                CellValue::Boolean(true),
                CellValue::Text("Überweisung".to_owned()),
            ],
            vec![
                CellValue::Number("3".to_owned()),
                CellValue::DateTime("2024-01-15".to_owned()),
                CellValue::Boolean(false),
                CellValue::Text("pending".to_owned()),
            ],
            vec![
                CellValue::Number("2.5".to_owned()),
                CellValue::DateTime("2024-01-15 18:00:00".to_owned()),
                CellValue::Empty,
                CellValue::Empty,
            ],
        ]);
    }

    #[test]
    fn error_cells() {
        let cells = vec![label(0, 0, "ratio"), bool_err(1, 0, 0x07, true), formula(2, 0, 0xFFFF_0000_002A_0002)];
        let workbook = read_workbook(&book(vec![], cells.to_owned()), &criteria()).unwrap();
        assert_eq!(workbook.sheets()[0].rows().count(), 0);

        let failing = Criteria {
            error_as_null: false,
            ..criteria()
        };
        let error = read_workbook(&book(vec![], cells), &failing).unwrap_err();
        assert_eq!(error.to_string(), "Invalid value '#DIV/0!' at 'Orders'!A2");
    }

    #[test]
    fn shared_strings_and_1904_dates() {
        let sst = [
            2u32.to_le_bytes().to_vec(),
            2u32.to_le_bytes().to_vec(),
            testing::xl_string("day"),
            testing::xl_string("Straße"),
        ]
        .concat();
        let globals = [vec![record(DATE1904, &[1, 0]), record(SST, &sst)], styles()].concat();
        let label_sst = |row: u16, index: u32| record(LABEL_SST, &[position(row, 0, 0), index.to_le_bytes().to_vec()].concat());
        let cells = vec![label_sst(0, 0), number(1, 0, 1, 0.0), label_sst(2, 1)];
        let workbook = read_workbook(&book(globals.to_owned(), cells), &criteria()).unwrap();
        let rows: Vec<_> = workbook.sheets()[0].rows().collect();
        assert_eq!(workbook.sheets()[0].header(), vec!["day"]);
        assert_eq!(rows, vec![
            vec![CellValue::DateTime("1904-01-01".to_owned())],
            vec![CellValue::Text("Straße".to_owned())],
        ]);

        let error = read_workbook(&book(globals, vec![label_sst(0, 9)]), &criteria()).unwrap_err();
        assert!(matches!(error, Sheet2SqlError::XlsError(XlsError::SharedStringError(9))));
    }

    #[test]
    fn ranges_and_sheet_filters() {
        let cells = vec![label(0, 0, "title"), label(2, 1, "id"), number(3, 1, 0, 7.0), number(3, 2, 0, 8.0)];
        let range = Criteria {
            range: Some(crate::database::range::Range::try_from("B3:B").unwrap()),
            ..criteria()
        };
        let workbook = read_workbook(&book(vec![], cells.to_owned()), &range).unwrap();
        let sheet = &workbook.sheets()[0];
        assert_eq!(sheet.header(), vec!["id"]);
        assert_eq!(sheet.rows().collect::<Vec<_>>(), vec![vec![CellValue::Number("7".to_owned())]]);

        let no_match = Criteria {
            sheet_name_patterns: Some(vec![glob::Pattern::new("Customers").unwrap()]),
            ..criteria()
        };
        let workbook = read_workbook(&book(vec![], cells), &no_match).unwrap();
        assert!(workbook.sheets().is_empty());
    }

    #[test]
    fn rejects_encrypted_and_old_workbooks() {
        let globals = vec![record(FILE_PASS, &[1, 0, 1, 0, 1, 0])];
        let error = read_workbook(&book(globals, vec![]), &criteria()).unwrap_err();
        assert!(matches!(error, Sheet2SqlError::SpreadsheetError(SpreadsheetError::SpreadsheetPasswordProtectedError)));

        let mut stream = testing::biff8_workbook(&[], &[("Sheet1", vec![])]);
        stream[4] = 0x00;
        stream[5] = 0x05;
        let error = read_workbook(&testing::cfb(&[("Workbook", stream)]), &criteria()).unwrap_err();
        assert_eq!(error.to_string(), "Unsupported Excel binary version 0x0500; save the file as .xlsx");
        assert_eq!(error.kind(), ErrorKind::Format);

        let stream = [record(BOF, &[0x00, 0x06, 0x05, 0x00]), record(EOF, &[])].concat();
        let error = read_workbook(&testing::cfb(&[("Workbook", stream)]), &criteria()).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::EmptyInput);
    }

    #[test]
    fn truncated_records_fail() {
        let cells = vec![record(NUMBER, &[1, 0, 0, 0, 0, 0, 0x40])];
        let error = read_workbook(&book(vec![], cells), &criteria()).unwrap_err();
        assert!(matches!(error, Sheet2SqlError::Biff8Error(_)));
        assert_eq!(error.kind(), ErrorKind::Format);
    }
}

//! # Sheet Reader
//!
//! Reads spreadsheet bytes into a [`Workbook`] of [`Sheet`]s. The container
//! format is detected from the bytes themselves: Office Open XML workbooks
//! (`.xlsx`, `.xlsm`), Excel 97-2003 workbooks (`.xls`) and OpenDocument
//! spreadsheets (`.ods`) are supported.
pub(crate) mod cell;
pub(crate) mod criteria;
pub(crate) mod ods;
pub(crate) mod reference;
pub(crate) mod sheet;
pub(crate) mod xls;
pub(crate) mod xlsx;

use crate::error::Sheet2SqlError;
use crate::helpers::cfb::Cfb;
use crate::helpers::zip::ZipHelper;
use crate::spreadsheet::criteria::Criteria;
use crate::spreadsheet::ods::OdsSpreadsheet;
use crate::spreadsheet::sheet::Sheet;
use crate::spreadsheet::xls::XlsSpreadsheet;
use crate::spreadsheet::xlsx::XlsxSpreadsheet;
use std::io::Cursor;
use thiserror::Error;
use tracing::debug;
use zip::ZipArchive;

/// Leading bytes of a ZIP local file header (and of an empty archive).
const ZIP_SIGNATURES: [&[u8]; 2] = [b"PK\x03\x04", b"PK\x05\x06"];
/// Leading bytes of an OLE compound file: legacy .xls or an encrypted workbook.
const CFB_SIGNATURE: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

/// Errors raised while reading a spreadsheet container.
#[derive(Error, Debug)]
pub enum SpreadsheetError {
    #[error("Not a recognizable spreadsheet file (expected .xlsx, .xlsm, .xls or .ods)")]
    UnknownContainerError,

    #[error("Compound file contains no Excel workbook stream")]
    CompoundFileError,

    #[error("Spreadsheet is password protected")]
    SpreadsheetPasswordProtectedError,

    #[error("Spreadsheet contains no sheets")]
    SpreadsheetEmptyError,

    #[error("Missing part '{0}' in spreadsheet container")]
    MissingPartError(String),

    #[error("Invalid OpenDocument MIME type '{0}'")]
    MimeTypeError(String),

    #[error("Invalid value '{2}' at '{0}'!{1}")]
    CellValueError(String, String, String),

    #[error("Repeat count {1} of '{0}' is out of range")]
    RepeatCountError(String, usize),

    #[error("A repeated cell of sheet '{0}' fills {1} cells")]
    RepeatedCellError(String, usize),
}

impl SpreadsheetError {
    /// True for errors that mean "nothing to read" rather than "unreadable".
    pub(crate) fn is_empty_input(&self) -> bool {
        matches!(self, SpreadsheetError::SpreadsheetEmptyError)
    }
}

/// A spreadsheet container that can produce sheets.
pub(crate) trait Spreadsheet {
    /// Reads the sheets selected by the criteria, in workbook order.
    fn read_sheets(&mut self, criteria: &Criteria) -> Result<Vec<Sheet>, Sheet2SqlError>;
}

/// The sheets of one uploaded spreadsheet, in workbook order.
#[derive(Debug)]
pub struct Workbook {
    pub(crate) sheets: Vec<Sheet>,
}

impl Workbook {
    pub fn sheets(&self) -> &[Sheet] {
        &self.sheets
    }
}

/// Reads a workbook from raw bytes.
///
/// # Errors
///
/// Fails with a format error when the bytes are not a supported container,
/// and with [`SpreadsheetError::SpreadsheetEmptyError`] when the workbook
/// declares no sheets.
pub fn read_workbook(bytes: &[u8], criteria: &Criteria) -> Result<Workbook, Sheet2SqlError> {
    let mut spreadsheet = open_spreadsheet(bytes)?;
    let sheets = spreadsheet.read_sheets(criteria)?;
    debug!(sheets = sheets.len(), "read workbook");
    Ok(Workbook { sheets })
}

/// Detects the container format and opens the matching reader.
pub(crate) fn open_spreadsheet(bytes: &[u8]) -> Result<Box<dyn Spreadsheet + '_>, Sheet2SqlError> {
    if bytes.starts_with(CFB_SIGNATURE) {
        let cfb = Cfb::new(bytes)?;
        // Encrypted OOXML packages are wrapped in a compound file
        if cfb.exists("EncryptionInfo") || cfb.exists("EncryptedPackage") {
            Err(SpreadsheetError::SpreadsheetPasswordProtectedError)?
        }
        debug!("detected legacy Excel workbook");
        return Ok(Box::new(XlsSpreadsheet::open(&cfb)?));
    }
    if !ZIP_SIGNATURES.iter().any(|signature| bytes.starts_with(signature)) {
        Err(SpreadsheetError::UnknownContainerError)?
    }

    let zip = ZipArchive::new(Cursor::new(bytes))?;
    if zip.contains("xl/workbook.xml") {
        debug!("detected Office Open XML workbook");
        Ok(Box::new(XlsxSpreadsheet::open(zip)?))
    } else if zip.contains("content.xml") {
        debug!("detected OpenDocument spreadsheet");
        Ok(Box::new(OdsSpreadsheet::open(zip)?))
    } else {
        Err(SpreadsheetError::UnknownContainerError.into())
    }
}

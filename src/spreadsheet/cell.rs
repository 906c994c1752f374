use crate::spreadsheet::reference::index_to_reference;
use crate::spreadsheet::SpreadsheetError;
use chrono::Duration;
use chrono::NaiveDate;
use iso8601_duration::Duration as IsoDuration;
use std::borrow::Cow;
use std::collections::HashMap;

/// How a cell was stored in the source file.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub(crate) enum CellType {
    #[default]
    Empty,
    /// Native boolean, value is "1" or "0"
    Boolean,
    /// Numeric literal
    Number,
    /// Date/time serial from the 1900 epoch
    NumberDateTime1900,
    /// Date serial from the 1900 epoch
    NumberDate1900,
    /// Time fraction, 1900 workbook
    NumberTime1900,
    /// Date/time serial from the 1904 epoch
    NumberDateTime1904,
    /// Date serial from the 1904 epoch
    NumberDate1904,
    /// Time fraction, 1904 workbook
    NumberTime1904,
    /// ISO 8601 date or date/time string
    IsoDateTime,
    /// ISO 8601 duration string (ODS time values)
    IsoDuration,
    /// String content, shared strings already resolved
    Text,
    /// Error value such as #DIV/0!
    Error,
}

impl CellType {
    /// Parses built-in Excel number format IDs to determine cell type.
    pub(crate) fn parse_builtin_number_format_id(id: &str, is_1904: bool) -> Option<Self> {
        match id {
            "22" => Some(if is_1904 { Self::NumberDateTime1904 } else { Self::NumberDateTime1900 }),
            "14" | "15" | "16" | "17" => Some(if is_1904 { Self::NumberDate1904 } else { Self::NumberDate1900 }),
            "18" | "19" | "20" | "21" | "45" | "46" | "47" => Some(if is_1904 { Self::NumberTime1904 } else { Self::NumberTime1900 }),
            _ => None,
        }
    }

    /// Maps the number format id of every cell style to a cell type. Custom
    /// format codes take precedence over built-in ids.
    pub(crate) fn resolve_number_formats(format_ids: &[String], custom_formats: &HashMap<String, String>, is_1904: bool) -> Vec<Self> {
        format_ids
            .iter()
            .map(|id| match custom_formats.get(id) {
                Some(format) => Self::parse_custom_number_format(format, is_1904),
                None => Self::parse_builtin_number_format_id(id, is_1904).unwrap_or(Self::Number),
            })
            .collect()
    }

    /// Parses custom number format codes, looking for date and time tokens
    /// outside of quoted literals, escapes and bracketed sections.
    pub(crate) fn parse_custom_number_format(format: &str, is_1904: bool) -> Self {
        let mut is_escaped = false;
        let mut is_literal = false;
        let mut is_bracket = false;
        let mut is_date = false;
        let mut is_time = false;
        for character in format.chars() {
            match character {
                _ if is_escaped => is_escaped = false,
                '_' | '\\' if !is_literal => is_escaped = true,

                '"' if is_literal => is_literal = false,
                '"' if !is_bracket => is_literal = true,

                ']' if is_bracket => is_bracket = false,
                '[' if !is_literal => is_bracket = true,
                _ if is_literal || is_bracket => (),

                'Y' | 'y' | 'D' | 'd' => is_date = true,
                'H' | 'h' | 'S' | 's' => is_time = true,
                _ => (),
            }
        }

        match (is_date, is_time, is_1904) {
            (true, true, false) => Self::NumberDateTime1900,
            (true, true, true) => Self::NumberDateTime1904,
            (true, false, false) => Self::NumberDate1900,
            (true, false, true) => Self::NumberDate1904,
            (false, true, false) => Self::NumberTime1900,
            (false, true, true) => Self::NumberTime1904,
            (false, false, _) => Self::Number,
        }
    }
}

/// Display text of a binary error code.
pub(crate) fn to_error_value(code: u8) -> &'static str {
    match code {
        0x00 => "#NULL!",
        0x07 => "#DIV/0!",
        0x0F => "#VALUE!",
        0x17 => "#REF!",
        0x1D => "#NAME?",
        0x24 => "#NUM!",
        0x2A => "#N/A",
        0x2B => "#GETTING_DATA",
        _ => "#ERROR!",
    }
}

/// A raw cell value as read from the sheet. Values stay untyped text where
/// the container allows it; the analysis decides what they are.
#[derive(Clone, Debug, PartialEq)]
pub enum CellValue {
    Empty,
    Boolean(bool),
    /// Numeric literal exactly as stored, e.g. "19.5" or "1.2E-3"
    Number(String),
    /// ISO 8601 date, time or date/time text
    DateTime(String),
    Text(String),
}

impl CellValue {
    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    /// Returns the value as the text a user would see in the cell.
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            CellValue::Empty => Cow::Borrowed(""),
            CellValue::Boolean(true) => Cow::Borrowed("true"),
            CellValue::Boolean(false) => Cow::Borrowed("false"),
            CellValue::Number(value) | CellValue::DateTime(value) | CellValue::Text(value) => Cow::Borrowed(value),
        }
    }
}

/// A single non-empty cell with its position.
#[derive(Clone, Debug)]
pub(crate) struct Cell {
    /// Row index (0-based)
    pub(crate) row: usize,
    /// Column index (0-based)
    pub(crate) col: usize,
    pub(crate) kind: CellType,
    pub(crate) value: String,
}

impl Cell {
    /// Returns the Excel-style cell reference (e.g., "A1", "B2").
    pub(crate) fn reference(&self) -> String {
        index_to_reference(self.row, self.col)
    }

    /// Error for a cell whose stored value cannot be read.
    pub(crate) fn value_error(&self, sheet_name: &str) -> SpreadsheetError {
        SpreadsheetError::CellValueError(sheet_name.to_owned(), self.reference(), self.value.to_owned())
    }

    /// Converts the stored value into a [`CellValue`]. Date serials become
    /// ISO text; a serial that cannot be converted stays a number.
    pub(crate) fn to_value(&self) -> CellValue {
        let converted = match self.kind {
            CellType::Empty | CellType::Error => return CellValue::Empty,
            CellType::Boolean => return CellValue::Boolean(self.value == "1" || self.value.eq_ignore_ascii_case("true")),
            CellType::Number => return CellValue::Number(self.value.to_owned()),
            CellType::Text => return CellValue::Text(self.value.to_owned()),
            CellType::NumberDate1900 => to_date_string(&self.value, false),
            CellType::NumberDate1904 => to_date_string(&self.value, true),
            CellType::NumberTime1900 | CellType::NumberTime1904 => to_time_string(&self.value),
            CellType::NumberDateTime1900 => to_datetime_string(&self.value, false),
            CellType::NumberDateTime1904 => to_datetime_string(&self.value, true),
            CellType::IsoDateTime => Some(normalize_iso_datetime(&self.value)),
            CellType::IsoDuration => duration_to_time_string(&self.value),
        };
        match converted {
            Some(value) => CellValue::DateTime(value),
            None => CellValue::Number(self.value.to_owned()),
        }
    }
}

/// Converts an Excel date serial to an ISO date.
/// Serials below 60 are shifted by a day for the Lotus 1-2-3 leap year bug.
fn to_date_string(value: &str, is_1904: bool) -> Option<String> {
    let days = value.parse::<f64>().ok()?.trunc();
    if !days.is_finite() || days.abs() > 3_000_000f64 {
        return None;
    }
    let days = days as i64;
    let offset = if is_1904 {
        1462
    } else if days < 60 {
        1
    } else {
        0
    };
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30).expect("NaiveDate literal");
    let date = epoch.checked_add_signed(Duration::try_days(days + offset)?)?;
    Some(date.format("%Y-%m-%d").to_string())
}

/// Converts the fractional part of an Excel serial to a time of day.
fn to_time_string(value: &str) -> Option<String> {
    let factor = value.parse::<f64>().ok()?;
    if !factor.is_finite() {
        return None;
    }
    let mut remaining = (factor.fract().abs() * 86_400_000f64).round() as i64;
    let milliseconds = remaining % 1_000;
    remaining /= 1_000;
    let seconds = remaining % 60;
    remaining /= 60;
    let minutes = remaining % 60;
    // A fraction that rounds up to a full day wraps to midnight
    let hours = (remaining / 60) % 24;
    if milliseconds > 0 {
        Some(format!("{hours:02}:{minutes:02}:{seconds:02}.{milliseconds:03}"))
    } else {
        Some(format!("{hours:02}:{minutes:02}:{seconds:02}"))
    }
}

/// Converts an Excel serial to an ISO date/time ("YYYY-MM-DD HH:MM:SS").
fn to_datetime_string(value: &str, is_1904: bool) -> Option<String> {
    let date = to_date_string(value, is_1904)?;
    let time = to_time_string(value)?;
    Some(format!("{date} {time}"))
}

/// Drops zero times from ISO date/times and the date from values that sit on
/// the spreadsheet epoch, which is how time-only cells are stored.
fn normalize_iso_datetime(value: &str) -> String {
    let value = value.trim_end_matches('Z');
    match value.split_once('T') {
        Some((date, "00:00:00")) => date.to_owned(),
        Some(("1899-12-30" | "1899-12-31" | "1900-01-01" | "1904-01-01", time)) => time.to_owned(),
        Some((date, time)) => format!("{date} {time}"),
        None => value.to_owned(),
    }
}

/// Converts an ISO 8601 duration such as "PT10H30M00S" to "10:30:00".
fn duration_to_time_string(value: &str) -> Option<String> {
    let duration = value.parse::<IsoDuration>().ok()?;
    let hours = (duration.day * 24f32 + duration.hour) as i64;
    let minutes = duration.minute as i64;
    let seconds = duration.second as i64;
    Some(format!("{hours:02}:{minutes:02}:{seconds:02}"))
}

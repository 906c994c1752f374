use crate::spreadsheet::reference::col_to_index;
use crate::spreadsheet::reference::row_to_index;
use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

/// Errors related to Excel-style range parsing.
#[derive(Error, Debug)]
pub enum RangeError {
    #[error("Invalid range format '{0}'")]
    FormatError(String),

    #[error("Range '{0}' ends before it starts")]
    BoundError(String),
}

static RANGE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Z]*)(\d*)(:([A-Z]*)(\d*))?$").expect("Hardcode regex pattern"));

/// An Excel-style cell range with optional boundaries, all 0-based.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Range {
    /// Lower row bound, None for unbounded
    pub row_lower_bound: Option<usize>,
    /// Upper row bound, None for unbounded
    pub row_upper_bound: Option<usize>,
    /// Lower column bound, None for unbounded
    pub col_lower_bound: Option<usize>,
    /// Upper column bound, None for unbounded
    pub col_upper_bound: Option<usize>,
}

impl TryFrom<&str> for Range {
    type Error = RangeError;

    /// Parses an Excel-style range string (e.g., "A1", "B2:C5", "A:C", "3:10").
    /// A single cell reference only fixes the top-left corner.
    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let value = value.trim().to_ascii_uppercase();
        let captures = RANGE_PATTERN
            .captures(value.as_str())
            .filter(|_| !value.is_empty())
            .ok_or_else(|| RangeError::FormatError(value.to_owned()))?;
        let bound = |index: usize, parse: fn(&str) -> Option<usize>| {
            captures.get(index).map(|matcher| matcher.as_str()).and_then(parse)
        };
        let range = Range {
            col_lower_bound: bound(1, col_to_index),
            row_lower_bound: bound(2, row_to_index),
            col_upper_bound: bound(4, col_to_index),
            row_upper_bound: bound(5, row_to_index),
        };
        let rows_reversed = range.row_lower_bound.zip(range.row_upper_bound).map(|(lower, upper)| upper < lower);
        let cols_reversed = range.col_lower_bound.zip(range.col_upper_bound).map(|(lower, upper)| upper < lower);
        if rows_reversed.unwrap_or(false) || cols_reversed.unwrap_or(false) {
            Err(RangeError::BoundError(value.clone()))
        } else {
            Ok(range)
        }
    }
}

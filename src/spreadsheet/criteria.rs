use crate::database::range::Range;
use glob::Pattern;

/// Criteria for selecting data from spreadsheets.
#[derive(Clone, Debug, Default)]
pub struct Criteria {
    /// Sheet name patterns for filtering which sheets to process.
    pub sheet_name_patterns: Option<Vec<Pattern>>,

    /// Data range within sheets to extract; its first row is the header.
    pub range: Option<Range>,

    /// Maximum number of data rows to read per sheet.
    pub rows_limit: Option<usize>,

    /// Read error cells (#N/A, #DIV/0!, ...) as empty instead of failing.
    pub error_as_null: bool,

    /// Skip rows where all columns are empty.
    pub skip_empty_rows: bool,
}

impl Criteria {
    /// Checks if a sheet name matches the criteria patterns.
    /// Returns true if no patterns are specified or if name matches any pattern.
    pub(crate) fn accept(&self, sheet_name: &str) -> bool {
        match &self.sheet_name_patterns {
            Some(patterns) => patterns.iter().any(|pattern| pattern.matches(sheet_name)),
            None => true,
        }
    }
}

//! Conversion settings, loadable from camelCase JSON.
use crate::database::range::Range;
use crate::error::Sheet2SqlError;
use crate::spreadsheet::criteria::Criteria;
use glob::Pattern;
use serde::Deserialize;
use serde::Serialize;

/// Settings of one conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct Config {
    /// Number of data rows that decide column types (None = all rows)
    pub sample_row_limit: Option<usize>,

    /// Values read as booleans, matched case-insensitively
    pub boolean_token_set: Vec<String>,

    /// Ascending VARCHAR sizes; longer text becomes TEXT
    pub varchar_buckets: Vec<u32>,

    /// Fail instead of falling back to text for mixed columns
    pub strict: bool,

    /// Values read as empty cells, matched case-insensitively
    pub null_tokens: Vec<String>,

    /// Sheet name glob patterns; empty selects every sheet
    pub sheets: Vec<String>,

    /// A1-style range whose first row is the header
    pub range: Option<String>,

    /// Maximum number of data rows read per sheet
    pub row_limit: Option<usize>,

    /// Drop data rows without any value; they count as NULLs when kept
    pub skip_empty_rows: bool,

    /// Read error cells such as #DIV/0! as empty instead of failing
    pub error_as_null: bool,

    /// Add "possible foreign key" comments to the DDL
    pub annotate_foreign_keys: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sample_row_limit: None,
            boolean_token_set: ["true", "false", "yes", "no", "0", "1"].map(String::from).to_vec(),
            varchar_buckets: vec![50, 100, 255, 1000],
            strict: false,
            null_tokens: Vec::new(),
            sheets: Vec::new(),
            range: None,
            row_limit: None,
            skip_empty_rows: false,
            error_as_null: true,
            annotate_foreign_keys: false,
        }
    }
}

impl Config {
    /// Parses and validates a JSON configuration. Missing keys take their
    /// defaults.
    pub fn from_json(json: &str) -> Result<Self, Sheet2SqlError> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks settings that serde cannot.
    pub fn validate(&self) -> Result<(), Sheet2SqlError> {
        if self.sample_row_limit == Some(0) {
            Err(Sheet2SqlError::ConfigError("sampleRowLimit must be positive".to_owned()))?
        }
        if self.row_limit == Some(0) {
            Err(Sheet2SqlError::ConfigError("rowLimit must be positive".to_owned()))?
        }
        if self.varchar_buckets.is_empty() {
            Err(Sheet2SqlError::ConfigError("varcharBuckets must not be empty".to_owned()))?
        }
        if self.varchar_buckets.contains(&0) {
            Err(Sheet2SqlError::ConfigError("varcharBuckets must be positive".to_owned()))?
        }
        if self.varchar_buckets.windows(2).any(|pair| pair[0] >= pair[1]) {
            Err(Sheet2SqlError::ConfigError(format!(
                "varcharBuckets must be strictly increasing, got {:?}",
                self.varchar_buckets
            )))?
        }
        self.criteria()?;
        Ok(())
    }

    /// Reading criteria for the sheet reader.
    pub fn criteria(&self) -> Result<Criteria, Sheet2SqlError> {
        let sheet_name_patterns = if self.sheets.is_empty() {
            None
        } else {
            Some(self.sheets.iter().map(|pattern| Pattern::new(pattern)).collect::<Result<Vec<_>, _>>()?)
        };
        let range = self.range.as_deref().map(Range::try_from).transpose()?;
        Ok(Criteria {
            sheet_name_patterns,
            range,
            rows_limit: self.row_limit,
            error_as_null: self.error_as_null,
            skip_empty_rows: self.skip_empty_rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn defaults() {
        let config = Config::from_json("{}").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.varchar_buckets, vec![50, 100, 255, 1000]);
        assert!(!config.skip_empty_rows);
        assert!(config.error_as_null);
        let criteria = config.criteria().unwrap();
        assert!(criteria.sheet_name_patterns.is_none());
        assert!(criteria.range.is_none());
    }

    #[test]
    fn parse_json() {
        let config = Config::from_json(
            r#"{"sampleRowLimit": 100, "booleanTokenSet": ["Y", "N"], "varcharBuckets": [20, 200],
                "sheets": ["Sales*"], "range": "A3:F", "rowLimit": 10, "annotateForeignKeys": true}"#,
        )
        .unwrap();
        assert_eq!(config.sample_row_limit, Some(100));
        assert_eq!(config.boolean_token_set, vec!["Y", "N"]);
        assert!(config.annotate_foreign_keys);
        let criteria = config.criteria().unwrap();
        assert!(criteria.accept("Sales 2024"));
        assert!(!criteria.accept("Summary"));
        assert_eq!(criteria.range.and_then(|range| range.row_lower_bound), Some(2));
        assert_eq!(criteria.rows_limit, Some(10));
    }

    #[test]
    fn reject_invalid_settings() {
        for json in [
            r#"{"sampleRowLimit": 0}"#,
            r#"{"rowLimit": 0}"#,
            r#"{"varcharBuckets": []}"#,
            r#"{"varcharBuckets": [0, 10]}"#,
            r#"{"varcharBuckets": [100, 50]}"#,
            r#"{"varcharBuckets": [50, 50]}"#,
            r#"{"sheets": ["[a"]}"#,
            r#"{"range": "C1:A1"}"#,
            r#"{"range": "1A"}"#,
            r#"{"unknownKey": true}"#,
        ] {
            let error = Config::from_json(json).unwrap_err();
            assert_eq!(error.kind(), ErrorKind::Config, "{json}");
        }
    }
}

use crate::error::Sheet2SqlError;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::LazyLock;
use thiserror::Error;

/// Errors related to column type parsing.
#[derive(Error, Debug)]
pub enum ColumnError {
    #[error("Invalid column type '{0}'")]
    TypeError(String),
}

static SIZED_TYPE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Z ]+?)\s*(?:\(\s*(\d+)\s*(?:,\s*(\d+)\s*)?\))?$").expect("Hardcode regex pattern")
});

/// SQL column types produced by inference.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(into = "String")]
pub enum ColumnType {
    Boolean,
    /// Fits a signed 32-bit integer
    Integer,
    /// Fits a signed 64-bit integer
    BigInt,
    /// Exact numeric with total digits and fractional digits
    Decimal { precision: u32, scale: u32 },
    Date,
    Time,
    Timestamp,
    /// Bounded text, sized by a length bucket
    Varchar(u32),
    /// Unbounded text
    Text,
}

impl ColumnType {
    /// Parses a SQL type name as written by [`fmt::Display`], accepting the
    /// common aliases.
    pub fn parse(name: &str) -> Result<Self, Sheet2SqlError> {
        let upper = name.trim().to_ascii_uppercase();
        let captures = SIZED_TYPE_PATTERN
            .captures(&upper)
            .ok_or_else(|| ColumnError::TypeError(name.to_owned()))?;
        let size = |index: usize| captures.get(index).map(|matcher| matcher.as_str().parse::<u32>()).transpose();
        let kind = match (&captures[1], size(2)?, size(3)?) {
            ("BOOL" | "BOOLEAN", None, None) => Self::Boolean,
            ("INT" | "INTEGER" | "INT4", None, None) => Self::Integer,
            ("BIGINT" | "INT8", None, None) => Self::BigInt,
            ("DECIMAL" | "NUMERIC", Some(precision), scale) => Self::Decimal {
                precision,
                scale: scale.unwrap_or(0),
            },
            ("DATE", None, None) => Self::Date,
            ("TIME", None, None) => Self::Time,
            ("TIMESTAMP" | "DATETIME", None, None) => Self::Timestamp,
            ("VARCHAR" | "CHARACTER VARYING", Some(length), None) => Self::Varchar(length),
            ("TEXT", None, None) => Self::Text,
            _ => Err(ColumnError::TypeError(name.to_owned()))?,
        };
        Ok(kind)
    }

    /// Returns true for the integer types.
    #[inline]
    pub fn is_integer(&self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::BigInt)
    }

    /// Returns true for the text types.
    #[inline]
    pub fn is_text(&self) -> bool {
        matches!(self, ColumnType::Varchar(_) | ColumnType::Text)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Boolean => f.write_str("BOOLEAN"),
            ColumnType::Integer => f.write_str("INTEGER"),
            ColumnType::BigInt => f.write_str("BIGINT"),
            ColumnType::Decimal { precision, scale } => write!(f, "DECIMAL({precision},{scale})"),
            ColumnType::Date => f.write_str("DATE"),
            ColumnType::Time => f.write_str("TIME"),
            ColumnType::Timestamp => f.write_str("TIMESTAMP"),
            ColumnType::Varchar(length) => write!(f, "VARCHAR({length})"),
            ColumnType::Text => f.write_str("TEXT"),
        }
    }
}

impl From<ColumnType> for String {
    fn from(kind: ColumnType) -> Self {
        kind.to_string()
    }
}

/// An inferred column of a table.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    /// Sanitized, unique identifier
    pub name: String,
    /// Header text as found in the sheet
    pub header: String,
    #[serde(rename = "type")]
    pub kind: ColumnType,
    pub nullable: bool,
    pub primary_key: bool,
    /// Longest value observed, in UTF-8 bytes
    pub max_length: usize,
    /// Table this column probably references, advisory only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub foreign_key: Option<String>,
}

impl Column {
    pub fn new(name: &str, header: &str, kind: ColumnType, nullable: bool) -> Self {
        Self {
            name: name.to_owned(),
            header: header.to_owned(),
            kind,
            nullable,
            primary_key: false,
            max_length: 0,
            foreign_key: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_types() {
        assert_eq!(ColumnType::Decimal { precision: 4, scale: 2 }.to_string(), "DECIMAL(4,2)");
        assert_eq!(ColumnType::Varchar(255).to_string(), "VARCHAR(255)");
        assert_eq!(ColumnType::BigInt.to_string(), "BIGINT");
    }

    #[test]
    fn parse_types() {
        assert_eq!(ColumnType::parse("integer").unwrap(), ColumnType::Integer);
        assert_eq!(ColumnType::parse("DECIMAL(10, 3)").unwrap(), ColumnType::Decimal { precision: 10, scale: 3 });
        assert_eq!(ColumnType::parse("numeric(5)").unwrap(), ColumnType::Decimal { precision: 5, scale: 0 });
        assert_eq!(ColumnType::parse("varchar(100)").unwrap(), ColumnType::Varchar(100));
        assert_eq!(ColumnType::parse("DATETIME").unwrap(), ColumnType::Timestamp);
        assert!(ColumnType::parse("VARCHAR").is_err());
        assert!(ColumnType::parse("BLOB").is_err());
        assert!(ColumnType::parse("INTEGER(3,4)").is_err());
    }

    #[test]
    fn serialize_column() {
        let mut column = Column::new("price", "Price ($)", ColumnType::Decimal { precision: 4, scale: 2 }, false);
        column.max_length = 5;
        let json = serde_json::to_value(&column).unwrap();
        assert_eq!(json, serde_json::json!({
            "name": "price",
            "header": "Price ($)",
            "type": "DECIMAL(4,2)",
            "nullable": false,
            "primaryKey": false,
            "maxLength": 5,
        }));
    }
}

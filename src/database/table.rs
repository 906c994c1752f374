use crate::database::column::Column;
use serde::Serialize;

/// A table inferred from one sheet.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    /// Sanitized, unique table name
    pub name: String,
    /// Sheet the table was read from
    pub sheet: String,
    /// Columns in header order
    pub columns: Vec<Column>,
    /// Name of the primary key column, if one qualified
    pub primary_key: Option<String>,
    /// Number of data rows below the header
    pub row_count: usize,
}

impl Table {
    /// Finds a column by its sanitized name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|column| column.name == name)
    }

    /// Advisory foreign key hints as (column, referenced table) pairs.
    pub fn foreign_key_hints(&self) -> impl Iterator<Item = (&str, &str)> {
        self.columns
            .iter()
            .filter_map(|column| column.foreign_key.as_deref().map(|table| (column.name.as_str(), table)))
    }
}

//! # sheet2sql
//!
//! Infers SQL `CREATE TABLE` schemas from spreadsheet files.
//!
//! ## Features
//!
//! - **Content-based format detection**: Office Open XML workbooks (`.xlsx`, `.xlsm`),
//!   Excel 97-2003 workbooks (`.xls`) and OpenDocument spreadsheets (`.ods`),
//!   recognized from their bytes
//! - **Column type inference**: Boolean, Integer, BigInt, Decimal, Date, Time, Timestamp,
//!   Varchar and Text, decided from cell content rather than cell formatting
//! - **Constraint detection**: primary key candidates and advisory foreign key hints
//! - **Deterministic DDL**: the same input always renders byte-identical SQL
//! - **Custom data ranges**: sheet filters, A1-style ranges and row limits
//!
//! ## Usage
//!
//! ```no_run
//! let bytes = std::fs::read("products.xlsx").unwrap();
//! let conversion = sheet2sql::convert(&bytes, "products.xlsx", &sheet2sql::Config::default()).unwrap();
//! println!("{}", conversion.sql);
//! ```
pub mod analysis;
pub mod config;
pub mod database;
pub mod error;
mod helpers;
pub mod spreadsheet;

pub use crate::analysis::Analysis;
pub use crate::analysis::Warning;
pub use crate::config::Config;
pub use crate::database::column::Column;
pub use crate::database::column::ColumnType;
pub use crate::database::ddl::emit;
pub use crate::database::ddl::parse_columns;
pub use crate::database::table::Table;
pub use crate::error::ErrorKind;
pub use crate::error::Sheet2SqlError;

use crate::analysis::analyze_workbook;
use crate::error::ResultMessage;
use crate::spreadsheet::read_workbook;
use serde::Serialize;
use tracing::info;

/// Result of converting one spreadsheet.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Conversion {
    pub tables: Vec<Table>,
    pub sql: String,
    pub warnings: Vec<Warning>,
}

/// Reads a spreadsheet and infers its tables without rendering DDL.
///
/// `file_name` is only used for table names of unnamed sheets and for error
/// messages.
pub fn analyze(bytes: &[u8], file_name: &str, config: &Config) -> Result<Analysis, Sheet2SqlError> {
    let result = config.validate().and_then(|_| {
        let workbook = read_workbook(bytes, &config.criteria()?)?;
        analyze_workbook(&workbook, file_name, config)
    });
    result.with_prefix(file_name)
}

/// Reads a spreadsheet and renders one `CREATE TABLE` per non-empty sheet.
pub fn convert(bytes: &[u8], file_name: &str, config: &Config) -> Result<Conversion, Sheet2SqlError> {
    let Analysis { tables, warnings } = analyze(bytes, file_name, config)?;
    let sql = emit(&tables, config.annotate_foreign_keys);
    info!(file = file_name, tables = tables.len(), warnings = warnings.len(), "converted spreadsheet");
    Ok(Conversion { tables, sql, warnings })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spreadsheet::testing::xls;
    use crate::spreadsheet::testing::xlsx;
    use pretty_assertions::assert_eq;

    fn products() -> Vec<u8> {
        xlsx(&[(
            "Products",
            vec![vec!["id", "name", "price"], vec!["1", "Widget", "9.99"], vec!["2", "Gadget", "19.5"]],
        )])
    }

    #[test]
    fn convert_products() {
        let conversion = convert(&products(), "products.xlsx", &Config::default()).unwrap();
        assert_eq!(
            conversion.sql,
            r#"CREATE TABLE "products" (
  "id" INTEGER PRIMARY KEY,
  "name" VARCHAR(50) NOT NULL,
  "price" DECIMAL(4,2) NOT NULL
);"#
        );
        assert!(conversion.warnings.is_empty());
    }

    #[test]
    fn convert_legacy_workbook() {
        let bytes = xls(&[(
            "Products",
            vec![vec!["id", "name", "price"], vec!["1", "Widget", "9.99"], vec!["2", "Gadget", "19.5"]],
        )]);
        let conversion = convert(&bytes, "products.xls", &Config::default()).unwrap();
        let expected = convert(&products(), "products.xlsx", &Config::default()).unwrap();
        assert_eq!(conversion.sql, expected.sql);
    }

    #[test]
    fn convert_is_deterministic() {
        let bytes = xlsx(&[
            ("Orders", vec![vec!["order_id", "customer_id", "placed"], vec!["1", "7", "2024-01-02"], vec!["2", "8", "2024-01-03"]]),
            ("Customers", vec![vec!["Customer ID", "Name", "Active"], vec!["7", "Ann", "YES"], vec!["8", "Bo", "NO"]]),
        ]);
        let config = Config {
            annotate_foreign_keys: true,
            ..Config::default()
        };
        let first = convert(&bytes, "shop.xlsx", &config).unwrap();
        let second = convert(&bytes, "shop.xlsx", &config).unwrap();
        assert_eq!(first.sql, second.sql);
        assert_eq!(
            first.sql,
            r#"CREATE TABLE "orders" (
  "order_id" INTEGER PRIMARY KEY,
  "customer_id" INTEGER NOT NULL, -- possible foreign key to "customer"
  "placed" DATE NOT NULL
);

CREATE TABLE "customers" (
  "customer_id" INTEGER PRIMARY KEY,
  "name" VARCHAR(50) NOT NULL,
  "active" BOOLEAN NOT NULL
);"#
        );
    }

    #[test]
    fn nullable_and_header_only() {
        let bytes = xlsx(&[
            ("Counts", vec![vec!["n"], vec!["1"], vec![""], vec!["3"]]),
            ("Empty Table", vec![vec!["id", "label"]]),
        ]);
        let conversion = convert(&bytes, "book.xlsx", &Config::default()).unwrap();
        assert_eq!(
            conversion.sql,
            r#"CREATE TABLE "counts" (
  "n" INTEGER
);

CREATE TABLE "empty_table" (
  "id" VARCHAR(50),
  "label" VARCHAR(50)
);"#
        );
        assert_eq!(conversion.tables[1].primary_key, None);
        assert_eq!(conversion.warnings.len(), 1);
    }

    #[test]
    fn generated_columns_parse_back() {
        let conversion = convert(&products(), "products.xlsx", &Config::default()).unwrap();
        let parsed = parse_columns(&conversion.sql).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].name, "products");
        assert_eq!(parsed[0].column_names(), vec!["id", "name", "price"]);
    }

    #[test]
    fn errors_carry_file_name() {
        let error = convert(b"not a workbook", "notes.txt", &Config::default()).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Format);
        assert!(error.to_string().starts_with("notes.txt: "));

        let config = Config {
            varchar_buckets: vec![],
            ..Config::default()
        };
        let error = convert(&products(), "products.xlsx", &config).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Config);
    }

    #[test]
    fn serialize_conversion() {
        let conversion = convert(&products(), "products.xlsx", &Config::default()).unwrap();
        let json = serde_json::to_value(&conversion).unwrap();
        assert_eq!(json["tables"][0]["primaryKey"], "id");
        assert_eq!(json["tables"][0]["columns"][2]["type"], "DECIMAL(4,2)");
        assert_eq!(json["sql"], conversion.sql);
    }
}

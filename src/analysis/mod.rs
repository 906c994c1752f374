//! # Schema Analysis
//!
//! Turns the sheets of a [`Workbook`] into [`Table`] descriptors: every
//! column is typed by a [`ColumnInferrer`](infer::ColumnInferrer), then the
//! table gets its primary key and foreign key hints.
pub(crate) mod classify;
pub(crate) mod constraint;
pub(crate) mod infer;

use crate::analysis::classify::Classifier;
use crate::analysis::constraint::mark_foreign_keys;
use crate::analysis::constraint::primary_key;
use crate::analysis::infer::ColumnInferrer;
use crate::config::Config;
use crate::database::column::Column;
use crate::database::identifier::column_names;
use crate::database::identifier::table_base_name;
use crate::database::identifier::UniqueNames;
use crate::database::table::Table;
use crate::error::Sheet2SqlError;
use crate::spreadsheet::sheet::Sheet;
use crate::spreadsheet::Workbook;
use serde::Serialize;
use std::fmt;
use tracing::debug;
use tracing::warn;

/// Non-fatal findings of an analysis.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Warning {
    /// A sheet without any cell; no table was produced
    EmptySheet { sheet: String },
    /// A sheet with a header but no data rows; every column is nullable
    HeaderOnly { sheet: String, table: String },
    /// Values past the sampled rows that do not fit the inferred type
    SampleMismatch {
        table: String,
        column: String,
        rows: usize,
        /// 1-based data row of the first mismatch
        first_row: usize,
        value: String,
    },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::EmptySheet { sheet } => write!(f, "Sheet '{sheet}' is empty and was skipped"),
            Warning::HeaderOnly { sheet, table } => {
                write!(f, "Sheet '{sheet}' has no data rows; every column of '{table}' is nullable")
            }
            Warning::SampleMismatch {
                table,
                column,
                rows,
                first_row,
                value,
            } => write!(
                f,
                "{rows} value(s) of '{table}'.'{column}' after the sampled rows do not fit its type, first at data row {first_row}: '{value}'"
            ),
        }
    }
}

/// Tables inferred from a workbook, in sheet order.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Analysis {
    pub tables: Vec<Table>,
    pub warnings: Vec<Warning>,
}

/// Infers one table per non-empty sheet of the workbook.
///
/// # Errors
///
/// Fails with [`Sheet2SqlError::EmptyInputError`] when no sheet has a
/// header row, and with [`Sheet2SqlError::AmbiguousTypeError`] when strict
/// mode rejects a text fallback.
pub fn analyze_workbook(workbook: &Workbook, file_name: &str, config: &Config) -> Result<Analysis, Sheet2SqlError> {
    let classifier = Classifier::new(&config.boolean_token_set, &config.null_tokens);
    let mut table_names = UniqueNames::default();
    let mut analysis = Analysis {
        tables: Vec::new(),
        warnings: Vec::new(),
    };

    for (index, sheet) in workbook.sheets().iter().enumerate() {
        if sheet.is_empty() {
            analysis.warnings.push(Warning::EmptySheet {
                sheet: sheet.name().to_owned(),
            });
            continue;
        }
        let name = table_names.claim(&table_base_name(sheet.name(), file_name, index + 1));
        let table = analyze_sheet(sheet, name, config, &classifier, &mut analysis.warnings)?;
        analysis.tables.push(table);
    }

    for warning in &analysis.warnings {
        warn!("{warning}");
    }
    if analysis.tables.is_empty() {
        Err(Sheet2SqlError::EmptyInputError("no sheet has a header row".to_owned()))?
    }
    Ok(analysis)
}

fn analyze_sheet(
    sheet: &Sheet,
    name: String,
    config: &Config,
    classifier: &Classifier,
    warnings: &mut Vec<Warning>,
) -> Result<Table, Sheet2SqlError> {
    let headers = sheet.header();
    let names = column_names(&headers);
    let mut inferrers: Vec<ColumnInferrer> =
        headers.iter().map(|_| ColumnInferrer::new(config.sample_row_limit)).collect();

    let mut row_count = 0usize;
    for (row, values) in sheet.rows().enumerate() {
        for (inferrer, value) in inferrers.iter_mut().zip(&values) {
            inferrer.observe(row, classifier.classify(value).as_ref());
        }
        row_count += 1;
    }

    let mut columns = Vec::with_capacity(names.len());
    for ((inferrer, column_name), header) in inferrers.into_iter().zip(&names).zip(&headers) {
        let inference = inferrer.finish(&config.varchar_buckets);
        if let Some(ranks) = inference.fell_back_to_text.as_ref().filter(|_| config.strict) {
            Err(Sheet2SqlError::AmbiguousTypeError {
                table: name.to_owned(),
                column: column_name.to_owned(),
                classes: ranks.iter().map(|rank| rank.to_string()).collect::<Vec<_>>().join(", "),
            })?
        }
        if let Some(mismatch) = inference.first_mismatch {
            warnings.push(Warning::SampleMismatch {
                table: name.to_owned(),
                column: column_name.to_owned(),
                rows: inference.mismatches,
                first_row: mismatch.row + 1,
                value: mismatch.value,
            });
        }
        debug!(table = %name, column = %column_name, kind = %inference.kind, nullable = inference.nullable, "inferred column");
        let mut column = Column::new(column_name, header, inference.kind, inference.nullable);
        column.max_length = inference.max_length;
        columns.push(column);
    }

    let mut primary = None;
    if row_count == 0 {
        warnings.push(Warning::HeaderOnly {
            sheet: sheet.name().to_owned(),
            table: name.to_owned(),
        });
    } else if let Some(index) = primary_key(&name, &columns, sheet.rows(), classifier) {
        columns[index].primary_key = true;
        primary = Some(columns[index].name.to_owned());
    }
    mark_foreign_keys(&mut columns);
    debug!(sheet = %sheet.name(), table = %name, rows = row_count, primary_key = ?primary, "analyzed sheet");

    Ok(Table {
        name,
        sheet: sheet.name().to_owned(),
        columns,
        primary_key: primary,
        row_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::column::ColumnType;
    use crate::error::ErrorKind;
    use crate::spreadsheet::read_workbook;
    use crate::spreadsheet::testing::xlsx;

    fn analyze(sheets: &[(&str, Vec<Vec<&str>>)], config: &Config) -> Result<Analysis, Sheet2SqlError> {
        let workbook = read_workbook(&xlsx(sheets), &config.criteria()?)?;
        analyze_workbook(&workbook, "book.xlsx", config)
    }

    #[test]
    fn products_table() {
        let analysis = analyze(
            &[("Products", vec![vec!["id", "name", "price"], vec!["1", "Widget", "9.99"], vec!["2", "Gadget", "19.5"]])],
            &Config::default(),
        )
        .unwrap();
        let table = &analysis.tables[0];
        assert_eq!(table.name, "products");
        assert_eq!(table.primary_key.as_deref(), Some("id"));
        assert_eq!(table.row_count, 2);
        let kinds: Vec<_> = table.columns.iter().map(|column| column.kind).collect();
        assert_eq!(kinds, vec![ColumnType::Integer, ColumnType::Varchar(50), ColumnType::Decimal { precision: 4, scale: 2 }]);
        assert!(table.columns.iter().all(|column| !column.nullable));
        assert_eq!(table.column("name").map(|column| column.max_length), Some(6));
        assert!(analysis.warnings.is_empty());
    }

    #[test]
    fn header_only_and_empty_sheets() {
        let analysis = analyze(
            &[("Blank", vec![]), ("Only Header", vec![vec!["id", "", "id"]])],
            &Config::default(),
        )
        .unwrap();
        assert_eq!(analysis.tables.len(), 1);
        let table = &analysis.tables[0];
        assert_eq!(table.name, "only_header");
        let names: Vec<_> = table.columns.iter().map(|column| column.name.as_str()).collect();
        assert_eq!(names, vec!["id", "column_2", "id_2"]);
        assert!(table.columns.iter().all(|column| column.nullable && !column.primary_key));
        assert_eq!(table.primary_key, None);
        assert_eq!(analysis.warnings, vec![
            Warning::EmptySheet { sheet: "Blank".to_owned() },
            Warning::HeaderOnly { sheet: "Only Header".to_owned(), table: "only_header".to_owned() },
        ]);
    }

    #[test]
    fn blank_rows_count_as_nulls() {
        let sheets = [("Counts", vec![vec!["n", "label"], vec!["1", "a"], vec!["", ""], vec!["3", "c"]])];
        let analysis = analyze(&sheets, &Config::default()).unwrap();
        let table = &analysis.tables[0];
        assert_eq!(table.row_count, 3);
        assert!(table.columns.iter().all(|column| column.nullable));
        assert_eq!(table.primary_key, None);

        let config = Config {
            skip_empty_rows: true,
            ..Config::default()
        };
        let analysis = analyze(&sheets, &config).unwrap();
        let table = &analysis.tables[0];
        assert_eq!(table.row_count, 2);
        assert!(table.columns.iter().all(|column| !column.nullable));
        assert_eq!(table.primary_key.as_deref(), Some("n"));
    }

    #[test]
    fn no_tables_is_empty_input() {
        let error = analyze(&[("Blank", vec![])], &Config::default()).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::EmptyInput);
    }

    #[test]
    fn duplicate_table_names() {
        let rows = || vec![vec!["a"], vec!["x"]];
        let analysis = analyze(&[("Data", rows()), ("data", rows()), ("***", rows())], &Config::default()).unwrap();
        let names: Vec<_> = analysis.tables.iter().map(|table| table.name.as_str()).collect();
        assert_eq!(names, vec!["data", "data_2", "book"]);
    }

    #[test]
    fn strict_mode_rejects_text_fallback() {
        let sheets = [("Mixed", vec![vec!["code"], vec!["1"], vec!["A-7"]])];
        let analysis = analyze(&sheets, &Config::default()).unwrap();
        assert_eq!(analysis.tables[0].columns[0].kind, ColumnType::Varchar(50));

        let config = Config {
            strict: true,
            ..Config::default()
        };
        let error = analyze(&sheets, &config).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::AmbiguousType);
        assert_eq!(error.to_string(), "Ambiguous type for column 'code' of table 'mixed': found integer, text");
    }

    #[test]
    fn sample_mismatches_are_reported() {
        let config = Config {
            sample_row_limit: Some(2),
            ..Config::default()
        };
        let sheets = [("Items", vec![vec!["qty"], vec!["1"], vec!["2"], vec!["3"], vec!["lots"]])];
        let analysis = analyze(&sheets, &config).unwrap();
        assert_eq!(analysis.tables[0].columns[0].kind, ColumnType::Integer);
        assert_eq!(analysis.warnings, vec![Warning::SampleMismatch {
            table: "items".to_owned(),
            column: "qty".to_owned(),
            rows: 1,
            first_row: 4,
            value: "lots".to_owned(),
        }]);
    }

    #[test]
    fn foreign_key_hints() {
        let sheets = [(
            "Orders",
            vec![vec!["order_id", "customer_id", "note"], vec!["1", "7", "a"], vec!["2", "7", ""]],
        )];
        let analysis = analyze(&sheets, &Config::default()).unwrap();
        let table = &analysis.tables[0];
        assert_eq!(table.primary_key.as_deref(), Some("order_id"));
        assert_eq!(table.foreign_key_hints().collect::<Vec<_>>(), vec![("customer_id", "customer")]);
    }
}

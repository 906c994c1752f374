//! Rendering of `CREATE TABLE` statements and reading them back.
use crate::database::column::ColumnType;
use crate::database::identifier::quote;
use crate::database::table::Table;
use crate::error::Sheet2SqlError;
use serde::Serialize;
use thiserror::Error;

/// Errors raised while reading DDL text.
#[derive(Error, Debug)]
pub enum DdlError {
    #[error("Unexpected DDL at line {0}: '{1}'")]
    SyntaxError(usize, String),

    #[error("CREATE TABLE {0} is not closed")]
    UnterminatedTableError(String),
}

/// Renders one `CREATE TABLE` statement per table, in order, separated by a
/// blank line. The output only depends on the tables passed in.
pub fn emit(tables: &[Table], annotate_foreign_keys: bool) -> String {
    tables
        .iter()
        .map(|table| create_table(table, annotate_foreign_keys))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn create_table(table: &Table, annotate_foreign_keys: bool) -> String {
    let mut sql = format!("CREATE TABLE {} (\n", quote(&table.name));
    let last = table.columns.len().saturating_sub(1);
    for (index, column) in table.columns.iter().enumerate() {
        sql.push_str("  ");
        sql.push_str(&quote(&column.name));
        sql.push(' ');
        sql.push_str(&column.kind.to_string());
        if column.primary_key {
            sql.push_str(" PRIMARY KEY");
        } else if !column.nullable {
            sql.push_str(" NOT NULL");
        }
        if index < last {
            sql.push(',');
        }
        if let Some(referenced) = column.foreign_key.as_ref().filter(|_| annotate_foreign_keys) {
            sql.push_str(" -- possible foreign key to ");
            sql.push_str(&quote(referenced));
        }
        sql.push('\n');
    }
    sql.push_str(");");
    sql
}

/// A table definition read back from DDL text.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedTable {
    pub name: String,
    pub columns: Vec<ParsedColumn>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ColumnType,
    pub nullable: bool,
    pub primary_key: bool,
}

impl ParsedTable {
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|column| column.name.as_str()).collect()
    }
}

/// Reads DDL in the layout produced by [`emit`] back into table
/// definitions. Blank lines and `--` comment lines between statements are
/// ignored.
pub fn parse_columns(ddl: &str) -> Result<Vec<ParsedTable>, Sheet2SqlError> {
    let mut tables = Vec::<ParsedTable>::new();
    let mut current = None::<ParsedTable>;
    for (index, line) in ddl.lines().enumerate() {
        let number = index + 1;
        let syntax_error = || DdlError::SyntaxError(number, line.to_owned());
        let trimmed = line.trim();
        let Some(table) = current.as_mut() else {
            if trimmed.is_empty() || trimmed.starts_with("--") {
                continue;
            }
            let rest = trimmed.strip_prefix("CREATE TABLE ").ok_or_else(syntax_error)?;
            let (name, rest) = read_quoted(rest.trim_start()).ok_or_else(syntax_error)?;
            if rest.trim() != "(" {
                Err(syntax_error())?
            }
            current = Some(ParsedTable {
                name,
                columns: Vec::new(),
            });
            continue;
        };
        if trimmed == ");" {
            tables.extend(current.take());
            continue;
        }

        let (name, rest) = read_quoted(trimmed).ok_or_else(syntax_error)?;
        let definition = rest.split("--").next().unwrap_or_default().trim();
        let definition = definition.strip_suffix(',').unwrap_or(definition).trim_end();
        let (definition, primary_key) = match definition.strip_suffix(" PRIMARY KEY") {
            Some(definition) => (definition, true),
            None => (definition, false),
        };
        let (definition, not_null) = match definition.strip_suffix(" NOT NULL") {
            Some(definition) => (definition, true),
            None => (definition, false),
        };
        table.columns.push(ParsedColumn {
            name,
            kind: ColumnType::parse(definition)?,
            nullable: !primary_key && !not_null,
            primary_key,
        });
    }
    match current {
        Some(table) => Err(DdlError::UnterminatedTableError(quote(&table.name)))?,
        None => Ok(tables),
    }
}

/// Splits a leading double-quoted identifier off `text`, undoubling
/// embedded quotes.
fn read_quoted(text: &str) -> Option<(String, &str)> {
    let body = text.strip_prefix('"')?;
    let mut identifier = String::new();
    let mut characters = body.char_indices().peekable();
    while let Some((index, character)) = characters.next() {
        if character != '"' {
            identifier.push(character);
        } else if characters.peek().map(|(_, next)| *next == '"').unwrap_or(false) {
            identifier.push('"');
            characters.next();
        } else {
            return Some((identifier, &body[index + 1..]));
        }
    }
    None
}

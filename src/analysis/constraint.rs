//! Primary key candidates and foreign key hints.
use crate::analysis::classify::CellClass;
use crate::analysis::classify::Classifier;
use crate::database::column::Column;
use crate::spreadsheet::cell::CellValue;
use std::collections::HashSet;

#[derive(Debug, PartialEq, Eq, Hash)]
enum Key {
    Integer(i64),
    Text(String),
}

/// Picks the primary key column of a table, returning its index.
///
/// A column qualifies when it is non-nullable, has an integer or text type
/// and holds a distinct value in every row. Among qualifying columns, `id`
/// or `<table>_id` wins, then the leftmost integer column, then the leftmost
/// text column.
pub(crate) fn primary_key<I>(table: &str, columns: &[Column], rows: I, classifier: &Classifier) -> Option<usize>
where
    I: IntoIterator<Item = Vec<CellValue>>,
{
    let mut candidates: Vec<(usize, HashSet<Key>)> = columns
        .iter()
        .enumerate()
        .filter(|(_, column)| !column.nullable && (column.kind.is_integer() || column.kind.is_text()))
        .map(|(index, _)| (index, HashSet::new()))
        .collect();
    if candidates.is_empty() {
        return None;
    }

    let mut row_count = 0usize;
    for row in rows {
        row_count += 1;
        candidates.retain_mut(|(index, seen)| {
            let key = row.get(*index).and_then(|value| classifier.classify(value)).map(|value| match value.class {
                CellClass::Integer { value, .. } if columns[*index].kind.is_integer() => Key::Integer(value),
                _ => Key::Text(value.text),
            });
            // An empty cell here means the column was nullable after all
            key.map(|key| seen.insert(key)).unwrap_or(false)
        });
        if candidates.is_empty() {
            return None;
        }
    }
    if row_count == 0 {
        return None;
    }

    let qualifying: Vec<usize> = candidates.into_iter().map(|(index, _)| index).collect();
    let own_id = format!("{}_id", table.to_lowercase());
    let by_name = qualifying.iter().copied().find(|index| {
        let name = columns[*index].name.to_lowercase();
        name == "id" || name == own_id
    });
    by_name
        .or_else(|| qualifying.iter().copied().find(|index| columns[*index].kind.is_integer()))
        .or_else(|| qualifying.first().copied())
}

/// Flags integer `*_id` columns other than the primary key as probable
/// references to the table named by the stem.
pub(crate) fn mark_foreign_keys(columns: &mut [Column]) {
    for column in columns.iter_mut().filter(|column| !column.primary_key && column.kind.is_integer()) {
        let lowercase = column.name.to_lowercase();
        column.foreign_key = lowercase
            .strip_suffix("_id")
            .filter(|stem| !stem.is_empty())
            .map(|stem| stem.to_owned());
    }
}

//! SQL identifier cleaning, uniqueness and quoting.
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

static INVALID_CHARACTERS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9_]").expect("Hardcode regex pattern"));
static UNDERSCORE_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"_{2,}").expect("Hardcode regex pattern"));

/// Cleans a header or sheet name into a lowercase identifier.
///
/// Characters outside `[A-Za-z0-9_]` become `_`, runs of `_` collapse,
/// leading and trailing `_` are dropped and a leading digit gets a `col_`
/// prefix. Returns an empty string when nothing usable is left.
pub fn sanitize(name: &str) -> String {
    let cleaned = INVALID_CHARACTERS.replace_all(name.trim(), "_");
    let cleaned = UNDERSCORE_RUNS.replace_all(&cleaned, "_");
    let cleaned = cleaned.trim_matches('_');
    match cleaned.chars().next() {
        None => String::new(),
        Some(first) if first.is_ascii_digit() => format!("col_{}", cleaned.to_ascii_lowercase()),
        Some(_) => cleaned.to_ascii_lowercase(),
    }
}

/// Wraps an identifier in double quotes, doubling embedded quotes.
pub fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// Hands out names that are unique within one scope, suffixing repeats
/// with `_2`, `_3`, ...
#[derive(Debug, Default)]
pub(crate) struct UniqueNames {
    taken: HashSet<String>,
}

impl UniqueNames {
    pub(crate) fn claim(&mut self, name: &str) -> String {
        let mut candidate = name.to_owned();
        let mut suffix = 1usize;
        while self.taken.contains(&candidate) {
            suffix += 1;
            candidate = format!("{name}_{suffix}");
        }
        self.taken.insert(candidate.to_owned());
        candidate
    }
}

/// Column identifiers for a header row: sanitized, blank headers replaced
/// by `column_N` (1-based position), repeats suffixed.
pub fn column_names(headers: &[String]) -> Vec<String> {
    let mut names = UniqueNames::default();
    headers
        .iter()
        .enumerate()
        .map(|(index, header)| {
            let name = sanitize(header);
            if name.is_empty() {
                names.claim(&format!("column_{}", index + 1))
            } else {
                names.claim(&name)
            }
        })
        .collect()
}

/// Base identifier for a table: the sanitized sheet name, else the sanitized
/// file stem, else `table_N` (1-based sheet position).
pub fn table_base_name(sheet_name: &str, file_name: &str, position: usize) -> String {
    let sheet = sanitize(sheet_name);
    if !sheet.is_empty() {
        return sheet;
    }
    let stem = std::path::Path::new(file_name)
        .file_stem()
        .map(|stem| sanitize(&stem.to_string_lossy()))
        .unwrap_or_default();
    if !stem.is_empty() {
        stem
    } else {
        format!("table_{position}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_names() {
        assert_eq!(sanitize("Customer ID"), "customer_id");
        assert_eq!(sanitize("  Price ($) "), "price");
        assert_eq!(sanitize("__a--b__"), "a_b");
        assert_eq!(sanitize("2024 Sales"), "col_2024_sales");
        assert_eq!(sanitize("Größe"), "gr_e");
        assert_eq!(sanitize("$$$"), "");
        assert_eq!(sanitize(""), "");
    }

    #[test]
    fn quote_identifiers() {
        assert_eq!(quote("id"), "\"id\"");
        assert_eq!(quote("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn unique_column_names() {
        let headers: Vec<String> = ["Name", "name", "", "NAME", "name_2", "  "].iter().map(|it| it.to_string()).collect();
        assert_eq!(column_names(&headers), vec!["name", "name_2", "column_3", "name_3", "name_2_2", "column_6"]);
    }

    #[test]
    fn suffix_keeps_counting_past_taken_names() {
        let mut names = UniqueNames::default();
        assert_eq!(names.claim("a_2"), "a_2");
        assert_eq!(names.claim("a"), "a");
        assert_eq!(names.claim("a"), "a_3");
    }

    #[test]
    fn table_names() {
        assert_eq!(table_base_name("Sales 2024", "book.xlsx", 1), "sales_2024");
        assert_eq!(table_base_name("***", "Quarterly Report.xlsx", 1), "quarterly_report");
        assert_eq!(table_base_name("***", "", 3), "table_3");
    }
}

//! Classification of single cell values.
use crate::spreadsheet::cell::CellValue;
use chrono::NaiveDate;
use chrono::NaiveDateTime;
use chrono::NaiveTime;
use regex::Regex;
use std::collections::HashSet;
use std::fmt;
use std::sync::LazyLock;

/// Largest decimal exponent expanded; anything wider is treated as text.
const MAX_EXPONENT: i64 = 100;

static NUMBER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([+-]?)(\d*)(?:\.(\d*))?(?:[eE]([+-]?\d+))?$").expect("Hardcode regex pattern")
});
static DATE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}[-/]\d{1,2}[-/]\d{1,2}$").expect("Hardcode regex pattern"));
static TIMESTAMP_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4}[-/]\d{1,2}[-/]\d{1,2}[T ]\d{1,2}:\d{2}(?::\d{2}(?:\.\d+)?)?)(?:Z|[+-](\d{2}):?(\d{2}))?$")
        .expect("Hardcode regex pattern")
});
static TIME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{1,2}:\d{2}(:\d{2}(\.\d+)?)?$").expect("Hardcode regex pattern"));

const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%Y/%m/%d"];
const TIMESTAMP_FORMATS: [&str; 8] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S%.f",
    "%Y/%m/%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M",
    "%Y/%m/%dT%H:%M",
];
const TIME_FORMATS: [&str; 2] = ["%H:%M:%S%.f", "%H:%M"];

/// Kind of a date/time value.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum TemporalKind {
    Date,
    Time,
    Timestamp,
}

impl TemporalKind {
    /// Least kind able to hold both; dates and times meet at timestamps.
    pub(crate) fn join(self, other: TemporalKind) -> TemporalKind {
        if self == other {
            self
        } else {
            TemporalKind::Timestamp
        }
    }
}

/// The type lattice of column inference, ordered from narrowest to widest.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) enum Rank {
    Boolean,
    Integer,
    Decimal,
    Temporal,
    Text,
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Rank::Boolean => "boolean",
            Rank::Integer => "integer",
            Rank::Decimal => "decimal",
            Rank::Temporal => "date/time",
            Rank::Text => "text",
        })
    }
}

/// Classification of one non-empty cell.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum CellClass {
    /// Native boolean or a non-numeric boolean token such as "yes"
    Boolean,
    /// Whole number within 64 bits; `is_boolean_token` marks "0"/"1" style tokens
    Integer { value: i64, digits: u32, is_boolean_token: bool },
    /// Exact decimal, including whole numbers beyond 64 bits
    Decimal { integer_digits: u32, scale: u32 },
    Temporal(TemporalKind),
    Text,
}

impl CellClass {
    pub(crate) fn rank(&self) -> Rank {
        match self {
            CellClass::Boolean => Rank::Boolean,
            CellClass::Integer { .. } => Rank::Integer,
            CellClass::Decimal { .. } => Rank::Decimal,
            CellClass::Temporal(_) => Rank::Temporal,
            CellClass::Text => Rank::Text,
        }
    }
}

/// A classified non-empty cell with its display text.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Classified {
    pub(crate) class: CellClass,
    pub(crate) text: String,
}

/// Classifies cell values using the configured token sets.
#[derive(Clone, Debug)]
pub(crate) struct Classifier {
    /// Lowercased boolean tokens
    boolean_tokens: HashSet<String>,
    /// Lowercased tokens read as empty
    null_tokens: HashSet<String>,
}

impl Classifier {
    pub(crate) fn new<S: AsRef<str>>(boolean_tokens: &[S], null_tokens: &[S]) -> Self {
        let lowercase = |tokens: &[S]| -> HashSet<String> { tokens.iter().map(|token| token.as_ref().trim().to_lowercase()).collect() };
        Self {
            boolean_tokens: lowercase(boolean_tokens),
            null_tokens: lowercase(null_tokens),
        }
    }

    /// Classifies a value; `None` for empty cells, whitespace and null tokens.
    pub(crate) fn classify(&self, value: &CellValue) -> Option<Classified> {
        let text = value.as_text();
        let trimmed = text.trim();
        if trimmed.is_empty() || self.null_tokens.contains(&trimmed.to_lowercase()) {
            return None;
        }
        let class = match value {
            CellValue::Empty => return None,
            CellValue::Boolean(_) => CellClass::Boolean,
            CellValue::Number(literal) => self.classify_number(literal.trim(), true).unwrap_or(CellClass::Text),
            CellValue::DateTime(_) => classify_temporal(trimmed).map(CellClass::Temporal).unwrap_or(CellClass::Text),
            CellValue::Text(_) => self.classify_text(trimmed),
        };
        Some(Classified {
            class,
            text: text.into_owned(),
        })
    }

    fn classify_text(&self, text: &str) -> CellClass {
        if let Some(class) = self.classify_number(text, false) {
            class
        } else if self.boolean_tokens.contains(&text.to_lowercase()) {
            CellClass::Boolean
        } else if let Some(kind) = classify_temporal(text) {
            CellClass::Temporal(kind)
        } else {
            CellClass::Text
        }
    }

    /// Classifies a numeric literal from its decimal digits. Native numbers
    /// drop trailing fractional zeros; typed-in numbers keep them, and
    /// reject redundant leading zeros, which usually mark codes.
    fn classify_number(&self, literal: &str, is_native: bool) -> Option<CellClass> {
        let literal_number = NumericLiteral::parse(literal, is_native)?;
        let class = if literal_number.fraction.is_empty() {
            let digits = literal_number.integer.len() as u32;
            match literal_number.to_i64() {
                Some(value) => CellClass::Integer {
                    value,
                    digits,
                    is_boolean_token: self.boolean_tokens.contains(&literal.to_lowercase()),
                },
                None => CellClass::Decimal {
                    integer_digits: digits,
                    scale: 0,
                },
            }
        } else {
            CellClass::Decimal {
                integer_digits: literal_number.integer.len() as u32,
                scale: literal_number.fraction.len() as u32,
            }
        };
        Some(class)
    }
}

/// Decimal digits of a numeric literal with the exponent applied.
#[derive(Debug, PartialEq)]
struct NumericLiteral {
    negative: bool,
    /// Integer digits without leading zeros, empty for zero
    integer: String,
    /// Fractional digits
    fraction: String,
}

impl NumericLiteral {
    fn parse(literal: &str, is_native: bool) -> Option<Self> {
        let captures = NUMBER_PATTERN.captures(literal)?;
        let integer = captures.get(2).map_or("", |matcher| matcher.as_str());
        let fraction = captures.get(3).map_or("", |matcher| matcher.as_str());
        if integer.is_empty() && fraction.is_empty() {
            return None;
        }
        if !is_native && integer.len() > 1 && integer.starts_with('0') {
            return None;
        }
        let exponent = match captures.get(4) {
            Some(matcher) => matcher.as_str().parse::<i64>().ok().filter(|exponent| exponent.abs() <= MAX_EXPONENT)?,
            None => 0,
        };

        // Move the decimal point by the exponent
        let digits = format!("{integer}{fraction}");
        let point = integer.len() as i64 + exponent;
        let (integer, fraction) = if point <= 0 {
            (String::new(), format!("{}{digits}", "0".repeat(point.unsigned_abs() as usize)))
        } else if point as usize >= digits.len() {
            (format!("{digits}{}", "0".repeat(point as usize - digits.len())), String::new())
        } else {
            let (integer, fraction) = digits.split_at(point as usize);
            (integer.to_owned(), fraction.to_owned())
        };

        let integer = integer.trim_start_matches('0').to_owned();
        let fraction = if is_native || exponent != 0 {
            fraction.trim_end_matches('0').to_owned()
        } else {
            fraction
        };
        Some(NumericLiteral {
            negative: &captures[1] == "-",
            integer,
            fraction,
        })
    }

    fn to_i64(&self) -> Option<i64> {
        if self.integer.is_empty() {
            Some(0)
        } else if self.negative {
            format!("-{}", self.integer).parse().ok()
        } else {
            self.integer.parse().ok()
        }
    }
}

/// Recognizes dates, times and timestamps written in ISO-like forms.
pub(crate) fn classify_temporal(text: &str) -> Option<TemporalKind> {
    if DATE_PATTERN.is_match(text) {
        DATE_FORMATS
            .iter()
            .any(|format| NaiveDate::parse_from_str(text, format).is_ok())
            .then_some(TemporalKind::Date)
    } else if let Some(captures) = TIMESTAMP_PATTERN.captures(text) {
        // The local part and the UTC offset are checked separately
        let local = captures.get(1).map_or("", |local| local.as_str());
        let is_valid_local = TIMESTAMP_FORMATS.iter().any(|format| NaiveDateTime::parse_from_str(local, format).is_ok());
        let is_valid_offset = match (captures.get(2), captures.get(3)) {
            (Some(hours), Some(minutes)) => {
                hours.as_str().parse::<u32>().is_ok_and(|hours| hours < 24)
                    && minutes.as_str().parse::<u32>().is_ok_and(|minutes| minutes < 60)
            }
            _ => true,
        };
        (is_valid_local && is_valid_offset).then_some(TemporalKind::Timestamp)
    } else if TIME_PATTERN.is_match(text) {
        TIME_FORMATS
            .iter()
            .any(|format| NaiveTime::parse_from_str(text, format).is_ok())
            .then_some(TemporalKind::Time)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> Classifier {
        Classifier::new(&["true", "false", "yes", "no", "0", "1"], &["N/A", "-"])
    }

    fn text(value: &str) -> Option<CellClass> {
        classifier().classify(&CellValue::Text(value.to_owned())).map(|classified| classified.class)
    }

    fn number(value: &str) -> Option<CellClass> {
        classifier().classify(&CellValue::Number(value.to_owned())).map(|classified| classified.class)
    }

    fn integer(value: i64, digits: u32) -> Option<CellClass> {
        Some(CellClass::Integer {
            value,
            digits,
            is_boolean_token: false,
        })
    }

    fn decimal(integer_digits: u32, scale: u32) -> Option<CellClass> {
        Some(CellClass::Decimal { integer_digits, scale })
    }

    #[test]
    fn empty_values() {
        assert_eq!(classifier().classify(&CellValue::Empty), None);
        assert_eq!(text("   "), None);
        assert_eq!(text("n/a"), None);
        assert_eq!(text("-"), None);
    }

    #[test]
    fn integers() {
        assert_eq!(text("42"), integer(42, 2));
        assert_eq!(text("-7"), integer(-7, 1));
        assert_eq!(text("+15"), integer(15, 2));
        assert_eq!(text("0"), Some(CellClass::Integer { value: 0, digits: 0, is_boolean_token: true }));
        assert_eq!(number("42.0"), integer(42, 2));
        assert_eq!(number("1.5E3"), integer(1500, 4));
        assert_eq!(text("9223372036854775807"), integer(i64::MAX, 19));
        assert_eq!(text("9223372036854775808"), decimal(19, 0));
    }

    #[test]
    fn decimals() {
        assert_eq!(text("9.99"), decimal(1, 2));
        assert_eq!(text("19.5"), decimal(2, 1));
        assert_eq!(text("9.90"), decimal(1, 2));
        assert_eq!(number("9.90"), decimal(1, 1));
        assert_eq!(text("-0.125"), decimal(0, 3));
        assert_eq!(text(".5"), decimal(0, 1));
        assert_eq!(number("1.2E-3"), decimal(0, 4));
        assert_eq!(text("42.0"), decimal(2, 1));
    }

    #[test]
    fn codes_and_oddities_are_text() {
        assert_eq!(text("007"), Some(CellClass::Text));
        assert_eq!(text("1,234"), Some(CellClass::Text));
        assert_eq!(text("1e400"), Some(CellClass::Text));
        assert_eq!(text("12abc"), Some(CellClass::Text));
        assert_eq!(text("."), Some(CellClass::Text));
    }

    #[test]
    fn booleans() {
        assert_eq!(text("YES"), Some(CellClass::Boolean));
        assert_eq!(text("False"), Some(CellClass::Boolean));
        assert_eq!(classifier().classify(&CellValue::Boolean(false)).map(|it| it.class), Some(CellClass::Boolean));
        assert_eq!(text("1"), Some(CellClass::Integer { value: 1, digits: 1, is_boolean_token: true }));
        assert_eq!(text("maybe"), Some(CellClass::Text));
    }

    #[test]
    fn temporals() {
        assert_eq!(text("2024-01-31"), Some(CellClass::Temporal(TemporalKind::Date)));
        assert_eq!(text("2024/1/5"), Some(CellClass::Temporal(TemporalKind::Date)));
        assert_eq!(text("2024-02-30"), Some(CellClass::Text));
        assert_eq!(text("2024-01-31 08:15"), Some(CellClass::Temporal(TemporalKind::Timestamp)));
        assert_eq!(text("2024-01-31T08:15:00.250"), Some(CellClass::Temporal(TemporalKind::Timestamp)));
        assert_eq!(text("2024-01-31T08:15:00+02:00"), Some(CellClass::Temporal(TemporalKind::Timestamp)));
        assert_eq!(text("2024-01-31T08:15+02:00"), Some(CellClass::Temporal(TemporalKind::Timestamp)));
        assert_eq!(text("2024-01-31 08:15-0530"), Some(CellClass::Temporal(TemporalKind::Timestamp)));
        assert_eq!(text("2024-01-31T08:15Z"), Some(CellClass::Temporal(TemporalKind::Timestamp)));
        assert_eq!(text("2024-01-31T08:15:00.5Z"), Some(CellClass::Temporal(TemporalKind::Timestamp)));
        assert_eq!(text("2024-01-31T08:15+25:00"), Some(CellClass::Text));
        assert_eq!(text("08:15"), Some(CellClass::Temporal(TemporalKind::Time)));
        assert_eq!(text("25:61"), Some(CellClass::Text));
        assert_eq!(
            classifier().classify(&CellValue::DateTime("12:30:00".to_owned())).map(|it| it.class),
            Some(CellClass::Temporal(TemporalKind::Time))
        );
        assert_eq!(TemporalKind::Date.join(TemporalKind::Time), TemporalKind::Timestamp);
        assert_eq!(TemporalKind::Date.join(TemporalKind::Date), TemporalKind::Date);
    }
}

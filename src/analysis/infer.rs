use crate::analysis::classify::CellClass;
use crate::analysis::classify::Classified;
use crate::analysis::classify::Rank;
use crate::analysis::classify::TemporalKind;
use crate::database::column::ColumnType;
use std::collections::BTreeSet;

/// A value past the sample that does not fit the type the sample decided.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Mismatch {
    /// 0-based data row index
    pub(crate) row: usize,
    pub(crate) value: String,
}

/// What inference decided for one column.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Inference {
    pub(crate) kind: ColumnType,
    pub(crate) nullable: bool,
    pub(crate) max_length: usize,
    /// Sampled classes wider than text could not absorb, for strict mode
    pub(crate) fell_back_to_text: Option<BTreeSet<Rank>>,
    pub(crate) mismatches: usize,
    pub(crate) first_mismatch: Option<Mismatch>,
}

/// Accumulates the classified values of one column, row by row.
///
/// The first `sample_limit` rows decide the type class. Sizes (text length,
/// integer range, decimal digits) and nullability are tracked over every
/// row, so values past the sample still widen the declared size.
#[derive(Debug)]
pub(crate) struct ColumnInferrer {
    sample_limit: Option<usize>,
    /// Least upper bound of the sampled classes
    rank: Option<Rank>,
    /// Sampled ranks, for error reporting
    ranks: BTreeSet<Rank>,
    temporal: Option<TemporalKind>,
    has_literal_boolean: bool,
    /// Every sampled integer was a boolean token such as "0" or "1"
    integers_are_boolean_tokens: bool,
    nullable: bool,
    max_length: usize,
    integer_range: Option<(i64, i64)>,
    integer_digits: u32,
    scale: u32,
    mismatches: usize,
    first_mismatch: Option<Mismatch>,
}

impl ColumnInferrer {
    pub(crate) fn new(sample_limit: Option<usize>) -> Self {
        Self {
            sample_limit,
            rank: None,
            ranks: BTreeSet::new(),
            temporal: None,
            has_literal_boolean: false,
            integers_are_boolean_tokens: true,
            nullable: false,
            max_length: 0,
            integer_range: None,
            integer_digits: 0,
            scale: 0,
            mismatches: 0,
            first_mismatch: None,
        }
    }

    /// Records the value of data row `row`; `None` is an empty cell.
    pub(crate) fn observe(&mut self, row: usize, value: Option<&Classified>) {
        let Some(value) = value else {
            self.nullable = true;
            return;
        };
        let in_sample = self.sample_limit.map(|limit| row < limit).unwrap_or(true);
        if in_sample {
            self.classify(&value.class);
        } else if !self.fits(&value.class) {
            self.mismatches += 1;
            if self.first_mismatch.is_none() {
                self.first_mismatch = Some(Mismatch {
                    row,
                    value: value.text.to_owned(),
                });
            }
            return;
        }
        self.measure(value);
    }

    fn classify(&mut self, class: &CellClass) {
        let rank = class.rank();
        self.ranks.insert(rank);
        self.rank = Some(self.rank.map_or(rank, |current| current.max(rank)));
        match class {
            CellClass::Boolean => self.has_literal_boolean = true,
            CellClass::Integer { is_boolean_token, .. } => self.integers_are_boolean_tokens &= *is_boolean_token,
            CellClass::Temporal(kind) => self.temporal = Some(self.temporal.map_or(*kind, |current| current.join(*kind))),
            CellClass::Decimal { .. } | CellClass::Text => (),
        }
    }

    /// Whether a value outside the sample is representable by the type the
    /// sample decided.
    fn fits(&self, class: &CellClass) -> bool {
        let Some(rank) = self.rank else {
            return false;
        };
        match (self.is_boolean(), class) {
            (true, CellClass::Boolean) => true,
            (true, CellClass::Integer { is_boolean_token, .. }) => *is_boolean_token,
            (true, _) => false,
            (false, CellClass::Temporal(kind)) if rank == Rank::Temporal => {
                self.temporal.map(|current| current.join(*kind) == current).unwrap_or(false)
            }
            (false, class) => class.rank() <= rank,
        }
    }

    /// Tracks sizes for a value that belongs to the column type.
    fn measure(&mut self, value: &Classified) {
        self.max_length = self.max_length.max(value.text.len());
        match value.class {
            CellClass::Integer { value, digits, .. } => {
                self.integer_range = Some(self.integer_range.map_or((value, value), |(min, max)| (min.min(value), max.max(value))));
                self.integer_digits = self.integer_digits.max(digits);
            }
            CellClass::Decimal { integer_digits, scale } => {
                self.integer_digits = self.integer_digits.max(integer_digits);
                self.scale = self.scale.max(scale);
            }
            _ => (),
        }
    }

    /// Sampled integers and booleans that only ever used boolean tokens.
    fn is_boolean(&self) -> bool {
        match self.rank {
            Some(Rank::Boolean) => true,
            Some(Rank::Integer) => self.has_literal_boolean && self.integers_are_boolean_tokens,
            _ => false,
        }
    }

    /// Decides the column type. `buckets` are the ascending VARCHAR sizes.
    pub(crate) fn finish(self, buckets: &[u32]) -> Inference {
        let text_type = || {
            buckets
                .iter()
                .find(|bucket| self.max_length <= **bucket as usize)
                .map(|bucket| ColumnType::Varchar(*bucket))
                .unwrap_or(ColumnType::Text)
        };
        let kind = match self.rank {
            None => text_type(),
            Some(_) if self.is_boolean() => ColumnType::Boolean,
            Some(Rank::Boolean | Rank::Integer) => match self.integer_range {
                Some((min, max)) if min < i32::MIN as i64 || max > i32::MAX as i64 => ColumnType::BigInt,
                _ => ColumnType::Integer,
            },
            Some(Rank::Decimal) => ColumnType::Decimal {
                precision: (self.integer_digits + self.scale).max(1),
                scale: self.scale,
            },
            Some(Rank::Temporal) => match self.temporal {
                Some(TemporalKind::Date) => ColumnType::Date,
                Some(TemporalKind::Time) => ColumnType::Time,
                Some(TemporalKind::Timestamp) | None => ColumnType::Timestamp,
            },
            Some(Rank::Text) => text_type(),
        };
        let fell_back_to_text = Some(&self.ranks)
            .filter(|ranks| ranks.contains(&Rank::Text) && ranks.len() > 1)
            .cloned();
        Inference {
            kind,
            // A column without any value can hold nulls only
            nullable: self.nullable || self.rank.is_none(),
            max_length: self.max_length,
            fell_back_to_text,
            mismatches: self.mismatches,
            first_mismatch: self.first_mismatch,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::classify::Classifier;
    use crate::spreadsheet::cell::CellValue;

    const BUCKETS: [u32; 4] = [50, 100, 255, 1000];

    fn infer(values: &[&str], sample_limit: Option<usize>) -> Inference {
        let classifier = Classifier::new(&["true", "false", "yes", "no", "0", "1"], &[]);
        let mut inferrer = ColumnInferrer::new(sample_limit);
        for (row, value) in values.iter().enumerate() {
            let classified = classifier.classify(&CellValue::Text(value.to_string()));
            inferrer.observe(row, classified.as_ref());
        }
        inferrer.finish(&BUCKETS)
    }

    fn kind(values: &[&str]) -> ColumnType {
        infer(values, None).kind
    }

    #[test]
    fn least_upper_bound() {
        assert_eq!(kind(&["1", "2", "3"]), ColumnType::Integer);
        assert_eq!(kind(&["9.99", "19.5"]), ColumnType::Decimal { precision: 4, scale: 2 });
        assert_eq!(kind(&["1", "2.5"]), ColumnType::Decimal { precision: 2, scale: 1 });
        assert_eq!(kind(&["100", "0.25"]), ColumnType::Decimal { precision: 5, scale: 2 });
        assert_eq!(kind(&["2024-01-01", "2024-02-01"]), ColumnType::Date);
        assert_eq!(kind(&["2024-01-01", "08:00"]), ColumnType::Timestamp);
        assert_eq!(kind(&["2024-01-01", "45000"]), ColumnType::Date);
        assert_eq!(kind(&["yes", "5"]), ColumnType::Integer);
    }

    #[test]
    fn one_text_value_forces_text() {
        for values in [vec!["1", "2", "x"], vec!["1.5", "x"], vec!["yes", "no", "x"], vec!["2024-01-01", "x"]] {
            assert_eq!(kind(&values), ColumnType::Varchar(50));
        }
    }

    #[test]
    fn boolean_tokens() {
        let inference = infer(&["YES", "NO", "YES"], None);
        assert_eq!(inference.kind, ColumnType::Boolean);
        assert!(!inference.nullable);
        assert_eq!(kind(&["1", "0", "1"]), ColumnType::Integer);
        assert_eq!(kind(&["true", "0", "1"]), ColumnType::Boolean);
        assert_eq!(kind(&["true", "0", "2"]), ColumnType::Integer);
    }

    #[test]
    fn nullable_integers() {
        let inference = infer(&["1", "", "3"], None);
        assert_eq!(inference.kind, ColumnType::Integer);
        assert!(inference.nullable);
    }

    #[test]
    fn integer_widths() {
        assert_eq!(kind(&["2147483647", "-2147483648"]), ColumnType::Integer);
        assert_eq!(kind(&["2147483648"]), ColumnType::BigInt);
        assert_eq!(kind(&["1", "99999999999999999999"]), ColumnType::Decimal { precision: 20, scale: 0 });
    }

    #[test]
    fn text_buckets() {
        let long = "x".repeat(101);
        assert_eq!(kind(&["abc"]), ColumnType::Varchar(50));
        assert_eq!(kind(&[&"x".repeat(50)]), ColumnType::Varchar(50));
        assert_eq!(kind(&[&"x".repeat(51)]), ColumnType::Varchar(100));
        assert_eq!(kind(&["a", &long]), ColumnType::Varchar(255));
        assert_eq!(kind(&[&"x".repeat(1001)]), ColumnType::Text);
        assert_eq!(kind(&["é".repeat(30).as_str()]), ColumnType::Varchar(100));
    }

    #[test]
    fn empty_columns() {
        let inference = infer(&["", " "], None);
        assert_eq!(inference.kind, ColumnType::Varchar(50));
        assert!(inference.nullable);
        let inference = infer(&[], None);
        assert!(inference.nullable);
    }

    #[test]
    fn sample_limit_bounds_classification_only() {
        let inference = infer(&["1", "2", "3000000000", "x", ""], Some(2));
        assert_eq!(inference.kind, ColumnType::BigInt);
        assert!(inference.nullable);
        assert_eq!(inference.mismatches, 1);
        assert_eq!(inference.first_mismatch, Some(Mismatch { row: 3, value: "x".to_owned() }));

        let inference = infer(&["ab", "cd", &"x".repeat(60)], Some(1));
        assert_eq!(inference.kind, ColumnType::Varchar(100));
        assert_eq!(inference.mismatches, 0);

        let inference = infer(&["1.5", "22.25"], Some(1));
        assert_eq!(inference.kind, ColumnType::Decimal { precision: 4, scale: 2 });
    }

    #[test]
    fn text_fallback_is_reported() {
        assert_eq!(infer(&["1", "x"], None).fell_back_to_text, Some(BTreeSet::from([Rank::Integer, Rank::Text])));
        assert_eq!(infer(&["x", "y"], None).fell_back_to_text, None);
    }
}

//! Row keys and value equivalence.
//!
//! Keys are built from canonical value forms so that values the comparison
//! would treat as equal also hash to the same key: text is folded, and every
//! number (including numeric text) is quantized to the tolerance grid.

use crate::classify::{ColumnClassification, ExclusionCategory};
use crate::config::{ComparisonOptions, UuidComparisonMode};
use crate::core::{Row, SqlValue, TableSchema};
use crate::identifier::{normalize, NormalizationRule};

use super::types::KeyStrategy;

/// Absolute tolerance for numeric equality.
pub const NUMERIC_TOLERANCE: f64 = 1e-10;

/// Magnitude above which a number's key is its exact bit pattern.
///
/// Past this point the gap between adjacent doubles exceeds the tolerance,
/// so tolerant equality is exact equality.
const QUANTIZE_LIMIT: f64 = 1e15;

/// Hashable canonical form of one key value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyPart {
    Null,
    /// Number in units of `NUMERIC_TOLERANCE`.
    Number(i128),
    /// Bit pattern of a large or non-finite number.
    Real(u64),
    Text(String),
    Blob(Vec<u8>),
}

fn number_key(v: f64) -> KeyPart {
    if v.is_finite() && v.abs() < QUANTIZE_LIMIT {
        KeyPart::Number((v / NUMERIC_TOLERANCE).round() as i128)
    } else {
        KeyPart::Real(v.to_bits())
    }
}

/// Finite number spelled by a text value, if any.
fn parse_number(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Canonical key of a row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RowKey(pub Vec<KeyPart>);

/// Text folding rules derived from the options.
#[derive(Debug, Clone, Copy)]
pub struct TextFolding {
    pub case_sensitive: bool,
    pub ignore_whitespace: bool,
}

impl TextFolding {
    pub fn from_options(options: &ComparisonOptions) -> Self {
        Self {
            case_sensitive: options.case_sensitive,
            ignore_whitespace: options.ignore_whitespace,
        }
    }

    /// Apply whitespace collapsing and case folding.
    pub fn fold(&self, s: &str) -> String {
        let s = if self.ignore_whitespace {
            s.split_whitespace().collect::<Vec<_>>().join(" ")
        } else {
            s.to_string()
        };
        if self.case_sensitive {
            s
        } else {
            s.to_lowercase()
        }
    }

    /// Canonical key form of a value.
    pub fn key_part(&self, value: &SqlValue) -> KeyPart {
        match value {
            SqlValue::Null | SqlValue::Undecodable(_) => KeyPart::Null,
            SqlValue::Integer(v) => number_key(*v as f64),
            SqlValue::Real(v) => number_key(*v),
            SqlValue::Text(s) => match parse_number(s) {
                Some(v) => number_key(v),
                None => KeyPart::Text(self.fold(s)),
            },
            SqlValue::Blob(b) => KeyPart::Blob(b.clone()),
        }
    }

    /// Whether two values are equal under the comparison rules.
    ///
    /// Numbers compare with an absolute tolerance, text honours the folding
    /// options, and numeric text compares to a number by its parsed value.
    pub fn values_equal(&self, a: &SqlValue, b: &SqlValue) -> bool {
        match (a, b) {
            (SqlValue::Null, SqlValue::Null) => true,
            (SqlValue::Null, _) | (_, SqlValue::Null) => false,
            (SqlValue::Integer(x), SqlValue::Integer(y)) => x == y,
            (SqlValue::Integer(_) | SqlValue::Real(_), SqlValue::Integer(_) | SqlValue::Real(_)) => {
                match (as_f64(a), as_f64(b)) {
                    (Some(x), Some(y)) => (x - y).abs() <= NUMERIC_TOLERANCE,
                    _ => false,
                }
            }
            (SqlValue::Text(x), SqlValue::Text(y)) => {
                if self.ignore_whitespace {
                    self.fold(x.trim()) == self.fold(y.trim())
                } else if self.case_sensitive {
                    x == y
                } else {
                    x.to_lowercase() == y.to_lowercase()
                }
            }
            (SqlValue::Blob(x), SqlValue::Blob(y)) => x == y,
            (SqlValue::Text(t), n @ (SqlValue::Integer(_) | SqlValue::Real(_)))
            | (n @ (SqlValue::Integer(_) | SqlValue::Real(_)), SqlValue::Text(t)) => {
                match (parse_number(t), as_f64(n)) {
                    (Some(x), Some(y)) => (x - y).abs() <= NUMERIC_TOLERANCE,
                    _ => false,
                }
            }
            _ => false,
        }
    }
}

fn as_f64(v: &SqlValue) -> Option<f64> {
    match v {
        SqlValue::Integer(i) => Some(*i as f64),
        SqlValue::Real(f) => Some(*f),
        _ => None,
    }
}

/// Positions of the key columns on each side.
#[derive(Debug, Clone)]
pub struct KeyColumn {
    pub name: String,
    pub idx_a: usize,
    pub idx_b: usize,
    /// Key part is normalized before folding (tracked identifier columns).
    pub normalize: bool,
}

/// How keys are extracted for a table.
#[derive(Debug, Clone)]
pub struct KeyPlan {
    pub strategy: KeyStrategy,
    pub columns: Vec<KeyColumn>,
}

impl KeyPlan {
    /// Choose the key for a table.
    ///
    /// The declared primary key of side A is used when every key column exists
    /// on side B. Identifier columns are unusable as keys in `exclude` mode,
    /// since their raw values are expected to differ between sources; in
    /// tracking mode they are keyed by their normalized value. Without a usable
    /// primary key, all compared columns form a composite key. With no
    /// compared columns either, rows are paired by position.
    pub fn choose(
        schema_a: &TableSchema,
        schema_b: &TableSchema,
        classification: &ColumnClassification,
        compared: &[(String, usize, usize)],
        mode: UuidComparisonMode,
    ) -> Self {
        let pk = schema_a.primary_key();
        if !pk.is_empty() {
            let mut columns = Vec::with_capacity(pk.len());
            let mut usable = true;
            for col in &pk {
                let category = classification.category(&col.name);
                if category == ExclusionCategory::Uuid && mode == UuidComparisonMode::Exclude {
                    usable = false;
                    break;
                }
                let (Some(idx_a), Some(idx_b)) =
                    (schema_a.column_index(&col.name), schema_b.column_index(&col.name))
                else {
                    usable = false;
                    break;
                };
                columns.push(KeyColumn {
                    name: col.name.clone(),
                    idx_a,
                    idx_b,
                    normalize: category == ExclusionCategory::Uuid
                        && mode == UuidComparisonMode::IncludeWithTracking,
                });
            }
            if usable {
                let names = columns.iter().map(|c| c.name.clone()).collect();
                return Self {
                    strategy: KeyStrategy::PrimaryKey(names),
                    columns,
                };
            }
        }

        if !compared.is_empty() {
            let columns: Vec<KeyColumn> = compared
                .iter()
                .map(|(name, idx_a, idx_b)| KeyColumn {
                    name: name.clone(),
                    idx_a: *idx_a,
                    idx_b: *idx_b,
                    normalize: false,
                })
                .collect();
            let names = columns.iter().map(|c| c.name.clone()).collect();
            return Self {
                strategy: KeyStrategy::Composite(names),
                columns,
            };
        }

        Self {
            strategy: KeyStrategy::Positional,
            columns: Vec::new(),
        }
    }

    pub fn is_positional(&self) -> bool {
        matches!(self.strategy, KeyStrategy::Positional)
    }

    /// Extract the canonical key of a row from side A (`side_a = true`) or B.
    pub fn key(
        &self,
        row: &Row,
        side_a: bool,
        folding: &TextFolding,
        rules: &[NormalizationRule],
    ) -> RowKey {
        RowKey(
            self.columns
                .iter()
                .map(|c| {
                    let idx = if side_a { c.idx_a } else { c.idx_b };
                    let value = &row[idx];
                    match value {
                        SqlValue::Text(s) if c.normalize => {
                            KeyPart::Text(folding.fold(&normalize(s, rules)))
                        }
                        other => folding.key_part(other),
                    }
                })
                .collect(),
        )
    }

    /// Raw key values of a row, for reporting.
    pub fn key_values(&self, row: &Row, side_a: bool) -> Vec<SqlValue> {
        self.columns
            .iter()
            .map(|c| row[if side_a { c.idx_a } else { c.idx_b }].clone())
            .collect()
    }
}

//! Column classification.
//!
//! Every column of a table is assigned exactly one [`ExclusionCategory`] by a
//! fixed priority chain:
//!
//! 1. explicit name lists from the options
//! 2. declared type (timestamp, sequence and native identifier types)
//! 3. name patterns, tried per category in the order uuid, timestamp, metadata, sequence
//! 4. sequence fallback (integer primary key, or sampled values that step by a small constant gap)
//! 5. otherwise [`ExclusionCategory::None`]
//!
//! User exclusions (`excluded_columns`, `excluded_column_patterns`) are layered on
//! top and recorded separately so reports can tell the two apart.

pub mod patterns;

pub use patterns::{NamePattern, PatternLibrary};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

use crate::config::{ComparisonOptions, UuidComparisonMode};
use crate::core::{Row, TableSchema};

/// Minimum fraction of sampled gaps that must equal the modal gap.
const SEQUENCE_GAP_THRESHOLD: f64 = 0.80;

/// Largest gap still treated as an auto-increment step.
const MAX_SEQUENCE_GAP: i64 = 10;

/// Minimum number of non-null sampled values for value-based sequence detection.
const MIN_SEQUENCE_SAMPLE: usize = 3;

/// Exclusion bucket of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionCategory {
    Uuid,
    Timestamp,
    Metadata,
    Sequence,
    None,
}

impl ExclusionCategory {
    /// Categories in name-pattern priority order.
    pub const PATTERN_ORDER: [ExclusionCategory; 4] = [
        ExclusionCategory::Uuid,
        ExclusionCategory::Timestamp,
        ExclusionCategory::Metadata,
        ExclusionCategory::Sequence,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExclusionCategory::Uuid => "uuid",
            ExclusionCategory::Timestamp => "timestamp",
            ExclusionCategory::Metadata => "metadata",
            ExclusionCategory::Sequence => "sequence",
            ExclusionCategory::None => "none",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            ExclusionCategory::Uuid => "UUID",
            ExclusionCategory::Timestamp => "Timestamp",
            ExclusionCategory::Metadata => "Metadata",
            ExclusionCategory::Sequence => "Sequence",
            ExclusionCategory::None => "None",
        }
    }
}

impl fmt::Display for ExclusionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which rule of the priority chain produced a column's category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", content = "detail", rename_all = "snake_case")]
pub enum DetectionSource {
    /// Named in an `explicit_*_columns` list.
    Explicit,
    /// Matched by declared type.
    DeclaredType(String),
    /// Matched by a name pattern (the pattern text).
    NamePattern(String),
    /// Integer-typed primary key.
    IntegerPrimaryKey,
    /// Sampled values step by a constant gap.
    SampledValues { gap: i64, ratio: f64 },
    /// No rule matched.
    Default,
}

/// Why a column is left out of value comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ExclusionReason {
    /// Excluded because of its category.
    Category(ExclusionCategory),
    /// Excluded by `excluded_columns` or `excluded_column_patterns`.
    UserExcluded(String),
}

/// Classification of a single column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedColumn {
    pub name: String,
    pub category: ExclusionCategory,
    pub detected_by: DetectionSource,
    /// Set when the user excluded the column, with the matching name or pattern.
    pub user_excluded: Option<String>,
}

/// Column name → category mapping for one table. Read-only once built.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnClassification {
    pub table: String,
    pub columns: Vec<ClassifiedColumn>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl ColumnClassification {
    fn new(table: impl Into<String>, columns: Vec<ClassifiedColumn>) -> Self {
        let index = columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.name.to_lowercase(), i))
            .collect();
        Self {
            table: table.into(),
            columns,
            index,
        }
    }

    /// Look up a column (case-insensitive).
    pub fn get(&self, name: &str) -> Option<&ClassifiedColumn> {
        match self.index.get(&name.to_lowercase()) {
            Some(&i) => self.columns.get(i),
            None => self
                .columns
                .iter()
                .find(|c| c.name.eq_ignore_ascii_case(name)),
        }
    }

    /// Category of a column; unknown columns are `None`.
    pub fn category(&self, name: &str) -> ExclusionCategory {
        self.get(name)
            .map(|c| c.category)
            .unwrap_or(ExclusionCategory::None)
    }

    /// Why a column is left out of value comparison under `mode`, if it is.
    ///
    /// Identifier columns are compared only in `include_normal` mode; in
    /// tracking mode they are accounted for by identifier statistics instead.
    pub fn exclusion_reason(&self, name: &str, mode: UuidComparisonMode) -> Option<ExclusionReason> {
        let col = self.get(name)?;
        match col.category {
            ExclusionCategory::None => {}
            ExclusionCategory::Uuid if mode == UuidComparisonMode::IncludeNormal => {}
            other => return Some(ExclusionReason::Category(other)),
        }
        col.user_excluded
            .as_ref()
            .map(|why| ExclusionReason::UserExcluded(why.clone()))
    }

    /// Whether a column takes part in value comparison under `mode`.
    pub fn is_compared(&self, name: &str, mode: UuidComparisonMode) -> bool {
        self.exclusion_reason(name, mode).is_none()
    }

    /// Names of columns in a category, in schema order.
    pub fn columns_in(&self, category: ExclusionCategory) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.category == category)
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Names of user-excluded columns, in schema order.
    pub fn user_excluded(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.user_excluded.is_some())
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Human-readable summary of everything left out of the comparison.
    pub fn exclusion_summary(&self) -> String {
        let mut parts = Vec::new();
        for category in ExclusionCategory::PATTERN_ORDER {
            let cols = self.columns_in(category);
            if !cols.is_empty() {
                parts.push(format!("{} columns: {}", category.label(), cols.join(", ")));
            }
        }
        let user = self.user_excluded();
        if !user.is_empty() {
            parts.push(format!("User-excluded columns: {}", user.join(", ")));
        }

        if parts.is_empty() {
            "No columns excluded from comparison".to_string()
        } else {
            format!("Excluded from comparison - {}", parts.join("; "))
        }
    }
}

/// Assigns exclusion categories to the columns of a table.
pub struct ColumnClassifier<'a> {
    options: &'a ComparisonOptions,
    patterns: &'a PatternLibrary,
}

impl<'a> ColumnClassifier<'a> {
    pub fn new(options: &'a ComparisonOptions, patterns: &'a PatternLibrary) -> Self {
        Self { options, patterns }
    }

    /// Classify every column of `schema`.
    ///
    /// `sample` holds rows in schema column order; only the first
    /// `sample_size` rows are inspected.
    pub fn classify(&self, schema: &TableSchema, sample: &[Row]) -> ColumnClassification {
        let sample = &sample[..sample.len().min(self.options.sample_size)];
        let columns = schema
            .columns
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let (category, detected_by) = self.categorize(schema, idx, sample);
                let user_excluded = self.user_exclusion(&col.name);
                debug!(
                    "Table {} - column {} classified as {} ({:?})",
                    schema.name, col.name, category, detected_by
                );
                ClassifiedColumn {
                    name: col.name.clone(),
                    category,
                    detected_by,
                    user_excluded,
                }
            })
            .collect();
        ColumnClassification::new(&schema.name, columns)
    }

    fn categorize(
        &self,
        schema: &TableSchema,
        idx: usize,
        sample: &[Row],
    ) -> (ExclusionCategory, DetectionSource) {
        let col = &schema.columns[idx];
        let opts = self.options;

        if let Some(category) = self.explicit_category(&col.name) {
            return (category, DetectionSource::Explicit);
        }

        if opts.auto_detect_timestamps && col.is_timestamp_type() {
            return (
                ExclusionCategory::Timestamp,
                DetectionSource::DeclaredType(col.data_type.clone()),
            );
        }
        if opts.auto_detect_sequences && col.is_sequence_type() {
            return (
                ExclusionCategory::Sequence,
                DetectionSource::DeclaredType(col.data_type.clone()),
            );
        }
        if opts.auto_detect_uuids && col.is_uuid_type() {
            return (
                ExclusionCategory::Uuid,
                DetectionSource::DeclaredType(col.data_type.clone()),
            );
        }

        for category in ExclusionCategory::PATTERN_ORDER {
            if !self.auto_detect(category) {
                continue;
            }
            if let Some(pattern) = self.patterns.match_category(category, &col.name) {
                return (category, DetectionSource::NamePattern(pattern.to_string()));
            }
        }

        if opts.auto_detect_sequences {
            if col.is_primary_key && col.is_integer_type() {
                return (ExclusionCategory::Sequence, DetectionSource::IntegerPrimaryKey);
            }
            if let Some((gap, ratio)) = sequential_gap(sample, idx) {
                return (
                    ExclusionCategory::Sequence,
                    DetectionSource::SampledValues { gap, ratio },
                );
            }
        }

        (ExclusionCategory::None, DetectionSource::Default)
    }

    fn auto_detect(&self, category: ExclusionCategory) -> bool {
        match category {
            ExclusionCategory::Uuid => self.options.auto_detect_uuids,
            ExclusionCategory::Timestamp => self.options.auto_detect_timestamps,
            ExclusionCategory::Metadata => self.options.auto_detect_metadata,
            ExclusionCategory::Sequence => self.options.auto_detect_sequences,
            ExclusionCategory::None => false,
        }
    }

    fn explicit_category(&self, name: &str) -> Option<ExclusionCategory> {
        let opts = self.options;
        let lists = [
            (&opts.explicit_uuid_columns, ExclusionCategory::Uuid),
            (&opts.explicit_timestamp_columns, ExclusionCategory::Timestamp),
            (&opts.explicit_metadata_columns, ExclusionCategory::Metadata),
            (&opts.explicit_sequence_columns, ExclusionCategory::Sequence),
        ];
        lists
            .into_iter()
            .find(|(list, _)| list.iter().any(|c| c.eq_ignore_ascii_case(name)))
            .map(|(_, category)| category)
    }

    fn user_exclusion(&self, name: &str) -> Option<String> {
        if let Some(c) = self
            .options
            .excluded_columns
            .iter()
            .find(|c| c.eq_ignore_ascii_case(name))
        {
            return Some(c.clone());
        }
        self.patterns.match_excluded(name).map(str::to_string)
    }
}

/// Detect auto-increment-like values in a sampled column.
///
/// Looks at non-null values in delivered order. Returns the modal gap and the
/// fraction of gaps equal to it when at least 80% of consecutive gaps share
/// one small positive step.
fn sequential_gap(sample: &[Row], idx: usize) -> Option<(i64, f64)> {
    let mut values = Vec::with_capacity(sample.len());
    for row in sample {
        match row.get(idx) {
            Some(v) if v.is_null() => continue,
            Some(v) => values.push(v.as_i64()?),
            None => continue,
        }
    }
    if values.len() < MIN_SEQUENCE_SAMPLE {
        return None;
    }

    let gaps: Vec<i64> = values.windows(2).map(|w| w[1].saturating_sub(w[0])).collect();
    let mut counts: HashMap<i64, usize> = HashMap::new();
    for g in &gaps {
        *counts.entry(*g).or_default() += 1;
    }
    let (gap, count) = counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))?;

    let ratio = count as f64 / gaps.len() as f64;
    if (1..=MAX_SEQUENCE_GAP).contains(&gap) && ratio >= SEQUENCE_GAP_THRESHOLD {
        Some((gap, ratio))
    } else {
        None
    }
}

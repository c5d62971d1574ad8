//! Result types for a single table comparison.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::classify::ColumnClassification;
use crate::core::{Row, SqlValue};
use crate::identifier::DetectedPattern;

/// Which data source a row came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    A,
    B,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::A => write!(f, "A"),
            Side::B => write!(f, "B"),
        }
    }
}

/// Lifecycle of a table comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableStatus {
    Pending,
    Streaming,
    Reconciling,
    Completed,
    Failed,
}

impl TableStatus {
    /// Whether `next` is a legal successor of this state.
    pub fn can_transition_to(&self, next: TableStatus) -> bool {
        use TableStatus::*;
        matches!(
            (*self, next),
            (Pending, Streaming)
                | (Streaming, Reconciling)
                | (Reconciling, Completed)
                | (Pending, Failed)
                | (Streaming, Failed)
                | (Reconciling, Failed)
        )
    }
}

impl fmt::Display for TableStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TableStatus::Pending => "pending",
            TableStatus::Streaming => "streaming",
            TableStatus::Reconciling => "reconciling",
            TableStatus::Completed => "completed",
            TableStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// How rows were paired between the two sides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", content = "columns", rename_all = "snake_case")]
pub enum KeyStrategy {
    /// Declared primary key columns.
    PrimaryKey(Vec<String>),
    /// Every compared column.
    Composite(Vec<String>),
    /// Stream position. Reordering between sources shows up as differences.
    Positional,
}

/// One differing column of a matched row pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDifference {
    pub column: String,
    pub value_a: SqlValue,
    pub value_b: SqlValue,
}

/// Outcome for one row key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RowDiff {
    MatchedIdentical,
    MatchedWithDifferences { fields: Vec<FieldDifference> },
    OnlyInA { row: Row },
    OnlyInB { row: Row },
}

/// A recorded row outcome, keyed by the values used to pair it.
///
/// For positionally paired tables the key is the row position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowDiffResult {
    pub key: Vec<SqlValue>,
    pub diff: RowDiff,
}

/// A row that could not be decoded or compared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowError {
    pub side: Side,
    /// Zero-based position in the side's stream.
    pub position: u64,
    pub reason: String,
}

/// Non-fatal conditions attached to a table result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TableWarning {
    /// No usable key; rows were paired by position.
    UnkeyedTable,
    /// Unmatched rows held in memory exceeded the advisory threshold.
    MemoryThreshold { pending_rows: usize, threshold: usize },
    /// The two schemas do not have the same columns.
    SchemaDrift {
        only_in_a: Vec<String>,
        only_in_b: Vec<String>,
    },
    /// More differences were found than were recorded.
    DifferencesTruncated { recorded: usize, total: u64 },
}

impl fmt::Display for TableWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableWarning::UnkeyedTable => {
                write!(f, "no usable key; rows paired by position (reordering shows as differences)")
            }
            TableWarning::MemoryThreshold {
                pending_rows,
                threshold,
            } => write!(
                f,
                "{} unmatched rows held in memory (threshold {})",
                pending_rows, threshold
            ),
            TableWarning::SchemaDrift {
                only_in_a,
                only_in_b,
            } => write!(
                f,
                "columns differ: only in A [{}], only in B [{}]",
                only_in_a.join(", "),
                only_in_b.join(", ")
            ),
            TableWarning::DifferencesTruncated { recorded, total } => {
                write!(f, "{} of {} differences recorded", recorded, total)
            }
        }
    }
}

/// Statistics over identifier columns in tracking mode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UuidStatistics {
    /// Tracked identifier columns.
    pub columns: Vec<String>,
    /// Non-null identifier values seen on side A.
    pub total_values_a: u64,
    /// Non-null identifier values seen on side B.
    pub total_values_b: u64,
    /// Distinct identifier values on side A (summed per column).
    pub unique_values_a: u64,
    /// Distinct identifier values on side B (summed per column).
    pub unique_values_b: u64,
    /// Shape detected per column from side A's sample.
    pub detected_patterns: BTreeMap<String, DetectedPattern>,
    /// Matched row pairs whose raw identifier values differ.
    pub raw_difference_count: u64,
    /// Matched row pairs whose normalized identifier values are equal.
    pub normalized_match_count: u64,
}

impl UuidStatistics {
    /// Whether both sides carry the same number of identifier values.
    pub fn counts_match(&self) -> bool {
        self.total_values_a == self.total_values_b
    }
}

/// Result of comparing one table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableComparisonResult {
    pub table_name: String,
    pub status: TableStatus,
    pub key_strategy: KeyStrategy,
    /// Columns whose values were compared.
    pub compared_columns: Vec<String>,
    pub classification: ColumnClassification,
    pub columns_only_in_a: Vec<String>,
    pub columns_only_in_b: Vec<String>,

    pub rows_a: u64,
    pub rows_b: u64,
    /// Matched row pairs.
    pub rows_compared: u64,
    pub identical_rows: u64,
    pub differing_rows: u64,
    pub only_in_a: u64,
    pub only_in_b: u64,
    pub unreadable_rows_a: u64,
    pub unreadable_rows_b: u64,

    /// Recorded non-identical outcomes, capped per table.
    pub differences: Vec<RowDiffResult>,
    /// Recorded unreadable rows, capped per table.
    pub row_errors: Vec<RowError>,
    pub uuid_statistics: Option<UuidStatistics>,
    pub warnings: Vec<TableWarning>,
    pub duration_ms: u64,
}

impl TableComparisonResult {
    pub fn new(table_name: impl Into<String>, key_strategy: KeyStrategy) -> Self {
        Self {
            table_name: table_name.into(),
            status: TableStatus::Pending,
            key_strategy,
            compared_columns: Vec::new(),
            classification: ColumnClassification::default(),
            columns_only_in_a: Vec::new(),
            columns_only_in_b: Vec::new(),
            rows_a: 0,
            rows_b: 0,
            rows_compared: 0,
            identical_rows: 0,
            differing_rows: 0,
            only_in_a: 0,
            only_in_b: 0,
            unreadable_rows_a: 0,
            unreadable_rows_b: 0,
            differences: Vec::new(),
            row_errors: Vec::new(),
            uuid_statistics: None,
            warnings: Vec::new(),
            duration_ms: 0,
        }
    }

    /// Differing rows plus rows present on one side only.
    pub fn total_differences(&self) -> u64 {
        self.differing_rows + self.only_in_a + self.only_in_b
    }

    /// No differences and no unreadable rows.
    pub fn is_identical(&self) -> bool {
        self.total_differences() == 0 && self.unreadable_rows_a == 0 && self.unreadable_rows_b == 0
    }

    /// Identifier counts agree between the sides (trivially true when untracked).
    pub fn integrity_ok(&self) -> bool {
        self.uuid_statistics
            .as_ref()
            .map_or(true, UuidStatistics::counts_match)
    }
}

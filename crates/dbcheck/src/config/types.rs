//! Configuration type definitions.

use crate::error::CheckError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Side A of the comparison.
    pub source: DatabaseConfig,

    /// Side B of the comparison.
    pub target: DatabaseConfig,

    /// Comparison behavior.
    #[serde(default)]
    pub comparison: ComparisonOptions,
}

/// Connection settings for one side of the comparison.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database type (only "sqlite" for now).
    #[serde(default = "default_sqlite")]
    pub r#type: String,

    /// Path to the database file.
    pub path: String,
}

impl DatabaseConfig {
    /// Convenience constructor for a SQLite file.
    pub fn sqlite(path: impl Into<String>) -> Self {
        Self {
            r#type: default_sqlite(),
            path: path.into(),
        }
    }
}

/// How columns classified as unique identifiers take part in the comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UuidComparisonMode {
    /// Skip identifier columns entirely.
    #[default]
    Exclude,
    /// Keep identifier columns out of the diff but collect statistics and
    /// normalized-match counts for them.
    IncludeWithTracking,
    /// Compare identifier columns like any other column.
    IncludeNormal,
}

impl UuidComparisonMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            UuidComparisonMode::Exclude => "exclude",
            UuidComparisonMode::IncludeWithTracking => "include_with_tracking",
            UuidComparisonMode::IncludeNormal => "include_normal",
        }
    }
}

impl fmt::Display for UuidComparisonMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UuidComparisonMode {
    type Err = CheckError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "exclude" => Ok(UuidComparisonMode::Exclude),
            "include_with_tracking" => Ok(UuidComparisonMode::IncludeWithTracking),
            "include_normal" => Ok(UuidComparisonMode::IncludeNormal),
            other => Err(CheckError::Config(format!(
                "comparison.uuid_comparison_mode must be one of exclude, include_with_tracking, include_normal, got '{}'",
                other
            ))),
        }
    }
}

/// A single identifier rewrite rule as written in the config file.
///
/// `replacement` uses `\1` / `\g<name>` back-references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizeRuleConfig {
    pub pattern: String,
    pub replacement: String,
}

impl NormalizeRuleConfig {
    pub fn new(pattern: impl Into<String>, replacement: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            replacement: replacement.into(),
        }
    }
}

/// Comparison options shared read-only by every table worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ComparisonOptions {
    /// Treatment of identifier columns (default: exclude).
    pub uuid_comparison_mode: UuidComparisonMode,

    /// Detect identifier columns by name and type (default: true).
    pub auto_detect_uuids: bool,

    /// Detect timestamp columns by name and type (default: true).
    pub auto_detect_timestamps: bool,

    /// Detect audit/metadata columns by name (default: true).
    pub auto_detect_metadata: bool,

    /// Detect sequence columns by name, type, key and sampled values (default: true).
    pub auto_detect_sequences: bool,

    /// Columns always classified as identifiers.
    pub explicit_uuid_columns: Vec<String>,

    /// Columns always classified as timestamps.
    pub explicit_timestamp_columns: Vec<String>,

    /// Columns always classified as metadata.
    pub explicit_metadata_columns: Vec<String>,

    /// Columns always classified as sequences.
    pub explicit_sequence_columns: Vec<String>,

    /// Extra identifier name patterns, merged with the defaults.
    pub uuid_patterns: Vec<String>,

    /// Extra timestamp name patterns, merged with the defaults.
    pub timestamp_patterns: Vec<String>,

    /// Extra metadata name patterns, merged with the defaults.
    pub metadata_patterns: Vec<String>,

    /// Extra sequence name patterns, merged with the defaults.
    pub sequence_patterns: Vec<String>,

    /// Identifier shapes tried after the built-in ones during pattern detection.
    pub unique_id_patterns: Vec<String>,

    /// Ordered rewrite rules applied to tracked identifier values.
    pub unique_id_normalize_patterns: Vec<NormalizeRuleConfig>,

    /// Columns excluded by exact name, independent of classification.
    pub excluded_columns: Vec<String>,

    /// Columns excluded by regex, independent of classification.
    pub excluded_column_patterns: Vec<String>,

    /// Compare text case-sensitively (default: true).
    pub case_sensitive: bool,

    /// Trim and collapse whitespace before comparing text (default: false).
    pub ignore_whitespace: bool,

    /// Rows per batch pulled from each side (default: 1000).
    pub batch_size: usize,

    /// Compare tables concurrently (default: true).
    pub parallel_tables: bool,

    /// Maximum tables compared at once (default: 4).
    pub max_workers: usize,

    /// Cap on recorded row differences per table (default: 100).
    pub max_differences_per_table: usize,

    /// Only compare these tables (empty = all common tables).
    pub include_tables: Vec<String>,

    /// Never compare these tables.
    pub exclude_tables: Vec<String>,

    /// Pending unmatched rows per table above which a warning is attached (default: 100000).
    pub memory_warning_rows: usize,

    /// Rows sampled for classification and identifier pattern detection (default: 100).
    pub sample_size: usize,
}

impl Default for ComparisonOptions {
    fn default() -> Self {
        Self {
            uuid_comparison_mode: UuidComparisonMode::default(),
            auto_detect_uuids: true,
            auto_detect_timestamps: true,
            auto_detect_metadata: true,
            auto_detect_sequences: true,
            explicit_uuid_columns: Vec::new(),
            explicit_timestamp_columns: Vec::new(),
            explicit_metadata_columns: Vec::new(),
            explicit_sequence_columns: Vec::new(),
            uuid_patterns: Vec::new(),
            timestamp_patterns: Vec::new(),
            metadata_patterns: Vec::new(),
            sequence_patterns: Vec::new(),
            unique_id_patterns: Vec::new(),
            unique_id_normalize_patterns: Vec::new(),
            excluded_columns: Vec::new(),
            excluded_column_patterns: Vec::new(),
            case_sensitive: true,
            ignore_whitespace: false,
            batch_size: 1000,
            parallel_tables: true,
            max_workers: 4,
            max_differences_per_table: 100,
            include_tables: Vec::new(),
            exclude_tables: Vec::new(),
            memory_warning_rows: 100_000,
            sample_size: 100,
        }
    }
}

impl ComparisonOptions {
    /// Effective worker count, honoring `parallel_tables`.
    pub fn effective_workers(&self) -> usize {
        if self.parallel_tables {
            self.max_workers.max(1)
        } else {
            1
        }
    }

    /// Whether a table passes the include/exclude filters.
    pub fn table_selected(&self, table: &str) -> bool {
        if self.exclude_tables.iter().any(|t| t == table) {
            return false;
        }
        self.include_tables.is_empty() || self.include_tables.iter().any(|t| t == table)
    }
}

fn default_sqlite() -> String {
    "sqlite".to_string()
}

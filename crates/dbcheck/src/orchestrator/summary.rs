//! Cross-table aggregation of comparison results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::Result;
use crate::reconcile::TableComparisonResult;

/// A table that could not be compared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableFailure {
    pub table: String,
    pub error: String,
}

/// Result of a comparison run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonSummary {
    /// Unique run identifier.
    pub run_id: String,

    /// When the run started.
    pub started_at: DateTime<Utc>,

    /// When the run completed.
    pub completed_at: DateTime<Utc>,

    /// Total duration in milliseconds.
    pub duration_ms: u64,

    /// Completed tables, sorted by name.
    pub tables: BTreeMap<String, TableComparisonResult>,

    /// Tables present only in source A.
    pub tables_only_in_a: Vec<String>,

    /// Tables present only in source B.
    pub tables_only_in_b: Vec<String>,

    /// Tables never scheduled because of a failure or cancellation.
    pub tables_not_started: Vec<String>,

    /// Failed tables, sorted by name.
    pub failures: Vec<TableFailure>,

    /// The first failure reported during the run.
    pub first_error: Option<String>,

    /// Whether the run was cancelled.
    pub cancelled: bool,

    pub identical_tables: usize,
    pub tables_with_differences: usize,
    pub total_rows_compared: u64,
    pub total_differences: u64,
    pub total_unreadable_rows: u64,
    pub total_uuid_columns: usize,
    pub total_uuid_values_a: u64,
    pub total_uuid_values_b: u64,

    /// True only if every table's tracked identifier counts match.
    pub integrity_ok: bool,
}

impl ComparisonSummary {
    /// Whether anything differs between the two sources, or anything failed.
    pub fn has_differences(&self) -> bool {
        self.tables_with_differences > 0
            || !self.failures.is_empty()
            || !self.tables_only_in_a.is_empty()
            || !self.tables_only_in_b.is_empty()
            || !self.integrity_ok
    }

    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Human-readable report.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("Comparison run {}\n", self.run_id));
        out.push_str(&format!(
            "Tables: {} compared, {} identical, {} with differences, {} failed\n",
            self.tables.len(),
            self.identical_tables,
            self.tables_with_differences,
            self.failures.len()
        ));
        out.push_str(&format!(
            "Rows compared: {}, differences: {}, unreadable: {}\n",
            self.total_rows_compared, self.total_differences, self.total_unreadable_rows
        ));
        if self.total_uuid_columns > 0 {
            out.push_str(&format!(
                "Identifier columns: {} ({} values in A, {} in B), integrity {}\n",
                self.total_uuid_columns,
                self.total_uuid_values_a,
                self.total_uuid_values_b,
                if self.integrity_ok { "ok" } else { "MISMATCH" }
            ));
        }
        for (name, t) in &self.tables {
            out.push_str(&format!(
                "  {}: {} pairs, {} identical, {} differing, {} only in A, {} only in B",
                name, t.rows_compared, t.identical_rows, t.differing_rows, t.only_in_a, t.only_in_b
            ));
            if t.unreadable_rows_a + t.unreadable_rows_b > 0 {
                out.push_str(&format!(
                    ", {} unreadable",
                    t.unreadable_rows_a + t.unreadable_rows_b
                ));
            }
            out.push('\n');
            for w in &t.warnings {
                out.push_str(&format!("    warning: {}\n", w));
            }
        }
        if !self.tables_only_in_a.is_empty() {
            out.push_str(&format!("Only in A: {}\n", self.tables_only_in_a.join(", ")));
        }
        if !self.tables_only_in_b.is_empty() {
            out.push_str(&format!("Only in B: {}\n", self.tables_only_in_b.join(", ")));
        }
        for f in &self.failures {
            out.push_str(&format!("FAILED {}: {}\n", f.table, f.error));
        }
        if !self.tables_not_started.is_empty() {
            out.push_str(&format!(
                "Not started: {}\n",
                self.tables_not_started.join(", ")
            ));
        }
        if self.cancelled {
            out.push_str("Run was cancelled\n");
        }
        out
    }
}

/// Single-writer aggregator. Workers hand over finished tables by message;
/// only the aggregator task mutates this.
#[derive(Debug, Default)]
pub(crate) struct SummaryBuilder {
    tables: BTreeMap<String, TableComparisonResult>,
    failures: Vec<TableFailure>,
    first_error: Option<String>,
}

impl SummaryBuilder {
    pub(crate) fn add(&mut self, table: String, outcome: Result<TableComparisonResult>) {
        match outcome {
            Ok(result) => {
                self.tables.insert(table, result);
            }
            Err(e) => self.add_failure(table, e.to_string()),
        }
    }

    pub(crate) fn add_failure(&mut self, table: String, error: String) {
        if self.first_error.is_none() {
            self.first_error = Some(format!("{}: {}", table, error));
        }
        self.failures.push(TableFailure { table, error });
    }

    pub(crate) fn finish(self, run: RunInfo) -> ComparisonSummary {
        let mut failures = self.failures;
        failures.sort_by(|a, b| a.table.cmp(&b.table));

        let mut summary = ComparisonSummary {
            run_id: run.run_id,
            started_at: run.started_at,
            completed_at: run.completed_at,
            duration_ms: (run.completed_at - run.started_at)
                .num_milliseconds()
                .max(0) as u64,
            tables: self.tables,
            tables_only_in_a: run.tables_only_in_a,
            tables_only_in_b: run.tables_only_in_b,
            tables_not_started: run.tables_not_started,
            failures,
            first_error: self.first_error,
            cancelled: run.cancelled,
            identical_tables: 0,
            tables_with_differences: 0,
            total_rows_compared: 0,
            total_differences: 0,
            total_unreadable_rows: 0,
            total_uuid_columns: 0,
            total_uuid_values_a: 0,
            total_uuid_values_b: 0,
            integrity_ok: true,
        };

        for t in summary.tables.values() {
            if t.is_identical() {
                summary.identical_tables += 1;
            } else {
                summary.tables_with_differences += 1;
            }
            summary.total_rows_compared += t.rows_compared;
            summary.total_differences += t.total_differences();
            summary.total_unreadable_rows += t.unreadable_rows_a + t.unreadable_rows_b;
            if let Some(stats) = &t.uuid_statistics {
                summary.total_uuid_columns += stats.columns.len();
                summary.total_uuid_values_a += stats.total_values_a;
                summary.total_uuid_values_b += stats.total_values_b;
            }
            summary.integrity_ok &= t.integrity_ok();
        }

        summary
    }
}

/// Run-level facts known to the scheduler rather than the aggregator.
#[derive(Debug)]
pub(crate) struct RunInfo {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub tables_only_in_a: Vec<String>,
    pub tables_only_in_b: Vec<String>,
    pub tables_not_started: Vec<String>,
    pub cancelled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CheckError;
    use crate::reconcile::{KeyStrategy, UuidStatistics};

    fn run_info() -> RunInfo {
        let now = Utc::now();
        RunInfo {
            run_id: "r1".into(),
            started_at: now,
            completed_at: now,
            tables_only_in_a: vec![],
            tables_only_in_b: vec![],
            tables_not_started: vec![],
            cancelled: false,
        }
    }

    #[test]
    fn test_totals_and_integrity() {
        let mut builder = SummaryBuilder::default();

        let mut same = TableComparisonResult::new("a", KeyStrategy::Positional);
        same.rows_compared = 10;
        same.identical_rows = 10;
        builder.add("a".into(), Ok(same));

        let mut diff = TableComparisonResult::new("b", KeyStrategy::Positional);
        diff.rows_compared = 4;
        diff.differing_rows = 1;
        diff.only_in_b = 2;
        diff.uuid_statistics = Some(UuidStatistics {
            columns: vec!["id".into()],
            total_values_a: 4,
            total_values_b: 6,
            ..Default::default()
        });
        builder.add("b".into(), Ok(diff));

        let summary = builder.finish(run_info());
        assert_eq!(summary.identical_tables, 1);
        assert_eq!(summary.tables_with_differences, 1);
        assert_eq!(summary.total_rows_compared, 14);
        assert_eq!(summary.total_differences, 3);
        assert_eq!(summary.total_uuid_columns, 1);
        assert!(!summary.integrity_ok);
        assert!(summary.has_differences());
        assert_eq!(summary.tables.keys().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_failures_sorted_and_first_error_kept() {
        let mut builder = SummaryBuilder::default();
        builder.add("zeta".into(), Err(CheckError::connector("zeta", "reset")));
        builder.add("alpha".into(), Err(CheckError::connector("alpha", "gone")));
        let summary = builder.finish(run_info());
        assert_eq!(summary.failures[0].table, "alpha");
        assert!(summary.first_error.as_deref().unwrap().starts_with("zeta"));
        assert!(summary.integrity_ok);
        assert!(summary.has_differences());
    }

    #[test]
    fn test_json_and_text() {
        let summary = SummaryBuilder::default().finish(run_info());
        assert!(!summary.has_differences());
        let json = summary.to_json().unwrap();
        assert!(json.contains("\"run_id\": \"r1\""));
        assert!(summary.to_text().contains("0 compared"));
    }
}

//! Row reconciliation for a single table.
//!
//! Both sides are pulled batch by batch, alternating A and B. Keyed tables use
//! a symmetric streaming hash join: each incoming row is matched against the other side's
//! unmatched rows and is either paired immediately or parked under its key.
//! Duplicate keys pair one-to-one in arrival order. Tables without a usable
//! key are paired by stream position.
//!
//! Rows that cannot be decoded are counted per side and left out of the
//! matched and unmatched sets.

pub mod key;
pub mod stream;
pub mod types;

pub use key::{KeyPart, KeyPlan, RowKey, TextFolding, NUMERIC_TOLERANCE};
pub use stream::BatchStream;
pub use types::{
    FieldDifference, KeyStrategy, RowDiff, RowDiffResult, RowError, Side, TableComparisonResult,
    TableStatus, TableWarning, UuidStatistics,
};

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::classify::{ColumnClassification, ExclusionCategory};
use crate::config::{CompiledOptions, UuidComparisonMode};
use crate::core::{Batch, Row, SqlValue, TableSchema};
use crate::error::{CheckError, Result};
use crate::identifier::normalize;

/// Compare one table's two row streams.
///
/// `classification` must have been built from `schema_a`. On a stream error
/// the table is abandoned and the error returned; no partial result is
/// produced.
pub async fn compare_table(
    table: &str,
    schema_a: &TableSchema,
    schema_b: &TableSchema,
    stream_a: &mut BatchStream,
    stream_b: &mut BatchStream,
    classification: &ColumnClassification,
    compiled: &CompiledOptions,
) -> Result<TableComparisonResult> {
    let start = Instant::now();
    let mut rec = Reconciler::new(table, schema_a, schema_b, classification, compiled);

    rec.transition(TableStatus::Streaming);
    let mut done_a = false;
    let mut done_b = false;
    while !(done_a && done_b) {
        if !done_a {
            match stream_a.next_batch().await {
                Some(Ok(batch)) => rec.ingest(Side::A, batch),
                Some(Err(e)) => {
                    rec.transition(TableStatus::Failed);
                    return Err(e);
                }
                None => done_a = true,
            }
        }
        if !done_b {
            match stream_b.next_batch().await {
                Some(Ok(batch)) => rec.ingest(Side::B, batch),
                Some(Err(e)) => {
                    rec.transition(TableStatus::Failed);
                    return Err(e);
                }
                None => done_b = true,
            }
        }
    }

    let mut result = rec.finish();
    result.duration_ms = start.elapsed().as_millis() as u64;

    info!(
        "Table {} - {} pairs compared: {} identical, {} differing, {} only in A, {} only in B",
        table,
        result.rows_compared,
        result.identical_rows,
        result.differing_rows,
        result.only_in_a,
        result.only_in_b
    );
    for warning in &result.warnings {
        warn!("Table {} - {}", table, warning);
    }

    Ok(result)
}

struct Pending {
    position: u64,
    row: Row,
}

/// Statistics accumulator for one tracked identifier column.
struct TrackedColumn {
    name: String,
    idx_a: usize,
    idx_b: usize,
    total_a: u64,
    total_b: u64,
    unique_a: HashSet<String>,
    unique_b: HashSet<String>,
    sample: Vec<String>,
}

struct Reconciler<'a> {
    table: &'a str,
    compiled: &'a CompiledOptions,
    folding: TextFolding,
    plan: KeyPlan,
    compared: Vec<(String, usize, usize)>,
    tracked: Vec<TrackedColumn>,
    width_a: usize,
    width_b: usize,
    used_a: Vec<(usize, String)>,
    used_b: Vec<(usize, String)>,

    pending_a: HashMap<RowKey, VecDeque<Pending>>,
    pending_b: HashMap<RowKey, VecDeque<Pending>>,
    queue_a: VecDeque<Pending>,
    queue_b: VecDeque<Pending>,
    pending_rows: usize,
    memory_warned: bool,
    position_a: u64,
    position_b: u64,

    result: TableComparisonResult,
}

impl<'a> Reconciler<'a> {
    fn new(
        table: &'a str,
        schema_a: &'a TableSchema,
        schema_b: &'a TableSchema,
        classification: &ColumnClassification,
        compiled: &'a CompiledOptions,
    ) -> Self {
        let options = &compiled.options;
        let mode = options.uuid_comparison_mode;

        let compared: Vec<(String, usize, usize)> = schema_a
            .columns
            .iter()
            .enumerate()
            .filter_map(|(idx_a, col)| {
                let idx_b = schema_b.column_index(&col.name)?;
                classification
                    .is_compared(&col.name, mode)
                    .then(|| (col.name.clone(), idx_a, idx_b))
            })
            .collect();

        let tracked: Vec<TrackedColumn> = if mode == UuidComparisonMode::IncludeWithTracking {
            schema_a
                .columns
                .iter()
                .enumerate()
                .filter(|(_, col)| classification.category(&col.name) == ExclusionCategory::Uuid)
                .filter_map(|(idx_a, col)| {
                    let idx_b = schema_b.column_index(&col.name)?;
                    Some(TrackedColumn {
                        name: col.name.clone(),
                        idx_a,
                        idx_b,
                        total_a: 0,
                        total_b: 0,
                        unique_a: HashSet::new(),
                        unique_b: HashSet::new(),
                        sample: Vec::new(),
                    })
                })
                .collect()
        } else {
            Vec::new()
        };

        let plan = KeyPlan::choose(schema_a, schema_b, classification, &compared, mode);

        let mut used_a: Vec<(usize, String)> = Vec::new();
        let mut used_b: Vec<(usize, String)> = Vec::new();
        let mut add_used = |name: &str, ia: usize, ib: usize| {
            if !used_a.iter().any(|(i, _)| *i == ia) {
                used_a.push((ia, name.to_string()));
            }
            if !used_b.iter().any(|(i, _)| *i == ib) {
                used_b.push((ib, name.to_string()));
            }
        };
        for c in &plan.columns {
            add_used(&c.name, c.idx_a, c.idx_b);
        }
        for (name, ia, ib) in &compared {
            add_used(name, *ia, *ib);
        }
        for t in &tracked {
            add_used(&t.name, t.idx_a, t.idx_b);
        }

        let mut result = TableComparisonResult::new(table, plan.strategy.clone());
        result.compared_columns = compared.iter().map(|(n, _, _)| n.clone()).collect();
        result.classification = classification.clone();
        result.columns_only_in_a = schema_a
            .columns
            .iter()
            .filter(|c| schema_b.column_index(&c.name).is_none())
            .map(|c| c.name.clone())
            .collect();
        result.columns_only_in_b = schema_b
            .columns
            .iter()
            .filter(|c| schema_a.column_index(&c.name).is_none())
            .map(|c| c.name.clone())
            .collect();
        if !result.columns_only_in_a.is_empty() || !result.columns_only_in_b.is_empty() {
            result.warnings.push(TableWarning::SchemaDrift {
                only_in_a: result.columns_only_in_a.clone(),
                only_in_b: result.columns_only_in_b.clone(),
            });
        }
        if plan.is_positional() {
            result.warnings.push(TableWarning::UnkeyedTable);
        }
        if !tracked.is_empty() {
            result.uuid_statistics = Some(UuidStatistics {
                columns: tracked.iter().map(|t| t.name.clone()).collect(),
                ..Default::default()
            });
        }

        debug!(
            "Table {} - key strategy {:?}, {} compared column(s), {} tracked identifier column(s)",
            table,
            plan.strategy,
            compared.len(),
            tracked.len()
        );

        Self {
            table,
            compiled,
            folding: TextFolding::from_options(options),
            plan,
            compared,
            tracked,
            width_a: schema_a.columns.len(),
            width_b: schema_b.columns.len(),
            used_a,
            used_b,
            pending_a: HashMap::new(),
            pending_b: HashMap::new(),
            queue_a: VecDeque::new(),
            queue_b: VecDeque::new(),
            pending_rows: 0,
            memory_warned: false,
            position_a: 0,
            position_b: 0,
            result,
        }
    }

    fn transition(&mut self, next: TableStatus) {
        debug_assert!(
            self.result.status.can_transition_to(next),
            "illegal transition {} -> {}",
            self.result.status,
            next
        );
        debug!("Table {} - {} -> {}", self.table, self.result.status, next);
        self.result.status = next;
    }

    fn ingest(&mut self, side: Side, batch: Batch) {
        debug!(
            "Table {} - side {} batch of {} rows ({} unmatched pending)",
            self.table,
            side,
            batch.len(),
            self.pending_rows
        );
        for row in batch.rows {
            let position = match side {
                Side::A => {
                    self.result.rows_a += 1;
                    self.position_a += 1;
                    self.position_a - 1
                }
                Side::B => {
                    self.result.rows_b += 1;
                    self.position_b += 1;
                    self.position_b - 1
                }
            };

            if let Some(reason) = self.unreadable_reason(side, &row) {
                self.record_unreadable(side, position, reason);
                continue;
            }

            self.track_identifiers(side, &row);

            if self.plan.is_positional() {
                self.ingest_positional(side, Pending { position, row });
            } else {
                self.ingest_keyed(side, Pending { position, row });
            }
        }
    }

    fn unreadable_reason(&self, side: Side, row: &Row) -> Option<String> {
        let (width, used) = match side {
            Side::A => (self.width_a, &self.used_a),
            Side::B => (self.width_b, &self.used_b),
        };
        if row.len() != width {
            return Some(format!("row has {} values, expected {}", row.len(), width));
        }
        used.iter().find_map(|(idx, name)| match &row[*idx] {
            SqlValue::Undecodable(why) => Some(
                CheckError::Encoding {
                    table: self.table.to_string(),
                    column: name.clone(),
                    message: why.clone(),
                }
                .to_string(),
            ),
            _ => None,
        })
    }

    fn record_unreadable(&mut self, side: Side, position: u64, reason: String) {
        debug!(
            "Table {} - unreadable row at side {} position {}: {}",
            self.table, side, position, reason
        );
        match side {
            Side::A => self.result.unreadable_rows_a += 1,
            Side::B => self.result.unreadable_rows_b += 1,
        }
        if self.result.row_errors.len() < self.compiled.options.max_differences_per_table {
            self.result.row_errors.push(RowError {
                side,
                position,
                reason,
            });
        }
    }

    fn track_identifiers(&mut self, side: Side, row: &Row) {
        let sample_cap = self.compiled.options.sample_size;
        for t in &mut self.tracked {
            let idx = match side {
                Side::A => t.idx_a,
                Side::B => t.idx_b,
            };
            let Some(text) = row[idx].as_text() else {
                continue;
            };
            match side {
                Side::A => {
                    t.total_a += 1;
                    if t.sample.len() < sample_cap {
                        t.sample.push(text.clone());
                    }
                    t.unique_a.insert(text);
                }
                Side::B => {
                    t.total_b += 1;
                    t.unique_b.insert(text);
                }
            }
        }
    }

    fn ingest_keyed(&mut self, side: Side, incoming: Pending) {
        let key = self
            .plan
            .key(&incoming.row, side == Side::A, &self.folding, &self.compiled.rules);

        let (own, other) = match side {
            Side::A => (&mut self.pending_a, &mut self.pending_b),
            Side::B => (&mut self.pending_b, &mut self.pending_a),
        };

        match take_match(other, &key) {
            Some(partner) => {
                self.pending_rows -= 1;
                match side {
                    Side::A => self.compare_pair(&incoming.row, &partner.row),
                    Side::B => self.compare_pair(&partner.row, &incoming.row),
                }
            }
            None => {
                own.entry(key).or_default().push_back(incoming);
                self.pending_rows += 1;
                self.check_memory();
            }
        }
    }

    fn ingest_positional(&mut self, side: Side, incoming: Pending) {
        match side {
            Side::A => self.queue_a.push_back(incoming),
            Side::B => self.queue_b.push_back(incoming),
        }
        self.pending_rows += 1;
        while !self.queue_a.is_empty() && !self.queue_b.is_empty() {
            if let (Some(a), Some(b)) = (self.queue_a.pop_front(), self.queue_b.pop_front()) {
                self.pending_rows -= 2;
                self.compare_positional(a, b);
            }
        }
        self.check_memory();
    }

    fn check_memory(&mut self) {
        let threshold = self.compiled.options.memory_warning_rows;
        if !self.memory_warned && self.pending_rows > threshold {
            self.memory_warned = true;
            warn!(
                "Table {} - {} unmatched rows held in memory (threshold {})",
                self.table, self.pending_rows, threshold
            );
            self.result.warnings.push(TableWarning::MemoryThreshold {
                pending_rows: self.pending_rows,
                threshold,
            });
        }
    }

    fn compare_positional(&mut self, a: Pending, b: Pending) {
        let key = vec![SqlValue::Integer(a.position as i64)];
        self.compare_rows(key, &a.row, &b.row);
    }

    fn compare_pair(&mut self, row_a: &Row, row_b: &Row) {
        let key = self.plan.key_values(row_a, true);
        self.compare_rows(key, row_a, row_b);
    }

    fn compare_rows(&mut self, key: Vec<SqlValue>, row_a: &Row, row_b: &Row) {
        self.result.rows_compared += 1;

        let fields: Vec<FieldDifference> = self
            .compared
            .iter()
            .filter(|(_, ia, ib)| !self.folding.values_equal(&row_a[*ia], &row_b[*ib]))
            .map(|(name, ia, ib)| FieldDifference {
                column: name.clone(),
                value_a: row_a[*ia].clone(),
                value_b: row_b[*ib].clone(),
            })
            .collect();

        if let Some(stats) = self.result.uuid_statistics.as_mut() {
            for t in &self.tracked {
                let a = &row_a[t.idx_a];
                let b = &row_b[t.idx_b];
                if a != b {
                    stats.raw_difference_count += 1;
                }
                if let (Some(ta), Some(tb)) = (a.as_text(), b.as_text()) {
                    let rules = &self.compiled.rules;
                    if normalize(&ta, rules) == normalize(&tb, rules) {
                        stats.normalized_match_count += 1;
                    }
                }
            }
        }

        let diff = if fields.is_empty() {
            RowDiff::MatchedIdentical
        } else {
            RowDiff::MatchedWithDifferences { fields }
        };
        self.tally(RowDiffResult { key, diff });
    }

    /// Count an outcome; only non-identical outcomes are kept, up to the cap.
    fn tally(&mut self, outcome: RowDiffResult) {
        match outcome.diff {
            RowDiff::MatchedIdentical => {
                self.result.identical_rows += 1;
                return;
            }
            RowDiff::MatchedWithDifferences { .. } => self.result.differing_rows += 1,
            RowDiff::OnlyInA { .. } => self.result.only_in_a += 1,
            RowDiff::OnlyInB { .. } => self.result.only_in_b += 1,
        }
        if self.result.differences.len() < self.compiled.options.max_differences_per_table {
            self.result.differences.push(outcome);
        }
    }

    fn finish(mut self) -> TableComparisonResult {
        self.transition(TableStatus::Reconciling);

        let mut left_a: Vec<Pending> = self.pending_a.drain().flat_map(|(_, q)| q).collect();
        left_a.extend(self.queue_a.drain(..));
        left_a.sort_by_key(|p| p.position);
        let mut left_b: Vec<Pending> = self.pending_b.drain().flat_map(|(_, q)| q).collect();
        left_b.extend(self.queue_b.drain(..));
        left_b.sort_by_key(|p| p.position);

        let positional = self.plan.is_positional();
        for p in left_a {
            let key = if positional {
                vec![SqlValue::Integer(p.position as i64)]
            } else {
                self.plan.key_values(&p.row, true)
            };
            self.tally(RowDiffResult {
                key,
                diff: RowDiff::OnlyInA { row: p.row },
            });
        }
        for p in left_b {
            let key = if positional {
                vec![SqlValue::Integer(p.position as i64)]
            } else {
                self.plan.key_values(&p.row, false)
            };
            self.tally(RowDiffResult {
                key,
                diff: RowDiff::OnlyInB { row: p.row },
            });
        }
        self.pending_rows = 0;

        if let Some(stats) = self.result.uuid_statistics.as_mut() {
            let mut detected = BTreeMap::new();
            for t in &self.tracked {
                stats.total_values_a += t.total_a;
                stats.total_values_b += t.total_b;
                stats.unique_values_a += t.unique_a.len() as u64;
                stats.unique_values_b += t.unique_b.len() as u64;
                detected.insert(t.name.clone(), self.compiled.detector.detect_pattern(&t.sample));
            }
            stats.detected_patterns = detected;
            if !stats.counts_match() {
                warn!(
                    "Table {} - identifier counts differ: {} in A, {} in B",
                    self.table, stats.total_values_a, stats.total_values_b
                );
            }
        }

        let total = self.result.total_differences();
        let recorded = self.result.differences.len();
        if total > recorded as u64 {
            self.result
                .warnings
                .push(TableWarning::DifferencesTruncated { recorded, total });
        }

        self.transition(TableStatus::Completed);
        self.result
    }
}

fn take_match(map: &mut HashMap<RowKey, VecDeque<Pending>>, key: &RowKey) -> Option<Pending> {
    let queue = map.get_mut(key)?;
    let partner = queue.pop_front();
    if queue.is_empty() {
        map.remove(key);
    }
    partner
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::ColumnClassifier;
    use crate::config::{ComparisonOptions, NormalizeRuleConfig};
    use crate::core::ColumnDescriptor;
    use tokio::sync::mpsc;

    fn stream_of(rows: Vec<Row>, batch_size: usize) -> BatchStream {
        let (tx, rx) = mpsc::channel(rows.len() / batch_size.max(1) + 2);
        let mut chunks: Vec<Batch> = rows
            .chunks(batch_size.max(1))
            .map(|c| Batch::new(c.to_vec()))
            .collect();
        if let Some(last) = chunks.pop() {
            chunks.push(last.mark_final());
        }
        for b in chunks {
            tx.try_send(Ok(b)).unwrap();
        }
        BatchStream::new(rx)
    }

    async fn run(
        schema_a: &TableSchema,
        schema_b: &TableSchema,
        rows_a: Vec<Row>,
        rows_b: Vec<Row>,
        opts: ComparisonOptions,
    ) -> TableComparisonResult {
        let compiled = opts.compile().unwrap();
        let classification = ColumnClassifier::new(&compiled.options, &compiled.patterns)
            .classify(schema_a, &rows_a);
        let mut a = stream_of(rows_a, 2);
        let mut b = stream_of(rows_b, 3);
        compare_table(
            &schema_a.name,
            schema_a,
            schema_b,
            &mut a,
            &mut b,
            &classification,
            &compiled,
        )
        .await
        .unwrap()
    }

    fn people_schema() -> TableSchema {
        TableSchema::new(
            "people",
            vec![
                ColumnDescriptor::new("id", "INTEGER").primary_key(),
                ColumnDescriptor::new("name", "TEXT"),
                ColumnDescriptor::new("city", "TEXT"),
                ColumnDescriptor::new("updated_at", "TEXT"),
            ],
        )
    }

    fn person(id: i64, name: &str, city: &str, updated: &str) -> Row {
        vec![
            SqlValue::Integer(id),
            SqlValue::from(name),
            SqlValue::from(city),
            SqlValue::from(updated),
        ]
    }

    #[tokio::test]
    async fn test_identical_tables() {
        let rows = vec![
            person(1, "ann", "Oslo", "2024-01-01"),
            person(2, "bob", "Rome", "2024-01-02"),
            person(3, "cy", "Lima", "2024-01-03"),
        ];
        let schema = people_schema();
        let result = run(&schema, &schema, rows.clone(), rows, ComparisonOptions::default()).await;
        assert_eq!(result.status, TableStatus::Completed);
        assert_eq!(result.rows_compared, 3);
        assert_eq!(result.identical_rows, 3);
        assert_eq!(result.differing_rows, 0);
        assert_eq!(result.only_in_a, 0);
        assert_eq!(result.only_in_b, 0);
        assert!(result.differences.is_empty());
        assert_eq!(result.key_strategy, KeyStrategy::PrimaryKey(vec!["id".into()]));
    }

    #[tokio::test]
    async fn test_excluded_columns_do_not_differ() {
        let schema = people_schema();
        let a = vec![person(1, "ann", "Oslo", "2024-01-01")];
        let b = vec![person(1, "ann", "Oslo", "2025-06-30")];
        let result = run(&schema, &schema, a, b, ComparisonOptions::default()).await;
        assert_eq!(result.identical_rows, 1);
        assert_eq!(result.compared_columns, vec!["name", "city"]);
    }

    #[tokio::test]
    async fn test_missing_rows_never_count_as_differences() {
        let schema = people_schema();
        let a = vec![
            person(1, "ann", "Oslo", ""),
            person(2, "bob", "Rome", ""),
            person(3, "cy", "Lima", ""),
        ];
        let b = vec![person(3, "cy", "Lima", ""), person(4, "dee", "Kyiv", "")];
        let result = run(&schema, &schema, a, b, ComparisonOptions::default()).await;
        assert_eq!(result.only_in_a, 2);
        assert_eq!(result.only_in_b, 1);
        assert_eq!(result.differing_rows, 0);
        assert_eq!(result.identical_rows, 1);

        let only_a: Vec<_> = result
            .differences
            .iter()
            .filter(|d| matches!(d.diff, RowDiff::OnlyInA { .. }))
            .map(|d| d.key.clone())
            .collect();
        assert_eq!(only_a, vec![vec![SqlValue::Integer(1)], vec![SqlValue::Integer(2)]]);
        assert!(result
            .differences
            .iter()
            .all(|d| !matches!(d.diff, RowDiff::MatchedWithDifferences { .. })));
    }

    #[tokio::test]
    async fn test_field_differences_and_cap() {
        let schema = people_schema();
        let a: Vec<Row> = (1..=5).map(|i| person(i, "x", "Oslo", "")).collect();
        let b: Vec<Row> = (1..=5).rev().map(|i| person(i, "x", "Bergen", "")).collect();
        let opts = ComparisonOptions {
            max_differences_per_table: 2,
            ..Default::default()
        };
        let result = run(&schema, &schema, a, b, opts).await;
        assert_eq!(result.differing_rows, 5);
        assert_eq!(result.differences.len(), 2);
        match &result.differences[0].diff {
            RowDiff::MatchedWithDifferences { fields } => {
                assert_eq!(fields.len(), 1);
                assert_eq!(fields[0].column, "city");
                assert_eq!(fields[0].value_a, SqlValue::from("Oslo"));
                assert_eq!(fields[0].value_b, SqlValue::from("Bergen"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(result
            .warnings
            .contains(&TableWarning::DifferencesTruncated { recorded: 2, total: 5 }));
    }

    #[tokio::test]
    async fn test_case_and_whitespace_options() {
        let schema = people_schema();
        let a = vec![person(1, "Ann  Lee", "OSLO", "")];
        let b = vec![person(1, "ann lee ", "oslo", "")];
        let strict = run(&schema, &schema, a.clone(), b.clone(), ComparisonOptions::default()).await;
        assert_eq!(strict.differing_rows, 1);

        let relaxed = ComparisonOptions {
            case_sensitive: false,
            ignore_whitespace: true,
            ..Default::default()
        };
        let result = run(&schema, &schema, a, b, relaxed).await;
        assert_eq!(result.identical_rows, 1);
    }

    #[tokio::test]
    async fn test_duplicate_composite_keys_pair_one_to_one() {
        let schema = TableSchema::new(
            "tags",
            vec![ColumnDescriptor::new("label", "TEXT"), ColumnDescriptor::new("color", "TEXT")],
        );
        let row = |l: &str, c: &str| vec![SqlValue::from(l), SqlValue::from(c)];
        let a = vec![row("x", "red"), row("x", "red"), row("y", "blue")];
        let b = vec![row("x", "red"), row("y", "blue")];
        let result = run(&schema, &schema, a, b, ComparisonOptions::default()).await;
        assert_eq!(
            result.key_strategy,
            KeyStrategy::Composite(vec!["label".into(), "color".into()])
        );
        assert_eq!(result.identical_rows, 2);
        assert_eq!(result.only_in_a, 1);
        assert_eq!(result.only_in_b, 0);
    }

    #[tokio::test]
    async fn test_composite_keys_join_tolerant_numbers() {
        let schema = TableSchema::new(
            "ledger",
            vec![ColumnDescriptor::new("label", "TEXT"), ColumnDescriptor::new("amount", "REAL")],
        );
        let a = vec![
            vec![SqlValue::from("x"), SqlValue::Real(0.1 + 0.2)],
            vec![SqlValue::from("y"), SqlValue::from("42")],
        ];
        let b = vec![
            vec![SqlValue::from("x"), SqlValue::Real(0.3)],
            vec![SqlValue::from("y"), SqlValue::Integer(42)],
        ];
        let result = run(&schema, &schema, a, b, ComparisonOptions::default()).await;
        assert_eq!(
            result.key_strategy,
            KeyStrategy::Composite(vec!["label".into(), "amount".into()])
        );
        assert_eq!(result.identical_rows, 2);
        assert_eq!(result.only_in_a, 0);
        assert_eq!(result.only_in_b, 0);
    }

    #[tokio::test]
    async fn test_positional_pairing_for_unkeyed_tables() {
        let schema = TableSchema::new(
            "log",
            vec![ColumnDescriptor::new("created_at", "TEXT"), ColumnDescriptor::new("modified_by", "TEXT")],
        );
        let row = |t: &str| vec![SqlValue::from(t), SqlValue::from("sys")];
        let a = vec![row("1"), row("2"), row("3")];
        let b = vec![row("9"), row("8")];
        let result = run(&schema, &schema, a, b, ComparisonOptions::default()).await;
        assert_eq!(result.key_strategy, KeyStrategy::Positional);
        assert!(result.warnings.contains(&TableWarning::UnkeyedTable));
        assert_eq!(result.rows_compared, 2);
        assert_eq!(result.only_in_a, 1);
        assert_eq!(result.differences[0].key, vec![SqlValue::Integer(2)]);
    }

    #[tokio::test]
    async fn test_unreadable_rows_counted_separately() {
        let schema = people_schema();
        let a = vec![
            person(1, "ann", "Oslo", ""),
            vec![
                SqlValue::Integer(2),
                SqlValue::Undecodable("invalid utf-8".into()),
                SqlValue::from("Rome"),
                SqlValue::Null,
            ],
        ];
        let b = vec![person(1, "ann", "Oslo", ""), person(2, "bob", "Rome", "")];
        let result = run(&schema, &schema, a, b, ComparisonOptions::default()).await;
        assert_eq!(result.unreadable_rows_a, 1);
        assert_eq!(result.row_errors.len(), 1);
        assert_eq!(result.row_errors[0].position, 1);
        assert_eq!(
            result.row_errors[0].reason,
            "Encoding error in people.name: invalid utf-8"
        );
        assert_eq!(result.identical_rows, 1);
        assert_eq!(result.only_in_b, 1);
        assert_eq!(result.rows_a, 2);
    }

    #[tokio::test]
    async fn test_identifier_tracking_scenario() {
        let schema = TableSchema::new(
            "reports",
            vec![ColumnDescriptor::new("id", "TEXT"), ColumnDescriptor::new("name", "TEXT")],
        );
        let row = |id: &str, name: &str| vec![SqlValue::from(id), SqlValue::from(name)];
        let a = vec![row("report-001", "a"), row("report-002", "b")];
        let b = vec![row("record-001", "a"), row("record-002", "b")];
        let opts = ComparisonOptions {
            uuid_comparison_mode: UuidComparisonMode::IncludeWithTracking,
            explicit_uuid_columns: vec!["id".into()],
            unique_id_normalize_patterns: vec![NormalizeRuleConfig::new(
                r"^(report|record)-(\d+)$",
                r"id-\2",
            )],
            ..Default::default()
        };
        let result = run(&schema, &schema, a, b, opts).await;
        let stats = result.uuid_statistics.as_ref().unwrap();
        assert_eq!(stats.raw_difference_count, 2);
        assert_eq!(stats.normalized_match_count, 2);
        assert_eq!(stats.total_values_a, 2);
        assert_eq!(stats.unique_values_b, 2);
        assert_eq!(stats.detected_patterns["id"].pattern, "prefix-number");
        assert_eq!(result.differing_rows, 0);
        assert_eq!(result.identical_rows, 2);
        assert!(result.integrity_ok());
    }

    #[tokio::test]
    async fn test_identifier_normal_mode_compares_values() {
        let schema = TableSchema::new(
            "reports",
            vec![ColumnDescriptor::new("ref_uuid", "TEXT"), ColumnDescriptor::new("name", "TEXT")],
        );
        let row = |id: &str, name: &str| vec![SqlValue::from(id), SqlValue::from(name)];
        let opts = ComparisonOptions {
            uuid_comparison_mode: UuidComparisonMode::IncludeNormal,
            ..Default::default()
        };
        let result = run(
            &schema,
            &schema,
            vec![row("u1", "a")],
            vec![row("u2", "a")],
            opts,
        )
        .await;
        assert!(result.uuid_statistics.is_none());
        assert_eq!(result.only_in_a, 1);
        assert_eq!(result.only_in_b, 1);
    }

    #[tokio::test]
    async fn test_schema_drift_warning() {
        let schema_a = people_schema();
        let mut schema_b = people_schema();
        schema_b.columns.pop();
        schema_b.columns.push(ColumnDescriptor::new("zip", "TEXT"));
        let a = vec![person(1, "ann", "Oslo", "")];
        let b = vec![vec![
            SqlValue::Integer(1),
            SqlValue::from("ann"),
            SqlValue::from("Oslo"),
            SqlValue::from("0150"),
        ]];
        let result = run(&schema_a, &schema_b, a, b, ComparisonOptions::default()).await;
        assert_eq!(result.columns_only_in_a, vec!["updated_at"]);
        assert_eq!(result.columns_only_in_b, vec!["zip"]);
        assert_eq!(result.identical_rows, 1);
        assert!(result
            .warnings
            .iter()
            .any(|w| matches!(w, TableWarning::SchemaDrift { .. })));
    }

    #[tokio::test]
    async fn test_memory_threshold_warning() {
        let schema = people_schema();
        let a: Vec<Row> = (1..=6).map(|i| person(i, "x", "y", "")).collect();
        let b: Vec<Row> = (100..=106).map(|i| person(i, "x", "y", "")).collect();
        let opts = ComparisonOptions {
            memory_warning_rows: 4,
            ..Default::default()
        };
        let result = run(&schema, &schema, a, b, opts).await;
        assert!(result
            .warnings
            .iter()
            .any(|w| matches!(w, TableWarning::MemoryThreshold { threshold: 4, .. })));
    }

    #[tokio::test]
    async fn test_stream_error_fails_table() {
        let schema = people_schema();
        let compiled = ComparisonOptions::default().compile().unwrap();
        let classification =
            ColumnClassifier::new(&compiled.options, &compiled.patterns).classify(&schema, &[]);
        let (tx, rx) = mpsc::channel(2);
        tx.try_send(Err(crate::error::CheckError::connector("people", "disk gone")))
            .unwrap();
        let mut a = BatchStream::new(rx);
        let mut b = stream_of(vec![person(1, "a", "b", "")], 10);
        let err = compare_table("people", &schema, &schema, &mut a, &mut b, &classification, &compiled)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("disk gone"));
    }
}

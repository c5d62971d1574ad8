//! Comparison orchestrator - main workflow coordinator.
//!
//! Tables are compared concurrently by a bounded worker pool, one worker per
//! table. Finished tables are handed to a single aggregator over a channel.
//! The first failed or panicked table stops scheduling; in-flight tables run
//! to completion and the rest are reported as not started.

mod summary;

pub use summary::{ComparisonSummary, TableFailure};

use chrono::Utc;
use futures::future::join_all;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error, info, warn};

use crate::classify::{ColumnClassification, ColumnClassifier};
use crate::config::{CompiledOptions, ComparisonOptions, Config};
use crate::core::{ReadOptions, SourceReader, TableSchema};
use crate::drivers::open_reader;
use crate::error::Result;
use crate::reconcile::{compare_table, BatchStream, TableComparisonResult};
use summary::{RunInfo, SummaryBuilder};

/// A running worker's hold on the pool.
///
/// Unless released cleanly, dropping the slot (on error or panic) cancels
/// the stop token before the permit is returned.
struct WorkerSlot {
    stop: DropGuard,
    _permit: OwnedSemaphorePermit,
}

impl WorkerSlot {
    fn new(stop: &CancellationToken, permit: OwnedSemaphorePermit) -> Self {
        Self {
            stop: stop.clone().drop_guard(),
            _permit: permit,
        }
    }

    fn release(self) {
        self.stop.disarm();
    }
}

/// Tables found on the two sides, after include/exclude filtering.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TablePlan {
    /// Tables present on both sides, sorted by name.
    pub common: Vec<String>,
    pub only_in_a: Vec<String>,
    pub only_in_b: Vec<String>,
}

/// Comparison orchestrator.
pub struct Comparator {
    compiled: Arc<CompiledOptions>,
    source_a: Arc<dyn SourceReader>,
    source_b: Arc<dyn SourceReader>,
}

impl Comparator {
    /// Create a comparator over two connectors.
    pub fn new(
        compiled: CompiledOptions,
        source_a: Arc<dyn SourceReader>,
        source_b: Arc<dyn SourceReader>,
    ) -> Self {
        Self {
            compiled: Arc::new(compiled),
            source_a,
            source_b,
        }
    }

    /// Validate the configuration and open both sides.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let compiled = config.comparison.compile()?;
        let source_a = open_reader(&config.source)?;
        let source_b = open_reader(&config.target)?;
        Ok(Self::new(compiled, source_a, source_b))
    }

    pub fn options(&self) -> &ComparisonOptions {
        &self.compiled.options
    }

    /// List and match the tables of both sides.
    pub async fn plan_tables(&self) -> Result<TablePlan> {
        let (mut tables_a, mut tables_b) =
            tokio::try_join!(self.source_a.list_tables(), self.source_b.list_tables())?;
        let opts = &self.compiled.options;
        tables_a.retain(|t| opts.table_selected(t));
        tables_b.retain(|t| opts.table_selected(t));

        let set_a: BTreeSet<String> = tables_a.into_iter().collect();
        let set_b: BTreeSet<String> = tables_b.into_iter().collect();

        Ok(TablePlan {
            common: set_a.intersection(&set_b).cloned().collect(),
            only_in_a: set_a.difference(&set_b).cloned().collect(),
            only_in_b: set_b.difference(&set_a).cloned().collect(),
        })
    }

    /// Classify the columns of every common table without comparing rows.
    pub async fn classify_tables(&self) -> Result<Vec<ColumnClassification>> {
        let plan = self.plan_tables().await?;
        let mut out = Vec::with_capacity(plan.common.len());
        for table in &plan.common {
            let schema = self.source_a.get_schema(table).await?;
            let mut stream = BatchStream::new(
                self.source_a
                    .read_table(ReadOptions::new(table, self.compiled.options.batch_size)),
            );
            let classification = classify(&schema, &mut stream, &self.compiled).await?;
            out.push(classification);
        }
        Ok(out)
    }

    /// Run the comparison.
    ///
    /// Per-table failures are reported in the summary. Only listing the
    /// tables can fail the run as a whole.
    pub async fn run(&self, cancel: CancellationToken) -> Result<ComparisonSummary> {
        let started_at = Utc::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        info!("Starting comparison run: {}", run_id);

        let plan = self.plan_tables().await?;
        for table in &plan.only_in_a {
            warn!("{}: present only in source A", table);
        }
        for table in &plan.only_in_b {
            warn!("{}: present only in source B", table);
        }

        let workers = self.compiled.options.effective_workers();
        info!(
            "Comparing {} tables with {} workers",
            plan.common.len(),
            workers
        );

        let (tx, mut rx) =
            mpsc::channel::<(String, Result<TableComparisonResult>)>(plan.common.len().max(1));
        let semaphore = Arc::new(Semaphore::new(workers));
        let stop = cancel.child_token();

        let mut names = Vec::new();
        let mut handles = Vec::new();
        let mut not_started = Vec::new();
        let mut pending = plan.common.into_iter();

        while let Some(table) = pending.next() {
            let permit = tokio::select! {
                biased;
                _ = stop.cancelled() => None,
                permit = semaphore.clone().acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit.filter(|_| !stop.is_cancelled()) else {
                if cancel.is_cancelled() {
                    info!("Cancellation requested, stopping new comparisons");
                } else {
                    warn!("Stopping new comparisons after a failed table");
                }
                not_started.push(table);
                break;
            };

            let source_a = self.source_a.clone();
            let source_b = self.source_b.clone();
            let compiled = self.compiled.clone();
            let tx = tx.clone();
            let slot = WorkerSlot::new(&stop, permit);
            let name = table.clone();

            let handle = tokio::spawn(async move {
                let outcome =
                    compare_one(&name, source_a.as_ref(), source_b.as_ref(), &compiled).await;
                match &outcome {
                    Ok(_) => slot.release(),
                    Err(e) => {
                        error!("{}: failed - {}", name, e);
                        drop(slot);
                    }
                }
                let _ = tx.send((name, outcome)).await;
            });

            names.push(table);
            handles.push(handle);
        }
        not_started.extend(pending);
        drop(tx);

        let joined = join_all(handles).await;

        let mut builder = SummaryBuilder::default();
        while let Some((table, outcome)) = rx.recv().await {
            builder.add(table, outcome);
        }
        for (table, joined) in names.into_iter().zip(joined) {
            if let Err(e) = joined {
                error!("{}: task panicked - {}", table, e);
                builder.add_failure(table, format!("Task panicked: {}", e));
            }
        }

        let summary = builder.finish(RunInfo {
            run_id,
            started_at,
            completed_at: Utc::now(),
            tables_only_in_a: plan.only_in_a,
            tables_only_in_b: plan.only_in_b,
            tables_not_started: not_started,
            cancelled: cancel.is_cancelled(),
        });

        info!(
            "Comparison complete: {} tables, {} with differences, {} failed, {} rows compared in {}ms",
            summary.tables.len(),
            summary.tables_with_differences,
            summary.failures.len(),
            summary.total_rows_compared,
            summary.duration_ms
        );
        if !summary.integrity_ok {
            warn!("Identifier counts differ between the sources");
        }

        Ok(summary)
    }
}

/// Classify a table from the leading rows of its side A stream.
async fn classify(
    schema: &TableSchema,
    stream: &mut BatchStream,
    compiled: &CompiledOptions,
) -> Result<ColumnClassification> {
    let sample = stream.peek_rows(compiled.options.sample_size).await?;
    let classification =
        ColumnClassifier::new(&compiled.options, &compiled.patterns).classify(schema, &sample);
    debug!(
        "Table {} - {}",
        schema.name,
        classification.exclusion_summary()
    );
    Ok(classification)
}

async fn compare_one(
    table: &str,
    source_a: &dyn SourceReader,
    source_b: &dyn SourceReader,
    compiled: &CompiledOptions,
) -> Result<TableComparisonResult> {
    let (schema_a, schema_b) =
        tokio::try_join!(source_a.get_schema(table), source_b.get_schema(table))?;

    let batch_size = compiled.options.batch_size;
    let mut stream_a = BatchStream::new(source_a.read_table(ReadOptions::new(table, batch_size)));
    let mut stream_b = BatchStream::new(source_b.read_table(ReadOptions::new(table, batch_size)));

    let classification = classify(&schema_a, &mut stream_a, compiled).await?;

    compare_table(
        table,
        &schema_a,
        &schema_b,
        &mut stream_a,
        &mut stream_b,
        &classification,
        compiled,
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::ExclusionCategory;
    use crate::config::{NormalizeRuleConfig, UuidComparisonMode};
    use crate::core::{ColumnDescriptor, Row, SqlValue};
    use crate::drivers::MemoryReader;

    fn schema(name: &str) -> TableSchema {
        TableSchema::new(
            name,
            vec![
                ColumnDescriptor::new("id", "INTEGER").primary_key(),
                ColumnDescriptor::new("name", "TEXT"),
            ],
        )
    }

    fn rows(names: &[&str]) -> Vec<Row> {
        names
            .iter()
            .enumerate()
            .map(|(i, n)| vec![SqlValue::Integer(i as i64 + 1), SqlValue::from(*n)])
            .collect()
    }

    fn comparator(a: MemoryReader, b: MemoryReader, opts: ComparisonOptions) -> Comparator {
        Comparator::new(opts.compile().unwrap(), Arc::new(a), Arc::new(b))
    }

    #[tokio::test]
    async fn test_run_aggregates_tables() {
        let a = MemoryReader::new()
            .with_table(schema("same"), rows(&["x", "y"]))
            .with_table(schema("changed"), rows(&["x", "y", "z"]))
            .with_table(schema("legacy"), rows(&["x"]));
        let b = MemoryReader::new()
            .with_table(schema("same"), rows(&["x", "y"]))
            .with_table(schema("changed"), rows(&["x", "Y"]))
            .with_table(schema("fresh"), rows(&["x"]));

        let summary = comparator(a, b, ComparisonOptions::default())
            .run(CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            summary.tables.keys().collect::<Vec<_>>(),
            vec!["changed", "same"]
        );
        assert_eq!(summary.tables_only_in_a, vec!["legacy"]);
        assert_eq!(summary.tables_only_in_b, vec!["fresh"]);
        assert_eq!(summary.identical_tables, 1);
        assert_eq!(summary.tables_with_differences, 1);

        let changed = &summary.tables["changed"];
        assert_eq!(changed.differing_rows, 1);
        assert_eq!(changed.only_in_a, 1);
        assert_eq!(summary.total_differences, 2);
        assert!(summary.has_differences());
        assert!(!summary.cancelled);
    }

    #[tokio::test]
    async fn test_failed_table_stops_scheduling() {
        let build = || {
            MemoryReader::new()
                .with_table(schema("a"), rows(&["x"]))
                .with_table(schema("b"), rows(&["x", "y", "z"]))
                .with_table(schema("c"), rows(&["x"]))
        };
        let a = build().fail_stream_after("b", 1, "connection reset");
        let opts = ComparisonOptions {
            max_workers: 1,
            batch_size: 1,
            ..Default::default()
        };

        let summary = comparator(a, build(), opts)
            .run(CancellationToken::new())
            .await
            .unwrap();

        assert!(summary.tables.contains_key("a"));
        assert!(!summary.tables.contains_key("b"));
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].table, "b");
        assert!(summary.first_error.unwrap().contains("connection reset"));
        assert_eq!(summary.tables_not_started, vec!["c"]);
    }

    /// Reader that panics when asked for one table's schema.
    struct PanickingReader {
        inner: MemoryReader,
        table: &'static str,
    }

    #[async_trait::async_trait]
    impl SourceReader for PanickingReader {
        async fn list_tables(&self) -> Result<Vec<String>> {
            self.inner.list_tables().await
        }

        async fn get_schema(&self, table: &str) -> Result<TableSchema> {
            if table == self.table {
                panic!("driver bug");
            }
            self.inner.get_schema(table).await
        }

        fn read_table(&self, opts: ReadOptions) -> mpsc::Receiver<Result<crate::core::Batch>> {
            self.inner.read_table(opts)
        }

        fn db_type(&self) -> &str {
            "panicking"
        }
    }

    #[tokio::test]
    async fn test_panicked_table_stops_scheduling() {
        let build = || {
            MemoryReader::new()
                .with_table(schema("a"), rows(&["x"]))
                .with_table(schema("b"), rows(&["x"]))
                .with_table(schema("c"), rows(&["x"]))
        };
        let a = PanickingReader {
            inner: build(),
            table: "b",
        };
        let opts = ComparisonOptions {
            max_workers: 1,
            ..Default::default()
        };
        let comparator = Comparator::new(opts.compile().unwrap(), Arc::new(a), Arc::new(build()));

        let summary = comparator.run(CancellationToken::new()).await.unwrap();

        assert!(summary.tables.contains_key("a"));
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].table, "b");
        assert!(summary.failures[0].error.contains("panicked"));
        assert_eq!(summary.tables_not_started, vec!["c"]);
        assert!(!summary.cancelled);
    }

    #[tokio::test]
    async fn test_schema_failure_is_recorded() {
        let a = MemoryReader::new()
            .with_table(schema("t"), rows(&["x"]))
            .fail_schema("t", "permission denied");
        let b = MemoryReader::new().with_table(schema("t"), rows(&["x"]));
        let summary = comparator(a, b, ComparisonOptions::default())
            .run(CancellationToken::new())
            .await
            .unwrap();
        assert!(summary.tables.is_empty());
        assert!(summary.failures[0].error.contains("permission denied"));
    }

    #[tokio::test]
    async fn test_cancel_before_start() {
        let a = MemoryReader::new()
            .with_table(schema("t1"), rows(&["x"]))
            .with_table(schema("t2"), rows(&["x"]));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let summary = comparator(a.clone(), a, ComparisonOptions::default())
            .run(cancel)
            .await
            .unwrap();
        assert!(summary.cancelled);
        assert!(summary.tables.is_empty());
        assert_eq!(summary.tables_not_started, vec!["t1", "t2"]);
    }

    #[tokio::test]
    async fn test_table_filters() {
        let a = MemoryReader::new()
            .with_table(schema("keep"), vec![])
            .with_table(schema("skip"), vec![])
            .with_table(schema("other"), vec![]);
        let opts = ComparisonOptions {
            include_tables: vec!["keep".into(), "skip".into()],
            exclude_tables: vec!["skip".into()],
            ..Default::default()
        };
        let plan = comparator(a.clone(), a, opts).plan_tables().await.unwrap();
        assert_eq!(plan.common, vec!["keep"]);
        assert!(plan.only_in_a.is_empty());
    }

    #[tokio::test]
    async fn test_classify_tables() {
        let table = TableSchema::new(
            "events",
            vec![
                ColumnDescriptor::new("seq", "INTEGER"),
                ColumnDescriptor::new("created_at", "TEXT"),
                ColumnDescriptor::new("payload", "TEXT"),
            ],
        );
        let data: Vec<Row> = (1..=5)
            .map(|i| {
                vec![
                    SqlValue::Integer(i * 2),
                    SqlValue::from("2024-01-01"),
                    SqlValue::from("p"),
                ]
            })
            .collect();
        let a = MemoryReader::new().with_table(table, data);
        let classes = comparator(a.clone(), a, ComparisonOptions::default())
            .classify_tables()
            .await
            .unwrap();
        assert_eq!(classes.len(), 1);
        let c = &classes[0];
        assert_eq!(c.category("seq"), ExclusionCategory::Sequence);
        assert_eq!(c.category("created_at"), ExclusionCategory::Timestamp);
        assert_eq!(c.category("payload"), ExclusionCategory::None);
    }

    #[tokio::test]
    async fn test_identifier_tracking_end_to_end() {
        let table = |ids: [&str; 2]| {
            let schema = TableSchema::new(
                "reports",
                vec![
                    ColumnDescriptor::new("id", "TEXT"),
                    ColumnDescriptor::new("name", "TEXT"),
                ],
            );
            let data = vec![
                vec![SqlValue::from(ids[0]), SqlValue::from("a")],
                vec![SqlValue::from(ids[1]), SqlValue::from("b")],
            ];
            MemoryReader::new().with_table(schema, data)
        };
        let opts = ComparisonOptions {
            uuid_comparison_mode: UuidComparisonMode::IncludeWithTracking,
            explicit_uuid_columns: vec!["id".into()],
            unique_id_normalize_patterns: vec![NormalizeRuleConfig::new(
                r"^(report|record)-(\d+)$",
                r"id-\2",
            )],
            ..Default::default()
        };

        let summary = comparator(
            table(["report-001", "report-002"]),
            table(["record-001", "record-002"]),
            opts,
        )
        .run(CancellationToken::new())
        .await
        .unwrap();

        let result = &summary.tables["reports"];
        let stats = result.uuid_statistics.as_ref().unwrap();
        assert_eq!(stats.raw_difference_count, 2);
        assert_eq!(stats.normalized_match_count, 2);
        assert_eq!(result.differing_rows, 0);
        assert!(summary.integrity_ok);
        assert_eq!(summary.total_uuid_columns, 1);
        assert_eq!(summary.total_uuid_values_a, 2);
    }
}

//! In-memory connector.

use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::mpsc;

use crate::core::{Batch, ReadOptions, Row, SourceReader, TableSchema};
use crate::error::{CheckError, Result};

#[derive(Debug, Clone)]
struct MemoryTable {
    schema: TableSchema,
    rows: Vec<Row>,
    schema_failure: Option<String>,
    /// Fail the stream after this many rows have been sent.
    stream_failure: Option<(usize, String)>,
}

/// Reader over tables held in memory.
///
/// Failures can be injected per table to exercise error paths.
#[derive(Debug, Clone, Default)]
pub struct MemoryReader {
    tables: BTreeMap<String, MemoryTable>,
}

impl MemoryReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a table. Rows must follow the schema's column order.
    pub fn with_table(mut self, schema: TableSchema, rows: Vec<Row>) -> Self {
        self.tables.insert(
            schema.name.clone(),
            MemoryTable {
                schema,
                rows,
                schema_failure: None,
                stream_failure: None,
            },
        );
        self
    }

    /// Make `get_schema` fail for a table.
    pub fn fail_schema(mut self, table: &str, message: impl Into<String>) -> Self {
        if let Some(t) = self.tables.get_mut(table) {
            t.schema_failure = Some(message.into());
        }
        self
    }

    /// Make a table's row stream fail after `after_rows` rows.
    pub fn fail_stream_after(
        mut self,
        table: &str,
        after_rows: usize,
        message: impl Into<String>,
    ) -> Self {
        if let Some(t) = self.tables.get_mut(table) {
            t.stream_failure = Some((after_rows, message.into()));
        }
        self
    }
}

#[async_trait]
impl SourceReader for MemoryReader {
    async fn list_tables(&self) -> Result<Vec<String>> {
        Ok(self.tables.keys().cloned().collect())
    }

    async fn get_schema(&self, table: &str) -> Result<TableSchema> {
        let t = self
            .tables
            .get(table)
            .ok_or_else(|| CheckError::connector(table, "table not found"))?;
        match &t.schema_failure {
            Some(message) => Err(CheckError::connector(table, message.clone())),
            None => Ok(t.schema.clone()),
        }
    }

    fn read_table(&self, opts: ReadOptions) -> mpsc::Receiver<Result<Batch>> {
        let (tx, rx) = mpsc::channel(16);
        let table = self.tables.get(&opts.table).cloned();

        tokio::spawn(async move {
            let Some(table) = table else {
                let _ = tx
                    .send(Err(CheckError::connector(&opts.table, "table not found")))
                    .await;
                return;
            };

            let projection: Option<Vec<usize>> = if opts.columns.is_empty() {
                None
            } else {
                let mut idx = Vec::with_capacity(opts.columns.len());
                for c in &opts.columns {
                    match table.schema.column_index(c) {
                        Some(i) => idx.push(i),
                        None => {
                            let _ = tx
                                .send(Err(CheckError::connector(
                                    &opts.table,
                                    format!("no such column: {}", c),
                                )))
                                .await;
                            return;
                        }
                    }
                }
                Some(idx)
            };

            let (limit, failure) = match table.stream_failure {
                Some((after, message)) => (after.min(table.rows.len()), Some(message)),
                None => (table.rows.len(), None),
            };

            let batch_size = opts.batch_size.max(1);
            let rows = &table.rows[..limit];
            let mut chunks = rows.chunks(batch_size).peekable();
            if chunks.peek().is_none() && failure.is_none() {
                let _ = tx.send(Ok(Batch::empty_final())).await;
                return;
            }
            while let Some(chunk) = chunks.next() {
                let rows: Vec<Row> = match &projection {
                    Some(idx) => chunk
                        .iter()
                        .map(|r| idx.iter().map(|i| r[*i].clone()).collect())
                        .collect(),
                    None => chunk.to_vec(),
                };
                let mut batch = Batch::new(rows);
                if chunks.peek().is_none() && failure.is_none() {
                    batch = batch.mark_final();
                }
                if tx.send(Ok(batch)).await.is_err() {
                    return;
                }
            }

            if let Some(message) = failure {
                let _ = tx.send(Err(CheckError::connector(&opts.table, message))).await;
            }
        });

        rx
    }

    fn db_type(&self) -> &str {
        "memory"
    }
}

//! Connector abstraction consumed by the comparison engine.
//!
//! - [`SourceReader`]: lists tables, fetches schema metadata and streams rows

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;

use super::schema::TableSchema;
use super::value::Batch;

/// Options for reading rows from a table.
#[derive(Debug, Clone)]
pub struct ReadOptions {
    /// Table name.
    pub table: String,
    /// Columns to read, in the order rows should carry them (empty = all, schema order).
    pub columns: Vec<String>,
    /// Number of rows per batch.
    pub batch_size: usize,
}

impl ReadOptions {
    pub fn new(table: impl Into<String>, batch_size: usize) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
            batch_size,
        }
    }
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            table: String::new(),
            columns: Vec::new(),
            batch_size: 1000,
        }
    }
}

/// Read side of a data source.
///
/// Implementations must allow several tables to be streamed at once; each
/// `read_table` call owns an independent stream.
#[async_trait]
pub trait SourceReader: Send + Sync {
    /// List user tables.
    async fn list_tables(&self) -> Result<Vec<String>>;

    /// Fetch column metadata for a table.
    async fn get_schema(&self, table: &str) -> Result<TableSchema>;

    /// Stream a table's rows in batches.
    ///
    /// Returns a bounded receiver fed by a background task. A read failure is
    /// delivered as an `Err` item, after which the channel closes. Dropping
    /// the receiver stops the producer. The stream is single-pass; call again
    /// to restart it.
    fn read_table(&self, opts: ReadOptions) -> mpsc::Receiver<Result<Batch>>;

    /// Database type identifier (e.g. "sqlite").
    fn db_type(&self) -> &str;
}

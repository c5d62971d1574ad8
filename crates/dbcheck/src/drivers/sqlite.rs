//! SQLite connector.
//!
//! Every operation opens its own read-only connection on a blocking thread,
//! so any number of tables can be streamed concurrently from the same file.

use async_trait::async_trait;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::debug;

use crate::core::{Batch, ColumnDescriptor, ReadOptions, Row, SourceReader, SqlValue, TableSchema};
use crate::error::{CheckError, Result};

/// Channel depth between the blocking reader and the consumer, in batches.
const CHANNEL_DEPTH: usize = 16;

/// Read-only reader over a SQLite database file.
#[derive(Debug, Clone)]
pub struct SqliteReader {
    path: PathBuf,
}

impl SqliteReader {
    /// Open a database file, failing if it does not exist or is not SQLite.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.is_file() {
            return Err(CheckError::connector(
                "*",
                format!("database file not found: {}", path.display()),
            ));
        }
        let conn = connect(&path, "*")?;
        conn.query_row("SELECT count(*) FROM sqlite_master", [], |row| {
            row.get::<_, i64>(0)
        })
        .map_err(|e| {
            CheckError::connector("*", format!("{} is not a SQLite database: {}", path.display(), e))
        })?;
        debug!("Opened SQLite database {}", path.display());
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn blocking<T, F>(&self, table: &str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(Connection) -> Result<T> + Send + 'static,
    {
        let path = self.path.clone();
        let label = table.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = connect(&path, &label)?;
            f(conn)
        })
        .await
        .map_err(|e| CheckError::connector(table, format!("reader task failed: {}", e)))?
    }
}

#[async_trait]
impl SourceReader for SqliteReader {
    async fn list_tables(&self) -> Result<Vec<String>> {
        self.blocking("*", |conn| {
            let mut stmt = conn.prepare(
                "SELECT name FROM sqlite_master \
                 WHERE type = 'table' AND name NOT LIKE 'sqlite_%' \
                 ORDER BY name",
            )?;
            let names = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(names)
        })
        .await
    }

    async fn get_schema(&self, table: &str) -> Result<TableSchema> {
        let name = table.to_string();
        self.blocking(table, move |conn| load_schema(&conn, &name)).await
    }

    fn read_table(&self, opts: ReadOptions) -> mpsc::Receiver<Result<Batch>> {
        let (tx, rx) = mpsc::channel(CHANNEL_DEPTH);
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || {
            if let Err(e) = stream_rows(&path, &opts, &tx) {
                let _ = tx.blocking_send(Err(e));
            }
        });

        rx
    }

    fn db_type(&self) -> &str {
        "sqlite"
    }
}

fn connect(path: &Path, table: &str) -> Result<Connection> {
    Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|e| CheckError::connector(table, format!("cannot open {}: {}", path.display(), e)))
}

/// Quote a SQLite identifier.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn load_schema(conn: &Connection, table: &str) -> Result<TableSchema> {
    let sql = format!("PRAGMA table_info({})", quote_ident(table));
    let mut stmt = conn.prepare(&sql)?;
    let columns = stmt
        .query_map([], |row| {
            let name: String = row.get(1)?;
            let data_type: Option<String> = row.get(2)?;
            let not_null: i64 = row.get(3)?;
            let pk: i64 = row.get(5)?;
            Ok(ColumnDescriptor {
                name,
                data_type: data_type.unwrap_or_default(),
                is_primary_key: pk > 0,
                pk_ordinal: (pk > 0).then_some(pk as usize),
                is_nullable: not_null == 0 && pk == 0,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    if columns.is_empty() {
        return Err(CheckError::connector(table, "table not found"));
    }
    Ok(TableSchema::new(table, columns))
}

fn stream_rows(path: &Path, opts: &ReadOptions, tx: &mpsc::Sender<Result<Batch>>) -> Result<()> {
    let table = opts.table.as_str();
    let conn = connect(path, table)?;

    let cols = if opts.columns.is_empty() {
        load_schema(&conn, table)?.column_names()
    } else {
        opts.columns.clone()
    };
    let col_list = cols
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");
    let base = format!("SELECT {} FROM {}", col_list, quote_ident(table));

    // WITHOUT ROWID tables have no rowid to order by.
    let ordered = format!("{} ORDER BY rowid", base);
    let mut stmt = match conn.prepare(&ordered) {
        Ok(stmt) => stmt,
        Err(_) => conn.prepare(&base)?,
    };

    let batch_size = opts.batch_size.max(1);
    let width = cols.len();
    let mut rows = stmt
        .query([])
        .map_err(|e| CheckError::connector(table, e.to_string()))?;
    let mut batch: Vec<Row> = Vec::with_capacity(batch_size);

    while let Some(row) = rows
        .next()
        .map_err(|e| CheckError::connector(table, e.to_string()))?
    {
        let mut values = Vec::with_capacity(width);
        for idx in 0..width {
            let value = row
                .get_ref(idx)
                .map_err(|e| CheckError::connector(table, e.to_string()))?;
            values.push(convert_value(value));
        }
        batch.push(values);

        if batch.len() == batch_size {
            let full = std::mem::replace(&mut batch, Vec::with_capacity(batch_size));
            if tx.blocking_send(Ok(Batch::new(full))).is_err() {
                debug!("Table {} - consumer dropped, stopping read", table);
                return Ok(());
            }
        }
    }

    let _ = tx.blocking_send(Ok(Batch::new(batch).mark_final()));
    Ok(())
}

fn convert_value(value: ValueRef<'_>) -> SqlValue {
    match value {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(i) => SqlValue::Integer(i),
        ValueRef::Real(f) => SqlValue::Real(f),
        ValueRef::Text(bytes) => match std::str::from_utf8(bytes) {
            Ok(s) => SqlValue::Text(s.to_string()),
            Err(e) => SqlValue::Undecodable(format!(
                "invalid UTF-8 after {} bytes",
                e.valid_up_to()
            )),
        },
        ValueRef::Blob(bytes) => SqlValue::Blob(bytes.to_vec()),
    }
}

//! Connector implementations of [`SourceReader`].
//!
//! - [`sqlite`]: SQLite database files, opened read-only
//! - [`memory`]: In-memory tables, used by tests and embedding callers
//!
//! # Adding New Databases
//!
//! 1. Create a new module under `drivers/`
//! 2. Implement [`SourceReader`] for it
//! 3. Accept its `type` string in [`open_reader`] and in config validation

pub mod memory;
pub mod sqlite;

pub use memory::MemoryReader;
pub use sqlite::SqliteReader;

use std::sync::Arc;

use crate::config::DatabaseConfig;
use crate::core::SourceReader;
use crate::error::{CheckError, Result};

/// Open the connector described by a side's configuration.
pub fn open_reader(config: &DatabaseConfig) -> Result<Arc<dyn SourceReader>> {
    match config.r#type.to_lowercase().as_str() {
        "sqlite" => Ok(Arc::new(SqliteReader::open(&config.path)?)),
        other => Err(CheckError::Config(format!(
            "unsupported database type '{}' (supported: sqlite)",
            other
        ))),
    }
}

//! # dbcheck
//!
//! Row-level reconciliation of two database snapshots.
//!
//! This library compares every common table of two data sources and reports
//! which rows match, which differ and which exist on one side only, with
//! support for:
//!
//! - **Column classification** that keeps identifiers, timestamps, audit
//!   metadata and sequences out of value comparison
//! - **Identifier tracking** with pattern detection and normalization rules,
//!   for identifiers that differ by design between sources
//! - **Streaming hash joins** over bounded batches
//! - **Parallel tables** with a configurable worker pool
//!
//! ## Example
//!
//! ```rust,no_run
//! use dbcheck::{Comparator, Config};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> dbcheck::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let comparator = Comparator::from_config(&config)?;
//!     let summary = comparator.run(CancellationToken::new()).await?;
//!     println!("{} differences", summary.total_differences);
//!     Ok(())
//! }
//! ```

pub mod classify;
pub mod config;
pub mod core;
pub mod drivers;
pub mod error;
pub mod identifier;
pub mod orchestrator;
pub mod reconcile;

// Re-exports for convenient access
pub use classify::{ColumnClassification, ColumnClassifier, ExclusionCategory};
pub use config::{ComparisonOptions, CompiledOptions, Config, DatabaseConfig, UuidComparisonMode};
pub use core::{ColumnDescriptor, SourceReader, SqlValue, TableSchema};
pub use drivers::{open_reader, MemoryReader, SqliteReader};
pub use error::{CheckError, Result};
pub use identifier::{normalize, NormalizationRule, PatternDetector};
pub use orchestrator::{Comparator, ComparisonSummary, TablePlan};
pub use reconcile::{compare_table, RowDiff, TableComparisonResult, UuidStatistics};

//! Core abstractions shared by the engine and the connectors.
//!
//! - [`schema`]: Table and column metadata
//! - [`value`]: Row values and batches
//! - [`traits`]: The [`SourceReader`] connector trait

pub mod schema;
pub mod traits;
pub mod value;

pub use schema::{ColumnDescriptor, TableSchema};
pub use traits::{ReadOptions, SourceReader};
pub use value::{Batch, Row, SqlValue};

//! Schema metadata supplied by connectors.
//!
//! Descriptors are immutable for the duration of a comparison.

use serde::{Deserialize, Serialize};

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    /// Column name.
    pub name: String,

    /// Declared type as reported by the database (may be empty).
    pub data_type: String,

    /// Whether the column is part of the primary key.
    pub is_primary_key: bool,

    /// Position within a composite primary key (1-based), when known.
    pub pk_ordinal: Option<usize>,

    /// Whether the column is nullable.
    pub is_nullable: bool,
}

impl ColumnDescriptor {
    /// Create a non-key nullable column.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            is_primary_key: false,
            pk_ordinal: None,
            is_nullable: true,
        }
    }

    /// Mark the column as a primary key member.
    pub fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self.is_nullable = false;
        self
    }

    fn type_upper(&self) -> String {
        self.data_type.to_uppercase()
    }

    /// Check if the declared type is an integer type.
    pub fn is_integer_type(&self) -> bool {
        self.type_upper().contains("INT")
    }

    /// Check if the declared type is a date/time type.
    pub fn is_timestamp_type(&self) -> bool {
        let t = self.type_upper();
        ["DATETIME", "TIMESTAMP", "DATE", "TIME"]
            .iter()
            .any(|k| t.contains(k))
    }

    /// Check if the declared type is an auto-generated sequence type.
    pub fn is_sequence_type(&self) -> bool {
        let t = self.type_upper();
        ["SERIAL", "IDENTITY", "AUTOINCREMENT", "AUTO_INCREMENT"]
            .iter()
            .any(|k| t.contains(k))
    }

    /// Check if the declared type is a native identifier type.
    pub fn is_uuid_type(&self) -> bool {
        let t = self.type_upper();
        matches!(t.as_str(), "UUID" | "GUID" | "UNIQUEIDENTIFIER")
    }
}

/// Table metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Table name.
    pub name: String,

    /// Columns in storage order. Row values follow this order.
    pub columns: Vec<ColumnDescriptor>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDescriptor>) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }

    /// Check if the table has a primary key.
    pub fn has_pk(&self) -> bool {
        self.columns.iter().any(|c| c.is_primary_key)
    }

    /// Primary key columns, ordered by key position.
    pub fn primary_key(&self) -> Vec<&ColumnDescriptor> {
        let mut pk: Vec<(usize, &ColumnDescriptor)> = self
            .columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_primary_key)
            .collect();
        pk.sort_by_key(|(pos, c)| (c.pk_ordinal.unwrap_or(usize::MAX), *pos));
        pk.into_iter().map(|(_, c)| c).collect()
    }

    /// Find a column's position by name (case-insensitive).
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Column names in storage order.
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

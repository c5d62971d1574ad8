//! Error types for the comparison library.

use thiserror::Error;

/// Main error type for comparison operations.
#[derive(Error, Debug)]
pub enum CheckError {
    /// Configuration error (invalid YAML value, missing fields, bad mode, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A user-supplied regex failed to compile
    #[error("Configuration error: invalid pattern '{pattern}' in {field}: {message}")]
    InvalidPattern {
        field: String,
        pattern: String,
        message: String,
    },

    /// A normalization replacement is malformed or references a missing group
    #[error("Configuration error: invalid replacement '{replacement}' for pattern '{pattern}': {message}")]
    InvalidReplacement {
        pattern: String,
        replacement: String,
        message: String,
    },

    /// The same column was forced into two different categories
    #[error("Configuration error: column '{column}' is listed in both {first} and {second}")]
    ConflictingColumn {
        column: String,
        first: String,
        second: String,
    },

    /// Schema fetch or row stream failure for a specific table
    #[error("Connector error for table {table}: {message}")]
    Connector { table: String, message: String },

    /// A row value could not be decoded
    #[error("Encoding error in {table}.{column}: {message}")]
    Encoding {
        table: String,
        column: String,
        message: String,
    },

    /// SQLite driver error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Comparison was cancelled (SIGINT, etc.)
    #[error("Comparison cancelled")]
    Cancelled,
}

impl CheckError {
    /// Create a Connector error
    pub fn connector(table: impl Into<String>, message: impl Into<String>) -> Self {
        CheckError::Connector {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create an InvalidPattern error
    pub fn invalid_pattern(
        field: impl Into<String>,
        pattern: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        CheckError::InvalidPattern {
            field: field.into(),
            pattern: pattern.into(),
            message: message.into(),
        }
    }

    /// Create an InvalidReplacement error
    pub fn invalid_replacement(
        pattern: impl Into<String>,
        replacement: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        CheckError::InvalidReplacement {
            pattern: pattern.into(),
            replacement: replacement.into(),
            message: message.into(),
        }
    }

    /// Whether this error was raised by configuration validation.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            CheckError::Config(_)
                | CheckError::InvalidPattern { .. }
                | CheckError::InvalidReplacement { .. }
                | CheckError::ConflictingColumn { .. }
                | CheckError::Yaml(_)
        )
    }

    /// Process exit code for this error category.
    pub fn exit_code(&self) -> u8 {
        match self {
            e if e.is_config() => 1,
            CheckError::Connector { .. } | CheckError::Sqlite(_) => 2,
            CheckError::Encoding { .. } => 3,
            CheckError::Io(_) => 7,
            CheckError::Json(_) => 8,
            CheckError::Cancelled => 130,
            _ => 1,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for comparison operations.
pub type Result<T> = std::result::Result<T, CheckError>;

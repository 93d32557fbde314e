use std::fmt::Display;
use std::path::PathBuf;

use thiserror::Error;

/// Failures raised by partition and cumulative-table backends.
///
/// A partition that simply does not exist is not an error; backends report it
/// as `Ok(None)`. Everything here is fatal for the (table, date) being processed.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("i/o failure on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed table file '{}': {reason}", path.display())]
    Malformed { path: PathBuf, reason: String },

    #[error("store backend failure: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn malformed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Malformed {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn backend(error: impl Display) -> Self {
        Self::Backend(error.to_string())
    }
}

/// Top-level error type for cleanup and load operations.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("unknown table '{name}'")]
    UnknownTable { name: String },

    #[error("table '{table}' has no column '{column}'")]
    MissingColumn { table: String, column: String },

    #[error("row has {actual} values but the record set has {expected} columns")]
    RowWidth { expected: usize, actual: usize },

    #[error("invalid date '{value}', expected YYYY-MM-DD")]
    InvalidDate { value: String },

    #[error("table '{table}' is not configured for {operation}")]
    NotMergeable {
        table: &'static str,
        operation: &'static str,
    },
}

impl PipelineError {
    pub fn missing_column(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self::MissingColumn {
            table: table.into(),
            column: column.into(),
        }
    }
}

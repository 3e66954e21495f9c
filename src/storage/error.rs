//! Storage-specific error types.
//!
//! All writer operations return [`StorageError`] on failure. The logger
//! logs these and keeps the source data so the next cycle can retry.

use thiserror::Error;

/// Errors that can occur in the storage layer.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database operation failed (sqlx error).
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// CSV encoding or file error.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// File system error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The writer was already closed.
    #[error("writer is closed")]
    Closed,

    /// Internal error (e.g., injected failure, task join failure).
    #[error("internal error: {0}")]
    Internal(String),
}

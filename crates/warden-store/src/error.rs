//! Error types for the store module.

use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A referenced row does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A row with the same key already exists, or is still referenced.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Invalid data in storage.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// The blocking worker panicked or was cancelled.
    #[error("store task failed: {0}")]
    Task(String),

    /// A lock guarding the store was poisoned.
    #[error("store lock poisoned")]
    Poisoned,

    /// Commit refused by fault injection.
    #[error("commit rejected: {0}")]
    Rejected(String),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

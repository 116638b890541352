//! Error types for the store module.

use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store cannot be opened or reached (lock poisoned, worker lost).
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A statement was rejected by SQLite.
    #[error("query failed: {0}")]
    Query(#[from] rusqlite::Error),

    /// A stored row could not be decoded.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),
}

impl From<zerosync_core::CoreError> for StoreError {
    fn from(e: zerosync_core::CoreError) -> Self {
        StoreError::InvalidData(e.to_string())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

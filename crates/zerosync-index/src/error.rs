//! Error types for the index module.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while touching the synchronized root.
#[derive(Debug, Error)]
pub enum IndexError {
    /// A filesystem read, write, rename, or delete failed.
    #[error("{op} failed on {path}: {source}")]
    FileIo {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A relative path tried to leave the synchronized root.
    #[error("path escapes synchronized root: {0}")]
    PathEscape(String),

    /// Directory traversal failed.
    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),

    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] zerosync_store::StoreError),

    /// A blocking filesystem task was lost.
    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl IndexError {
    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        IndexError::FileIo {
            op,
            path: path.into(),
            source,
        }
    }
}

/// Result type for index operations.
pub type Result<T> = std::result::Result<T, IndexError>;

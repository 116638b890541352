//! Error types for the node.

use zerosync_index::IndexError;
use zerosync_store::StoreError;
use zerosync_sync::SyncError;
use thiserror::Error;

/// Errors that can occur while setting up or driving a node.
#[derive(Debug, Error)]
pub enum NodeError {
    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Local filesystem or scan error.
    #[error("index error: {0}")]
    Index(#[from] IndexError),

    /// Sync error.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// Configuration rejected.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The synchronized root or state directory could not be prepared.
    #[error("cannot prepare {path}: {source}")]
    Setup {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for node operations.
pub type Result<T> = std::result::Result<T, NodeError>;

//! Error types for the sync module.

use thiserror::Error;

use zerosync_core::PeerId;

/// Errors that can occur during reconciliation.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] zerosync_store::StoreError),

    /// Filesystem operation on the synchronized root failed.
    #[error("local error: {0}")]
    Local(#[from] zerosync_index::IndexError),

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(String),

    /// The transport has no route to this peer.
    #[error("peer unknown: {0}")]
    PeerUnknown(PeerId),
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

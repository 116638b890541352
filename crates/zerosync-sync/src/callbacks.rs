//! The capability interface the transport drives.
//!
//! A transport holds a [`Callbacks`] implementation as an abstract
//! dependency and invokes it whenever a peer asks for or delivers data.

use async_trait::async_trait;

use zerosync_core::{Chunk, IndexEntry, PeerId, State};

/// Outcome of applying one batch of entries from a peer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Entries applied (or scheduled for fetching).
    pub accepted: usize,
    /// Entries older than the local copy.
    pub discarded: usize,
    /// Paths requested from the sender, in entry order.
    pub requested: Vec<String>,
    /// Sum of the sizes of the requested updates.
    pub total_bytes: u64,
}

/// Inbound callbacks of the reconciliation engine.
///
/// All methods degrade instead of failing: an unreadable store or file is
/// reported and yields the "nothing" answer.
#[async_trait]
pub trait Callbacks: Send + Sync {
    /// Log entries with `state > from`, or `None` if there are none.
    async fn get_update(&self, from: State) -> Option<Vec<IndexEntry>>;

    /// Apply entries announced by `sender`, in order.
    async fn pass_update(&self, sender: &PeerId, entries: Vec<IndexEntry>) -> PassReport;

    /// Up to `chunk_size` bytes of `path` at `offset`; `None` at end of file.
    async fn get_chunk(&self, path: &str, chunk_size: u64, offset: u64) -> Option<Chunk>;

    /// Store a chunk of `path`. `sequence == 0` starts a fresh transfer.
    async fn pass_chunk(&self, chunk: Chunk, path: &str, sequence: u64, offset: u64);

    /// Highest state in the local log.
    async fn get_current_state(&self) -> State;
}

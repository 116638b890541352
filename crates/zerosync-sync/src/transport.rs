//! Transport abstraction for the reconciliation engine.
//!
//! The transport moves log entries and chunks between peers. The engine
//! calls three outbound operations on it; the transport in turn invokes the
//! engine's [`Callbacks`](crate::Callbacks). Implementations may use any
//! connection and framing scheme.

use async_trait::async_trait;

use zerosync_core::{IndexEntry, PeerId, State};

use crate::error::Result;

/// Outbound operations the engine invokes on the transport.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Ask `peer` for the content of `paths`, `total_bytes` in all.
    async fn request_files(&self, peer: &PeerId, paths: Vec<String>, total_bytes: u64) -> Result<()>;

    /// Announce a freshly indexed generation to all peers.
    async fn send_update(&self, state: State, entries: Vec<IndexEntry>) -> Result<()>;

    /// Bring the transport up.
    async fn start(&self) -> Result<()>;
}

/// An in-process transport for testing.
///
/// Peers are connected directly through their callbacks; every call is
/// delivered synchronously.
pub mod memory {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Weak};
    use tokio::sync::RwLock;

    use crate::callbacks::Callbacks;
    use crate::error::SyncError;

    /// Shared state for the memory transport network.
    pub struct MemoryNetwork {
        /// Callbacks of each attached peer. Weak so a peer's engine and its
        /// transport do not keep each other alive.
        peers: RwLock<HashMap<PeerId, Weak<dyn Callbacks>>>,

        /// Last state each receiver has seen from each sender.
        cursors: RwLock<HashMap<(PeerId, PeerId), State>>,
    }

    impl MemoryNetwork {
        /// Create a new memory network.
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// Create a transport for `peer` that fetches `chunk_size` bytes at a time.
        pub fn create_transport(self: &Arc<Self>, peer: PeerId, chunk_size: u64) -> MemoryTransport {
            MemoryTransport {
                peer,
                network: Arc::clone(self),
                chunk_size: chunk_size.max(1),
            }
        }

        /// Route calls for `peer` to `callbacks`.
        pub async fn attach(&self, peer: PeerId, callbacks: Weak<dyn Callbacks>) {
            self.peers.write().await.insert(peer, callbacks);
        }

        pub async fn detach(&self, peer: &PeerId) {
            self.peers.write().await.remove(peer);
        }

        async fn lookup(&self, peer: &PeerId) -> Result<Arc<dyn Callbacks>> {
            self.peers
                .read()
                .await
                .get(peer)
                .and_then(Weak::upgrade)
                .ok_or_else(|| SyncError::PeerUnknown(peer.clone()))
        }

        async fn others(&self, me: &PeerId) -> Vec<(PeerId, Arc<dyn Callbacks>)> {
            self.peers
                .read()
                .await
                .iter()
                .filter(|(id, _)| *id != me)
                .filter_map(|(id, weak)| weak.upgrade().map(|cb| (id.clone(), cb)))
                .collect()
        }

        async fn cursor(&self, receiver: &PeerId, sender: &PeerId) -> State {
            self.cursors
                .read()
                .await
                .get(&(receiver.clone(), sender.clone()))
                .copied()
                .unwrap_or(State::ZERO)
        }

        async fn advance(&self, receiver: &PeerId, sender: &PeerId, state: State) {
            let mut cursors = self.cursors.write().await;
            let cursor = cursors
                .entry((receiver.clone(), sender.clone()))
                .or_insert(State::ZERO);
            *cursor = (*cursor).max(state);
        }
    }

    impl Default for MemoryNetwork {
        fn default() -> Self {
            Self {
                peers: RwLock::new(HashMap::new()),
                cursors: RwLock::new(HashMap::new()),
            }
        }
    }

    /// In-memory transport implementation.
    pub struct MemoryTransport {
        peer: PeerId,
        network: Arc<MemoryNetwork>,
        chunk_size: u64,
    }

    impl MemoryTransport {
        pub fn peer_id(&self) -> &PeerId {
            &self.peer
        }
    }

    #[async_trait]
    impl Transport for MemoryTransport {
        async fn request_files(&self, peer: &PeerId, paths: Vec<String>, total_bytes: u64) -> Result<()> {
            let owner = self.network.lookup(peer).await?;
            let local = self.network.lookup(&self.peer).await?;
            tracing::debug!(from = %peer, files = paths.len(), total_bytes, "fetching files");

            for path in paths {
                let mut offset = 0u64;
                let mut sequence = 0u64;
                while let Some(chunk) = owner.get_chunk(&path, self.chunk_size, offset).await {
                    let len = chunk.len() as u64;
                    local.pass_chunk(chunk, &path, sequence, offset).await;
                    offset += len;
                    sequence += 1;
                }
            }
            Ok(())
        }

        async fn send_update(&self, state: State, entries: Vec<IndexEntry>) -> Result<()> {
            for (id, callbacks) in self.network.others(&self.peer).await {
                callbacks.pass_update(&self.peer, entries.clone()).await;
                self.network.advance(&id, &self.peer, state).await;
            }
            Ok(())
        }

        /// Catch up with every attached peer from the last state seen.
        async fn start(&self) -> Result<()> {
            let local = self.network.lookup(&self.peer).await?;

            for (id, remote) in self.network.others(&self.peer).await {
                let theirs = remote.get_current_state().await;
                let from = self.network.cursor(&self.peer, &id).await;
                if theirs <= from {
                    continue;
                }

                if let Some(entries) = remote.get_update(from).await {
                    tracing::debug!(peer = %id, from = %from, to = %theirs, "catching up");
                    local.pass_update(&id, entries).await;
                }
                self.network.advance(&self.peer, &id, theirs).await;
            }
            Ok(())
        }
    }
}

/// A transport that only records what it was asked to do.
pub mod recording {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Mutex, MutexGuard};

    /// One `request_files` call.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct FileRequest {
        pub peer: PeerId,
        pub paths: Vec<String>,
        pub total_bytes: u64,
    }

    #[derive(Default)]
    pub struct RecordingTransport {
        requests: Mutex<Vec<FileRequest>>,
        updates: Mutex<Vec<(State, Vec<IndexEntry>)>>,
        starts: AtomicUsize,
    }

    impl RecordingTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn requests(&self) -> Vec<FileRequest> {
            lock(&self.requests).clone()
        }

        pub fn updates(&self) -> Vec<(State, Vec<IndexEntry>)> {
            lock(&self.updates).clone()
        }

        pub fn starts(&self) -> usize {
            self.starts.load(Ordering::SeqCst)
        }
    }

    fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
        m.lock().unwrap_or_else(|e| e.into_inner())
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn request_files(&self, peer: &PeerId, paths: Vec<String>, total_bytes: u64) -> Result<()> {
            lock(&self.requests).push(FileRequest {
                peer: peer.clone(),
                paths,
                total_bytes,
            });
            Ok(())
        }

        async fn send_update(&self, state: State, entries: Vec<IndexEntry>) -> Result<()> {
            lock(&self.updates).push((state, entries));
            Ok(())
        }

        async fn start(&self) -> Result<()> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }
}

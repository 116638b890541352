//! The reconciliation engine.
//!
//! Decides which remote changes to apply and how:
//!
//! - **Conflicts** are last-writer-wins on timestamps; ties go to the
//!   incoming entry. Discarded entries leave no trace.
//! - **Updates** are fetched in one batched request per `pass_update` call.
//! - **Renames and deletes** are applied to the synchronized root directly.
//! - Every change applied here is marked `changed_self` so the indexer
//!   never announces it again.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use zerosync_core::{
    Checksum, Chunk, FileField, FileFlag, FileFlags, FileOperation, FileRecord, IndexEntry, PeerId,
    State,
};
use zerosync_index::{Incoming, SyncRoot};
use zerosync_store::{ReportExt, Store, StoreExt};

use crate::callbacks::{Callbacks, PassReport};
use crate::error::Result;
use crate::transport::Transport;

/// Configuration for the reconciliation engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Chunk size advertised to the transport for fetches. A received chunk
    /// shorter than this ends its transfer.
    pub chunk_size: u64,
    /// Largest chunk `get_chunk` will serve; bigger requests are clamped.
    pub max_chunk_size: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            chunk_size: 64 * 1024,
            max_chunk_size: 1024 * 1024,
        }
    }
}

/// Applies remote changes and serves local content.
pub struct Reconciler<S, T> {
    store: Arc<S>,
    root: SyncRoot,
    transport: Arc<T>,
    config: SyncConfig,
}

impl<S: Store, T: Transport> Reconciler<S, T> {
    pub fn new(store: Arc<S>, root: SyncRoot, transport: Arc<T>, config: SyncConfig) -> Self {
        Self {
            store,
            root,
            transport,
            config,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn root(&self) -> &SyncRoot {
        &self.root
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Start the transport.
    pub async fn start(&self) -> Result<()> {
        self.transport.start().await
    }

    /// Announce the locally originated entries of `state` to all peers.
    ///
    /// Returns the number of entries sent; nothing is sent for an empty
    /// generation.
    pub async fn synchronize_update(&self, state: State) -> usize {
        let entries = self
            .store
            .index_entries_at(state, true)
            .await
            .or_report("index_entries_at");
        if entries.is_empty() {
            return 0;
        }

        let count = entries.len();
        self.transport
            .send_update(state, entries)
            .await
            .or_report("send_update");
        tracing::debug!(state = %state, entries = count, "announced generation");
        count
    }

    /// Prepare to receive the content of an accepted update.
    async fn expect_update(&self, entry: &IndexEntry, incoming: Incoming) {
        let path = entry.path.as_str();
        let empty = incoming.size == 0;
        self.root.expect(path, incoming);

        // No chunk ever arrives for empty content
        if empty {
            self.root.remove(path).await.or_report("remove");
            self.store.mark_received(path).await.or_report("mark_received");
            self.root.create_empty(path).await.or_report("create_empty");
            self.settle(path).await;
        }
    }

    /// Record the content a finished transfer left on disk.
    async fn settle(&self, path: &str) {
        let Some(incoming) = self.root.settle(path) else {
            return;
        };

        let Some((checksum, size)) = self.root.checksum(path).await.reported("checksum").flatten()
        else {
            return;
        };

        if checksum != incoming.checksum || size != incoming.size {
            tracing::warn!(
                path,
                expected = %incoming.checksum,
                actual = %checksum,
                "received content differs from announcement"
            );
        }

        self.store
            .update_file_metadata(path, incoming.timestamp, &checksum, size)
            .await
            .or_report("update_file_metadata");
        self.store.set_flag(path, FileFlag::Deleted, false).await.or_report("set_deleted");
        // Keep disk and record in step so the scanner's fast path holds
        self.root
            .set_modified(path, incoming.timestamp)
            .await
            .or_report("set_modified");
    }

    async fn apply_rename(&self, entry: &IndexEntry, to: &str) {
        let from = entry.path.as_str();
        self.root.settle(from);

        let moved = self.root.rename(from, to).await.reported("rename").unwrap_or(false);
        let origin = self.store.file_record(from).await.or_report("file_record");

        self.store
            .update_file_field(from, FileField::NewPath(Some(to.to_string())))
            .await
            .or_report("set_new_path");
        for flag in [FileFlag::Changed, FileFlag::ChangedSelf, FileFlag::Deleted] {
            self.store.set_flag(from, flag, true).await.or_report("mark_renamed");
        }

        if moved {
            let timestamp = origin.map_or(entry.timestamp, |r| r.timestamp);
            self.adopt(to, timestamp).await;
        }
        tracing::debug!(from, to, moved, "applied rename");
    }

    /// Track the file a rename just put at `path`.
    async fn adopt(&self, path: &str, timestamp: i64) {
        let (checksum, size) = self
            .root
            .checksum(path)
            .await
            .reported("checksum")
            .flatten()
            .unwrap_or_else(|| (Checksum::zero(), 0));

        let existing = self.store.file_record(path).await.or_report("file_record");
        if existing.is_some() {
            self.store
                .update_file_metadata(path, timestamp, &checksum, size)
                .await
                .or_report("update_file_metadata");
            self.store.set_flag(path, FileFlag::Deleted, false).await.or_report("set_deleted");
            self.store.mark_received(path).await.or_report("mark_received");
        } else {
            let record =
                FileRecord::new(path, timestamp, checksum, size).with_flags(FileFlags::received());
            self.store.insert_file_record(&record).await.or_report("insert_file_record");
        }
        self.root.set_modified(path, timestamp).await.or_report("set_modified");
    }

    async fn apply_delete(&self, path: &str) {
        self.root.settle(path);

        let removed = self.root.remove(path).await.reported("remove").unwrap_or(false);
        for flag in [FileFlag::Changed, FileFlag::ChangedSelf, FileFlag::Deleted] {
            self.store.set_flag(path, flag, true).await.or_report("mark_deleted");
        }
        tracing::debug!(path, removed, "applied delete");
    }
}

#[async_trait]
impl<S, T> Callbacks for Reconciler<S, T>
where
    S: Store + 'static,
    T: Transport + 'static,
{
    async fn get_update(&self, from: State) -> Option<Vec<IndexEntry>> {
        let entries = self
            .store
            .index_entries_since(from)
            .await
            .or_report("index_entries_since");
        (!entries.is_empty()).then_some(entries)
    }

    async fn pass_update(&self, sender: &PeerId, entries: Vec<IndexEntry>) -> PassReport {
        let mut report = PassReport::default();

        for entry in entries {
            // Untracked, or unreadable, counts as infinitely old
            let local = self
                .store
                .timestamp_for(&entry.path)
                .await
                .or_report("file_record")
                .unwrap_or(0);

            if local > entry.timestamp {
                tracing::debug!(
                    path = %entry.path,
                    local,
                    remote = entry.timestamp,
                    "discarding older remote change"
                );
                report.discarded += 1;
                continue;
            }
            report.accepted += 1;

            match &entry.operation {
                FileOperation::Update { .. } => {
                    if let Some(incoming) = Incoming::from_entry(&entry) {
                        report.total_bytes += incoming.size;
                        self.expect_update(&entry, incoming).await;
                        report.requested.push(entry.path);
                    }
                }
                FileOperation::Rename { new_path } => self.apply_rename(&entry, new_path).await,
                FileOperation::Delete => self.apply_delete(&entry.path).await,
            }
        }

        if !report.requested.is_empty() {
            tracing::debug!(
                peer = %sender,
                files = report.requested.len(),
                total_bytes = report.total_bytes,
                "requesting files"
            );
            let sent = self
                .transport
                .request_files(sender, report.requested.clone(), report.total_bytes)
                .await
                .reported("request_files");
            // Nothing will arrive for these
            if sent.is_none() {
                for path in &report.requested {
                    self.root.settle(path);
                }
            }
        }

        report
    }

    async fn get_chunk(&self, path: &str, chunk_size: u64, offset: u64) -> Option<Chunk> {
        let len = chunk_size.min(self.config.max_chunk_size);
        if len == 0 {
            return None;
        }

        self.root
            .read_chunk(path, offset, len as usize)
            .await
            .reported("get_chunk")
            .flatten()
            .map(Chunk::new)
    }

    async fn pass_chunk(&self, chunk: Chunk, path: &str, sequence: u64, offset: u64) {
        if sequence == 0 {
            self.root.remove(path).await.or_report("remove");
            self.store.mark_received(path).await.or_report("mark_received");
        }

        let len = chunk.len() as u64;
        let end = offset.saturating_add(len);
        if self
            .root
            .write_chunk(path, offset, chunk.into_bytes())
            .await
            .reported("pass_chunk")
            .is_none()
        {
            return;
        }

        // A short chunk is the last one the owner had, even if the file
        // shrank below the announced size
        let last = len < self.config.chunk_size;
        if self.root.incoming(path).is_some_and(|i| last || end >= i.size) {
            self.settle(path).await;
        }
    }

    async fn get_current_state(&self) -> State {
        self.store.latest_state().await.or_report("latest_state")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::recording::RecordingTransport;
    use bytes::Bytes;
    use tempfile::TempDir;
    use zerosync_index::{Indexer, Scanner};
    use zerosync_store::MemoryStore;

    struct Fixture {
        dir: TempDir,
        store: Arc<MemoryStore>,
        transport: Arc<RecordingTransport>,
        engine: Reconciler<MemoryStore, RecordingTransport>,
    }

    fn fixture() -> Fixture {
        fixture_with(SyncConfig::default())
    }

    fn fixture_with(config: SyncConfig) -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new());
        let transport = Arc::new(RecordingTransport::new());
        let engine =
            Reconciler::new(store.clone(), SyncRoot::new(dir.path()), transport.clone(), config);
        Fixture {
            dir,
            store,
            transport,
            engine,
        }
    }

    fn peer() -> PeerId {
        PeerId::new("remote")
    }

    fn upd(path: &str, timestamp: i64, size: u64) -> IndexEntry {
        IndexEntry::update(State(1), path, timestamp, size, Checksum::of(path.as_bytes()))
    }

    impl Fixture {
        fn write(&self, rel: &str, content: &[u8]) {
            std::fs::write(self.dir.path().join(rel), content).unwrap();
        }

        fn read(&self, rel: &str) -> Option<Vec<u8>> {
            std::fs::read(self.dir.path().join(rel)).ok()
        }

        async fn track(&self, rel: &str, timestamp: i64) {
            let record = FileRecord::new(rel, timestamp, Checksum::of(b"local"), 5);
            self.store.insert_file_record(&record).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_older_update_is_discarded() {
        let fx = fixture();
        fx.track("a.txt", 100).await;
        let before = fx.store.file_record("a.txt").await.unwrap();

        let report = fx.engine.pass_update(&peer(), vec![upd("a.txt", 90, 4)]).await;

        assert_eq!(report.discarded, 1);
        assert!(report.requested.is_empty());
        assert!(fx.transport.requests().is_empty());
        assert_eq!(fx.store.file_record("a.txt").await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_newer_update_is_requested() {
        let fx = fixture();
        fx.track("a.txt", 100).await;

        let report = fx.engine.pass_update(&peer(), vec![upd("a.txt", 150, 4)]).await;

        assert_eq!(report.accepted, 1);
        let requests = fx.transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].paths, vec!["a.txt".to_string()]);
        assert_eq!(requests[0].peer, peer());
    }

    #[tokio::test]
    async fn test_equal_timestamp_favors_incoming() {
        let fx = fixture();
        fx.track("a.txt", 100).await;

        let report = fx.engine.pass_update(&peer(), vec![upd("a.txt", 100, 4)]).await;
        assert_eq!(report.accepted, 1);
    }

    #[tokio::test]
    async fn test_updates_batched_into_one_request() {
        let fx = fixture();
        let entries = vec![upd("a", 1, 10), upd("b", 1, 20), upd("c", 1, 30)];

        let report = fx.engine.pass_update(&peer(), entries).await;

        assert_eq!(report.total_bytes, 60);
        let requests = fx.transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].total_bytes, 60);
        assert_eq!(requests[0].paths.len(), 3);
    }

    #[tokio::test]
    async fn test_rename_is_not_reannounced() {
        let fx = fixture();
        fx.write("a.txt", b"content");
        let scanner = Scanner::new(fx.store.clone(), fx.engine.root().clone());
        let indexer = Indexer::new(fx.store.clone()).await.unwrap();
        scanner.scan().await.unwrap();
        let first = indexer.run_cycle().await;
        assert_eq!(first.state, Some(State(1)));

        let ts = fx.store.timestamp_for("a.txt").await.unwrap().unwrap();
        let rename = IndexEntry::rename(State(4), "a.txt", ts, "b.txt");
        fx.engine.pass_update(&peer(), vec![rename]).await;

        assert!(fx.store.file_flag("a.txt", FileFlag::ChangedSelf).await.unwrap());
        assert_eq!(fx.read("b.txt").as_deref(), Some(&b"content"[..]));
        assert_eq!(fx.read("a.txt"), None);

        scanner.scan().await.unwrap();
        let next = indexer.run_cycle().await;
        assert!(next.is_empty(), "re-announced: {:?}", next.entries);

        // Nothing left over for the following cycle either
        scanner.scan().await.unwrap();
        assert!(indexer.run_cycle().await.is_empty());
    }

    #[tokio::test]
    async fn test_delete_removes_file_and_tombstones() {
        let fx = fixture();
        fx.write("a.txt", b"x");
        fx.track("a.txt", 10).await;

        let entry = IndexEntry::delete(State(2), "a.txt", 10);
        fx.engine.pass_update(&peer(), vec![entry]).await;

        assert_eq!(fx.read("a.txt"), None);
        let record = fx.store.file_record("a.txt").await.unwrap().unwrap();
        assert!(record.flags.deleted && record.flags.changed_self);
    }

    #[tokio::test]
    async fn test_failed_entry_does_not_abort_batch() {
        let fx = fixture();
        let escape = IndexEntry::rename(State(1), "a", 1, "../outside");
        let report = fx.engine.pass_update(&peer(), vec![escape, upd("b", 1, 3)]).await;

        assert_eq!(report.accepted, 2);
        assert_eq!(fx.transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_first_chunk_is_idempotent() {
        let fx = fixture();
        fx.write("f", b"stale content that is longer");
        let chunk = Chunk::new(Bytes::from_static(b"fresh"));

        fx.engine.pass_chunk(chunk.clone(), "f", 0, 0).await;
        let once = fx.read("f");
        fx.engine.pass_chunk(chunk, "f", 0, 0).await;

        assert_eq!(once.as_deref(), Some(&b"fresh"[..]));
        assert_eq!(fx.read("f"), once);

        let record = fx.store.file_record("f").await.unwrap().unwrap();
        assert!(record.flags.changed && record.flags.changed_self);
    }

    /// A transport whose file requests never go through.
    struct Offline;

    #[async_trait]
    impl Transport for Offline {
        async fn request_files(&self, _: &PeerId, _: Vec<String>, _: u64) -> Result<()> {
            Err(crate::error::SyncError::Transport("offline".into()))
        }

        async fn send_update(&self, _: State, _: Vec<IndexEntry>) -> Result<()> {
            Ok(())
        }

        async fn start(&self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_failed_request_drops_expectations() {
        let dir = TempDir::new().unwrap();
        let engine = Reconciler::new(
            Arc::new(MemoryStore::new()),
            SyncRoot::new(dir.path()),
            Arc::new(Offline),
            SyncConfig::default(),
        );

        let report = engine.pass_update(&peer(), vec![upd("a", 1, 10), upd("b", 1, 4)]).await;

        assert_eq!(report.requested.len(), 2);
        assert!(!engine.root().is_incoming("a"));
        assert!(!engine.root().is_incoming("b"));
    }

    #[tokio::test]
    async fn test_short_transfer_settles_and_local_edits_count() {
        let fx = fixture();
        let scanner = Scanner::new(fx.store.clone(), fx.engine.root().clone());
        let indexer = Indexer::new(fx.store.clone()).await.unwrap();

        // The owner's file shrank: one short chunk, then nothing
        fx.engine.pass_update(&peer(), vec![upd("f", 1_000, 10)]).await;
        fx.engine.pass_chunk(Chunk::from(&b"01234"[..]), "f", 0, 0).await;
        assert!(!fx.engine.root().is_incoming("f"));
        assert_eq!(fx.store.file_record("f").await.unwrap().unwrap().checksum, Checksum::of(b"01234"));

        scanner.scan().await.unwrap();
        assert!(indexer.run_cycle().await.is_empty());

        fx.write("f", b"local edit by the user");
        let report = scanner.scan().await.unwrap();
        assert_eq!(report.modified, 1);
        let cycle = indexer.run_cycle().await;
        assert_eq!(cycle.entries.len(), 1);
        assert_eq!(cycle.entries[0].path, "f");
    }

    #[tokio::test]
    async fn test_extreme_offset_is_reported_not_fatal() {
        let fx = fixture();
        fx.engine.pass_update(&peer(), vec![upd("f", 1, 10)]).await;

        fx.engine.pass_chunk(Chunk::from(&b"xy"[..]), "f", 3, u64::MAX).await;

        assert!(fx.engine.root().is_incoming("f"));
    }

    #[tokio::test]
    async fn test_chunks_complete_transfer() {
        let fx = fixture_with(SyncConfig {
            chunk_size: 3,
            ..SyncConfig::default()
        });
        let entry = IndexEntry::update(State(3), "dir/f", 777, 5, Checksum::of(b"hello"));
        fx.engine.pass_update(&peer(), vec![entry]).await;
        assert!(fx.engine.root().is_incoming("dir/f"));

        fx.engine.pass_chunk(Chunk::from(&b"hel"[..]), "dir/f", 0, 0).await;
        assert!(fx.engine.root().is_incoming("dir/f"));
        fx.engine.pass_chunk(Chunk::from(&b"lo"[..]), "dir/f", 1, 3).await;

        assert!(!fx.engine.root().is_incoming("dir/f"));
        let record = fx.store.file_record("dir/f").await.unwrap().unwrap();
        assert_eq!(record.checksum, Checksum::of(b"hello"));
        assert_eq!(record.timestamp, 777);
        assert_eq!(record.size, 5);

        // Disk mtime follows the record, so the next scan skips the file
        let scanner = Scanner::new(fx.store.clone(), fx.engine.root().clone());
        let report = scanner.scan().await.unwrap();
        assert!(report.is_empty());
        assert_eq!(report.hashed, 0);
    }

    #[tokio::test]
    async fn test_empty_update_materializes_file() {
        let fx = fixture();
        let entry = IndexEntry::update(State(1), "empty", 5, 0, Checksum::of(b""));
        let report = fx.engine.pass_update(&peer(), vec![entry]).await;

        assert_eq!(report.requested, vec!["empty".to_string()]);
        assert_eq!(fx.read("empty"), Some(Vec::new()));
        assert!(!fx.engine.root().is_incoming("empty"));
    }

    #[tokio::test]
    async fn test_get_chunk_beyond_eof_is_none() {
        let fx = fixture();
        fx.write("f", b"0123456789");

        assert_eq!(fx.engine.get_chunk("f", 4, 8).await, Some(Chunk::from(&b"89"[..])));
        assert_eq!(fx.engine.get_chunk("f", 4, 10).await, None);
        assert_eq!(fx.engine.get_chunk("f", 4, 99).await, None);
        assert_eq!(fx.engine.get_chunk("missing", 4, 0).await, None);
        assert_eq!(fx.engine.get_chunk("f", 0, 0).await, None);
    }

    #[tokio::test]
    async fn test_get_update_and_current_state() {
        let fx = fixture();
        assert_eq!(fx.engine.get_update(State::ZERO).await, None);
        assert_eq!(fx.engine.get_current_state().await, State::ZERO);

        let e1 = IndexEntry::delete(State(1), "a", 1);
        let e2 = IndexEntry::delete(State(2), "b", 1);
        fx.store.append_index_entry(&e1).await.unwrap();
        fx.store.append_index_entry(&e2).await.unwrap();

        assert_eq!(fx.engine.get_update(State(1)).await, Some(vec![e2]));
        assert_eq!(fx.engine.get_current_state().await, State(2));
    }

    #[tokio::test]
    async fn test_synchronize_update_excludes_received() {
        let fx = fixture();
        let local = IndexEntry::delete(State(1), "a", 1);
        fx.store.append_index_entry(&local).await.unwrap();
        fx.store
            .append_index_entry(&IndexEntry::delete(State(1), "b", 1).received())
            .await
            .unwrap();

        assert_eq!(fx.engine.synchronize_update(State(1)).await, 1);
        assert_eq!(fx.engine.synchronize_update(State(9)).await, 0);
        assert_eq!(fx.transport.updates(), vec![(State(1), vec![local])]);
    }

    #[tokio::test]
    async fn test_start_delegates_to_transport() {
        let fx = fixture();
        fx.engine.start().await.unwrap();
        assert_eq!(fx.transport.starts(), 1);
    }
}

//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

use zerosync_core::{Checksum, FileRecord, IndexEntry, PeerId, State};
use zerosync_index::{Indexer, Scanner, SyncRoot};
use zerosync_store::MemoryStore;
use zerosync_sync::{Reconciler, SyncConfig, Transport};

/// A scratch synchronized directory, removed on drop.
pub struct TestRoot {
    dir: TempDir,
    root: SyncRoot,
}

impl TestRoot {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("create temp dir");
        let root = SyncRoot::new(dir.path());
        Self { dir, root }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn root(&self) -> &SyncRoot {
        &self.root
    }

    pub fn join(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    /// Write `content` at `rel`, creating parent directories.
    pub fn write(&self, rel: &str, content: &[u8]) {
        let path = self.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent");
        }
        std::fs::write(path, content).expect("write file");
    }

    /// Content at `rel`, `None` if there is no such file.
    pub fn read(&self, rel: &str) -> Option<Vec<u8>> {
        std::fs::read(self.join(rel)).ok()
    }

    pub fn exists(&self, rel: &str) -> bool {
        self.join(rel).is_file()
    }

    pub fn remove(&self, rel: &str) {
        std::fs::remove_file(self.join(rel)).expect("remove file");
    }

    pub fn rename(&self, from: &str, to: &str) {
        std::fs::rename(self.join(from), self.join(to)).expect("rename file");
    }
}

impl Default for TestRoot {
    fn default() -> Self {
        Self::new()
    }
}

/// One peer's local side: directory, store, and identity.
pub struct TestPeer {
    pub id: PeerId,
    pub dir: TestRoot,
    pub store: Arc<MemoryStore>,
}

impl TestPeer {
    pub fn new(name: &str) -> Self {
        Self {
            id: PeerId::new(name),
            dir: TestRoot::new(),
            store: Arc::new(MemoryStore::new()),
        }
    }

    pub fn scanner(&self) -> Scanner<MemoryStore> {
        Scanner::new(self.store.clone(), self.dir.root().clone())
    }

    pub async fn indexer(&self) -> Indexer<MemoryStore> {
        Indexer::new(self.store.clone()).await.expect("create indexer")
    }

    pub fn reconciler<T: Transport>(&self, transport: Arc<T>) -> Reconciler<MemoryStore, T> {
        Reconciler::new(
            self.store.clone(),
            self.dir.root().clone(),
            transport,
            SyncConfig::default(),
        )
    }
}

/// Create multiple peers named `peer-0`, `peer-1`, ...
pub fn peers(count: usize) -> Vec<TestPeer> {
    (0..count).map(|i| TestPeer::new(&format!("peer-{}", i))).collect()
}

/// A settled record of `content` at `path`.
pub fn local_record(path: &str, timestamp: i64, content: &[u8]) -> FileRecord {
    FileRecord::new(path, timestamp, Checksum::of(content), content.len() as u64)
}

/// An update entry announcing `content` at `path`.
pub fn update_entry(state: u64, path: &str, timestamp: i64, content: &[u8]) -> IndexEntry {
    IndexEntry::update(
        State(state),
        path,
        timestamp,
        content.len() as u64,
        Checksum::of(content),
    )
}

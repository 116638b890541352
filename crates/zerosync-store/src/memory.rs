//! In-memory implementation of the Store trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use zerosync_core::{Checksum, FileField, FileFlag, FileRecord, IndexEntry, State};

use crate::error::{Result, StoreError};
use crate::traits::Store;

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// Records keyed by path; ordered so listings match SQLite's.
    files: BTreeMap<String, FileRecord>,

    /// The log in append order.
    log: Vec<IndexEntry>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryStoreInner>> {
        self.inner
            .read()
            .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryStoreInner>> {
        self.inner
            .write()
            .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {}", e)))
    }

    fn records_where(&self, keep: impl Fn(&FileRecord) -> bool) -> Result<Vec<FileRecord>> {
        let inner = self.read()?;
        Ok(inner.files.values().filter(|r| keep(r)).cloned().collect())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_file_record(&self, record: &FileRecord) -> Result<()> {
        let mut inner = self.write()?;

        if inner.files.contains_key(&record.path) {
            return Err(StoreError::InvalidData(format!(
                "path already tracked: {}",
                record.path
            )));
        }

        inner.files.insert(record.path.clone(), record.clone());
        Ok(())
    }

    async fn update_file_field(&self, path: &str, field: FileField) -> Result<()> {
        let mut inner = self.write()?;
        if let Some(record) = inner.files.get_mut(path) {
            field.apply(record);
        }
        Ok(())
    }

    async fn update_file_metadata(
        &self,
        path: &str,
        timestamp: i64,
        checksum: &Checksum,
        size: u64,
    ) -> Result<()> {
        let mut inner = self.write()?;
        if let Some(record) = inner.files.get_mut(path) {
            record.timestamp = timestamp;
            record.checksum = checksum.clone();
            record.size = size;
        }
        Ok(())
    }

    async fn file_record(&self, path: &str) -> Result<Option<FileRecord>> {
        let inner = self.read()?;
        Ok(inner.files.get(path).cloned())
    }

    async fn file_flag(&self, path: &str, flag: FileFlag) -> Result<bool> {
        let inner = self.read()?;
        Ok(inner.files.get(path).is_some_and(|r| r.flags.get(flag)))
    }

    async fn has_checksum(&self, checksum: &Checksum) -> Result<bool> {
        let inner = self.read()?;
        Ok(inner.files.values().any(|r| &r.checksum == checksum))
    }

    async fn path_for_checksum(&self, checksum: &Checksum) -> Result<Option<String>> {
        let inner = self.read()?;
        Ok(inner
            .files
            .values()
            .find(|r| &r.checksum == checksum)
            .map(|r| r.path.clone()))
    }

    async fn changed_records(&self) -> Result<Vec<FileRecord>> {
        self.records_where(|r| r.flags.changed)
    }

    async fn undeleted_records(&self) -> Result<Vec<FileRecord>> {
        self.records_where(|r| !r.flags.deleted)
    }

    async fn all_records(&self) -> Result<Vec<FileRecord>> {
        self.records_where(|_| true)
    }

    async fn clear_file_records(&self) -> Result<()> {
        self.write()?.files.clear();
        Ok(())
    }

    async fn reset_change_flags(&self) -> Result<usize> {
        let mut inner = self.write()?;
        let mut reset = 0;
        for record in inner.files.values_mut().filter(|r| r.flags.changed) {
            record.flags.reset_cycle();
            reset += 1;
        }
        Ok(reset)
    }

    async fn append_index_entry(&self, entry: &IndexEntry) -> Result<()> {
        self.write()?.log.push(entry.clone());
        Ok(())
    }

    async fn index_entries_since(&self, from: State) -> Result<Vec<IndexEntry>> {
        let inner = self.read()?;

        let mut entries: Vec<IndexEntry> = inner
            .log
            .iter()
            .filter(|e| e.state > from)
            .cloned()
            .collect();

        // Stable sort keeps append order within a state
        entries.sort_by_key(|e| e.state);
        Ok(entries)
    }

    async fn index_entries_at(
        &self,
        at: State,
        exclude_changed_self: bool,
    ) -> Result<Vec<IndexEntry>> {
        let inner = self.read()?;
        Ok(inner
            .log
            .iter()
            .filter(|e| e.state == at && !(exclude_changed_self && e.changed_self))
            .cloned()
            .collect())
    }

    async fn latest_state(&self) -> Result<State> {
        let inner = self.read()?;
        Ok(inner
            .log
            .iter()
            .map(|e| e.state)
            .max()
            .unwrap_or(State::ZERO))
    }
}

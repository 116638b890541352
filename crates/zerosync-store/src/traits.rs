//! Store trait: the abstract interface for file records and the change log.
//!
//! This trait keeps the indexer and reconciliation engine storage-agnostic.
//! Implementations include SQLite (primary) and in-memory (for tests).

use async_trait::async_trait;
use zerosync_core::{Checksum, FileField, FileFlag, FileFlags, FileRecord, IndexEntry, State};

use crate::error::Result;

/// The Store trait: async interface for the durable client state.
///
/// Every call is serialized against every other call on the same store:
/// the lock is taken at call entry and released on every exit path. No
/// lock is held between calls.
///
/// # Design Notes
///
/// - **Targeted updates**: fields are updated one at a time through
///   [`FileField`], never by rewriting the whole record.
/// - **Append-only log**: index entries are only ever appended; there is no
///   update or delete for them.
/// - **Tombstones**: records are never removed individually; `deleted`
///   marks files that are gone.
#[async_trait]
pub trait Store: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // File Records
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a record for a path not tracked yet.
    ///
    /// Fails with a query error if the path is already tracked.
    async fn insert_file_record(&self, record: &FileRecord) -> Result<()>;

    /// Update one field of the record at `path`. No-op if untracked.
    async fn update_file_field(&self, path: &str, field: FileField) -> Result<()>;

    /// Update timestamp, checksum, and size of `path` in one statement.
    async fn update_file_metadata(
        &self,
        path: &str,
        timestamp: i64,
        checksum: &Checksum,
        size: u64,
    ) -> Result<()>;

    /// Get the record for a path.
    async fn file_record(&self, path: &str) -> Result<Option<FileRecord>>;

    /// Read a single flag of a record. Untracked paths read as `false`.
    async fn file_flag(&self, path: &str, flag: FileFlag) -> Result<bool>;

    /// Check whether any record carries this checksum.
    async fn has_checksum(&self, checksum: &Checksum) -> Result<bool>;

    /// Path of some record carrying this checksum.
    async fn path_for_checksum(&self, checksum: &Checksum) -> Result<Option<String>>;

    /// All records with `changed` set.
    async fn changed_records(&self) -> Result<Vec<FileRecord>>;

    /// All records that are not tombstones.
    async fn undeleted_records(&self) -> Result<Vec<FileRecord>>;

    /// Every record.
    async fn all_records(&self) -> Result<Vec<FileRecord>>;

    /// Forget every record. The log is left untouched.
    async fn clear_file_records(&self) -> Result<()>;

    /// Clear `changed`, `updated`, `renamed`, and `changed_self` on every
    /// record with `changed` set. Returns the number of records reset.
    async fn reset_change_flags(&self) -> Result<usize>;

    // ─────────────────────────────────────────────────────────────────────────
    // Change Log
    // ─────────────────────────────────────────────────────────────────────────

    /// Append an entry to the log.
    async fn append_index_entry(&self, entry: &IndexEntry) -> Result<()>;

    /// Entries with `state > from`, ordered by state then append order.
    async fn index_entries_since(&self, from: State) -> Result<Vec<IndexEntry>>;

    /// Entries with `state == at`, in append order.
    ///
    /// With `exclude_changed_self`, entries received from peers are omitted.
    async fn index_entries_at(&self, at: State, exclude_changed_self: bool)
        -> Result<Vec<IndexEntry>>;

    /// Highest state in the log, or [`State::ZERO`] if the log is empty.
    async fn latest_state(&self) -> Result<State>;
}

/// Extension trait for common store patterns.
pub trait StoreExt: Store {
    /// Set a single flag on a record.
    fn set_flag(
        &self,
        path: &str,
        flag: FileFlag,
        value: bool,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Timestamp of the record at `path`, if tracked.
    fn timestamp_for(&self, path: &str) -> impl std::future::Future<Output = Result<Option<i64>>> + Send;

    /// Mark `path` as being rewritten by a peer.
    ///
    /// Sets `changed` and `changed_self` on an existing record, or starts
    /// tracking the path with those flags and unknown content.
    fn mark_received(&self, path: &str) -> impl std::future::Future<Output = Result<()>> + Send;
}

impl<S: Store + ?Sized> StoreExt for S {
    async fn set_flag(&self, path: &str, flag: FileFlag, value: bool) -> Result<()> {
        self.update_file_field(path, FileField::Flag(flag, value)).await
    }

    async fn timestamp_for(&self, path: &str) -> Result<Option<i64>> {
        Ok(self.file_record(path).await?.map(|r| r.timestamp))
    }

    async fn mark_received(&self, path: &str) -> Result<()> {
        if self.file_record(path).await?.is_some() {
            self.set_flag(path, FileFlag::Changed, true).await?;
            self.set_flag(path, FileFlag::ChangedSelf, true).await
        } else {
            let record = FileRecord::new(path, 0, Checksum::zero(), 0)
                .with_flags(FileFlags::received());
            self.insert_file_record(&record).await
        }
    }
}

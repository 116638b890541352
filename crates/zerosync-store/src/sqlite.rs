//! SQLite implementation of the Store trait.
//!
//! This is the primary storage backend for the ZeroSync client. It uses
//! rusqlite with bundled SQLite, wrapped in async via tokio::spawn_blocking.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::types::{Type, Value};
use rusqlite::{params, Connection, OptionalExtension};

use zerosync_core::{
    Checksum, FileField, FileFlag, FileFlags, FileOperation, FileRecord, IndexEntry, OpCode, State,
};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::Store;

const FILE_COLUMNS: &str = "path, timestamp, checksum, size, new_path, reference,
     changed, updated, renamed, deleted, changed_self";

const ENTRY_COLUMNS: &str =
    "state, path, operation, timestamp, size, new_path, checksum, changed_self";

/// SQLite-based store implementation.
///
/// The connection mutex is the single store-wide lock. Each operation takes
/// it inside a blocking task and drops it when the closure returns,
/// including on error paths.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut conn = Connection::open(path).map_err(|e| {
            StoreError::Unavailable(format!("cannot open {}: {}", path.display(), e))
        })?;
        migration::migrate(&mut conn)?;
        tracing::debug!(path = %path.display(), "opened state store");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()
            .map_err(|e| StoreError::Unavailable(format!("cannot open in-memory db: {}", e)))?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool, holding the lock
    /// for exactly the duration of the closure.
    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);

        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| StoreError::Unavailable(format!("mutex poisoned: {}", e)))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("spawn_blocking failed: {}", e)))?
    }
}

// Helper to convert a row to FileRecord
fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<FileRecord> {
    let size: i64 = row.get("size")?;
    let reference: i64 = row.get("reference")?;

    Ok(FileRecord {
        path: row.get("path")?,
        timestamp: row.get("timestamp")?,
        checksum: Checksum(row.get("checksum")?),
        size: size as u64,
        new_path: row.get("new_path")?,
        reference: reference as u32,
        flags: FileFlags {
            changed: row.get("changed")?,
            updated: row.get("updated")?,
            renamed: row.get("renamed")?,
            deleted: row.get("deleted")?,
            changed_self: row.get("changed_self")?,
        },
    })
}

// Helper to convert a row to IndexEntry
fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<IndexEntry> {
    let state: i64 = row.get("state")?;
    let code: String = row.get("operation")?;
    let size: Option<i64> = row.get("size")?;
    let checksum: Option<String> = row.get("checksum")?;

    let conversion = |e: zerosync_core::CoreError| {
        rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e))
    };
    let code: OpCode = code.parse().map_err(conversion)?;
    let operation = FileOperation::from_parts(
        code,
        size.map(|s| s as u64),
        row.get("new_path")?,
        checksum.map(Checksum),
    )
    .map_err(conversion)?;

    Ok(IndexEntry {
        state: State(state as u64),
        path: row.get("path")?,
        timestamp: row.get("timestamp")?,
        operation,
        changed_self: row.get("changed_self")?,
    })
}

// Column and bound value for a single-field update
fn field_binding(field: FileField) -> (&'static str, Value) {
    match field {
        FileField::Timestamp(ts) => ("timestamp", Value::Integer(ts)),
        FileField::Checksum(checksum) => ("checksum", Value::Text(checksum.0)),
        FileField::Size(size) => ("size", Value::Integer(size as i64)),
        FileField::NewPath(new_path) => ("new_path", new_path.map_or(Value::Null, Value::Text)),
        FileField::Reference(reference) => ("reference", Value::Integer(i64::from(reference))),
        FileField::Flag(flag, value) => (flag.column(), Value::Integer(i64::from(value))),
    }
}

fn query_records(conn: &Connection, filter: &str) -> Result<Vec<FileRecord>> {
    let sql = format!("SELECT {} FROM files {} ORDER BY path", FILE_COLUMNS, filter);
    let mut stmt = conn.prepare(&sql)?;
    let records = stmt
        .query_map([], row_to_record)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(records)
}

#[async_trait]
impl Store for SqliteStore {
    async fn insert_file_record(&self, record: &FileRecord) -> Result<()> {
        let record = record.clone();

        self.blocking(move |conn| {
            conn.execute(
                "INSERT INTO files (
                    path, timestamp, checksum, size, new_path, reference,
                    changed, updated, renamed, deleted, changed_self
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    record.path,
                    record.timestamp,
                    record.checksum.0,
                    record.size as i64,
                    record.new_path,
                    i64::from(record.reference),
                    record.flags.changed,
                    record.flags.updated,
                    record.flags.renamed,
                    record.flags.deleted,
                    record.flags.changed_self,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn update_file_field(&self, path: &str, field: FileField) -> Result<()> {
        let path = path.to_string();
        let (column, value) = field_binding(field);

        self.blocking(move |conn| {
            let sql = format!("UPDATE files SET {} = ?1 WHERE path = ?2", column);
            conn.execute(&sql, params![value, path])?;
            Ok(())
        })
        .await
    }

    async fn update_file_metadata(
        &self,
        path: &str,
        timestamp: i64,
        checksum: &Checksum,
        size: u64,
    ) -> Result<()> {
        let path = path.to_string();
        let checksum = checksum.0.clone();

        self.blocking(move |conn| {
            conn.execute(
                "UPDATE files SET timestamp = ?1, checksum = ?2, size = ?3 WHERE path = ?4",
                params![timestamp, checksum, size as i64, path],
            )?;
            Ok(())
        })
        .await
    }

    async fn file_record(&self, path: &str) -> Result<Option<FileRecord>> {
        let path = path.to_string();

        self.blocking(move |conn| {
            let sql = format!("SELECT {} FROM files WHERE path = ?1", FILE_COLUMNS);
            conn.query_row(&sql, params![path], row_to_record)
                .optional()
                .map_err(StoreError::from)
        })
        .await
    }

    async fn file_flag(&self, path: &str, flag: FileFlag) -> Result<bool> {
        let path = path.to_string();

        self.blocking(move |conn| {
            let sql = format!(
                "SELECT EXISTS(SELECT 1 FROM files WHERE path = ?1 AND {} = 1)",
                flag.column()
            );
            let set: bool = conn.query_row(&sql, params![path], |row| row.get(0))?;
            Ok(set)
        })
        .await
    }

    async fn has_checksum(&self, checksum: &Checksum) -> Result<bool> {
        let checksum = checksum.0.clone();

        self.blocking(move |conn| {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM files WHERE checksum = ?1)",
                params![checksum],
                |row| row.get(0),
            )?;
            Ok(exists)
        })
        .await
    }

    async fn path_for_checksum(&self, checksum: &Checksum) -> Result<Option<String>> {
        let checksum = checksum.0.clone();

        self.blocking(move |conn| {
            conn.query_row(
                "SELECT path FROM files WHERE checksum = ?1 ORDER BY path LIMIT 1",
                params![checksum],
                |row| row.get(0),
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn changed_records(&self) -> Result<Vec<FileRecord>> {
        self.blocking(|conn| query_records(conn, "WHERE changed = 1"))
            .await
    }

    async fn undeleted_records(&self) -> Result<Vec<FileRecord>> {
        self.blocking(|conn| query_records(conn, "WHERE deleted = 0"))
            .await
    }

    async fn all_records(&self) -> Result<Vec<FileRecord>> {
        self.blocking(|conn| query_records(conn, "")).await
    }

    async fn clear_file_records(&self) -> Result<()> {
        self.blocking(|conn| {
            conn.execute("DELETE FROM files", [])?;
            Ok(())
        })
        .await
    }

    async fn reset_change_flags(&self) -> Result<usize> {
        self.blocking(|conn| {
            let reset = conn.execute(
                "UPDATE files SET changed = 0, updated = 0, renamed = 0, changed_self = 0
                 WHERE changed = 1",
                [],
            )?;
            Ok(reset)
        })
        .await
    }

    async fn append_index_entry(&self, entry: &IndexEntry) -> Result<()> {
        let entry = entry.clone();

        self.blocking(move |conn| {
            let (size, new_path, checksum) = match &entry.operation {
                FileOperation::Update { size, checksum } => {
                    (Some(*size as i64), None, Some(checksum.0.clone()))
                }
                FileOperation::Rename { new_path } => (None, Some(new_path.clone()), None),
                FileOperation::Delete => (None, None, None),
            };

            conn.execute(
                "INSERT INTO file_index (
                    state, path, operation, timestamp, size, new_path, checksum, changed_self
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    entry.state.get() as i64,
                    entry.path,
                    entry.code().as_str(),
                    entry.timestamp,
                    size,
                    new_path,
                    checksum,
                    entry.changed_self,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn index_entries_since(&self, from: State) -> Result<Vec<IndexEntry>> {
        self.blocking(move |conn| {
            let sql = format!(
                "SELECT {} FROM file_index WHERE state > ?1 ORDER BY state, seq",
                ENTRY_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let entries = stmt
                .query_map(params![from.get() as i64], row_to_entry)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(entries)
        })
        .await
    }

    async fn index_entries_at(
        &self,
        at: State,
        exclude_changed_self: bool,
    ) -> Result<Vec<IndexEntry>> {
        self.blocking(move |conn| {
            let filter = if exclude_changed_self {
                "AND changed_self = 0"
            } else {
                ""
            };
            let sql = format!(
                "SELECT {} FROM file_index WHERE state = ?1 {} ORDER BY seq",
                ENTRY_COLUMNS, filter
            );
            let mut stmt = conn.prepare(&sql)?;
            let entries = stmt
                .query_map(params![at.get() as i64], row_to_entry)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(entries)
        })
        .await
    }

    async fn latest_state(&self) -> Result<State> {
        self.blocking(|conn| {
            let max: Option<i64> =
                conn.query_row("SELECT MAX(state) FROM file_index", [], |row| row.get(0))?;
            Ok(max.map_or(State::ZERO, |s| State(s as u64)))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::StoreExt;

    fn record(path: &str, timestamp: i64) -> FileRecord {
        FileRecord::observed(path, timestamp, Checksum::of(path.as_bytes()), 10)
    }

    #[tokio::test]
    async fn test_insert_and_get_record() {
        let store = SqliteStore::open_memory().unwrap();
        let rec = record("docs/a.txt", 100).with_new_path("docs/b.txt");

        store.insert_file_record(&rec).await.unwrap();

        let retrieved = store.file_record("docs/a.txt").await.unwrap().unwrap();
        assert_eq!(retrieved, rec);
        assert!(store.file_record("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_insert_is_query_error() {
        let store = SqliteStore::open_memory().unwrap();
        store.insert_file_record(&record("a", 1)).await.unwrap();

        let err = store.insert_file_record(&record("a", 2)).await.unwrap_err();
        assert!(matches!(err, StoreError::Query(_)));
        assert_eq!(store.timestamp_for("a").await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_single_field_updates() {
        let store = SqliteStore::open_memory().unwrap();
        store.insert_file_record(&record("a", 1)).await.unwrap();

        store
            .update_file_field("a", FileField::Flag(FileFlag::ChangedSelf, true))
            .await
            .unwrap();
        store
            .update_file_field("a", FileField::Checksum(Checksum::zero()))
            .await
            .unwrap();
        store
            .update_file_field("a", FileField::NewPath(Some("b".into())))
            .await
            .unwrap();
        store
            .update_file_field("a", FileField::Reference(9))
            .await
            .unwrap();

        let rec = store.file_record("a").await.unwrap().unwrap();
        assert!(rec.flags.changed_self);
        assert!(rec.flags.changed, "untouched flags keep their value");
        assert!(rec.checksum.is_zero());
        assert_eq!(rec.new_path.as_deref(), Some("b"));
        assert_eq!(rec.reference, 9);
        assert!(store.file_flag("a", FileFlag::ChangedSelf).await.unwrap());
        assert!(!store.file_flag("a", FileFlag::Deleted).await.unwrap());
        assert!(!store.file_flag("nope", FileFlag::Changed).await.unwrap());
    }

    #[tokio::test]
    async fn test_checksum_lookup() {
        let store = SqliteStore::open_memory().unwrap();
        let rec = record("a", 1);
        store.insert_file_record(&rec).await.unwrap();

        assert!(store.has_checksum(&rec.checksum).await.unwrap());
        assert_eq!(
            store.path_for_checksum(&rec.checksum).await.unwrap(),
            Some("a".to_string())
        );
        assert!(!store.has_checksum(&Checksum::of(b"other")).await.unwrap());
        assert!(store
            .path_for_checksum(&Checksum::of(b"other"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_reset_change_flags() {
        let store = SqliteStore::open_memory().unwrap();
        store.insert_file_record(&record("a", 1)).await.unwrap();
        store
            .insert_file_record(&record("b", 1).with_flags(FileFlags::default()))
            .await
            .unwrap();
        store.set_flag("a", FileFlag::Deleted, true).await.unwrap();
        store.set_flag("a", FileFlag::ChangedSelf, true).await.unwrap();

        assert_eq!(store.changed_records().await.unwrap().len(), 1);
        assert_eq!(store.reset_change_flags().await.unwrap(), 1);

        let a = store.file_record("a").await.unwrap().unwrap();
        assert!(!a.flags.changed && !a.flags.updated && !a.flags.changed_self);
        assert!(a.flags.deleted, "tombstone survives the reset");
        assert!(store.changed_records().await.unwrap().is_empty());
        assert_eq!(store.undeleted_records().await.unwrap().len(), 1);
        assert_eq!(store.all_records().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_log_append_order_and_queries() {
        let store = SqliteStore::open_memory().unwrap();
        assert_eq!(store.latest_state().await.unwrap(), State::ZERO);

        let e1 = IndexEntry::update(State(1), "z", 5, 3, Checksum::of(b"z"));
        let e2 = IndexEntry::delete(State(1), "a", 6);
        let e3 = IndexEntry::rename(State(1), "m", 7, "n").received();
        let e4 = IndexEntry::update(State(2), "b", 8, 4, Checksum::of(b"b"));
        for entry in [&e1, &e2, &e3, &e4] {
            store.append_index_entry(entry).await.unwrap();
        }

        assert_eq!(store.latest_state().await.unwrap(), State(2));
        assert_eq!(
            store.index_entries_at(State(1), false).await.unwrap(),
            vec![e1.clone(), e2.clone(), e3.clone()]
        );
        assert_eq!(
            store.index_entries_at(State(1), true).await.unwrap(),
            vec![e1.clone(), e2.clone()]
        );
        assert_eq!(
            store.index_entries_since(State::ZERO).await.unwrap(),
            vec![e1, e2, e3, e4.clone()]
        );
        assert_eq!(store.index_entries_since(State(1)).await.unwrap(), vec![e4]);
        assert!(store.index_entries_since(State(2)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clear_keeps_log() {
        let store = SqliteStore::open_memory().unwrap();
        store.insert_file_record(&record("a", 1)).await.unwrap();
        store
            .append_index_entry(&IndexEntry::delete(State(1), "a", 1))
            .await
            .unwrap();

        store.clear_file_records().await.unwrap();
        assert!(store.all_records().await.unwrap().is_empty());
        assert_eq!(store.latest_state().await.unwrap(), State(1));
    }

    #[tokio::test]
    async fn test_reopen_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.sqlite");
        {
            let store = SqliteStore::open(&path).unwrap();
            store.insert_file_record(&record("a", 1)).await.unwrap();
            store
                .append_index_entry(&IndexEntry::delete(State(3), "a", 1))
                .await
                .unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert!(store.file_record("a").await.unwrap().is_some());
        assert_eq!(store.latest_state().await.unwrap(), State(3));
    }

    #[tokio::test]
    async fn test_mark_received() {
        let store = SqliteStore::open_memory().unwrap();
        store
            .insert_file_record(&record("a", 1).with_flags(FileFlags::default()))
            .await
            .unwrap();

        store.mark_received("a").await.unwrap();
        store.mark_received("fresh").await.unwrap();

        let a = store.file_record("a").await.unwrap().unwrap();
        assert!(a.flags.changed && a.flags.changed_self);
        let fresh = store.file_record("fresh").await.unwrap().unwrap();
        assert_eq!(fresh.flags, FileFlags::received());
        assert!(fresh.checksum.is_zero());
    }
}

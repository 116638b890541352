//! # ZeroSync Store
//!
//! Durable client state for ZeroSync: the set of tracked files with their
//! per-cycle change flags, and the append-only change log other peers
//! catch up from.
//!
//! ## Overview
//!
//! The indexer and reconciliation engine reach storage only through the
//! [`Store`] trait. The primary implementation is [`SqliteStore`], with
//! [`MemoryStore`] for testing.
//!
//! ## Key Types
//!
//! - [`Store`] - The async trait for all storage operations
//! - [`StoreExt`] - Flag and lookup helpers built on [`Store`]
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests
//! - [`ReportExt`] - Log-and-degrade for best-effort callers
//!
//! ## Usage
//!
//! ```rust,no_run
//! use zerosync_core::{Checksum, FileRecord};
//! use zerosync_store::{SqliteStore, Store};
//!
//! async fn example() {
//!     let store = SqliteStore::open("zerosync.db").unwrap();
//!
//!     let record = FileRecord::observed("notes.txt", 1_700_000_000_000, Checksum::of(b"hi"), 2);
//!     store.insert_file_record(&record).await.unwrap();
//!
//!     let changed = store.changed_records().await.unwrap();
//!     assert_eq!(changed.len(), 1);
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Serialized access**: every operation holds the store lock for its
//!   whole duration and releases it on every exit path
//! - **Append-only log**: entries are never updated or removed
//! - **Tombstones**: deleted files keep their record with `deleted` set

pub mod error;
pub mod memory;
pub mod migration;
pub mod report;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use report::ReportExt;
pub use sqlite::SqliteStore;
pub use traits::{Store, StoreExt};

//! # ZeroSync Testkit
//!
//! Testing utilities for the ZeroSync client.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: scratch synchronized directories and pre-wired peers
//! - **Generators**: Proptest strategies for records, entries, and paths
//!
//! ## Test Fixtures
//!
//! ```rust
//! use zerosync_testkit::fixtures::TestPeer;
//!
//! let peer = TestPeer::new("alice");
//! peer.dir.write("notes/todo.txt", b"buy milk");
//! assert!(peer.dir.exists("notes/todo.txt"));
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use zerosync_testkit::generators::file_record;
//!
//! proptest! {
//!     #[test]
//!     fn reset_keeps_tombstones(record in file_record()) {
//!         let mut flags = record.flags;
//!         flags.reset_cycle();
//!         prop_assert_eq!(flags.deleted, record.flags.deleted);
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{local_record, peers, update_entry, TestPeer, TestRoot};

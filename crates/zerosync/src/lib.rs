//! # ZeroSync
//!
//! Peer-to-peer file synchronization: the client-side reconciliation engine
//! and the state it runs on.
//!
//! ## Overview
//!
//! A [`Node`] synchronizes one directory. It owns:
//!
//! - **State store**: tracked files with per-cycle change flags, plus an
//!   append-only log of change entries grouped into numbered states
//! - **Scanner + Indexer**: turn local file activity into a new state of the
//!   log on every index tick
//! - **Reconciler**: the callbacks a transport drives; applies remote changes
//!   with last-writer-wins and never re-announces what it received
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use zerosync::{Node, NodeConfig};
//! use zerosync::sync::MemoryNetwork;
//! use zerosync::core::PeerId;
//!
//! async fn example() {
//!     let network = MemoryNetwork::new();
//!     let id = PeerId::random();
//!     let transport = Arc::new(network.create_transport(id.clone(), 64 * 1024));
//!
//!     let node = Arc::new(Node::open(NodeConfig::new("ZeroSync"), transport).await.unwrap());
//!     network.attach(id, node.callbacks()).await;
//!
//!     node.start().await.unwrap();
//!     let _indexing = node.spawn_index_loop();
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `zerosync::core` - Data model (FileRecord, IndexEntry, State, ...)
//! - `zerosync::store` - Store trait, SQLite and in-memory stores
//! - `zerosync::index` - Synchronized root, scanner, indexer
//! - `zerosync::sync` - Callbacks, transport trait, reconciler

pub mod config;
pub mod error;
pub mod node;

// Re-export component crates
pub use zerosync_core as core;
pub use zerosync_index as index;
pub use zerosync_store as store;
pub use zerosync_sync as sync;

pub use config::{Database, NodeConfig};
pub use error::{NodeError, Result};
pub use node::Node;

pub use zerosync_core::{Chunk, FileOperation, FileRecord, IndexEntry, PeerId, State};

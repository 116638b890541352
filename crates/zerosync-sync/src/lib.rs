//! # ZeroSync Sync
//!
//! The reconciliation engine of the ZeroSync client.
//!
//! ## Overview
//!
//! A transport moves log entries and file chunks between peers. It drives
//! the engine through the [`Callbacks`] capability interface, and the
//! engine calls back out through [`Transport`]. [`Reconciler`] implements
//! the callbacks on top of a [`Store`](zerosync_store::Store) and a
//! [`SyncRoot`](zerosync_index::SyncRoot).
//!
//! ## Message Flow
//!
//! ```text
//! Node A                                  Node B
//!   | index cycle -> state N                |
//!   |-------- send_update(N, entries) ----->| pass_update: last writer wins
//!   |<------- request_files(paths, bytes) --|   (one batched request)
//!   | get_chunk(path, size, offset)         |
//!   |-------- chunk ----------------------->| pass_chunk
//!   |          ... until no chunk ...       |
//! ```
//!
//! On connect, [`Callbacks::get_current_state`] and
//! [`Callbacks::get_update`] let a peer catch up from the last state it saw.

pub mod callbacks;
pub mod engine;
pub mod error;
pub mod transport;

pub use callbacks::{Callbacks, PassReport};
pub use engine::{Reconciler, SyncConfig};
pub use error::{Result, SyncError};
pub use transport::{
    memory::MemoryNetwork, memory::MemoryTransport, recording::FileRequest,
    recording::RecordingTransport, Transport,
};

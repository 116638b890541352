//! # ZeroSync Core
//!
//! Pure data model for the ZeroSync client: tracked file records, the
//! append-only change log, and the chunks file content travels in.
//!
//! This crate contains no I/O, no storage, no networking.
//!
//! ## Key Types
//!
//! - [`FileRecord`] - Current known state of one tracked path
//! - [`IndexEntry`] - One immutable change event in the log
//! - [`FileOperation`] - What an entry does (update, rename, delete)
//! - [`State`] - Log generation number
//! - [`Chunk`] - A bounded byte range of a file

pub mod chunk;
pub mod entry;
pub mod error;
pub mod record;
pub mod types;

pub use chunk::Chunk;
pub use entry::{FileOperation, IndexEntry, OpCode};
pub use error::CoreError;
pub use record::{FileField, FileFlag, FileFlags, FileRecord};
pub use types::{Checksum, PeerId, State};

//! # ZeroSync Index
//!
//! The local side of the ZeroSync client: access to the synchronized
//! directory, detection of local changes, and the indexer that turns them
//! into generations of the change log.
//!
//! ## Key Types
//!
//! - [`SyncRoot`] - Sandboxed, per-path locked filesystem access
//! - [`Scanner`] - Flags records whose files were added, modified, moved, or removed
//! - [`Indexer`] - Appends one state's worth of log entries per productive cycle
//!
//! ## Cycle
//!
//! ```text
//! disk ──scan──> records (changed/updated/renamed/deleted)
//!                   │
//!                   └──run_cycle──> log entries @ state N, flags reset
//! ```

pub mod error;
pub mod indexer;
pub mod root;
pub mod scanner;

pub use error::{IndexError, Result};
pub use indexer::{IndexReport, Indexer};
pub use root::{Incoming, Stalled, SyncRoot, STATE_DIR};
pub use scanner::{ScanReport, Scanner, STALL_SCANS};

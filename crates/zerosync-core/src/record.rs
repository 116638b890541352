//! FileRecord: the current known state of one tracked path.
//!
//! Records are created on first observation of a path and mutated on every
//! local or applied-remote change. They are never physically removed; the
//! `deleted` flag marks tombstones.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;
use crate::types::Checksum;

/// Change flags of a record.
///
/// `changed`, `updated`, `renamed`, and `changed_self` are per-cycle flags
/// cleared by the indexer once the change is logged. `deleted` persists as
/// the tombstone marker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFlags {
    /// Local content differs from the last announced state.
    pub changed: bool,
    /// Content was modified.
    pub updated: bool,
    /// Path was moved; the target is in [`FileRecord::new_path`].
    pub renamed: bool,
    /// File is gone (tombstone).
    pub deleted: bool,
    /// The change was received from a peer and must not be re-announced.
    pub changed_self: bool,
}

impl FileFlags {
    /// Flags of a freshly observed or locally modified file.
    pub const fn observed() -> Self {
        Self {
            changed: true,
            updated: true,
            renamed: false,
            deleted: false,
            changed_self: false,
        }
    }

    /// Flags of a file whose content is being written by a peer.
    pub const fn received() -> Self {
        Self {
            changed: true,
            updated: false,
            renamed: false,
            deleted: false,
            changed_self: true,
        }
    }

    pub fn get(&self, flag: FileFlag) -> bool {
        match flag {
            FileFlag::Changed => self.changed,
            FileFlag::Updated => self.updated,
            FileFlag::Renamed => self.renamed,
            FileFlag::Deleted => self.deleted,
            FileFlag::ChangedSelf => self.changed_self,
        }
    }

    pub fn set(&mut self, flag: FileFlag, value: bool) {
        match flag {
            FileFlag::Changed => self.changed = value,
            FileFlag::Updated => self.updated = value,
            FileFlag::Renamed => self.renamed = value,
            FileFlag::Deleted => self.deleted = value,
            FileFlag::ChangedSelf => self.changed_self = value,
        }
    }

    /// Clear the per-cycle flags, keeping the tombstone.
    pub fn reset_cycle(&mut self) {
        self.changed = false;
        self.updated = false;
        self.renamed = false;
        self.changed_self = false;
    }
}

/// Names a single record flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileFlag {
    Changed,
    Updated,
    Renamed,
    Deleted,
    ChangedSelf,
}

impl FileFlag {
    pub const ALL: [FileFlag; 5] = [
        FileFlag::Changed,
        FileFlag::Updated,
        FileFlag::Renamed,
        FileFlag::Deleted,
        FileFlag::ChangedSelf,
    ];

    /// Storage column holding this flag.
    pub const fn column(self) -> &'static str {
        match self {
            FileFlag::Changed => "changed",
            FileFlag::Updated => "updated",
            FileFlag::Renamed => "renamed",
            FileFlag::Deleted => "deleted",
            FileFlag::ChangedSelf => "changed_self",
        }
    }
}

impl fmt::Display for FileFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

impl FromStr for FileFlag {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FileFlag::ALL
            .into_iter()
            .find(|flag| flag.column() == s)
            .ok_or_else(|| CoreError::UnknownFlag(s.to_string()))
    }
}

/// A targeted single-field update of a record.
///
/// Independent subsystems toggle independent fields concurrently, so the
/// store applies these one column at a time instead of rewriting the row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileField {
    Timestamp(i64),
    Checksum(Checksum),
    Size(u64),
    NewPath(Option<String>),
    Reference(u32),
    Flag(FileFlag, bool),
}

impl FileField {
    /// Apply this update to an in-memory record.
    pub fn apply(&self, record: &mut FileRecord) {
        match self {
            FileField::Timestamp(ts) => record.timestamp = *ts,
            FileField::Checksum(checksum) => record.checksum = checksum.clone(),
            FileField::Size(size) => record.size = *size,
            FileField::NewPath(new_path) => record.new_path = new_path.clone(),
            FileField::Reference(reference) => record.reference = *reference,
            FileField::Flag(flag, value) => record.flags.set(*flag, *value),
        }
    }
}

/// Current known state of one tracked path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Path relative to the synchronized root, `/`-separated. Primary key.
    pub path: String,
    /// Last-modified time of the known-good content (Unix ms).
    pub timestamp: i64,
    /// Digest of the content.
    pub checksum: Checksum,
    /// Content length in bytes.
    pub size: u64,
    /// Pending rename target.
    pub new_path: Option<String>,
    /// Opaque versioning counter.
    pub reference: u32,
    pub flags: FileFlags,
}

impl FileRecord {
    /// A record with all flags cleared.
    pub fn new(path: impl Into<String>, timestamp: i64, checksum: Checksum, size: u64) -> Self {
        Self {
            path: path.into(),
            timestamp,
            checksum,
            size,
            new_path: None,
            reference: 0,
            flags: FileFlags::default(),
        }
    }

    /// A record for a path seen locally for the first time.
    pub fn observed(
        path: impl Into<String>,
        timestamp: i64,
        checksum: Checksum,
        size: u64,
    ) -> Self {
        Self::new(path, timestamp, checksum, size).with_flags(FileFlags::observed())
    }

    pub fn with_flags(mut self, flags: FileFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_new_path(mut self, new_path: impl Into<String>) -> Self {
        self.new_path = Some(new_path.into());
        self
    }

    pub fn is_deleted(&self) -> bool {
        self.flags.deleted
    }
}

//! IndexEntry: one immutable change event in the append-only log.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;
use crate::types::{Checksum, State};

/// What a log entry does to its path.
///
/// Each variant carries only the fields relevant to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileOperation {
    /// Content changed; peers fetch it in chunks.
    Update { size: u64, checksum: Checksum },
    /// Path moved to `new_path` within the synchronized root.
    Rename { new_path: String },
    /// Path was removed.
    Delete,
}

impl FileOperation {
    pub fn code(&self) -> OpCode {
        match self {
            FileOperation::Update { .. } => OpCode::Upd,
            FileOperation::Rename { .. } => OpCode::Ren,
            FileOperation::Delete => OpCode::Del,
        }
    }

    /// Rebuild an operation from its flattened storage columns.
    pub fn from_parts(
        code: OpCode,
        size: Option<u64>,
        new_path: Option<String>,
        checksum: Option<Checksum>,
    ) -> Result<Self, CoreError> {
        match code {
            OpCode::Upd => Ok(FileOperation::Update {
                size: size.ok_or(CoreError::MissingField {
                    op: "UPD",
                    field: "size",
                })?,
                checksum: checksum.ok_or(CoreError::MissingField {
                    op: "UPD",
                    field: "checksum",
                })?,
            }),
            OpCode::Ren => Ok(FileOperation::Rename {
                new_path: new_path.ok_or(CoreError::MissingField {
                    op: "REN",
                    field: "new_path",
                })?,
            }),
            OpCode::Del => Ok(FileOperation::Delete),
        }
    }
}

/// Storage tag of a [`FileOperation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpCode {
    Upd,
    Ren,
    Del,
}

impl OpCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            OpCode::Upd => "UPD",
            OpCode::Ren => "REN",
            OpCode::Del => "DEL",
        }
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OpCode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UPD" => Ok(OpCode::Upd),
            "REN" => Ok(OpCode::Ren),
            "DEL" => Ok(OpCode::Del),
            other => Err(CoreError::UnknownOperation(other.to_string())),
        }
    }
}

/// One change event in the log.
///
/// Entries are written only by the indexer and are never updated or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Generation this entry belongs to.
    pub state: State,
    /// Path relative to the synchronized root.
    pub path: String,
    /// Last-modified time the change carries (Unix ms).
    pub timestamp: i64,
    pub operation: FileOperation,
    /// Received from a peer; never handed to peers again.
    pub changed_self: bool,
}

impl IndexEntry {
    pub fn update(
        state: State,
        path: impl Into<String>,
        timestamp: i64,
        size: u64,
        checksum: Checksum,
    ) -> Self {
        Self::with_operation(state, path, timestamp, FileOperation::Update { size, checksum })
    }

    pub fn rename(
        state: State,
        path: impl Into<String>,
        timestamp: i64,
        new_path: impl Into<String>,
    ) -> Self {
        Self::with_operation(
            state,
            path,
            timestamp,
            FileOperation::Rename {
                new_path: new_path.into(),
            },
        )
    }

    pub fn delete(state: State, path: impl Into<String>, timestamp: i64) -> Self {
        Self::with_operation(state, path, timestamp, FileOperation::Delete)
    }

    fn with_operation(
        state: State,
        path: impl Into<String>,
        timestamp: i64,
        operation: FileOperation,
    ) -> Self {
        Self {
            state,
            path: path.into(),
            timestamp,
            operation,
            changed_self: false,
        }
    }

    /// Mark the entry as received from a peer.
    pub fn received(mut self) -> Self {
        self.changed_self = true;
        self
    }

    pub fn code(&self) -> OpCode {
        self.operation.code()
    }

    /// Bytes a peer must fetch to apply this entry.
    pub fn transfer_size(&self) -> u64 {
        match &self.operation {
            FileOperation::Update { size, .. } => *size,
            _ => 0,
        }
    }
}

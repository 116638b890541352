//! Node configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use zerosync_index::STATE_DIR;
use zerosync_sync::SyncConfig;

use crate::error::{NodeError, Result};

/// Where the state store lives.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Database {
    /// `<root>/.zerosync/state.db`, ignored by the scanner.
    #[default]
    InRoot,
    /// An explicit SQLite file.
    Path(PathBuf),
    /// In-memory SQLite; state is lost on exit.
    Memory,
}

/// Configuration for a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// The synchronized directory.
    pub root: PathBuf,
    pub database: Database,
    /// Period of the background index loop.
    pub index_interval: Duration,
    /// Scan the root for local changes before each indexer cycle.
    pub scan_on_index: bool,
    /// Reconciliation engine configuration.
    pub sync: SyncConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("ZeroSync"),
            database: Database::default(),
            index_interval: Duration::from_secs(5),
            scan_on_index: true,
            sync: SyncConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Configuration for a node synchronizing `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::default().with_root(root)
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    pub fn with_database(mut self, database: Database) -> Self {
        self.database = database;
        self
    }

    pub fn with_index_interval(mut self, interval: Duration) -> Self {
        self.index_interval = interval;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.sync.chunk_size = chunk_size;
        self
    }

    pub fn with_scan_on_index(mut self, scan: bool) -> Self {
        self.scan_on_index = scan;
        self
    }

    /// The SQLite file to open, or `None` for an in-memory store.
    pub fn database_path(&self) -> Option<PathBuf> {
        match &self.database {
            Database::InRoot => Some(self.root.join(STATE_DIR).join("state.db")),
            Database::Path(path) => Some(path.clone()),
            Database::Memory => None,
        }
    }

    /// Reject settings the node cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.index_interval.is_zero() {
            return Err(NodeError::Config("index_interval must be positive".into()));
        }
        if self.sync.chunk_size == 0 {
            return Err(NodeError::Config("chunk_size must be positive".into()));
        }
        if self.sync.chunk_size > self.sync.max_chunk_size {
            return Err(NodeError::Config(format!(
                "chunk_size {} exceeds max_chunk_size {}",
                self.sync.chunk_size, self.sync.max_chunk_size
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = NodeConfig::new("/data/sync");
        assert_eq!(config.index_interval, Duration::from_secs(5));
        assert_eq!(config.sync.chunk_size, 64 * 1024);
        assert!(config.scan_on_index);
        assert_eq!(
            config.database_path(),
            Some(PathBuf::from("/data/sync/.zerosync/state.db"))
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let zero = NodeConfig::default().with_index_interval(Duration::ZERO);
        assert!(matches!(zero.validate(), Err(NodeError::Config(_))));

        let huge = NodeConfig::default().with_chunk_size(u64::MAX);
        assert!(matches!(huge.validate(), Err(NodeError::Config(_))));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: NodeConfig =
            serde_json::from_str(r#"{"root": "/srv/share", "database": "memory"}"#).unwrap();

        assert_eq!(config.root, PathBuf::from("/srv/share"));
        assert_eq!(config.database_path(), None);
        assert_eq!(config.sync, SyncConfig::default());
    }
}

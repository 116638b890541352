//! The Node: one synchronized directory, its store, and its engine.
//!
//! A single store handle is created here and shared by the scanner, the
//! indexer, and the reconciliation engine.

use std::sync::{Arc, Weak};

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use zerosync_index::{IndexReport, Indexer, ScanReport, Scanner, SyncRoot};
use zerosync_store::{ReportExt, SqliteStore, Store};
use zerosync_sync::{Callbacks, Reconciler, Transport};

use crate::config::NodeConfig;
use crate::error::{NodeError, Result};

/// A running ZeroSync client.
pub struct Node<S, T> {
    config: NodeConfig,
    store: Arc<S>,
    scanner: Scanner<S>,
    indexer: Indexer<S>,
    reconciler: Arc<Reconciler<S, T>>,
}

impl<T: Transport + 'static> Node<SqliteStore, T> {
    /// Open the node described by `config`, creating the root and the
    /// state store as needed.
    pub async fn open(config: NodeConfig, transport: Arc<T>) -> Result<Self> {
        config.validate()?;
        create_dir(&config.root).await?;

        let store = match config.database_path() {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    create_dir(parent).await?;
                }
                SqliteStore::open(&path)?
            }
            None => SqliteStore::open_memory()?,
        };

        Self::with_store(config, Arc::new(store), transport).await
    }
}

impl<S, T> Node<S, T>
where
    S: Store + 'static,
    T: Transport + 'static,
{
    /// Build a node around an existing store.
    pub async fn with_store(config: NodeConfig, store: Arc<S>, transport: Arc<T>) -> Result<Self> {
        config.validate()?;

        let root = SyncRoot::new(config.root.clone());
        let scanner = Scanner::new(store.clone(), root.clone());
        let indexer = Indexer::new(store.clone()).await?;
        let reconciler = Arc::new(Reconciler::new(
            store.clone(),
            root,
            transport,
            config.sync.clone(),
        ));

        tracing::info!(
            root = %config.root.display(),
            next_state = %indexer.next_state().await,
            "node ready"
        );

        Ok(Self {
            config,
            store,
            scanner,
            indexer,
            reconciler,
        })
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn reconciler(&self) -> &Arc<Reconciler<S, T>> {
        &self.reconciler
    }

    /// The callbacks a transport should drive for this node.
    pub fn callbacks(&self) -> Weak<dyn Callbacks> {
        Arc::downgrade(&self.reconciler) as Weak<dyn Callbacks>
    }

    /// Start the transport.
    pub async fn start(&self) -> Result<()> {
        self.reconciler.start().await.map_err(NodeError::from)
    }

    /// Scan the root for local changes without indexing them.
    pub async fn scan(&self) -> Result<ScanReport> {
        Ok(self.scanner.scan().await?)
    }

    /// One index tick: scan (if enabled), run an indexer cycle, and announce
    /// the new generation if one was written.
    pub async fn index_once(&self) -> IndexReport {
        if self.config.scan_on_index {
            self.scanner.scan().await.or_report("scan");
        }

        let report = self.indexer.run_cycle().await;
        if let Some(state) = report.state {
            self.reconciler.synchronize_update(state).await;
        }
        report
    }

    /// Run [`index_once`](Self::index_once) every `index_interval` until the
    /// task is aborted.
    pub fn spawn_index_loop(self: &Arc<Self>) -> JoinHandle<()> {
        let node = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(node.config.index_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                node.index_once().await;
            }
        })
    }
}

async fn create_dir(path: &std::path::Path) -> Result<()> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|source| NodeError::Setup {
            path: path.to_path_buf(),
            source,
        })
}

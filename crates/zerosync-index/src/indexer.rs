//! The indexer: promotes flagged records into log entries.
//!
//! One cycle reads every record with `changed` set and appends the entries
//! describing it under a single state. The counter advances only after a
//! cycle that wrote something, so every generation in the log is non-empty
//! and consecutive.

use std::sync::Arc;

use tokio::sync::Mutex;

use zerosync_core::{FileRecord, IndexEntry, State};
use zerosync_store::{ReportExt, Store};

use crate::error::Result;

/// Outcome of one indexer cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexReport {
    /// The state the entries were written under, if any were written.
    pub state: Option<State>,
    /// Entries appended this cycle, in append order.
    pub entries: Vec<IndexEntry>,
    /// Changed records skipped because the change came from a peer.
    pub received: usize,
}

impl IndexReport {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Writes the change log.
///
/// Cycles are serialized; the counter lives behind the same lock.
pub struct Indexer<S> {
    store: Arc<S>,
    next: Mutex<State>,
}

impl<S: Store> Indexer<S> {
    /// Create an indexer continuing after the store's latest state.
    pub async fn new(store: Arc<S>) -> Result<Self> {
        let latest = store.latest_state().await?;
        Ok(Self {
            store,
            next: Mutex::new(latest.next()),
        })
    }

    /// The state the next productive cycle will write.
    pub async fn next_state(&self) -> State {
        *self.next.lock().await
    }

    /// Run one cycle.
    ///
    /// Store failures are reported and degrade to "no effect". The change
    /// flags are reset at the end whether or not anything was written.
    pub async fn run_cycle(&self) -> IndexReport {
        let mut next = self.next.lock().await;
        let state = *next;

        let mut report = IndexReport::default();
        let records = self.store.changed_records().await.or_report("changed_records");

        for record in &records {
            if record.flags.changed_self {
                report.received += 1;
                continue;
            }

            for entry in entries_for(state, record) {
                if self
                    .store
                    .append_index_entry(&entry)
                    .await
                    .reported("append_index_entry")
                    .is_some()
                {
                    report.entries.push(entry);
                }
            }
        }

        if !report.entries.is_empty() {
            report.state = Some(state);
            *next = state.next();
            tracing::info!(
                state = %state,
                entries = report.entries.len(),
                "indexed local changes"
            );
        }

        self.store.reset_change_flags().await.or_report("reset_change_flags");
        report
    }
}

/// Entries describing one changed record, in the order peers apply them.
fn entries_for(state: State, record: &FileRecord) -> Vec<IndexEntry> {
    let mut entries = Vec::new();
    let flags = record.flags;

    if flags.updated {
        entries.push(IndexEntry::update(
            state,
            &record.path,
            record.timestamp,
            record.size,
            record.checksum.clone(),
        ));
    }

    match (&record.new_path, flags.renamed) {
        (Some(new_path), true) => {
            entries.push(IndexEntry::rename(state, &record.path, record.timestamp, new_path));
        }
        _ if flags.deleted => {
            entries.push(IndexEntry::delete(state, &record.path, record.timestamp));
        }
        _ => {}
    }

    entries
}

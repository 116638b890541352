//! Local change detection.
//!
//! The scanner compares the synchronized directory against the tracked
//! records and sets the change flags the [`Indexer`](crate::Indexer)
//! consumes. It never writes the log itself.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use walkdir::WalkDir;

use zerosync_core::{Checksum, FileField, FileFlag, FileFlags, FileRecord};
use zerosync_store::{ReportExt, Store, StoreExt};

use crate::error::{IndexError, Result};
use crate::root::{unix_millis, Stalled, SyncRoot, STATE_DIR};

/// What one scan found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub added: usize,
    pub modified: usize,
    pub deleted: usize,
    pub renamed: usize,
    /// Entries the walk could not read, plus symlinks.
    pub skipped: usize,
    /// Files whose content was read and hashed.
    pub hashed: usize,
}

impl ScanReport {
    pub fn is_empty(&self) -> bool {
        self.added + self.modified + self.deleted + self.renamed == 0
    }
}

#[derive(Debug)]
struct Observed {
    path: String,
    size: u64,
    mtime: i64,
}

/// Scans a transfer may go without a chunk before it is given up.
pub const STALL_SCANS: u32 = 3;

/// Walks the synchronized root and flags what changed since the last scan.
pub struct Scanner<S> {
    store: Arc<S>,
    root: SyncRoot,
}

impl<S: Store> Scanner<S> {
    pub fn new(store: Arc<S>, root: SyncRoot) -> Self {
        Self { store, root }
    }

    /// Scan the root once.
    ///
    /// Fails only if the root itself cannot be walked or the tracked records
    /// cannot be read. Per-file failures are reported and skipped.
    pub async fn scan(&self) -> Result<ScanReport> {
        for stalled in self.root.age_incoming(STALL_SCANS) {
            self.abandon(stalled).await;
        }

        let base = self.root.base().to_path_buf();
        let (observed, skipped) = tokio::task::spawn_blocking(move || walk_root(&base)).await??;

        let records: BTreeMap<String, FileRecord> = self
            .store
            .all_records()
            .await?
            .into_iter()
            .map(|r| (r.path.clone(), r))
            .collect();

        let mut report = ScanReport {
            skipped,
            ..ScanReport::default()
        };
        let mut present = HashSet::with_capacity(observed.len());
        let mut fresh = Vec::new();

        for file in observed {
            present.insert(file.path.clone());
            if self.root.is_incoming(&file.path) {
                continue;
            }

            let known = records.get(&file.path);
            if let Some(record) = known {
                if !record.flags.deleted
                    && record.size == file.size
                    && record.timestamp == file.mtime
                {
                    continue;
                }
            }

            let Some((checksum, size)) = self
                .root
                .checksum(&file.path)
                .await
                .reported("scan_checksum")
                .flatten()
            else {
                continue;
            };
            report.hashed += 1;

            match known {
                Some(record) => {
                    if !record.flags.deleted && record.checksum == checksum && record.size == size {
                        continue;
                    }
                    self.modified(record, file.mtime, &checksum, size).await;
                    report.modified += 1;
                }
                None => fresh.push((file.path, file.mtime, checksum, size)),
            }
        }

        // Tracked, live, and gone from disk
        let mut vanished: HashMap<Checksum, Vec<&FileRecord>> = HashMap::new();
        for record in records.values() {
            if record.flags.deleted
                || present.contains(&record.path)
                || self.root.is_incoming(&record.path)
            {
                continue;
            }
            vanished.entry(record.checksum.clone()).or_default().push(record);
        }

        for (path, mtime, checksum, size) in fresh {
            let origin = if checksum.is_zero() {
                None
            } else {
                vanished.get_mut(&checksum).and_then(Vec::pop)
            };

            // A moved file is announced by the REN of its origin alone
            let flags = match origin {
                Some(origin) => {
                    self.renamed(&origin.path, &path).await;
                    report.renamed += 1;
                    FileFlags::default()
                }
                None => FileFlags::observed(),
            };

            let record = FileRecord::new(path, mtime, checksum, size).with_flags(flags);
            self.store
                .insert_file_record(&record)
                .await
                .or_report("insert_file_record");
            report.added += 1;
        }

        for record in vanished.into_values().flatten() {
            self.store.set_flag(&record.path, FileFlag::Deleted, true).await.or_report("set_deleted");
            self.store.set_flag(&record.path, FileFlag::Changed, true).await.or_report("set_changed");
            report.deleted += 1;
        }

        if !report.is_empty() {
            tracing::debug!(
                added = report.added,
                modified = report.modified,
                deleted = report.deleted,
                renamed = report.renamed,
                "scan found changes"
            );
        }

        Ok(report)
    }

    async fn modified(&self, record: &FileRecord, mtime: i64, checksum: &Checksum, size: u64) {
        let path = record.path.as_str();
        self.store
            .update_file_metadata(path, mtime, checksum, size)
            .await
            .or_report("update_file_metadata");
        if record.flags.deleted {
            self.store.set_flag(path, FileFlag::Deleted, false).await.or_report("set_deleted");
        }
        self.store.set_flag(path, FileFlag::Changed, true).await.or_report("set_changed");
        self.store.set_flag(path, FileFlag::Updated, true).await.or_report("set_updated");
    }

    /// Give up on a transfer that stopped making progress.
    ///
    /// If the file still carries the mtime of the last chunk write, nobody
    /// touched it since and the partial content is recorded as received.
    /// Otherwise the file is left to the regular comparison, so a local edit
    /// made meanwhile is picked up as one.
    async fn abandon(&self, stalled: Stalled) {
        let path = stalled.path.as_str();
        tracing::warn!(
            path,
            expected_size = stalled.incoming.size,
            "giving up on stalled transfer"
        );

        let Some(written) = stalled.written else {
            return;
        };
        let on_disk = self.root.modified(path).await.reported("stat").flatten();
        if on_disk != Some(written) {
            return;
        }

        let Some((checksum, size)) = self.root.checksum(path).await.reported("checksum").flatten()
        else {
            return;
        };
        let known = self.store.file_record(path).await.or_report("file_record");
        if known.is_some() {
            self.store
                .update_file_metadata(path, written, &checksum, size)
                .await
                .or_report("update_file_metadata");
            self.store.set_flag(path, FileFlag::Deleted, false).await.or_report("set_deleted");
        } else {
            let record = FileRecord::new(path, written, checksum, size);
            self.store.insert_file_record(&record).await.or_report("insert_file_record");
        }
    }

    /// Turn a vanished record into a rename tombstone pointing at `to`.
    async fn renamed(&self, from: &str, to: &str) {
        self.store
            .update_file_field(from, FileField::NewPath(Some(to.to_string())))
            .await
            .or_report("set_new_path");
        for flag in [FileFlag::Renamed, FileFlag::Deleted, FileFlag::Changed] {
            self.store.set_flag(from, flag, true).await.or_report("set_renamed");
        }
    }
}

/// Walk `root` and collect regular files with root-relative `/` paths.
fn walk_root(root: &Path) -> Result<(Vec<Observed>, usize)> {
    if !root.is_dir() {
        return Err(IndexError::io(
            "walk",
            root,
            std::io::Error::new(std::io::ErrorKind::NotFound, "root is not a directory"),
        ));
    }

    let mut files = Vec::new();
    let mut skipped = 0usize;

    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| !(e.depth() == 1 && e.file_name() == STATE_DIR));

    for result in walker {
        let entry = match result {
            Ok(e) => e,
            Err(_) => {
                skipped += 1;
                continue;
            }
        };

        if entry.file_type().is_symlink() {
            skipped += 1;
            continue;
        }
        if !entry.file_type().is_file() {
            continue;
        }

        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(_) => {
                skipped += 1;
                continue;
            }
        };

        let Ok(relative) = entry.path().strip_prefix(root) else {
            skipped += 1;
            continue;
        };
        let path = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        files.push(Observed {
            path,
            size: metadata.len(),
            mtime: metadata.modified().map(unix_millis).unwrap_or(0),
        });
    }

    Ok((files, skipped))
}

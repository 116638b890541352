//! Sandboxed access to the synchronized directory.
//!
//! Every path the client touches is relative to one root directory. The
//! scanner and the reconciliation engine share a [`SyncRoot`] so that a
//! rename or chunk write from a peer never interleaves with a local read of
//! the same path.

use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use tokio::sync::{Mutex as PathMutex, OwnedMutexGuard};

use zerosync_core::{Checksum, IndexEntry};

use crate::error::{IndexError, Result};

/// Directory inside the root reserved for client state (the database).
pub const STATE_DIR: &str = ".zerosync";

/// Content a peer announced for a path whose chunks are still arriving.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Incoming {
    pub timestamp: i64,
    pub size: u64,
    pub checksum: Checksum,
}

impl Incoming {
    /// Expectation for an accepted update entry. `None` for rename/delete.
    pub fn from_entry(entry: &IndexEntry) -> Option<Self> {
        match &entry.operation {
            zerosync_core::FileOperation::Update { size, checksum } => Some(Self {
                timestamp: entry.timestamp,
                size: *size,
                checksum: checksum.clone(),
            }),
            _ => None,
        }
    }
}

/// A transfer that stopped making progress, as handed back by
/// [`SyncRoot::age_incoming`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stalled {
    pub path: String,
    pub incoming: Incoming,
    /// Modification time the last chunk write left on disk, if any chunk
    /// was written.
    pub written: Option<i64>,
}

#[derive(Debug)]
struct Pending {
    incoming: Incoming,
    idle_scans: u32,
    written: Option<i64>,
}

/// Handle to the synchronized directory. Cheap to clone; clones share locks.
#[derive(Clone)]
pub struct SyncRoot {
    base: Arc<PathBuf>,
    locks: Arc<Mutex<HashMap<String, Arc<PathMutex<()>>>>>,
    incoming: Arc<Mutex<HashMap<String, Pending>>>,
}

impl SyncRoot {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self {
            base: Arc::new(base.into()),
            locks: Arc::new(Mutex::new(HashMap::new())),
            incoming: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Map a root-relative path onto the filesystem.
    ///
    /// Rejects empty and absolute paths, `..` components, and anything
    /// inside [`STATE_DIR`].
    pub fn resolve(&self, rel: &str) -> Result<PathBuf> {
        let mut resolved = self.base.to_path_buf();
        let mut depth = 0usize;

        for component in Path::new(rel).components() {
            match component {
                Component::Normal(part) => {
                    if depth == 0 && part == STATE_DIR {
                        return Err(IndexError::PathEscape(rel.to_string()));
                    }
                    resolved.push(part);
                    depth += 1;
                }
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(IndexError::PathEscape(rel.to_string()));
                }
            }
        }

        if depth == 0 {
            return Err(IndexError::PathEscape(rel.to_string()));
        }
        Ok(resolved)
    }

    /// Acquire the advisory lock of a path.
    ///
    /// Held for the duration of one filesystem operation, never across a
    /// store call or a transport call.
    pub async fn lock(&self, rel: &str) -> OwnedMutexGuard<()> {
        let mutex = {
            let mut table = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            // Drop entries nobody holds so the table tracks live paths only
            if table.len() > 256 {
                table.retain(|_, m| Arc::strong_count(m) > 1);
            }
            table.entry(rel.to_string()).or_default().clone()
        };
        mutex.lock_owned().await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Transfers in progress
    // ─────────────────────────────────────────────────────────────────────────

    /// Record that `rel` is being rewritten by a peer.
    pub fn expect(&self, rel: &str, incoming: Incoming) {
        let pending = Pending {
            incoming,
            idle_scans: 0,
            written: None,
        };
        self.incoming_table().insert(rel.to_string(), pending);
    }

    /// The pending expectation for `rel`, if any.
    pub fn incoming(&self, rel: &str) -> Option<Incoming> {
        self.incoming_table().get(rel).map(|p| p.incoming.clone())
    }

    pub fn is_incoming(&self, rel: &str) -> bool {
        self.incoming_table().contains_key(rel)
    }

    /// Finish the transfer of `rel`, returning what was expected.
    pub fn settle(&self, rel: &str) -> Option<Incoming> {
        self.incoming_table().remove(rel).map(|p| p.incoming)
    }

    /// Count one scan against every open transfer and drop those that have
    /// seen no chunk written for `limit` scans in a row.
    pub fn age_incoming(&self, limit: u32) -> Vec<Stalled> {
        let mut table = self.incoming_table();
        for pending in table.values_mut() {
            pending.idle_scans += 1;
        }

        let stalled: Vec<String> = table
            .iter()
            .filter(|(_, p)| p.idle_scans >= limit)
            .map(|(path, _)| path.clone())
            .collect();

        stalled
            .into_iter()
            .filter_map(|path| {
                table.remove(&path).map(|p| Stalled {
                    path,
                    incoming: p.incoming,
                    written: p.written,
                })
            })
            .collect()
    }

    fn progressed(&self, rel: &str, written: Option<i64>) {
        if let Some(pending) = self.incoming_table().get_mut(rel) {
            pending.idle_scans = 0;
            pending.written = written;
        }
    }

    fn incoming_table(&self) -> std::sync::MutexGuard<'_, HashMap<String, Pending>> {
        self.incoming.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Filesystem operations
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn exists(&self, rel: &str) -> Result<bool> {
        let path = self.resolve(rel)?;
        let _guard = self.lock(rel).await;
        tokio::fs::try_exists(&path)
            .await
            .map_err(|e| IndexError::io("stat", &path, e))
    }

    /// Move `from` to `to`, creating parent directories of `to`.
    ///
    /// Returns `false` if `from` does not exist.
    pub async fn rename(&self, from: &str, to: &str) -> Result<bool> {
        let source = self.resolve(from)?;
        let target = self.resolve(to)?;
        if source == target {
            return self.exists(from).await;
        }

        // Fixed acquisition order so two opposite renames cannot deadlock
        let (first, second) = if from < to { (from, to) } else { (to, from) };
        let _first = self.lock(first).await;
        let _second = self.lock(second).await;

        if !tokio::fs::try_exists(&source)
            .await
            .map_err(|e| IndexError::io("stat", &source, e))?
        {
            return Ok(false);
        }

        create_parent(&target).await?;
        tokio::fs::rename(&source, &target)
            .await
            .map_err(|e| IndexError::io("rename", &source, e))?;
        Ok(true)
    }

    /// Delete the file at `rel`. Returns `false` if there was nothing to delete.
    pub async fn remove(&self, rel: &str) -> Result<bool> {
        let path = self.resolve(rel)?;
        let _guard = self.lock(rel).await;

        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(IndexError::io("remove", &path, e)),
        }
    }

    /// Read up to `len` bytes at `offset`.
    ///
    /// Returns `None` when nothing could be read: past end of file, empty
    /// file, or no file at all.
    pub async fn read_chunk(&self, rel: &str, offset: u64, len: usize) -> Result<Option<Bytes>> {
        let path = self.resolve(rel)?;
        let _guard = self.lock(rel).await;

        tokio::task::spawn_blocking(move || read_at(&path, offset, len)).await?
    }

    /// Write `data` at `offset`, creating the file and its parents if needed.
    ///
    /// Writing the same bytes at the same offset twice leaves the same content.
    pub async fn write_chunk(&self, rel: &str, offset: u64, data: Bytes) -> Result<()> {
        let path = self.resolve(rel)?;
        let _guard = self.lock(rel).await;

        create_parent(&path).await?;
        let written = tokio::task::spawn_blocking(move || write_at(&path, offset, &data)).await??;
        self.progressed(rel, written);
        Ok(())
    }

    /// Create or truncate `rel` to an empty file.
    pub async fn create_empty(&self, rel: &str) -> Result<()> {
        let path = self.resolve(rel)?;
        let _guard = self.lock(rel).await;

        create_parent(&path).await?;
        tokio::fs::File::create(&path)
            .await
            .map(drop)
            .map_err(|e| IndexError::io("create", &path, e))
    }

    /// Blake3 checksum and size of the file at `rel`, `None` if absent.
    pub async fn checksum(&self, rel: &str) -> Result<Option<(Checksum, u64)>> {
        let path = self.resolve(rel)?;
        let _guard = self.lock(rel).await;

        tokio::task::spawn_blocking(move || hash_file(&path)).await?
    }

    /// Modification time of `rel` in Unix milliseconds, `None` if absent.
    pub async fn modified(&self, rel: &str) -> Result<Option<i64>> {
        let path = self.resolve(rel)?;
        let _guard = self.lock(rel).await;

        match tokio::fs::metadata(&path).await {
            Ok(metadata) => Ok(metadata.modified().ok().map(unix_millis)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(IndexError::io("stat", &path, e)),
        }
    }

    /// Set the modification time of `rel` to `timestamp` (Unix ms).
    ///
    /// Returns `false` if the file is absent or the timestamp predates the
    /// epoch.
    pub async fn set_modified(&self, rel: &str, timestamp: i64) -> Result<bool> {
        let path = self.resolve(rel)?;
        let Ok(millis) = u64::try_from(timestamp) else {
            return Ok(false);
        };
        let _guard = self.lock(rel).await;

        tokio::task::spawn_blocking(move || {
            let file = match std::fs::OpenOptions::new().write(true).open(&path) {
                Ok(file) => file,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
                Err(e) => return Err(IndexError::io("open", &path, e)),
            };
            file.set_modified(UNIX_EPOCH + Duration::from_millis(millis))
                .map_err(|e| IndexError::io("set_modified", &path, e))?;
            Ok(true)
        })
        .await?
    }
}

/// Milliseconds since the Unix epoch; 0 for earlier times.
pub(crate) fn unix_millis(time: SystemTime) -> i64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

async fn create_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| IndexError::io("create_dir", parent, e))?;
    }
    Ok(())
}

fn read_at(path: &Path, offset: u64, len: usize) -> Result<Option<Bytes>> {
    let mut file = match std::fs::File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(IndexError::io("open", path, e)),
    };

    file.seek(SeekFrom::Start(offset))
        .map_err(|e| IndexError::io("seek", path, e))?;

    let mut buf = Vec::with_capacity(len);
    file.take(len as u64)
        .read_to_end(&mut buf)
        .map_err(|e| IndexError::io("read", path, e))?;

    if buf.is_empty() {
        Ok(None)
    } else {
        Ok(Some(Bytes::from(buf)))
    }
}

/// Returns the modification time the write left behind.
fn write_at(path: &Path, offset: u64, data: &[u8]) -> Result<Option<i64>> {
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .map_err(|e| IndexError::io("open", path, e))?;

    file.seek(SeekFrom::Start(offset))
        .map_err(|e| IndexError::io("seek", path, e))?;
    file.write_all(data)
        .map_err(|e| IndexError::io("write", path, e))?;
    file.flush().map_err(|e| IndexError::io("flush", path, e))?;
    Ok(file.metadata().and_then(|m| m.modified()).ok().map(unix_millis))
}

pub(crate) fn hash_file(path: &Path) -> Result<Option<(Checksum, u64)>> {
    let mut file = match std::fs::File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(IndexError::io("open", path, e)),
    };

    let mut hasher = blake3::Hasher::new();
    let size = std::io::copy(&mut file, &mut hasher).map_err(|e| IndexError::io("read", path, e))?;
    Ok(Some((Checksum::from_hash(hasher.finalize()), size)))
}

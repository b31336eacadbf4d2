//! Per-path mutual exclusion for cache files.
//!
//! Every read and write of a cached artifact goes through a [`CacheGuard`]
//! obtained from the [`KeyedLockRegistry`], keyed by the artifact's absolute
//! path. Operations on the same path are strictly serialized; operations on
//! different paths never contend.
//!
//! # Reclamation
//!
//! Locks are created lazily and cached. [`KeyedLockRegistry::reclaim_idle`]
//! drops entries whose `Arc` is held only by the registry. Acquirers clone
//! the `Arc` while holding the map shard, and `retain` inspects each entry
//! under the same shard lock, so an entry that is held, awaited, or being
//! handed out can never be observed with a strong count of one.

use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::trace;

use super::CacheError;

/// Suffix of the sibling file a write goes to before it is renamed in place.
pub(crate) const PARTIAL_SUFFIX: &str = ".part";

/// Registry mapping cache paths to their locks.
///
/// # Example
///
/// ```ignore
/// let locks = KeyedLockRegistry::new();
/// let guard = locks.acquire(Path::new("/cache/manifest/manifest_0_1.json")).await;
/// guard.write(b"[]").await?;
/// // Lock released when `guard` is dropped
/// ```
#[derive(Debug, Default)]
pub struct KeyedLockRegistry {
    locks: DashMap<PathBuf, Arc<Mutex<()>>>,
}

impl KeyedLockRegistry {
    pub fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    /// Get or create the lock for a path.
    pub fn lock_for(&self, path: &Path) -> Arc<Mutex<()>> {
        self.locks
            .entry(normalize_key(path))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Acquire exclusive access to a cache path.
    ///
    /// Waits until every earlier holder of the same path has dropped its
    /// guard. The returned guard can be held across await points.
    pub async fn acquire(&self, path: &Path) -> CacheGuard {
        let key = normalize_key(path);
        let lock = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        trace!(path = %key.display(), "Waiting for cache lock");
        let guard = lock.lock_owned().await;
        CacheGuard { path: key, _guard: guard }
    }

    /// Whether a lock is currently registered for this path.
    pub fn contains(&self, path: &Path) -> bool {
        self.locks.contains_key(&normalize_key(path))
    }

    /// Remove locks that are neither held nor awaited.
    ///
    /// Returns the number of entries removed.
    pub fn reclaim_idle(&self) -> usize {
        let mut removed = 0;
        self.locks.retain(|_, lock| {
            let in_use = Arc::strong_count(lock) > 1;
            if !in_use {
                removed += 1;
            }
            in_use
        });
        removed
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Normalize a cache path into its lock key.
///
/// Relative paths are made absolute against the working directory. Paths are
/// not canonicalized: the target file usually does not exist yet, and a key
/// must not change once the file appears.
fn normalize_key(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Exclusive access to one cache path.
///
/// The lock is released when the guard is dropped, including on error paths
/// and when the owning task is cancelled.
#[derive(Debug)]
pub struct CacheGuard {
    path: PathBuf,
    _guard: OwnedMutexGuard<()>,
}

impl CacheGuard {
    /// The normalized path this guard protects.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a regular file currently exists at the guarded path.
    pub async fn exists(&self) -> bool {
        tokio::fs::metadata(&self.path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
    }

    /// Read the whole guarded file.
    pub async fn read(&self) -> Result<Vec<u8>, CacheError> {
        tokio::fs::read(&self.path)
            .await
            .map_err(|e| CacheError::io(&self.path, e))
    }

    /// Replace the guarded file's content.
    ///
    /// The parent directory is created if missing. Data is written to a
    /// sibling `.part` file and renamed over the target.
    pub async fn write(&self, bytes: &[u8]) -> Result<(), CacheError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CacheError::io(parent, e))?;
        }

        let partial = self.partial_path()?;
        if let Err(e) = tokio::fs::write(&partial, bytes).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(CacheError::io(&partial, e));
        }
        if let Err(e) = tokio::fs::rename(&partial, &self.path).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(CacheError::io(&self.path, e));
        }
        trace!(path = %self.path.display(), bytes = bytes.len(), "Wrote cache file");
        Ok(())
    }

    /// Delete the guarded file. A missing file is not an error.
    pub async fn remove(&self) -> Result<(), CacheError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::io(&self.path, e)),
        }
    }

    fn partial_path(&self) -> Result<PathBuf, CacheError> {
        let file_name = self.path.file_name().ok_or_else(|| CacheError::InvalidPath {
            path: self.path.clone(),
        })?;
        let mut partial = file_name.to_os_string();
        partial.push(PARTIAL_SUFFIX);
        Ok(self.path.with_file_name(partial))
    }
}

//! Cache wiping.
//!
//! Removes every cached file under a root, taking each file's cache lock
//! before deleting it, then drops lock registry entries that went idle.

use std::path::{Path, PathBuf};

use futures::future::join_all;
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use super::CacheError;
use super::locks::{KeyedLockRegistry, PARTIAL_SUFFIX};

/// Outcome of a cleanup pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Files deleted.
    pub removed: usize,
    /// Files that could not be deleted (logged individually).
    pub failed: usize,
    /// Idle lock registry entries dropped afterwards.
    pub reclaimed_locks: usize,
}

/// Delete every file below `root`.
///
/// A file that is being written is only deleted after its writer releases
/// the lock. An in-flight `.part` file is locked under the key of the file
/// it will be renamed to. Individual failures are logged and counted; a
/// missing root yields an empty report.
#[instrument(level = "info", skip_all, fields(root = %root.display()))]
pub async fn cleanup(root: &Path, locks: &KeyedLockRegistry) -> Result<CleanupReport, CacheError> {
    let scan_root = root.to_path_buf();
    let files = tokio::task::spawn_blocking(move || collect_files(&scan_root)).await?;

    let outcomes = join_all(files.iter().map(|file| delete_file(file, locks))).await;

    let mut report = CleanupReport::default();
    for (file, outcome) in files.iter().zip(outcomes) {
        match outcome {
            Ok(()) => report.removed += 1,
            Err(e) => {
                warn!(path = %file.display(), error = %e, "Failed to delete cached file");
                report.failed += 1;
            }
        }
    }

    report.reclaimed_locks = locks.reclaim_idle();
    info!(
        removed = report.removed,
        failed = report.failed,
        reclaimed_locks = report.reclaimed_locks,
        "Cleaned cache directory"
    );
    Ok(report)
}

fn collect_files(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .collect()
}

async fn delete_file(file: &Path, locks: &KeyedLockRegistry) -> Result<(), CacheError> {
    let key = lock_key_for(file);
    let _guard = locks.acquire(&key).await;
    debug!(path = %file.display(), "Deleting cached file");
    match tokio::fs::remove_file(file).await {
        Ok(()) => Ok(()),
        // Renamed away by a writer that finished while we waited.
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(CacheError::io(file, e)),
    }
}

fn lock_key_for(file: &Path) -> PathBuf {
    file.file_name()
        .and_then(|name| name.to_str())
        .and_then(|name| name.strip_suffix(PARTIAL_SUFFIX))
        .map_or_else(|| file.to_path_buf(), |target| file.with_file_name(target))
}

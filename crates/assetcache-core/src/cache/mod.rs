//! Local cache infrastructure: per-path locking, layout and cleanup.

pub mod cleaner;
pub mod layout;
pub mod locks;

use std::path::PathBuf;

use thiserror::Error;

pub use cleaner::{CleanupReport, cleanup};
pub use layout::{AUDIO_EXTENSION, BUNDLE_EXTENSION, CacheLayout, asset_extension};
pub use locks::{CacheGuard, KeyedLockRegistry};

/// Errors raised while touching cached files.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("I/O error on cache file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cache path has no file name: {}", .path.display())]
    InvalidPath { path: PathBuf },

    #[error("Cache scan task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CacheError::Io {
            path: path.into(),
            source,
        }
    }
}

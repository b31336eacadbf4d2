//! Caching manifest store.
//!
//! A manifest for `(version, platform)` is fetched at most once and then
//! served from `manifest/manifest_<platform>_<version>.json` until a caller
//! forces a refresh.
//!
//! The cache-key guard is acquired before the existence check and held until
//! the cache file is written. Concurrent or back-to-back callers for the same
//! key therefore wait for the first writer and then hit the cache.

use std::sync::Arc;

use tracing::{Instrument, debug, instrument, warn};

use super::ManifestError;
use super::codec::{self, CodecError};
use super::record::ManifestSnapshot;
use crate::cache::{CacheGuard, CacheLayout, KeyedLockRegistry};
use crate::fetch::AssetSource;
use crate::platform::Platform;

pub struct ManifestStore {
    source: Arc<dyn AssetSource>,
    layout: CacheLayout,
    locks: Arc<KeyedLockRegistry>,
}

impl ManifestStore {
    pub fn new(
        source: Arc<dyn AssetSource>,
        layout: CacheLayout,
        locks: Arc<KeyedLockRegistry>,
    ) -> Self {
        Self {
            source,
            layout,
            locks,
        }
    }

    pub fn layout(&self) -> &CacheLayout {
        &self.layout
    }

    /// Asset names of a manifest, in manifest order.
    ///
    /// On a miss the cache file is written by a background task that owns
    /// the cache-key lock, so this returns as soon as the manifest is
    /// decoded. A failed background write is logged and the next call
    /// fetches again.
    #[instrument(level = "debug", skip(self), fields(platform = %platform))]
    pub async fn get_manifest(
        &self,
        version: u64,
        platform: Platform,
        force: bool,
    ) -> Result<Vec<String>, ManifestError> {
        let guard = self
            .locks
            .acquire(&self.layout.manifest_path(platform, version))
            .await;

        if !force && let Some(snapshot) = read_cached(&guard).await? {
            return Ok(snapshot.names());
        }

        let snapshot = self.fetch_snapshot(version, platform).await?;
        let bytes = codec::serialize(&snapshot)?;

        tokio::spawn(
            async move {
                if let Err(e) = guard.write(&bytes).await {
                    warn!(error = %e, "Background manifest write failed");
                }
            }
            .in_current_span(),
        );

        Ok(snapshot.names())
    }

    /// Like [`get_manifest`](Self::get_manifest), but the cache file is
    /// written before returning.
    pub async fn get_manifest_blocking(
        &self,
        version: u64,
        platform: Platform,
        force: bool,
    ) -> Result<Vec<String>, ManifestError> {
        self.snapshot(version, platform, force)
            .await
            .map(|snapshot| snapshot.names())
    }

    /// Full manifest records, persisted before returning.
    #[instrument(level = "debug", skip(self), fields(platform = %platform))]
    pub async fn snapshot(
        &self,
        version: u64,
        platform: Platform,
        force: bool,
    ) -> Result<ManifestSnapshot, ManifestError> {
        let guard = self
            .locks
            .acquire(&self.layout.manifest_path(platform, version))
            .await;

        if !force && let Some(snapshot) = read_cached(&guard).await? {
            return Ok(snapshot);
        }

        let snapshot = self.fetch_snapshot(version, platform).await?;
        guard.write(&codec::serialize(&snapshot)?).await?;
        Ok(snapshot)
    }

    /// Wait until any in-flight background write of this manifest finished.
    pub async fn flush(&self, version: u64, platform: Platform) {
        drop(
            self.locks
                .acquire(&self.layout.manifest_path(platform, version))
                .await,
        );
    }

    async fn fetch_snapshot(
        &self,
        version: u64,
        platform: Platform,
    ) -> Result<ManifestSnapshot, ManifestError> {
        debug!(version, %platform, "Fetching manifest from upstream");
        let raw = self.source.fetch_manifest(version, platform).await?;
        let snapshot = codec::decode(&raw)?;
        debug!(records = snapshot.len(), "Decoded manifest");
        Ok(snapshot)
    }
}

/// Load the guarded cache file, if present and readable.
///
/// A corrupt file is treated as a miss so the caller refetches and
/// overwrites it.
async fn read_cached(guard: &CacheGuard) -> Result<Option<ManifestSnapshot>, ManifestError> {
    if !guard.exists().await {
        debug!(path = %guard.path().display(), "Manifest cache miss");
        return Ok(None);
    }

    let bytes = guard.read().await?;
    match codec::parse(&bytes) {
        Ok(snapshot) => {
            debug!(path = %guard.path().display(), records = snapshot.len(), "Manifest cache hit");
            Ok(Some(snapshot))
        }
        Err(CodecError::CacheCorruption { reason }) => {
            warn!(
                path = %guard.path().display(),
                %reason,
                "Discarding corrupt manifest cache file"
            );
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

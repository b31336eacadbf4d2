//! Asset use cases.
//!
//! [`AssetService`] composes the manifest store, the differ and bundle
//! downloads into the operations exposed to callers. Every cached file it
//! touches is accessed through its cache-key lock; bundles are decoded while
//! that lock is held.

use std::error::Error as StdError;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::cache::{self, CacheError, CacheGuard, CacheLayout, CleanupReport, KeyedLockRegistry};
use crate::diff::{self, DiffError, DiffMode};
use crate::fetch::{AssetSource, FetchError, RemoteFetcher, RequestSigner, store_payload};
use crate::manifest::{ManifestError, ManifestStore};
use crate::platform::Platform;

/// Error type returned by [`BundleDecoder`] implementations.
pub type DecoderError = Box<dyn StdError + Send + Sync>;

/// The first image found in a bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    /// PNG-encoded image.
    pub image_bytes: Vec<u8>,
    /// Name of the image object inside the bundle.
    pub display_name: String,
}

/// One image object of a bundle, as reported in batch results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedSprite {
    pub name: String,
    /// `data:image/png;base64,...` URI, empty when `valid` is false.
    #[serde(rename = "img")]
    pub image_data: String,
    /// False for placeholder textures that carry no pixel data.
    pub valid: bool,
}

/// Turns cached bundle files into images.
#[async_trait]
pub trait BundleDecoder: Send + Sync {
    async fn decode_single(&self, path: &Path) -> Result<DecodedImage, DecoderError>;

    async fn decode_many(&self, path: &Path) -> Result<Vec<DecodedSprite>, DecoderError>;
}

/// Supplies the current content version.
#[async_trait]
pub trait VersionResolver: Send + Sync {
    async fn resolve_current_version(&self) -> Result<u64, FetchError>;
}

/// Resolves the current version through the metadata endpoint.
pub struct MetadataVersionResolver {
    fetcher: Arc<RemoteFetcher>,
    base_url: String,
    signer: Option<RequestSigner>,
}

impl MetadataVersionResolver {
    pub fn new(
        fetcher: Arc<RemoteFetcher>,
        base_url: impl Into<String>,
        signer: Option<RequestSigner>,
    ) -> Self {
        Self {
            fetcher,
            base_url: base_url.into(),
            signer,
        }
    }
}

#[async_trait]
impl VersionResolver for MetadataVersionResolver {
    async fn resolve_current_version(&self) -> Result<u64, FetchError> {
        self.fetcher
            .fetch_asset_version(&self.base_url, self.signer.as_ref())
            .await
    }
}

/// Result for one asset of a batch request.
///
/// Serializes as `{"assetName", "assetData"}` or `{"assetName", "error"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged, rename_all_fields = "camelCase")]
pub enum BatchEntry {
    Decoded {
        asset_name: String,
        asset_data: Vec<DecodedSprite>,
    },
    Failed {
        asset_name: String,
        error: String,
    },
}

impl BatchEntry {
    pub fn asset_name(&self) -> &str {
        match self {
            BatchEntry::Decoded { asset_name, .. } | BatchEntry::Failed { asset_name, .. } => {
                asset_name
            }
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, BatchEntry::Failed { .. })
    }
}

/// A named file returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetFile {
    pub file_name: String,
    pub media_type: &'static str,
    pub content: Vec<u8>,
}

#[derive(Error, Debug)]
pub enum AssetError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Diff(#[from] DiffError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("Failed to decode asset '{asset}': {source}")]
    Decode {
        asset: String,
        #[source]
        source: DecoderError,
    },

    #[error("No bundle decoder is configured")]
    NoDecoder,

    #[error("Failed to resolve the current asset version: {0}")]
    VersionResolution(#[source] FetchError),

    #[error("Invalid asset name: {name:?}")]
    InvalidAssetName { name: String },
}

/// Split a comma separated name list, trimming names and dropping empties.
pub fn parse_asset_names(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_owned)
        .collect()
}

fn validate_asset_name(name: &str) -> Result<(), AssetError> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\'])
        || name.contains('\0');
    if invalid {
        return Err(AssetError::InvalidAssetName {
            name: name.to_owned(),
        });
    }
    Ok(())
}

/// Top-level asset operations over one cache root.
pub struct AssetService {
    source: Arc<dyn AssetSource>,
    store: ManifestStore,
    layout: CacheLayout,
    locks: Arc<KeyedLockRegistry>,
    decoder: Option<Arc<dyn BundleDecoder>>,
    resolver: Option<Arc<dyn VersionResolver>>,
}

impl AssetService {
    /// Create a service. `locks` must be the registry shared with every
    /// other component writing under `layout`.
    pub fn new(
        source: Arc<dyn AssetSource>,
        layout: CacheLayout,
        locks: Arc<KeyedLockRegistry>,
    ) -> Self {
        let store = ManifestStore::new(source.clone(), layout.clone(), locks.clone());
        Self {
            source,
            store,
            layout,
            locks,
            decoder: None,
            resolver: None,
        }
    }

    #[must_use]
    pub fn with_decoder(mut self, decoder: Arc<dyn BundleDecoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    #[must_use]
    pub fn with_version_resolver(mut self, resolver: Arc<dyn VersionResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn manifests(&self) -> &ManifestStore {
        &self.store
    }

    pub fn layout(&self) -> &CacheLayout {
        &self.layout
    }

    /// Map the `0` placeholder to the current upstream version.
    ///
    /// Without a resolver, `0` is passed through unchanged.
    pub async fn resolve_version(&self, version: u64) -> Result<u64, AssetError> {
        if version != 0 {
            return Ok(version);
        }
        match &self.resolver {
            Some(resolver) => {
                let resolved = resolver
                    .resolve_current_version()
                    .await
                    .map_err(AssetError::VersionResolution)?;
                info!(version = resolved, "Resolved current asset version");
                Ok(resolved)
            }
            None => {
                warn!("Version 0 requested but no version resolver is configured");
                Ok(0)
            }
        }
    }

    /// Decode the first image of a bundle. Returns `{display name}.png`.
    #[instrument(level = "info", skip(self), fields(platform = %platform))]
    pub async fn get_single_asset(
        &self,
        version: u64,
        asset_name: &str,
        force: bool,
        platform: Platform,
    ) -> Result<AssetFile, AssetError> {
        let decoder = self.decoder()?;
        let version = self.resolve_version(version).await?;
        let guard = self.ensure_bundle(asset_name, version, platform, force).await?;

        let image = decoder
            .decode_single(guard.path())
            .await
            .map_err(|source| AssetError::Decode {
                asset: asset_name.to_owned(),
                source,
            })?;

        Ok(AssetFile {
            file_name: format!("{}.png", image.display_name),
            media_type: "image/png",
            content: image.image_bytes,
        })
    }

    /// Decode every image of several bundles.
    ///
    /// Bundles are processed concurrently and returned in input order. A
    /// download failure fails the whole batch; a decode failure only marks
    /// its own entry.
    #[instrument(level = "info", skip(self, asset_names), fields(count = asset_names.len(), platform = %platform))]
    pub async fn get_many_assets(
        &self,
        version: u64,
        asset_names: &[String],
        force: bool,
        platform: Platform,
    ) -> Result<Vec<BatchEntry>, AssetError> {
        let version = self.resolve_version(version).await?;
        self.decode_batch(version, asset_names, force, platform).await
    }

    /// Asset names of a manifest.
    #[instrument(level = "info", skip(self), fields(platform = %platform))]
    pub async fn get_asset_list(
        &self,
        version: u64,
        force: bool,
        platform: Platform,
    ) -> Result<Vec<String>, AssetError> {
        let version = self.resolve_version(version).await?;
        Ok(self.store.get_manifest(version, platform, force).await?)
    }

    /// Names added or changed in `version` relative to `diff_version`.
    #[instrument(level = "info", skip(self), fields(platform = %platform))]
    pub async fn get_list_diff(
        &self,
        version: u64,
        diff_version: u64,
        force: bool,
        mode: DiffMode,
        prefix: Option<&str>,
        platform: Platform,
    ) -> Result<Vec<String>, AssetError> {
        let version = self.resolve_version(version).await?;
        self.list_diff(version, diff_version, force, mode, prefix, platform)
            .await
    }

    /// Decoded images for every name in the diff, downloaded at `version`.
    #[instrument(level = "info", skip(self), fields(platform = %platform))]
    pub async fn get_diff_with_payload(
        &self,
        version: u64,
        diff_version: u64,
        force: bool,
        mode: DiffMode,
        prefix: Option<&str>,
        platform: Platform,
    ) -> Result<Vec<BatchEntry>, AssetError> {
        let version = self.resolve_version(version).await?;
        let names = self
            .list_diff(version, diff_version, force, mode, prefix, platform)
            .await?;
        self.decode_batch(version, &names, force, platform).await
    }

    /// Raw bundle bytes. Returns `{name}{ext}`.
    #[instrument(level = "info", skip(self), fields(platform = %platform))]
    pub async fn get_asset_bundle(
        &self,
        version: u64,
        asset_name: &str,
        force: bool,
        platform: Platform,
    ) -> Result<AssetFile, AssetError> {
        let version = self.resolve_version(version).await?;
        let guard = self.ensure_bundle(asset_name, version, platform, force).await?;
        let content = guard.read().await?;

        Ok(AssetFile {
            file_name: CacheLayout::bundle_file_name(asset_name),
            media_type: "application/octet-stream",
            content,
        })
    }

    /// Delete every cached file and reclaim idle locks.
    pub async fn cleanup(&self) -> Result<CleanupReport, AssetError> {
        Ok(cache::cleanup(self.layout.root(), &self.locks).await?)
    }

    fn decoder(&self) -> Result<&Arc<dyn BundleDecoder>, AssetError> {
        self.decoder.as_ref().ok_or(AssetError::NoDecoder)
    }

    async fn list_diff(
        &self,
        version: u64,
        diff_version: u64,
        force: bool,
        mode: DiffMode,
        prefix: Option<&str>,
        platform: Platform,
    ) -> Result<Vec<String>, AssetError> {
        let (new, old) = futures::try_join!(
            self.store.snapshot(version, platform, force),
            self.store.snapshot(diff_version, platform, force),
        )?;
        Ok(diff::diff(&old, &new, mode, prefix)?)
    }

    async fn decode_batch(
        &self,
        version: u64,
        asset_names: &[String],
        force: bool,
        platform: Platform,
    ) -> Result<Vec<BatchEntry>, AssetError> {
        let decoder = self.decoder()?;
        try_join_all(asset_names.iter().map(|name| async move {
            let guard = self.ensure_bundle(name, version, platform, force).await?;
            let entry = match decoder.decode_many(guard.path()).await {
                Ok(asset_data) => BatchEntry::Decoded {
                    asset_name: name.clone(),
                    asset_data,
                },
                Err(e) => {
                    warn!(asset = %name, error = %e, "Failed to decode asset");
                    BatchEntry::Failed {
                        asset_name: name.clone(),
                        error: e.to_string(),
                    }
                }
            };
            Ok::<_, AssetError>(entry)
        }))
        .await
    }

    /// Lock a bundle's cache file, downloading it first when missing or
    /// forced. The returned guard keeps the file stable for the caller.
    async fn ensure_bundle(
        &self,
        asset_name: &str,
        version: u64,
        platform: Platform,
        force: bool,
    ) -> Result<CacheGuard, AssetError> {
        validate_asset_name(asset_name)?;
        let guard = self
            .locks
            .acquire(&self.layout.bundle_path(platform, asset_name))
            .await;

        if !force && guard.exists().await {
            debug!(asset = asset_name, "Bundle cache hit");
            return Ok(guard);
        }

        let file_name = CacheLayout::bundle_file_name(asset_name);
        debug!(asset = %file_name, version, "Downloading bundle");
        let bytes = self.source.fetch_bytes(&file_name, version, platform).await?;
        store_payload(&guard, &file_name, bytes).await?;
        Ok(guard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_asset_names() {
        assert_eq!(parse_asset_names("a, b,,c"), vec!["a", "b", "c"]);
        assert_eq!(parse_asset_names(" charui_vader ,"), vec!["charui_vader"]);
        assert!(parse_asset_names(" , ,").is_empty());
    }

    #[test]
    fn test_validate_asset_name() {
        assert!(validate_asset_name("charui_vader").is_ok());
        assert!(validate_asset_name("manifest.data").is_ok());
        for bad in ["", ".", "..", "../etc/passwd", "a/b", "a\\b"] {
            assert!(
                matches!(validate_asset_name(bad), Err(AssetError::InvalidAssetName { .. })),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_batch_entry_json_shape() {
        let ok = BatchEntry::Decoded {
            asset_name: "charui_a".into(),
            asset_data: vec![DecodedSprite {
                name: "tex".into(),
                image_data: String::new(),
                valid: false,
            }],
        };
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json["assetName"], "charui_a");
        assert_eq!(json["assetData"][0]["img"], "");
        assert_eq!(json["assetData"][0]["valid"], false);

        let failed = BatchEntry::Failed {
            asset_name: "charui_b".into(),
            error: "boom".into(),
        };
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["assetName"], "charui_b");
        assert_eq!(json["error"], "boom");
        assert!(failed.is_error());
        assert_eq!(failed.asset_name(), "charui_b");
    }
}

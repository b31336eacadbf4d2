//! Command implementations.

pub mod cleanup;
pub mod diff;
pub mod fetch;
pub mod list;
pub mod version;

use std::sync::Arc;

use anyhow::{Context, Result};
use assetcache_core::service::MetadataVersionResolver;
use assetcache_core::{AssetService, CacheLayout, KeyedLockRegistry, RemoteFetcher, RequestSigner};
use tracing::debug;

use crate::config::Settings;

/// Long-lived engine state shared by every command.
pub struct AppContext {
    pub service: AssetService,
    /// Whether version `0` can be resolved through the metadata service.
    pub resolves_versions: bool,
}

impl AppContext {
    /// Wire the fetcher, lock registry and service from resolved settings.
    pub fn build(settings: Settings) -> Result<Self> {
        let locks = Arc::new(KeyedLockRegistry::new());
        let fetcher = Arc::new(
            RemoteFetcher::new(&settings.fetcher, locks.clone())
                .context("Failed to create upstream client")?,
        );
        let layout = CacheLayout::new(&settings.cache_root).with_context(|| {
            format!("Invalid cache directory: {}", settings.cache_root.display())
        })?;
        debug!(cache_root = %layout.root().display(), "Using cache directory");

        let mut service = AssetService::new(fetcher.clone(), layout, locks);
        let resolves_versions = settings.metadata_url.is_some();
        if let Some(url) = settings.metadata_url {
            let signer = RequestSigner::from_optional(settings.access_key, settings.secret_key);
            debug!(%url, signed = signer.is_some(), "Version resolution enabled");
            service = service.with_version_resolver(Arc::new(MetadataVersionResolver::new(
                fetcher, url, signer,
            )));
        }

        Ok(Self {
            service,
            resolves_versions,
        })
    }
}

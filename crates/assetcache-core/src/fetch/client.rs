//! HTTP client for the content distribution endpoint.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use tracing::{debug, instrument, warn};
use url::Url;

use super::signing::{DATE_HEADER, RequestSigner};
use super::{AssetSource, FetchError, store_payload};
use crate::cache::KeyedLockRegistry;
use crate::platform::Platform;

/// Production CDN root.
pub const DEFAULT_CDN_URL: &str =
    "https://eaassets-a.akamaihd.net/assetssw.capitalgames.com/PROD";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const METADATA_PATH: &str = "/metadata";

/// Settings for [`RemoteFetcher`].
#[derive(Debug, Clone)]
pub struct FetcherOptions {
    /// Root URL; asset URLs are `{root}/{version}{platform segment}{asset}`.
    pub cdn_base_url: String,
    /// Whole-request timeout.
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for FetcherOptions {
    fn default() -> Self {
        Self {
            cdn_base_url: DEFAULT_CDN_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            user_agent: concat!("assetcache/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Downloads assets and queries the current asset version.
///
/// Construct once and share behind an `Arc`; the underlying connection pool
/// lives as long as the fetcher.
pub struct RemoteFetcher {
    http: reqwest::Client,
    base_url: Url,
    locks: Arc<KeyedLockRegistry>,
}

impl RemoteFetcher {
    pub fn new(options: &FetcherOptions, locks: Arc<KeyedLockRegistry>) -> Result<Self, FetchError> {
        let base_url = Url::parse(&options.cdn_base_url)?;
        let http = reqwest::Client::builder()
            .user_agent(options.user_agent.as_str())
            .timeout(options.timeout)
            .build()
            .map_err(FetchError::Client)?;
        Ok(Self {
            http,
            base_url,
            locks,
        })
    }

    /// Download URL of an asset.
    pub fn asset_url(&self, asset_name: &str, version: u64, platform: Platform) -> String {
        format!(
            "{}/{version}{}{asset_name}",
            self.base_url.as_str().trim_end_matches('/'),
            platform.url_segment()
        )
    }

    /// Download an asset and atomically replace `dest` with it.
    ///
    /// The destination lock is only taken for the write, so concurrent calls
    /// for one destination may each download. Callers that need one download
    /// per key hold the guard across the fetch and use [`store_payload`]
    /// directly, as the asset service does for bundles.
    #[instrument(level = "debug", skip(self, dest), fields(dest = %dest.display()))]
    pub async fn fetch_and_store(
        &self,
        asset_name: &str,
        version: u64,
        platform: Platform,
        dest: &Path,
    ) -> Result<(), FetchError> {
        let bytes = self.fetch_bytes(asset_name, version, platform).await?;
        let guard = self.locks.acquire(dest).await;
        let written = store_payload(&guard, asset_name, bytes).await?;
        debug!(bytes = written, "Stored asset");
        Ok(())
    }

    /// Current asset version reported by `{base_url}/metadata`.
    ///
    /// The request body is an empty JSON object. It is signed when a signer
    /// is given.
    #[instrument(level = "debug", skip(self, signer), fields(signed = signer.is_some()))]
    pub async fn fetch_asset_version(
        &self,
        base_url: &str,
        signer: Option<&RequestSigner>,
    ) -> Result<u64, FetchError> {
        let url = format!("{}{METADATA_PATH}", base_url.trim_end_matches('/'));
        let body = serde_json::to_vec(&serde_json::json!({}))
            .map_err(|e| FetchError::MalformedResponse {
                reason: e.to_string(),
            })?;

        let mut request = self
            .http
            .post(&url)
            .header(CONTENT_TYPE, "application/json");
        if let Some(signer) = signer {
            let signed = signer.sign("POST", METADATA_PATH, &body);
            request = request
                .header(DATE_HEADER, signed.date)
                .header(AUTHORIZATION, signed.authorization);
        }

        let response = request
            .body(body)
            .send()
            .await
            .map_err(|e| FetchError::upstream(METADATA_PATH, &e))?
            .error_for_status()
            .map_err(|e| FetchError::upstream(METADATA_PATH, &e))?;

        let payload: serde_json::Value =
            response
                .json()
                .await
                .map_err(|e| FetchError::MalformedResponse {
                    reason: e.to_string(),
                })?;

        payload
            .get("assetVersion")
            .and_then(serde_json::Value::as_u64)
            .ok_or_else(|| FetchError::MalformedResponse {
                reason: format!("missing or non-integer assetVersion in {payload}"),
            })
    }
}

#[async_trait]
impl AssetSource for RemoteFetcher {
    #[instrument(level = "debug", skip(self), fields(platform = %platform))]
    async fn fetch_bytes(
        &self,
        asset_name: &str,
        version: u64,
        platform: Platform,
    ) -> Result<Bytes, FetchError> {
        let url = self.asset_url(asset_name, version, platform);
        debug!(%url, "Downloading asset");

        let response = self.http.get(&url).send().await.map_err(|e| {
            warn!(asset = asset_name, error = %e, "Asset request failed");
            FetchError::upstream(asset_name, &e)
        })?;

        if response.status() != StatusCode::OK {
            warn!(asset = asset_name, status = %response.status(), "Unexpected upstream status");
            return Err(FetchError::Upstream {
                asset: asset_name.to_owned(),
                kind: super::UpstreamFailure::Status(response.status().as_u16()),
            });
        }

        response
            .bytes()
            .await
            .map_err(|e| FetchError::upstream(asset_name, &e))
    }
}

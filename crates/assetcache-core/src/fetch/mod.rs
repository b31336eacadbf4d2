//! Upstream access: asset downloads, the version endpoint and request signing.

pub mod client;
pub mod signing;

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use crate::cache::{CacheError, CacheGuard};
use crate::platform::Platform;

pub use client::{DEFAULT_CDN_URL, FetcherOptions, RemoteFetcher};
pub use signing::{RequestSigner, SignedHeaders};

/// Upstream asset name of the binary manifest.
pub const MANIFEST_ASSET_NAME: &str = "manifest.data";

/// Why an upstream request failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamFailure {
    /// The connection could not be established.
    Connect,
    /// The request did not complete within the configured timeout.
    Timeout,
    /// Any other transport or protocol error.
    Request,
    /// The server answered with an unexpected status code.
    Status(u16),
}

impl fmt::Display for UpstreamFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpstreamFailure::Connect => f.write_str("connection failed"),
            UpstreamFailure::Timeout => f.write_str("request timed out"),
            UpstreamFailure::Request => f.write_str("request error"),
            UpstreamFailure::Status(code) => write!(f, "status {code}"),
        }
    }
}

impl From<&reqwest::Error> for UpstreamFailure {
    fn from(e: &reqwest::Error) -> Self {
        if e.is_timeout() {
            UpstreamFailure::Timeout
        } else if e.is_connect() {
            UpstreamFailure::Connect
        } else if let Some(status) = e.status() {
            UpstreamFailure::Status(status.as_u16())
        } else {
            UpstreamFailure::Request
        }
    }
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Upstream request for '{asset}' failed: {kind}")]
    Upstream { asset: String, kind: UpstreamFailure },

    #[error("Upstream returned an empty payload for '{asset}'")]
    InvalidPayload { asset: String },

    #[error("Malformed metadata response: {reason}")]
    MalformedResponse { reason: String },

    #[error("Invalid upstream URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("Failed to store download: {0}")]
    Io(#[from] CacheError),
}

impl FetchError {
    pub(crate) fn upstream(asset: impl Into<String>, e: &reqwest::Error) -> Self {
        FetchError::Upstream {
            asset: asset.into(),
            kind: e.into(),
        }
    }
}

/// Reject payloads that cannot be a valid asset.
pub fn validate_payload(asset_name: &str, bytes: Bytes) -> Result<Bytes, FetchError> {
    if bytes.is_empty() {
        return Err(FetchError::InvalidPayload {
            asset: asset_name.to_owned(),
        });
    }
    Ok(bytes)
}

/// Validate a download and write it through a guard the caller holds.
///
/// Returns the number of bytes written. Nothing is written when the payload
/// is rejected.
pub async fn store_payload(
    guard: &CacheGuard,
    asset_name: &str,
    bytes: Bytes,
) -> Result<usize, FetchError> {
    let bytes = validate_payload(asset_name, bytes)?;
    guard.write(&bytes).await?;
    Ok(bytes.len())
}

/// Source of versioned asset payloads.
///
/// Implemented by [`RemoteFetcher`]; tests substitute in-memory sources.
#[async_trait]
pub trait AssetSource: Send + Sync {
    /// Raw bytes of one asset at a content version.
    async fn fetch_bytes(
        &self,
        asset_name: &str,
        version: u64,
        platform: Platform,
    ) -> Result<Bytes, FetchError>;

    /// Raw binary manifest at a content version.
    async fn fetch_manifest(&self, version: u64, platform: Platform) -> Result<Bytes, FetchError> {
        self.fetch_bytes(MANIFEST_ASSET_NAME, version, platform)
            .await
    }
}

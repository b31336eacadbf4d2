//! Version-aware asset cache and manifest diff engine.
//!
//! Fronts a remote content distribution endpoint with a local,
//! filesystem-backed cache keyed by content version and platform.
//!
//! # Architecture
//!
//! - [`cache`]: per-path lock registry, cache layout and cleanup
//! - [`fetch`]: upstream HTTP client and request signing
//! - [`manifest`]: manifest records, codec and the caching manifest store
//! - [`diff`]: NEW/CHANGED comparisons between two manifest snapshots
//! - [`service`]: the use-case layer composing all of the above

pub mod cache;
pub mod diff;
pub mod error;
pub mod fetch;
pub mod manifest;
pub mod platform;
pub mod service;

pub use cache::{CacheGuard, CacheLayout, KeyedLockRegistry};
pub use diff::{DiffMode, diff};
pub use fetch::{AssetSource, FetcherOptions, RemoteFetcher, RequestSigner};
pub use manifest::{ManifestRecord, ManifestSnapshot, ManifestStore};
pub use platform::Platform;
pub use service::{AssetService, BatchEntry, BundleDecoder, VersionResolver};

//! Manifest handling: records, binary/JSON codec and the caching store.

pub mod codec;
pub mod record;
pub mod store;

use thiserror::Error;

use crate::cache::CacheError;
use crate::fetch::FetchError;

pub use codec::CodecError;
pub use record::{ManifestRecord, ManifestSnapshot, name_prefix};
pub use store::ManifestStore;

/// Errors from loading or persisting a manifest.
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Failed to fetch manifest: {0}")]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

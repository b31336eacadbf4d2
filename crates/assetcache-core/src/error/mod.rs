//! Error types for the asset cache crate
//!
//! Each component owns its error enum; this module gathers them in one place.

pub use crate::cache::CacheError;
pub use crate::diff::{DiffError, ParseDiffModeError};
pub use crate::fetch::{FetchError, UpstreamFailure};
pub use crate::manifest::{CodecError, ManifestError};
pub use crate::platform::ParsePlatformError;
pub use crate::service::{AssetError, DecoderError};

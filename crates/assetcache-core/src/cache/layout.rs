//! On-disk cache layout.
//!
//! ```text
//! <root>/
//!   manifest/
//!     manifest_<platform-code>_<version>.json
//!   bundles/
//!     windows|android|ios/
//!       <asset-name>.bundle
//!       audio_<...>.wwpkg
//! ```

use std::io;
use std::path::{Path, PathBuf};

use crate::manifest::name_prefix;
use crate::platform::Platform;

/// File extension for audio packages.
pub const AUDIO_EXTENSION: &str = ".wwpkg";

/// File extension for every other bundle.
pub const BUNDLE_EXTENSION: &str = ".bundle";

/// Upstream extension for an asset, chosen by its name prefix.
pub fn asset_extension(asset_name: &str) -> &'static str {
    match name_prefix(asset_name) {
        "audio" => AUDIO_EXTENSION,
        _ => BUNDLE_EXTENSION,
    }
}

/// Derives cache keys (absolute paths) for manifests and bundles.
#[derive(Debug, Clone)]
pub struct CacheLayout {
    root: PathBuf,
}

impl CacheLayout {
    /// Create a layout rooted at `root`, made absolute against the working
    /// directory so every derived path is a stable lock key.
    pub fn new(root: impl AsRef<Path>) -> io::Result<Self> {
        Ok(Self {
            root: std::path::absolute(root.as_ref())?,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifest_dir(&self) -> PathBuf {
        self.root.join("manifest")
    }

    pub fn manifest_path(&self, platform: Platform, version: u64) -> PathBuf {
        self.manifest_dir()
            .join(format!("manifest_{}_{version}.json", platform.code()))
    }

    pub fn bundle_dir(&self, platform: Platform) -> PathBuf {
        self.root.join("bundles").join(platform.cache_dir_name())
    }

    /// Remote and local file name of an asset: its name plus extension.
    pub fn bundle_file_name(asset_name: &str) -> String {
        format!("{asset_name}{}", asset_extension(asset_name))
    }

    pub fn bundle_path(&self, platform: Platform, asset_name: &str) -> PathBuf {
        self.bundle_dir(platform)
            .join(Self::bundle_file_name(asset_name))
    }
}

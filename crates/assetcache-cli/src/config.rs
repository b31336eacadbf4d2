//! Configuration file support for the assetcache CLI.
//!
//! Configuration is read from `~/.config/assetcache/config.toml` (XDG
//! standard) or `~/Library/Application Support/com.assetcache.assetcache/config.toml`
//! on macOS. `--config` / `ASSETCACHE_CONFIG` point at another file.
//!
//! # Example configuration
//!
//! ```toml
//! [cache]
//! root = "/var/cache/assetcache"
//!
//! [upstream]
//! cdn_url = "https://eaassets-a.akamaihd.net/assetssw.capitalgames.com/PROD"
//! timeout_secs = 30
//!
//! [metadata]
//! url = "http://localhost:3200"
//! access_key = "public"
//! secret_key = "secret"
//!
//! [log]
//! dir = "/var/log/assetcache"
//! ```
//!
//! Command-line flags and their environment variables take precedence over
//! file values.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use assetcache_core::fetch::{DEFAULT_CDN_URL, FetcherOptions};
use secrecy::SecretString;
use serde::Deserialize;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Main configuration structure
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub cache: CacheSection,

    #[serde(default)]
    pub upstream: UpstreamSection,

    #[serde(default)]
    pub metadata: MetadataSection,

    #[serde(default)]
    pub log: LogSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheSection {
    /// Cache root directory
    pub root: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpstreamSection {
    /// CDN root URL
    pub cdn_url: Option<String>,

    /// Per-request timeout in seconds
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetadataSection {
    /// Base URL of the metadata service (`/metadata` is appended)
    pub url: Option<String>,

    /// Public signing key
    pub access_key: Option<String>,

    /// Secret signing key
    pub secret_key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogSection {
    /// Directory for daily rotated log files
    pub dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration.
    ///
    /// An explicitly given file must exist. The default file is optional and
    /// an empty configuration is returned when it is missing.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => match config_path() {
                Ok(path) if path.exists() => path,
                _ => return Ok(Config::default()),
            },
        };

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

/// Get the path to the configuration file.
pub fn config_path() -> Result<PathBuf> {
    let base_dirs = directories::BaseDirs::new()
        .ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))?;

    #[cfg(target_os = "macos")]
    {
        let config_dir = base_dirs
            .home_dir()
            .join("Library/Application Support/com.assetcache.assetcache");
        Ok(config_dir.join("config.toml"))
    }

    #[cfg(not(target_os = "macos"))]
    {
        let config_dir = base_dirs.config_dir().join("assetcache");
        Ok(config_dir.join("config.toml"))
    }
}

/// Default cache root: the user cache directory, or `./tmp` when there is
/// no home directory.
fn default_cache_root() -> PathBuf {
    directories::BaseDirs::new()
        .map_or_else(|| PathBuf::from("tmp"), |d| d.cache_dir().join("assetcache"))
}

/// Values supplied on the command line or through the environment.
#[derive(Debug, Default)]
pub struct Overrides {
    pub cache_dir: Option<PathBuf>,
    pub cdn_url: Option<String>,
    pub metadata_url: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub log_dir: Option<PathBuf>,
}

/// Effective settings after merging overrides over the config file.
#[derive(Debug)]
pub struct Settings {
    pub cache_root: PathBuf,
    pub fetcher: FetcherOptions,
    pub metadata_url: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<SecretString>,
    pub log_dir: Option<PathBuf>,
}

impl Settings {
    pub fn resolve(config: Config, overrides: Overrides) -> Self {
        let timeout =
            Duration::from_secs(config.upstream.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS));
        let cdn_base_url = overrides
            .cdn_url
            .or(config.upstream.cdn_url)
            .unwrap_or_else(|| DEFAULT_CDN_URL.to_string());

        Self {
            cache_root: overrides
                .cache_dir
                .or(config.cache.root)
                .unwrap_or_else(default_cache_root),
            fetcher: FetcherOptions {
                cdn_base_url,
                timeout,
                ..FetcherOptions::default()
            },
            metadata_url: overrides
                .metadata_url
                .or(config.metadata.url)
                .filter(|url| !url.is_empty()),
            access_key: overrides.access_key.or(config.metadata.access_key),
            secret_key: overrides
                .secret_key
                .or(config.metadata.secret_key)
                .map(SecretString::from),
            log_dir: overrides.log_dir.or(config.log.dir),
        }
    }
}

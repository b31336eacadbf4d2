//! Target platforms served by the upstream endpoint.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Runtime variant of an asset set.
///
/// Each platform has its own upstream path segment and its own cache
/// namespace. The numeric codes are part of the on-disk manifest file names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    #[default]
    Windows,
    Android,
    Ios,
}

impl Platform {
    pub const ALL: [Platform; 3] = [Platform::Windows, Platform::Android, Platform::Ios];

    /// Map a numeric platform code.
    ///
    /// Unknown codes fall back to [`Platform::Windows`], the upstream default.
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => Platform::Android,
            2 => Platform::Ios,
            _ => Platform::Windows,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Platform::Windows => 0,
            Platform::Android => 1,
            Platform::Ios => 2,
        }
    }

    /// Path segment inserted between the version and the asset name.
    pub fn url_segment(self) -> &'static str {
        match self {
            Platform::Windows => "/Windows/ETC/",
            Platform::Android => "/Android/ETC/",
            Platform::Ios => "/iOS/PVRTC/",
        }
    }

    /// Directory name used for this platform's bundle cache.
    pub fn cache_dir_name(self) -> &'static str {
        match self {
            Platform::Windows => "windows",
            Platform::Android => "android",
            Platform::Ios => "ios",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.cache_dir_name())
    }
}

/// Error returned when parsing an unknown platform name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsePlatformError(String);

impl fmt::Display for ParsePlatformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown platform: {}", self.0)
    }
}

impl std::error::Error for ParsePlatformError {}

impl FromStr for Platform {
    type Err = ParsePlatformError;

    /// Accepts names (`windows`, `android`, `ios`) or numeric codes.
    /// Numeric codes follow [`Platform::from_code`], names must be exact.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(code) = s.parse::<i64>() {
            return Ok(Platform::from_code(code));
        }
        match s.to_ascii_lowercase().as_str() {
            "windows" => Ok(Platform::Windows),
            "android" => Ok(Platform::Android),
            "ios" => Ok(Platform::Ios),
            _ => Err(ParsePlatformError(s.to_owned())),
        }
    }
}

//! Exit codes for the CLI.
//!
//! These follow common Unix conventions and provide meaningful
//! status information for scripting and automation.

/// Successful execution
pub const SUCCESS: u8 = 0;

/// General/unspecified error
pub const GENERAL_ERROR: u8 = 1;

/// Command-line usage error (bad arguments, missing configuration)
pub const USAGE_ERROR: u8 = 2;

/// Upstream unreachable, timed out or failing
pub const UPSTREAM_FAILED: u8 = 3;

/// Upstream has no such asset or manifest
pub const NOT_FOUND: u8 = 4;

/// Upstream answered with unusable data
pub const INVALID_RESPONSE: u8 = 5;

/// Local cache could not be read or written
pub const CACHE_ERROR: u8 = 6;

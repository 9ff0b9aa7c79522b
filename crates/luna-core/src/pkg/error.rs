//! Resolution error types.

use serde::Serialize;
use std::fmt;

/// Resolution error codes.
pub mod codes {
    pub const PKG_SPEC_INVALID: &str = "PKG_SPEC_INVALID";
    pub const PKG_NOT_FOUND: &str = "PKG_NOT_FOUND";
    pub const PKG_REGISTRY_ERROR: &str = "PKG_REGISTRY_ERROR";
    pub const PKG_RANGE_INVALID: &str = "PKG_RANGE_INVALID";
    pub const PKG_VERSION_NOT_FOUND: &str = "PKG_VERSION_NOT_FOUND";
    pub const PKG_CYCLE_DETECTED: &str = "PKG_CYCLE_DETECTED";
    pub const PKG_DEPTH_EXCEEDED: &str = "PKG_DEPTH_EXCEEDED";
    pub const PKG_RESPONSE_MALFORMED: &str = "PKG_RESPONSE_MALFORMED";
    pub const PKG_DOWNLOAD_FAILED: &str = "PKG_DOWNLOAD_FAILED";
    pub const PKG_RESOLUTION_CANCELLED: &str = "PKG_RESOLUTION_CANCELLED";
}

/// Resolution error.
///
/// Cloneable so that a single failed cache entry can be handed to every
/// task waiting on the same key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PkgError {
    code: &'static str,
    message: String,
}

impl PkgError {
    /// Create a new error with the given code and message.
    #[must_use]
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Get the error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        self.code
    }

    /// Get the error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Create a spec invalid error.
    pub fn spec_invalid(msg: impl Into<String>) -> Self {
        Self::new(codes::PKG_SPEC_INVALID, msg)
    }

    /// Create a package not found error (registry answered 404).
    #[must_use]
    pub fn not_found(name: &str) -> Self {
        Self::new(codes::PKG_NOT_FOUND, format!("Package not found: {name}"))
    }

    /// Create a registry error.
    pub fn registry(msg: impl Into<String>) -> Self {
        Self::new(codes::PKG_REGISTRY_ERROR, msg)
    }

    /// Create an invalid range error.
    #[must_use]
    pub fn range_invalid(range: &str, reason: impl fmt::Display) -> Self {
        Self::new(
            codes::PKG_RANGE_INVALID,
            format!("Invalid version range '{range}': {reason}"),
        )
    }

    /// Create a no-satisfying-version error.
    #[must_use]
    pub fn version_not_found(name: &str, range: &str) -> Self {
        Self::new(
            codes::PKG_VERSION_NOT_FOUND,
            format!("No version of {name} satisfies range: {range}"),
        )
    }

    /// Create a cycle detected error.
    #[must_use]
    pub fn cycle_detected(name: &str, version: &str) -> Self {
        Self::new(
            codes::PKG_CYCLE_DETECTED,
            format!("{name}@{version} is already being expanded on this path"),
        )
    }

    /// Create a depth exceeded error.
    #[must_use]
    pub fn depth_exceeded(name: &str, max_depth: usize) -> Self {
        Self::new(
            codes::PKG_DEPTH_EXCEEDED,
            format!("Dependency depth limit {max_depth} reached at {name}"),
        )
    }

    /// Create a malformed response error.
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::new(codes::PKG_RESPONSE_MALFORMED, msg)
    }

    /// Create a download failed error.
    pub fn download_failed(msg: impl Into<String>) -> Self {
        Self::new(codes::PKG_DOWNLOAD_FAILED, msg)
    }

    /// Create a cancellation error.
    #[must_use]
    pub fn cancelled(name: &str) -> Self {
        Self::new(
            codes::PKG_RESOLUTION_CANCELLED,
            format!("Resolution of {name} was cancelled"),
        )
    }
}

impl fmt::Display for PkgError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for PkgError {}

impl From<reqwest::Error> for PkgError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::new(codes::PKG_REGISTRY_ERROR, format!("Request timed out: {e}"))
        } else if e.is_connect() {
            Self::new(codes::PKG_REGISTRY_ERROR, format!("Connection failed: {e}"))
        } else if e.is_decode() {
            Self::new(codes::PKG_RESPONSE_MALFORMED, format!("Invalid response body: {e}"))
        } else {
            Self::new(codes::PKG_REGISTRY_ERROR, e.to_string())
        }
    }
}

impl From<serde_json::Error> for PkgError {
    fn from(e: serde_json::Error) -> Self {
        Self::new(codes::PKG_RESPONSE_MALFORMED, format!("Invalid JSON: {e}"))
    }
}

//! Package spec parsing.
//!
//! Parses root specifiers like:
//! - `react`
//! - `react@18.2.0`
//! - `react@^18.0.0`
//! - `@types/node`
//! - `@types/node@^20`
//!
//! and defines [`PackageReference`], the `(name, requested)` pair carried
//! along every dependency edge.

use super::error::PkgError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reference used when a specifier names no version.
pub const LATEST: &str = "latest";

/// A parsed package specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSpec {
    /// Full package name (e.g., "@scope/name" or "name").
    pub name: String,
    /// Scope without the @ prefix, if scoped.
    pub scope: Option<String>,
    /// Version range or tag (None means latest).
    pub range: Option<String>,
}

impl PackageSpec {
    /// Parse a package specification string.
    ///
    /// # Errors
    /// Returns an error if the spec is invalid.
    pub fn parse(input: &str) -> Result<Self, PkgError> {
        let input = input.trim();

        if input.is_empty() {
            return Err(PkgError::spec_invalid("Empty package spec"));
        }

        if input.starts_with('@') {
            Self::parse_scoped(input)
        } else {
            Self::parse_unscoped(input)
        }
    }

    fn parse_scoped(input: &str) -> Result<Self, PkgError> {
        let Some(slash_pos) = input.find('/') else {
            return Err(PkgError::spec_invalid(format!(
                "Invalid scoped package: missing '/' in '{input}'"
            )));
        };

        if slash_pos == 1 {
            return Err(PkgError::spec_invalid(format!(
                "Invalid scoped package: empty scope in '{input}'"
            )));
        }

        let scope = &input[1..slash_pos];
        let after_slash = &input[slash_pos + 1..];

        let (pkg_name, range) = match after_slash.split_once('@') {
            Some((pkg_name, range)) => (pkg_name, Some(range)),
            None => (after_slash, None),
        };

        if pkg_name.is_empty() {
            return Err(PkgError::spec_invalid(format!(
                "Invalid scoped package: empty name in '{input}'"
            )));
        }

        Self::validate_name(scope)?;
        Self::validate_name(pkg_name)?;

        Ok(Self {
            name: format!("@{scope}/{pkg_name}"),
            scope: Some(scope.to_string()),
            range: Self::validate_range(input, range)?,
        })
    }

    fn parse_unscoped(input: &str) -> Result<Self, PkgError> {
        let (name, range) = match input.split_once('@') {
            Some((name, range)) => (name, Some(range)),
            None => (input, None),
        };

        if name.is_empty() {
            return Err(PkgError::spec_invalid(format!(
                "Invalid package spec: empty name in '{input}'"
            )));
        }

        Self::validate_name(name)?;

        Ok(Self {
            name: name.to_string(),
            scope: None,
            range: Self::validate_range(input, range)?,
        })
    }

    fn validate_range(input: &str, range: Option<&str>) -> Result<Option<String>, PkgError> {
        match range {
            Some("") => Err(PkgError::spec_invalid(format!(
                "Invalid package spec: empty version range in '{input}'"
            ))),
            Some(range) => Ok(Some(range.to_string())),
            None => Ok(None),
        }
    }

    fn validate_name(name: &str) -> Result<(), PkgError> {
        if name.is_empty() {
            return Err(PkgError::spec_invalid("Empty package name"));
        }

        for c in name.chars() {
            if !c.is_alphanumeric() && c != '-' && c != '_' && c != '.' {
                return Err(PkgError::spec_invalid(format!(
                    "Invalid character '{c}' in package name '{name}'"
                )));
            }
        }

        Ok(())
    }

    /// Turn this spec into the reference for the root edge.
    ///
    /// A spec without a range requests `latest`.
    #[must_use]
    pub fn into_reference(self) -> PackageReference {
        let requested = self.range.unwrap_or_else(|| LATEST.to_string());
        PackageReference::new(self.name, requested)
    }
}

/// A requested dependency edge: package name plus the reference as written
/// in the parent manifest (exact version, range, `latest`, or a dist-tag).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PackageReference {
    pub name: String,
    pub requested: String,
}

impl PackageReference {
    #[must_use]
    pub fn new(name: impl Into<String>, requested: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            requested: requested.into(),
        }
    }

    /// Cache key for this reference: `name@requested`.
    #[must_use]
    pub fn cache_key(&self) -> String {
        format!("{}@{}", self.name, self.requested)
    }
}

impl fmt::Display for PackageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.requested)
    }
}

/// URL-encode a package name for registry requests.
///
/// For scoped packages, encodes the `/` as `%2F`.
#[must_use]
pub fn url_encoded_name(name: &str) -> String {
    if name.starts_with('@') {
        name.replace('/', "%2F")
    } else {
        name.to_string()
    }
}

//! Version resolution using semver.
//!
//! Pure and synchronous: turns a requested reference plus the set of
//! published version strings into one concrete version.

use super::error::PkgError;
use super::spec::LATEST;
use semver::{Version, VersionReq};

/// A classified reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    /// A fully specified version. Trusted as-is.
    Exact(String),
    /// The `latest` dist-tag.
    Latest,
    /// Any other dist-tag (`next`, `beta`, ...). Resolved by the registry.
    Tag(String),
    /// A range expression.
    Range(VersionRange),
}

impl Reference {
    /// Classify a requested reference.
    ///
    /// # Errors
    /// Returns `PKG_RANGE_INVALID` if the reference is neither a version,
    /// a dist-tag, nor a parsable range.
    pub fn parse(requested: &str) -> Result<Self, PkgError> {
        let trimmed = requested.trim();

        // npm accepts "v1.2.3" and "=1.2.3" as the exact version 1.2.3
        let bare = trimmed.strip_prefix('=').unwrap_or(trimmed).trim_start();
        let bare = bare.strip_prefix('v').unwrap_or(bare);
        if Version::parse(bare).is_ok() {
            return Ok(Self::Exact(bare.to_string()));
        }

        if trimmed == LATEST {
            return Ok(Self::Latest);
        }

        match VersionRange::parse(trimmed) {
            Ok(range) => Ok(Self::Range(range)),
            Err(_) if is_dist_tag(trimmed) => Ok(Self::Tag(trimmed.to_string())),
            Err(e) => Err(e),
        }
    }
}

/// Dist-tags start with a letter and contain no range operators.
fn is_dist_tag(s: &str) -> bool {
    let mut chars = s.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// A parsed npm range: one or more `||` alternatives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRange {
    raw: String,
    alternatives: Vec<VersionReq>,
}

impl VersionRange {
    /// Parse an npm range expression.
    ///
    /// Handles:
    /// - Standard semver ranges: `^1.0.0`, `~1.0.0`, `>=1.0.0`
    /// - OR ranges: `^1.0.0 || ^2.0.0` (invalid alternatives are skipped)
    /// - Hyphen ranges: `1.0.0 - 2.0.0`
    /// - X-ranges and partials: `1.x`, `1.2.x`, `1.2`, `*`, empty string
    /// - Space-separated comparators: `>= 2.1.2 < 3.0.0`
    ///
    /// # Errors
    /// Returns `PKG_RANGE_INVALID` if no alternative parses.
    pub fn parse(range: &str) -> Result<Self, PkgError> {
        let raw = range.trim().to_string();

        if !raw.contains("||") {
            let req = parse_range(&raw)?;
            return Ok(Self {
                raw,
                alternatives: vec![req],
            });
        }

        let alternatives: Vec<VersionReq> = raw
            .split("||")
            .map(str::trim)
            .filter(|alt| !alt.is_empty())
            .filter_map(|alt| parse_range(alt).ok())
            .collect();

        if alternatives.is_empty() {
            return Err(PkgError::range_invalid(&raw, "no valid alternatives"));
        }

        Ok(Self { raw, alternatives })
    }

    /// The range as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Check whether a version satisfies any alternative.
    #[must_use]
    pub fn matches(&self, version: &Version) -> bool {
        self.alternatives.iter().any(|req| req.matches(version))
    }

    /// Highest satisfying version among `available`.
    ///
    /// Strings that do not parse as versions are ignored. The returned
    /// string is the one from `available`, unchanged.
    pub fn max_satisfying<'a>(
        &self,
        available: impl IntoIterator<Item = &'a str>,
    ) -> Option<&'a str> {
        available
            .into_iter()
            .filter_map(|s| Version::parse(s).ok().map(|v| (v, s)))
            .filter(|(v, _)| self.matches(v))
            .max_by(|a, b| a.0.cmp(&b.0))
            .map(|(_, s)| s)
    }
}

/// Resolve a requested reference against a set of published versions.
///
/// # Rules
/// - An exact version is returned unchanged, whether or not it is in `available`
/// - `latest` and other dist-tags are passed through for the registry to resolve
/// - A range returns the highest satisfying version
///
/// # Errors
/// `PKG_RANGE_INVALID` for an unparsable reference, `PKG_VERSION_NOT_FOUND`
/// if no published version satisfies the range.
pub fn resolve_reference<'a>(
    name: &str,
    requested: &str,
    available: impl IntoIterator<Item = &'a str>,
) -> Result<String, PkgError> {
    match Reference::parse(requested)? {
        Reference::Exact(version) => Ok(version),
        Reference::Latest => Ok(LATEST.to_string()),
        Reference::Tag(tag) => Ok(tag),
        Reference::Range(range) => range
            .max_satisfying(available)
            .map(String::from)
            .ok_or_else(|| PkgError::version_not_found(name, requested)),
    }
}

/// Parse a single version range, handling npm-specific syntax.
fn parse_range(range: &str) -> Result<VersionReq, PkgError> {
    let range = range.trim();

    if range.is_empty() {
        return Ok(VersionReq::STAR);
    }

    // "1.0.0 - 2.0.0" -> ">=1.0.0, <=2.0.0"
    if let Some((start, end)) = parse_hyphen_range(range) {
        let converted = format!(">={start}, <={end}");
        return VersionReq::parse(&converted).map_err(|e| PkgError::range_invalid(range, e));
    }

    // "1.x" -> ">=1.0.0, <2.0.0"
    if has_wildcard(range) {
        let converted = convert_x_range(range);
        return VersionReq::parse(&converted).map_err(|e| PkgError::range_invalid(range, e));
    }

    // npm reads a bare partial like "1.2" as "1.2.x", semver as "^1.2"
    if is_bare_partial(range) {
        let converted = convert_x_range(&format!("{range}.x"));
        return VersionReq::parse(&converted).map_err(|e| PkgError::range_invalid(range, e));
    }

    // ">= 2.1.2 < 3.0.0" -> ">=2.1.2, <3.0.0"
    let converted = convert_space_separated_comparators(range);

    VersionReq::parse(&converted).map_err(|e| PkgError::range_invalid(range, e))
}

/// `1` or `1.2`: digits and at most one dot, no operator.
fn is_bare_partial(range: &str) -> bool {
    let parts: Vec<&str> = range.split('.').collect();
    parts.len() <= 2
        && parts
            .iter()
            .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
}

/// Whether any comparator has a whole `x`, `X` or `*` component in its
/// version core. Pre-release and build tags are not looked at.
fn has_wildcard(range: &str) -> bool {
    range.split_whitespace().any(|token| {
        let core = token
            .split(['-', '+'])
            .next()
            .unwrap_or(token)
            .trim_start_matches(['<', '>', '=', '~', '^']);
        core.split('.').any(is_wildcard)
    })
}

fn is_wildcard(part: &str) -> bool {
    matches!(part, "x" | "X" | "*")
}

/// Parse a hyphen range like "1.0.0 - 2.0.0".
fn parse_hyphen_range(range: &str) -> Option<(String, String)> {
    let parts: Vec<&str> = range.split(" - ").collect();
    if parts.len() == 2 {
        let start = parts[0].trim();
        let end = parts[1].trim();
        if !start.is_empty() && !end.is_empty() {
            return Some((start.to_string(), end.to_string()));
        }
    }
    None
}

/// Convert space-separated comparators to comma-separated.
///
/// npm allows `>= 2.1.2 < 3.0.0` meaning `>=2.1.2 AND <3.0.0`;
/// the semver crate requires `>=2.1.2, <3.0.0`.
fn convert_space_separated_comparators(range: &str) -> String {
    let mut result = String::new();
    let mut need_comma = false;

    for token in range.split_whitespace() {
        if token_has_version(token) {
            if need_comma {
                result.push_str(", ");
            }
            result.push_str(token);
            need_comma = true;
        } else {
            // Bare operator: attaches to the version that follows
            if need_comma {
                result.push_str(", ");
                need_comma = false;
            }
            result.push_str(token);
        }
    }

    if result.is_empty() {
        return range.to_string();
    }

    result
}

/// Check if a token contains a version number (has digits).
fn token_has_version(token: &str) -> bool {
    token.chars().any(|c| c.is_ascii_digit())
}

/// Convert x-range to semver range.
fn convert_x_range(range: &str) -> String {
    let range = range.trim();

    if range == "*" || range == "x" || range == "X" {
        return ">=0.0.0".to_string();
    }

    let parts: Vec<&str> = range.split('.').collect();

    match parts.as_slice() {
        [major, "x" | "X" | "*"] | [major, "x" | "X" | "*", "x" | "X" | "*"] => {
            if let Ok(m) = major.parse::<u64>() {
                return format!(">={m}.0.0, <{}.0.0", m + 1);
            }
        }
        [major, minor, "x" | "X" | "*"] => {
            if let (Ok(m), Ok(n)) = (major.parse::<u64>(), minor.parse::<u64>()) {
                return format!(">={m}.{n}.0, <{m}.{}.0", n + 1);
            }
        }
        _ => {}
    }

    range
        .split('.')
        .map(|part| if is_wildcard(part) { "0" } else { part })
        .collect::<Vec<_>>()
        .join(".")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pkg::error::codes;

    fn resolve(requested: &str, available: &[&str]) -> Result<String, PkgError> {
        resolve_reference("test-pkg", requested, available.iter().copied())
    }

    #[test]
    fn test_caret_picks_highest_in_major() {
        let version = resolve("^1.0.0", &["1.0.0", "1.2.0", "2.0.0"]).unwrap();
        assert_eq!(version, "1.2.0");
    }

    #[test]
    fn test_exact_is_trusted_without_available() {
        assert_eq!(resolve("2.0.0", &[]).unwrap(), "2.0.0");
        assert_eq!(resolve("2.0.0", &["1.0.0"]).unwrap(), "2.0.0");
    }

    #[test]
    fn test_latest_passes_through() {
        assert_eq!(resolve("latest", &[]).unwrap(), "latest");
    }

    #[test]
    fn test_dist_tag_passes_through() {
        assert_eq!(resolve("next", &["1.0.0"]).unwrap(), "next");
        assert_eq!(
            Reference::parse("beta").unwrap(),
            Reference::Tag("beta".to_string())
        );
    }

    #[test]
    fn test_no_satisfying_version() {
        let err = resolve("^2.0.0", &["1.0.0"]).unwrap_err();
        assert_eq!(err.code(), codes::PKG_VERSION_NOT_FOUND);
        assert!(err.message().contains("test-pkg"));
        assert!(err.message().contains("^2.0.0"));
    }

    #[test]
    fn test_invalid_range() {
        let err = resolve("not-a-range!!!", &["1.0.0"]).unwrap_err();
        assert_eq!(err.code(), codes::PKG_RANGE_INVALID);

        let err = resolve(">>1.0.0 || <<2", &["1.0.0"]).unwrap_err();
        assert_eq!(err.code(), codes::PKG_RANGE_INVALID);
    }

    #[test]
    fn test_unparsable_available_versions_are_skipped() {
        let version = resolve("^1.0.0", &["garbage", "1.1.0", "1.x.y", ""]).unwrap();
        assert_eq!(version, "1.1.0");
    }

    #[test]
    fn test_tilde_range() {
        let version = resolve("~1.0.0", &["1.0.0", "1.0.5", "1.1.0", "2.0.0"]).unwrap();
        assert_eq!(version, "1.0.5");
    }

    #[test]
    fn test_major_only() {
        let version = resolve("2", &["1.0.0", "1.5.0", "2.0.0", "2.5.0"]).unwrap();
        assert_eq!(version, "2.5.0");
    }

    #[test]
    fn test_major_minor_partial_is_x_range() {
        let version = resolve("1.2", &["1.2.0", "1.2.9", "1.3.0"]).unwrap();
        assert_eq!(version, "1.2.9");
    }

    #[test]
    fn test_prerelease_excluded_from_plain_range() {
        let version = resolve("^2.0.0", &["1.0.0", "2.0.0-alpha.1", "2.0.0", "2.1.0-beta.1"])
            .unwrap();
        assert_eq!(version, "2.0.0");
    }

    #[test]
    fn test_prerelease_range_orders_prereleases() {
        let version = resolve(">=2.0.0-alpha.1", &["2.0.0-alpha.1", "2.0.0-beta.2"]).unwrap();
        assert_eq!(version, "2.0.0-beta.2");
    }

    #[test]
    fn test_or_range_picks_highest() {
        let version = resolve("^1.0.0 || ^2.0.0", &["1.5.0", "2.5.0"]).unwrap();
        assert_eq!(version, "2.5.0");

        let version = resolve("^14.0.0||^15.0.0", &["14.0.0", "15.0.0"]).unwrap();
        assert_eq!(version, "15.0.0");
    }

    #[test]
    fn test_or_range_only_one_side_matches() {
        let version = resolve("^1.0.0 || ^2.0.0", &["1.0.0", "1.5.0"]).unwrap();
        assert_eq!(version, "1.5.0");
    }

    #[test]
    fn test_or_range_no_match() {
        let err = resolve("^3.0.0 || ^4.0.0", &["1.0.0", "2.0.0"]).unwrap_err();
        assert_eq!(err.code(), codes::PKG_VERSION_NOT_FOUND);
    }

    #[test]
    fn test_x_ranges() {
        assert_eq!(resolve("1.x", &["1.0.0", "1.5.0", "2.0.0"]).unwrap(), "1.5.0");
        assert_eq!(resolve("1.0.x", &["1.0.3", "1.1.0"]).unwrap(), "1.0.3");
        assert_eq!(resolve("*", &["1.0.0", "3.1.0"]).unwrap(), "3.1.0");
        assert_eq!(resolve("", &["0.1.0", "0.2.0"]).unwrap(), "0.2.0");
    }

    #[test]
    fn test_prefixed_exact_versions() {
        assert_eq!(resolve("v1.0.0", &[]).unwrap(), "1.0.0");
        assert_eq!(resolve("=1.0.0", &[]).unwrap(), "1.0.0");
        assert_eq!(resolve("=v2.1.0", &[]).unwrap(), "2.1.0");
        assert_eq!(
            Reference::parse("v1.0.0").unwrap(),
            Reference::Exact("1.0.0".to_string())
        );
        // still a tag: not a version after the prefix
        assert_eq!(
            Reference::parse("vnext").unwrap(),
            Reference::Tag("vnext".to_string())
        );
    }

    #[test]
    fn test_prerelease_tags_are_not_wildcards() {
        let available = ["1.0.0-next.0", "1.0.0-next.2", "1.0.0-xyz.1", "1.0.0"];
        assert_eq!(resolve(">=1.0.0-next.1", &available).unwrap(), "1.0.0");
        assert_eq!(resolve(">=1.0.0-xyz.1 <1.0.0", &available).unwrap(), "1.0.0-xyz.1");
        assert_eq!(resolve("1.X", &["1.4.0", "2.0.0"]).unwrap(), "1.4.0");
    }

    #[test]
    fn test_hyphen_range() {
        let version = resolve("1.0.0 - 2.0.0", &["1.0.0", "1.5.0", "2.0.0", "3.0.0"]).unwrap();
        assert_eq!(version, "2.0.0");
    }

    #[test]
    fn test_space_separated_comparators() {
        let available = ["2.0.0", "2.1.2", "2.5.0", "3.0.0"];
        assert_eq!(resolve(">= 2.1.2 < 3.0.0", &available).unwrap(), "2.5.0");
        assert_eq!(resolve(">=2.1.2 <3.0.0", &available).unwrap(), "2.5.0");
        assert_eq!(resolve(">= 2.1.2 < 3.0.0", &["2.1.2", "3.0.0"]).unwrap(), "2.1.2");
    }
}

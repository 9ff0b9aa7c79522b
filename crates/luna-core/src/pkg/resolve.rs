//! Install-time resolution entry point.
//!
//! Parses a root specifier, builds the full dependency tree against the
//! configured registry, and returns the aggregated report.

use super::error::PkgError;
use super::registry::{Registry, RegistryClient};
use super::report::Report;
use super::spec::PackageSpec;
use super::tree::TreeBuilder;
use crate::config::Config;
use tracing::info;

/// Resolve the full dependency tree for `spec` (`name`, `name@range`,
/// `@scope/name@range`) against the registry named in `config`.
///
/// # Errors
/// Returns an error if the specifier is invalid, the registry client cannot
/// be created, or the root package itself cannot be resolved. Failures of
/// transitive dependencies are listed in the report instead.
pub async fn resolve_install(spec: &str, config: &Config) -> Result<Report, PkgError> {
    let client = RegistryClient::from_config(config)?;
    resolve_with_registry(client, spec, config).await
}

/// Same as [`resolve_install`] over any [`Registry`].
///
/// # Errors
/// See [`resolve_install`].
pub async fn resolve_with_registry<R: Registry + 'static>(
    registry: R,
    spec: &str,
    config: &Config,
) -> Result<Report, PkgError> {
    let root = PackageSpec::parse(spec)?.into_reference();

    info!(root = %root, concurrency = config.concurrency, "Resolving dependency tree");

    let builder = TreeBuilder::new(registry, config);
    let report = builder.resolve(root).await?;

    info!(
        resolved = report.resolved_count,
        failures = report.failures.len(),
        "Resolution finished"
    );

    Ok(report)
}

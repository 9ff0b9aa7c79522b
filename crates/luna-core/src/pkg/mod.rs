//! Package resolution.
//!
//! Provides:
//! - Parsing package specifications (name@range)
//! - Fetching package metadata and manifests from an npm registry
//! - Resolving version ranges and dist-tags
//! - Single-flight caching of per-reference resolutions
//! - Concurrent dependency tree construction with failure reporting

pub mod cache;
pub mod error;
pub mod registry;
pub mod report;
pub mod resolve;
pub mod spec;
pub mod tree;
pub mod version;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::ResolutionCache;
pub use error::{codes as pkg_codes, PkgError};
pub use registry::{
    Dist, PackageMetadata, Registry, RegistryClient, VersionManifest, DEFAULT_REGISTRY,
    MAX_ARTIFACT_SIZE,
};
pub use report::{FailureRecord, Report, ResolvedPackageInfo};
pub use resolve::resolve_install;
pub use spec::{PackageReference, PackageSpec};
pub use tree::{ResolvedNode, ResolvedPackage, TreeBuilder};
pub use version::{resolve_reference, Reference, VersionRange};

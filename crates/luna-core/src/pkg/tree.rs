//! Dependency tree builder.
//!
//! Expands a root reference top-down: every dependency edge becomes its own
//! task, resolved through the shared [`ResolutionCache`], and each node waits
//! for all of its children before it is finalized. Children are attached in
//! manifest order so the emitted tree does not depend on scheduling.
//!
//! A failing edge is omitted from its parent's children and reported as a
//! [`FailureRecord`]; only a failure of the root edge fails the build.

use super::cache::ResolutionCache;
use super::error::PkgError;
use super::registry::{Dist, Registry, VersionManifest};
use super::report::{FailureRecord, Report};
use super::spec::PackageReference;
use super::version::{resolve_reference, Reference};
use crate::config::Config;
use futures::future::{BoxFuture, FutureExt};
use serde::Serialize;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// One concrete package at one concrete version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedNode {
    pub name: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dist: Option<Dist>,
    /// Successfully resolved dependencies, in manifest order.
    pub children: Vec<ResolvedNode>,
}

impl ResolvedNode {
    /// Number of nodes in this subtree, including this one.
    #[must_use]
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(ResolvedNode::node_count).sum::<usize>()
    }

    /// Visit this node and its descendants depth-first, parents before children.
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a ResolvedNode)) {
        f(self);
        for child in &self.children {
            child.walk(f);
        }
    }
}

/// The cached result of resolving one `name@requested` key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPackage {
    pub name: String,
    pub version: String,
    pub manifest: VersionManifest,
}

/// A completed subtree plus every failure recorded beneath it.
pub type Subtree = (ResolvedNode, Vec<FailureRecord>);

/// `(name, version)` pairs being expanded on the current path, innermost first.
struct ActivePath {
    name: String,
    version: String,
    parent: Option<Arc<ActivePath>>,
}

fn on_path(path: Option<&Arc<ActivePath>>, name: &str, version: &str) -> bool {
    let mut cursor = path;
    while let Some(link) = cursor {
        if link.name == name && link.version == version {
            return true;
        }
        cursor = link.parent.as_ref();
    }
    false
}

struct Inner<R> {
    registry: R,
    cache: ResolutionCache<ResolvedPackage>,
    permits: Semaphore,
    max_depth: usize,
    run_timeout: Option<Duration>,
}

/// Concurrent tree builder over a [`Registry`].
///
/// One builder owns one cache; reuse it across builds only when the
/// registry state is known not to change in between.
pub struct TreeBuilder<R> {
    inner: Arc<Inner<R>>,
}

impl<R> Clone for TreeBuilder<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: Registry + 'static> TreeBuilder<R> {
    #[must_use]
    pub fn new(registry: R, config: &Config) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry,
                cache: ResolutionCache::new(),
                permits: Semaphore::new(config.concurrency.max(1)),
                max_depth: config.max_depth,
                run_timeout: config.run_timeout,
            }),
        }
    }

    #[must_use]
    pub fn registry(&self) -> &R {
        &self.inner.registry
    }

    /// Distinct keys resolved successfully so far. Safe to read mid-build.
    #[must_use]
    pub fn resolved_count(&self) -> usize {
        self.inner.cache.resolved_count()
    }

    /// Shared progress counter for callers that outlive a borrow of the builder.
    #[must_use]
    pub fn progress(&self) -> Arc<AtomicUsize> {
        self.inner.cache.resolved_counter()
    }

    /// Build the dependency tree rooted at `root`.
    ///
    /// # Errors
    /// Returns the root edge's failure. Failures below the root are
    /// returned as records alongside the tree.
    pub async fn build(&self, root: PackageReference) -> Result<Subtree, PkgError> {
        self.build_with_cancel(root, CancellationToken::new()).await
    }

    /// Build the dependency tree, stopping early once `cancel` fires.
    ///
    /// After cancellation, in-flight registry calls fail with
    /// `PKG_RESOLUTION_CANCELLED`, no new edges are expanded, and subtrees
    /// that already completed keep their children.
    ///
    /// # Errors
    /// Returns the root edge's failure, including cancellation of the root.
    pub async fn build_with_cancel(
        &self,
        root: PackageReference,
        cancel: CancellationToken,
    ) -> Result<Subtree, PkgError> {
        debug!(root = %root, "Building dependency tree");
        expand(Arc::clone(&self.inner), root, None, 0, cancel).await
    }

    /// Build the tree under the configured run deadline and aggregate a report.
    ///
    /// # Errors
    /// Returns the root edge's failure.
    pub async fn resolve(&self, root: PackageReference) -> Result<Report, PkgError> {
        let cancel = CancellationToken::new();

        let deadline = self.inner.run_timeout.map(|timeout| {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                warn!(timeout_secs = timeout.as_secs(), "Run deadline reached, cancelling");
                cancel.cancel();
            })
        });

        let result = self.build_with_cancel(root, cancel).await;

        if let Some(deadline) = deadline {
            deadline.abort();
        }

        let (tree, failures) = result?;
        Ok(Report::collect(tree, failures, self.resolved_count()))
    }
}

impl<R: Registry> Inner<R> {
    /// Resolve one reference through the cache.
    async fn resolve(
        &self,
        reference: &PackageReference,
        cancel: &CancellationToken,
    ) -> Result<Arc<ResolvedPackage>, PkgError> {
        self.cache
            .get_or_resolve(&reference.cache_key(), || self.fetch(reference, cancel))
            .await
    }

    /// Cache-miss path: one registry call under a concurrency permit.
    async fn fetch(
        &self,
        reference: &PackageReference,
        cancel: &CancellationToken,
    ) -> Result<ResolvedPackage, PkgError> {
        let _permit = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(PkgError::cancelled(&reference.name)),
            permit = self.permits.acquire() => {
                permit.map_err(|_| PkgError::cancelled(&reference.name))?
            }
        };

        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(PkgError::cancelled(&reference.name)),
            resolved = self.fetch_uncancelled(reference) => resolved,
        }
    }

    async fn fetch_uncancelled(
        &self,
        reference: &PackageReference,
    ) -> Result<ResolvedPackage, PkgError> {
        let name = reference.name.as_str();
        let requested = reference.requested.as_str();

        let (chosen, manifest) = match Reference::parse(requested)? {
            Reference::Range(range) => {
                let mut metadata = self.registry.fetch_package_metadata(name).await?;
                let version = range
                    .max_satisfying(metadata.version_strings())
                    .map(String::from)
                    .ok_or_else(|| PkgError::version_not_found(name, requested))?;
                let manifest = metadata
                    .versions
                    .remove(&version)
                    .ok_or_else(|| PkgError::version_not_found(name, requested))?;
                (version, manifest)
            }
            _ => {
                let target = resolve_reference(name, requested, std::iter::empty())?;
                let manifest = self.registry.fetch_version_manifest(name, &target).await?;
                (target, manifest)
            }
        };

        let resolved_name = if manifest.name.is_empty() {
            name.to_string()
        } else {
            manifest.name.clone()
        };
        let resolved_version = if manifest.version.is_empty() {
            chosen
        } else {
            manifest.version.clone()
        };

        info!(name = %resolved_name, version = %resolved_version, "Resolving");

        Ok(ResolvedPackage {
            name: resolved_name,
            version: resolved_version,
            manifest,
        })
    }
}

/// Expand one edge into a subtree.
///
/// Boxed because it recurses through spawned tasks.
fn expand<R: Registry + 'static>(
    inner: Arc<Inner<R>>,
    reference: PackageReference,
    path: Option<Arc<ActivePath>>,
    depth: usize,
    cancel: CancellationToken,
) -> BoxFuture<'static, Result<Subtree, PkgError>> {
    async move {
        if depth > inner.max_depth {
            return Err(PkgError::depth_exceeded(&reference.name, inner.max_depth));
        }

        let package = inner.resolve(&reference, &cancel).await?;

        if on_path(path.as_ref(), &package.name, &package.version) {
            return Err(PkgError::cycle_detected(&package.name, &package.version));
        }

        let path = Some(Arc::new(ActivePath {
            name: package.name.clone(),
            version: package.version.clone(),
            parent: path,
        }));

        let mut edges: Vec<(PackageReference, Option<JoinHandle<Result<Subtree, PkgError>>>)> =
            Vec::with_capacity(package.manifest.dependencies.len());

        for (dep_name, dep_range) in &package.manifest.dependencies {
            let child = PackageReference::new(dep_name, dep_range);

            if cancel.is_cancelled() {
                edges.push((child, None));
                continue;
            }

            let handle = tokio::spawn(expand(
                Arc::clone(&inner),
                child.clone(),
                path.clone(),
                depth + 1,
                cancel.clone(),
            ));
            edges.push((child, Some(handle)));
        }

        let mut children = Vec::with_capacity(edges.len());
        let mut failures = Vec::new();

        for (child, handle) in edges {
            let outcome = match handle {
                Some(handle) => match handle.await {
                    Ok(outcome) => outcome,
                    Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                    Err(_) => Err(PkgError::cancelled(&child.name)),
                },
                None => Err(PkgError::cancelled(&child.name)),
            };

            match outcome {
                Ok((node, sub_failures)) => {
                    children.push(node);
                    failures.extend(sub_failures);
                }
                Err(reason) => {
                    warn!(
                        name = %child.name,
                        requested = %child.requested,
                        parent = %package.name,
                        code = reason.code(),
                        "Dependency failed"
                    );
                    failures.push(FailureRecord::new(child, reason));
                }
            }
        }

        let node = ResolvedNode {
            name: package.name.clone(),
            version: package.version.clone(),
            dist: package.manifest.dist.clone(),
            children,
        };

        Ok((node, failures))
    }
    .boxed()
}

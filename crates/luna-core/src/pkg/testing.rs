//! In-memory registry for resolver tests.

use super::error::PkgError;
use super::registry::{Dist, PackageMetadata, Registry, VersionManifest};
use super::spec::LATEST;
use bytes::Bytes;
use parking_lot::Mutex;
use semver::Version;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Fake registry with per-route fetch counts and optional latency.
#[derive(Default)]
pub struct FakeRegistry {
    packages: BTreeMap<String, BTreeMap<String, VersionManifest>>,
    dist_tags: BTreeMap<String, BTreeMap<String, String>>,
    failing: HashMap<String, PkgError>,
    artifacts: HashMap<String, Bytes>,
    latency: Duration,
    slow: HashMap<String, Duration>,
    jitter: bool,
    metadata_fetches: Mutex<HashMap<String, usize>>,
    manifest_fetches: Mutex<HashMap<String, usize>>,
    artifact_fetches: Mutex<HashMap<String, usize>>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish `name@version` with the given dependency edges.
    pub fn publish(mut self, name: &str, version: &str, deps: &[(&str, &str)]) -> Self {
        let manifest = VersionManifest {
            name: name.to_string(),
            version: version.to_string(),
            dependencies: deps
                .iter()
                .map(|(n, r)| ((*n).to_string(), (*r).to_string()))
                .collect(),
            dist: Some(Dist {
                tarball: format!("https://registry.test/{name}/-/{name}-{version}.tgz"),
                integrity: None,
            }),
        };
        self.packages
            .entry(name.to_string())
            .or_default()
            .insert(version.to_string(), manifest);
        self
    }

    /// Point a dist-tag at a published version.
    pub fn tag(mut self, name: &str, tag: &str, version: &str) -> Self {
        self.dist_tags
            .entry(name.to_string())
            .or_default()
            .insert(tag.to_string(), version.to_string());
        self
    }

    /// Make every request for `name` fail with `err`.
    pub fn fail(mut self, name: &str, err: PkgError) -> Self {
        self.failing.insert(name.to_string(), err);
        self
    }

    pub fn artifact(mut self, url: &str, body: &'static [u8]) -> Self {
        self.artifacts.insert(url.to_string(), Bytes::from_static(body));
        self
    }

    /// Delay every request by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Delay requests for `name` by `latency` instead of the base latency.
    pub fn slow(mut self, name: &str, latency: Duration) -> Self {
        self.slow.insert(name.to_string(), latency);
        self
    }

    /// Vary the delay per request so completion order differs from spawn order.
    pub fn with_jitter(mut self) -> Self {
        self.jitter = true;
        self
    }

    pub fn metadata_fetches(&self, name: &str) -> usize {
        self.metadata_fetches.lock().get(name).copied().unwrap_or(0)
    }

    pub fn manifest_fetches(&self, name: &str) -> usize {
        self.manifest_fetches.lock().get(name).copied().unwrap_or(0)
    }

    /// Artifact downloads, keyed by URL.
    pub fn artifact_fetches(&self, url: &str) -> usize {
        self.artifact_fetches.lock().get(url).copied().unwrap_or(0)
    }

    pub fn total_fetches(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of requests that were outstanding at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn enter(
        &self,
        counts: &Mutex<HashMap<String, usize>>,
        name: &str,
    ) -> Result<(), PkgError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        *counts.lock().entry(name.to_string()).or_default() += 1;

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = if let Some(slow) = self.slow.get(name) {
            *slow
        } else if self.jitter {
            // 0..=4 times the base latency, varying per call
            self.latency * u32::try_from((call * 7 + 3) % 5).unwrap_or(1)
        } else {
            self.latency
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match self.failing.get(name) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn versions(&self, name: &str) -> Result<&BTreeMap<String, VersionManifest>, PkgError> {
        self.packages
            .get(name)
            .ok_or_else(|| PkgError::not_found(name))
    }
}

impl Registry for FakeRegistry {
    async fn fetch_package_metadata(&self, name: &str) -> Result<PackageMetadata, PkgError> {
        self.enter(&self.metadata_fetches, name).await?;
        let versions = self.versions(name)?;

        Ok(PackageMetadata {
            name: name.to_string(),
            dist_tags: self.dist_tags.get(name).cloned().unwrap_or_default(),
            versions: versions.clone(),
        })
    }

    async fn fetch_version_manifest(
        &self,
        name: &str,
        version: &str,
    ) -> Result<VersionManifest, PkgError> {
        self.enter(&self.manifest_fetches, name).await?;
        let versions = self.versions(name)?;

        let target = match self.dist_tags.get(name).and_then(|tags| tags.get(version)) {
            Some(tagged) => tagged.clone(),
            None if version == LATEST => versions
                .keys()
                .filter_map(|v| Version::parse(v).ok())
                .max()
                .map(|v| v.to_string())
                .ok_or_else(|| PkgError::not_found(name))?,
            None => version.to_string(),
        };

        versions
            .get(&target)
            .cloned()
            .ok_or_else(|| PkgError::not_found(&format!("{name}@{version}")))
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Bytes, PkgError> {
        self.enter(&self.artifact_fetches, url).await?;
        self.artifacts
            .get(url)
            .cloned()
            .ok_or_else(|| PkgError::download_failed(format!("No artifact at '{url}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pkg::error::codes;

    #[tokio::test]
    async fn test_latest_is_highest_published() {
        let registry = FakeRegistry::new()
            .publish("a", "1.10.0", &[])
            .publish("a", "1.9.0", &[]);

        let manifest = registry.fetch_version_manifest("a", LATEST).await.unwrap();
        assert_eq!(manifest.version, "1.10.0");
        assert_eq!(registry.manifest_fetches("a"), 1);
    }

    #[tokio::test]
    async fn test_artifacts() {
        let registry = FakeRegistry::new().artifact("https://registry.test/a.tgz", b"tgz");

        let bytes = registry.fetch_bytes("https://registry.test/a.tgz").await.unwrap();
        assert_eq!(&bytes[..], b"tgz");

        let err = registry.fetch_bytes("https://registry.test/b.tgz").await.unwrap_err();
        assert_eq!(err.code(), codes::PKG_DOWNLOAD_FAILED);

        assert_eq!(registry.artifact_fetches("https://registry.test/a.tgz"), 1);
        assert_eq!(registry.manifest_fetches("https://registry.test/a.tgz"), 0);
        assert_eq!(registry.total_fetches(), 2);
    }
}

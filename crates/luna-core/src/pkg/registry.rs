//! npm registry client.
//!
//! [`Registry`] is the I/O boundary of the resolver: fetch a package's full
//! version index, fetch one version's manifest, or fetch raw artifact
//! bytes. [`RegistryClient`] implements it over HTTP. No retries happen
//! here; every call is bounded by a timeout and fails with a
//! [`PkgError`] naming the package.

use super::error::PkgError;
use super::spec::url_encoded_name;
use crate::config::Config;
use bytes::Bytes;
use indexmap::IndexMap;
use reqwest::header::ACCEPT;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;
use url::Url;

/// Default npm registry URL.
pub const DEFAULT_REGISTRY: &str = "https://registry.npmjs.org/";

/// Requests the abbreviated install metadata where the registry supports it.
pub const ACCEPT_INSTALL_METADATA: &str =
    "application/vnd.npm.install-v1+json; q=1.0, application/json; q=0.8, */*";

/// Maximum artifact size (200 MB).
pub const MAX_ARTIFACT_SIZE: u64 = 200 * 1024 * 1024;

/// Distribution info for one published version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dist {
    #[serde(default)]
    pub tarball: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrity: Option<String>,
}

/// Manifest of one published version: its identity and outgoing edges.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionManifest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    /// Dependency name to requested range, in the order the manifest
    /// declares them. Children are emitted in this order.
    #[serde(default, deserialize_with = "null_as_default")]
    pub dependencies: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dist: Option<Dist>,
}

/// Full published-version index for a package (the "packument").
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageMetadata {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "dist-tags", default, deserialize_with = "null_as_default")]
    pub dist_tags: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub versions: BTreeMap<String, VersionManifest>,
}

impl PackageMetadata {
    /// All published version strings.
    pub fn version_strings(&self) -> impl Iterator<Item = &str> {
        self.versions.keys().map(String::as_str)
    }
}

/// Registries publish `"dependencies": null` often enough to tolerate it.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Source of package metadata.
///
/// Implementations must be shareable across resolution tasks.
pub trait Registry: Send + Sync {
    /// Fetch the full version index for a package.
    fn fetch_package_metadata(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<PackageMetadata, PkgError>> + Send;

    /// Fetch one version's manifest. `version` may also be a dist-tag such as
    /// `latest`, which the registry resolves.
    fn fetch_version_manifest(
        &self,
        name: &str,
        version: &str,
    ) -> impl Future<Output = Result<VersionManifest, PkgError>> + Send;

    /// Fetch an arbitrary artifact.
    fn fetch_bytes(&self, url: &str) -> impl Future<Output = Result<Bytes, PkgError>> + Send;
}

/// HTTP registry client.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    base_url: Url,
    http: Client,
    metadata_timeout: Duration,
    artifact_timeout: Duration,
}

impl RegistryClient {
    /// Create a client with default timeouts for the given base URL.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the HTTP client cannot be created.
    pub fn new(base_url: &str) -> Result<Self, PkgError> {
        Self::from_config(&Config::default().with_registry(base_url))
    }

    /// Create a client from a run configuration.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the HTTP client cannot be created.
    pub fn from_config(config: &Config) -> Result<Self, PkgError> {
        let raw = &config.registry;
        let base_url = Url::parse(raw)
            .map_err(|e| PkgError::registry(format!("Invalid registry URL '{raw}': {e}")))?;

        if base_url.cannot_be_a_base() {
            return Err(PkgError::registry(format!(
                "Invalid registry URL '{raw}': not a base URL"
            )));
        }

        let http = Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(concat!("luna/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PkgError::registry(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            base_url,
            http,
            metadata_timeout: config.metadata_timeout,
            artifact_timeout: config.artifact_timeout,
        })
    }

    /// Get the base URL.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `{base}/{name}`
    pub(crate) fn metadata_url(&self, name: &str) -> Result<Url, PkgError> {
        self.base_url
            .join(&url_encoded_name(name))
            .map_err(|e| PkgError::registry(format!("Failed to build URL for '{name}': {e}")))
    }

    /// `{base}/{name}/{version}`
    pub(crate) fn manifest_url(&self, name: &str, version: &str) -> Result<Url, PkgError> {
        self.base_url
            .join(&format!("{}/{version}", url_encoded_name(name)))
            .map_err(|e| PkgError::registry(format!("Failed to build URL for '{name}': {e}")))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url, name: &str) -> Result<T, PkgError> {
        tracing::debug!(%url, "GET");

        let response = self
            .http
            .get(url.as_str())
            .header(ACCEPT, ACCEPT_INSTALL_METADATA)
            .timeout(self.metadata_timeout)
            .send()
            .await
            .map_err(|e| transport_error(name, e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(PkgError::not_found(name));
        }

        if !status.is_success() {
            return Err(PkgError::registry(format!(
                "Registry returned status {status} for '{name}'"
            )));
        }

        let body = response.bytes().await.map_err(|e| transport_error(name, e))?;

        serde_json::from_slice(&body)
            .map_err(|e| PkgError::malformed(format!("Invalid response for '{name}': {e}")))
    }
}

/// Attach the package name to a transport failure.
fn transport_error(name: &str, e: reqwest::Error) -> PkgError {
    let err = PkgError::from(e);
    PkgError::new(err.code(), format!("{name}: {}", err.message()))
}

impl Registry for RegistryClient {
    async fn fetch_package_metadata(&self, name: &str) -> Result<PackageMetadata, PkgError> {
        let url = self.metadata_url(name)?;
        self.get_json(url, name).await
    }

    async fn fetch_version_manifest(
        &self,
        name: &str,
        version: &str,
    ) -> Result<VersionManifest, PkgError> {
        let url = self.manifest_url(name, version)?;
        self.get_json(url, name).await
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Bytes, PkgError> {
        let response = self
            .http
            .get(url)
            .timeout(self.artifact_timeout)
            .send()
            .await
            .map_err(|e| PkgError::download_failed(format!("Failed to download '{url}': {e}")))?;

        if !response.status().is_success() {
            return Err(PkgError::download_failed(format!(
                "Download failed with status {} for '{url}'",
                response.status()
            )));
        }

        if let Some(len) = response.content_length() {
            if len > MAX_ARTIFACT_SIZE {
                return Err(PkgError::download_failed(format!(
                    "Artifact too large: {len} bytes (max: {MAX_ARTIFACT_SIZE})"
                )));
            }
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| PkgError::download_failed(format!("Failed to read response body: {e}")))?;

        if bytes.len() as u64 > MAX_ARTIFACT_SIZE {
            return Err(PkgError::download_failed(format!(
                "Artifact too large: {} bytes (max: {MAX_ARTIFACT_SIZE})",
                bytes.len()
            )));
        }

        Ok(bytes)
    }
}

use crate::error::Error;
use crate::pkg::registry::DEFAULT_REGISTRY;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Environment variable to override the registry URL.
pub const REGISTRY_ENV: &str = "LUNA_NPM_REGISTRY";
/// Environment variable to override the registry request limit.
pub const CONCURRENCY_ENV: &str = "LUNA_CONCURRENCY";
/// Environment variable to override the metadata/manifest timeout.
pub const METADATA_TIMEOUT_ENV: &str = "LUNA_METADATA_TIMEOUT_SECS";
/// Environment variable to override the artifact download timeout.
pub const ARTIFACT_TIMEOUT_ENV: &str = "LUNA_ARTIFACT_TIMEOUT_SECS";
/// Environment variable to set an overall deadline for one resolution run.
pub const RUN_TIMEOUT_ENV: &str = "LUNA_RUN_TIMEOUT_SECS";

/// Default maximum of concurrent outstanding registry requests.
pub const DEFAULT_CONCURRENCY: usize = 32;

/// Default maximum dependency depth.
pub const DEFAULT_MAX_DEPTH: usize = 100;

/// Configuration for one resolution run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Registry base URL, always with a trailing slash.
    pub registry: String,

    /// Maximum concurrent outstanding registry requests.
    pub concurrency: usize,

    /// Timeout for each metadata or manifest request.
    pub metadata_timeout: Duration,

    /// Timeout for each artifact download.
    pub artifact_timeout: Duration,

    /// TCP connect timeout.
    pub connect_timeout: Duration,

    /// Maximum dependency depth before an edge is failed.
    pub max_depth: usize,

    /// Overall deadline for one run. `None` means no deadline.
    pub run_timeout: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            registry: DEFAULT_REGISTRY.to_string(),
            concurrency: DEFAULT_CONCURRENCY,
            metadata_timeout: Duration::from_secs(10),
            artifact_timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(5),
            max_depth: DEFAULT_MAX_DEPTH,
            run_timeout: None,
        }
    }
}

impl Config {
    /// Defaults overridden by any `LUNA_*` environment variables that are set.
    ///
    /// # Errors
    /// Returns [`Error::InvalidEnv`] if a set variable cannot be parsed.
    pub fn from_env() -> Result<Self, Error> {
        let mut config = Self::default();

        if let Some(url) = env_var(REGISTRY_ENV) {
            config = config.with_registry(&url);
        }

        if let Some(concurrency) = parse_env::<usize>(CONCURRENCY_ENV)? {
            if concurrency == 0 {
                return Err(Error::invalid_env(CONCURRENCY_ENV, "0", "must be at least 1"));
            }
            config.concurrency = concurrency;
        }

        if let Some(secs) = parse_env::<u64>(METADATA_TIMEOUT_ENV)? {
            config.metadata_timeout = Duration::from_secs(secs);
        }

        if let Some(secs) = parse_env::<u64>(ARTIFACT_TIMEOUT_ENV)? {
            config.artifact_timeout = Duration::from_secs(secs);
        }

        if let Some(secs) = parse_env::<u64>(RUN_TIMEOUT_ENV)? {
            config.run_timeout = Some(Duration::from_secs(secs));
        }

        Ok(config)
    }

    /// Set the registry base URL. A trailing slash is added if missing so
    /// that package paths join under it.
    #[must_use]
    pub fn with_registry(mut self, url: &str) -> Self {
        let url = url.trim();
        self.registry = if url.ends_with('/') {
            url.to_string()
        } else {
            format!("{url}/")
        };
        self
    }

    /// Set the registry request limit. Clamped to at least 1.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Set the metadata/manifest timeout.
    #[must_use]
    pub fn with_metadata_timeout(mut self, timeout: Duration) -> Self {
        self.metadata_timeout = timeout;
        self
    }

    /// Set the maximum dependency depth.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Set the overall run deadline.
    #[must_use]
    pub fn with_run_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.run_timeout = timeout;
        self
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T>(name: &'static str) -> Result<Option<T>, Error>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let Some(raw) = env_var(name) else {
        return Ok(None);
    };

    raw.trim()
        .parse::<T>()
        .map(Some)
        .map_err(|e| Error::invalid_env(name, &raw, e))
}

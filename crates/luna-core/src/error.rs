use crate::pkg::PkgError;
use thiserror::Error;

/// Core error type for luna operations outside a single resolution edge.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid value for {var}: '{value}' ({reason})")]
    InvalidEnv {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error(transparent)]
    Pkg(#[from] PkgError),
}

impl Error {
    #[must_use]
    pub fn invalid_env(var: &'static str, value: &str, reason: impl std::fmt::Display) -> Self {
        Self::InvalidEnv {
            var,
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Stable error code, matching the resolution codes where applicable.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidEnv { .. } => "CONFIG_INVALID_ENV",
            Self::Pkg(e) => e.code(),
        }
    }
}

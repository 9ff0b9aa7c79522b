/// The current version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Returns a formatted version string including build metadata if available.
#[must_use]
pub fn version_string() -> String {
    match option_env!("LUNA_BUILD_GIT_HASH") {
        Some(hash) => format!("luna {VERSION} ({hash})"),
        None => format!("luna {VERSION}"),
    }
}

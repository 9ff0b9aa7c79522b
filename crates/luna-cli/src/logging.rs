//! Logging initialization for the CLI.
//!
//! Logging is owned by the CLI crate to keep the library lightweight.
//! Logs always go to stderr so stdout stays machine-readable.

use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the tracing subscriber.
///
/// # Arguments
/// * `verbosity` - 0 = INFO, 1 = DEBUG, 2+ = TRACE
/// * `json` - If true, output JSON lines to stderr
///
/// JSON output format:
/// ```json
/// {"timestamp":"...","level":"INFO","fields":{"message":"Resolving","name":"react","version":"18.2.0"},"target":"luna_core::pkg::tree"}
/// ```
pub fn init(verbosity: u8, json: bool) {
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };

    // RUST_LOG is honoured; the verbosity flag raises luna's own crates
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"))
        .add_directive(format!("luna_core={level}").parse().unwrap_or_else(|_| level.into()))
        .add_directive(format!("luna={level}").parse().unwrap_or_else(|_| level.into()));

    let subscriber = tracing_subscriber::registry().with(filter);

    // A second init (tests, embedding) keeps the existing subscriber
    if json {
        let _ = subscriber
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_writer(std::io::stderr),
            )
            .try_init();
    } else {
        let _ = subscriber
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init();
    }
}

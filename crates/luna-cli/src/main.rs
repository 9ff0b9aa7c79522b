#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::needless_pass_by_value)]

mod commands;
mod logging;

use clap::Parser;
use luna_core::Config;
use miette::{IntoDiagnostic, Result};

#[derive(Parser, Debug)]
#[command(name = "luna")]
#[command(author, version, about = "Concurrent npm dependency resolver", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v for DEBUG, -vv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit JSON formatted output (stable, machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Registry base URL
    #[arg(long, global = true, value_name = "URL", env = "LUNA_NPM_REGISTRY")]
    registry: Option<String>,

    /// Maximum concurrent registry requests
    #[arg(long, global = true, value_name = "N")]
    concurrency: Option<usize>,

    /// Give up on the whole run after this many seconds
    #[arg(long, global = true, value_name = "SECS")]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Print version information
    Version,

    /// Resolve the full dependency tree of a package
    #[command(visible_alias = "i")]
    Install {
        /// Package to resolve: name, name@range, @scope/name@range
        spec: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::init(cli.verbose, cli.json);

    let mut config = Config::from_env().into_diagnostic()?;
    if let Some(registry) = &cli.registry {
        config = config.with_registry(registry);
    }
    if let Some(concurrency) = cli.concurrency {
        config = config.with_concurrency(concurrency);
    }
    if let Some(secs) = cli.timeout {
        config = config.with_run_timeout(Some(std::time::Duration::from_secs(secs)));
    }

    match &cli.command {
        Some(Commands::Install { spec }) => {
            let span = tracing::info_span!("install", cmd = "install", spec = %spec);
            let _guard = span.enter();
            commands::install::run(spec, &config, cli.json)
        }
        Some(Commands::Version) | None => commands::version::run(cli.json),
    }
}

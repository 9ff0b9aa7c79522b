//! `luna install <spec>`: resolve the full dependency tree for one package.

use luna_core::pkg::{PackageSpec, PkgError, ResolvedPackageInfo};
use luna_core::pkg::{RegistryClient, Report, TreeBuilder};
use luna_core::Config;
use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use std::time::Duration;
use tracing::info;

/// How often resolution progress is logged.
const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

/// JSON output of `luna install --json`.
#[derive(Serialize)]
struct InstallOutput<'a> {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    complete: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    packages: Option<Vec<ResolvedPackageInfo>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<&'a Report>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a PkgError>,
}

pub fn run(spec: &str, config: &Config, json: bool) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new().into_diagnostic()?;
    let result = runtime.block_on(resolve(spec, config));

    match result {
        Ok(report) => {
            if json {
                let output = InstallOutput {
                    ok: true,
                    complete: Some(report.is_complete()),
                    packages: Some(report.packages()),
                    report: Some(&report),
                    error: None,
                };
                println!("{}", serde_json::to_string_pretty(&output).into_diagnostic()?);
            } else {
                print!("{}", report.summary());
                if !report.is_complete() {
                    eprintln!("warning: dependency tree is incomplete");
                }
            }
            // Failures below the root are reported but do not fail the run
            Ok(())
        }
        Err(err) => {
            if json {
                let output = InstallOutput {
                    ok: false,
                    complete: None,
                    packages: None,
                    report: None,
                    error: Some(&err),
                };
                println!("{}", serde_json::to_string_pretty(&output).into_diagnostic()?);
            } else {
                eprintln!("error: {err}");
            }
            std::process::exit(1);
        }
    }
}

async fn resolve(spec: &str, config: &Config) -> Result<Report, PkgError> {
    let root = PackageSpec::parse(spec)?.into_reference();
    let client = RegistryClient::from_config(config)?;
    let builder = TreeBuilder::new(client, config);

    info!(root = %root, registry = %config.registry, "Resolving");

    let progress = builder.progress();
    let ticker = tokio::spawn(async move {
        let mut interval = tokio::time::interval(PROGRESS_INTERVAL);
        interval.tick().await;
        let mut last = 0;
        loop {
            interval.tick().await;
            let now = progress.load(std::sync::atomic::Ordering::Relaxed);
            if now != last {
                info!(resolved = now, "Resolving...");
                last = now;
            }
        }
    });

    let result = builder.resolve(root).await;
    ticker.abort();
    result
}

use luna_core::version::{version_string, VERSION};
use luna_core::pkg::DEFAULT_REGISTRY;
use miette::{IntoDiagnostic, Result};

pub fn run(json: bool) -> Result<()> {
    if json {
        let output = serde_json::json!({
            "name": "luna",
            "version": VERSION,
            "default_registry": DEFAULT_REGISTRY,
        });
        println!("{}", serde_json::to_string_pretty(&output).into_diagnostic()?);
    } else {
        println!("{}", version_string());
    }
    Ok(())
}

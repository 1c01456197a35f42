//! CLI handlers for the `mdsign config` subcommand.

use std::path::Path;

use anyhow::Result;
use mdsign_config::{ResolvedConfig, ShowFormat, env::env_fallbacks};

use super::OutputFormat;

/// Show the resolved configuration with source annotations.
pub(crate) fn show_config(
    resolved: &ResolvedConfig,
    format: OutputFormat,
    section: Option<&str>,
) -> Result<()> {
    let show_format = match format {
        OutputFormat::Json => ShowFormat::Json,
        OutputFormat::Pretty => ShowFormat::Toml,
    };

    let output = resolved
        .show(show_format, section)
        .map_err(|e| anyhow::anyhow!("failed to format config: {e}"))?;

    println!("{output}");
    Ok(())
}

/// Report which files made up the configuration.
#[allow(clippy::unnecessary_wraps)]
pub(crate) fn validate_config(resolved: &ResolvedConfig) -> Result<()> {
    println!("Configuration is valid.");
    if !resolved.loaded_files.is_empty() {
        println!("\nLoaded files:");
        for path in &resolved.loaded_files {
            println!("  - {path}");
        }
    }
    Ok(())
}

/// Show all config file paths that are checked.
#[allow(clippy::unnecessary_wraps)]
pub(crate) fn show_paths(explicit: Option<&Path>) -> Result<()> {
    let base = directories::BaseDirs::new();
    let home = base.as_ref().map(directories::BaseDirs::home_dir);

    let paths = ResolvedConfig::config_paths(home, explicit);

    println!("Configuration files checked (in precedence order):\n");
    for (i, path) in paths.iter().enumerate() {
        let exists = Path::new(path).exists();
        let status = if exists { "found" } else { "not found" };
        println!("  {}. {path}  [{status}]", i.saturating_add(1));
    }

    println!("\nEnvironment variable fallbacks:");
    for (var, field) in env_fallbacks() {
        println!("  {var:<24} -> {field}");
    }

    Ok(())
}

//! Command line interface for the asset bundler.
//!
//! This module provides the CLI for pipeline operations, with argument
//! parsing, command execution and user feedback.

mod args;
pub mod commands;
mod output;

pub use args::{Args, CONFIG_ENV, Command, RuntimeConfig, default_config_path};
pub use output::OutputManager;

use crate::bundler::Settings;
use crate::error::{CliError, Result};
use anyhow::Context;

/// Main CLI entry point
pub async fn run() -> Result<i32> {
    let args = Args::parse_args();
    validate_args(&args).map_err(|reason| CliError::InvalidArguments { reason })?;

    let config = create_runtime_config(&args);
    let settings = load_settings(&args).await?;
    config.verbose_println(&format!(
        "{} {} ({}) -> {}",
        settings.build_name(),
        settings.build_target(),
        settings.app_version(),
        settings.ledger_dir().display()
    ))?;

    commands::execute(&args.command, settings, &config).await
}

/// Validate arguments without executing (for testing)
pub fn validate_args(args: &Args) -> std::result::Result<(), String> {
    args.validate()
}

/// Create runtime configuration from arguments
pub fn create_runtime_config(args: &Args) -> RuntimeConfig {
    RuntimeConfig::from(args)
}

/// Loads the settings file named by `--config`, the environment or the
/// user config directory.
pub async fn load_settings(args: &Args) -> Result<Settings> {
    let path = args.config_path().ok_or_else(|| CliError::MissingArgument {
        argument: format!("--config (or {CONFIG_ENV})"),
    })?;
    let settings = Settings::load(&path)
        .await
        .with_context(|| format!("loading settings from {}", path.display()))?;
    Ok(settings)
}

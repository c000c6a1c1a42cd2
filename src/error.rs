//! Top-level error types for the asset bundler CLI and library.
//!
//! This module defines the error surfaced to the binary, with recovery suggestions.

use thiserror::Error;

use crate::bundler::{DownloadError, LedgerError, LoadError, UploadError};

/// Result type alias for bundler operations
pub type Result<T> = std::result::Result<T, BundlerError>;

/// Main error type for all bundler operations
#[derive(Error, Debug)]
pub enum BundlerError {
    /// CLI argument errors
    #[error("CLI error: {0}")]
    Cli(#[from] CliError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Bundler errors
    #[error("Bundler error: {0}")]
    Bundler(#[from] crate::bundler::Error),

    /// Generic errors from anyhow
    #[error("{0:#}")]
    Anyhow(#[from] anyhow::Error),
}

/// CLI-specific errors
#[derive(Error, Debug)]
pub enum CliError {
    /// Invalid command line arguments
    #[error("Invalid arguments: {reason}")]
    InvalidArguments {
        /// Reason for the error
        reason: String,
    },

    /// Missing required argument
    #[error("Missing required argument: {argument}")]
    MissingArgument {
        /// Argument name
        argument: String,
    },

    /// Command execution failed
    #[error("Command execution failed: {command} - {reason}")]
    ExecutionFailed {
        /// Command that failed
        command: String,
        /// Reason for the error
        reason: String,
    },
}

impl BundlerError {
    /// Get actionable recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<String> {
        use crate::bundler::Error;

        match self {
            BundlerError::Bundler(Error::Upload(UploadError::Provisioning { .. })) => vec![
                "Check the upload server host, port and credentials in the config file".to_string(),
                "Verify the account may list and create directories under the build root".to_string(),
            ],
            BundlerError::Bundler(Error::Upload(UploadError::Failed { .. })) => vec![
                "Re-run `upload`; artifacts already uploaded are skipped".to_string(),
                "Increase `server.net_retries` or `server.net_timeout_secs` for flaky links".to_string(),
            ],
            BundlerError::Bundler(Error::Download(DownloadError::Failed { .. } | DownloadError::Cancelled { .. })) => {
                vec!["Re-run `download`; verified files are kept and partial files resume".to_string()]
            }
            BundlerError::Bundler(Error::Download(DownloadError::Unavailable(_))) => vec![
                "Set `server.download_server.url`, or `root` for a mirror directory".to_string(),
            ],
            BundlerError::Bundler(Error::Ledger(LedgerError::InvalidTransition { .. })) => vec![
                "Run `reset` to clear upload status, then upload again".to_string(),
            ],
            BundlerError::Bundler(Error::Load(LoadError::DependencyCycle { .. })) => vec![
                "Rebuild the bundles; the dependency manifest must not contain cycles".to_string(),
            ],
            BundlerError::Bundler(Error::Config(_) | Error::Toml(_)) | BundlerError::Toml(_) => vec![
                "Check the TOML config passed with --config".to_string(),
            ],
            BundlerError::Anyhow(e) if e.chain().any(is_config_error) => vec![
                "Check the TOML config passed with --config".to_string(),
            ],
            _ => vec!["Check the error message above for specific details".to_string()],
        }
    }
}

fn is_config_error(cause: &(dyn std::error::Error + 'static)) -> bool {
    matches!(
        cause.downcast_ref::<crate::bundler::Error>(),
        Some(crate::bundler::Error::Config(_) | crate::bundler::Error::Toml(_) | crate::bundler::Error::Fs { .. })
    )
}

//! Error types for bundle pipeline operations.
//!
//! Component errors ([`LedgerError`], [`UploadError`], [`DownloadError`],
//! [`LoadError`]) live next to their components and fold into [`Error`]
//! through `#[from]`.

use std::fmt::Display;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::download::DownloadError;
use super::ledger::LedgerError;
use super::loader::LoadError;
use super::upload::UploadError;

/// Result type alias for bundle pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Library-level error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Plain IO error without path context.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// IO error annotated with the operation and the path involved.
    #[error("{context} ({}): {source}", path.display())]
    Fs {
        /// Operation that failed
        context: String,
        /// Path the operation touched
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// JSON (de)serialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML configuration parse failure.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// HTTP client failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Ledger state violation.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Upload session failure.
    #[error(transparent)]
    Upload(#[from] UploadError),

    /// Client download failure.
    #[error(transparent)]
    Download(#[from] DownloadError),

    /// Bundle load failure.
    #[error(transparent)]
    Load(#[from] LoadError),

    /// Invalid or incomplete configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Script template failure.
    #[error("template error: {0}")]
    Template(String),

    /// Anything else.
    #[error("{0}")]
    GenericError(String),
}

/// Adds filesystem context to IO results.
pub trait ErrorExt<T> {
    /// Wraps an IO error with a description of the operation and its path.
    fn fs_context(self, context: &str, path: impl AsRef<Path>) -> Result<T>;
}

impl<T> ErrorExt<T> for std::result::Result<T, std::io::Error> {
    fn fs_context(self, context: &str, path: impl AsRef<Path>) -> Result<T> {
        self.map_err(|source| Error::Fs {
            context: context.to_string(),
            path: path.as_ref().to_path_buf(),
            source,
        })
    }
}

/// Converts options and foreign results into [`Error::GenericError`] with a message.
pub trait Context<T> {
    /// Attaches `msg` to the failure case.
    fn context<C: Display>(self, msg: C) -> Result<T>;
}

impl<T> Context<T> for Option<T> {
    fn context<C: Display>(self, msg: C) -> Result<T> {
        self.ok_or_else(|| Error::GenericError(msg.to_string()))
    }
}

impl<T, E: Display> Context<T> for std::result::Result<T, E> {
    fn context<C: Display>(self, msg: C) -> Result<T> {
        self.map_err(|e| Error::GenericError(format!("{msg}: {e}")))
    }
}

/// Returns early with a formatted [`Error::GenericError`].
#[macro_export]
macro_rules! bail {
    ($($arg:tt)*) => {
        return Err($crate::bundler::Error::GenericError(format!($($arg)*)))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fs_context_keeps_path() {
        let err: Result<()> = Err(std::io::Error::from(std::io::ErrorKind::NotFound))
            .fs_context("reading ledger", "/tmp/UploadList.json");
        let msg = err.unwrap_err().to_string();
        assert!(msg.contains("reading ledger"));
        assert!(msg.contains("UploadList.json"));
    }

    #[test]
    fn option_context_message() {
        let none: Option<u8> = None;
        let err = none.context("build_target is required").unwrap_err();
        assert_eq!(err.to_string(), "build_target is required");
    }
}

//! Client download: mirrors uploaded bundles into the local bundle cache.
//!
//! The [`Downloader`] fetches the published catalogs (`UploadList.json`,
//! `BundlesMap.json`), merges the downloadable ledger entries into a
//! persistent [`DownloadList`] and then fetches every pending file on a
//! bounded worker pool:
//!
//! 1. payload before manifest, each file retried a fixed number of times
//! 2. partial files resume where the source supports it
//! 3. every finished file is checked against the recorded size and hash
//!
//! Files land in `<bundles_dir>/<Normal|Scenes>/<upload timestamp>/`, the
//! layout the [`LoadManager`](crate::bundler::LoadManager) reads from.

mod downloader;
mod list;
mod source;

pub use downloader::{Catalogs, DownloadReport, Downloader, fetch_with_retry};
pub use list::{DOWNLOAD_LIST_FILE, DownloadList, DownloadTarget};
pub use source::{BundleSource, HttpSource, LocalSource};

use std::fmt;
use thiserror::Error;

/// One file that could not be downloaded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DownloadFailure {
    /// Target number; 0 for catalogs.
    pub no: u32,
    pub bundle_id: String,
    pub remote_path: String,
    pub detail: String,
    pub cancelled: bool,
    /// Attempts that were not made.
    pub retries_left: u32,
}

impl fmt::Display for DownloadFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.no == 0 {
            write!(f, "{}: {}", self.remote_path, self.detail)
        } else {
            write!(f, "#{} {} <- {}: {}", self.no, self.bundle_id, self.remote_path, self.detail)
        }
    }
}

/// Download errors.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// A source operation failed.
    #[error("{operation} {target} failed: {detail}")]
    Remote {
        operation: &'static str,
        target: String,
        detail: String,
    },

    /// A downloaded file does not match its recorded size or hash.
    #[error("{path} does not match its record: {detail}")]
    Mismatch { path: String, detail: String },

    /// A published catalog is missing on the server.
    #[error("catalog {name} is not published")]
    CatalogMissing { name: String },

    /// No download list entry carries this number.
    #[error("no download target with number {no}")]
    UnknownTarget { no: u32 },

    /// One or more files could not be downloaded.
    #[error("{} download failure(s); first: {}", errors.len(), errors.first().map(ToString::to_string).unwrap_or_default())]
    Failed { errors: Vec<DownloadFailure> },

    /// The session was cancelled before every file arrived.
    #[error("download cancelled after {done} of {total} files")]
    Cancelled { done: u64, total: u64 },

    /// The configured download server cannot be used.
    #[error("download server unavailable: {0}")]
    Unavailable(String),
}

impl DownloadError {
    pub(crate) fn remote(operation: &'static str, target: impl Into<String>, detail: impl fmt::Display) -> Self {
        DownloadError::Remote {
            operation,
            target: target.into(),
            detail: detail.to_string(),
        }
    }
}

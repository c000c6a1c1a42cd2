//! Upload pipeline: ships pending ledger artifacts to a remote store.
//!
//! An [`UploadManager`] starts an [`UploadSession`], which runs as a spawned
//! task:
//!
//! 1. provision every remote directory the session needs (fail-fast)
//! 2. upload each pending artifact on a bounded worker pool, payload before
//!    manifest, retrying each file a fixed number of times
//! 3. on full success, back up the uploaded files, export the catalogs,
//!    upload them and purge the CDN
//!
//! Callers poll the session or consume its event channel.

mod backup;
mod cdn;
mod dir_cache;
mod manager;
mod remote;
mod uploader;

pub use backup::backup_uploaded;
pub use cdn::{CdnPurger, hmac_sha1, rfc1123_date};
pub use dir_cache::{ServerDirectoryCache, provision_dir, provision_segments};
pub use manager::{SessionState, UploadContext, UploadEvent, UploadManager, UploadReport, UploadSession};
pub use remote::{CurlStore, HttpStore, LocalStore, RemoteStore};
pub use uploader::{TransferFailure, Uploader, put_with_retry};

use std::fmt;
use thiserror::Error;

/// Category of a per-file or per-session upload failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UploadErrorKind {
    /// A remote directory could not be listed or created.
    DirectoryProvisioning,
    /// Every attempt to transfer a file failed.
    TransferFailed,
    /// The session was cancelled before the file was transferred.
    Cancelled,
    /// The file to upload is not on disk.
    LocalFileMissing,
}

/// One failure reported by a worker or the orchestrator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadErrorDetail {
    pub kind: UploadErrorKind,
    /// Artifact number; 0 for session-level failures.
    pub no: u32,
    pub bundle_id: String,
    pub remote_path: String,
    pub detail: String,
    /// Attempts that were not made.
    pub retries_left: u32,
}

impl fmt::Display for UploadErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.no == 0 {
            write!(f, "{:?} at {}: {}", self.kind, self.remote_path, self.detail)
        } else {
            write!(
                f,
                "{:?} for #{} {} -> {}: {}",
                self.kind, self.no, self.bundle_id, self.remote_path, self.detail
            )
        }
    }
}

/// Upload pipeline errors.
#[derive(Debug, Error)]
pub enum UploadError {
    /// A remote directory could not be provisioned; nothing was transferred.
    #[error("failed to provision remote directory {path}: {detail}")]
    Provisioning { path: String, detail: String },

    /// One or more files could not be uploaded.
    #[error("{} upload failure(s); first: {}", errors.len(), errors.first().map(ToString::to_string).unwrap_or_default())]
    Failed { errors: Vec<UploadErrorDetail> },

    /// A remote store operation failed.
    #[error("{operation} {target} failed: {detail}")]
    Remote {
        operation: &'static str,
        target: String,
        detail: String,
    },

    /// The configured upload server cannot be used.
    #[error("upload server unavailable: {0}")]
    Unavailable(String),
}

impl UploadError {
    pub(crate) fn remote(operation: &'static str, target: impl Into<String>, detail: impl fmt::Display) -> Self {
        UploadError::Remote {
            operation,
            target: target.into(),
            detail: detail.to_string(),
        }
    }
}

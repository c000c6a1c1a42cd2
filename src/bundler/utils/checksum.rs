//! Content hashing for built bundles.
//!
//! Provides streaming SHA-256 digests of bundle payloads and manifest
//! side-files, used by the ledger to detect unchanged build output.

use crate::bundler::{Result, error::ErrorExt};
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::io::AsyncReadExt;

/// Hash and size of one file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FileDigest {
    /// Hex-encoded SHA-256 (64 characters).
    pub hash: String,
    /// File size in bytes.
    pub size: u64,
}

/// Calculates the SHA-256 digest and size of a file.
///
/// Reads the file in 8KB chunks to handle large bundles efficiently.
///
/// # Arguments
///
/// * `path` - File to hash
///
/// # Returns
///
/// * `Ok(FileDigest)` - Hex hash and byte count
/// * `Err` - If the file cannot be opened or read
pub async fn digest_file(path: &Path) -> Result<FileDigest> {
    let mut file = tokio::fs::File::open(path)
        .await
        .fs_context("opening file for hashing", path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 8192];
    let mut size = 0u64;

    loop {
        let n = file
            .read(&mut buffer)
            .await
            .fs_context("reading file for hash calculation", path)?;
        if n == 0 {
            break;
        }
        size += n as u64;
        hasher.update(&buffer[..n]);
    }

    Ok(FileDigest {
        hash: format!("{:x}", hasher.finalize()),
        size,
    })
}

/// Like [`digest_file`], but returns `None` when the file does not exist.
///
/// Manifest side-files are optional (scene bundles have none), so a missing
/// file is not an error here.
pub async fn digest_if_exists(path: &Path) -> Result<Option<FileDigest>> {
    if !tokio::fs::try_exists(path)
        .await
        .fs_context("checking file existence", path)?
    {
        return Ok(None);
    }
    digest_file(path).await.map(Some)
}

//! File system utilities for the pipeline.
//!
//! Idempotent create/remove helpers, cross-device moves and the
//! delete-then-write JSON persistence used for every catalog.

use crate::bundler::error::{ErrorExt, Result};
use serde::{Serialize, de::DeserializeOwned};
use std::{io, path::Path};
use tokio::fs;

/// Creates all of the directories of the specified path.
///
/// Succeeds if the directory already exists.
pub async fn create_dir_all(path: &Path) -> Result<()> {
    fs::create_dir_all(path)
        .await
        .fs_context("creating directory", path)
}

/// Removes a file if it exists.
pub async fn remove_file(path: &Path) -> Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()), // Idempotent
        Err(e) => Err(e).fs_context("removing file", path),
    }
}

/// Moves a file, creating the destination's parent directories.
///
/// Falls back to copy + remove when a rename crosses filesystems.
pub async fn move_file(from: &Path, to: &Path) -> Result<()> {
    if let Some(dest_dir) = to.parent() {
        create_dir_all(dest_dir).await?;
    }
    match fs::rename(from, to).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(e).fs_context("moving file", from),
        Err(_) => {
            fs::copy(from, to).await.fs_context("copying file", from)?;
            remove_file(from).await
        }
    }
}

/// Lists regular files beneath `root` recursively.
///
/// If `root` is a file, returns just that file. Paths come back sorted so
/// partitioning is deterministic.
pub async fn list_files(root: &Path) -> Result<Vec<std::path::PathBuf>> {
    let root = root.to_path_buf();

    tokio::task::spawn_blocking(move || {
        if root.is_file() {
            return Ok(vec![root]);
        }
        let mut files = Vec::new();
        for entry in walkdir::WalkDir::new(&root).follow_links(false) {
            let entry = entry.map_err(io::Error::from).fs_context("walking directory", &root)?;
            if entry.file_type().is_file() {
                files.push(entry.into_path());
            }
        }
        files.sort();
        Ok::<_, crate::bundler::error::Error>(files)
    })
    .await
    .map_err(|e| {
        crate::bundler::error::Error::GenericError(format!("Directory walk task panicked: {}", e))
    })?
}

/// Lists the immediate subdirectories of `root`, sorted.
pub async fn list_subdirs(root: &Path) -> Result<Vec<std::path::PathBuf>> {
    let mut entries = fs::read_dir(root).await.fs_context("reading directory", root)?;
    let mut dirs = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .fs_context("reading directory entry", root)?
    {
        if entry
            .file_type()
            .await
            .fs_context("reading file type", entry.path())?
            .is_dir()
        {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// Writes `value` as pretty JSON, deleting any previous file first.
pub async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value)?;
    if let Some(parent) = path.parent() {
        create_dir_all(parent).await?;
    }
    remove_file(path).await?;
    fs::write(path, json).await.fs_context("writing JSON file", path)
}

/// Reads JSON from `path`, returning `None` if the file does not exist.
pub async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).fs_context("reading JSON file", path),
    }
}

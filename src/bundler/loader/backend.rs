//! Bundle file access for the load manager.

use super::LoadError;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// An opened bundle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadedBundle {
    pub id: String,
    pub path: PathBuf,
    pub data: Arc<[u8]>,
}

impl LoadedBundle {
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// Shared handle to a cached bundle.
pub type LoadedBundleHandle = Arc<LoadedBundle>;

/// Opens and releases bundle files.
///
/// The load manager owns its backend exclusively, so methods take `&mut self`.
pub trait BundleBackend {
    fn open(&mut self, id: &str, path: &Path) -> Result<LoadedBundle, LoadError>;

    fn open_async(&mut self, id: &str, path: &Path) -> impl Future<Output = Result<LoadedBundle, LoadError>>;

    /// Called once when a bundle leaves the cache.
    fn release(&mut self, _bundle: &LoadedBundle) {}
}

/// Reads whole bundle files from disk.
#[derive(Clone, Copy, Debug, Default)]
pub struct FileBackend;

fn backend_error(id: &str, path: &Path, e: std::io::Error) -> LoadError {
    LoadError::Backend {
        id: id.to_string(),
        path: path.to_path_buf(),
        detail: e.to_string(),
    }
}

impl BundleBackend for FileBackend {
    fn open(&mut self, id: &str, path: &Path) -> Result<LoadedBundle, LoadError> {
        let data = std::fs::read(path).map_err(|e| backend_error(id, path, e))?;
        Ok(LoadedBundle {
            id: id.to_string(),
            path: path.to_path_buf(),
            data: data.into(),
        })
    }

    async fn open_async(&mut self, id: &str, path: &Path) -> Result<LoadedBundle, LoadError> {
        let data = tokio::fs::read(path).await.map_err(|e| backend_error(id, path, e))?;
        Ok(LoadedBundle {
            id: id.to_string(),
            path: path.to_path_buf(),
            data: data.into(),
        })
    }
}

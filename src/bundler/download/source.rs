//! Sources bundles are downloaded from.
//!
//! Remote paths are `/`-separated and relative to the build root.

use super::DownloadError;
use crate::bundler::Result;
use crate::bundler::error::ErrorExt;
use crate::bundler::settings::DownloadServer;
use crate::bundler::utils::http;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

/// Origin the downloader fetches from.
pub trait BundleSource: Send + Sync + 'static {
    fn id(&self) -> &str;

    /// Fetches `remote_path` into `dest`, whose parent exists.
    ///
    /// An existing `dest` may be resumed. Returns the bytes written by this call.
    fn fetch(&self, remote_path: &str, dest: &Path) -> impl Future<Output = Result<u64>> + Send;
}

/// HTTP download server with `Range` resume.
#[derive(Clone, Debug)]
pub struct HttpSource {
    id: String,
    base: url::Url,
    client: reqwest::Client,
}

impl HttpSource {
    /// Downloads from [`DownloadServer::base_url`] of `build_name`.
    pub fn new(server: &DownloadServer, build_name: &str, timeout: Duration) -> Result<Self> {
        let mut base = url::Url::parse(&server.base_url(build_name.trim_matches('/')))
            .map_err(|e| DownloadError::Unavailable(format!("invalid download url: {e}")))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self {
            id: server.id.clone(),
            base,
            client: http::client(timeout)?,
        })
    }

    fn url(&self, remote_path: &str) -> Result<url::Url> {
        self.base
            .join(remote_path.trim_start_matches('/'))
            .map_err(|e| crate::bundler::Error::from(DownloadError::remote("resolve", remote_path, e)))
    }
}

impl BundleSource for HttpSource {
    fn id(&self) -> &str {
        &self.id
    }

    async fn fetch(&self, remote_path: &str, dest: &Path) -> Result<u64> {
        let offset = match tokio::fs::metadata(dest).await {
            Ok(meta) => meta.len(),
            Err(_) => 0,
        };
        let mut request = self.client.get(self.url(remote_path)?);
        if offset > 0 {
            request = request.header(reqwest::header::RANGE, format!("bytes={offset}-"));
        }
        let mut response = request.send().await?;
        let status = response.status();
        // 416: the local file already holds every byte.
        if status == reqwest::StatusCode::RANGE_NOT_SATISFIABLE {
            return Ok(0);
        }
        if !status.is_success() {
            return Err(DownloadError::remote("download", remote_path, status).into());
        }

        let append = status == reqwest::StatusCode::PARTIAL_CONTENT;
        if offset > 0 && !append {
            log::debug!("{} ignored the range request; restarting {}", self.id, remote_path);
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(dest)
            .await
            .fs_context("opening download file", dest)?;
        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk)
                .await
                .fs_context("writing download file", dest)?;
            written += chunk.len() as u64;
        }
        file.flush().await.fs_context("flushing download file", dest)?;
        Ok(written)
    }
}

/// Mirror directory on the local filesystem, laid out like the server.
#[derive(Clone, Debug)]
pub struct LocalSource {
    id: String,
    root: PathBuf,
}

impl LocalSource {
    /// Reads `<root>/<build_name>/...`.
    pub fn new(id: impl Into<String>, root: &Path, build_name: &str) -> Self {
        Self {
            id: id.into(),
            root: root.join(build_name.trim_matches('/')),
        }
    }

    /// Uses [`DownloadServer::root`] as the mirror directory.
    pub fn from_server(server: &DownloadServer, build_name: &str) -> Result<Self> {
        let root = server
            .root
            .as_deref()
            .ok_or_else(|| DownloadError::Unavailable("download server has no mirror root".into()))?;
        Ok(Self::new(server.id.clone(), root, build_name))
    }

    fn path(&self, remote: &str) -> PathBuf {
        remote
            .split('/')
            .filter(|s| !s.is_empty())
            .fold(self.root.clone(), |p, s| p.join(s))
    }
}

impl BundleSource for LocalSource {
    fn id(&self) -> &str {
        &self.id
    }

    async fn fetch(&self, remote_path: &str, dest: &Path) -> Result<u64> {
        let src = self.path(remote_path);
        if !src.is_file() {
            return Err(DownloadError::remote("download", remote_path, "not found on mirror").into());
        }
        tokio::fs::copy(&src, dest)
            .await
            .fs_context("copying file from mirror", &src)
    }
}

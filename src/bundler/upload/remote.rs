//! Remote store implementations.
//!
//! Remote paths are `/`-separated and relative to the store root.

use super::UploadError;
use crate::bundler::Result;
use crate::bundler::error::ErrorExt;
use crate::bundler::settings::UploadServer;
use crate::bundler::utils::http;
use regex::Regex;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;
use tokio::process::Command;

/// Destination the pipeline uploads into.
pub trait RemoteStore: Send + Sync + 'static {
    /// Identifier keying the provisioned-directory cache.
    fn id(&self) -> &str;

    /// Names of the entries directly inside `dir` (`""` is the root).
    fn list_dir(&self, dir: &str) -> impl Future<Output = Result<Vec<String>>> + Send;

    /// Creates `dir`. Its parent exists.
    fn create_dir(&self, dir: &str) -> impl Future<Output = Result<()>> + Send;

    /// Uploads `local` to `remote_path`, overwriting.
    fn put_file(&self, local: &Path, remote_path: &str) -> impl Future<Output = Result<()>> + Send;
}

/// Path to the curl executable, if installed.
static CURL: LazyLock<Option<PathBuf>> = LazyLock::new(|| match which::which("curl") {
    Ok(path) => {
        log::debug!("Found curl at: {}", path.display());
        Some(path)
    }
    Err(e) => {
        log::debug!("curl not found in PATH: {}", e);
        None
    }
});

/// FTP store driven through the `curl` executable.
#[derive(Clone, Debug)]
pub struct CurlStore {
    id: String,
    root_url: String,
    credentials: String,
    curl: PathBuf,
}

impl CurlStore {
    pub fn new(server: &UploadServer) -> Result<Self> {
        let curl = CURL
            .clone()
            .ok_or_else(|| UploadError::Unavailable("curl is not installed".into()))?;
        Ok(Self {
            id: server.id.clone(),
            root_url: server.root_url(),
            credentials: server.credentials(),
            curl,
        })
    }

    fn url(&self, path: &str) -> String {
        if path.is_empty() {
            format!("{}/", self.root_url)
        } else {
            format!("{}/{}", self.root_url, path)
        }
    }

    async fn run(&self, operation: &'static str, target: &str, args: &[&str]) -> Result<String> {
        let output = Command::new(&self.curl)
            .arg("--silent")
            .arg("--show-error")
            .arg("-u")
            .arg(&self.credentials)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| UploadError::remote(operation, target, e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(UploadError::remote(
                operation,
                target,
                format!("curl exited with {:?}: {}", output.status.code(), stderr.trim()),
            )
            .into());
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl RemoteStore for CurlStore {
    fn id(&self) -> &str {
        &self.id
    }

    async fn list_dir(&self, dir: &str) -> Result<Vec<String>> {
        let url = if dir.is_empty() {
            self.url("")
        } else {
            format!("{}/", self.url(dir))
        };
        let listing = self.run("list", dir, &["--list-only", &url]).await?;
        Ok(listing
            .lines()
            .map(|l| l.trim().trim_end_matches('/'))
            .map(|l| l.rsplit('/').next().unwrap_or(l).to_string())
            .filter(|l| !l.is_empty() && l != "." && l != "..")
            .collect())
    }

    async fn create_dir(&self, dir: &str) -> Result<()> {
        let quote = format!("MKD {dir}");
        let root = self.url("");
        self.run("create", dir, &["-Q", &quote, &root]).await?;
        Ok(())
    }

    async fn put_file(&self, local: &Path, remote_path: &str) -> Result<()> {
        let local = local.to_string_lossy();
        let url = self.url(remote_path);
        self.run("upload", remote_path, &["-T", &local, &url]).await?;
        Ok(())
    }
}

static HREF: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r#"href\s*=\s*"([^"?#]+)""#).ok());

/// WebDAV-style HTTP store: GET listings, `MKCOL` and `PUT`.
#[derive(Clone, Debug)]
pub struct HttpStore {
    id: String,
    base: url::Url,
    user: String,
    password: String,
    client: reqwest::Client,
}

impl HttpStore {
    pub fn new(server: &UploadServer, timeout: Duration) -> Result<Self> {
        let mut base = url::Url::parse(&server.root_url())
            .map_err(|e| UploadError::Unavailable(format!("invalid server url: {e}")))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self {
            id: server.id.clone(),
            base,
            user: server.account_id.clone(),
            password: server.password.clone(),
            client: http::client(timeout)?,
        })
    }

    fn url(&self, path: &str, trailing_slash: bool) -> Result<url::Url> {
        let mut path = path.to_string();
        if trailing_slash && !path.is_empty() {
            path.push('/');
        }
        self.base
            .join(&path)
            .map_err(|e| crate::bundler::Error::from(UploadError::remote("resolve", path, e)))
    }

    fn request(&self, method: reqwest::Method, url: url::Url) -> reqwest::RequestBuilder {
        let request = self.client.request(method, url);
        if self.user.is_empty() {
            request
        } else {
            request.basic_auth(&self.user, Some(&self.password))
        }
    }
}

/// Entry names from an HTML directory index.
pub(crate) fn parse_listing(body: &str) -> Vec<String> {
    let Some(href) = HREF.as_ref() else {
        return Vec::new();
    };
    let mut names: Vec<String> = href
        .captures_iter(body)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim_end_matches('/'))
        .filter(|link| !link.is_empty() && !link.starts_with("..") && !link.contains("://"))
        .filter_map(|link| link.rsplit('/').next())
        .filter(|name| !name.is_empty() && *name != ".")
        .map(str::to_string)
        .collect();
    names.dedup();
    names
}

impl RemoteStore for HttpStore {
    fn id(&self) -> &str {
        &self.id
    }

    async fn list_dir(&self, dir: &str) -> Result<Vec<String>> {
        let url = self.url(dir, true)?;
        let response = self.request(reqwest::Method::GET, url).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            return Err(UploadError::remote("list", dir, response.status()).into());
        }
        Ok(parse_listing(&response.text().await?))
    }

    async fn create_dir(&self, dir: &str) -> Result<()> {
        let url = self.url(dir, true)?;
        let mkcol = reqwest::Method::from_bytes(b"MKCOL")
            .map_err(|e| UploadError::remote("create", dir, e))?;
        let response = self.request(mkcol, url).send().await?;
        // 405: the collection already exists.
        if response.status().is_success() || response.status() == reqwest::StatusCode::METHOD_NOT_ALLOWED {
            Ok(())
        } else {
            Err(UploadError::remote("create", dir, response.status()).into())
        }
    }

    async fn put_file(&self, local: &Path, remote_path: &str) -> Result<()> {
        let file = tokio::fs::File::open(local)
            .await
            .fs_context("opening file for upload", local)?;
        let body = reqwest::Body::wrap_stream(tokio_util::io::ReaderStream::new(file));
        let url = self.url(remote_path, false)?;
        let response = self.request(reqwest::Method::PUT, url).body(body).send().await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(UploadError::remote("upload", remote_path, response.status()).into())
        }
    }
}

/// Mirror directory on the local filesystem.
#[derive(Clone, Debug)]
pub struct LocalStore {
    id: String,
    root: PathBuf,
}

impl LocalStore {
    pub fn new(id: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            root: root.into(),
        }
    }

    /// Uses [`UploadServer::root`] as the mirror directory.
    pub fn from_server(server: &UploadServer) -> Result<Self> {
        let root = server
            .root
            .clone()
            .ok_or_else(|| UploadError::Unavailable("local upload server has no root".into()))?;
        Ok(Self::new(server.id.clone(), root))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, remote: &str) -> PathBuf {
        remote
            .split('/')
            .filter(|s| !s.is_empty())
            .fold(self.root.clone(), |p, s| p.join(s))
    }
}

impl RemoteStore for LocalStore {
    fn id(&self) -> &str {
        &self.id
    }

    async fn list_dir(&self, dir: &str) -> Result<Vec<String>> {
        let path = self.path(dir);
        let mut entries = match tokio::fs::read_dir(&path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e).fs_context("listing mirror directory", &path),
        };
        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .fs_context("listing mirror directory", &path)?
        {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    async fn create_dir(&self, dir: &str) -> Result<()> {
        let path = self.path(dir);
        tokio::fs::create_dir(&path)
            .await
            .fs_context("creating mirror directory", &path)
    }

    async fn put_file(&self, local: &Path, remote_path: &str) -> Result<()> {
        let dest = self.path(remote_path);
        if let Some(parent) = dest.parent() {
            if !parent.is_dir() {
                return Err(UploadError::remote("upload", remote_path, "remote directory missing").into());
            }
        }
        tokio::fs::copy(local, &dest)
            .await
            .fs_context("copying file to mirror", local)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_parser_extracts_names() {
        let body = r#"<a href="../">..</a><a href="Normal/">Normal/</a>
            <a href="/game/bundles/Scenes/">Scenes/</a><a href="ui.ab?x=1">ui</a>
            <a href="http://elsewhere/">x</a>"#;
        assert_eq!(parse_listing(body), vec!["Normal", "Scenes"]);
    }

    #[tokio::test]
    async fn local_store_requires_parent() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new("local", dir.path());

        assert!(store.create_dir("a/b").await.is_err());
        store.create_dir("a").await.unwrap();
        store.create_dir("a/b").await.unwrap();
        assert_eq!(store.list_dir("a").await.unwrap(), vec!["b"]);

        let src = dir.path().join("src.bin");
        tokio::fs::write(&src, b"payload").await.unwrap();
        store.put_file(&src, "a/b/copy.bin").await.unwrap();
        assert!(dir.path().join("a/b/copy.bin").exists());
        assert!(store.put_file(&src, "missing/copy.bin").await.is_err());
    }
}

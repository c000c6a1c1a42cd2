//! Remote server configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default number of concurrent upload workers.
pub const DEFAULT_THREAD_MAX_COUNT: usize = 3;
/// Default number of transfer attempts per file.
pub const DEFAULT_NET_RETRIES: u32 = 3;
/// Default per-attempt timeout in seconds.
pub const DEFAULT_NET_TIMEOUT_SECS: u64 = 30;

/// Network settings shared by the upload pipeline and the client.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Upper bound of concurrently uploading artifacts.
    pub thread_max_count: usize,
    /// Attempts per file before the transfer is reported as failed.
    pub net_retries: u32,
    /// Timeout of a single transfer attempt.
    pub net_timeout_secs: u64,
    /// Where bundles are uploaded to.
    pub upload_server: UploadServer,
    /// Where clients download bundles from.
    pub download_server: DownloadServer,
    /// Optional CDN fronting the download server.
    pub cdn: Option<CdnServer>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            thread_max_count: DEFAULT_THREAD_MAX_COUNT,
            net_retries: DEFAULT_NET_RETRIES,
            net_timeout_secs: DEFAULT_NET_TIMEOUT_SECS,
            upload_server: UploadServer::default(),
            download_server: DownloadServer::default(),
            cdn: None,
        }
    }
}

/// Wire protocol used to reach the upload server.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferProtocol {
    /// FTP through the `curl` executable.
    #[default]
    Ftp,
    /// HTTP PUT/MKCOL through reqwest.
    Http,
    /// Plain directory on the local filesystem.
    Local,
}

/// Upload server endpoint and credentials.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadServer {
    /// Identifier used to key the provisioned-directory cache.
    pub id: String,
    pub account_id: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    pub protocol: TransferProtocol,
    /// Mirror root for [`TransferProtocol::Local`].
    pub root: Option<PathBuf>,
    /// Disabled servers are never uploaded to.
    pub disable: bool,
}

impl UploadServer {
    /// Root URL of the server, without a trailing slash.
    pub fn root_url(&self) -> String {
        match self.protocol {
            TransferProtocol::Ftp => format!("ftp://{}:{}", self.host, self.port),
            TransferProtocol::Http => format!("http://{}:{}", self.host, self.port),
            TransferProtocol::Local => self
                .root
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
        }
    }

    /// `user:password` credential pair as understood by curl.
    pub fn credentials(&self) -> String {
        format!("{}:{}", self.account_id, self.password)
    }
}

/// Download endpoint for clients.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadServer {
    pub id: String,
    /// Host (and optional path) without scheme.
    pub url: String,
    /// Mirror root read from disk instead of `url` when set.
    pub root: Option<PathBuf>,
}

impl DownloadServer {
    /// Base URL for a build: `http://<url>/<build_name>`.
    pub fn base_url(&self, build_name: &str) -> String {
        format!("http://{}/{}", self.url, build_name)
    }
}

/// CDN account used to purge edge caches after an upload.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CdnServer {
    pub user_name: String,
    pub api_key: String,
    /// Purge API endpoint.
    pub url: String,
    /// Directory URLs whose cached content is dropped.
    pub refresh_urls: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ftp_root_url_and_credentials() {
        let server = UploadServer {
            account_id: "deploy".into(),
            password: "s3cret".into(),
            host: "10.0.0.5".into(),
            port: 21,
            ..Default::default()
        };
        assert_eq!(server.root_url(), "ftp://10.0.0.5:21");
        assert_eq!(server.credentials(), "deploy:s3cret");
    }

    #[test]
    fn download_base_url_appends_build_name() {
        let download = DownloadServer {
            id: "cdn".into(),
            url: "assets.example.com".into(),
            root: None,
        };
        assert_eq!(
            download.base_url("game"),
            "http://assets.example.com/game"
        );
    }
}

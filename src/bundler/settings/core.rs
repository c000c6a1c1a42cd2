//! Core Settings struct and implementations.

use super::{ServerSettings, SettingsBuilder};
use crate::bundler::error::{ErrorExt, Result};
use crate::bundler::ledger::LedgerScope;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// File name of the exported dependency map.
pub const BUNDLES_MAP_FILE: &str = "BundlesMap.json";
/// File name of the exported upload ledger.
pub const UPLOAD_LIST_FILE: &str = "UploadList.json";
/// File name of the partitioner resource configuration.
pub const BUNDLES_CONFIG_FILE: &str = "BundlesConfig.json";

/// Main settings for pipeline operations.
///
/// Built once and passed by reference into the ledger, the upload pipeline
/// and the load manager.
///
/// # Examples
///
/// ```no_run
/// use kodegen_bundler_assets::bundler::SettingsBuilder;
///
/// # fn example() -> kodegen_bundler_assets::bundler::Result<()> {
/// let settings = SettingsBuilder::new()
///     .build_target("Android")
///     .app_version("1.4.0")
///     .output_dir("build/StreamingAssets")
///     .ledger_dir("build/ledger")
///     .build()?;
/// assert_eq!(settings.build_target(), "Android");
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct Settings {
    /// Remote root directory for this product.
    pub(super) build_name: String,

    /// Platform the bundles were built for (e.g. "Android", "iOS").
    pub(super) build_target: String,

    pub(super) app_version: String,
    pub(super) market_version: String,

    /// Whether `.manifest` side-files are uploaded at all.
    pub(super) manifest_upload: bool,

    /// Extension appended to bundle file names, without the dot.
    pub(super) file_suffix: Option<String>,

    /// Directory the engine wrote bundles into.
    ///
    /// Contains `Normal/` and `Scenes/` subdirectories.
    pub(super) output_dir: PathBuf,

    /// Directory holding the JSON catalogs.
    pub(super) ledger_dir: PathBuf,

    /// Directory uploaded bundles are moved to.
    pub(super) backup_dir: PathBuf,

    /// Client-side bundle cache read by the load manager.
    pub(super) bundles_dir: PathBuf,

    pub(super) server: ServerSettings,
}

impl Settings {
    /// Loads settings from a TOML file.
    ///
    /// Relative directories in the file are resolved against the file's parent.
    pub async fn load(path: &Path) -> Result<Settings> {
        let text = tokio::fs::read_to_string(path)
            .await
            .fs_context("reading settings file", path)?;
        let file: SettingsFile = toml::from_str(&text)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        log::debug!("Loaded settings from {}", path.display());
        file.into_builder(base).build()
    }

    pub fn build_name(&self) -> &str {
        &self.build_name
    }

    pub fn build_target(&self) -> &str {
        &self.build_target
    }

    pub fn app_version(&self) -> &str {
        &self.app_version
    }

    pub fn market_version(&self) -> &str {
        &self.market_version
    }

    pub fn manifest_upload(&self) -> bool {
        self.manifest_upload
    }

    pub fn file_suffix(&self) -> Option<&str> {
        self.file_suffix.as_deref()
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn ledger_dir(&self) -> &Path {
        &self.ledger_dir
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Backup root for bundle files: `<backup_dir>/Bundles`.
    pub fn backup_bundles_dir(&self) -> PathBuf {
        self.backup_dir.join("Bundles")
    }

    pub fn bundles_dir(&self) -> &Path {
        &self.bundles_dir
    }

    pub fn server(&self) -> &ServerSettings {
        &self.server
    }

    /// Path of the exported dependency map.
    pub fn map_path(&self) -> PathBuf {
        self.ledger_dir.join(BUNDLES_MAP_FILE)
    }

    /// Path of the exported upload ledger.
    pub fn ledger_path(&self) -> PathBuf {
        self.ledger_dir.join(UPLOAD_LIST_FILE)
    }

    /// Path of the partitioner resource configuration.
    pub fn resources_path(&self) -> PathBuf {
        self.ledger_dir.join(BUNDLES_CONFIG_FILE)
    }

    /// The slice of settings the ledger stamps onto every artifact.
    pub fn ledger_scope(&self) -> LedgerScope {
        LedgerScope {
            build_target: self.build_target.clone(),
            app_version: self.app_version.clone(),
            market_version: self.market_version.clone(),
            manifest_upload: self.manifest_upload,
            file_suffix: self.file_suffix.clone(),
            output_dir: self.output_dir.clone(),
        }
    }
}

/// On-disk TOML shape of [`Settings`].
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SettingsFile {
    pub build_name: Option<String>,
    pub build_target: Option<String>,
    pub app_version: Option<String>,
    pub market_version: Option<String>,
    pub manifest_upload: Option<bool>,
    pub file_suffix: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub ledger_dir: Option<PathBuf>,
    pub backup_dir: Option<PathBuf>,
    pub bundles_dir: Option<PathBuf>,
    pub server: ServerSettings,
}

impl SettingsFile {
    /// Converts the file into a builder, resolving relative paths against `base`.
    pub fn into_builder(self, base: &Path) -> SettingsBuilder {
        let resolve = |p: PathBuf| if p.is_absolute() { p } else { base.join(p) };

        let mut server = self.server;
        server.upload_server.root = server.upload_server.root.map(resolve);
        server.download_server.root = server.download_server.root.map(resolve);
        let mut builder = SettingsBuilder::new().server(server);
        if let Some(v) = self.build_name {
            builder = builder.build_name(v);
        }
        if let Some(v) = self.build_target {
            builder = builder.build_target(v);
        }
        if let Some(v) = self.app_version {
            builder = builder.app_version(v);
        }
        if let Some(v) = self.market_version {
            builder = builder.market_version(v);
        }
        if let Some(v) = self.manifest_upload {
            builder = builder.manifest_upload(v);
        }
        if let Some(v) = self.file_suffix {
            builder = builder.file_suffix(v);
        }
        if let Some(v) = self.output_dir {
            builder = builder.output_dir(resolve(v));
        }
        if let Some(v) = self.ledger_dir {
            builder = builder.ledger_dir(resolve(v));
        }
        if let Some(v) = self.backup_dir {
            builder = builder.backup_dir(resolve(v));
        }
        if let Some(v) = self.bundles_dir {
            builder = builder.bundles_dir(resolve(v));
        }
        builder
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn load_resolves_relative_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("bundler.toml");
        tokio::fs::write(
            &config,
            r#"
build_name = "game"
build_target = "iOS"
app_version = "2.0.1"
file_suffix = "ab"
output_dir = "out"
ledger_dir = "ledger"

[server]
thread_max_count = 5

[server.upload_server]
id = "primary"
protocol = "local"
root = "mirror"

[server.download_server]
id = "mirror"
root = "mirror"
"#,
        )
        .await
        .unwrap();

        let settings = Settings::load(&config).await.unwrap();
        assert_eq!(settings.build_target(), "iOS");
        assert_eq!(settings.file_suffix(), Some("ab"));
        assert_eq!(settings.output_dir(), dir.path().join("out"));
        assert_eq!(settings.server().thread_max_count, 5);
        assert_eq!(settings.server().net_retries, 3);
        assert_eq!(settings.ledger_path(), dir.path().join("ledger").join(UPLOAD_LIST_FILE));
        assert_eq!(settings.server().upload_server.root, Some(dir.path().join("mirror")));
        assert_eq!(settings.server().download_server.root, Some(dir.path().join("mirror")));
    }

    #[tokio::test]
    async fn absolute_mirror_root_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let mirror = dir.path().join("elsewhere");
        let config = dir.path().join("bundler.toml");
        let text = format!(
            "build_target = \"Android\"\napp_version = \"1.0.0\"\noutput_dir = \"out\"\nledger_dir = \"ledger\"\n\n[server.upload_server]\nprotocol = \"local\"\nroot = {:?}\n",
            mirror.display().to_string()
        );
        tokio::fs::write(&config, text).await.unwrap();

        let settings = Settings::load(&config).await.unwrap();
        assert_eq!(settings.server().upload_server.root, Some(mirror));
    }
}

//! Builder for constructing Settings.

use super::{ServerSettings, Settings};
use std::path::{Path, PathBuf};

/// Builder for constructing [`Settings`].
///
/// Provides a fluent API for building pipeline settings with validation.
///
/// # Examples
///
/// ```no_run
/// use kodegen_bundler_assets::bundler::{SettingsBuilder, ServerSettings};
///
/// # fn example() -> kodegen_bundler_assets::bundler::Result<()> {
/// let settings = SettingsBuilder::new()
///     .build_name("game")
///     .build_target("Android")
///     .app_version("1.4.0")
///     .market_version("1.4")
///     .file_suffix("ab")
///     .output_dir("build/StreamingAssets")
///     .ledger_dir("build/ledger")
///     .server(ServerSettings::default())
///     .build()?;
/// # Ok(())
/// # }
/// ```
///
/// # See Also
///
/// - [`Settings`] - The built settings struct
#[derive(Default)]
pub struct SettingsBuilder {
    build_name: Option<String>,
    build_target: Option<String>,
    app_version: Option<String>,
    market_version: Option<String>,
    manifest_upload: Option<bool>,
    file_suffix: Option<String>,
    output_dir: Option<PathBuf>,
    ledger_dir: Option<PathBuf>,
    backup_dir: Option<PathBuf>,
    bundles_dir: Option<PathBuf>,
    server: ServerSettings,
}

impl SettingsBuilder {
    /// Creates a new settings builder.
    pub fn new() -> Self {
        Default::default()
    }

    /// Sets the remote root directory name.
    ///
    /// Default: `bundles-root`
    pub fn build_name(mut self, name: impl Into<String>) -> Self {
        self.build_name = Some(name.into());
        self
    }

    /// Sets the platform the bundles were built for.
    ///
    /// # Required
    ///
    /// This field is required for building.
    pub fn build_target(mut self, target: impl Into<String>) -> Self {
        self.build_target = Some(target.into());
        self
    }

    /// Sets the application version.
    ///
    /// # Required
    ///
    /// This field is required for building.
    pub fn app_version(mut self, version: impl Into<String>) -> Self {
        self.app_version = Some(version.into());
        self
    }

    /// Sets the store-facing version.
    ///
    /// Default: same as `app_version`
    pub fn market_version(mut self, version: impl Into<String>) -> Self {
        self.market_version = Some(version.into());
        self
    }

    /// Enables or disables `.manifest` side-file upload.
    ///
    /// Default: `true`
    pub fn manifest_upload(mut self, enabled: bool) -> Self {
        self.manifest_upload = Some(enabled);
        self
    }

    /// Sets the bundle file extension (without the dot).
    ///
    /// An empty string means no extension.
    pub fn file_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.file_suffix = Some(suffix.into());
        self
    }

    /// Sets the directory the engine wrote bundles into.
    ///
    /// # Required
    ///
    /// This field is required for building.
    pub fn output_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.output_dir = Some(path.as_ref().to_path_buf());
        self
    }

    /// Sets the directory holding the JSON catalogs.
    ///
    /// # Required
    ///
    /// This field is required for building.
    pub fn ledger_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.ledger_dir = Some(path.as_ref().to_path_buf());
        self
    }

    /// Sets the backup directory.
    ///
    /// Default: `<ledger_dir>/../BackUp`
    pub fn backup_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.backup_dir = Some(path.as_ref().to_path_buf());
        self
    }

    /// Sets the client bundle cache directory.
    ///
    /// Default: `output_dir`
    pub fn bundles_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.bundles_dir = Some(path.as_ref().to_path_buf());
        self
    }

    /// Sets network settings.
    ///
    /// Default: [`ServerSettings::default`]
    pub fn server(mut self, server: ServerSettings) -> Self {
        self.server = server;
        self
    }

    /// Builds the settings.
    ///
    /// # Errors
    ///
    /// Returns an error if required fields are missing:
    /// - `build_target`
    /// - `app_version`
    /// - `output_dir`
    /// - `ledger_dir`
    ///
    /// or if `server.thread_max_count` or `server.net_retries` is zero.
    pub fn build(self) -> crate::bundler::Result<Settings> {
        use crate::bundler::error::{Context, Error};

        if self.server.thread_max_count == 0 {
            return Err(Error::Config("server.thread_max_count must be at least 1".into()));
        }
        if self.server.net_retries == 0 {
            return Err(Error::Config("server.net_retries must be at least 1".into()));
        }

        let app_version = self.app_version.context("app_version is required")?;
        let ledger_dir = self.ledger_dir.context("ledger_dir is required")?;
        let output_dir = self.output_dir.context("output_dir is required")?;
        let backup_dir = self.backup_dir.unwrap_or_else(|| {
            ledger_dir
                .parent()
                .map(|p| p.join("BackUp"))
                .unwrap_or_else(|| PathBuf::from("BackUp"))
        });
        let file_suffix = self
            .file_suffix
            .map(|s| s.trim_start_matches('.').to_string())
            .filter(|s| !s.is_empty());

        Ok(Settings {
            build_name: self.build_name.unwrap_or_else(|| "bundles-root".to_string()),
            build_target: self.build_target.context("build_target is required")?,
            market_version: self.market_version.unwrap_or_else(|| app_version.clone()),
            app_version,
            manifest_upload: self.manifest_upload.unwrap_or(true),
            file_suffix,
            bundles_dir: self.bundles_dir.unwrap_or_else(|| output_dir.clone()),
            output_dir,
            ledger_dir,
            backup_dir,
            server: self.server,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> SettingsBuilder {
        SettingsBuilder::new()
            .build_target("Android")
            .app_version("1.0.0")
            .output_dir("/tmp/out")
            .ledger_dir("/tmp/work/ledger")
    }

    #[test]
    fn missing_target_is_rejected() {
        let err = SettingsBuilder::new()
            .app_version("1.0.0")
            .output_dir("/tmp/out")
            .ledger_dir("/tmp/ledger")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("build_target is required"));
    }

    #[test]
    fn defaults_are_applied() {
        let settings = minimal().file_suffix(".ab").build().unwrap();
        assert_eq!(settings.market_version(), "1.0.0");
        assert!(settings.manifest_upload());
        assert_eq!(settings.file_suffix(), Some("ab"));
        assert_eq!(settings.backup_dir(), Path::new("/tmp/work/BackUp"));
        assert_eq!(settings.bundles_dir(), Path::new("/tmp/out"));
    }

    #[test]
    fn zero_workers_is_a_config_error() {
        let server = ServerSettings {
            thread_max_count: 0,
            ..Default::default()
        };
        assert!(minimal().server(server).build().is_err());
    }
}

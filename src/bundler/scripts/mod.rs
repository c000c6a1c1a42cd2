//! Shell scripts for uploading and purging outside the pipeline.
//!
//! Rendered from handlebars templates with the same remote layout and
//! directory order the upload pipeline uses, so a script run and a pipeline
//! run are interchangeable.

mod template;

use crate::bundler::error::{Error, ErrorExt, Result};
use crate::bundler::ledger::{FileKind, Ledger};
use crate::bundler::settings::{BuildMode, CdnServer, Settings};
use crate::bundler::upload::provision_segments;
use crate::bundler::utils::fs;
use handlebars::Handlebars;
use serde::Serialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use template::{REFRESH_CDN_TEMPLATE, UPLOAD_CURL_TEMPLATE, UPLOAD_FTP_TEMPLATE};

pub const UPLOAD_CURL_SCRIPT: &str = "upload_curl.sh";
pub const UPLOAD_FTP_SCRIPT: &str = "upload_ftp.sh";
pub const REFRESH_CDN_SCRIPT: &str = "refresh_cdn.sh";

/// One file line of an upload script.
#[derive(Debug, Serialize)]
struct ScriptFile {
    /// Remote directory relative to the server root.
    remote_dir: String,
    /// Local directory relative to the output dir.
    local_dir: String,
    file_name: String,
    /// `local_dir/file_name`.
    local_path: String,
}

/// Paths of the scripts written by [`generate_scripts`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptSet {
    pub upload_curl: PathBuf,
    pub upload_ftp: PathBuf,
    /// Absent when no CDN is configured.
    pub refresh_cdn: Option<PathBuf>,
}

fn registry() -> Handlebars<'static> {
    let mut handlebars = Handlebars::new();
    handlebars.register_escape_fn(handlebars::no_escape);
    handlebars
}

fn render(template: &str, data: &serde_json::Value) -> Result<String> {
    registry()
        .render_template(template, data)
        .map_err(|e| Error::Template(e.to_string()))
}

/// Pending files of `build_mode`, ordered by artifact number, payload first.
fn script_files(settings: &Settings, ledger: &Ledger, build_mode: BuildMode) -> Vec<ScriptFile> {
    let build_name = settings.build_name().trim_matches('/');
    let mut files = Vec::new();
    for artifact in ledger.pending(build_mode) {
        let mut kinds = vec![FileKind::Bundle];
        if ledger.manifest_required(artifact) {
            kinds.push(FileKind::Manifest);
        }
        for kind in kinds {
            let file_name = ledger.file_name(artifact, kind);
            let local_dir = artifact.bundle_type.dir_name().to_string();
            files.push(ScriptFile {
                remote_dir: format!("{build_name}/{}", artifact.remote_dir()),
                local_path: format!("{local_dir}/{file_name}"),
                local_dir,
                file_name,
            });
        }
    }
    files
}

fn upload_data(settings: &Settings, ledger: &Ledger, build_mode: BuildMode) -> serde_json::Value {
    let server = &settings.server().upload_server;
    let dirs = provision_segments(
        settings.build_name(),
        settings.build_target(),
        &[(build_mode, ledger.pending_timestamps(build_mode))],
    );
    json!({
        "build_mode": build_mode.as_str(),
        "build_target": settings.build_target(),
        "app_version": settings.app_version(),
        "root_url": server.root_url(),
        "credentials": server.credentials(),
        "host": server.host,
        "port": server.port,
        "account_id": server.account_id,
        "password": server.password,
        "local_root": settings.output_dir().display().to_string(),
        "dirs": dirs,
        "files": script_files(settings, ledger, build_mode),
    })
}

/// `upload_curl.sh` for the pending artifacts of `build_mode`.
pub fn render_upload_curl(settings: &Settings, ledger: &Ledger, build_mode: BuildMode) -> Result<String> {
    render(UPLOAD_CURL_TEMPLATE, &upload_data(settings, ledger, build_mode))
}

/// `upload_ftp.sh` for the pending artifacts of `build_mode`.
pub fn render_upload_ftp(settings: &Settings, ledger: &Ledger, build_mode: BuildMode) -> Result<String> {
    render(UPLOAD_FTP_TEMPLATE, &upload_data(settings, ledger, build_mode))
}

/// `refresh_cdn.sh` purging the configured refresh URLs.
pub fn render_refresh_cdn(cdn: &CdnServer) -> Result<String> {
    for (field, value) in [("user_name", &cdn.user_name), ("api_key", &cdn.api_key), ("url", &cdn.url)] {
        if value.is_empty() {
            log::error!("CDN {} is empty; the generated script will fail", field);
        }
    }
    let body = json!({
        "urlAction": "delete",
        "dirs": cdn.refresh_urls,
    });
    render(
        REFRESH_CDN_TEMPLATE,
        &json!({
            "user_name": cdn.user_name,
            "api_key": cdn.api_key,
            "url": cdn.url,
            "body": serde_json::to_string(&body)?,
        }),
    )
}

async fn write_script(path: &Path, contents: &str) -> Result<()> {
    fs::remove_file(path).await?;
    tokio::fs::write(path, contents)
        .await
        .fs_context("writing script", path)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
            .await
            .fs_context("setting script permissions", path)?;
    }
    log::info!("Wrote {}", path.display());
    Ok(())
}

/// Writes every script for `build_mode` into `out_dir`.
pub async fn generate_scripts(
    settings: &Settings,
    ledger: &Ledger,
    build_mode: BuildMode,
    out_dir: &Path,
) -> Result<ScriptSet> {
    fs::create_dir_all(out_dir).await?;

    let upload_curl = out_dir.join(UPLOAD_CURL_SCRIPT);
    write_script(&upload_curl, &render_upload_curl(settings, ledger, build_mode)?).await?;

    let upload_ftp = out_dir.join(UPLOAD_FTP_SCRIPT);
    write_script(&upload_ftp, &render_upload_ftp(settings, ledger, build_mode)?).await?;

    let refresh_cdn = match &settings.server().cdn {
        Some(cdn) => {
            let path = out_dir.join(REFRESH_CDN_SCRIPT);
            write_script(&path, &render_refresh_cdn(cdn)?).await?;
            Some(path)
        }
        None => {
            log::debug!("No CDN configured; skipping {}", REFRESH_CDN_SCRIPT);
            None
        }
    };

    Ok(ScriptSet {
        upload_curl,
        upload_ftp,
        refresh_cdn,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::ledger::RecordRequest;
    use crate::bundler::map::{BundleType, FileType};
    use crate::bundler::settings::{ServerSettings, SettingsBuilder, UploadServer};
    use tempfile::TempDir;

    fn settings(out: &Path) -> Settings {
        let server = ServerSettings {
            upload_server: UploadServer {
                id: "main".into(),
                account_id: "deploy".into(),
                password: "pw".into(),
                host: "10.0.0.5".into(),
                port: 21,
                ..Default::default()
            },
            ..Default::default()
        };
        SettingsBuilder::new()
            .build_name("game")
            .build_target("Android")
            .app_version("1.0.0")
            .file_suffix("ab")
            .output_dir(out)
            .ledger_dir(out.join("ledger"))
            .server(server)
            .build()
            .unwrap()
    }

    async fn ledger_with(settings: &Settings, ids: &[(&str, BundleType)]) -> Ledger {
        let mut ledger = Ledger::new(settings.ledger_scope());
        for (id, bundle_type) in ids {
            let dir = settings.output_dir().join(bundle_type.dir_name());
            tokio::fs::create_dir_all(&dir).await.unwrap();
            tokio::fs::write(dir.join(format!("{id}.ab")), id.as_bytes()).await.unwrap();
            tokio::fs::write(dir.join(format!("{id}.ab.manifest")), b"m").await.unwrap();
            ledger
                .record_or_reuse(RecordRequest {
                    id: id.to_string(),
                    bundle_type: *bundle_type,
                    file_type: FileType::Bundle,
                    build_mode: BuildMode::Debug,
                    engine_hash: None,
                })
                .await
                .unwrap();
        }
        ledger.reset_upload_timestamp(BuildMode::Debug, 202401021530);
        ledger
    }

    #[tokio::test]
    async fn curl_script_lists_dirs_then_files_in_order() {
        let tmp = TempDir::new().unwrap();
        let settings = settings(tmp.path());
        let ledger = ledger_with(&settings, &[("ui", BundleType::Normal), ("main", BundleType::Scene)]).await;

        let script = render_upload_curl(&settings, &ledger, BuildMode::Debug).unwrap();
        assert!(script.starts_with("#!/bin/bash"));
        assert!(script.contains(r#"ROOT_URL="ftp://10.0.0.5:21""#));
        assert!(script.contains("checkUploadDir game/bundles/Android/Debug/Normal/202401021530"));

        let ui = script
            .find("uploadFile game/bundles/Android/Debug/Normal/202401021530 \"$UPLOAD_FROM_ROOT_DIR/Normal/ui.ab\"")
            .unwrap();
        let ui_manifest = script.find("Normal/ui.ab.manifest").unwrap();
        let scene = script.find("Scenes/main.ab\"").unwrap();
        assert!(ui < ui_manifest && ui_manifest < scene);
        // Scene bundles carry no manifest.
        assert!(!script.contains("main.ab.manifest"));
    }

    #[tokio::test]
    async fn ftp_script_uses_heredoc_credentials() {
        let tmp = TempDir::new().unwrap();
        let settings = settings(tmp.path());
        let ledger = ledger_with(&settings, &[("ui", BundleType::Normal)]).await;

        let script = render_upload_ftp(&settings, &ledger, BuildMode::Debug).unwrap();
        assert!(script.contains("ftp -n <<!"));
        assert!(script.contains("user deploy pw"));
        assert!(script.contains("uploadFile \"$UPLOAD_FROM_ROOT_DIR/Normal\" game/bundles/Android/Debug/Normal/202401021530 ui.ab"));
    }

    #[test]
    fn cdn_script_embeds_purge_body() {
        let cdn = CdnServer {
            user_name: "ops".into(),
            api_key: "key".into(),
            url: "https://cdn.example.com/purge".into(),
            refresh_urls: vec!["http://assets.example.com/game/".into()],
        };
        let script = render_refresh_cdn(&cdn).unwrap();
        assert!(script.contains(r#"-d '{"dirs":["http://assets.example.com/game/"],"urlAction":"delete"}'"#));
        assert!(script.contains("openssl dgst -sha1 -hmac $apiKey"));
    }

    #[tokio::test]
    async fn generate_skips_cdn_without_config() {
        let tmp = TempDir::new().unwrap();
        let settings = settings(tmp.path());
        let ledger = Ledger::new(settings.ledger_scope());
        let out = tmp.path().join("scripts");

        let set = generate_scripts(&settings, &ledger, BuildMode::Debug, &out).await.unwrap();
        assert!(set.upload_curl.exists());
        assert!(set.upload_ftp.exists());
        assert_eq!(set.refresh_cdn, None);
    }
}

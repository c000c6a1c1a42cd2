//! `download`: mirror the uploaded bundles of one build mode into the bundle cache.

use crate::bundler::{BuildMode, BundleSource, Downloader, HttpSource, LocalSource, Settings};
use crate::cli::RuntimeConfig;
use crate::error::{CliError, Result};
use std::time::Duration;

pub async fn execute(settings: &Settings, mode: BuildMode, config: &RuntimeConfig) -> Result<i32> {
    let server = &settings.server().download_server;
    let timeout = Duration::from_secs(settings.server().net_timeout_secs);

    if server.root.is_some() {
        run(settings, LocalSource::from_server(server, settings.build_name())?, mode, config).await
    } else {
        run(settings, HttpSource::new(server, settings.build_name(), timeout)?, mode, config).await
    }
}

async fn run<S: BundleSource>(settings: &Settings, source: S, mode: BuildMode, config: &RuntimeConfig) -> Result<i32> {
    config.verbose_println(&format!(
        "Download source {} -> {}",
        source.id(),
        settings.bundles_dir().display()
    ))?;
    let downloader = Downloader::new(source, settings);

    let token = downloader.cancellation_token();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted; cancelling download");
            token.cancel();
        }
    });

    let catalogs = downloader.fetch_catalogs(settings.ledger_scope()).await?;
    let mut list = downloader.prepare(&catalogs, mode).await?;
    let pending = list.progress().snapshot();
    config.verbose_println(&format!(
        "{} targets listed, {} files ({} bytes) to download",
        list.len(),
        pending.total_count,
        pending.total_bytes
    ))?;

    let report = downloader.download(&mut list).await;
    interrupt.abort();
    let report = report?;

    if report.cancelled && report.errors.is_empty() {
        return Err(CliError::ExecutionFailed {
            command: "download".to_string(),
            reason: format!(
                "cancelled after {}/{} files; re-run to resume",
                report.progress.done_count, report.progress.total_count
            ),
        }
        .into());
    }
    let report = report.into_result()?;

    if report.progress.total_count == 0 {
        config.success("Bundle cache is up to date")?;
    } else {
        config.success(&format!(
            "Downloaded {} targets ({} bytes)",
            report.downloaded.len(),
            report.progress.done_bytes
        ))?;
    }
    for (id, version) in list.versions() {
        config.indent(&format!("{id} @ {version}"))?;
    }
    Ok(0)
}

//! `upload`: run an upload session with progress and Ctrl-C cancellation.

use crate::bundler::upload::{CdnPurger, CurlStore, HttpStore, LocalStore, RemoteStore, ServerDirectoryCache, UploadEvent};
use crate::bundler::{BuildMode, DependencyMap, Ledger, SessionState, Settings, TransferProtocol, UploadContext, UploadManager};
use crate::cli::RuntimeConfig;
use crate::error::{CliError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

pub async fn execute(settings: Settings, modes: &[BuildMode], config: &RuntimeConfig) -> Result<i32> {
    let server = settings.server().upload_server.clone();
    let timeout = Duration::from_secs(settings.server().net_timeout_secs);
    config.verbose_println(&format!("Upload server {} ({:?})", server.id, server.protocol))?;

    match server.protocol {
        TransferProtocol::Ftp => run(settings, CurlStore::new(&server)?, modes, config).await,
        TransferProtocol::Http => run(settings, HttpStore::new(&server, timeout)?, modes, config).await,
        TransferProtocol::Local => run(settings, LocalStore::from_server(&server)?, modes, config).await,
    }
}

async fn run<S: RemoteStore>(settings: Settings, store: S, modes: &[BuildMode], config: &RuntimeConfig) -> Result<i32> {
    let ledger = Ledger::load(&settings.ledger_path(), settings.ledger_scope()).await?;
    let map = DependencyMap::import(&settings.map_path())
        .await?
        .unwrap_or_else(|| DependencyMap::new(settings.file_suffix()));
    let timeout = Duration::from_secs(settings.server().net_timeout_secs);
    let cdn = settings
        .server()
        .cdn
        .clone()
        .map(|cdn| CdnPurger::new(cdn, timeout))
        .transpose()?;

    let manager = UploadManager::new(UploadContext {
        settings: Arc::new(settings),
        ledger: Arc::new(Mutex::new(ledger)),
        map: Arc::new(map),
        store: Arc::new(store),
        dir_cache: Arc::new(ServerDirectoryCache::new()),
        cdn,
    });

    let mut session = manager.start(modes).await;
    config.verbose_println(&format!("Session {}", session.id()))?;

    let token = session.cancellation_token();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted; cancelling upload session");
            token.cancel();
        }
    });

    let mut events = session.take_events();
    let mut reported = u64::MAX;
    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    while !session.is_finished() {
        ticker.tick().await;
        if let Some(rx) = events.as_mut() {
            while let Ok(event) = rx.try_recv() {
                match event {
                    UploadEvent::FileUploaded { remote_path, bytes, .. } => {
                        config.verbose_println(&format!("{remote_path} ({bytes} bytes)"))?;
                    }
                    UploadEvent::ArtifactFailed(detail) => config.warn(&detail.to_string())?,
                    UploadEvent::StateChanged(state) => config.verbose_println(&format!("State: {state}"))?,
                }
            }
        }
        let progress = session.progress();
        if progress.total_count > 0 && progress.done_count != reported {
            reported = progress.done_count;
            config.progress(&format!(
                "{}/{} files, {:.0}%",
                progress.done_count,
                progress.total_count,
                progress.ratio() * 100.0
            ))?;
        }
    }
    interrupt.abort();

    let report = session.wait().await?.into_result()?;
    match report.state {
        SessionState::Completed => {
            config.success(&format!(
                "Uploaded {} artifacts ({} bytes); {} backed up",
                report.uploaded.len(),
                report.progress.done_bytes,
                report.backed_up
            ))?;
            Ok(0)
        }
        SessionState::NoUploadTarget => {
            config.success("Nothing to upload")?;
            Ok(0)
        }
        SessionState::Cancelled => Err(CliError::ExecutionFailed {
            command: "upload".to_string(),
            reason: format!(
                "cancelled after {}/{} files; re-run to resume",
                report.progress.done_count, report.progress.total_count
            ),
        }
        .into()),
        other => Err(CliError::ExecutionFailed {
            command: "upload".to_string(),
            reason: format!("session ended in state {other}"),
        }
        .into()),
    }
}

//! Upload session orchestration.

use super::{
    CdnPurger, RemoteStore, ServerDirectoryCache, UploadError, UploadErrorDetail, UploadErrorKind,
    Uploader, backup_uploaded, provision_dir, provision_segments, put_with_retry,
};
use crate::bundler::Result;
use crate::bundler::ledger::{FileKind, Ledger, ProgressCounter, ProgressSnapshot, upload_timestamp_now};
use crate::bundler::map::DependencyMap;
use crate::bundler::settings::{BUNDLES_MAP_FILE, BuildMode, Settings, UPLOAD_LIST_FILE};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore, mpsc};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Lifecycle of an upload session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Provisioning,
    Uploading,
    PostProcessing,
    Completed,
    /// Nothing was pending, or the upload server is disabled.
    NoUploadTarget,
    Cancelled,
    Failed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::NoUploadTarget | SessionState::Cancelled | SessionState::Failed
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Notifications streamed while a session runs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UploadEvent {
    StateChanged(SessionState),
    FileUploaded {
        no: u32,
        bundle_id: String,
        kind: FileKind,
        remote_path: String,
        bytes: u64,
    },
    ArtifactFailed(UploadErrorDetail),
}

/// Final outcome of a session.
#[derive(Clone, Debug)]
pub struct UploadReport {
    pub session_id: Uuid,
    pub state: SessionState,
    pub progress: ProgressSnapshot,
    pub errors: Vec<UploadErrorDetail>,
    /// Artifacts fully uploaded by this session, by number.
    pub uploaded: Vec<u32>,
    pub backed_up: usize,
}

impl UploadReport {
    /// Converts a failed report into an [`UploadError`]; other states pass through.
    pub fn into_result(self) -> Result<UploadReport> {
        if self.state != SessionState::Failed {
            return Ok(self);
        }
        let provisioning = self
            .errors
            .first()
            .filter(|e| e.kind == UploadErrorKind::DirectoryProvisioning)
            .map(|e| (e.remote_path.clone(), e.detail.clone()));
        match provisioning {
            Some((path, detail)) => Err(UploadError::Provisioning { path, detail }.into()),
            None => Err(UploadError::Failed { errors: self.errors }.into()),
        }
    }
}

/// Everything a session needs, passed in explicitly.
pub struct UploadContext<S> {
    pub settings: Arc<Settings>,
    pub ledger: Arc<Mutex<Ledger>>,
    pub map: Arc<DependencyMap>,
    pub store: Arc<S>,
    pub dir_cache: Arc<ServerDirectoryCache>,
    pub cdn: Option<CdnPurger>,
}

impl<S> Clone for UploadContext<S> {
    fn clone(&self) -> Self {
        Self {
            settings: Arc::clone(&self.settings),
            ledger: Arc::clone(&self.ledger),
            map: Arc::clone(&self.map),
            store: Arc::clone(&self.store),
            dir_cache: Arc::clone(&self.dir_cache),
            cdn: self.cdn.clone(),
        }
    }
}

/// Starts upload sessions against one remote store.
pub struct UploadManager<S> {
    ctx: UploadContext<S>,
}

#[derive(Debug)]
struct SessionShared {
    state: StdMutex<SessionState>,
    errors: StdMutex<Vec<UploadErrorDetail>>,
    progress: Arc<ProgressCounter>,
}

impl SessionShared {
    fn state(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn errors(&self) -> Vec<UploadErrorDetail> {
        self.errors.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl<S: RemoteStore> UploadManager<S> {
    pub fn new(ctx: UploadContext<S>) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &UploadContext<S> {
        &self.ctx
    }

    /// Starts a session uploading the pending artifacts of `modes`.
    ///
    /// Pending artifacts are stamped with the session timestamp and the
    /// progress totals are fixed before the session task is spawned.
    pub async fn start(&self, modes: &[BuildMode]) -> UploadSession {
        let session_id = Uuid::new_v4();
        let modes: Vec<BuildMode> = modes.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
        let server = &self.ctx.settings.server().upload_server;
        let disabled = server.disable;

        let (pending, progress, timestamps) = if disabled {
            log::warn!("Upload server {} is disabled", server.id);
            (Vec::new(), ProgressCounter::default(), Vec::new())
        } else {
            let timestamp = upload_timestamp_now();
            let mut ledger = self.ctx.ledger.lock().await;
            let mut timestamps = Vec::new();
            for mode in &modes {
                ledger.reset_upload_timestamp(*mode, timestamp);
                timestamps.push((*mode, ledger.pending_timestamps(*mode)));
            }
            let pending: Vec<u32> = modes
                .iter()
                .flat_map(|mode| ledger.pending(*mode))
                .map(|a| a.no)
                .collect();
            (pending, ledger.progress(&modes), timestamps)
        };

        let shared = Arc::new(SessionShared {
            state: StdMutex::new(SessionState::Idle),
            errors: StdMutex::new(Vec::new()),
            progress: Arc::new(progress),
        });
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let server_settings = self.ctx.settings.server();
        let uploader = Uploader::new(
            Arc::clone(&self.ctx.store),
            Arc::clone(&self.ctx.ledger),
            Arc::clone(&shared.progress),
            tx.clone(),
            cancel.clone(),
            self.ctx.settings.build_name(),
            server_settings.net_retries,
            Duration::from_secs(server_settings.net_timeout_secs),
        );

        log::info!(
            "Upload session {} started: {} artifacts across {:?}",
            session_id,
            pending.len(),
            modes
        );
        let run = SessionRun {
            session_id,
            ctx: self.ctx.clone(),
            shared: Arc::clone(&shared),
            cancel: cancel.clone(),
            events: tx,
            uploader,
            modes,
            pending,
            timestamps,
        };

        UploadSession {
            id: session_id,
            shared,
            cancel,
            events: Some(rx),
            handle: Some(tokio::spawn(run.execute())),
        }
    }
}

/// Handle to a running upload session.
///
/// Dropping the handle before [`wait`](Self::wait) cancels the session.
pub struct UploadSession {
    id: Uuid,
    shared: Arc<SessionShared>,
    cancel: CancellationToken,
    events: Option<mpsc::UnboundedReceiver<UploadEvent>>,
    handle: Option<JoinHandle<UploadReport>>,
}

impl UploadSession {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    pub fn progress(&self) -> ProgressSnapshot {
        self.shared.progress.snapshot()
    }

    pub fn errors(&self) -> Vec<UploadErrorDetail> {
        self.shared.errors()
    }

    pub fn is_finished(&self) -> bool {
        self.state().is_terminal()
    }

    /// Requests cooperative cancellation; in-flight files finish their attempt.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Takes the event receiver. Returns `None` after the first call.
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<UploadEvent>> {
        self.events.take()
    }

    /// Waits for the session task and returns its report.
    pub async fn wait(mut self) -> Result<UploadReport> {
        let Some(handle) = self.handle.take() else {
            crate::bail!("upload session already awaited");
        };
        handle
            .await
            .map_err(|e| crate::bundler::Error::GenericError(format!("upload session task failed: {e}")))
    }
}

impl Drop for UploadSession {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.cancel.cancel();
        }
    }
}

struct SessionRun<S> {
    session_id: Uuid,
    ctx: UploadContext<S>,
    shared: Arc<SessionShared>,
    cancel: CancellationToken,
    events: mpsc::UnboundedSender<UploadEvent>,
    uploader: Uploader<S>,
    modes: Vec<BuildMode>,
    pending: Vec<u32>,
    timestamps: Vec<(BuildMode, BTreeSet<i64>)>,
}

type WorkerResult = std::result::Result<(u32, std::result::Result<(), UploadErrorDetail>), JoinError>;

impl<S: RemoteStore> SessionRun<S> {
    async fn execute(self) -> UploadReport {
        if self.pending.is_empty() {
            log::info!("Nothing to upload");
            return self.finish(SessionState::NoUploadTarget, Vec::new(), 0).await;
        }

        self.set_state(SessionState::Provisioning);
        let segments = provision_segments(
            self.ctx.settings.build_name(),
            self.ctx.settings.build_target(),
            &self.timestamps,
        );
        for dir in &segments {
            if self.cancel.is_cancelled() {
                return self.finish(SessionState::Cancelled, Vec::new(), 0).await;
            }
            if let Err(e) = provision_dir(self.ctx.store.as_ref(), &self.ctx.dir_cache, dir).await {
                log::error!("{}", e);
                self.push_error(UploadErrorDetail {
                    kind: UploadErrorKind::DirectoryProvisioning,
                    no: 0,
                    bundle_id: String::new(),
                    remote_path: dir.clone(),
                    detail: e.to_string(),
                    retries_left: 0,
                });
                return self.finish(SessionState::Failed, Vec::new(), 0).await;
            }
        }

        self.set_state(SessionState::Uploading);
        let uploaded = self.run_workers().await;

        if self.cancel.is_cancelled() {
            log::warn!("Upload session {} cancelled", self.session_id);
            return self.finish(SessionState::Cancelled, uploaded, 0).await;
        }
        if !self.shared.errors().is_empty() {
            return self.finish(SessionState::Failed, uploaded, 0).await;
        }

        self.set_state(SessionState::PostProcessing);
        match self.post_process(&uploaded).await {
            Ok(backed_up) => self.finish(SessionState::Completed, uploaded, backed_up).await,
            Err(detail) => {
                log::error!("Post-processing failed: {}", detail);
                self.push_error(detail);
                self.finish(SessionState::Failed, uploaded, 0).await
            }
        }
    }

    /// Feeds pending artifacts to at most `thread_max_count` concurrent workers.
    ///
    /// The first failure stops further dequeues; running workers finish.
    async fn run_workers(&self) -> Vec<u32> {
        let limit = self.ctx.settings.server().thread_max_count;
        let workers = limit.min(self.pending.len()).max(1);
        log::info!("Uploading {} artifacts with {} workers", self.pending.len(), workers);

        let semaphore = Arc::new(Semaphore::new(workers));
        let mut tasks = JoinSet::new();
        let mut uploaded = Vec::new();
        let mut halted = false;

        for &no in &self.pending {
            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                permit = Arc::clone(&semaphore).acquire_owned() => permit,
            };
            let Ok(permit) = permit else {
                break;
            };
            while let Some(done) = tasks.try_join_next() {
                halted |= self.collect(done, &mut uploaded);
            }
            if halted || self.cancel.is_cancelled() {
                break;
            }

            let uploader = self.uploader.clone();
            tasks.spawn(async move {
                let _permit = permit;
                (no, uploader.upload(no).await)
            });
        }

        while let Some(done) = tasks.join_next().await {
            self.collect(done, &mut uploaded);
        }
        uploaded.sort_unstable();
        uploaded
    }

    /// Records a finished worker. Returns true if the session must halt.
    fn collect(&self, done: WorkerResult, uploaded: &mut Vec<u32>) -> bool {
        match done {
            Ok((no, Ok(()))) => {
                uploaded.push(no);
                false
            }
            Ok((_, Err(detail))) if detail.kind == UploadErrorKind::Cancelled => false,
            Ok((_, Err(detail))) => {
                log::error!("Upload failed: {}", detail);
                self.push_error(detail);
                true
            }
            Err(e) => {
                self.push_error(UploadErrorDetail {
                    kind: UploadErrorKind::TransferFailed,
                    no: 0,
                    bundle_id: String::new(),
                    remote_path: String::new(),
                    detail: format!("upload worker failed: {e}"),
                    retries_left: 0,
                });
                true
            }
        }
    }

    /// Backup, catalog export and upload, CDN purge.
    async fn post_process(&self, uploaded: &[u32]) -> std::result::Result<usize, UploadErrorDetail> {
        let settings = &self.ctx.settings;
        let fail = |remote_path: &str, detail: String| UploadErrorDetail {
            kind: UploadErrorKind::TransferFailed,
            no: 0,
            bundle_id: String::new(),
            remote_path: remote_path.to_string(),
            detail,
            retries_left: 0,
        };

        let backed_up = backup_uploaded(&self.ctx.ledger, &settings.backup_bundles_dir(), uploaded, &self.modes)
            .await
            .map_err(|e| fail("", format!("backup failed: {e}")))?;

        let ledger_path = settings.ledger_path();
        let map_path = settings.map_path();
        self.save_ledger()
            .await
            .map_err(|e| fail("", format!("exporting ledger: {e}")))?;
        self.ctx
            .map
            .export(&map_path)
            .await
            .map_err(|e| fail("", format!("exporting dependency map: {e}")))?;

        let server = settings.server();
        let root = settings.build_name().trim_matches('/');
        for (local, name) in [(&ledger_path, UPLOAD_LIST_FILE), (&map_path, BUNDLES_MAP_FILE)] {
            let remote = format!("{root}/{name}");
            put_with_retry(
                self.ctx.store.as_ref(),
                local,
                &remote,
                server.net_retries,
                Duration::from_secs(server.net_timeout_secs),
                &self.cancel,
            )
            .await
            .map_err(|f| fail(&remote, f.detail))?;
        }

        if let Some(cdn) = &self.ctx.cdn {
            cdn.purge()
                .await
                .map_err(|e| fail(&cdn_target(settings), format!("CDN purge failed: {e}")))?;
        }
        Ok(backed_up)
    }

    async fn save_ledger(&self) -> Result<()> {
        let snapshot = self.ctx.ledger.lock().await.clone();
        snapshot.save(&self.ctx.settings.ledger_path()).await
    }

    fn set_state(&self, state: SessionState) {
        *self.shared.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
        log::info!("Upload session {} -> {}", self.session_id, state);
        let _ = self.events.send(UploadEvent::StateChanged(state));
    }

    fn push_error(&self, detail: UploadErrorDetail) {
        let _ = self.events.send(UploadEvent::ArtifactFailed(detail.clone()));
        self.shared
            .errors
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(detail);
    }

    async fn finish(&self, state: SessionState, uploaded: Vec<u32>, backed_up: usize) -> UploadReport {
        // Completed sessions already exported during post-processing.
        if !matches!(state, SessionState::Completed | SessionState::NoUploadTarget) {
            if let Err(e) = self.save_ledger().await {
                log::error!("Failed to export ledger: {}", e);
            }
        }
        self.set_state(state);
        UploadReport {
            session_id: self.session_id,
            state,
            progress: self.shared.progress.snapshot(),
            errors: self.shared.errors(),
            uploaded,
            backed_up,
        }
    }
}

fn cdn_target(settings: &Settings) -> String {
    settings
        .server()
        .cdn
        .as_ref()
        .map(|c| c.url.clone())
        .unwrap_or_default()
}

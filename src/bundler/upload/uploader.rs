//! Per-artifact upload with bounded retries.

use super::{RemoteStore, UploadErrorDetail, UploadErrorKind, UploadEvent};
use crate::bundler::ledger::{FileKind, Ledger, ProgressCounter, UploadArtifact};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

/// Why [`put_with_retry`] gave up.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransferFailure {
    pub cancelled: bool,
    pub detail: String,
    pub retries_left: u32,
}

/// Uploads one file with exactly `attempts` tries, each bounded by `timeout`.
///
/// Cancellation is checked before every attempt.
pub async fn put_with_retry<S: RemoteStore>(
    store: &S,
    local: &Path,
    remote_path: &str,
    attempts: u32,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<(), TransferFailure> {
    let mut last_error = String::from("no attempt made");
    for attempt in 1..=attempts {
        if cancel.is_cancelled() {
            return Err(TransferFailure {
                cancelled: true,
                detail: "cancelled".into(),
                retries_left: attempts - attempt + 1,
            });
        }
        match tokio::time::timeout(timeout, store.put_file(local, remote_path)).await {
            Ok(Ok(())) => {
                log::debug!("Uploaded {} -> {}", local.display(), remote_path);
                return Ok(());
            }
            Ok(Err(e)) => last_error = e.to_string(),
            Err(_) => last_error = format!("timed out after {}s", timeout.as_secs()),
        }
        log::warn!(
            "Upload attempt {}/{} of {} failed: {}",
            attempt,
            attempts,
            remote_path,
            last_error
        );
    }
    Err(TransferFailure {
        cancelled: false,
        detail: last_error,
        retries_left: 0,
    })
}

/// Uploads single artifacts for a session.
pub struct Uploader<S> {
    store: Arc<S>,
    ledger: Arc<Mutex<Ledger>>,
    progress: Arc<ProgressCounter>,
    events: mpsc::UnboundedSender<UploadEvent>,
    cancel: CancellationToken,
    build_name: String,
    attempts: u32,
    timeout: Duration,
}

impl<S> Clone for Uploader<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            ledger: Arc::clone(&self.ledger),
            progress: Arc::clone(&self.progress),
            events: self.events.clone(),
            cancel: self.cancel.clone(),
            build_name: self.build_name.clone(),
            attempts: self.attempts,
            timeout: self.timeout,
        }
    }
}

struct FileJob {
    kind: FileKind,
    local: PathBuf,
    remote: String,
}

impl<S: RemoteStore> Uploader<S> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<S>,
        ledger: Arc<Mutex<Ledger>>,
        progress: Arc<ProgressCounter>,
        events: mpsc::UnboundedSender<UploadEvent>,
        cancel: CancellationToken,
        build_name: impl Into<String>,
        attempts: u32,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            ledger,
            progress,
            events,
            cancel,
            build_name: build_name.into(),
            attempts,
            timeout,
        }
    }

    /// Remote path of one of `artifact`'s files beneath the build root.
    pub fn remote_path(&self, ledger: &Ledger, artifact: &UploadArtifact, kind: FileKind) -> String {
        format!(
            "{}/{}/{}",
            self.build_name.trim_matches('/'),
            artifact.remote_dir(),
            ledger.file_name(artifact, kind)
        )
    }

    /// Uploads the payload and then, if required, the manifest of artifact `no`.
    ///
    /// Files whose status flag is already set are skipped.
    pub async fn upload(&self, no: u32) -> Result<(), UploadErrorDetail> {
        let (artifact, jobs) = self.plan(no).await?;

        for job in jobs {
            let size = tokio::fs::metadata(&job.local).await.map(|m| m.len());
            let Ok(size) = size else {
                return Err(self.detail(
                    &artifact,
                    UploadErrorKind::LocalFileMissing,
                    &job.remote,
                    format!("{} not found", job.local.display()),
                    self.attempts,
                ));
            };

            put_with_retry(
                self.store.as_ref(),
                &job.local,
                &job.remote,
                self.attempts,
                self.timeout,
                &self.cancel,
            )
            .await
            .map_err(|f| {
                let kind = if f.cancelled {
                    UploadErrorKind::Cancelled
                } else {
                    UploadErrorKind::TransferFailed
                };
                self.detail(&artifact, kind, &job.remote, f.detail, f.retries_left)
            })?;

            self.ledger
                .lock()
                .await
                .mark(no, job.kind)
                .map_err(|e| self.detail(&artifact, UploadErrorKind::TransferFailed, &job.remote, e.to_string(), 0))?;
            self.progress.complete(size);
            let _ = self.events.send(UploadEvent::FileUploaded {
                no,
                bundle_id: artifact.id.clone(),
                kind: job.kind,
                remote_path: job.remote,
                bytes: size,
            });
        }
        Ok(())
    }

    /// Snapshot of the artifact and the files it still needs to upload.
    ///
    /// Re-applies `local_saved` after a status reset when the build output
    /// is still on disk.
    async fn plan(&self, no: u32) -> Result<(UploadArtifact, Vec<FileJob>), UploadErrorDetail> {
        let mut ledger = self.ledger.lock().await;
        let Some(artifact) = ledger.get(no).cloned() else {
            return Err(UploadErrorDetail {
                kind: UploadErrorKind::TransferFailed,
                no,
                bundle_id: String::new(),
                remote_path: String::new(),
                detail: format!("artifact #{no} is not in the ledger"),
                retries_left: self.attempts,
            });
        };

        let bundle_local = ledger.local_path(&artifact, FileKind::Bundle);
        if !artifact.status.local_saved() {
            if bundle_local.exists() {
                log::debug!("Re-marking #{} {} as saved locally", no, artifact.id);
                if let Err(e) = ledger.mark_local_saved(no) {
                    let remote = self.remote_path(&ledger, &artifact, FileKind::Bundle);
                    return Err(self.detail(&artifact, UploadErrorKind::TransferFailed, &remote, e.to_string(), 0));
                }
            } else {
                let remote = self.remote_path(&ledger, &artifact, FileKind::Bundle);
                return Err(self.detail(
                    &artifact,
                    UploadErrorKind::LocalFileMissing,
                    &remote,
                    format!("{} not found", bundle_local.display()),
                    self.attempts,
                ));
            }
        }

        let mut jobs = Vec::new();
        if !artifact.status.bundle_uploaded() {
            jobs.push(FileJob {
                kind: FileKind::Bundle,
                local: bundle_local,
                remote: self.remote_path(&ledger, &artifact, FileKind::Bundle),
            });
        }
        if ledger.manifest_required(&artifact) && !artifact.status.manifest_uploaded() {
            jobs.push(FileJob {
                kind: FileKind::Manifest,
                local: ledger.local_path(&artifact, FileKind::Manifest),
                remote: self.remote_path(&ledger, &artifact, FileKind::Manifest),
            });
        }
        Ok((artifact, jobs))
    }

    fn detail(
        &self,
        artifact: &UploadArtifact,
        kind: UploadErrorKind,
        remote_path: &str,
        detail: String,
        retries_left: u32,
    ) -> UploadErrorDetail {
        UploadErrorDetail {
            kind,
            no: artifact.no,
            bundle_id: artifact.id.clone(),
            remote_path: remote_path.to_string(),
            detail,
            retries_left,
        }
    }
}

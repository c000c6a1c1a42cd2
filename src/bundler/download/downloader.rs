//! Catalog fetch and bounded-concurrency bundle download.

use super::{BundleSource, DOWNLOAD_LIST_FILE, DownloadError, DownloadFailure, DownloadList};
use crate::bundler::Result;
use crate::bundler::ledger::{FileKind, Ledger, LedgerScope, ProgressCounter, ProgressSnapshot};
use crate::bundler::map::DependencyMap;
use crate::bundler::settings::{BUNDLES_MAP_FILE, BuildMode, Settings, UPLOAD_LIST_FILE};
use crate::bundler::upload::TransferFailure;
use crate::bundler::utils::{digest_file, fs};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

/// Checks `path` against a recorded size and hash; `None` when it matches.
///
/// An empty hash or a zero size is not checked.
async fn mismatch(path: &Path, size: u64, hash: &str) -> Result<Option<String>> {
    let digest = digest_file(path).await?;
    if size > 0 && digest.size != size {
        return Ok(Some(format!("size {} != recorded {}", digest.size, size)));
    }
    if !hash.is_empty() && digest.hash != hash {
        return Ok(Some(format!("hash {} != recorded {}", digest.hash, hash)));
    }
    Ok(None)
}

/// Downloads one file with exactly `attempts` tries, each bounded by `timeout`.
///
/// With `expected`, a cached file that already matches is kept without a
/// fetch, and a fetched file that does not match is deleted and retried.
/// Returns the final file size.
pub async fn fetch_with_retry<S: BundleSource>(
    source: &S,
    remote_path: &str,
    dest: &Path,
    expected: Option<(u64, &str)>,
    attempts: u32,
    timeout: Duration,
    cancel: &CancellationToken,
) -> std::result::Result<u64, TransferFailure> {
    let check = |detail: crate::bundler::Error| TransferFailure {
        cancelled: false,
        detail: detail.to_string(),
        retries_left: attempts,
    };
    if let Some((size, hash)) = expected {
        if dest.is_file() && mismatch(dest, size, hash).await.map_err(check)?.is_none() {
            log::debug!("{} already cached", dest.display());
            return Ok(size);
        }
    }

    let mut last_error = String::from("no attempt made");
    for attempt in 1..=attempts {
        if cancel.is_cancelled() {
            return Err(TransferFailure {
                cancelled: true,
                detail: "cancelled".into(),
                retries_left: attempts - attempt + 1,
            });
        }
        match tokio::time::timeout(timeout, source.fetch(remote_path, dest)).await {
            Ok(Ok(bytes)) => match expected {
                None => {
                    log::debug!("Downloaded {} -> {} ({} bytes)", remote_path, dest.display(), bytes);
                    return Ok(bytes);
                }
                Some((size, hash)) => match mismatch(dest, size, hash).await {
                    Ok(None) => {
                        log::debug!("Downloaded {} -> {}", remote_path, dest.display());
                        return Ok(size);
                    }
                    Ok(Some(detail)) => {
                        last_error = detail;
                        if let Err(e) = fs::remove_file(dest).await {
                            log::warn!("Failed to delete {}: {}", dest.display(), e);
                        }
                    }
                    Err(e) => last_error = e.to_string(),
                },
            },
            Ok(Err(e)) => last_error = e.to_string(),
            Err(_) => last_error = format!("timed out after {}s", timeout.as_secs()),
        }
        log::warn!(
            "Download attempt {}/{} of {} failed: {}",
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

/// The published catalogs of a build.
#[derive(Clone, Debug)]
pub struct Catalogs {
    pub ledger: Ledger,
    pub map: DependencyMap,
}

/// Outcome of [`Downloader::download`].
#[derive(Clone, Debug, Default)]
pub struct DownloadReport {
    /// Targets completed by this run, by number.
    pub downloaded: Vec<u32>,
    pub progress: ProgressSnapshot,
    pub errors: Vec<DownloadFailure>,
    pub cancelled: bool,
}

impl DownloadReport {
    /// Converts a failed or cancelled report into a [`DownloadError`].
    pub fn into_result(self) -> Result<DownloadReport> {
        if !self.errors.is_empty() {
            return Err(DownloadError::Failed { errors: self.errors }.into());
        }
        if self.cancelled {
            return Err(DownloadError::Cancelled {
                done: self.progress.done_count,
                total: self.progress.total_count,
            }
            .into());
        }
        Ok(self)
    }
}

struct FileJob {
    kind: FileKind,
    remote: String,
    local: PathBuf,
    size: u64,
    hash: String,
}

struct TargetJob {
    no: u32,
    bundle_id: String,
    files: Vec<FileJob>,
}

type TargetOutcome = (u32, Vec<(FileKind, u64)>, Option<DownloadFailure>);

/// Downloads into the client bundle cache from one source.
pub struct Downloader<S> {
    source: Arc<S>,
    bundles_dir: PathBuf,
    workers: usize,
    attempts: u32,
    timeout: Duration,
    cancel: CancellationToken,
}

impl<S: BundleSource> Downloader<S> {
    /// Uses the bundle cache and network limits of `settings`.
    pub fn new(source: S, settings: &Settings) -> Self {
        let server = settings.server();
        Self {
            source: Arc::new(source),
            bundles_dir: settings.bundles_dir().to_path_buf(),
            workers: server.thread_max_count.max(1),
            attempts: server.net_retries,
            timeout: Duration::from_secs(server.net_timeout_secs),
            cancel: CancellationToken::new(),
        }
    }

    pub fn bundles_dir(&self) -> &Path {
        &self.bundles_dir
    }

    /// Where the download list is persisted.
    pub fn list_path(&self) -> PathBuf {
        self.bundles_dir.join(DOWNLOAD_LIST_FILE)
    }

    /// Requests cooperative cancellation; in-flight files finish their attempt.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Fetches `UploadList.json` and `BundlesMap.json` into the bundle cache.
    pub async fn fetch_catalogs(&self, scope: LedgerScope) -> Result<Catalogs> {
        fs::create_dir_all(&self.bundles_dir).await?;
        let ledger_path = self.bundles_dir.join(UPLOAD_LIST_FILE);
        let map_path = self.bundles_dir.join(BUNDLES_MAP_FILE);

        for (name, dest) in [(UPLOAD_LIST_FILE, &ledger_path), (BUNDLES_MAP_FILE, &map_path)] {
            fs::remove_file(dest).await?;
            fetch_with_retry(self.source.as_ref(), name, dest, None, self.attempts, self.timeout, &self.cancel)
                .await
                .map_err(|f| DownloadError::Failed {
                    errors: vec![DownloadFailure {
                        no: 0,
                        bundle_id: String::new(),
                        remote_path: name.to_string(),
                        detail: f.detail,
                        cancelled: f.cancelled,
                        retries_left: f.retries_left,
                    }],
                })?;
        }

        let ledger = Ledger::load(&ledger_path, scope).await?;
        let map = DependencyMap::import(&map_path)
            .await?
            .ok_or_else(|| DownloadError::CatalogMissing {
                name: BUNDLES_MAP_FILE.to_string(),
            })?;
        log::info!(
            "Fetched catalogs from {}: {} artifacts, {} bundles",
            self.source.id(),
            ledger.len(),
            map.len()
        );
        Ok(Catalogs { ledger, map })
    }

    /// Loads the persisted list and merges the downloadable artifacts of `catalogs`.
    pub async fn prepare(&self, catalogs: &Catalogs, build_mode: BuildMode) -> Result<DownloadList> {
        let list = match DownloadList::load(&self.list_path()).await? {
            Some(mut list) => {
                list.manifest_upload = catalogs.ledger.scope().manifest_upload;
                list.file_suffix = catalogs.ledger.scope().file_suffix.clone();
                list.merge(&catalogs.ledger, build_mode);
                list
            }
            None => DownloadList::from_ledger(&catalogs.ledger, build_mode),
        };
        list.save(&self.list_path()).await?;
        Ok(list)
    }

    /// Downloads every pending file of `list` and saves the list.
    ///
    /// At most `thread_max_count` targets download at once, payload before
    /// manifest. The first failure stops further dequeues; running workers
    /// finish and their files are still marked.
    pub async fn download(&self, list: &mut DownloadList) -> Result<DownloadReport> {
        let jobs = self.plan(list);
        let progress = Arc::new(list.progress());
        if jobs.is_empty() {
            log::info!("Nothing to download");
            return Ok(DownloadReport {
                progress: progress.snapshot(),
                ..Default::default()
            });
        }

        let workers = self.workers.min(jobs.len());
        log::info!("Downloading {} targets with {} workers", jobs.len(), workers);
        let semaphore = Arc::new(Semaphore::new(workers));
        let mut tasks = JoinSet::new();
        let mut report = DownloadReport::default();
        let mut halted = false;

        for job in jobs {
            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                permit = Arc::clone(&semaphore).acquire_owned() => permit,
            };
            let Ok(permit) = permit else {
                break;
            };
            while let Some(done) = tasks.try_join_next() {
                halted |= collect(done, list, &progress, &mut report);
            }
            if halted || self.cancel.is_cancelled() {
                break;
            }

            let source = Arc::clone(&self.source);
            let cancel = self.cancel.clone();
            let (attempts, timeout) = (self.attempts, self.timeout);
            tasks.spawn(async move {
                let _permit = permit;
                download_target(source.as_ref(), job, attempts, timeout, &cancel).await
            });
        }

        while let Some(done) = tasks.join_next().await {
            collect(done, list, &progress, &mut report);
        }
        report.downloaded.sort_unstable();
        report.progress = progress.snapshot();
        report.cancelled = self.cancel.is_cancelled();

        list.save(&self.list_path()).await?;
        log::info!(
            "Downloaded {} targets ({}/{} files)",
            report.downloaded.len(),
            report.progress.done_count,
            report.progress.total_count
        );
        Ok(report)
    }

    fn plan(&self, list: &DownloadList) -> Vec<TargetJob> {
        list.pending()
            .into_iter()
            .map(|target| TargetJob {
                no: target.no,
                bundle_id: target.id.clone(),
                files: list
                    .pending_files(target)
                    .into_iter()
                    .map(|kind| {
                        let (size, hash) = target.expected(kind);
                        FileJob {
                            kind,
                            remote: list.remote_path(target, kind),
                            local: list.local_path(&self.bundles_dir, target, kind),
                            size,
                            hash: hash.to_string(),
                        }
                    })
                    .collect(),
            })
            .collect()
    }
}

async fn download_target<S: BundleSource>(
    source: &S,
    job: TargetJob,
    attempts: u32,
    timeout: Duration,
    cancel: &CancellationToken,
) -> TargetOutcome {
    let mut done = Vec::new();
    for file in job.files {
        let failure = |detail: String, cancelled: bool, retries_left: u32| DownloadFailure {
            no: job.no,
            bundle_id: job.bundle_id.clone(),
            remote_path: file.remote.clone(),
            detail,
            cancelled,
            retries_left,
        };
        if let Some(parent) = file.local.parent() {
            if let Err(e) = fs::create_dir_all(parent).await {
                return (job.no, done, Some(failure(e.to_string(), false, attempts)));
            }
        }
        match fetch_with_retry(
            source,
            &file.remote,
            &file.local,
            Some((file.size, &file.hash)),
            attempts,
            timeout,
            cancel,
        )
        .await
        {
            Ok(bytes) => done.push((file.kind, bytes)),
            Err(f) => return (job.no, done, Some(failure(f.detail, f.cancelled, f.retries_left))),
        }
    }
    (job.no, done, None)
}

/// Records a finished worker. Returns true if the run must halt.
fn collect(
    done: std::result::Result<TargetOutcome, JoinError>,
    list: &mut DownloadList,
    progress: &ProgressCounter,
    report: &mut DownloadReport,
) -> bool {
    let (no, files, failure) = match done {
        Ok(outcome) => outcome,
        Err(e) => {
            report.errors.push(DownloadFailure {
                no: 0,
                bundle_id: String::new(),
                remote_path: String::new(),
                detail: format!("download worker failed: {e}"),
                cancelled: false,
                retries_left: 0,
            });
            return true;
        }
    };
    for (kind, bytes) in files {
        if let Err(e) = list.mark(no, kind) {
            log::error!("{}", e);
        }
        progress.complete(bytes);
    }
    if list.get(no).is_some_and(|t| list.is_complete(t)) {
        report.downloaded.push(no);
    }
    match failure {
        None => false,
        Some(f) if f.cancelled => false,
        Some(f) => {
            log::error!("Download failed: {}", f);
            report.errors.push(f);
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Serves fixed contents, corrupting the first `corrupt` fetches.
    struct FixedSource {
        files: std::collections::HashMap<String, Vec<u8>>,
        corrupt: AtomicU32,
        fetched: Mutex<Vec<String>>,
    }

    impl FixedSource {
        fn new(files: &[(&str, &[u8])], corrupt: u32) -> Self {
            Self {
                files: files.iter().map(|(k, v)| (k.to_string(), v.to_vec())).collect(),
                corrupt: AtomicU32::new(corrupt),
                fetched: Mutex::new(Vec::new()),
            }
        }
    }

    impl BundleSource for FixedSource {
        fn id(&self) -> &str {
            "fixed"
        }

        async fn fetch(&self, remote_path: &str, dest: &Path) -> Result<u64> {
            self.fetched.lock().unwrap().push(remote_path.to_string());
            let Some(data) = self.files.get(remote_path) else {
                return Err(DownloadError::remote("download", remote_path, "missing").into());
            };
            let corrupt = self
                .corrupt
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            let body: &[u8] = if corrupt { b"garbage!" } else { data };
            tokio::fs::write(dest, body).await?;
            Ok(body.len() as u64)
        }
    }

    const ABC_SHA256: &str = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";

    #[tokio::test]
    async fn corrupt_download_is_deleted_and_retried() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("ui.ab");
        let source = FixedSource::new(&[("ui.ab", b"abc")], 1);
        let cancel = CancellationToken::new();

        let size = fetch_with_retry(&source, "ui.ab", &dest, Some((3, ABC_SHA256)), 2, Duration::from_secs(5), &cancel)
            .await
            .unwrap();
        assert_eq!(size, 3);
        assert_eq!(source.fetched.lock().unwrap().len(), 2);

        // Cached and matching: no further fetch.
        fetch_with_retry(&source, "ui.ab", &dest, Some((3, ABC_SHA256)), 2, Duration::from_secs(5), &cancel)
            .await
            .unwrap();
        assert_eq!(source.fetched.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn persistent_mismatch_exhausts_attempts() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("ui.ab");
        let source = FixedSource::new(&[("ui.ab", b"abc")], 5);
        let cancel = CancellationToken::new();

        let failure = fetch_with_retry(&source, "ui.ab", &dest, Some((3, ABC_SHA256)), 3, Duration::from_secs(5), &cancel)
            .await
            .unwrap_err();
        assert!(!failure.cancelled);
        assert_eq!(failure.retries_left, 0);
        assert!(failure.detail.contains("size"));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn cancelled_fetch_makes_no_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let source = FixedSource::new(&[("ui.ab", b"abc")], 0);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let failure = fetch_with_retry(&source, "ui.ab", &dir.path().join("ui.ab"), None, 3, Duration::from_secs(5), &cancel)
            .await
            .unwrap_err();
        assert!(failure.cancelled);
        assert_eq!(failure.retries_left, 3);
        assert!(source.fetched.lock().unwrap().is_empty());
    }

    #[test]
    fn failed_report_converts_to_error() {
        let report = DownloadReport {
            errors: vec![DownloadFailure {
                no: 2,
                bundle_id: "ui".into(),
                remote_path: "bundles/ui.ab".into(),
                detail: "missing".into(),
                cancelled: false,
                retries_left: 0,
            }],
            ..Default::default()
        };
        let err = report.into_result().unwrap_err();
        assert!(err.to_string().contains("#2 ui <- bundles/ui.ab: missing"));

        let cancelled = DownloadReport {
            cancelled: true,
            ..Default::default()
        };
        assert!(cancelled.into_result().is_err());
        assert!(DownloadReport::default().into_result().is_ok());
    }
}

//! Upload ledger: the persistent record of every built and uploaded bundle.
//!
//! Each build pass hashes the engine output and either reuses an existing
//! record or appends a new one. The upload pipeline then advances each
//! record's [`UploadStatus`] through the allowed transitions.
//!
//! The ledger itself performs no network I/O; it is shared with the pipeline
//! behind a mutex and persisted as `UploadList.json`.

mod artifact;
mod progress;
mod status;

pub use artifact::{FileKind, UploadArtifact};
pub use progress::{ProgressCounter, ProgressSnapshot};
pub use status::{Transition, UploadStatus};

use crate::bundler::Result;
use crate::bundler::map::{BundleType, DependencyMap, FileType, MAIN_MANIFEST_NAME};
use crate::bundler::settings::BuildMode;
use crate::bundler::utils::{digest_file, digest_if_exists, fs};
use chrono::{Datelike, Local, Timelike};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Ledger state violations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// A status flag was set out of order.
    #[error("cannot apply {transition:?} to an artifact with status {status}")]
    InvalidTransition {
        transition: Transition,
        status: UploadStatus,
    },

    /// No artifact carries this sequence number.
    #[error("no artifact with number {no}")]
    UnknownArtifact { no: u32 },

    /// The engine did not produce the expected bundle file.
    #[error("build output missing: {}", path.display())]
    MissingBuildOutput { path: PathBuf },
}

/// Settings the ledger stamps onto, and filters, artifacts by.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LedgerScope {
    pub build_target: String,
    pub app_version: String,
    pub market_version: String,
    /// Process-wide manifest upload toggle.
    pub manifest_upload: bool,
    pub file_suffix: Option<String>,
    /// Engine output directory holding `Normal/` and `Scenes/`.
    pub output_dir: PathBuf,
}

/// A freshly built bundle to record.
#[derive(Clone, Debug)]
pub struct RecordRequest {
    pub id: String,
    pub bundle_type: BundleType,
    pub file_type: FileType,
    pub build_mode: BuildMode,
    pub engine_hash: Option<String>,
}

/// Result of [`Ledger::record_or_reuse`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordOutcome {
    /// A new artifact with this number was appended.
    Appended(u32),
    /// The unfinished artifact with this number was reused in place.
    Updated(u32),
    /// Content matches the last uploaded artifact; the build output was deleted.
    Unchanged,
}

/// Counters from [`Ledger::record_build`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RecordSummary {
    pub appended: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub missing: usize,
}

#[derive(Default, Serialize, Deserialize)]
struct LedgerFile {
    #[serde(default)]
    artifacts: Vec<UploadArtifact>,
}

/// Ordered list of upload artifacts.
#[derive(Clone, Debug)]
pub struct Ledger {
    scope: LedgerScope,
    artifacts: Vec<UploadArtifact>,
}

impl Ledger {
    pub fn new(scope: LedgerScope) -> Self {
        Self {
            scope,
            artifacts: Vec::new(),
        }
    }

    /// Loads the ledger at `path`, or starts an empty one if there is none.
    pub async fn load(path: &Path, scope: LedgerScope) -> Result<Self> {
        let file: Option<LedgerFile> = fs::read_json(path).await?;
        let artifacts = file.map(|f| f.artifacts).unwrap_or_default();
        log::debug!("Loaded {} ledger artifacts from {}", artifacts.len(), path.display());
        Ok(Self { scope, artifacts })
    }

    /// Writes the ledger as JSON (delete-then-write).
    pub async fn save(&self, path: &Path) -> Result<()> {
        let file = LedgerFile {
            artifacts: self.artifacts.clone(),
        };
        fs::write_json(path, &file).await
    }

    pub fn scope(&self) -> &LedgerScope {
        &self.scope
    }

    pub fn artifacts(&self) -> &[UploadArtifact] {
        &self.artifacts
    }

    pub fn get(&self, no: u32) -> Option<&UploadArtifact> {
        self.artifacts.iter().find(|a| a.no == no)
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    /// Drops every record.
    pub fn clear(&mut self) {
        self.artifacts.clear();
    }

    pub fn manifest_required(&self, artifact: &UploadArtifact) -> bool {
        artifact.manifest_required(self.scope.manifest_upload)
    }

    pub fn is_all_uploaded(&self, artifact: &UploadArtifact) -> bool {
        artifact.is_all_uploaded(self.scope.manifest_upload)
    }

    /// File name of one of `artifact`'s files.
    pub fn file_name(&self, artifact: &UploadArtifact, kind: FileKind) -> String {
        artifact.file_name(kind, self.scope.file_suffix.as_deref())
    }

    /// Engine output path: `<output_dir>/<Normal|Scenes>/<file>`.
    pub fn local_path(&self, artifact: &UploadArtifact, kind: FileKind) -> PathBuf {
        self.scope
            .output_dir
            .join(artifact.bundle_type.dir_name())
            .join(self.file_name(artifact, kind))
    }

    fn in_scope(&self, artifact: &UploadArtifact) -> bool {
        artifact.build_target == self.scope.build_target
            && artifact.app_version == self.scope.app_version
            && artifact.market_version == self.scope.market_version
    }

    /// Index of the newest artifact with the given identity.
    fn newest(&self, id: &str, build_mode: BuildMode) -> Option<usize> {
        self.artifacts
            .iter()
            .enumerate()
            .filter(|(_, a)| {
                a.has_identity(
                    id,
                    &self.scope.build_target,
                    build_mode,
                    &self.scope.app_version,
                    &self.scope.market_version,
                )
            })
            .max_by_key(|(_, a)| (a.upload_timestamp, a.no))
            .map(|(idx, _)| idx)
    }

    fn index_of(&self, no: u32) -> std::result::Result<usize, LedgerError> {
        self.artifacts
            .iter()
            .position(|a| a.no == no)
            .ok_or(LedgerError::UnknownArtifact { no })
    }

    fn next_no(&self) -> u32 {
        self.artifacts.iter().map(|a| a.no).max().unwrap_or(0) + 1
    }

    /// Records a freshly built bundle, reusing or skipping where possible.
    ///
    /// If the newest artifact of the same identity is fully uploaded and its
    /// stored hashes all match, the build output is deleted and nothing is
    /// recorded. An unfinished newest artifact is reused in place, so there
    /// is never more than one unfinished artifact per identity.
    pub async fn record_or_reuse(&mut self, request: RecordRequest) -> Result<RecordOutcome> {
        let mut candidate = UploadArtifact {
            no: 0,
            id: request.id.clone(),
            bundle_type: request.bundle_type,
            file_type: request.file_type,
            build_target: self.scope.build_target.clone(),
            build_mode: request.build_mode,
            market_version: self.scope.market_version.clone(),
            app_version: self.scope.app_version.clone(),
            data_size: 0,
            manifest_data_size: 0,
            hash: String::new(),
            manifest_hash: String::new(),
            engine_hash: request.engine_hash.clone().unwrap_or_default(),
            upload_timestamp: upload_timestamp_now(),
            status: UploadStatus::default(),
            discarded: false,
        };
        let bundle_path = self.local_path(&candidate, FileKind::Bundle);
        let manifest_path = self.local_path(&candidate, FileKind::Manifest);

        if !bundle_path.exists() {
            return Err(LedgerError::MissingBuildOutput { path: bundle_path }.into());
        }
        let payload = digest_file(&bundle_path).await?;
        let manifest = digest_if_exists(&manifest_path).await?.unwrap_or_default();
        candidate.hash = payload.hash;
        candidate.data_size = payload.size;
        candidate.manifest_hash = manifest.hash;
        candidate.manifest_data_size = manifest.size;

        let newest = self.newest(&request.id, request.build_mode);

        if let Some(idx) = newest {
            let last = &self.artifacts[idx];
            if last.file_type == FileType::Bundle
                && self.is_all_uploaded(last)
                && same_content(last, &candidate)
            {
                log::debug!("Bundle {} unchanged since artifact #{}; skipping", request.id, last.no);
                fs::remove_file(&bundle_path).await?;
                fs::remove_file(&manifest_path).await?;
                return Ok(RecordOutcome::Unchanged);
            }
        }

        let manifest_required = self.manifest_required(&candidate);
        match newest.filter(|&idx| !self.is_all_uploaded(&self.artifacts[idx])) {
            Some(idx) => {
                let existing = &mut self.artifacts[idx];
                let content_changed = !same_content(existing, &candidate);
                existing.bundle_type = candidate.bundle_type;
                existing.file_type = candidate.file_type;
                existing.hash = candidate.hash;
                existing.manifest_hash = candidate.manifest_hash;
                existing.engine_hash = candidate.engine_hash;
                existing.data_size = candidate.data_size;
                existing.manifest_data_size = candidate.manifest_data_size;
                existing.discarded = false;
                let transition = if content_changed {
                    existing.upload_timestamp = candidate.upload_timestamp;
                    Transition::Rebuild
                } else {
                    Transition::MarkLocalSaved
                };
                existing.status.apply(transition, manifest_required)?;
                log::debug!("Reused artifact #{} for {}", existing.no, existing.id);
                Ok(RecordOutcome::Updated(existing.no))
            }
            None => {
                candidate.no = self.next_no();
                candidate.status.apply(Transition::MarkLocalSaved, manifest_required)?;
                let no = candidate.no;
                log::debug!("Appended artifact #{} for {}", no, candidate.id);
                self.artifacts.push(candidate);
                Ok(RecordOutcome::Appended(no))
            }
        }
    }

    /// Records every bundle of `map` plus the main manifest.
    ///
    /// Bundles whose output file is missing are skipped with a warning.
    pub async fn record_build(
        &mut self,
        map: &DependencyMap,
        engine_hashes: &HashMap<String, String>,
        build_mode: BuildMode,
    ) -> Result<RecordSummary> {
        let mut requests: Vec<RecordRequest> = map
            .iter()
            .map(|b| RecordRequest {
                id: b.id.clone(),
                bundle_type: b.bundle_type,
                file_type: FileType::Bundle,
                build_mode,
                engine_hash: engine_hashes.get(&b.id).cloned(),
            })
            .collect();
        requests.push(RecordRequest {
            id: MAIN_MANIFEST_NAME.to_string(),
            bundle_type: BundleType::Normal,
            file_type: FileType::MainManifest,
            build_mode,
            engine_hash: None,
        });

        let mut summary = RecordSummary::default();
        for request in requests {
            match self.record_or_reuse(request).await {
                Ok(RecordOutcome::Appended(_)) => summary.appended += 1,
                Ok(RecordOutcome::Updated(_)) => summary.updated += 1,
                Ok(RecordOutcome::Unchanged) => summary.unchanged += 1,
                Err(crate::bundler::Error::Ledger(LedgerError::MissingBuildOutput { path })) => {
                    log::warn!("Skipping bundle without build output: {}", path.display());
                    summary.missing += 1;
                }
                Err(e) => return Err(e),
            }
        }
        log::info!(
            "Recorded {} build: {} new, {} reused, {} unchanged, {} missing",
            build_mode,
            summary.appended,
            summary.updated,
            summary.unchanged,
            summary.missing
        );
        Ok(summary)
    }

    /// Artifacts of `build_mode` still to upload, ordered by number.
    pub fn pending(&self, build_mode: BuildMode) -> Vec<&UploadArtifact> {
        let mut list: Vec<&UploadArtifact> = self
            .artifacts
            .iter()
            .filter(|a| {
                a.build_mode == build_mode
                    && self.in_scope(a)
                    && !a.discarded
                    && !self.is_all_uploaded(a)
            })
            .collect();
        list.sort_by_key(|a| a.no);
        list
    }

    /// Build modes that have pending artifacts.
    pub fn pending_modes(&self) -> Vec<BuildMode> {
        BuildMode::ALL
            .into_iter()
            .filter(|mode| !self.pending(*mode).is_empty())
            .collect()
    }

    /// Fully uploaded, locally saved artifacts clients may download, ordered by number.
    pub fn download_entries(&self, build_mode: BuildMode) -> Vec<&UploadArtifact> {
        let mut list: Vec<&UploadArtifact> = self
            .artifacts
            .iter()
            .filter(|a| {
                a.build_mode == build_mode
                    && self.in_scope(a)
                    && !a.discarded
                    && a.status.local_saved()
                    && self.is_all_uploaded(a)
            })
            .collect();
        list.sort_by_key(|a| a.no);
        list
    }

    /// Version epoch of each bundle id: its newest downloadable upload timestamp.
    pub fn latest_epochs(&self, build_mode: BuildMode) -> BTreeMap<String, i64> {
        let mut epochs = BTreeMap::new();
        for artifact in self.download_entries(build_mode) {
            let epoch = epochs.entry(artifact.id.clone()).or_insert(artifact.upload_timestamp);
            *epoch = (*epoch).max(artifact.upload_timestamp);
        }
        epochs
    }

    /// Progress totals for an upload session over `build_modes`.
    pub fn progress(&self, build_modes: &[BuildMode]) -> ProgressCounter {
        let pending = build_modes.iter().flat_map(|mode| self.pending(*mode));
        ProgressCounter::from_artifacts(pending, self.scope.manifest_upload)
    }

    fn apply(&mut self, no: u32, transition: Transition) -> Result<bool> {
        let idx = self.index_of(no)?;
        let manifest_required = self.manifest_required(&self.artifacts[idx]);
        Ok(self.artifacts[idx].status.apply(transition, manifest_required)?)
    }

    /// Marks one of artifact `no`'s files as uploaded.
    pub fn mark(&mut self, no: u32, kind: FileKind) -> Result<bool> {
        let transition = match kind {
            FileKind::Bundle => Transition::MarkBundleUploaded,
            FileKind::Manifest => Transition::MarkManifestUploaded,
        };
        self.apply(no, transition)
    }

    pub fn mark_local_saved(&mut self, no: u32) -> Result<bool> {
        self.apply(no, Transition::MarkLocalSaved)
    }

    pub fn mark_backed_up(&mut self, no: u32) -> Result<bool> {
        self.apply(no, Transition::MarkBackedUp)
    }

    /// Excludes artifact `no` from uploads and downloads.
    pub fn discard(&mut self, no: u32) -> Result<()> {
        let idx = self.index_of(no)?;
        self.artifacts[idx].discarded = true;
        Ok(())
    }

    /// Clears every status flag. Records, hashes and sizes are kept.
    pub fn reset_status(&mut self) -> usize {
        for artifact in &mut self.artifacts {
            artifact.status.reset();
        }
        log::info!("Reset upload status of {} artifacts", self.artifacts.len());
        self.artifacts.len()
    }

    /// Stamps the pending artifacts of `build_mode` with `timestamp`.
    ///
    /// Artifacts whose payload already reached the server keep their
    /// timestamp, so the rest of their files land in the same directory.
    pub fn reset_upload_timestamp(&mut self, build_mode: BuildMode, timestamp: i64) -> usize {
        let pending: BTreeSet<u32> = self
            .pending(build_mode)
            .into_iter()
            .filter(|a| !a.status.bundle_uploaded())
            .map(|a| a.no)
            .collect();
        for artifact in &mut self.artifacts {
            if pending.contains(&artifact.no) {
                artifact.upload_timestamp = timestamp;
            }
        }
        pending.len()
    }

    /// Distinct upload timestamps among the pending artifacts of `build_mode`.
    pub fn pending_timestamps(&self, build_mode: BuildMode) -> BTreeSet<i64> {
        self.pending(build_mode)
            .into_iter()
            .map(|a| a.upload_timestamp)
            .collect()
    }
}

/// Payload hash must match; manifest and engine hashes only when recorded.
fn same_content(stored: &UploadArtifact, fresh: &UploadArtifact) -> bool {
    let optional_eq = |old: &str, new: &str| old.is_empty() || old == new;
    stored.hash == fresh.hash
        && optional_eq(&stored.manifest_hash, &fresh.manifest_hash)
        && optional_eq(&stored.engine_hash, &fresh.engine_hash)
}

/// Current local time as `yyyyMMddHHmm`.
pub fn upload_timestamp_now() -> i64 {
    let now = Local::now();
    i64::from(now.year()) * 100_000_000
        + i64::from(now.month()) * 1_000_000
        + i64::from(now.day()) * 10_000
        + i64::from(now.hour()) * 100
        + i64::from(now.minute())
}

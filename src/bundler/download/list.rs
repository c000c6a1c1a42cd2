//! Persistent list of bundle files a client has to download.

use super::DownloadError;
use crate::bundler::Result;
use crate::bundler::ledger::{FileKind, Ledger, ProgressCounter, UploadArtifact};
use crate::bundler::loader::BundleConf;
use crate::bundler::map::{self, BundleType, DependencyMap, FileType};
use crate::bundler::settings::BuildMode;
use crate::bundler::utils::fs;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// File name of the persisted list inside the bundle cache.
pub const DOWNLOAD_LIST_FILE: &str = "DownloadList.json";

/// One uploaded artifact as seen by the client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadTarget {
    /// Ledger number of the artifact.
    pub no: u32,
    pub id: String,
    pub bundle_type: BundleType,
    pub file_type: FileType,
    /// Server directory relative to the build root.
    pub remote_dir: String,
    #[serde(default)]
    pub data_size: u64,
    #[serde(default)]
    pub manifest_data_size: u64,
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub manifest_hash: String,
    pub upload_timestamp: i64,
    #[serde(default)]
    pub downloaded: bool,
    #[serde(default)]
    pub manifest_downloaded: bool,
}

impl DownloadTarget {
    fn from_artifact(artifact: &UploadArtifact) -> Self {
        Self {
            no: artifact.no,
            id: artifact.id.clone(),
            bundle_type: artifact.bundle_type,
            file_type: artifact.file_type,
            remote_dir: artifact.remote_dir(),
            data_size: artifact.data_size,
            manifest_data_size: artifact.manifest_data_size,
            hash: artifact.hash.clone(),
            manifest_hash: artifact.manifest_hash.clone(),
            upload_timestamp: artifact.upload_timestamp,
            downloaded: false,
            manifest_downloaded: false,
        }
    }

    /// Scene bundles never carry a manifest side-file.
    pub fn manifest_required(&self, manifest_upload: bool) -> bool {
        manifest_upload && self.bundle_type != BundleType::Scene
    }

    pub fn is_complete(&self, manifest_upload: bool) -> bool {
        self.downloaded && (self.manifest_downloaded || !self.manifest_required(manifest_upload))
    }

    pub fn file_name(&self, kind: FileKind, suffix: Option<&str>) -> String {
        map::file_name(&self.id, self.file_type, suffix, kind == FileKind::Manifest)
    }

    /// Recorded `(size, hash)` of one of the target's files.
    pub fn expected(&self, kind: FileKind) -> (u64, &str) {
        match kind {
            FileKind::Bundle => (self.data_size, &self.hash),
            FileKind::Manifest => (self.manifest_data_size, &self.manifest_hash),
        }
    }

    fn is_downloaded(&self, kind: FileKind) -> bool {
        match kind {
            FileKind::Bundle => self.downloaded,
            FileKind::Manifest => self.manifest_downloaded,
        }
    }

    fn same_upload(&self, other: &DownloadTarget) -> bool {
        self.upload_timestamp == other.upload_timestamp
            && self.hash == other.hash
            && self.manifest_hash == other.manifest_hash
    }
}

/// Downloadable targets keyed by ledger number, with their download state.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DownloadList {
    pub manifest_upload: bool,
    pub file_suffix: Option<String>,
    targets: Vec<DownloadTarget>,
}

impl DownloadList {
    pub fn new(manifest_upload: bool, file_suffix: Option<&str>) -> Self {
        Self {
            manifest_upload,
            file_suffix: file_suffix.map(str::to_string),
            targets: Vec::new(),
        }
    }

    /// List of every downloadable artifact of `build_mode`.
    pub fn from_ledger(ledger: &Ledger, build_mode: BuildMode) -> Self {
        let scope = ledger.scope();
        let mut list = Self::new(scope.manifest_upload, scope.file_suffix.as_deref());
        list.merge(ledger, build_mode);
        list
    }

    /// Adds the downloadable artifacts of `build_mode` not yet listed.
    ///
    /// A listed target whose upload changed is replaced and downloads again.
    /// Returns the number of added or replaced targets.
    pub fn merge(&mut self, ledger: &Ledger, build_mode: BuildMode) -> usize {
        let mut changed = 0;
        for artifact in ledger.download_entries(build_mode) {
            if self.add_target(DownloadTarget::from_artifact(artifact)) {
                changed += 1;
            }
        }
        self.targets.sort_by_key(|t| t.no);
        log::debug!("Merged {} download targets ({} listed)", changed, self.targets.len());
        changed
    }

    fn add_target(&mut self, target: DownloadTarget) -> bool {
        match self.targets.iter_mut().find(|t| t.no == target.no) {
            Some(existing) if existing.same_upload(&target) => false,
            Some(existing) => {
                log::info!("Upload of #{} {} changed; downloading again", target.no, target.id);
                *existing = target;
                true
            }
            None => {
                self.targets.push(target);
                true
            }
        }
    }

    pub fn targets(&self) -> &[DownloadTarget] {
        &self.targets
    }

    pub fn get(&self, no: u32) -> Option<&DownloadTarget> {
        self.targets.iter().find(|t| t.no == no)
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn is_complete(&self, target: &DownloadTarget) -> bool {
        target.is_complete(self.manifest_upload)
    }

    /// Targets with files still to download, ordered by number.
    pub fn pending(&self) -> Vec<&DownloadTarget> {
        self.targets.iter().filter(|t| !self.is_complete(t)).collect()
    }

    /// Files of `target` still to download, payload first.
    pub fn pending_files(&self, target: &DownloadTarget) -> Vec<FileKind> {
        let mut kinds = Vec::new();
        if !target.is_downloaded(FileKind::Bundle) {
            kinds.push(FileKind::Bundle);
        }
        if target.manifest_required(self.manifest_upload) && !target.is_downloaded(FileKind::Manifest) {
            kinds.push(FileKind::Manifest);
        }
        kinds
    }

    /// Marks one of target `no`'s files as downloaded. Returns whether it changed.
    pub fn mark(&mut self, no: u32, kind: FileKind) -> std::result::Result<bool, DownloadError> {
        let target = self
            .targets
            .iter_mut()
            .find(|t| t.no == no)
            .ok_or(DownloadError::UnknownTarget { no })?;
        let flag = match kind {
            FileKind::Bundle => &mut target.downloaded,
            FileKind::Manifest => &mut target.manifest_downloaded,
        };
        let changed = !*flag;
        *flag = true;
        Ok(changed)
    }

    /// Clears every download flag.
    pub fn reset(&mut self) {
        for target in &mut self.targets {
            target.downloaded = false;
            target.manifest_downloaded = false;
        }
    }

    /// Newest fully downloaded target of bundle `id`.
    pub fn latest(&self, id: &str) -> Option<&DownloadTarget> {
        self.targets
            .iter()
            .filter(|t| t.id == id && self.is_complete(t))
            .max_by_key(|t| (t.upload_timestamp, t.no))
    }

    /// Version epoch of every fully downloaded bundle.
    pub fn versions(&self) -> BTreeMap<String, i64> {
        let mut versions = BTreeMap::new();
        for target in self.targets.iter().filter(|t| self.is_complete(t)) {
            let version = versions.entry(target.id.clone()).or_insert(target.upload_timestamp);
            *version = (*version).max(target.upload_timestamp);
        }
        versions
    }

    /// Load manager metadata for the bundles of `map`, at their downloaded versions.
    ///
    /// Bundles never downloaded get version 0.
    pub fn bundle_confs(&self, map: &DependencyMap) -> BTreeMap<String, BundleConf> {
        let versions = self.versions();
        map.bundle_confs(|id| versions.get(id).copied().unwrap_or_default())
    }

    /// Cache path: `<bundles_dir>/<Normal|Scenes>/<upload timestamp>/<file>`.
    pub fn local_path(&self, bundles_dir: &Path, target: &DownloadTarget, kind: FileKind) -> PathBuf {
        bundles_dir
            .join(target.bundle_type.dir_name())
            .join(target.upload_timestamp.to_string())
            .join(target.file_name(kind, self.file_suffix.as_deref()))
    }

    /// Server path relative to the build root.
    pub fn remote_path(&self, target: &DownloadTarget, kind: FileKind) -> String {
        format!(
            "{}/{}",
            target.remote_dir,
            target.file_name(kind, self.file_suffix.as_deref())
        )
    }

    /// Totals of the files still to download.
    pub fn progress(&self) -> ProgressCounter {
        let (mut count, mut bytes) = (0, 0);
        for target in self.pending() {
            for kind in self.pending_files(target) {
                count += 1;
                bytes += target.expected(kind).0;
            }
        }
        ProgressCounter::with_totals(count, bytes)
    }

    /// Reads a list written by [`save`](Self::save); `None` if there is none.
    pub async fn load(path: &Path) -> Result<Option<Self>> {
        fs::read_json(path).await
    }

    /// Writes the list as JSON (delete-then-write).
    pub async fn save(&self, path: &Path) -> Result<()> {
        fs::write_json(path, self).await
    }
}

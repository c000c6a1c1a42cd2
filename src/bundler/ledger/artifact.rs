//! One uploaded (or to-be-uploaded) version of a bundle.

use super::UploadStatus;
use crate::bundler::map::{self, BundleType, FileType};
use crate::bundler::settings::BuildMode;
use serde::{Deserialize, Serialize};

/// Which of an artifact's two files an operation refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FileKind {
    /// The bundle payload.
    Bundle,
    /// The `.manifest` side-file.
    Manifest,
}

/// Ledger record of one bundle build.
///
/// Identity is `(id, build_target, build_mode, app_version, market_version)`;
/// `no` is the ledger-wide sequence number.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadArtifact {
    pub no: u32,
    pub id: String,
    pub bundle_type: BundleType,
    pub file_type: FileType,
    pub build_target: String,
    pub build_mode: BuildMode,
    pub market_version: String,
    pub app_version: String,
    #[serde(default)]
    pub data_size: u64,
    #[serde(default)]
    pub manifest_data_size: u64,
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub manifest_hash: String,
    #[serde(default)]
    pub engine_hash: String,
    /// `yyyyMMddHHmm`; doubles as the version epoch clients compare.
    pub upload_timestamp: i64,
    #[serde(default)]
    pub status: UploadStatus,
    #[serde(default)]
    pub discarded: bool,
}

impl UploadArtifact {
    /// True if this artifact shares the identity tuple of the other fields.
    pub fn has_identity(
        &self,
        id: &str,
        build_target: &str,
        build_mode: BuildMode,
        app_version: &str,
        market_version: &str,
    ) -> bool {
        self.id == id
            && self.build_target == build_target
            && self.build_mode == build_mode
            && self.app_version == app_version
            && self.market_version == market_version
    }

    /// Whether this artifact's manifest side-file must be uploaded.
    pub fn manifest_required(&self, manifest_upload: bool) -> bool {
        manifest_upload && self.bundle_type != BundleType::Scene
    }

    pub fn is_all_uploaded(&self, manifest_upload: bool) -> bool {
        self.status.is_all_uploaded(self.manifest_required(manifest_upload))
    }

    /// Local or remote file name of one of this artifact's files.
    pub fn file_name(&self, kind: FileKind, suffix: Option<&str>) -> String {
        map::file_name(&self.id, self.file_type, suffix, kind == FileKind::Manifest)
    }

    /// Remote directory relative to the build root:
    /// `bundles/<target>/<mode>/<Normal|Scenes>/<timestamp>`.
    pub fn remote_dir(&self) -> String {
        format!(
            "bundles/{}/{}/{}/{}",
            self.build_target,
            self.build_mode,
            self.bundle_type.dir_name(),
            self.upload_timestamp
        )
    }
}

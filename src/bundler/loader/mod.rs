//! Client-side bundle loading.
//!
//! The [`LoadManager`] resolves asset names to bundle ids, loads a bundle's
//! dependencies (per the root dependency manifest) before the bundle itself,
//! and caches every opened bundle until disposal.

mod asset_type;
mod backend;
mod lookup;
mod manager;

pub use asset_type::AssetType;
pub use backend::{BundleBackend, FileBackend, LoadedBundle, LoadedBundleHandle};
pub use lookup::AssetLookup;
pub use manager::LoadManager;

use crate::bundler::map::{BundleType, FileType};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// What a client knows about one bundle.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleConf {
    pub bundle_type: BundleType,
    pub file_type: FileType,
    /// Version epoch (upload timestamp).
    pub version: i64,
    /// Target paths packed in the bundle.
    #[serde(default)]
    pub files: Vec<String>,
}

impl BundleConf {
    /// True if `other` describes the same bundle build.
    pub fn matches(&self, other: &BundleConf) -> bool {
        self.bundle_type == other.bundle_type && self.file_type == other.file_type && self.version == other.version
    }
}

/// Bundle loading failures.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The dependency manifest loops back to a bundle being resolved.
    #[error("dependency cycle while loading {id}: {}", chain.join(" -> "))]
    DependencyCycle { id: String, chain: Vec<String> },

    /// No registered bundle packs this asset.
    #[error("no bundle contains {asset_type:?} asset {name}")]
    UnknownAsset { name: String, asset_type: AssetType },

    /// The bundle id was never registered.
    #[error("bundle {id} is not registered")]
    UnknownBundle { id: String },

    /// The root dependency manifest could not be loaded.
    #[error("root manifest unavailable: {detail}")]
    ManifestUnavailable { detail: String },

    /// The backend failed to open a bundle file.
    #[error("failed to open bundle {id} ({}): {detail}", path.display())]
    Backend { id: String, path: PathBuf, detail: String },
}

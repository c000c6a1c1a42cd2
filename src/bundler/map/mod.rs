//! Dependency map: every bundle produced by a build pass.
//!
//! The map is the build-time source of truth for bundle ids, their types and
//! the files they pack. It is exported as JSON for the ledger and for clients.

mod descriptor;
mod id;

pub use descriptor::{BundleDescriptor, BundleType, FileType, path_key};
pub use id::bundle_id;

use crate::bundler::Result;
use crate::bundler::loader::BundleConf;
use crate::bundler::utils::fs;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// File name of the root manifest bundle: the directory name of the Normal
/// output. It never carries the file suffix.
pub const MAIN_MANIFEST_NAME: &str = "Normal";

/// Aggregate of all bundle descriptors, keyed by id.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyMap {
    #[serde(default)]
    file_suffix: Option<String>,
    #[serde(default)]
    bundles: BTreeMap<String, BundleDescriptor>,
}

impl DependencyMap {
    /// Creates an empty map. `file_suffix` is appended to bundle file names.
    pub fn new(file_suffix: Option<&str>) -> Self {
        Self {
            file_suffix: file_suffix.filter(|s| !s.is_empty()).map(str::to_string),
            bundles: BTreeMap::new(),
        }
    }

    /// Inserts a descriptor, replacing any existing one with the same id.
    ///
    /// Targets are replaced wholesale: the build is the source of truth.
    pub fn add_or_replace(&mut self, descriptor: BundleDescriptor) {
        if let Some(old) = self.bundles.get(&descriptor.id) {
            if old.target_count() != descriptor.target_count() {
                log::debug!(
                    "Bundle {} targets changed: {} -> {}",
                    descriptor.id,
                    old.target_count(),
                    descriptor.target_count()
                );
            }
        }
        self.bundles.insert(descriptor.id.clone(), descriptor);
    }

    pub fn get(&self, id: &str) -> Option<&BundleDescriptor> {
        self.bundles.get(id)
    }

    pub fn remove(&mut self, id: &str) -> Option<BundleDescriptor> {
        self.bundles.remove(id)
    }

    /// Drops `path` from bundle `id`'s targets, if both exist.
    pub fn remove_target(&mut self, id: &str, path: &str) -> bool {
        self.bundles
            .get_mut(id)
            .is_some_and(|bundle| bundle.remove_target(path))
    }

    /// Reverse lookup: the id of the bundle packing `path`.
    pub fn bundle_of_target(&self, path: &str) -> Option<&str> {
        self.bundles
            .values()
            .find(|b| b.contains(path))
            .map(|b| b.id.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &BundleDescriptor> {
        self.bundles.values()
    }

    /// Normal bundles, ordered by id.
    pub fn normal(&self) -> impl Iterator<Item = &BundleDescriptor> {
        self.iter().filter(|b| b.bundle_type == BundleType::Normal)
    }

    /// Scene bundles, ordered by id.
    pub fn scenes(&self) -> impl Iterator<Item = &BundleDescriptor> {
        self.iter().filter(|b| b.bundle_type == BundleType::Scene)
    }

    pub fn len(&self) -> usize {
        self.bundles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }

    pub fn clear(&mut self) {
        self.bundles.clear();
    }

    pub fn file_suffix(&self) -> Option<&str> {
        self.file_suffix.as_deref()
    }

    /// On-disk file name of a bundle: `id.suffix`, or `id` without a suffix.
    pub fn full_name(&self, id: &str) -> String {
        file_name(id, FileType::Bundle, self.file_suffix(), false)
    }

    /// On-disk file name of a bundle's manifest side-file.
    pub fn manifest_name(&self, id: &str) -> String {
        file_name(id, FileType::Bundle, self.file_suffix(), true)
    }

    /// Name of the root manifest bundle. No suffix is applied to it.
    pub fn main_manifest_name(&self) -> &'static str {
        MAIN_MANIFEST_NAME
    }

    /// Builds the per-bundle table clients feed into the load manager.
    ///
    /// `version_of` supplies each bundle's version epoch.
    pub fn bundle_confs(&self, version_of: impl Fn(&str) -> i64) -> BTreeMap<String, BundleConf> {
        self.iter()
            .map(|b| {
                let conf = BundleConf {
                    bundle_type: b.bundle_type,
                    file_type: FileType::Bundle,
                    version: version_of(&b.id),
                    files: b.targets().map(str::to_string).collect(),
                };
                (b.id.clone(), conf)
            })
            .collect()
    }

    /// Writes the map as JSON (delete-then-write).
    pub async fn export(&self, path: &Path) -> Result<()> {
        log::info!("Exporting dependency map ({} bundles) to {}", self.len(), path.display());
        fs::write_json(path, self).await
    }

    /// Reads a map previously written by [`export`](Self::export).
    ///
    /// Returns `None` if the file does not exist.
    pub async fn import(path: &Path) -> Result<Option<Self>> {
        fs::read_json(path).await
    }
}

/// File name of an id for a given file type.
///
/// The main manifest never carries the suffix; manifest side-files append
/// `.manifest` to the bundle's file name.
pub fn file_name(id: &str, file_type: FileType, suffix: Option<&str>, manifest: bool) -> String {
    let mut name = id.to_string();
    if file_type != FileType::MainManifest {
        if let Some(suffix) = suffix.filter(|s| !s.is_empty()) {
            name = format!("{name}.{suffix}");
        }
    }
    if manifest {
        name.push_str(".manifest");
    }
    name
}

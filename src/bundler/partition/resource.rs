//! Resource declarations consumed by the partitioner.

use crate::bundler::Result;
use crate::bundler::map::path_key;
use crate::bundler::utils::fs;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

/// Editor metadata suffix stripped before ignore-list matching.
pub const META_SUFFIX: &str = ".meta";
/// OS metadata file name never packed into a bundle.
pub const DS_STORE: &str = ".DS_Store";

/// How a resource path is split into bundles.
///
/// Serialized as its numeric code (`1..=4`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum BundleMode {
    /// Everything under the path becomes one bundle.
    OneDir,
    /// Every file becomes its own bundle.
    FileOneToOne,
    /// Every immediate subdirectory becomes one bundle.
    TopDirOneToOne,
    /// Every scene file becomes its own scene bundle.
    SceneOneToOne,
}

impl TryFrom<u8> for BundleMode {
    type Error = String;

    fn try_from(code: u8) -> std::result::Result<Self, Self::Error> {
        match code {
            1 => Ok(BundleMode::OneDir),
            2 => Ok(BundleMode::FileOneToOne),
            3 => Ok(BundleMode::TopDirOneToOne),
            4 => Ok(BundleMode::SceneOneToOne),
            other => Err(format!("unknown bundle mode {other}")),
        }
    }
}

impl From<BundleMode> for u8 {
    fn from(mode: BundleMode) -> u8 {
        match mode {
            BundleMode::OneDir => 1,
            BundleMode::FileOneToOne => 2,
            BundleMode::TopDirOneToOne => 3,
            BundleMode::SceneOneToOne => 4,
        }
    }
}

/// Returns true for files that never belong in a bundle.
pub fn is_metadata_file(path: &str) -> bool {
    path.ends_with(DS_STORE) || path.ends_with(META_SUFFIX)
}

/// One configured source path and how to partition it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleResource {
    pub path: String,
    pub mode: BundleMode,
    #[serde(default)]
    pub ignore_list: BTreeSet<String>,
}

impl BundleResource {
    pub fn new(path: impl Into<String>, mode: BundleMode) -> Self {
        Self {
            path: path.into(),
            mode,
            ignore_list: BTreeSet::new(),
        }
    }

    /// Exact-match ignore check after stripping the `.meta` suffix.
    pub fn is_ignored(&self, target: &str) -> bool {
        let target = target.strip_suffix(META_SUFFIX).unwrap_or(target);
        self.ignore_list.contains(target)
    }

    /// Adds an ignore entry.
    ///
    /// A directory contributes its immediate files (metadata excluded) rather
    /// than itself.
    pub async fn add_ignore_target(&mut self, target: &str) -> Result<()> {
        for file in expand_target(target).await? {
            self.ignore_list.insert(file);
        }
        Ok(())
    }

    /// Removes an ignore entry, expanding directories like
    /// [`add_ignore_target`](Self::add_ignore_target).
    pub async fn remove_ignore_target(&mut self, target: &str) -> Result<()> {
        for file in expand_target(target).await? {
            self.ignore_list.remove(&file);
        }
        Ok(())
    }

    /// How well `target` belongs to this resource, in `0.0..=1.0`.
    pub fn match_score(&self, target: &str) -> f32 {
        if target.is_empty() {
            return 0.0;
        }
        match self.mode {
            BundleMode::OneDir | BundleMode::TopDirOneToOne => {
                let own: Vec<&str> = self.path.split('/').filter(|s| !s.is_empty()).collect();
                let theirs: Vec<&str> = target.split('/').filter(|s| !s.is_empty()).collect();
                if theirs.is_empty() {
                    return 0.0;
                }
                let matched = theirs
                    .iter()
                    .zip(own.iter())
                    .filter(|(a, b)| a == b)
                    .count();
                matched as f32 / theirs.len() as f32
            }
            BundleMode::FileOneToOne | BundleMode::SceneOneToOne => {
                if target == self.path { 1.0 } else { 0.0 }
            }
        }
    }
}

async fn expand_target(target: &str) -> Result<Vec<String>> {
    let path = Path::new(target);
    if tokio::fs::metadata(path).await.is_ok_and(|m| m.is_dir()) {
        let mut files = Vec::new();
        let mut entries = tokio::fs::read_dir(path).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let key = path_key(&entry.path());
            if !is_metadata_file(&key) {
                files.push(key);
            }
        }
        files.sort();
        Ok(files)
    } else {
        Ok(vec![target.to_string()])
    }
}

/// Full partitioner configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceConfig {
    #[serde(default)]
    pub resources: Vec<BundleResource>,
    /// Paths excluded from every resource.
    #[serde(default)]
    pub unresources: Vec<String>,
}

impl ResourceConfig {
    /// Adds a resource, or updates the mode of an existing one with the same path.
    pub fn add_resource(&mut self, path: impl Into<String>, mode: BundleMode) -> &mut BundleResource {
        let path = path.into();
        match self.resources.iter().position(|r| r.path == path) {
            Some(idx) => {
                self.resources[idx].mode = mode;
                &mut self.resources[idx]
            }
            None => {
                self.resources.push(BundleResource::new(path, mode));
                let last = self.resources.len() - 1;
                &mut self.resources[last]
            }
        }
    }

    pub fn remove_resource(&mut self, path: &str) -> Option<BundleResource> {
        let idx = self.resources.iter().position(|r| r.path == path)?;
        Some(self.resources.remove(idx))
    }

    /// Best-matching resource for `target` (highest positive score, first wins ties).
    pub fn match_resource(&self, target: &str) -> Option<&BundleResource> {
        self.best_match(target).map(|idx| &self.resources[idx])
    }

    fn best_match(&self, target: &str) -> Option<usize> {
        let mut best: Option<(usize, f32)> = None;
        for (idx, resource) in self.resources.iter().enumerate() {
            let score = resource.match_score(target);
            if score > 0.0 && best.is_none_or(|(_, s)| score > s) {
                best = Some((idx, score));
            }
        }
        best.map(|(idx, _)| idx)
    }

    /// Adds `target` to the ignore list of its best-matching resource.
    ///
    /// Returns the matched resource path, or `None` (logged) if nothing matches.
    pub async fn add_ignore_target(&mut self, target: &str) -> Result<Option<String>> {
        let Some(idx) = self.best_match(target) else {
            log::error!("No resource matches ignore target {}", target);
            return Ok(None);
        };
        let resource = &mut self.resources[idx];
        resource.add_ignore_target(target).await?;
        Ok(Some(resource.path.clone()))
    }

    /// Removes `target` from the ignore list of its best-matching resource.
    pub async fn remove_ignore_target(&mut self, target: &str) -> Result<Option<String>> {
        let Some(idx) = self.best_match(target) else {
            log::warn!("No resource matches ignore target {}", target);
            return Ok(None);
        };
        let resource = &mut self.resources[idx];
        resource.remove_ignore_target(target).await?;
        Ok(Some(resource.path.clone()))
    }

    /// True if `path` lies under one of the excluded paths.
    pub fn is_unresource(&self, path: &str) -> bool {
        self.unresources.iter().any(|u| {
            path == u || path.strip_prefix(u.as_str()).is_some_and(|rest| rest.starts_with('/'))
        })
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        fs::write_json(path, self).await
    }

    pub async fn load(path: &Path) -> Result<Option<Self>> {
        fs::read_json(path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ignore_strips_meta_suffix() {
        let mut res = BundleResource::new("Assets/UI", BundleMode::OneDir);
        res.ignore_list.insert("Assets/UI/debug.png".into());
        assert!(res.is_ignored("Assets/UI/debug.png"));
        assert!(res.is_ignored("Assets/UI/debug.png.meta"));
        assert!(!res.is_ignored("Assets/UI/debug"));
    }

    #[test]
    fn mode_serializes_as_code() {
        let json = serde_json::to_string(&BundleMode::TopDirOneToOne).unwrap();
        assert_eq!(json, "3");
        let back: BundleMode = serde_json::from_str("4").unwrap();
        assert_eq!(back, BundleMode::SceneOneToOne);
        assert!(serde_json::from_str::<BundleMode>("9").is_err());
    }

    #[test]
    fn match_prefers_deeper_directory() {
        let mut config = ResourceConfig::default();
        config.add_resource("Assets/Res", BundleMode::OneDir);
        config.add_resource("Assets/Res/Sprites", BundleMode::TopDirOneToOne);
        config.add_resource("Assets/Res/Sprites/hero.png", BundleMode::FileOneToOne);

        let matched = config.match_resource("Assets/Res/Sprites/ui").unwrap();
        assert_eq!(matched.path, "Assets/Res/Sprites");

        let exact = config.match_resource("Assets/Res/Sprites/hero.png").unwrap();
        assert_eq!(exact.mode, BundleMode::FileOneToOne);

        assert!(config.match_resource("Other/place").is_none());
    }

    #[test]
    fn add_resource_dedupes_by_path() {
        let mut config = ResourceConfig::default();
        config.add_resource("Assets/Audio", BundleMode::OneDir);
        config.add_resource("Assets/Audio", BundleMode::FileOneToOne);
        assert_eq!(config.resources.len(), 1);
        assert_eq!(config.resources[0].mode, BundleMode::FileOneToOne);

        let removed = config.remove_resource("Assets/Audio").unwrap();
        assert_eq!(removed.path, "Assets/Audio");
        assert!(config.resources.is_empty());
        assert!(config.remove_resource("Assets/Audio").is_none());
    }

    #[test]
    fn unresource_matches_whole_segments() {
        let config = ResourceConfig {
            resources: vec![],
            unresources: vec!["Assets/Editor".into()],
        };
        assert!(config.is_unresource("Assets/Editor/tool.png"));
        assert!(!config.is_unresource("Assets/EditorExtras/tool.png"));
    }
}

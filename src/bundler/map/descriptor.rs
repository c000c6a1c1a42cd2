//! Bundle descriptor records.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

/// Kind of bundle. Scene bundles are loaded differently and never carry a
/// manifest side-file upload.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BundleType {
    #[default]
    Normal,
    Scene,
}

impl BundleType {
    /// Output/remote directory name for this type.
    pub fn dir_name(&self) -> &'static str {
        match self {
            BundleType::Normal => "Normal",
            BundleType::Scene => "Scenes",
        }
    }
}

/// Kind of file tracked for a bundle id.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileType {
    /// The root manifest bundle describing every other bundle's dependencies.
    MainManifest,
    #[default]
    Bundle,
}

/// One bundle: its id, type, the source it was partitioned from and the
/// files it packs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleDescriptor {
    pub id: String,
    pub bundle_type: BundleType,
    pub source_path: String,
    #[serde(default)]
    targets: BTreeSet<String>,
}

impl BundleDescriptor {
    pub fn new(id: impl Into<String>, bundle_type: BundleType, source_path: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            bundle_type,
            source_path: source_path.into(),
            targets: BTreeSet::new(),
        }
    }

    /// Adds a target file. Returns `false` if it was already present.
    pub fn add_target(&mut self, path: impl Into<String>) -> bool {
        self.targets.insert(path.into())
    }

    /// Removes a target file. Returns `true` if it was present.
    pub fn remove_target(&mut self, path: &str) -> bool {
        self.targets.remove(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.targets.contains(path)
    }

    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.targets.iter().map(String::as_str)
    }

    pub fn target_count(&self) -> usize {
        self.targets.len()
    }
}

/// Forward-slash string form of a path, as stored in descriptors.
pub fn path_key(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn targets_are_unique() {
        let mut d = BundleDescriptor::new("ui", BundleType::Normal, "Assets/UI");
        assert!(d.add_target("Assets/UI/a.png"));
        assert!(!d.add_target("Assets/UI/a.png"));
        assert_eq!(d.target_count(), 1);
        assert!(d.remove_target("Assets/UI/a.png"));
        assert_eq!(d.target_count(), 0);
    }
}

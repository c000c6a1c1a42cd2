//! Asset name to bundle id tables.

use super::{AssetType, BundleConf};
use std::collections::{BTreeMap, HashMap};

/// Per-type lookup tables plus a suffix index for partial names.
///
/// Primary tables map a target's full path to its bundle id; later
/// registrations overwrite earlier ones. The suffix index maps every
/// `/`-bounded tail of every target path to its bundle id, keeping the first
/// registration, so a partial name usually resolves with one hash lookup.
/// Names that end mid-segment fall back to a scan in registration order.
#[derive(Clone, Debug, Default)]
pub struct AssetLookup {
    by_type: HashMap<AssetType, HashMap<String, String>>,
    all: HashMap<String, String>,
    suffix_index: HashMap<String, String>,
    targets: Vec<(String, String)>,
}

impl AssetLookup {
    /// Builds the tables from registered bundle confs, in id order.
    pub fn build(confs: &BTreeMap<String, BundleConf>) -> Self {
        let mut lookup = AssetLookup::default();
        for (id, conf) in confs {
            for file in &conf.files {
                lookup.insert(file, id);
            }
        }
        lookup
    }

    fn insert(&mut self, path: &str, id: &str) {
        let asset_type = AssetType::from_path(path);
        if asset_type != AssetType::None {
            self.by_type
                .entry(asset_type)
                .or_default()
                .insert(path.to_string(), id.to_string());
        }
        self.all.insert(path.to_string(), id.to_string());
        self.targets.push((path.to_string(), id.to_string()));

        let mut tail = path;
        loop {
            self.suffix_index
                .entry(tail.to_string())
                .or_insert_with(|| id.to_string());
            match tail.split_once('/') {
                Some((_, rest)) if !rest.is_empty() => tail = rest,
                _ => break,
            }
        }
    }

    /// Bundle id holding `name` of `asset_type`.
    ///
    /// Tries the exact path first, then `name` plus each suffix of the type
    /// as the tail of a target path. `AssetType::None` only matches exact paths.
    pub fn resolve(&self, name: &str, asset_type: AssetType) -> Option<&str> {
        if name.is_empty() {
            return None;
        }
        if asset_type == AssetType::None {
            return self.all.get(name).map(String::as_str);
        }
        if let Some(id) = self.by_type.get(&asset_type).and_then(|t| t.get(name)) {
            return Some(id.as_str());
        }
        let candidates: Vec<String> = asset_type.suffixes().iter().map(|suffix| format!("{name}{suffix}")).collect();
        if let Some(id) = candidates.iter().find_map(|c| self.suffix_index.get(c)) {
            return Some(id.as_str());
        }
        self.targets
            .iter()
            .find(|(path, _)| candidates.iter().any(|c| path.ends_with(c.as_str())))
            .map(|(_, id)| id.as_str())
    }

    /// Number of registered target paths.
    pub fn len(&self) -> usize {
        self.all.len()
    }

    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }

    pub fn clear(&mut self) {
        self.by_type.clear();
        self.all.clear();
        self.suffix_index.clear();
        self.targets.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::map::{BundleType, FileType};

    fn conf(files: &[&str]) -> BundleConf {
        BundleConf {
            bundle_type: BundleType::Normal,
            file_type: FileType::Bundle,
            version: 1,
            files: files.iter().map(|f| f.to_string()).collect(),
        }
    }

    #[test]
    fn exact_then_suffix_fallback() {
        let confs = BTreeMap::from([
            ("ui".to_string(), conf(&["Assets/Res/UI/hero.png", "Assets/Res/UI/Main.prefab"])),
            ("audio".to_string(), conf(&["Assets/Res/Audio/click.mp3"])),
        ]);
        let lookup = AssetLookup::build(&confs);

        assert_eq!(lookup.resolve("Assets/Res/UI/hero.png", AssetType::Texture), Some("ui"));
        assert_eq!(lookup.resolve("UI/hero", AssetType::Texture), Some("ui"));
        assert_eq!(lookup.resolve("click", AssetType::Audio), Some("audio"));
        assert_eq!(lookup.resolve("Main", AssetType::Prefab), Some("ui"));
        assert_eq!(lookup.resolve("hero", AssetType::None), None);
        assert_eq!(lookup.resolve("villain", AssetType::Texture), None);
    }

    #[test]
    fn names_ending_mid_segment_are_scanned() {
        let confs = BTreeMap::from([
            ("heroes".to_string(), conf(&["Assets/UI/big_hero.prefab"])),
            ("ui".to_string(), conf(&["Assets/Res/UI/hero.png"])),
        ]);
        let lookup = AssetLookup::build(&confs);

        assert_eq!(lookup.resolve("hero", AssetType::Prefab), Some("heroes"));
        assert_eq!(lookup.resolve("ero", AssetType::Texture), Some("ui"));
        assert_eq!(lookup.resolve("hero", AssetType::Audio), None);
    }

    #[test]
    fn first_registration_wins_in_suffix_index() {
        let confs = BTreeMap::from([
            ("a".to_string(), conf(&["A/shared/icon.png"])),
            ("b".to_string(), conf(&["B/shared/icon.png"])),
        ]);
        let lookup = AssetLookup::build(&confs);
        assert_eq!(lookup.resolve("shared/icon", AssetType::Texture), Some("a"));
        assert_eq!(lookup.resolve("B/shared/icon.png", AssetType::Texture), Some("b"));
    }
}

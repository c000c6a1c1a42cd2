//! Remote directory provisioning.

use super::{RemoteStore, UploadError};
use crate::bundler::settings::BuildMode;
use crate::bundler::map::BundleType;
use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

/// Directories already known to exist, per server id.
///
/// Append-only for the life of the process.
#[derive(Debug, Default)]
pub struct ServerDirectoryCache {
    dirs: Mutex<HashMap<String, BTreeSet<String>>>,
}

impl ServerDirectoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, server_id: &str, dir: &str) -> bool {
        let dirs = self.dirs.lock().unwrap_or_else(|e| e.into_inner());
        dirs.get(server_id).is_some_and(|set| set.contains(dir))
    }

    /// Records `dir` as existing. Returns `false` if it was already cached.
    pub fn insert(&self, server_id: &str, dir: &str) -> bool {
        let mut dirs = self.dirs.lock().unwrap_or_else(|e| e.into_inner());
        dirs.entry(server_id.to_string())
            .or_default()
            .insert(dir.to_string())
    }

    pub fn len(&self, server_id: &str) -> usize {
        let dirs = self.dirs.lock().unwrap_or_else(|e| e.into_inner());
        dirs.get(server_id).map_or(0, BTreeSet::len)
    }
}

/// Ordered directories a session needs, parents first.
///
/// `timestamps` lists, per build mode, the upload timestamps of its pending
/// artifacts.
pub fn provision_segments(build_name: &str, build_target: &str, timestamps: &[(BuildMode, BTreeSet<i64>)]) -> Vec<String> {
    let mut segments = Vec::new();
    let mut prefix = String::new();
    let root_parts = build_name.split('/').filter(|s| !s.is_empty());
    for part in root_parts.chain(["bundles", build_target]) {
        if !prefix.is_empty() {
            prefix.push('/');
        }
        prefix.push_str(part);
        segments.push(prefix.clone());
    }

    for (mode, stamps) in timestamps {
        let mode_dir = format!("{prefix}/{mode}");
        segments.push(mode_dir.clone());
        for bundle_type in [BundleType::Normal, BundleType::Scene] {
            let type_dir = format!("{mode_dir}/{}", bundle_type.dir_name());
            segments.push(type_dir.clone());
            for ts in stamps {
                segments.push(format!("{type_dir}/{ts}"));
            }
        }
    }
    segments
}

/// Ensures `dir` exists on `store`: cache, then parent listing, then create.
pub async fn provision_dir<S: RemoteStore>(
    store: &S,
    cache: &ServerDirectoryCache,
    dir: &str,
) -> Result<(), UploadError> {
    if cache.contains(store.id(), dir) {
        return Ok(());
    }
    let (parent, name) = dir.rsplit_once('/').unwrap_or(("", dir));
    let failed = |detail: String| UploadError::Provisioning {
        path: dir.to_string(),
        detail,
    };

    let entries = store
        .list_dir(parent)
        .await
        .map_err(|e| failed(format!("listing {parent:?}: {e}")))?;
    if entries.iter().any(|e| e == name) {
        log::debug!("Remote directory {} exists", dir);
    } else {
        log::info!("Creating remote directory {}", dir);
        store
            .create_dir(dir)
            .await
            .map_err(|e| failed(e.to_string()))?;
    }
    cache.insert(store.id(), dir);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segments_are_parents_first() {
        let stamps = BTreeSet::from([202401010000]);
        let segments = provision_segments("game/cn", "Android", &[(BuildMode::Debug, stamps)]);
        assert_eq!(
            segments,
            vec![
                "game",
                "game/cn",
                "game/cn/bundles",
                "game/cn/bundles/Android",
                "game/cn/bundles/Android/Debug",
                "game/cn/bundles/Android/Debug/Normal",
                "game/cn/bundles/Android/Debug/Normal/202401010000",
                "game/cn/bundles/Android/Debug/Scenes",
                "game/cn/bundles/Android/Debug/Scenes/202401010000",
            ]
        );
    }

    #[test]
    fn cache_is_per_server() {
        let cache = ServerDirectoryCache::new();
        assert!(cache.insert("a", "game"));
        assert!(!cache.insert("a", "game"));
        assert!(cache.contains("a", "game"));
        assert!(!cache.contains("b", "game"));
        assert_eq!(cache.len("a"), 1);
    }
}

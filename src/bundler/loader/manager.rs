//! Dependency-aware bundle loading and caching.

use super::{AssetLookup, AssetType, BundleBackend, BundleConf, LoadError, LoadedBundle, LoadedBundleHandle};
use crate::bundler::manifest::DependencyManifest;
use crate::bundler::map::{self, BundleType, FileType, MAIN_MANIFEST_NAME};
use crate::bundler::settings::Settings;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

struct RootManifest {
    epoch: i64,
    bundle: LoadedBundle,
    manifest: DependencyManifest,
}

/// A bundle being resolved at its own epoch, with the dependencies still to visit.
struct Frame {
    id: String,
    epoch: i64,
    dependencies: Vec<String>,
    next: usize,
}

enum Step {
    /// Resolve a bundle under the manifest of its own epoch.
    Enter(String),
    /// Open a bundle whose dependencies are in place.
    Open(String),
}

/// Loads bundles and their dependencies, caching each bundle once.
///
/// Bundles live at `<bundles_dir>/<Normal|Scenes>/<version>/<file>`. Each
/// bundle is resolved under the root manifest of its own version epoch; the
/// root manifest is reloaded only when the epoch being resolved changes.
/// Single owner: every operation takes `&mut self`.
pub struct LoadManager<B> {
    backend: B,
    bundles_dir: PathBuf,
    file_suffix: Option<String>,
    confs: BTreeMap<String, BundleConf>,
    lookup: AssetLookup,
    loaded: HashMap<String, LoadedBundleHandle>,
    root: Option<RootManifest>,
}

impl<B: BundleBackend> LoadManager<B> {
    pub fn new(backend: B, bundles_dir: impl Into<PathBuf>, file_suffix: Option<&str>) -> Self {
        Self {
            backend,
            bundles_dir: bundles_dir.into(),
            file_suffix: file_suffix.filter(|s| !s.is_empty()).map(str::to_string),
            confs: BTreeMap::new(),
            lookup: AssetLookup::default(),
            loaded: HashMap::new(),
            root: None,
        }
    }

    /// Uses the configured client bundle cache and file suffix.
    pub fn from_settings(settings: &Settings, backend: B) -> Self {
        Self::new(backend, settings.bundles_dir(), settings.file_suffix())
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Registers bundle metadata, replacing any earlier registration.
    ///
    /// File lists are ignored; they arrive through [`push_bundles`](Self::push_bundles).
    pub fn push_resources(&mut self, resources: BTreeMap<String, BundleConf>) {
        self.confs = resources
            .into_iter()
            .map(|(id, conf)| {
                let conf = BundleConf {
                    files: Vec::new(),
                    ..conf
                };
                (id, conf)
            })
            .collect();
        self.lookup = AssetLookup::build(&self.confs);
    }

    /// Registers the file lists of bundles and rebuilds the lookup tables.
    ///
    /// A bundle already registered with a different type, file type or
    /// version is rejected with an error log. Returns the number accepted.
    pub fn push_bundles(&mut self, bundles: BTreeMap<String, BundleConf>) -> usize {
        let mut accepted = 0;
        for (id, conf) in bundles {
            match self.confs.get_mut(&id) {
                Some(existing) if existing.matches(&conf) => {
                    existing.files = conf.files;
                    accepted += 1;
                }
                Some(_) => {
                    log::error!("Bundle info for {} does not match the registered resource; rejected", id);
                }
                None => {
                    self.confs.insert(id, conf);
                    accepted += 1;
                }
            }
        }
        if self.confs.is_empty() {
            log::error!("No bundle info registered");
        }
        self.lookup = AssetLookup::build(&self.confs);
        accepted
    }

    pub fn conf(&self, id: &str) -> Option<&BundleConf> {
        self.confs.get(id)
    }

    /// Version epoch a registered bundle is loaded at.
    pub fn version_of(&self, id: &str) -> Result<i64, LoadError> {
        self.confs
            .get(id)
            .map(|c| c.version)
            .ok_or_else(|| LoadError::UnknownBundle { id: id.to_string() })
    }

    /// Bundle id packing asset `name` of `asset_type`.
    pub fn resolve(&self, name: &str, asset_type: AssetType) -> Option<&str> {
        self.lookup.resolve(name, asset_type)
    }

    /// On-disk file name of a registered bundle.
    pub fn file_name(&self, id: &str) -> Result<String, LoadError> {
        let conf = self.confs.get(id).ok_or_else(|| LoadError::UnknownBundle { id: id.to_string() })?;
        Ok(map::file_name(id, conf.file_type, self.file_suffix.as_deref(), false))
    }

    /// Local path of a registered bundle:
    /// `<bundles_dir>/<Normal|Scenes>/<version>/<file>`.
    pub fn bundle_path(&self, id: &str) -> Result<PathBuf, LoadError> {
        let conf = self.confs.get(id).ok_or_else(|| LoadError::UnknownBundle { id: id.to_string() })?;
        Ok(self
            .bundles_dir
            .join(conf.bundle_type.dir_name())
            .join(conf.version.to_string())
            .join(self.file_name(id)?))
    }

    /// Local path of the root manifest of `epoch`.
    pub fn root_path(&self, epoch: i64) -> PathBuf {
        self.bundles_dir
            .join(BundleType::Normal.dir_name())
            .join(epoch.to_string())
            .join(map::file_name(MAIN_MANIFEST_NAME, FileType::MainManifest, None, false))
    }

    /// Version of the root manifest currently held, if any.
    pub fn manifest_epoch(&self) -> Option<i64> {
        self.root.as_ref().map(|r| r.epoch)
    }

    pub fn is_loaded(&self, id: &str) -> bool {
        self.loaded.contains_key(id)
    }

    pub fn loaded_count(&self) -> usize {
        self.loaded.len()
    }

    fn release_root(&mut self) {
        if let Some(old) = self.root.take() {
            log::debug!("Unloading root manifest (epoch {})", old.epoch);
            self.backend.release(&old.bundle);
        }
    }

    /// Parses and installs the root manifest of `epoch`, rejecting cyclic ones.
    fn install_root(&mut self, epoch: i64, bundle: LoadedBundle) -> Result<(), LoadError> {
        let manifest = match DependencyManifest::from_slice(&bundle.data) {
            Ok(manifest) => manifest,
            Err(e) => {
                self.backend.release(&bundle);
                return Err(LoadError::ManifestUnavailable {
                    detail: format!("{}: {e}", bundle.path.display()),
                });
            }
        };
        if let Some(cycle) = manifest.find_cycle() {
            self.backend.release(&bundle);
            let chain: Vec<String> = cycle.iter().map(|f| self.dependency_id(f).to_string()).collect();
            log::error!("Root manifest epoch {} has a dependency cycle: {}", epoch, chain.join(" -> "));
            return Err(LoadError::DependencyCycle {
                id: chain.first().cloned().unwrap_or_default(),
                chain,
            });
        }
        log::info!("Loaded root manifest epoch {} ({} entries)", epoch, manifest.len());
        self.root = Some(RootManifest {
            epoch,
            bundle,
            manifest,
        });
        Ok(())
    }

    fn manifest_error(e: LoadError) -> LoadError {
        match e {
            LoadError::Backend { path, detail, .. } => LoadError::ManifestUnavailable {
                detail: format!("{}: {detail}", path.display()),
            },
            other => other,
        }
    }

    fn ensure_manifest(&mut self, epoch: i64) -> Result<(), LoadError> {
        if self.manifest_epoch() == Some(epoch) {
            return Ok(());
        }
        self.release_root();
        let path = self.root_path(epoch);
        let bundle = self
            .backend
            .open(MAIN_MANIFEST_NAME, &path)
            .map_err(Self::manifest_error)?;
        self.install_root(epoch, bundle)
    }

    async fn ensure_manifest_async(&mut self, epoch: i64) -> Result<(), LoadError> {
        if self.manifest_epoch() == Some(epoch) {
            return Ok(());
        }
        self.release_root();
        let path = self.root_path(epoch);
        let bundle = self
            .backend
            .open_async(MAIN_MANIFEST_NAME, &path)
            .await
            .map_err(Self::manifest_error)?;
        self.install_root(epoch, bundle)
    }

    /// Bundle id of a manifest dependency entry: its file name minus the suffix.
    fn dependency_id<'a>(&self, file_name: &'a str) -> &'a str {
        match &self.file_suffix {
            Some(suffix) => file_name
                .strip_suffix(suffix.as_str())
                .and_then(|rest| rest.strip_suffix('.'))
                .unwrap_or(file_name),
            None => file_name,
        }
    }

    /// Epoch to resolve `id` at, or `None` if it is already cached.
    fn begin(&self, id: &str, stack: &[Frame]) -> Result<Option<i64>, LoadError> {
        if stack.iter().any(|f| f.id == id) {
            let mut chain: Vec<String> = stack.iter().map(|f| f.id.clone()).collect();
            chain.push(id.to_string());
            log::error!("Dependency cycle: {}", chain.join(" -> "));
            return Err(LoadError::DependencyCycle {
                id: id.to_string(),
                chain,
            });
        }
        if self.loaded.contains_key(id) {
            return Ok(None);
        }
        self.version_of(id).map(Some)
    }

    /// Pushes `id` with its transitive dependencies from the installed manifest.
    fn push_frame(&self, id: String, epoch: i64, stack: &mut Vec<Frame>) -> Result<(), LoadError> {
        let root = self.root.as_ref().ok_or_else(|| LoadError::ManifestUnavailable {
            detail: "root manifest not loaded".into(),
        })?;
        let file_name = self.file_name(&id)?;
        let dependencies = root
            .manifest
            .all_dependencies(&file_name)
            .iter()
            .map(|d| self.dependency_id(d).to_string())
            .collect();
        stack.push(Frame {
            id,
            epoch,
            dependencies,
            next: 0,
        });
        Ok(())
    }

    /// Next step of the resolution, or `None` once the stack is drained.
    ///
    /// A dependency registered at another epoch is entered under its own
    /// manifest; one at the frame's epoch is opened directly.
    fn advance(&self, stack: &mut Vec<Frame>) -> Result<Option<Step>, LoadError> {
        while let Some(frame) = stack.last_mut() {
            if let Some(dep) = frame.dependencies.get(frame.next).cloned() {
                frame.next += 1;
                if self.version_of(&dep)? != frame.epoch {
                    return Ok(Some(Step::Enter(dep)));
                }
                if !self.loaded.contains_key(&dep) {
                    return Ok(Some(Step::Open(dep)));
                }
                continue;
            }
            if let Some(done) = stack.pop() {
                return Ok(Some(Step::Open(done.id)));
            }
        }
        Ok(None)
    }

    fn cache(&mut self, bundle: LoadedBundle) -> LoadedBundleHandle {
        let handle = Arc::new(bundle);
        self.loaded.insert(handle.id.clone(), Arc::clone(&handle));
        handle
    }

    fn cached(&self, id: &str) -> Result<LoadedBundleHandle, LoadError> {
        self.loaded
            .get(id)
            .cloned()
            .ok_or_else(|| LoadError::UnknownBundle { id: id.to_string() })
    }

    fn open(&mut self, id: &str) -> Result<(), LoadError> {
        if self.loaded.contains_key(id) {
            return Ok(());
        }
        let path = self.bundle_path(id)?;
        log::debug!("Loading bundle {} from {}", id, path.display());
        let bundle = self.backend.open(id, &path)?;
        self.cache(bundle);
        Ok(())
    }

    async fn open_async(&mut self, id: &str) -> Result<(), LoadError> {
        if self.loaded.contains_key(id) {
            return Ok(());
        }
        let path = self.bundle_path(id)?;
        log::debug!("Loading bundle {} from {}", id, path.display());
        let bundle = self.backend.open_async(id, &path).await?;
        self.cache(bundle);
        Ok(())
    }

    /// Loads bundle `id` after all of its dependencies, deepest first.
    pub fn load(&mut self, id: &str) -> Result<LoadedBundleHandle, LoadError> {
        let mut stack = Vec::new();
        let mut step = Some(Step::Enter(id.to_string()));
        while let Some(current) = step {
            match current {
                Step::Enter(next) => {
                    if let Some(epoch) = self.begin(&next, &stack)? {
                        self.ensure_manifest(epoch)?;
                        self.push_frame(next, epoch, &mut stack)?;
                    }
                }
                Step::Open(next) => self.open(&next)?,
            }
            step = self.advance(&mut stack)?;
        }
        self.cached(id)
    }

    /// Async [`load`](Self::load): awaits each manifest and each bundle in turn.
    pub async fn load_async(&mut self, id: &str) -> Result<LoadedBundleHandle, LoadError> {
        let mut stack = Vec::new();
        let mut step = Some(Step::Enter(id.to_string()));
        while let Some(current) = step {
            match current {
                Step::Enter(next) => {
                    if let Some(epoch) = self.begin(&next, &stack)? {
                        self.ensure_manifest_async(epoch).await?;
                        self.push_frame(next, epoch, &mut stack)?;
                    }
                }
                Step::Open(next) => self.open_async(&next).await?,
            }
            step = self.advance(&mut stack)?;
        }
        self.cached(id)
    }

    fn resolve_owned(&self, name: &str, asset_type: AssetType) -> Result<String, LoadError> {
        self.resolve(name, asset_type)
            .map(str::to_string)
            .ok_or_else(|| LoadError::UnknownAsset {
                name: name.to_string(),
                asset_type,
            })
    }

    /// Loads the bundle packing asset `name`.
    pub fn load_asset(&mut self, name: &str, asset_type: AssetType) -> Result<LoadedBundleHandle, LoadError> {
        let id = self.resolve_owned(name, asset_type)?;
        self.load(&id)
    }

    pub async fn load_asset_async(
        &mut self,
        name: &str,
        asset_type: AssetType,
    ) -> Result<LoadedBundleHandle, LoadError> {
        let id = self.resolve_owned(name, asset_type)?;
        self.load_async(&id).await
    }

    pub fn load_scene(&mut self, name: &str) -> Result<LoadedBundleHandle, LoadError> {
        self.load_asset(name, AssetType::Scene)
    }

    /// Releases every cached bundle and the root manifest and clears the
    /// lookup tables. Registered confs are kept.
    pub fn dispose(&mut self) {
        for (_, handle) in self.loaded.drain() {
            self.backend.release(&handle);
        }
        self.release_root();
        self.lookup.clear();
    }

    /// Directory bundles are read from.
    pub fn bundles_dir(&self) -> &Path {
        &self.bundles_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// In-memory backend recording every open and release.
    #[derive(Default)]
    struct MemoryBackend {
        files: HashMap<PathBuf, Vec<u8>>,
        opened: Vec<String>,
        released: Vec<String>,
    }

    impl BundleBackend for MemoryBackend {
        fn open(&mut self, id: &str, path: &Path) -> Result<LoadedBundle, LoadError> {
            let data = self.files.get(path).cloned().ok_or_else(|| LoadError::Backend {
                id: id.to_string(),
                path: path.to_path_buf(),
                detail: "missing".into(),
            })?;
            self.opened.push(id.to_string());
            Ok(LoadedBundle {
                id: id.to_string(),
                path: path.to_path_buf(),
                data: data.into(),
            })
        }

        async fn open_async(&mut self, id: &str, path: &Path) -> Result<LoadedBundle, LoadError> {
            self.open(id, path)
        }

        fn release(&mut self, bundle: &LoadedBundle) {
            self.released.push(bundle.id.clone());
        }
    }

    fn conf(version: i64, files: &[&str]) -> BundleConf {
        BundleConf {
            bundle_type: BundleType::Normal,
            file_type: FileType::Bundle,
            version,
            files: files.iter().map(|f| f.to_string()).collect(),
        }
    }

    fn root(epoch: i64) -> PathBuf {
        Path::new("/cache/Normal").join(epoch.to_string())
    }

    /// Bundles a, b and c, all at version 7, with `manifest` as the epoch-7 root.
    fn manager(manifest: &DependencyManifest) -> LoadManager<MemoryBackend> {
        let mut backend = MemoryBackend::default();
        backend
            .files
            .insert(root(7).join("Normal"), serde_json::to_vec(manifest).unwrap_or_default());
        for id in ["a", "b", "c"] {
            backend.files.insert(root(7).join(format!("{id}.ab")), id.as_bytes().to_vec());
        }
        let mut mgr = LoadManager::new(backend, "/cache", Some("ab"));
        mgr.push_bundles(BTreeMap::from([
            ("a".to_string(), conf(7, &["Assets/UI/a.prefab"])),
            ("b".to_string(), conf(7, &["Assets/UI/b.png"])),
            ("c".to_string(), conf(7, &["Assets/UI/c.mat"])),
        ]));
        mgr
    }

    #[test]
    fn dependencies_load_deepest_first_and_once() {
        let mut manifest = DependencyManifest::new(7);
        manifest.insert("a.ab", vec!["b.ab".into()]);
        manifest.insert("b.ab", vec!["c.ab".into()]);
        let mut mgr = manager(&manifest);

        let handle = mgr.load_asset("UI/a", AssetType::Prefab).unwrap();
        assert_eq!(&*handle.data, b"a");
        assert_eq!(handle.path, root(7).join("a.ab"));
        assert_eq!(mgr.backend().opened, vec!["Normal", "c", "b", "a"]);

        mgr.load("b").unwrap();
        assert_eq!(mgr.backend().opened.len(), 4);
        assert_eq!(mgr.loaded_count(), 3);
    }

    #[test]
    fn dependency_of_another_epoch_resolves_under_its_own_manifest() {
        let mut old = DependencyManifest::new(8);
        old.insert("b.ab", vec!["c.ab".into()]);
        let mut current = DependencyManifest::new(7);
        current.insert("a.ab", vec!["b.ab".into()]);

        let mut mgr = manager(&current);
        mgr.backend
            .files
            .insert(root(8).join("Normal"), serde_json::to_vec(&old).unwrap());
        for id in ["b", "c"] {
            mgr.backend.files.insert(root(8).join(format!("{id}.ab")), id.as_bytes().to_vec());
        }
        mgr.push_resources(BTreeMap::from([
            ("a".to_string(), conf(7, &[])),
            ("b".to_string(), conf(8, &[])),
            ("c".to_string(), conf(8, &[])),
        ]));

        let handle = mgr.load("a").unwrap();
        assert_eq!(handle.path, root(7).join("a.ab"));
        assert_eq!(mgr.backend().opened, vec!["Normal", "Normal", "c", "b", "a"]);
        assert_eq!(mgr.backend().released, vec!["Normal"]);
        assert_eq!(mgr.manifest_epoch(), Some(8));
        assert_eq!(mgr.cached("b").unwrap().path, root(8).join("b.ab"));

        // Back at epoch 7 the manifest is reloaded once more; cached bundles stay.
        mgr.load("a").unwrap();
        mgr.backend.files.insert(root(7).join("d.ab"), b"d".to_vec());
        mgr.push_bundles(BTreeMap::from([("d".to_string(), conf(7, &[]))]));
        mgr.load("d").unwrap();
        assert_eq!(mgr.backend().opened, vec!["Normal", "Normal", "c", "b", "a", "Normal", "d"]);
        assert_eq!(mgr.manifest_epoch(), Some(7));
    }

    #[test]
    fn cross_epoch_loop_is_reported_with_its_chain() {
        let mut seven = DependencyManifest::new(7);
        seven.insert("a.ab", vec!["b.ab".into()]);
        let mut eight = DependencyManifest::new(8);
        eight.insert("b.ab", vec!["a.ab".into()]);

        let mut mgr = manager(&seven);
        mgr.backend
            .files
            .insert(root(8).join("Normal"), serde_json::to_vec(&eight).unwrap());
        mgr.push_resources(BTreeMap::from([("a".to_string(), conf(7, &[])), ("b".to_string(), conf(8, &[]))]));

        match mgr.load("a") {
            Err(LoadError::DependencyCycle { id, chain }) => {
                assert_eq!(id, "a");
                assert_eq!(chain, vec!["a", "b", "a"]);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
        assert!(!mgr.is_loaded("a"));
    }

    #[test]
    fn cyclic_manifest_is_rejected_when_loaded() {
        let mut manifest = DependencyManifest::new(7);
        manifest.insert("a.ab", vec!["b.ab".into()]);
        manifest.insert("b.ab", vec!["a.ab".into()]);
        let mut mgr = manager(&manifest);

        match mgr.load("c") {
            Err(LoadError::DependencyCycle { id, chain }) => {
                assert_eq!(chain.len(), 3);
                assert_eq!(chain.first(), chain.last());
                assert_eq!(chain[0], id);
                assert!(chain.contains(&"a".to_string()) && chain.contains(&"b".to_string()));
            }
            other => panic!("expected cycle, got {other:?}"),
        }
        assert_eq!(mgr.manifest_epoch(), None);
        assert_eq!(mgr.backend().released, vec!["Normal"]);
        assert_eq!(mgr.loaded_count(), 0);
    }

    #[test]
    fn mismatched_bundle_info_is_rejected() {
        let mut mgr = manager(&DependencyManifest::new(7));
        let changed = conf(8, &["Assets/UI/other.prefab"]);
        assert_eq!(mgr.push_bundles(BTreeMap::from([("a".to_string(), changed)])), 0);
        assert_eq!(mgr.resolve("UI/a", AssetType::Prefab), Some("a"));
        assert_eq!(mgr.resolve("UI/other", AssetType::Prefab), None);
    }

    #[test]
    fn dispose_releases_everything() {
        let mut mgr = manager(&DependencyManifest::new(7));
        mgr.load("c").unwrap();
        mgr.dispose();
        assert_eq!(mgr.loaded_count(), 0);
        assert_eq!(mgr.manifest_epoch(), None);
        let mut released = mgr.backend().released.clone();
        released.sort();
        assert_eq!(released, vec!["Normal", "c"]);
        assert!(mgr.conf("c").is_some());
    }
}

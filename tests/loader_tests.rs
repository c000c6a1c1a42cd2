//! Load manager against on-disk bundle caches.

use kodegen_bundler_assets::bundler::{
    AssetType, BuildMode, BundleBackend, BundleConf, BundleDescriptor, BundleType, DependencyManifest, DependencyMap,
    FileBackend, FileKind, FileType, Ledger, LedgerScope, LoadError, LoadManager, LoadedBundle, RecordRequest,
    SettingsBuilder,
};
use std::collections::BTreeMap;
use std::path::Path;
use tempfile::TempDir;

fn conf(bundle_type: BundleType, version: i64, files: &[&str]) -> BundleConf {
    BundleConf {
        bundle_type,
        file_type: FileType::Bundle,
        version,
        files: files.iter().map(|f| f.to_string()).collect(),
    }
}

fn root_conf(version: i64) -> BundleConf {
    BundleConf {
        bundle_type: BundleType::Normal,
        file_type: FileType::MainManifest,
        version,
        files: Vec::new(),
    }
}

/// Writes `<dir>/Normal/<epoch>/Normal` and one file per bundle at `epoch`.
fn write_cache(dir: &Path, epoch: i64, manifest: &DependencyManifest, bundles: &[(&str, BundleType)]) {
    let version = epoch.to_string();
    for bundle_type in [BundleType::Normal, BundleType::Scene] {
        std::fs::create_dir_all(dir.join(bundle_type.dir_name()).join(&version)).unwrap();
    }
    std::fs::write(
        dir.join("Normal").join(&version).join("Normal"),
        serde_json::to_vec(manifest).unwrap(),
    )
    .unwrap();
    for (id, bundle_type) in bundles {
        let path = dir.join(bundle_type.dir_name()).join(&version).join(format!("{id}.ab"));
        std::fs::write(path, id.as_bytes()).unwrap();
    }
}

fn scene_fixture(tmp: &TempDir) -> LoadManager<FileBackend> {
    let mut manifest = DependencyManifest::new(5);
    manifest.insert("main.ab", vec!["ui.ab".into()]);
    manifest.insert("ui.ab", vec!["atlas.ab".into()]);
    write_cache(
        tmp.path(),
        5,
        &manifest,
        &[("main", BundleType::Scene), ("ui", BundleType::Normal), ("atlas", BundleType::Normal)],
    );

    let mut mgr = LoadManager::new(FileBackend, tmp.path(), Some("ab"));
    mgr.push_resources(BTreeMap::from([
        ("Normal".to_string(), root_conf(5)),
        ("main".to_string(), conf(BundleType::Scene, 5, &[])),
        ("ui".to_string(), conf(BundleType::Normal, 5, &[])),
        ("atlas".to_string(), conf(BundleType::Normal, 5, &[])),
    ]));
    let accepted = mgr.push_bundles(BTreeMap::from([
        ("main".to_string(), conf(BundleType::Scene, 5, &["Assets/Scenes/Main.unity"])),
        ("ui".to_string(), conf(BundleType::Normal, 5, &["Assets/UI/Hud.prefab"])),
        ("atlas".to_string(), conf(BundleType::Normal, 5, &["Assets/UI/Atlas.spriteatlas"])),
    ]));
    assert_eq!(accepted, 3);
    mgr
}

#[test]
fn scene_loads_with_its_dependency_chain_from_disk() {
    let tmp = TempDir::new().unwrap();
    let mut mgr = scene_fixture(&tmp);

    let scene = mgr.load_scene("Main").unwrap();
    assert_eq!(&*scene.data, b"main");
    assert_eq!(scene.path, tmp.path().join("Scenes").join("5").join("main.ab"));
    assert!(mgr.is_loaded("ui"));
    assert!(mgr.is_loaded("atlas"));
    assert_eq!(mgr.manifest_epoch(), Some(5));

    let hud = mgr.load_asset("UI/Hud", AssetType::Prefab).unwrap();
    assert_eq!(hud.size(), 2);
    assert_eq!(mgr.loaded_count(), 3);
}

#[tokio::test]
async fn async_loading_matches_sync_loading() {
    let tmp = TempDir::new().unwrap();
    let mut mgr = scene_fixture(&tmp);

    let atlas = mgr.load_asset_async("Atlas", AssetType::SpriteAtlas).await.unwrap();
    assert_eq!(&*atlas.data, b"atlas");
    assert_eq!(mgr.loaded_count(), 1);

    mgr.load_async("main").await.unwrap();
    assert_eq!(mgr.loaded_count(), 3);
}

#[test]
fn unknown_names_and_ids_are_reported() {
    let tmp = TempDir::new().unwrap();
    let mut mgr = scene_fixture(&tmp);

    assert!(matches!(
        mgr.load_asset("UI/Missing", AssetType::Prefab),
        Err(LoadError::UnknownAsset { asset_type: AssetType::Prefab, .. })
    ));
    assert!(matches!(mgr.load("nope"), Err(LoadError::UnknownBundle { id }) if id == "nope"));
}

#[test]
fn missing_root_manifest_is_unavailable() {
    let tmp = TempDir::new().unwrap();
    let mut mgr = LoadManager::new(FileBackend, tmp.path(), Some("ab"));
    mgr.push_bundles(BTreeMap::from([(
        "ui".to_string(),
        conf(BundleType::Normal, 1, &["Assets/UI/Hud.prefab"]),
    )]));

    assert!(matches!(mgr.load("ui"), Err(LoadError::ManifestUnavailable { .. })));
    assert!(!mgr.is_loaded("ui"));
}

#[test]
fn dependency_without_suffix_still_resolves() {
    let tmp = TempDir::new().unwrap();
    let mut manifest = DependencyManifest::new(1);
    manifest.insert("ui.ab", vec!["shared".into()]);
    write_cache(tmp.path(), 1, &manifest, &[("ui", BundleType::Normal), ("shared", BundleType::Normal)]);

    let mut mgr = LoadManager::new(FileBackend, tmp.path(), Some("ab"));
    mgr.push_bundles(BTreeMap::from([
        ("ui".to_string(), conf(BundleType::Normal, 1, &["Assets/UI/Hud.prefab"])),
        ("shared".to_string(), conf(BundleType::Normal, 1, &["Assets/Common/font.asset"])),
    ]));

    mgr.load("ui").unwrap();
    assert!(mgr.is_loaded("shared"));
}

/// Serves the manifest of the epoch named by the parent directory and
/// records opens and releases.
#[derive(Default)]
struct EpochBackend {
    manifests: BTreeMap<i64, DependencyManifest>,
    opened: Vec<String>,
    released: Vec<String>,
}

impl BundleBackend for EpochBackend {
    fn open(&mut self, id: &str, path: &Path) -> Result<LoadedBundle, LoadError> {
        let data = if id == "Normal" {
            let epoch: i64 = path
                .parent()
                .and_then(|p| p.file_name())
                .and_then(|n| n.to_str())
                .and_then(|n| n.parse().ok())
                .unwrap();
            let manifest = self.manifests.get(&epoch).cloned().unwrap_or_default();
            serde_json::to_vec(&manifest).unwrap()
        } else {
            id.as_bytes().to_vec()
        };
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

#[test]
fn root_manifest_reloads_only_when_its_epoch_changes() {
    let mut first = DependencyManifest::new(1);
    first.insert("a.ab", vec![]);
    let mut second = DependencyManifest::new(2);
    second.insert("b.ab", vec!["c.ab".into()]);

    let backend = EpochBackend {
        manifests: BTreeMap::from([(1, first), (2, second)]),
        ..Default::default()
    };
    let mut mgr = LoadManager::new(backend, "/cache", Some("ab"));
    let bundles = |version| {
        BTreeMap::from([
            ("a".to_string(), conf(BundleType::Normal, version, &["Assets/a.prefab"])),
            ("b".to_string(), conf(BundleType::Normal, version, &["Assets/b.prefab"])),
            ("c".to_string(), conf(BundleType::Normal, version, &["Assets/c.prefab"])),
        ])
    };
    mgr.push_resources(bundles(1));
    mgr.push_bundles(bundles(1));

    mgr.load("a").unwrap();
    mgr.load("a").unwrap();
    assert_eq!(mgr.backend().opened, vec!["Normal", "a"]);
    assert_eq!(mgr.manifest_epoch(), Some(1));

    mgr.push_resources(bundles(2));
    mgr.push_bundles(bundles(2));
    assert_eq!(mgr.version_of("b").unwrap(), 2);

    mgr.load("b").unwrap();
    assert_eq!(mgr.backend().released, vec!["Normal"]);
    assert_eq!(mgr.backend().opened, vec!["Normal", "a", "Normal", "c", "b"]);
    assert_eq!(mgr.manifest_epoch(), Some(2));
    assert_eq!(mgr.root_path(2), Path::new("/cache/Normal/2/Normal"));
}

#[tokio::test]
async fn dependency_from_an_older_build_loads_from_its_own_directory() {
    let tmp = TempDir::new().unwrap();
    let mut current = DependencyManifest::new(9);
    current.insert("main.ab", vec!["ui.ab".into()]);
    write_cache(tmp.path(), 9, &current, &[("main", BundleType::Scene)]);
    let mut older = DependencyManifest::new(4);
    older.insert("ui.ab", vec!["atlas.ab".into()]);
    write_cache(tmp.path(), 4, &older, &[("ui", BundleType::Normal), ("atlas", BundleType::Normal)]);

    let mut mgr = LoadManager::new(FileBackend, tmp.path(), Some("ab"));
    mgr.push_bundles(BTreeMap::from([
        ("main".to_string(), conf(BundleType::Scene, 9, &["Assets/Scenes/Main.unity"])),
        ("ui".to_string(), conf(BundleType::Normal, 4, &["Assets/UI/Hud.prefab"])),
        ("atlas".to_string(), conf(BundleType::Normal, 4, &["Assets/UI/Atlas.spriteatlas"])),
    ]));

    let scene = mgr.load_asset_async("Main", AssetType::Scene).await.unwrap();
    assert_eq!(&*scene.data, b"main");
    assert!(mgr.is_loaded("ui"));
    assert!(mgr.is_loaded("atlas"));
    assert_eq!(mgr.manifest_epoch(), Some(4));
    assert_eq!(
        mgr.bundle_path("atlas").unwrap(),
        tmp.path().join("Normal").join("4").join("atlas.ab")
    );
}

#[tokio::test]
async fn map_and_ledger_epochs_feed_the_load_manager() {
    let tmp = TempDir::new().unwrap();
    let out = tmp.path().join("out");
    std::fs::create_dir_all(out.join("Normal")).unwrap();
    std::fs::write(out.join("Normal/ui.ab"), "ui").unwrap();

    let mut map = DependencyMap::new(Some("ab"));
    let mut ui = BundleDescriptor::new("ui", BundleType::Normal, "Assets/UI");
    ui.add_target("Assets/UI/Hud.prefab");
    map.add_or_replace(ui);

    let mut ledger = Ledger::new(LedgerScope {
        build_target: "Android".into(),
        app_version: "1.0.0".into(),
        market_version: "1.0.0".into(),
        manifest_upload: false,
        file_suffix: Some("ab".into()),
        output_dir: out.clone(),
    });
    ledger
        .record_or_reuse(RecordRequest {
            id: "ui".into(),
            bundle_type: BundleType::Normal,
            file_type: FileType::Bundle,
            build_mode: BuildMode::Release,
            engine_hash: None,
        })
        .await
        .unwrap();
    ledger.reset_upload_timestamp(BuildMode::Release, 202405011200);
    ledger.mark(1, FileKind::Bundle).unwrap();

    let epochs = ledger.latest_epochs(BuildMode::Release);
    assert_eq!(epochs.get("ui"), Some(&202405011200));
    let confs = map.bundle_confs(|id| epochs.get(id).copied().unwrap_or_default());

    let settings = SettingsBuilder::new()
        .build_target("Android")
        .app_version("1.0.0")
        .file_suffix("ab")
        .output_dir(tmp.path().join("build"))
        .ledger_dir(tmp.path().join("ledger"))
        .bundles_dir(&out)
        .build()
        .unwrap();
    let mut mgr = LoadManager::from_settings(&settings, FileBackend);
    assert_eq!(settings.file_suffix(), map.file_suffix());
    assert_eq!(mgr.push_bundles(confs), 1);
    assert_eq!(mgr.conf("ui").map(|c| c.version), Some(202405011200));
    assert_eq!(mgr.resolve("UI/Hud", AssetType::Prefab), Some("ui"));
    assert_eq!(
        mgr.bundle_path("ui").unwrap(),
        out.join("Normal").join("202405011200").join("ui.ab")
    );
    assert_eq!(map.main_manifest_name(), "Normal");
}

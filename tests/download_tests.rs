//! Download from a mirror populated by an upload session, then load from the cache.

use kodegen_bundler_assets::bundler::upload::{LocalStore, ServerDirectoryCache};
use kodegen_bundler_assets::bundler::{
    BuildMode, BundleDescriptor, BundleType, DependencyManifest, DependencyMap, DownloadError, DownloadList,
    DownloadServer, Downloader, Error, FileBackend, FileKind, Ledger, LoadManager, LocalSource, ServerSettings,
    SessionState, Settings, SettingsBuilder, TransferProtocol, UploadContext, UploadManager, UploadServer,
};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::Mutex;

fn write(path: &Path, contents: &[u8]) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}

/// Builds, records and uploads `ui` and the `main` scene into `<tmp>/mirror`.
async fn published(tmp: &TempDir) -> (Settings, DependencyMap) {
    let mirror = tmp.path().join("mirror");
    std::fs::create_dir_all(&mirror).unwrap();
    let server = ServerSettings {
        thread_max_count: 2,
        net_retries: 2,
        net_timeout_secs: 5,
        upload_server: UploadServer {
            id: "mirror".into(),
            protocol: TransferProtocol::Local,
            root: Some(mirror.clone()),
            ..Default::default()
        },
        download_server: DownloadServer {
            id: "mirror".into(),
            url: String::new(),
            root: Some(mirror),
        },
        ..Default::default()
    };
    let settings = SettingsBuilder::new()
        .build_name("game")
        .build_target("Android")
        .app_version("1.0.0")
        .file_suffix("ab")
        .output_dir(tmp.path().join("out"))
        .ledger_dir(tmp.path().join("ledger"))
        .backup_dir(tmp.path().join("backup"))
        .bundles_dir(tmp.path().join("cache"))
        .server(server)
        .build()
        .unwrap();

    let mut map = DependencyMap::new(Some("ab"));
    let mut ui = BundleDescriptor::new("ui", BundleType::Normal, "Assets/UI");
    ui.add_target("Assets/UI/Hud.prefab");
    map.add_or_replace(ui);
    let mut main = BundleDescriptor::new("main", BundleType::Scene, "Assets/Scenes");
    main.add_target("Assets/Scenes/Main.unity");
    map.add_or_replace(main);

    let mut manifest = DependencyManifest::new(1);
    manifest.insert("main.ab", vec!["ui.ab".into()]);
    let out = settings.output_dir();
    write(&out.join("Normal/ui.ab"), b"ui payload");
    write(&out.join("Normal/ui.ab.manifest"), b"ui manifest");
    write(&out.join("Scenes/main.ab"), b"main scene");
    write(&out.join("Normal/Normal"), &serde_json::to_vec(&manifest).unwrap());
    write(&out.join("Normal/Normal.manifest"), b"root manifest");

    let mut ledger = Ledger::new(settings.ledger_scope());
    let summary = ledger.record_build(&map, &HashMap::new(), BuildMode::Debug).await.unwrap();
    assert_eq!(summary.appended, 3);

    let store = LocalStore::from_server(&settings.server().upload_server).unwrap();
    let manager = UploadManager::new(UploadContext {
        settings: Arc::new(settings.clone()),
        ledger: Arc::new(Mutex::new(ledger)),
        map: Arc::new(map.clone()),
        store: Arc::new(store),
        dir_cache: Arc::new(ServerDirectoryCache::new()),
        cdn: None,
    });
    let report = manager.start(&[BuildMode::Debug]).await.wait().await.unwrap();
    assert_eq!(report.state, SessionState::Completed);
    (settings, map)
}

fn downloader(settings: &Settings) -> Downloader<LocalSource> {
    let source = LocalSource::from_server(&settings.server().download_server, settings.build_name()).unwrap();
    Downloader::new(source, settings)
}

#[tokio::test]
async fn downloaded_cache_feeds_the_load_manager() {
    let tmp = TempDir::new().unwrap();
    let (settings, _) = published(&tmp).await;
    let downloader = downloader(&settings);

    let catalogs = downloader.fetch_catalogs(settings.ledger_scope()).await.unwrap();
    assert_eq!(catalogs.map.len(), 2);
    let mut list = downloader.prepare(&catalogs, BuildMode::Debug).await.unwrap();
    assert_eq!(list.len(), 3);

    let report = downloader.download(&mut list).await.unwrap().into_result().unwrap();
    assert_eq!(report.downloaded.len(), 3);
    assert_eq!(report.progress.done_count, report.progress.total_count);
    assert!(list.pending().is_empty());
    assert_eq!(DownloadList::load(&downloader.list_path()).await.unwrap(), Some(list.clone()));

    let epochs = catalogs.ledger.latest_epochs(BuildMode::Debug);
    assert_eq!(list.versions(), epochs);
    let epoch = epochs["ui"];
    assert_eq!(
        std::fs::read(settings.bundles_dir().join(format!("Normal/{epoch}/ui.ab"))).unwrap(),
        b"ui payload"
    );

    let mut mgr = LoadManager::from_settings(&settings, FileBackend);
    assert_eq!(mgr.push_bundles(list.bundle_confs(&catalogs.map)), 2);
    let scene = mgr.load_scene("Main").unwrap();
    assert_eq!(&*scene.data, b"main scene");
    assert!(mgr.is_loaded("ui"));
    assert_eq!(mgr.manifest_epoch(), Some(epoch));

    let again = downloader.download(&mut list).await.unwrap();
    assert_eq!(again.progress.total_count, 0);
}

#[tokio::test]
async fn interrupted_download_resumes_from_the_saved_list() {
    let tmp = TempDir::new().unwrap();
    let (settings, _) = published(&tmp).await;
    let downloader = downloader(&settings);
    let catalogs = downloader.fetch_catalogs(settings.ledger_scope()).await.unwrap();
    let mut list = downloader.prepare(&catalogs, BuildMode::Debug).await.unwrap();

    let ui = list.targets().iter().find(|t| t.id == "ui").unwrap().clone();
    let mirrored = tmp
        .path()
        .join("mirror/game")
        .join(list.remote_path(&ui, FileKind::Manifest));
    let saved = std::fs::read(&mirrored).unwrap();
    std::fs::remove_file(&mirrored).unwrap();

    let report = downloader.download(&mut list).await.unwrap();
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].bundle_id, "ui");
    assert_eq!(report.errors[0].retries_left, 0);
    assert!(matches!(
        report.into_result(),
        Err(Error::Download(DownloadError::Failed { .. }))
    ));

    let mut reloaded = DownloadList::load(&downloader.list_path()).await.unwrap().unwrap();
    let ui_state = reloaded.get(ui.no).unwrap();
    assert!(ui_state.downloaded);
    assert!(!ui_state.manifest_downloaded);

    std::fs::write(&mirrored, saved).unwrap();
    let report = downloader.download(&mut reloaded).await.unwrap().into_result().unwrap();
    assert!(report.downloaded.contains(&ui.no));
    assert!(reloaded.pending().is_empty());
}

#[tokio::test]
async fn tampered_mirror_file_is_rejected_and_not_kept() {
    let tmp = TempDir::new().unwrap();
    let (settings, _) = published(&tmp).await;
    let downloader = downloader(&settings);
    let catalogs = downloader.fetch_catalogs(settings.ledger_scope()).await.unwrap();
    let mut list = downloader.prepare(&catalogs, BuildMode::Debug).await.unwrap();

    let main = list.targets().iter().find(|t| t.id == "main").unwrap().clone();
    let mirrored = tmp.path().join("mirror/game").join(list.remote_path(&main, FileKind::Bundle));
    std::fs::write(&mirrored, b"main scene, patched").unwrap();

    let report = downloader.download(&mut list).await.unwrap();
    let failure = report.errors.iter().find(|e| e.bundle_id == "main").unwrap();
    assert!(failure.detail.contains("size"), "{}", failure.detail);
    assert!(!list.local_path(downloader.bundles_dir(), &main, FileKind::Bundle).exists());
    assert!(!list.get(main.no).unwrap().downloaded);
}

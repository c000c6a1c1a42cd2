//! Partitioner behavior over real directory trees.

use kodegen_bundler_assets::bundler::map::path_key;
use kodegen_bundler_assets::bundler::{BundleMode, BundleType, DependencyMap, ResourceConfig, bundle_id, partition};
use std::path::Path;
use tempfile::TempDir;

async fn touch(path: &Path) {
    tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
    tokio::fs::write(path, b"x").await.unwrap();
}

#[tokio::test]
async fn file_one_to_one_skips_metadata() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("Textures");
    for name in ["a.png", "b.png", "a.png.meta"] {
        touch(&dir.join(name)).await;
    }

    let mut config = ResourceConfig::default();
    config.add_resource(path_key(&dir), BundleMode::FileOneToOne);
    let mut map = DependencyMap::new(Some("ab"));
    let report = partition(&config, &mut map).await.unwrap();

    assert_eq!(report.bundles, 2);
    assert_eq!(map.len(), 2);
    for name in ["a.png", "b.png"] {
        let target = path_key(&dir.join(name));
        let descriptor = map.get(&bundle_id(&target)).unwrap();
        assert_eq!(descriptor.target_count(), 1);
        assert!(descriptor.contains(&target));
        assert_eq!(descriptor.bundle_type, BundleType::Normal);
    }
    assert!(map.bundle_of_target(&path_key(&dir.join("a.png.meta"))).is_none());
}

#[tokio::test]
async fn one_dir_and_top_dir_modes() {
    let tmp = TempDir::new().unwrap();
    let ui = tmp.path().join("UI");
    touch(&ui.join("main.prefab")).await;
    touch(&ui.join("icons/close.png")).await;
    let chars = tmp.path().join("Characters");
    touch(&chars.join("hero/hero.prefab")).await;
    touch(&chars.join("hero/hero.mat")).await;
    touch(&chars.join("slime/slime.prefab")).await;

    let mut config = ResourceConfig::default();
    config.add_resource(path_key(&ui), BundleMode::OneDir);
    config.add_resource(path_key(&chars), BundleMode::TopDirOneToOne);
    let mut map = DependencyMap::new(None);
    partition(&config, &mut map).await.unwrap();

    let ui_bundle = map.get(&bundle_id(&path_key(&ui))).unwrap();
    assert_eq!(ui_bundle.target_count(), 2);

    let hero = map.get(&bundle_id(&path_key(&chars.join("hero")))).unwrap();
    assert_eq!(hero.target_count(), 2);
    let slime = map.get(&bundle_id(&path_key(&chars.join("slime")))).unwrap();
    assert_eq!(slime.target_count(), 1);
    assert_eq!(map.len(), 3);
}

#[tokio::test]
async fn scenes_become_scene_bundles() {
    let tmp = TempDir::new().unwrap();
    let scenes = tmp.path().join("Scenes");
    touch(&scenes.join("Main.unity")).await;
    touch(&scenes.join("Battle.unity")).await;
    touch(&scenes.join("lighting.asset")).await;

    let mut config = ResourceConfig::default();
    config.add_resource(path_key(&scenes), BundleMode::SceneOneToOne);
    let mut map = DependencyMap::new(None);
    partition(&config, &mut map).await.unwrap();

    assert_eq!(map.len(), 2);
    assert!(map.iter().all(|d| d.bundle_type == BundleType::Scene));
    assert_eq!(map.scenes().count(), 2);
}

#[tokio::test]
async fn ignoring_a_file_removes_it_from_an_existing_bundle() {
    let tmp = TempDir::new().unwrap();
    let ui = tmp.path().join("UI");
    touch(&ui.join("keep.prefab")).await;
    touch(&ui.join("drop.prefab")).await;
    let drop = path_key(&ui.join("drop.prefab"));

    let mut config = ResourceConfig::default();
    config.add_resource(path_key(&ui), BundleMode::OneDir);
    let mut map = DependencyMap::new(None);
    partition(&config, &mut map).await.unwrap();
    assert!(map.bundle_of_target(&drop).is_some());

    assert!(config.add_ignore_target(&drop).await.unwrap().is_some());
    let report = partition(&config, &mut map).await.unwrap();
    assert_eq!(report.ignored, 1);
    assert!(map.bundle_of_target(&drop).is_none());

    config.remove_ignore_target(&drop).await.unwrap();
    partition(&config, &mut map).await.unwrap();
    assert!(map.bundle_of_target(&drop).is_some());
}

#[tokio::test]
async fn map_export_round_trips_through_disk() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("Audio");
    touch(&dir.join("click.wav")).await;

    let mut config = ResourceConfig::default();
    config.add_resource(path_key(&dir), BundleMode::FileOneToOne);
    let mut map = DependencyMap::new(Some("ab"));
    partition(&config, &mut map).await.unwrap();

    let path = tmp.path().join("ledger/BundlesMap.json");
    map.export(&path).await.unwrap();
    let restored = DependencyMap::import(&path).await.unwrap().unwrap();
    assert_eq!(restored, map);
    assert_eq!(restored.file_suffix(), Some("ab"));
}

//! Bundle partitioner.
//!
//! Turns configured source paths into bundle descriptors according to each
//! resource's [`BundleMode`], applying per-resource ignore lists. The only
//! side effect is on the [`DependencyMap`]; no files are written.

mod resource;

pub use resource::{BundleMode, BundleResource, META_SUFFIX, ResourceConfig, is_metadata_file};

use crate::bundler::Result;
use crate::bundler::map::{BundleDescriptor, BundleType, DependencyMap, bundle_id, path_key};
use crate::bundler::utils::fs;
use std::path::Path;

/// File extension of scene sources.
pub const SCENE_EXTENSION: &str = ".unity";

/// Counters from one partition pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PartitionReport {
    /// Descriptors written to the map.
    pub bundles: usize,
    /// Target files across those descriptors.
    pub targets: usize,
    /// Files skipped because of an ignore list.
    pub ignored: usize,
}

/// Partitions every resource of `config` into `map`.
///
/// Existing descriptors with the same id are replaced; descriptors that end
/// up with no targets are removed.
pub async fn partition(config: &ResourceConfig, map: &mut DependencyMap) -> Result<PartitionReport> {
    let mut report = PartitionReport::default();
    for resource in &config.resources {
        log::info!("Partitioning {} ({:?})", resource.path, resource.mode);
        partition_resource(config, resource, map, &mut report).await?;
    }
    log::info!(
        "Partition complete: {} bundles, {} targets, {} ignored",
        report.bundles,
        report.targets,
        report.ignored
    );
    Ok(report)
}

/// Partitions a single resource into `map`.
pub async fn partition_resource(
    config: &ResourceConfig,
    resource: &BundleResource,
    map: &mut DependencyMap,
    report: &mut PartitionReport,
) -> Result<()> {
    let root = Path::new(&resource.path);

    match resource.mode {
        BundleMode::OneDir => {
            let id = bundle_id(&resource.path);
            let files = candidate_files(config, root).await?;
            let mut descriptor = BundleDescriptor::new(&id, BundleType::Normal, &resource.path);
            fill(&mut descriptor, resource, &files, map, report);
            commit(map, descriptor, report);
        }
        BundleMode::FileOneToOne => {
            for file in candidate_files(config, root).await? {
                single_file(resource, &file, BundleType::Normal, &file, map, report);
            }
        }
        BundleMode::TopDirOneToOne => {
            let subdirs = if root.is_dir() {
                fs::list_subdirs(root).await?
            } else {
                Vec::new()
            };
            if subdirs.is_empty() {
                log::warn!("No subdirectories under {}; nothing to partition", resource.path);
            }
            for dir in subdirs {
                let dir_key = path_key(&dir);
                let files = candidate_files(config, &dir).await?;
                let mut descriptor =
                    BundleDescriptor::new(bundle_id(&dir_key), BundleType::Normal, &dir_key);
                fill(&mut descriptor, resource, &files, map, report);
                commit(map, descriptor, report);
            }
        }
        BundleMode::SceneOneToOne => {
            for file in candidate_files(config, root).await? {
                if file.ends_with(SCENE_EXTENSION) {
                    single_file(resource, &file, BundleType::Scene, &resource.path, map, report);
                }
            }
        }
    }
    Ok(())
}

/// Files under `root` minus metadata and globally excluded paths.
async fn candidate_files(config: &ResourceConfig, root: &Path) -> Result<Vec<String>> {
    if !root.exists() {
        log::warn!("Resource path does not exist: {}", root.display());
        return Ok(Vec::new());
    }
    Ok(fs::list_files(root)
        .await?
        .iter()
        .map(|p| path_key(p))
        .filter(|p| !is_metadata_file(p) && !config.is_unresource(p))
        .collect())
}

fn fill(
    descriptor: &mut BundleDescriptor,
    resource: &BundleResource,
    files: &[String],
    map: &mut DependencyMap,
    report: &mut PartitionReport,
) {
    for file in files {
        if resource.is_ignored(file) {
            // Un-ignoring must not leave residue from an earlier pass.
            map.remove_target(&descriptor.id, file);
            report.ignored += 1;
            continue;
        }
        descriptor.add_target(file.as_str());
    }
}

fn single_file(
    resource: &BundleResource,
    file: &str,
    bundle_type: BundleType,
    source_path: &str,
    map: &mut DependencyMap,
    report: &mut PartitionReport,
) {
    let id = bundle_id(file);
    if resource.is_ignored(file) {
        if map.remove(&id).is_some() {
            log::debug!("Removed ignored bundle {}", id);
        }
        report.ignored += 1;
        return;
    }
    let mut descriptor = BundleDescriptor::new(id, bundle_type, source_path);
    descriptor.add_target(file);
    commit(map, descriptor, report);
}

fn commit(map: &mut DependencyMap, descriptor: BundleDescriptor, report: &mut PartitionReport) {
    if descriptor.target_count() == 0 {
        if map.remove(&descriptor.id).is_some() {
            log::debug!("Bundle {} has no targets left; removed", descriptor.id);
        }
        return;
    }
    report.bundles += 1;
    report.targets += descriptor.target_count();
    map.add_or_replace(descriptor);
}

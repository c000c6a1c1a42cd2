//! `partition`: resource config to dependency map.

use crate::bundler::{DependencyMap, ResourceConfig, Settings, partition};
use crate::cli::RuntimeConfig;
use crate::error::{CliError, Result};

pub async fn execute(settings: &Settings, config: &RuntimeConfig) -> Result<i32> {
    let resources_path = settings.resources_path();
    let resources = ResourceConfig::load(&resources_path)
        .await?
        .ok_or_else(|| CliError::ExecutionFailed {
            command: "partition".to_string(),
            reason: format!("{} not found", resources_path.display()),
        })?;

    let map_path = settings.map_path();
    let mut map = DependencyMap::import(&map_path)
        .await?
        .unwrap_or_else(|| DependencyMap::new(settings.file_suffix()));

    config.progress(&format!("Partitioning {} resources", resources.resources.len()))?;
    let report = partition(&resources, &mut map).await?;
    map.export(&map_path).await?;

    config.indent(&format!("{} ignored files", report.ignored))?;
    config.success(&format!(
        "{} bundles ({} targets) written to {}",
        report.bundles,
        report.targets,
        map_path.display()
    ))?;
    Ok(0)
}

//! `record`: engine build output to ledger.

use crate::bundler::utils::fs;
use crate::bundler::{BuildMode, DependencyMap, Ledger, Settings};
use crate::cli::RuntimeConfig;
use crate::error::{CliError, Result};
use std::collections::HashMap;
use std::path::Path;

pub async fn execute(settings: &Settings, mode: BuildMode, hashes: Option<&Path>, config: &RuntimeConfig) -> Result<i32> {
    let map_path = settings.map_path();
    let map = DependencyMap::import(&map_path)
        .await?
        .ok_or_else(|| CliError::ExecutionFailed {
            command: "record".to_string(),
            reason: format!("{} not found; run `partition` first", map_path.display()),
        })?;

    let engine_hashes: HashMap<String, String> = match hashes {
        Some(path) => fs::read_json(path).await?.unwrap_or_default(),
        None => HashMap::new(),
    };

    let ledger_path = settings.ledger_path();
    let mut ledger = Ledger::load(&ledger_path, settings.ledger_scope()).await?;
    config.progress(&format!("Recording {} bundles ({})", map.len(), mode))?;
    let summary = ledger.record_build(&map, &engine_hashes, mode).await?;
    ledger.save(&ledger_path).await?;

    config.indent(&format!("appended:  {}", summary.appended))?;
    config.indent(&format!("updated:   {}", summary.updated))?;
    config.indent(&format!("unchanged: {}", summary.unchanged))?;
    if summary.missing > 0 {
        config.warn(&format!("{} bundles had no build output", summary.missing))?;
    }
    config.success(&format!("Ledger saved to {}", ledger_path.display()))?;
    Ok(0)
}

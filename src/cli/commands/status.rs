//! `status`: ledger summary.

use crate::bundler::{BuildMode, Ledger, Settings};
use crate::cli::RuntimeConfig;
use crate::error::Result;

pub async fn execute(settings: &Settings, mode: Option<BuildMode>, config: &RuntimeConfig) -> Result<i32> {
    let ledger = Ledger::load(&settings.ledger_path(), settings.ledger_scope()).await?;
    let discarded = ledger.artifacts().iter().filter(|a| a.discarded).count();

    config.section(&format!(
        "{} {} / {}",
        settings.build_target(),
        settings.app_version(),
        settings.market_version()
    ))?;
    config.indent(&format!("artifacts: {} ({} discarded)", ledger.len(), discarded))?;
    let pending_modes: Vec<&str> = ledger.pending_modes().iter().map(BuildMode::as_str).collect();
    if !pending_modes.is_empty() {
        config.indent(&format!("pending uploads in: {}", pending_modes.join(", ")))?;
    }

    let modes = match mode {
        Some(mode) => vec![mode],
        None => BuildMode::ALL.to_vec(),
    };
    for mode in modes {
        let pending = ledger.progress(&[mode]).snapshot();
        let downloadable = ledger.download_entries(mode).len();
        config.indent(&format!(
            "{mode}: {} files ({} bytes) pending, {} artifacts downloadable",
            pending.total_count, pending.total_bytes, downloadable
        ))?;
        for artifact in ledger.pending(mode) {
            config.verbose_println(&format!(
                "#{} {} [{}] {}",
                artifact.no,
                artifact.id,
                artifact.status,
                artifact.remote_dir()
            ))?;
        }
    }
    Ok(0)
}

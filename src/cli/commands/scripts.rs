//! `scripts`: shell scripts for manual uploads.

use crate::bundler::scripts::generate_scripts;
use crate::bundler::{BuildMode, Ledger, Settings};
use crate::cli::RuntimeConfig;
use crate::error::Result;
use std::path::Path;

pub async fn execute(settings: &Settings, mode: BuildMode, out: &Path, config: &RuntimeConfig) -> Result<i32> {
    let ledger = Ledger::load(&settings.ledger_path(), settings.ledger_scope()).await?;
    let set = generate_scripts(settings, &ledger, mode, out).await?;

    config.indent(&set.upload_curl.display().to_string())?;
    config.indent(&set.upload_ftp.display().to_string())?;
    match &set.refresh_cdn {
        Some(path) => config.indent(&path.display().to_string())?,
        None => config.verbose_println("No CDN configured; refresh script skipped")?,
    }
    config.success(&format!("Scripts for {} pending {} artifacts written", ledger.pending(mode).len(), mode))?;
    Ok(0)
}

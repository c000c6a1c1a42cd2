//! `reset`: clear every upload status.

use crate::bundler::{Ledger, Settings};
use crate::cli::RuntimeConfig;
use crate::error::Result;

pub async fn execute(settings: &Settings, config: &RuntimeConfig) -> Result<i32> {
    let ledger_path = settings.ledger_path();
    let mut ledger = Ledger::load(&ledger_path, settings.ledger_scope()).await?;
    let count = ledger.reset_status();
    ledger.save(&ledger_path).await?;
    config.success(&format!("Reset upload status of {count} artifacts"))?;
    Ok(0)
}

//! Command execution functions for pipeline operations.

mod download;
mod partition;
mod record;
mod reset;
mod scripts;
mod status;
mod upload;

use super::{Command, RuntimeConfig};
use crate::bundler::Settings;
use crate::error::Result;

/// Runs `command` and returns the process exit code.
pub async fn execute(command: &Command, settings: Settings, config: &RuntimeConfig) -> Result<i32> {
    match command {
        Command::Partition => partition::execute(&settings, config).await,
        Command::Record { mode, hashes } => record::execute(&settings, *mode, hashes.as_deref(), config).await,
        Command::Upload { mode } => upload::execute(settings, mode, config).await,
        Command::Download { mode } => download::execute(&settings, *mode, config).await,
        Command::Status { mode } => status::execute(&settings, *mode, config).await,
        Command::Reset => reset::execute(&settings, config).await,
        Command::Scripts { mode, out } => scripts::execute(&settings, *mode, out, config).await,
    }
}

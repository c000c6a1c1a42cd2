//! Command line argument parsing and validation.
//!
//! This module provides CLI argument parsing using clap, with validation
//! and the runtime configuration derived from it.

use crate::bundler::BuildMode;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Environment variable naming the settings file.
pub const CONFIG_ENV: &str = "BUNDLER_ASSETS_CONFIG";

/// Asset bundle partitioner, upload ledger and uploader
#[derive(Parser, Debug)]
#[command(
    name = "kodegen_bundler_assets",
    version,
    about = "Asset bundle partitioner, upload ledger and uploader",
    long_about = "Partitions resource directories into asset bundles, records engine build output in a
versioned upload ledger and uploads pending bundles to the resource server.

Usage:
  kodegen_bundler_assets --config bundler.toml partition
  kodegen_bundler_assets --config bundler.toml record --mode debug
  kodegen_bundler_assets --config bundler.toml upload --mode debug --mode release
  kodegen_bundler_assets --config bundler.toml download --mode debug
  kodegen_bundler_assets --config bundler.toml scripts --mode debug --out ./Shell

Exit code 0 = the command completed; uploads are resumable after a failure."
)]
pub struct Args {
    /// Settings file (TOML)
    #[arg(short, long, env = CONFIG_ENV, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Print detail lines
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print errors only
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Pipeline commands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Partition configured resources and write BundlesMap.json
    Partition,

    /// Record engine build output in the upload ledger
    Record {
        /// Build mode the bundles were built for: debug, release, store
        #[arg(short, long)]
        mode: BuildMode,

        /// JSON object of bundle id to engine hash
        #[arg(long, value_name = "PATH")]
        hashes: Option<PathBuf>,
    },

    /// Upload pending artifacts to the resource server
    Upload {
        /// Build modes to upload (repeatable)
        #[arg(short, long, required = true)]
        mode: Vec<BuildMode>,
    },

    /// Download uploaded bundles into the client bundle cache
    Download {
        /// Build mode whose uploads are downloaded
        #[arg(short, long)]
        mode: BuildMode,
    },

    /// Print a ledger summary
    Status {
        /// Restrict pending counts to one build mode
        #[arg(short, long)]
        mode: Option<BuildMode>,
    },

    /// Clear the upload status of every artifact
    Reset,

    /// Generate upload and CDN refresh shell scripts
    Scripts {
        /// Build mode whose pending artifacts the scripts upload
        #[arg(short, long)]
        mode: BuildMode,

        /// Output directory
        #[arg(short, long, value_name = "DIR")]
        out: PathBuf,
    },
}

impl Args {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate arguments for consistency
    pub fn validate(&self) -> Result<(), String> {
        if let Command::Scripts { out, .. } = &self.command {
            if out.as_os_str().is_empty() {
                return Err("Output directory cannot be empty".to_string());
            }
        }
        if let Some(config) = &self.config {
            if config.as_os_str().is_empty() {
                return Err("Config path cannot be empty".to_string());
            }
        }
        Ok(())
    }

    /// Settings file to load: `--config`, then the user config directory.
    pub fn config_path(&self) -> Option<PathBuf> {
        self.config.clone().or_else(default_config_path)
    }
}

/// `<config dir>/kodegen/bundler_assets.toml`, if it exists.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join("kodegen").join("bundler_assets.toml"))
        .filter(|path| path.is_file())
}

/// Configuration derived from command line arguments
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Output manager for colored terminal output
    output: super::OutputManager,
}

impl From<&Args> for RuntimeConfig {
    fn from(args: &Args) -> Self {
        Self {
            output: super::OutputManager::new(args.verbose, args.quiet),
        }
    }
}

impl RuntimeConfig {
    /// Print verbose message if in verbose mode
    pub fn verbose_println(&self, message: &str) -> std::io::Result<()> {
        self.output.verbose(message)
    }

    pub fn success(&self, message: &str) -> std::io::Result<()> {
        self.output.success(message)
    }

    pub fn warn(&self, message: &str) -> std::io::Result<()> {
        self.output.warn(message)
    }

    pub fn progress(&self, message: &str) -> std::io::Result<()> {
        self.output.progress(message)
    }

    pub fn section(&self, title: &str) -> std::io::Result<()> {
        self.output.section(title)
    }

    pub fn indent(&self, message: &str) -> std::io::Result<()> {
        self.output.indent(message)
    }
}

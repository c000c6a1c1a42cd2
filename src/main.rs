//! Kodegen Bundler Assets - asset bundle partitioning, upload and loading.
//!
//! This binary partitions resources into bundles, records built bundles in
//! the upload ledger and uploads them to the resource server.

use kodegen_bundler_assets::cli;
use std::process;

#[tokio::main]
async fn main() {
    // Initialize logging
    env_logger::init();

    // Run CLI and get exit code
    let exit_code = match cli::run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            for suggestion in e.recovery_suggestions() {
                eprintln!("  hint: {}", suggestion);
            }
            1
        }
    };

    process::exit(exit_code);
}

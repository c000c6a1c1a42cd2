//! Asset bundle pipeline library.
//!
//! This library provides:
//! - partitioning of resource directories into bundles
//! - a versioned upload ledger with resumable, concurrent uploads
//! - a dependency-aware bundle loader for clients
//!
//! It can be used both as a CLI tool and as a library dependency.

pub mod bundler;
pub mod cli;
pub mod error;

// Re-export commonly used types
pub use error::{BundlerError, CliError, Result};

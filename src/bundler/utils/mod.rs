//! Shared helpers: filesystem glue, content hashing and HTTP clients.

pub mod checksum;
pub mod fs;
pub mod http;

pub use checksum::{FileDigest, digest_file, digest_if_exists};

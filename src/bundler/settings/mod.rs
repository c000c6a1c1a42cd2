//! Configuration structures for the asset bundle pipeline.
//!
//! [`Settings`] is constructed once at process start (through
//! [`SettingsBuilder`] or [`Settings::load`]) and handed to every component
//! that needs it.

mod build;
mod builder;
mod core;
mod server;

pub use build::BuildMode;
pub use builder::SettingsBuilder;
pub use core::{BUNDLES_CONFIG_FILE, BUNDLES_MAP_FILE, Settings, SettingsFile, UPLOAD_LIST_FILE};
pub use server::{CdnServer, DownloadServer, ServerSettings, TransferProtocol, UploadServer};

//! Asset bundle pipeline.
//!
//! - [`partition`] splits resource directories into bundle descriptors
//! - [`map`] aggregates descriptors into the dependency map
//! - [`ledger`] records every built bundle version and its upload status
//! - [`upload`] ships pending artifacts to the resource server
//! - [`download`] mirrors uploaded bundles into the client bundle cache
//! - [`loader`] loads bundles on the client, dependencies first
//! - [`scripts`] renders equivalent shell scripts for manual runs

pub mod download;
pub mod error;
pub mod ledger;
pub mod loader;
pub mod manifest;
pub mod map;
pub mod partition;
pub mod scripts;
pub mod settings;
pub mod upload;
pub mod utils;

pub use download::{
    BundleSource, Catalogs, DownloadError, DownloadList, DownloadReport, DownloadTarget, Downloader, HttpSource,
    LocalSource,
};
pub use error::{Context, Error, ErrorExt, Result};
pub use ledger::{
    FileKind, Ledger, LedgerError, LedgerScope, ProgressSnapshot, RecordOutcome, RecordRequest, RecordSummary,
    UploadArtifact, UploadStatus,
};
pub use loader::{AssetType, BundleBackend, BundleConf, FileBackend, LoadError, LoadManager, LoadedBundle};
pub use manifest::DependencyManifest;
pub use map::{BundleDescriptor, BundleType, DependencyMap, FileType, bundle_id};
pub use partition::{BundleMode, PartitionReport, ResourceConfig, partition};
pub use settings::{
    BuildMode, CdnServer, DownloadServer, ServerSettings, Settings, SettingsBuilder, TransferProtocol, UploadServer,
};
pub use upload::{
    SessionState, UploadContext, UploadError, UploadErrorDetail, UploadErrorKind, UploadManager, UploadReport,
    UploadSession,
};

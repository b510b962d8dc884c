//! Core types for filetally.
//!
//! This crate provides the data model shared by the other filetally crates:
//! per-file records, the two manifest text formats, content hashing with
//! `.sha256` sidecars, configuration and the error taxonomy.

mod config;
mod error;
pub mod integrity;
pub mod manifest;
mod record;

pub use config::{
    ChecksumConfig, ChecksumConfigBuilder, DEFAULT_CHECKSUM_PROGRESS_INTERVAL,
    DEFAULT_FLUSH_INTERVAL, DEFAULT_SCAN_PROGRESS_INTERVAL, ScanConfig, ScanConfigBuilder,
};
pub use error::{IntegrityError, ManifestError, RowError, ScanError, ScanWarning, WarningKind};
pub use integrity::SidecarStatus;
pub use manifest::{ManifestEntry, ManifestWriter};
pub use record::{Checksum, FileRecord, ManifestKind, attribute_flags, path_key};

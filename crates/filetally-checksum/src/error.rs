//! Error types for checksum runs and scan sessions.

use std::path::PathBuf;

use thiserror::Error;

use filetally_core::{IntegrityError, ManifestError, ScanError};

/// Errors that halt a checksum run.
///
/// Per-file read failures are not errors; they become `ERROR` rows.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The output manifest could not be created, read or appended to.
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// The sidecar for a completed manifest could not be written.
    #[error("Failed to write manifest sidecar: {0}")]
    Integrity(#[from] IntegrityError),

    /// Another run is already appending to this manifest.
    #[error("A checksum run is already active for {path}")]
    AlreadyRunning { path: PathBuf },

    /// The background worker failed.
    #[error("Checksum worker failed: {message}")]
    Worker { message: String },
}

/// Errors that halt a scan session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The walk could not be set up.
    #[error(transparent)]
    Scan(#[from] ScanError),

    /// The checksum run failed.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The candidate manifest could not be written or read back.
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// A fresh scan was requested without any roots to walk.
    #[error("No scan roots configured")]
    NoRoots,

    /// A resume was requested but no resumable session exists.
    #[error("No interrupted session to resume")]
    NothingToResume,

    /// The background worker failed.
    #[error("Session worker failed: {message}")]
    Worker { message: String },
}

//! Error types for scanning, manifest and integrity operations.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::record::ManifestKind;

/// Errors that can occur while preparing a directory walk.
///
/// Nothing that happens during a walk surfaces here: unreadable roots and
/// subtrees become [`ScanWarning`]s.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Invalid configuration.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },
}

/// Kind of scan warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarningKind {
    /// Permission was denied.
    PermissionDenied,
    /// Symbolic link target does not exist.
    BrokenSymlink,
    /// Error reading a directory; its subtree was skipped.
    ReadError,
    /// The file name cannot be written as a manifest row.
    UnsupportedName,
    /// A root could not be walked at all.
    RootUnavailable,
}

/// Non-fatal warning encountered during a walk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanWarning {
    /// Path where the warning occurred.
    pub path: PathBuf,
    /// Human-readable message.
    pub message: String,
    /// Kind of warning.
    pub kind: WarningKind,
}

impl ScanWarning {
    /// Create a new scan warning.
    pub fn new(path: impl Into<PathBuf>, message: impl Into<String>, kind: WarningKind) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            kind,
        }
    }

    /// Create a permission denied warning.
    pub fn permission_denied(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            message: format!("Permission denied: {}", path.display()),
            path,
            kind: WarningKind::PermissionDenied,
        }
    }

    /// Create a read error warning.
    pub fn read_error(path: impl Into<PathBuf>, error: &dyn std::fmt::Display) -> Self {
        let path = path.into();
        Self {
            message: format!("Read error: {error}"),
            path,
            kind: WarningKind::ReadError,
        }
    }
}

/// Errors raised while creating, appending to or reading a manifest file.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The manifest could not be opened, written or read.
    #[error("Manifest I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The first row does not identify a manifest kind.
    #[error("Manifest has no recognizable header: {path}")]
    MissingHeader { path: PathBuf },

    /// Two manifests (or a manifest and a caller) disagree on the kind.
    #[error("Manifest kind mismatch: expected {expected}, found {found}")]
    KindMismatch {
        expected: ManifestKind,
        found: ManifestKind,
    },
}

impl ManifestError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// A single manifest row that could not be tokenized.
///
/// Always recoverable: readers skip the row and keep going.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RowError {
    /// Blank line.
    #[error("empty row")]
    Empty,

    /// A quoted field has no closing quote before the end of the line.
    #[error("unterminated quoted field")]
    UnterminatedQuote,

    /// The row splits into the wrong number of fields.
    #[error("expected {expected} fields, found {found}")]
    FieldCount { expected: usize, found: usize },
}

/// Errors from content hashing and sidecar handling.
#[derive(Debug, Error)]
pub enum IntegrityError {
    /// The file (or its sidecar) could not be read or written.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No sidecar exists, so there is no integrity claim to check.
    #[error("Checksum sidecar not found: {path}")]
    SidecarNotFound { path: PathBuf },
}

impl IntegrityError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

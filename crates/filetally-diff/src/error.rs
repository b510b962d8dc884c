//! Error types for manifest comparison.

use std::path::PathBuf;

use thiserror::Error;

use filetally_core::ManifestError;

/// Errors that stop a comparison. Malformed rows never do.
#[derive(Debug, Error)]
pub enum DiffError {
    /// A manifest could not be read, or the two declare different kinds.
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// Neither manifest has a header and no kind was given.
    #[error("Cannot tell the manifest kind: neither file has a header")]
    UnknownKind,

    /// The report could not be written.
    #[error("Failed to write diff report to {path}: {source}")]
    Export {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

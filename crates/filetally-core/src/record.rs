//! Manifest kinds and per-file records.

use std::fmt;
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Which of the two manifest text formats a file uses.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr, Serialize, Deserialize,
)]
pub enum ManifestKind {
    /// One path per row.
    SimpleList,
    /// Path, checksum and file metadata per row.
    ChecksumManifest,
}

impl ManifestKind {
    /// Header row written as the first line of a manifest of this kind.
    pub fn header(self) -> &'static str {
        match self {
            Self::SimpleList => "FilePath",
            Self::ChecksumManifest => {
                "FilePath,Checksum,CalculationTimestamp,Size,CreationTime,LastWriteTime,Attributes"
            }
        }
    }

    /// Number of fields in a well-formed data row.
    pub fn field_count(self) -> usize {
        match self {
            Self::SimpleList => 1,
            Self::ChecksumManifest => 7,
        }
    }
}

/// Content checksum of a file, or the sentinel written when hashing failed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Checksum {
    /// Lowercase hex digest.
    Digest(String),
    /// The file could not be read.
    Error,
}

impl Checksum {
    /// Text written in place of a digest for unreadable files.
    pub const ERROR_SENTINEL: &'static str = "ERROR";

    /// Check if this is the error sentinel.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error)
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Digest(hex) => f.write_str(hex),
            Self::Error => f.write_str(Self::ERROR_SENTINEL),
        }
    }
}

impl FromStr for Checksum {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == Self::ERROR_SENTINEL {
            Ok(Self::Error)
        } else {
            Ok(Self::Digest(s.to_ascii_lowercase()))
        }
    }
}

/// One row of a checksum manifest.
///
/// Records are immutable once appended; a path appears at most once per manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    /// Absolute path, the unique key of the record.
    pub path: PathBuf,
    /// Content digest or error sentinel.
    pub checksum: Checksum,
    /// File size in bytes.
    pub size: u64,
    /// Creation time, if the platform reports one.
    pub created: Option<DateTime<Local>>,
    /// Last modification time.
    pub modified: Option<DateTime<Local>>,
    /// Platform attribute flags, e.g. `ReadOnly, Hidden`.
    pub attributes: String,
    /// Wall-clock time the hash completed.
    pub computed_at: DateTime<Local>,
}

impl FileRecord {
    /// Attributes text used on error rows.
    pub const ERROR_ATTRIBUTES: &'static str = "Error";

    /// Build a record for a successfully hashed file.
    pub fn new(path: impl Into<PathBuf>, digest: String, metadata: &Metadata) -> Self {
        let path = path.into();
        let attributes = attribute_flags(&path, metadata);
        Self {
            checksum: Checksum::Digest(digest),
            size: metadata.len(),
            created: metadata.created().ok().map(DateTime::<Local>::from),
            modified: metadata.modified().ok().map(DateTime::<Local>::from),
            attributes,
            computed_at: Local::now(),
            path,
        }
    }

    /// Build the placeholder record for a file that could not be read.
    pub fn error(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            checksum: Checksum::Error,
            size: 0,
            created: None,
            modified: None,
            attributes: Self::ERROR_ATTRIBUTES.to_string(),
            computed_at: Local::now(),
        }
    }

    /// Case-insensitive identity key of this record's path.
    pub fn key(&self) -> String {
        path_key(&self.path.to_string_lossy())
    }
}

/// Case-insensitive comparison key for a manifest path.
pub fn path_key(path: &str) -> String {
    path.to_lowercase()
}

/// Describe a file's attribute flags as a comma-separated list.
#[cfg(windows)]
pub fn attribute_flags(_path: &Path, metadata: &Metadata) -> String {
    use std::os::windows::fs::MetadataExt;

    const FLAGS: &[(u32, &str)] = &[
        (0x0001, "ReadOnly"),
        (0x0002, "Hidden"),
        (0x0004, "System"),
        (0x0010, "Directory"),
        (0x0020, "Archive"),
        (0x0080, "Normal"),
        (0x0100, "Temporary"),
        (0x0200, "SparseFile"),
        (0x0400, "ReparsePoint"),
        (0x0800, "Compressed"),
        (0x1000, "Offline"),
        (0x2000, "NotContentIndexed"),
        (0x4000, "Encrypted"),
    ];

    let bits = metadata.file_attributes();
    let names: Vec<&str> = FLAGS
        .iter()
        .filter(|(bit, _)| bits & bit != 0)
        .map(|(_, name)| *name)
        .collect();
    if names.is_empty() {
        "Normal".to_string()
    } else {
        names.join(", ")
    }
}

/// Describe a file's attribute flags as a comma-separated list.
#[cfg(not(windows))]
pub fn attribute_flags(path: &Path, metadata: &Metadata) -> String {
    let mut names = Vec::new();
    if metadata.permissions().readonly() {
        names.push("ReadOnly");
    }
    let hidden = path
        .file_name()
        .map(|n| n.to_string_lossy().starts_with('.'))
        .unwrap_or(false);
    if hidden {
        names.push("Hidden");
    }
    if metadata.file_type().is_symlink() {
        names.push("ReparsePoint");
    }
    if names.is_empty() {
        "Normal".to_string()
    } else {
        names.join(", ")
    }
}

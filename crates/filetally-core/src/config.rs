//! Walk and checksum configuration types.

use std::path::PathBuf;

use derive_builder::Builder;
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};

use crate::error::ScanError;
use crate::integrity::DEFAULT_CHUNK_SIZE;

/// Configuration for directory walks.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct ScanConfig {
    /// Roots to walk, in order.
    #[serde(default)]
    pub roots: Vec<PathBuf>,

    /// Follow symbolic links.
    #[builder(default = "false")]
    #[serde(default)]
    pub follow_symlinks: bool,

    /// Include hidden files (starting with .).
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub include_hidden: bool,

    /// Maximum depth to traverse (None = unlimited).
    #[builder(default)]
    #[serde(default)]
    pub max_depth: Option<u32>,

    /// Glob patterns matched against file and directory names.
    #[builder(default)]
    #[serde(default)]
    pub ignore_patterns: Vec<String>,

    /// Emit a progress update every this many files (0 = never).
    #[builder(default = "DEFAULT_SCAN_PROGRESS_INTERVAL")]
    #[serde(default = "default_scan_progress_interval")]
    pub progress_interval: u64,
}

/// Default number of files between walk progress updates.
pub const DEFAULT_SCAN_PROGRESS_INTERVAL: u64 = 10_000;

fn default_true() -> bool {
    true
}

fn default_scan_progress_interval() -> u64 {
    DEFAULT_SCAN_PROGRESS_INTERVAL
}

impl ScanConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        match self.roots {
            Some(ref roots) if roots.is_empty() => {
                return Err("At least one root is required".to_string());
            }
            Some(ref roots) if roots.iter().any(|r| r.as_os_str().is_empty()) => {
                return Err("Root path cannot be empty".to_string());
            }
            None => return Err("At least one root is required".to_string()),
            _ => {}
        }
        if let Some(ref patterns) = self.ignore_patterns {
            for pattern in patterns {
                Glob::new(pattern).map_err(|e| format!("Invalid ignore pattern {pattern:?}: {e}"))?;
            }
        }
        Ok(())
    }
}

impl ScanConfig {
    /// Create a new scan config builder.
    pub fn builder() -> ScanConfigBuilder {
        ScanConfigBuilder::default()
    }

    /// Create a simple config for walking a single root.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_roots(vec![root.into()])
    }

    /// Create a simple config for walking several roots in order.
    pub fn with_roots(roots: Vec<PathBuf>) -> Self {
        Self {
            roots,
            follow_symlinks: false,
            include_hidden: true,
            max_depth: None,
            ignore_patterns: Vec::new(),
            progress_interval: DEFAULT_SCAN_PROGRESS_INTERVAL,
        }
    }

    /// Compile the ignore patterns into a matcher.
    pub fn ignore_matcher(&self) -> Result<GlobSet, ScanError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &self.ignore_patterns {
            let glob = Glob::new(pattern).map_err(|e| ScanError::InvalidConfig {
                message: format!("Invalid ignore pattern {pattern:?}: {e}"),
            })?;
            builder.add(glob);
        }
        builder.build().map_err(|e| ScanError::InvalidConfig {
            message: e.to_string(),
        })
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self::new(".")
    }
}

/// Configuration for checksum runs.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct ChecksumConfig {
    /// Completed records buffered before each manifest flush.
    #[builder(default = "DEFAULT_FLUSH_INTERVAL")]
    #[serde(default = "default_flush_interval")]
    pub flush_interval: usize,

    /// Emit a progress update every this many hashed files (0 = never).
    #[builder(default = "DEFAULT_CHECKSUM_PROGRESS_INTERVAL")]
    #[serde(default = "default_checksum_progress_interval")]
    pub progress_interval: u64,

    /// Read buffer size used while hashing.
    #[builder(default = "DEFAULT_CHUNK_SIZE")]
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

/// Default number of records between manifest flushes.
pub const DEFAULT_FLUSH_INTERVAL: usize = 100;

/// Default number of hashed files between progress updates.
pub const DEFAULT_CHECKSUM_PROGRESS_INTERVAL: u64 = 100;

fn default_flush_interval() -> usize {
    DEFAULT_FLUSH_INTERVAL
}

fn default_checksum_progress_interval() -> u64 {
    DEFAULT_CHECKSUM_PROGRESS_INTERVAL
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

impl ChecksumConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if self.flush_interval == Some(0) {
            return Err("Flush interval must be at least 1".to_string());
        }
        if self.chunk_size == Some(0) {
            return Err("Chunk size must be at least 1".to_string());
        }
        Ok(())
    }
}

impl ChecksumConfig {
    /// Create a new checksum config builder.
    pub fn builder() -> ChecksumConfigBuilder {
        ChecksumConfigBuilder::default()
    }
}

impl Default for ChecksumConfig {
    fn default() -> Self {
        Self {
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            progress_interval: DEFAULT_CHECKSUM_PROGRESS_INTERVAL,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

//! Walk progress reporting.

use std::path::PathBuf;
use std::time::Duration;

/// Progress information during a walk.
#[derive(Debug, Clone)]
pub struct WalkProgress {
    /// Number of files discovered so far, across all roots.
    pub files_found: u64,
    /// Number of directories entered so far.
    pub dirs_walked: u64,
    /// Root currently being walked.
    pub current_root: PathBuf,
    /// Number of warnings (skipped subtrees, unreadable entries).
    pub warnings_count: u64,
    /// Time elapsed since the walk started.
    pub elapsed: Duration,
}

impl WalkProgress {
    /// Create initial progress state.
    pub fn new() -> Self {
        Self {
            files_found: 0,
            dirs_walked: 0,
            current_root: PathBuf::new(),
            warnings_count: 0,
            elapsed: Duration::ZERO,
        }
    }

    /// Calculate discovery rate in files per second.
    pub fn files_per_second(&self) -> f64 {
        if self.elapsed.as_secs_f64() > 0.0 {
            self.files_found as f64 / self.elapsed.as_secs_f64()
        } else {
            0.0
        }
    }
}

impl Default for WalkProgress {
    fn default() -> Self {
        Self::new()
    }
}

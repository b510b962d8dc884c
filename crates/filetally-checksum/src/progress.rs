//! Progress reporting types for checksum runs.

use std::path::PathBuf;
use std::time::Duration;

/// Progress information for an ongoing checksum run.
#[derive(Debug, Clone, Default)]
pub struct ChecksumProgress {
    /// Files hashed (or recorded as errors) during this run.
    pub files_hashed: u64,
    /// Files this run set out to process.
    pub files_total: u64,
    /// Files already present in the manifest before this run started.
    pub already_processed: u64,
    /// Files recorded with the error sentinel during this run.
    pub errors: u64,
    /// Bytes of file content hashed during this run.
    pub bytes_hashed: u64,
    /// The file most recently processed.
    pub current_file: Option<PathBuf>,
    /// Time since the run started.
    pub elapsed: Duration,
}

impl ChecksumProgress {
    /// Get the progress as a percentage (0.0 to 100.0).
    pub fn percentage(&self) -> f64 {
        if self.files_total > 0 {
            (self.files_hashed as f64 / self.files_total as f64) * 100.0
        } else {
            100.0
        }
    }

    /// Calculate files hashed per second.
    pub fn files_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.files_hashed as f64 / secs
        } else {
            0.0
        }
    }
}

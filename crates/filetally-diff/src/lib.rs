//! Manifest comparison for filetally.
//!
//! Compares two manifests of the same kind and classifies every difference
//! as `ADDED`, `MISSING` or `CHANGED`:
//!
//! - **Path lists**: paths only in the newer list are added, paths only in
//!   the older list are missing.
//! - **Checksum manifests**: additionally, paths in both with different
//!   checksums are changed. Unchanged paths are omitted.
//!
//! Paths match case-insensitively. Output is ordered by status, then path.
//!
//! ```rust,ignore
//! use filetally_diff::{DiffEngine, export_report};
//!
//! let report = DiffEngine::new().compare_files("old.checksums.csv", "new.checksums.csv")?;
//! for entry in &report.entries {
//!     println!("{} {} ({})", entry.status, entry.path, entry.detail);
//! }
//! export_report(&report.entries, "diff.csv")?;
//! ```

mod diff;
mod error;
mod report;

pub use diff::{DiffEngine, DiffEntry, DiffReport, DiffStatus, diff_texts};
pub use error::DiffError;
pub use report::{REPORT_HEADER, export_report, render_report};

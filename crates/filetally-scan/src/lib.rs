//! Directory walking for filetally.
//!
//! This crate enumerates the files under one or more roots using jwalk.
//!
//! # Overview
//!
//! - **Lazy**: [`DirectoryWalker::walk`] yields absolute file paths one at a time
//! - **Fault tolerant**: unreadable directories become [`ScanWarning`]s and
//!   only their subtree is skipped
//! - **Deterministic**: entries are visited serially in sorted order, roots in
//!   the order given
//! - **Progress updates** via broadcast channels every `progress_interval` files
//!
//! # Example
//!
//! ```rust,no_run
//! use filetally_scan::{DirectoryWalker, ScanConfig};
//!
//! let walker = DirectoryWalker::new(ScanConfig::new("/path/to/scan")).unwrap();
//! let mut progress_rx = walker.subscribe();
//!
//! for path in walker.walk() {
//!     println!("{}", path.display());
//! }
//! while let Ok(progress) = progress_rx.try_recv() {
//!     println!("Found {} files", progress.files_found);
//! }
//! ```

mod progress;
mod walker;

pub use progress::WalkProgress;
pub use walker::{DirectoryWalker, Walk, WalkSummary};

// Re-export core types for convenience
pub use filetally_core::{ScanConfig, ScanError, ScanWarning, WarningKind};

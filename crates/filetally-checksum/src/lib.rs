//! Resumable checksum manifests for filetally.
//!
//! [`ChecksumEngine`] hashes a list of candidate paths into a checksum
//! manifest, appending in durable batches so that a run can be paused,
//! killed or crash at any point and pick up where the manifest leaves off.
//! [`ScanSession`] wraps it with a directory walk, a persisted candidate
//! list and a resume pointer.
//!
//! # Example
//!
//! ```no_run
//! use filetally_checksum::{ScanSession, SessionConfig, SessionMode, Services};
//! use filetally_core::ScanConfig;
//! use tokio_util::sync::CancellationToken;
//!
//! let config = SessionConfig::new("/var/lib/filetally/out")
//!     .with_scan(ScanConfig::new("/home/user/photos"));
//! let session = ScanSession::new(config, Services::in_dir("/var/lib/filetally"))?;
//! let outcome = session.run(SessionMode::Auto, &CancellationToken::new())?;
//! println!("{}", outcome.status);
//! # Ok::<(), filetally_checksum::SessionError>(())
//! ```

mod engine;
mod error;
mod guard;
mod progress;
mod runner;
mod services;
mod session;

pub use engine::{
    CHECKSUM_MANIFEST_SUFFIX, ChecksumEngine, ChecksumJob, EngineReport, RunStatus,
    checksum_manifest_path, processed_paths,
};
pub use error::{EngineError, SessionError};
pub use guard::{RunGuard, RunRegistry};
pub use progress::ChecksumProgress;
pub use runner::{ChecksumEvent, EVENT_CHANNEL_SIZE, SessionEvent, start_checksum, start_session};
pub use services::{
    FileResumeStore, HISTORY_FILE, HistoryEntry, JsonHistory, MAX_HISTORY_ENTRIES,
    ManifestHistory, MemoryResumeStore, NoopHistory, RESUME_STATE_FILE, ResumeStore, Services,
};
pub use session::{
    CANDIDATE_LIST_TIME_FORMAT, ScanSession, SessionConfig, SessionMode, SessionOutcome,
    SessionStatus, candidate_list_name,
};

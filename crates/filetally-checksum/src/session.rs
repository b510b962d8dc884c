//! Scan sessions: walk, persist the candidate list, then checksum it.
//!
//! A session survives pauses and process restarts. The candidate list is
//! written before any hashing starts and its path is handed to the
//! [`ResumeStore`](crate::ResumeStore); the checksum manifest next to it
//! records which candidates are done.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Local};
use serde::Serialize;
use strum::Display;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use filetally_core::{
    ChecksumConfig, ManifestError, ManifestKind, ManifestWriter, ScanConfig, ScanWarning,
    integrity,
};
use filetally_scan::DirectoryWalker;

use crate::engine::{ChecksumEngine, ChecksumJob, EngineReport, RunStatus, checksum_manifest_path};
use crate::error::SessionError;
use crate::services::Services;

/// Timestamp pattern embedded in candidate list names.
pub const CANDIDATE_LIST_TIME_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Paths written to the candidate list per append.
const LIST_BATCH_SIZE: usize = 10_000;

/// File name of the candidate list for a scan started at `started`.
pub fn candidate_list_name(started: DateTime<Local>) -> String {
    format!("scan_{}.csv", started.format(CANDIDATE_LIST_TIME_FORMAT))
}

/// Create a candidate list in `dir` under a name no earlier scan has used.
///
/// Scans started within the same second get `_1`, `_2`, ... suffixes. A name
/// is also passed over when a checksum manifest for it already exists.
fn claim_candidate_list(
    dir: &Path,
    started: DateTime<Local>,
) -> Result<(PathBuf, ManifestWriter), ManifestError> {
    let stamp = started.format(CANDIDATE_LIST_TIME_FORMAT).to_string();
    let mut attempt = 0u32;
    loop {
        let name = match attempt {
            0 => candidate_list_name(started),
            n => format!("scan_{stamp}_{n}.csv"),
        };
        attempt += 1;
        let list = dir.join(name);
        if checksum_manifest_path(&list).exists() {
            continue;
        }
        match ManifestWriter::create_new(ManifestKind::SimpleList, &list) {
            Ok(writer) => return Ok((list, writer)),
            Err(ManifestError::Io { source, .. }) if source.kind() == ErrorKind::AlreadyExists => {}
            Err(e) => return Err(e),
        }
    }
}

/// Configuration for a [`ScanSession`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Directory that receives candidate lists and checksum manifests.
    pub output_dir: PathBuf,
    /// Walk settings. Only needed for fresh scans.
    pub scan: Option<ScanConfig>,
    /// Checksum run settings.
    pub checksum: ChecksumConfig,
}

impl SessionConfig {
    /// Session writing into `output_dir` with default checksum settings and no roots.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            scan: None,
            checksum: ChecksumConfig::default(),
        }
    }

    /// Set the walk configuration.
    pub fn with_scan(mut self, scan: ScanConfig) -> Self {
        self.scan = Some(scan);
        self
    }

    /// Set the checksum configuration.
    pub fn with_checksum(mut self, checksum: ChecksumConfig) -> Self {
        self.checksum = checksum;
        self
    }
}

/// Which way a session should start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionMode {
    /// Resume an interrupted session if there is one, otherwise scan.
    #[default]
    Auto,
    /// Always walk the roots again.
    Fresh,
    /// Only resume; fail if there is nothing to resume.
    Resume,
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
pub enum SessionStatus {
    /// The checksum manifest covers every candidate.
    Completed,
    /// Hashing was paused; the session can be resumed.
    Paused,
    /// The walk was cancelled before a candidate list was written.
    WalkCancelled,
}

/// Result of one session run.
#[derive(Debug, Clone, Serialize)]
pub struct SessionOutcome {
    /// How the session ended.
    pub status: SessionStatus,
    /// Whether an interrupted session was picked up instead of walking.
    pub resumed: bool,
    /// Candidate list used by the session.
    pub candidate_list: Option<PathBuf>,
    /// The checksum run, if one happened.
    pub report: Option<EngineReport>,
    /// Files discovered by the walk (zero when resuming).
    pub files_found: u64,
    /// Non-fatal walk problems.
    pub warnings: Vec<ScanWarning>,
    /// Time spent walking.
    pub walk_duration: Duration,
}

impl SessionOutcome {
    fn checksummed(
        candidate_list: PathBuf,
        report: EngineReport,
        resumed: bool,
    ) -> Self {
        let status = match report.status {
            RunStatus::Completed => SessionStatus::Completed,
            RunStatus::Paused => SessionStatus::Paused,
        };
        Self {
            status,
            resumed,
            candidate_list: Some(candidate_list),
            report: Some(report),
            files_found: 0,
            warnings: Vec::new(),
            walk_duration: Duration::ZERO,
        }
    }

    /// Checksum manifest produced by the session, if any.
    pub fn output_manifest(&self) -> Option<&Path> {
        self.report.as_ref().map(|r| r.output.as_path())
    }
}

/// Drives one walk-then-checksum workflow at a time.
pub struct ScanSession {
    output_dir: PathBuf,
    walker: Option<DirectoryWalker>,
    engine: ChecksumEngine,
    services: Services,
}

impl ScanSession {
    /// Create a session. Fails only when the walk configuration is invalid.
    pub fn new(config: SessionConfig, services: Services) -> Result<Self, SessionError> {
        let walker = config.scan.map(DirectoryWalker::new).transpose()?;
        Ok(Self {
            output_dir: config.output_dir,
            walker,
            engine: ChecksumEngine::new(config.checksum, services.clone()),
            services,
        })
    }

    /// Directory receiving this session's manifests.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// The walker, when roots are configured.
    pub fn walker(&self) -> Option<&DirectoryWalker> {
        self.walker.as_ref()
    }

    /// The checksum engine.
    pub fn engine(&self) -> &ChecksumEngine {
        &self.engine
    }

    /// Candidate list of an interrupted session, if it still exists.
    ///
    /// A pointer to a list that has since been deleted is cleared.
    pub fn pending(&self) -> Option<PathBuf> {
        let list = self.services.resume.read()?;
        if list.is_file() {
            return Some(list);
        }
        warn!(list = %list.display(), "resume state points at a missing candidate list, discarding it");
        if let Err(e) = self.services.resume.clear() {
            warn!(error = %e, "failed to clear resume state");
        }
        None
    }

    /// Run the session until it completes or `cancel` fires.
    pub fn run(
        &self,
        mode: SessionMode,
        cancel: &CancellationToken,
    ) -> Result<SessionOutcome, SessionError> {
        match mode {
            SessionMode::Fresh => self.scan_fresh(cancel),
            SessionMode::Resume => {
                let list = self.pending().ok_or(SessionError::NothingToResume)?;
                self.resume_from(list, cancel)
            }
            SessionMode::Auto => match self.pending() {
                Some(list) => self.resume_from(list, cancel),
                None => self.scan_fresh(cancel),
            },
        }
    }

    fn resume_from(
        &self,
        list: PathBuf,
        cancel: &CancellationToken,
    ) -> Result<SessionOutcome, SessionError> {
        info!(list = %list.display(), "resuming session");
        let job = ChecksumJob::from_list(&list)?;
        let report = self.engine.run(&job, cancel)?;
        Ok(SessionOutcome::checksummed(list, report, true))
    }

    fn scan_fresh(&self, cancel: &CancellationToken) -> Result<SessionOutcome, SessionError> {
        let walker = self.walker.as_ref().ok_or(SessionError::NoRoots)?;
        fs::create_dir_all(&self.output_dir)
            .map_err(|e| ManifestError::io(&self.output_dir, e))?;

        let started = Local::now();
        let mut walk = walker.walk();
        let mut files = Vec::new();
        loop {
            if cancel.is_cancelled() {
                info!(files = files.len(), "walk cancelled, nothing persisted");
                return Ok(SessionOutcome {
                    status: SessionStatus::WalkCancelled,
                    resumed: false,
                    candidate_list: None,
                    report: None,
                    files_found: walk.files_found(),
                    warnings: walk.into_warnings(),
                    walk_duration: elapsed_since(started),
                });
            }
            let Some(path) = walk.next() else { break };
            files.push(path.to_string_lossy().into_owned());
        }
        let files_found = walk.files_found();
        let warnings = walk.into_warnings();
        let walk_duration = elapsed_since(started);
        info!(
            files = files_found,
            warnings = warnings.len(),
            "walk finished"
        );

        let (list, writer) = claim_candidate_list(&self.output_dir, started)?;
        self.write_candidate_list(writer, &list, &files)?;

        let job = ChecksumJob {
            candidates: files,
            output: checksum_manifest_path(&list),
            candidate_list: Some(list.clone()),
        };
        let report = self.engine.run(&job, cancel)?;

        let mut outcome = SessionOutcome::checksummed(list, report, false);
        outcome.files_found = files_found;
        outcome.warnings = warnings;
        outcome.walk_duration = walk_duration;
        Ok(outcome)
    }

    fn write_candidate_list(
        &self,
        mut writer: ManifestWriter,
        list: &Path,
        files: &[String],
    ) -> Result<(), ManifestError> {
        for chunk in files.chunks(LIST_BATCH_SIZE) {
            writer.append_paths(chunk)?;
        }
        drop(writer);

        self.services
            .history
            .record_manifest_created(list, ManifestKind::SimpleList);
        if let Err(e) = integrity::write_sidecar(list) {
            warn!(list = %list.display(), error = %e, "failed to write candidate list sidecar");
        }
        if let Err(e) = self.services.resume.write(list) {
            warn!(list = %list.display(), error = %e, "failed to persist resume state");
        }
        info!(list = %list.display(), files = files.len(), "wrote candidate list");
        Ok(())
    }
}

impl std::fmt::Debug for ScanSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanSession")
            .field("output_dir", &self.output_dir)
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}

fn elapsed_since(started: DateTime<Local>) -> Duration {
    (Local::now() - started).to_std().unwrap_or_default()
}

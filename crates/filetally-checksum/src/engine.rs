//! Resumable checksum engine.
//!
//! The engine turns a list of candidate paths into a checksum manifest.
//! The manifest on disk is the only progress record: a run reopens it,
//! re-derives which paths are done, and appends the rest in batches.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::Serialize;
use strum::Display;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use filetally_core::manifest::{
    ManifestWriter, detect_kind, for_each_entry, read_entries, unsupported_path,
};
use filetally_core::{
    ChecksumConfig, FileRecord, IntegrityError, ManifestError, ManifestKind, integrity, path_key,
};

use crate::error::EngineError;
use crate::progress::ChecksumProgress;
use crate::services::Services;

/// Suffix that replaces `.csv` on a candidate list to name its checksum manifest.
pub const CHECKSUM_MANIFEST_SUFFIX: &str = ".checksums.csv";

/// Name of the checksum manifest produced from a candidate list.
///
/// `scan_20240101_120000.csv` becomes `scan_20240101_120000.checksums.csv`.
pub fn checksum_manifest_path(candidate_list: &Path) -> PathBuf {
    let name = candidate_list
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = if name.to_ascii_lowercase().ends_with(".csv") {
        &name[..name.len() - 4]
    } else {
        name.as_str()
    };
    candidate_list.with_file_name(format!("{stem}{CHECKSUM_MANIFEST_SUFFIX}"))
}

/// What a checksum run should process and where it writes.
#[derive(Debug, Clone)]
pub struct ChecksumJob {
    /// Candidate paths in processing order. Duplicates are processed once.
    pub candidates: Vec<String>,
    /// Checksum manifest to create or resume.
    pub output: PathBuf,
    /// Candidate list the job was loaded from, if any.
    ///
    /// When set and the run completes, a resume pointer naming this list is cleared.
    pub candidate_list: Option<PathBuf>,
}

impl ChecksumJob {
    /// A job over in-memory candidates.
    pub fn new(candidates: Vec<String>, output: impl Into<PathBuf>) -> Self {
        Self {
            candidates,
            output: output.into(),
            candidate_list: None,
        }
    }

    /// Load candidates from a candidate list, writing to its sibling checksum manifest.
    pub fn from_list(candidate_list: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let list = candidate_list.as_ref();
        Self::from_list_to(list, checksum_manifest_path(list))
    }

    /// Load candidates from a candidate list, writing to `output`.
    pub fn from_list_to(
        candidate_list: impl AsRef<Path>,
        output: impl Into<PathBuf>,
    ) -> Result<Self, ManifestError> {
        let list = candidate_list.as_ref();
        let (entries, _) = read_entries(list, ManifestKind::SimpleList)?;
        Ok(Self {
            candidates: entries.into_iter().map(|e| e.path).collect(),
            output: output.into(),
            candidate_list: Some(list.to_path_buf()),
        })
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
pub enum RunStatus {
    /// Every candidate has a row in the manifest.
    Completed,
    /// Cancellation stopped the run; the manifest holds everything done so far.
    Paused,
}

/// Summary of one checksum run.
#[derive(Debug, Clone, Serialize)]
pub struct EngineReport {
    /// Manifest written to.
    pub output: PathBuf,
    /// How the run ended.
    pub status: RunStatus,
    /// Distinct candidate paths.
    pub candidates: u64,
    /// Candidates already in the manifest when the run started.
    pub already_processed: u64,
    /// Candidates left out because their names cannot be stored in a manifest row.
    pub skipped: u64,
    /// Rows appended by this run, including error rows.
    pub hashed: u64,
    /// Error rows appended by this run.
    pub errors: u64,
    /// Bytes of file content hashed by this run.
    pub bytes_hashed: u64,
    /// Candidates still missing from the manifest.
    pub remaining: u64,
    /// Wall-clock duration of the run.
    pub duration: Duration,
}

impl EngineReport {
    /// Whether the manifest now covers every candidate.
    pub fn is_complete(&self) -> bool {
        self.status == RunStatus::Completed
    }
}

/// Computes checksum manifests, one run at a time per manifest.
pub struct ChecksumEngine {
    config: ChecksumConfig,
    services: Services,
    progress_tx: broadcast::Sender<ChecksumProgress>,
}

impl ChecksumEngine {
    /// Create an engine with the given configuration and collaborators.
    pub fn new(config: ChecksumConfig, services: Services) -> Self {
        let (progress_tx, _) = broadcast::channel(100);
        Self {
            config,
            services,
            progress_tx,
        }
    }

    /// The engine's configuration.
    pub fn config(&self) -> &ChecksumConfig {
        &self.config
    }

    /// The engine's collaborators.
    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Subscribe to progress updates.
    pub fn subscribe(&self) -> broadcast::Receiver<ChecksumProgress> {
        self.progress_tx.subscribe()
    }

    /// Run `job` until every candidate is recorded or `cancel` fires.
    ///
    /// Cancellation is checked before each file; the file being hashed when
    /// it fires is finished and recorded. A cancelled token stays cancelled,
    /// so each run needs a fresh one.
    pub fn run(
        &self,
        job: &ChecksumJob,
        cancel: &CancellationToken,
    ) -> Result<EngineReport, EngineError> {
        self.run_with_observer(job, cancel, |_| {})
    }

    /// Like [`run`](Self::run), calling `observer` after every processed file.
    pub fn run_with_observer<F>(
        &self,
        job: &ChecksumJob,
        cancel: &CancellationToken,
        mut observer: F,
    ) -> Result<EngineReport, EngineError>
    where
        F: FnMut(&ChecksumProgress),
    {
        let _guard = self
            .services
            .runs
            .try_acquire(&job.output)
            .ok_or_else(|| EngineError::AlreadyRunning {
                path: job.output.clone(),
            })?;
        let start = Instant::now();
        let output = job.output.as_path();

        let existing = fs::metadata(output).map(|m| m.len() > 0).unwrap_or(false);
        if existing {
            check_kind(output)?;
        }
        let mut writer = ManifestWriter::open(ManifestKind::ChecksumManifest, output)?;
        let processed = if existing {
            processed_paths(output)?
        } else {
            self.services
                .history
                .record_manifest_created(output, ManifestKind::ChecksumManifest);
            HashSet::new()
        };

        let plan = Plan::new(&job.candidates, &processed);
        info!(
            output = %output.display(),
            candidates = plan.candidates,
            already_processed = plan.already_processed,
            skipped = plan.skipped,
            remaining = plan.remaining.len(),
            "starting checksum run"
        );

        let mut progress = ChecksumProgress {
            files_total: plan.remaining.len() as u64,
            already_processed: plan.already_processed,
            ..Default::default()
        };
        let flush_interval = self.config.flush_interval.max(1);
        let mut batch: Vec<FileRecord> = Vec::with_capacity(flush_interval);
        let mut status = RunStatus::Completed;

        for path in &plan.remaining {
            if cancel.is_cancelled() {
                status = RunStatus::Paused;
                break;
            }

            let record = self.compute_record(Path::new(path));
            progress.files_hashed += 1;
            if record.checksum.is_error() {
                progress.errors += 1;
            } else {
                progress.bytes_hashed += record.size;
            }
            progress.current_file = Some(record.path.clone());
            batch.push(record);

            if batch.len() >= flush_interval {
                flush(&mut writer, &mut batch)?;
            }

            progress.elapsed = start.elapsed();
            let interval = self.config.progress_interval;
            if interval > 0 && progress.files_hashed % interval == 0 {
                let _ = self.progress_tx.send(progress.clone());
            }
            observer(&progress);
        }

        flush(&mut writer, &mut batch)?;
        drop(writer);

        progress.elapsed = start.elapsed();
        let _ = self.progress_tx.send(progress.clone());

        if status == RunStatus::Completed {
            self.finish(job)?;
        }

        let report = EngineReport {
            output: job.output.clone(),
            status,
            candidates: plan.candidates,
            already_processed: plan.already_processed,
            skipped: plan.skipped,
            hashed: progress.files_hashed,
            errors: progress.errors,
            bytes_hashed: progress.bytes_hashed,
            remaining: plan.remaining.len() as u64 - progress.files_hashed,
            duration: start.elapsed(),
        };
        info!(
            output = %output.display(),
            %status,
            hashed = report.hashed,
            errors = report.errors,
            remaining = report.remaining,
            "checksum run finished"
        );
        Ok(report)
    }

    fn compute_record(&self, path: &Path) -> FileRecord {
        let result = fs::metadata(path)
            .map_err(|e| IntegrityError::io(path, e))
            .and_then(|metadata| {
                let digest = integrity::hash_file_with_chunk(path, self.config.chunk_size)?;
                Ok(FileRecord::new(path, digest, &metadata))
            });
        result.unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "recording file as unreadable");
            FileRecord::error(path)
        })
    }

    fn finish(&self, job: &ChecksumJob) -> Result<(), EngineError> {
        integrity::write_sidecar(&job.output)?;

        let Some(list) = job.candidate_list.as_deref() else {
            return Ok(());
        };
        let pointer = self.services.resume.read();
        if pointer.as_deref().is_some_and(|p| same_path(p, list)) {
            match self.services.resume.clear() {
                Ok(()) => debug!(list = %list.display(), "cleared resume state"),
                Err(e) => warn!(error = %e, "failed to clear resume state"),
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for ChecksumEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChecksumEngine")
            .field("config", &self.config)
            .field("services", &self.services)
            .finish_non_exhaustive()
    }
}

/// Case-insensitive keys of every path with a complete row in `manifest`.
pub fn processed_paths(manifest: impl AsRef<Path>) -> Result<HashSet<String>, ManifestError> {
    let mut processed = HashSet::new();
    for_each_entry(manifest, ManifestKind::ChecksumManifest, |entry| {
        processed.insert(path_key(&entry.path));
    })?;
    Ok(processed)
}

fn check_kind(output: &Path) -> Result<(), ManifestError> {
    match detect_kind(output) {
        Ok(ManifestKind::ChecksumManifest) => Ok(()),
        Ok(found) => Err(ManifestError::KindMismatch {
            expected: ManifestKind::ChecksumManifest,
            found,
        }),
        Err(ManifestError::MissingHeader { path }) => {
            warn!(path = %path.display(), "resuming a manifest without a header row");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

fn flush(writer: &mut ManifestWriter, batch: &mut Vec<FileRecord>) -> Result<(), ManifestError> {
    if batch.is_empty() {
        return Ok(());
    }
    writer.append_batch(batch)?;
    debug!(rows = batch.len(), "flushed manifest batch");
    batch.clear();
    Ok(())
}

fn same_path(a: &Path, b: &Path) -> bool {
    path_key(&a.to_string_lossy()) == path_key(&b.to_string_lossy())
}

/// Candidates split into work still to do, in candidate order.
struct Plan<'a> {
    candidates: u64,
    already_processed: u64,
    skipped: u64,
    remaining: Vec<&'a str>,
}

impl<'a> Plan<'a> {
    fn new(candidates: &'a [String], processed: &HashSet<String>) -> Self {
        let mut seen = HashSet::new();
        let mut plan = Plan {
            candidates: 0,
            already_processed: 0,
            skipped: 0,
            remaining: Vec::new(),
        };
        for candidate in candidates {
            if candidate.trim().is_empty() {
                continue;
            }
            let key = path_key(candidate);
            if !seen.insert(key.clone()) {
                continue;
            }
            plan.candidates += 1;
            if let Some(reason) = unsupported_path(candidate) {
                warn!(path = ?candidate, reason, "skipping candidate");
                plan.skipped += 1;
            } else if processed.contains(&key) {
                plan.already_processed += 1;
            } else {
                plan.remaining.push(candidate.as_str());
            }
        }
        plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn engine(flush_interval: usize) -> ChecksumEngine {
        let config = ChecksumConfig::builder()
            .flush_interval(flush_interval)
            .progress_interval(1u64)
            .build()
            .unwrap();
        ChecksumEngine::new(config, Services::detached())
    }

    fn write_files(dir: &Path, names: &[&str]) -> Vec<String> {
        names
            .iter()
            .map(|name| {
                let path = dir.join(name);
                fs::write(&path, name.as_bytes()).unwrap();
                path.to_string_lossy().into_owned()
            })
            .collect()
    }

    fn manifest_paths(path: &Path) -> Vec<String> {
        read_entries(path, ManifestKind::ChecksumManifest)
            .unwrap()
            .0
            .into_iter()
            .map(|e| e.path)
            .collect()
    }

    #[test]
    fn test_checksum_manifest_path() {
        assert_eq!(
            checksum_manifest_path(Path::new("/out/scan_20240101_120000.csv")),
            PathBuf::from("/out/scan_20240101_120000.checksums.csv")
        );
        assert_eq!(
            checksum_manifest_path(Path::new("/out/list.CSV")),
            PathBuf::from("/out/list.checksums.csv")
        );
        assert_eq!(
            checksum_manifest_path(Path::new("/out/list.txt")),
            PathBuf::from("/out/list.txt.checksums.csv")
        );
    }

    #[test]
    fn test_complete_run_writes_every_row_and_sidecar() {
        let temp = TempDir::new().unwrap();
        let candidates = write_files(temp.path(), &["a", "b", "c"]);
        let output = temp.path().join("out.checksums.csv");

        let report = engine(2)
            .run(&ChecksumJob::new(candidates.clone(), &output), &CancellationToken::new())
            .unwrap();

        assert!(report.is_complete());
        assert_eq!(report.hashed, 3);
        assert_eq!(report.remaining, 0);
        assert_eq!(manifest_paths(&output), candidates);
        assert!(integrity::verify_sidecar(&output).unwrap());
    }

    #[test]
    fn test_pause_after_first_file_then_resume() {
        let temp = TempDir::new().unwrap();
        let candidates = write_files(temp.path(), &["a", "b", "c"]);
        let output = temp.path().join("out.checksums.csv");
        let job = ChecksumJob::new(candidates.clone(), &output);
        let engine = engine(100);

        let cancel = CancellationToken::new();
        let report = engine
            .run_with_observer(&job, &cancel, |_| cancel.cancel())
            .unwrap();
        assert_eq!(report.status, RunStatus::Paused);
        assert_eq!(report.hashed, 1);
        assert_eq!(report.remaining, 2);
        assert_eq!(manifest_paths(&output), candidates[..1]);
        assert!(!integrity::sidecar_path(&output).exists());

        let report = engine.run(&job, &CancellationToken::new()).unwrap();
        assert!(report.is_complete());
        assert_eq!(report.already_processed, 1);
        assert_eq!(report.hashed, 2);
        assert_eq!(manifest_paths(&output), candidates);
    }

    #[test]
    fn test_already_cancelled_token_appends_nothing() {
        let temp = TempDir::new().unwrap();
        let candidates = write_files(temp.path(), &["a"]);
        let output = temp.path().join("out.checksums.csv");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = engine(1)
            .run(&ChecksumJob::new(candidates, &output), &cancel)
            .unwrap();

        assert_eq!(report.status, RunStatus::Paused);
        assert_eq!(report.hashed, 0);
        assert_eq!(
            fs::read_to_string(&output).unwrap(),
            format!("{}\n", ManifestKind::ChecksumManifest.header())
        );
    }

    #[test]
    fn test_unreadable_candidate_becomes_error_row() {
        let temp = TempDir::new().unwrap();
        let mut candidates = write_files(temp.path(), &["a"]);
        let gone = temp.path().join("gone").to_string_lossy().into_owned();
        candidates.push(gone.clone());
        let output = temp.path().join("out.checksums.csv");

        let report = engine(1)
            .run(&ChecksumJob::new(candidates, &output), &CancellationToken::new())
            .unwrap();

        assert!(report.is_complete());
        assert_eq!(report.errors, 1);
        let (entries, _) = read_entries(&output, ManifestKind::ChecksumManifest).unwrap();
        assert_eq!(entries[1].path, gone);
        assert_eq!(entries[1].checksum.as_deref(), Some("ERROR"));
    }

    #[test]
    fn test_name_with_surrounding_spaces_is_hashed() {
        let temp = TempDir::new().unwrap();
        let candidates = write_files(temp.path(), &["notes ", " lead"]);
        let list = temp.path().join("list.csv");
        ManifestWriter::create(ManifestKind::SimpleList, &list)
            .unwrap()
            .append_paths(&candidates)
            .unwrap();

        let job = ChecksumJob::from_list(&list).unwrap();
        assert_eq!(job.candidates, candidates);
        let report = engine(1).run(&job, &CancellationToken::new()).unwrap();

        assert_eq!(report.errors, 0);
        assert_eq!(report.hashed, 2);
        let (entries, _) = read_entries(&job.output, ManifestKind::ChecksumManifest).unwrap();
        assert_eq!(entries[0].path, candidates[0]);
        assert_eq!(
            entries[0].checksum.as_deref(),
            Some(integrity::hash_file(&candidates[0]).unwrap().as_str())
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_unstorable_names_are_skipped_across_resume() {
        let temp = TempDir::new().unwrap();
        let candidates = write_files(temp.path(), &["line\nbreak", "quote\",comma", "plain", "zed"]);
        let output = temp.path().join("out.checksums.csv");
        let job = ChecksumJob::new(candidates.clone(), &output);
        let engine = engine(1);

        let cancel = CancellationToken::new();
        let report = engine
            .run_with_observer(&job, &cancel, |_| cancel.cancel())
            .unwrap();
        assert_eq!(report.status, RunStatus::Paused);
        assert_eq!(report.skipped, 2);
        assert_eq!(report.hashed, 1);

        let report = engine.run(&job, &CancellationToken::new()).unwrap();
        assert!(report.is_complete());
        assert_eq!(report.already_processed, 1);
        assert_eq!(report.skipped, 2);
        assert_eq!(report.hashed, 1);

        let (entries, stats) = read_entries(&output, ManifestKind::ChecksumManifest).unwrap();
        assert_eq!(stats.malformed, 0);
        let paths: Vec<&str> = entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec![candidates[2].as_str(), candidates[3].as_str()]);
    }

    #[test]
    fn test_duplicate_candidates_processed_once() {
        let temp = TempDir::new().unwrap();
        let candidates = write_files(temp.path(), &["a"]);
        let twice = vec![candidates[0].clone(), candidates[0].to_uppercase(), candidates[0].clone()];
        let output = temp.path().join("out.checksums.csv");

        let report = engine(1)
            .run(&ChecksumJob::new(twice, &output), &CancellationToken::new())
            .unwrap();

        assert_eq!(report.candidates, 1);
        assert_eq!(manifest_paths(&output).len(), 1);
    }

    #[test]
    fn test_nothing_remaining_completes_without_appending() {
        let temp = TempDir::new().unwrap();
        let candidates = write_files(temp.path(), &["a", "b"]);
        let output = temp.path().join("out.checksums.csv");
        let engine = engine(10);
        engine
            .run(&ChecksumJob::new(candidates.clone(), &output), &CancellationToken::new())
            .unwrap();
        let before = fs::read_to_string(&output).unwrap();

        let report = engine
            .run(&ChecksumJob::new(candidates, &output), &CancellationToken::new())
            .unwrap();

        assert!(report.is_complete());
        assert_eq!(report.hashed, 0);
        assert_eq!(report.already_processed, 2);
        assert_eq!(fs::read_to_string(&output).unwrap(), before);
    }

    #[test]
    fn test_resume_repairs_torn_tail_and_reprocesses_torn_row() {
        let temp = TempDir::new().unwrap();
        let candidates = write_files(temp.path(), &["a", "b"]);
        let output = temp.path().join("out.checksums.csv");
        let mut writer = ManifestWriter::open(ManifestKind::ChecksumManifest, &output).unwrap();
        writer
            .append(&FileRecord::new(
                &candidates[0],
                integrity::hash_file(&candidates[0]).unwrap(),
                &fs::metadata(&candidates[0]).unwrap(),
            ))
            .unwrap();
        drop(writer);
        let mut text = fs::read_to_string(&output).unwrap();
        text.push_str(&format!("\"{}\",abc", candidates[1]));
        fs::write(&output, text).unwrap();

        let report = engine(10)
            .run(&ChecksumJob::new(candidates.clone(), &output), &CancellationToken::new())
            .unwrap();

        assert_eq!(report.already_processed, 1);
        assert_eq!(report.hashed, 1);
        assert_eq!(manifest_paths(&output), candidates);
    }

    #[test]
    fn test_rejects_candidate_list_as_output() {
        let temp = TempDir::new().unwrap();
        let output = temp.path().join("list.csv");
        ManifestWriter::create(ManifestKind::SimpleList, &output)
            .unwrap()
            .append_paths(["/x"])
            .unwrap();

        let err = engine(1)
            .run(&ChecksumJob::new(vec!["/x".into()], &output), &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Manifest(ManifestError::KindMismatch { .. })
        ));
    }

    #[test]
    fn test_concurrent_run_is_rejected() {
        let temp = TempDir::new().unwrap();
        let output = temp.path().join("out.checksums.csv");
        let engine = engine(1);
        let _held = engine.services().runs.try_acquire(&output).unwrap();

        let err = engine
            .run(&ChecksumJob::new(Vec::new(), &output), &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, EngineError::AlreadyRunning { .. }));
        assert!(!output.exists());
    }

    #[test]
    fn test_completion_clears_matching_resume_pointer() {
        let temp = TempDir::new().unwrap();
        let candidates = write_files(temp.path(), &["a"]);
        let list = temp.path().join("scan_20240101_000000.csv");
        ManifestWriter::create(ManifestKind::SimpleList, &list)
            .unwrap()
            .append_paths(&candidates)
            .unwrap();
        let engine = engine(1);
        engine.services().resume.write(&list).unwrap();

        let job = ChecksumJob::from_list(&list).unwrap();
        assert_eq!(job.output, checksum_manifest_path(&list));
        engine.run(&job, &CancellationToken::new()).unwrap();

        assert!(engine.services().resume.read().is_none());
    }

    #[test]
    fn test_progress_is_broadcast() {
        let temp = TempDir::new().unwrap();
        let candidates = write_files(temp.path(), &["a", "b"]);
        let output = temp.path().join("out.checksums.csv");
        let engine = engine(1);
        let mut rx = engine.subscribe();

        engine
            .run(&ChecksumJob::new(candidates, &output), &CancellationToken::new())
            .unwrap();

        let mut hashed = Vec::new();
        while let Ok(progress) = rx.try_recv() {
            hashed.push(progress.files_hashed);
        }
        // One update per file plus the final update.
        assert_eq!(hashed, vec![1, 2, 2]);
    }
}

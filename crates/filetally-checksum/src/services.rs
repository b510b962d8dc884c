//! Collaborators the engine and session talk to: manifest history and resume state.
//!
//! These are explicit service objects constructed once and handed to a
//! [`ScanSession`](crate::ScanSession) or [`ChecksumEngine`](crate::ChecksumEngine).

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use filetally_core::{ManifestKind, integrity};

use crate::guard::RunRegistry;

/// File name of the resume-state pointer inside the state directory.
pub const RESUME_STATE_FILE: &str = "last_active_scan.txt";

/// File name of the manifest history inside the state directory.
pub const HISTORY_FILE: &str = "scan_history.json";

/// Maximum number of entries kept in the history.
pub const MAX_HISTORY_ENTRIES: usize = 50;

/// Receives a note every time a new manifest file is created.
pub trait ManifestHistory: Send + Sync {
    /// Record that a manifest of `kind` was created at `path`.
    fn record_manifest_created(&self, path: &Path, kind: ManifestKind);
}

/// Persists the path of the candidate manifest of an unfinished session.
pub trait ResumeStore: Send + Sync {
    /// The recorded candidate manifest, if any.
    fn read(&self) -> Option<PathBuf>;

    /// Record `path` as the active candidate manifest.
    fn write(&self, path: &Path) -> std::io::Result<()>;

    /// Forget the active session.
    fn clear(&self) -> std::io::Result<()>;
}

/// History that ignores every record.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHistory;

impl ManifestHistory for NoopHistory {
    fn record_manifest_created(&self, _path: &Path, _kind: ManifestKind) {}
}

/// One recorded manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HistoryEntry {
    /// Manifest location.
    pub file_path: PathBuf,
    /// When it was recorded.
    pub timestamp: DateTime<Local>,
    /// Which format the manifest uses.
    #[serde(rename = "Type")]
    pub kind: ManifestKind,
    /// SHA-256 of the manifest at the time it was recorded.
    #[serde(default)]
    pub file_checksum: String,
}

/// History persisted as a JSON list, newest first, capped at [`MAX_HISTORY_ENTRIES`].
///
/// Failures are logged and otherwise ignored; history never blocks a scan.
#[derive(Debug)]
pub struct JsonHistory {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonHistory {
    /// Create a history stored at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Path of the backing JSON file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All recorded entries, newest first. A missing or unreadable file reads as empty.
    pub fn entries(&self) -> Vec<HistoryEntry> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to read history");
                return Vec::new();
            }
        };
        serde_json::from_str(&text).unwrap_or_else(|e| {
            warn!(path = %self.path.display(), error = %e, "history file is corrupt, ignoring it");
            Vec::new()
        })
    }

    fn save(&self, entries: &[HistoryEntry]) -> Result<(), String> {
        let json = serde_json::to_string_pretty(entries).map_err(|e| e.to_string())?;
        fs::write(&self.path, json).map_err(|e| e.to_string())
    }
}

impl ManifestHistory for JsonHistory {
    fn record_manifest_created(&self, path: &Path, kind: ManifestKind) {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());

        let file_checksum = match integrity::hash_file(path) {
            Ok(digest) => digest,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "not recording manifest in history");
                return;
            }
        };

        let mut entries = self.entries();
        entries.insert(
            0,
            HistoryEntry {
                file_path: path.to_path_buf(),
                timestamp: Local::now(),
                kind,
                file_checksum,
            },
        );
        entries.truncate(MAX_HISTORY_ENTRIES);

        match self.save(&entries) {
            Ok(()) => debug!(path = %path.display(), %kind, "recorded manifest in history"),
            Err(e) => warn!(path = %self.path.display(), error = %e, "failed to save history"),
        }
    }
}

/// Resume state kept as a single line of text in a file.
#[derive(Debug, Clone)]
pub struct FileResumeStore {
    path: PathBuf,
}

impl FileResumeStore {
    /// Create a store backed by `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ResumeStore for FileResumeStore {
    fn read(&self) -> Option<PathBuf> {
        match fs::read_to_string(&self.path) {
            Ok(text) => {
                let line = text.lines().next().unwrap_or_default().trim();
                (!line.is_empty()).then(|| PathBuf::from(line))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to read resume state");
                None
            }
        }
    }

    fn write(&self, path: &Path) -> std::io::Result<()> {
        fs::write(&self.path, path.to_string_lossy().as_bytes())
    }

    fn clear(&self) -> std::io::Result<()> {
        match fs::remove_file(&self.path) {
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

/// Resume state held only in memory.
#[derive(Debug, Default)]
pub struct MemoryResumeStore {
    current: Mutex<Option<PathBuf>>,
}

impl ResumeStore for MemoryResumeStore {
    fn read(&self) -> Option<PathBuf> {
        self.current.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn write(&self, path: &Path) -> std::io::Result<()> {
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = Some(path.to_path_buf());
        Ok(())
    }

    fn clear(&self) -> std::io::Result<()> {
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = None;
        Ok(())
    }
}

/// The set of collaborators shared by sessions and engines.
#[derive(Clone)]
pub struct Services {
    /// Where created manifests are recorded.
    pub history: Arc<dyn ManifestHistory>,
    /// Where the active session is remembered across restarts.
    pub resume: Arc<dyn ResumeStore>,
    /// Guards against two runs appending to the same manifest.
    pub runs: RunRegistry,
}

impl Services {
    /// Assemble services from explicit collaborators.
    pub fn new(history: Arc<dyn ManifestHistory>, resume: Arc<dyn ResumeStore>) -> Self {
        Self {
            history,
            resume,
            runs: RunRegistry::new(),
        }
    }

    /// File-backed services keeping their state under `state_dir`.
    pub fn in_dir(state_dir: impl AsRef<Path>) -> Self {
        let state_dir = state_dir.as_ref();
        Self::new(
            Arc::new(JsonHistory::new(state_dir.join(HISTORY_FILE))),
            Arc::new(FileResumeStore::new(state_dir.join(RESUME_STATE_FILE))),
        )
    }

    /// Services that persist nothing.
    pub fn detached() -> Self {
        Self::new(Arc::new(NoopHistory), Arc::new(MemoryResumeStore::default()))
    }
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("resume", &self.resume.read())
            .field("runs", &self.runs)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_resume_store_round_trip() {
        let temp = TempDir::new().unwrap();
        let store = FileResumeStore::new(temp.path().join(RESUME_STATE_FILE));

        assert_eq!(store.read(), None);
        store.write(Path::new("/data/scan_20240101_000000.csv")).unwrap();
        assert_eq!(
            store.read(),
            Some(PathBuf::from("/data/scan_20240101_000000.csv"))
        );

        store.clear().unwrap();
        assert_eq!(store.read(), None);
        // Clearing twice is fine.
        store.clear().unwrap();
    }

    #[test]
    fn test_file_resume_store_trims_whitespace() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(RESUME_STATE_FILE);
        fs::write(&path, "  /data/list.csv \r\n").unwrap();
        let store = FileResumeStore::new(&path);
        assert_eq!(store.read(), Some(PathBuf::from("/data/list.csv")));

        fs::write(&path, "\n").unwrap();
        assert_eq!(store.read(), None);
    }

    #[test]
    fn test_json_history_newest_first_and_capped() {
        let temp = TempDir::new().unwrap();
        let manifest = temp.path().join("list.csv");
        fs::write(&manifest, "FilePath\n").unwrap();
        let history = JsonHistory::new(temp.path().join(HISTORY_FILE));

        for _ in 0..MAX_HISTORY_ENTRIES + 5 {
            history.record_manifest_created(&manifest, ManifestKind::SimpleList);
        }
        history.record_manifest_created(&manifest, ManifestKind::ChecksumManifest);

        let entries = history.entries();
        assert_eq!(entries.len(), MAX_HISTORY_ENTRIES);
        assert_eq!(entries[0].kind, ManifestKind::ChecksumManifest);
        assert_eq!(entries[0].file_checksum.len(), 64);
    }

    #[test]
    fn test_json_history_uses_pascal_case_fields() {
        let temp = TempDir::new().unwrap();
        let manifest = temp.path().join("list.csv");
        fs::write(&manifest, "FilePath\n").unwrap();
        let history = JsonHistory::new(temp.path().join(HISTORY_FILE));
        history.record_manifest_created(&manifest, ManifestKind::SimpleList);

        let json = fs::read_to_string(history.path()).unwrap();
        assert!(json.contains("\"FilePath\""));
        assert!(json.contains("\"Type\": \"SimpleList\""));
        assert!(json.contains("\"FileChecksum\""));
    }

    #[test]
    fn test_json_history_skips_missing_manifest() {
        let temp = TempDir::new().unwrap();
        let history = JsonHistory::new(temp.path().join(HISTORY_FILE));
        history.record_manifest_created(&temp.path().join("gone.csv"), ManifestKind::SimpleList);
        assert!(history.entries().is_empty());
    }

    #[test]
    fn test_memory_resume_store() {
        let store = MemoryResumeStore::default();
        store.write(Path::new("/a.csv")).unwrap();
        assert_eq!(store.read(), Some(PathBuf::from("/a.csv")));
        store.clear().unwrap();
        assert!(store.read().is_none());
    }
}

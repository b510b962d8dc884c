//! Classify the differences between two manifests.

use std::path::Path;

use indexmap::IndexMap;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::{debug, warn};

use filetally_core::manifest::{ReadStats, detect_kind, header_kind, parse_entries};
use filetally_core::{ManifestError, ManifestKind, path_key};

use crate::error::DiffError;

/// Classification of one difference. Variants are declared in report order.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum DiffStatus {
    /// Present only in the newer manifest.
    Added,
    /// Present in both with different checksums.
    Changed,
    /// Present only in the older manifest.
    Missing,
}

impl DiffStatus {
    /// Human-readable detail attached to entries of this status.
    pub fn detail(self, kind: ManifestKind) -> &'static str {
        match (kind, self) {
            (ManifestKind::SimpleList, Self::Added) => "Not found in old file",
            (ManifestKind::SimpleList, Self::Missing) => "Found in old file only",
            (ManifestKind::SimpleList, Self::Changed) => "Differs from old file",
            (ManifestKind::ChecksumManifest, Self::Added) => "New file",
            (ManifestKind::ChecksumManifest, Self::Changed) => "Checksum mismatch",
            (ManifestKind::ChecksumManifest, Self::Missing) => "Deleted file",
        }
    }
}

/// One classified difference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffEntry {
    /// How the path differs.
    pub status: DiffStatus,
    /// Path as spelled in the manifest it came from.
    pub path: String,
    /// Human-readable explanation.
    pub detail: String,
}

impl DiffEntry {
    fn new(status: DiffStatus, path: &str, kind: ManifestKind) -> Self {
        Self {
            status,
            path: path.to_string(),
            detail: status.detail(kind).to_string(),
        }
    }
}

/// Result of comparing two manifests.
#[derive(Debug, Clone, Serialize)]
pub struct DiffReport {
    /// Format both manifests were read as.
    pub kind: ManifestKind,
    /// Differences, ordered by status then case-insensitive path.
    pub entries: Vec<DiffEntry>,
    /// Rows read from the older manifest.
    pub old_rows: u64,
    /// Rows read from the newer manifest.
    pub new_rows: u64,
    /// Rows skipped as malformed across both manifests.
    pub malformed: u64,
}

impl DiffReport {
    /// Whether the manifests describe the same files.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries with `status`.
    pub fn count(&self, status: DiffStatus) -> usize {
        self.entries.iter().filter(|e| e.status == status).count()
    }
}

/// Compares manifests, reading them as a fixed kind or as their headers declare.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiffEngine {
    kind: Option<ManifestKind>,
}

impl DiffEngine {
    /// Create an engine that detects the manifest kind from file headers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an engine that reads both manifests as `kind`.
    pub fn with_kind(kind: ManifestKind) -> Self {
        Self { kind: Some(kind) }
    }

    /// Compare manifest text already in memory.
    ///
    /// Without a fixed kind, the kind is taken from the headers; the two
    /// headers must agree and at least one must be present.
    pub fn compare_texts(&self, old: &str, new: &str) -> Result<DiffReport, DiffError> {
        let kind = match self.kind {
            Some(kind) => kind,
            None => resolve_kind(
                header_kind(first_line(old)),
                header_kind(first_line(new)),
            )
            .ok_or(DiffError::UnknownKind)??,
        };
        Ok(diff_texts(old, new, kind))
    }

    /// Compare two manifest files. Neither file is modified.
    pub fn compare_files(
        &self,
        old: impl AsRef<Path>,
        new: impl AsRef<Path>,
    ) -> Result<DiffReport, DiffError> {
        let (old, new) = (old.as_ref(), new.as_ref());
        let old_text = read_text(old)?;
        let new_text = read_text(new)?;

        let kind = match self.kind {
            Some(kind) => kind,
            None => resolve_kind(header_of(old)?, header_of(new)?)
                .ok_or(DiffError::UnknownKind)??,
        };
        debug!(old = %old.display(), new = %new.display(), %kind, "comparing manifests");
        Ok(diff_texts(&old_text, &new_text, kind))
    }
}

/// Compare manifest texts read as `kind`.
pub fn diff_texts(old: &str, new: &str, kind: ManifestKind) -> DiffReport {
    let (old_map, old_stats) = index(old, kind);
    let (new_map, new_stats) = index(new, kind);
    let malformed = old_stats.malformed + new_stats.malformed;
    if malformed > 0 {
        warn!(malformed, "skipped malformed rows while comparing manifests");
    }

    let mut entries = Vec::new();
    for (key, (path, checksum)) in &new_map {
        match old_map.get(key) {
            None => entries.push(DiffEntry::new(DiffStatus::Added, path, kind)),
            Some((old_path, old_checksum)) if checksums_differ(old_checksum, checksum) => {
                // Spellings may differ in case; pick one independent of argument order.
                let path = old_path.min(path);
                entries.push(DiffEntry::new(DiffStatus::Changed, path, kind));
            }
            Some(_) => {}
        }
    }
    for (key, (path, _)) in &old_map {
        if !new_map.contains_key(key) {
            entries.push(DiffEntry::new(DiffStatus::Missing, path, kind));
        }
    }

    let entries = entries
        .into_iter()
        .sorted_by(|a, b| {
            a.status
                .cmp(&b.status)
                .then_with(|| path_key(&a.path).cmp(&path_key(&b.path)))
                .then_with(|| a.path.cmp(&b.path))
        })
        .collect();

    DiffReport {
        kind,
        entries,
        old_rows: old_stats.rows,
        new_rows: new_stats.rows,
        malformed,
    }
}

type PathIndex = IndexMap<String, (String, Option<String>)>;

/// Entries keyed by case-insensitive path; the first occurrence of a path wins.
fn index(text: &str, kind: ManifestKind) -> (PathIndex, ReadStats) {
    let (entries, stats) = parse_entries(text, kind);
    let mut map = PathIndex::with_capacity(entries.len());
    for entry in entries {
        map.entry(path_key(&entry.path))
            .or_insert((entry.path, entry.checksum));
    }
    (map, stats)
}

fn checksums_differ(old: &Option<String>, new: &Option<String>) -> bool {
    match (old, new) {
        (Some(old), Some(new)) => !old.eq_ignore_ascii_case(new),
        (None, None) => false,
        _ => true,
    }
}

fn resolve_kind(
    old: Option<ManifestKind>,
    new: Option<ManifestKind>,
) -> Option<Result<ManifestKind, ManifestError>> {
    match (old, new) {
        (Some(a), Some(b)) if a != b => Some(Err(ManifestError::KindMismatch {
            expected: a,
            found: b,
        })),
        (Some(kind), _) | (None, Some(kind)) => Some(Ok(kind)),
        (None, None) => None,
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default()
}

fn header_of(path: &Path) -> Result<Option<ManifestKind>, DiffError> {
    match detect_kind(path) {
        Ok(kind) => Ok(Some(kind)),
        Err(ManifestError::MissingHeader { .. }) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn read_text(path: &Path) -> Result<String, DiffError> {
    let bytes = std::fs::read(path).map_err(|e| ManifestError::io(path, e))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str =
        "FilePath,Checksum,CalculationTimestamp,Size,CreationTime,LastWriteTime,Attributes";

    fn checksum_manifest(rows: &[(&str, &str)]) -> String {
        let mut text = format!("{HEADER}\n");
        for (path, checksum) in rows {
            text.push_str(&format!(
                "\"{path}\",{checksum},2024-01-01 00:00:00.000,1,2024-01-01 00:00:00,2024-01-01 00:00:00,\"Normal\"\n"
            ));
        }
        text
    }

    #[test]
    fn test_status_display_and_order() {
        assert_eq!(DiffStatus::Added.to_string(), "ADDED");
        assert_eq!("MISSING".parse::<DiffStatus>().unwrap(), DiffStatus::Missing);
        assert!(DiffStatus::Added < DiffStatus::Changed);
        assert!(DiffStatus::Changed < DiffStatus::Missing);
    }

    #[test]
    fn test_checksum_scenario() {
        let old = checksum_manifest(&[("/x", "h1"), ("/y", "h2")]);
        let new = checksum_manifest(&[("/x", "h1"), ("/z", "h3")]);

        let report = DiffEngine::new().compare_texts(&old, &new).unwrap();

        assert_eq!(report.kind, ManifestKind::ChecksumManifest);
        assert_eq!(
            report.entries,
            vec![
                DiffEntry {
                    status: DiffStatus::Added,
                    path: "/z".into(),
                    detail: "New file".into(),
                },
                DiffEntry {
                    status: DiffStatus::Missing,
                    path: "/y".into(),
                    detail: "Deleted file".into(),
                },
            ]
        );
    }

    #[test]
    fn test_changed_checksum() {
        let old = checksum_manifest(&[("/x", "h1")]);
        let new = checksum_manifest(&[("/X", "H9")]);

        let report = diff_texts(&old, &new, ManifestKind::ChecksumManifest);
        assert_eq!(report.entries.len(), 1);
        assert_eq!(report.entries[0].status, DiffStatus::Changed);
        assert_eq!(report.entries[0].detail, "Checksum mismatch");
    }

    #[test]
    fn test_checksum_case_is_ignored() {
        let old = checksum_manifest(&[("/x", "abcdef")]);
        let new = checksum_manifest(&[("/x", "ABCDEF")]);
        assert!(diff_texts(&old, &new, ManifestKind::ChecksumManifest).is_empty());
    }

    #[test]
    fn test_identical_inputs_yield_nothing() {
        let text = checksum_manifest(&[("/a", "1"), ("/b", "2")]);
        assert!(DiffEngine::new().compare_texts(&text, &text).unwrap().is_empty());
    }

    #[test]
    fn test_swap_mirrors_added_and_missing() {
        let old = checksum_manifest(&[("/a", "1"), ("/b", "2"), ("/c", "3")]);
        let new = checksum_manifest(&[("/b", "2"), ("/c", "4"), ("/d", "5")]);

        let forward = diff_texts(&old, &new, ManifestKind::ChecksumManifest);
        let backward = diff_texts(&new, &old, ManifestKind::ChecksumManifest);

        let flip = |s: DiffStatus| match s {
            DiffStatus::Added => DiffStatus::Missing,
            DiffStatus::Missing => DiffStatus::Added,
            DiffStatus::Changed => DiffStatus::Changed,
        };
        let mut mirrored: Vec<(DiffStatus, String)> = forward
            .entries
            .iter()
            .map(|e| (flip(e.status), e.path.clone()))
            .collect();
        mirrored.sort();
        let mut actual: Vec<(DiffStatus, String)> = backward
            .entries
            .iter()
            .map(|e| (e.status, e.path.clone()))
            .collect();
        actual.sort();
        assert_eq!(mirrored, actual);
        assert_eq!(forward.count(DiffStatus::Changed), 1);
    }

    #[test]
    fn test_changed_path_spelling_is_order_independent() {
        let old = checksum_manifest(&[("/Data/Photo.JPG", "1")]);
        let new = checksum_manifest(&[("/data/photo.jpg", "2")]);

        let forward = diff_texts(&old, &new, ManifestKind::ChecksumManifest);
        let backward = diff_texts(&new, &old, ManifestKind::ChecksumManifest);

        assert_eq!(forward.entries.len(), 1);
        assert_eq!(forward.entries[0].status, DiffStatus::Changed);
        assert_eq!(forward.entries, backward.entries);
        assert_eq!(forward.entries[0].path, "/Data/Photo.JPG");
    }

    #[test]
    fn test_simple_lists() {
        let old = "FilePath\n\"/a\"\n/b\n";
        let new = "FilePath\n\"/B\"\n\"/c, with comma\"\n";

        let report = DiffEngine::new().compare_texts(old, new).unwrap();

        assert_eq!(report.kind, ManifestKind::SimpleList);
        let summary: Vec<(DiffStatus, &str, &str)> = report
            .entries
            .iter()
            .map(|e| (e.status, e.path.as_str(), e.detail.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (DiffStatus::Added, "/c, with comma", "Not found in old file"),
                (DiffStatus::Missing, "/a", "Found in old file only"),
            ]
        );
    }

    #[test]
    fn test_malformed_rows_are_skipped() {
        let mut old = checksum_manifest(&[("/x", "h1")]);
        old.push_str("\"/torn\",h2,2024\n");
        old.push_str("\"/unterminated,h3,a,b,c,d,e\n");
        let new = checksum_manifest(&[("/x", "h1")]);

        let report = diff_texts(&old, &new, ManifestKind::ChecksumManifest);
        assert!(report.is_empty());
        assert_eq!(report.malformed, 2);
    }

    #[test]
    fn test_first_occurrence_wins() {
        let old = checksum_manifest(&[("/x", "h1")]);
        let new = checksum_manifest(&[("/x", "h1"), ("/X", "h2")]);
        assert!(diff_texts(&old, &new, ManifestKind::ChecksumManifest).is_empty());
    }

    #[test]
    fn test_sorted_case_insensitively() {
        let old = "FilePath\n";
        let new = "FilePath\n/b\n/A\n/c\n";
        let report = diff_texts(old, new, ManifestKind::SimpleList);
        let paths: Vec<&str> = report.entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["/A", "/b", "/c"]);
    }

    #[test]
    fn test_kind_mismatch_and_unknown_kind() {
        let list = "FilePath\n/a\n";
        let sums = checksum_manifest(&[("/a", "1")]);
        assert!(matches!(
            DiffEngine::new().compare_texts(list, &sums),
            Err(DiffError::Manifest(ManifestError::KindMismatch { .. }))
        ));
        assert!(matches!(
            DiffEngine::new().compare_texts("/a\n", "/b\n"),
            Err(DiffError::UnknownKind)
        ));

        let report = DiffEngine::with_kind(ManifestKind::SimpleList)
            .compare_texts("/a\n", "/b\n")
            .unwrap();
        assert_eq!(report.entries.len(), 2);
    }
}

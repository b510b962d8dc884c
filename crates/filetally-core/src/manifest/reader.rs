//! Streaming manifest reader.
//!
//! Malformed rows are counted and skipped, never fatal. A manifest whose
//! every row is malformed simply reads as empty.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::{debug, warn};

use crate::error::{ManifestError, RowError};
use crate::manifest::row::{header_kind, split_row, split_row_exact};
use crate::record::ManifestKind;

/// A parsed data row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    /// Path exactly as recorded (quotes removed, surrounding whitespace trimmed).
    pub path: String,
    /// Checksum column for checksum manifests.
    pub checksum: Option<String>,
}

/// Counters describing one pass over a manifest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadStats {
    /// Rows that parsed into an entry.
    pub rows: u64,
    /// Rows that were skipped as malformed.
    pub malformed: u64,
}

/// Read the kind a manifest declares in its header row.
pub fn detect_kind(path: impl AsRef<Path>) -> Result<ManifestKind, ManifestError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| ManifestError::io(path, e))?;
    let mut reader = BufReader::new(file);
    let mut first = Vec::new();
    reader
        .read_until(b'\n', &mut first)
        .map_err(|e| ManifestError::io(path, e))?;
    header_kind(&String::from_utf8_lossy(&first)).ok_or_else(|| ManifestError::MissingHeader {
        path: path.to_path_buf(),
    })
}

/// Stream the entries of a manifest file, interpreting rows as `kind`.
///
/// A header row, if present, is skipped; blank lines are ignored.
pub fn for_each_entry<F>(
    path: impl AsRef<Path>,
    kind: ManifestKind,
    mut f: F,
) -> Result<ReadStats, ManifestError>
where
    F: FnMut(ManifestEntry),
{
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| ManifestError::io(path, e))?;
    let stats = scan_entries(BufReader::new(file), kind, &mut f)
        .map_err(|e| ManifestError::io(path, e))?;
    if stats.malformed > 0 {
        warn!(
            path = %path.display(),
            malformed = stats.malformed,
            "skipped malformed manifest rows"
        );
    }
    debug!(path = %path.display(), rows = stats.rows, "read manifest");
    Ok(stats)
}

/// Collect every entry of a manifest file.
pub fn read_entries(
    path: impl AsRef<Path>,
    kind: ManifestKind,
) -> Result<(Vec<ManifestEntry>, ReadStats), ManifestError> {
    let mut entries = Vec::new();
    let stats = for_each_entry(path, kind, |entry| entries.push(entry))?;
    Ok((entries, stats))
}

/// Parse manifest text already held in memory.
pub fn parse_entries(text: &str, kind: ManifestKind) -> (Vec<ManifestEntry>, ReadStats) {
    let mut entries = Vec::new();
    let stats = scan_entries(text.as_bytes(), kind, &mut |entry| entries.push(entry))
        .unwrap_or_default();
    (entries, stats)
}

fn scan_entries<R: BufRead>(
    mut reader: R,
    kind: ManifestKind,
    f: &mut dyn FnMut(ManifestEntry),
) -> std::io::Result<ReadStats> {
    let mut stats = ReadStats::default();
    let mut buf = Vec::new();
    let mut first = true;

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&buf);
        if std::mem::take(&mut first) && header_kind(&line).is_some() {
            continue;
        }
        match parse_line(&line, kind) {
            Ok(entry) => {
                stats.rows += 1;
                f(entry);
            }
            Err(RowError::Empty) => {}
            Err(_) => stats.malformed += 1,
        }
    }

    Ok(stats)
}

/// Parse one data row of a manifest of the given kind.
///
/// Only the line terminator is stripped; spaces belong to the path.
pub fn parse_line(line: &str, kind: ManifestKind) -> Result<ManifestEntry, RowError> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return Err(RowError::Empty);
    }
    match kind {
        ManifestKind::SimpleList => {
            let path = if line.starts_with('"') {
                split_row(line)?.swap_remove(0)
            } else {
                line.to_string()
            };
            if path.trim().is_empty() {
                return Err(RowError::Empty);
            }
            Ok(ManifestEntry {
                path,
                checksum: None,
            })
        }
        ManifestKind::ChecksumManifest => {
            let mut fields = split_row_exact(line, kind.field_count())?;
            if fields[0].trim().is_empty() {
                return Err(RowError::Empty);
            }
            let checksum = fields[1].trim().to_string();
            Ok(ManifestEntry {
                path: fields.swap_remove(0),
                checksum: Some(checksum),
            })
        }
    }
}

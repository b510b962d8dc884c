//! Row-level encoding for manifest files.
//!
//! Fields are separated by commas. A field that starts with a double quote
//! runs until the next quote that is followed by a comma or the end of the
//! line, so quoted paths may contain commas (and even bare quotes) without
//! any escaping. Unquoted fields never contain commas.

use std::fmt::Write as _;

use crate::error::RowError;
use crate::record::{Checksum, FileRecord, ManifestKind};

/// Format of the `CalculationTimestamp` column.
pub const CALCULATION_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Format of the `CreationTime` and `LastWriteTime` columns.
pub const FILE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Placeholder written for metadata fields of error rows.
const PLACEHOLDER: &str = "0";

/// Split one manifest line into its fields.
pub fn split_row(line: &str) -> Result<Vec<String>, RowError> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return Err(RowError::Empty);
    }

    let mut fields = Vec::new();
    let mut rest = line;
    loop {
        if let Some(quoted) = rest.strip_prefix('"') {
            let close = closing_quote(quoted).ok_or(RowError::UnterminatedQuote)?;
            fields.push(quoted[..close].to_string());
            let after = &quoted[close + 1..];
            match after.strip_prefix(',') {
                Some(next) => rest = next,
                None => break,
            }
        } else {
            match rest.find(',') {
                Some(idx) => {
                    fields.push(rest[..idx].to_string());
                    rest = &rest[idx + 1..];
                }
                None => {
                    fields.push(rest.to_string());
                    break;
                }
            }
        }
    }

    Ok(fields)
}

/// Split a line and require exactly `expected` fields.
pub fn split_row_exact(line: &str, expected: usize) -> Result<Vec<String>, RowError> {
    let fields = split_row(line)?;
    if fields.len() != expected {
        return Err(RowError::FieldCount {
            expected,
            found: fields.len(),
        });
    }
    Ok(fields)
}

/// Find the quote that ends a quoted field: one followed by `,` or end of line.
fn closing_quote(quoted: &str) -> Option<usize> {
    quoted.match_indices('"').map(|(idx, _)| idx).find(|&idx| {
        let after = &quoted[idx + 1..];
        after.is_empty() || after.starts_with(',')
    })
}

/// Check whether a line is the header row of some manifest kind.
pub fn header_kind(line: &str) -> Option<ManifestKind> {
    let line = line.trim_start_matches('\u{feff}').trim();
    let fields = split_row(line).ok()?;
    if fields.first().map(|f| f.trim()) != Some("FilePath") {
        return None;
    }
    match fields.get(1).map(|f| f.trim()) {
        None => Some(ManifestKind::SimpleList),
        Some("Checksum") => Some(ManifestKind::ChecksumManifest),
        Some(_) => None,
    }
}

/// Render a record as one data row (without the trailing newline).
pub fn format_record(kind: ManifestKind, record: &FileRecord) -> String {
    let path = record.path.to_string_lossy();
    match kind {
        ManifestKind::SimpleList => format!("\"{path}\""),
        ManifestKind::ChecksumManifest => {
            let computed = record.computed_at.format(CALCULATION_TIME_FORMAT);
            match &record.checksum {
                Checksum::Error => format!(
                    "\"{path}\",{},{computed},{PLACEHOLDER},{PLACEHOLDER},{PLACEHOLDER},{}",
                    Checksum::ERROR_SENTINEL,
                    FileRecord::ERROR_ATTRIBUTES,
                ),
                Checksum::Digest(hex) => {
                    let mut row = String::with_capacity(path.len() + 160);
                    let _ = write!(
                        row,
                        "\"{path}\",{hex},{computed},{},{},{},\"{}\"",
                        record.size,
                        file_time(record.created.as_ref()),
                        file_time(record.modified.as_ref()),
                        record.attributes,
                    );
                    row
                }
            }
        }
    }
}

/// Why `path` cannot be stored as a manifest path field, if it cannot.
///
/// Rows are line-delimited and a quoted field ends at the first `",`, so a
/// path containing either would read back as a different or malformed row.
pub fn unsupported_path(path: &str) -> Option<&'static str> {
    if path.contains(['\n', '\r']) {
        Some("name contains a line break")
    } else if path.contains("\",") {
        Some("name contains a quote followed by a comma")
    } else {
        None
    }
}

/// Render a bare path as a SimpleList row.
pub fn format_path(path: &str) -> String {
    format!("\"{path}\"")
}

fn file_time(time: Option<&chrono::DateTime<chrono::Local>>) -> String {
    time.map(|t| t.format(FILE_TIME_FORMAT).to_string())
        .unwrap_or_else(|| PLACEHOLDER.to_string())
}

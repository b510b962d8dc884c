//! Export of diff reports.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use tracing::info;

use filetally_core::manifest::format_path;

use crate::diff::DiffEntry;
use crate::error::DiffError;

/// Header row of an exported diff report.
pub const REPORT_HEADER: &str = "Status,FilePath,Details";

/// Render entries as report text: the header then one `status,"path",detail` row each.
pub fn render_report(entries: &[DiffEntry]) -> String {
    let mut out = String::with_capacity(REPORT_HEADER.len() + 1 + entries.len() * 64);
    out.push_str(REPORT_HEADER);
    out.push('\n');
    for entry in entries {
        let _ = writeln!(
            out,
            "{},{},{}",
            entry.status,
            format_path(&entry.path),
            entry.detail
        );
    }
    out
}

/// Write a report file, replacing any existing file at `path`.
pub fn export_report(entries: &[DiffEntry], path: impl AsRef<Path>) -> Result<(), DiffError> {
    let path = path.as_ref();
    fs::write(path, render_report(entries)).map_err(|source| DiffError::Export {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), entries = entries.len(), "exported diff report");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::DiffStatus;

    #[test]
    fn test_render_report() {
        let entries = vec![
            DiffEntry {
                status: DiffStatus::Added,
                path: "/z, y".into(),
                detail: "New file".into(),
            },
            DiffEntry {
                status: DiffStatus::Missing,
                path: "/y".into(),
                detail: "Deleted file".into(),
            },
        ];

        assert_eq!(
            render_report(&entries),
            "Status,FilePath,Details\nADDED,\"/z, y\",New file\nMISSING,\"/y\",Deleted file\n"
        );
    }

    #[test]
    fn test_empty_report_is_header_only() {
        assert_eq!(render_report(&[]), "Status,FilePath,Details\n");
    }
}

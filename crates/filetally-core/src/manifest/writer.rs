//! Append-only manifest writer.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::ManifestError;
use crate::manifest::row::{format_path, format_record};
use crate::record::{FileRecord, ManifestKind};

/// Appends rows to a manifest file, flushing each batch to disk before returning.
///
/// A manifest is only ever grown; existing rows are never rewritten.
#[derive(Debug)]
pub struct ManifestWriter {
    kind: ManifestKind,
    path: PathBuf,
    file: File,
    rows_written: u64,
}

impl ManifestWriter {
    /// Open a manifest for appending, creating it with a header if needed.
    ///
    /// Opening an existing manifest never rewrites its header. If the file ends
    /// in the middle of a row (a write torn by a crash), the row is terminated
    /// first so the next append starts on a fresh line.
    pub fn open(kind: ManifestKind, path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .map_err(|e| ManifestError::io(&path, e))?;

        let len = file
            .metadata()
            .map_err(|e| ManifestError::io(&path, e))?
            .len();

        if len == 0 {
            debug!(path = %path.display(), %kind, "creating manifest");
            let header = format!("{}\n", kind.header());
            write_durably(&mut file, header.as_bytes()).map_err(|e| ManifestError::io(&path, e))?;
        } else if !ends_with_newline(&mut file).map_err(|e| ManifestError::io(&path, e))? {
            warn!(path = %path.display(), "manifest ends with a torn row, terminating it");
            write_durably(&mut file, b"\n").map_err(|e| ManifestError::io(&path, e))?;
        }

        Ok(Self {
            kind,
            path,
            file,
            rows_written: 0,
        })
    }

    /// Create a manifest from scratch, replacing any existing file.
    pub fn create(kind: ManifestKind, path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let path = path.as_ref();
        File::create(path).map_err(|e| ManifestError::io(path, e))?;
        Self::open(kind, path)
    }

    /// Create a manifest that must not exist yet.
    ///
    /// Fails with an [`ErrorKind::AlreadyExists`](std::io::ErrorKind::AlreadyExists)
    /// I/O error when `path` is taken, leaving the existing file untouched.
    pub fn create_new(kind: ManifestKind, path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let path = path.as_ref();
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| ManifestError::io(path, e))?;
        Self::open(kind, path)
    }

    /// The kind of manifest being written.
    pub fn kind(&self) -> ManifestKind {
        self.kind
    }

    /// Path of the manifest file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of data rows appended through this writer.
    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    /// Append one record using this manifest's row format.
    pub fn append(&mut self, record: &FileRecord) -> Result<(), ManifestError> {
        self.append_batch(std::slice::from_ref(record))
    }

    /// Append several records in order with a single durable flush.
    pub fn append_batch(&mut self, records: &[FileRecord]) -> Result<(), ManifestError> {
        if records.is_empty() {
            return Ok(());
        }
        let mut buf = String::new();
        for record in records {
            buf.push_str(&format_record(self.kind, record));
            buf.push('\n');
        }
        write_durably(&mut self.file, buf.as_bytes()).map_err(|e| ManifestError::io(&self.path, e))?;
        self.rows_written += records.len() as u64;
        Ok(())
    }

    /// Append bare paths as SimpleList rows with a single durable flush.
    pub fn append_paths<I, S>(&mut self, paths: I) -> Result<(), ManifestError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut buf = String::new();
        let mut count = 0u64;
        for path in paths {
            buf.push_str(&format_path(path.as_ref()));
            buf.push('\n');
            count += 1;
        }
        if count == 0 {
            return Ok(());
        }
        write_durably(&mut self.file, buf.as_bytes()).map_err(|e| ManifestError::io(&self.path, e))?;
        self.rows_written += count;
        Ok(())
    }
}

fn write_durably(file: &mut File, bytes: &[u8]) -> std::io::Result<()> {
    file.write_all(bytes)?;
    file.flush()?;
    file.sync_data()
}

fn ends_with_newline(file: &mut File) -> std::io::Result<bool> {
    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

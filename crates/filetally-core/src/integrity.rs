//! Whole-file SHA-256 digests and `.sha256` sidecar files.
//!
//! The same streaming hash protects manifests (through sidecars) and
//! produces the per-entry checksums of a checksum manifest.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use strum::Display;

use crate::error::IntegrityError;

/// Default read buffer for streaming hashes.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Extension appended to a file's full name to form its sidecar.
pub const SIDECAR_EXTENSION: &str = "sha256";

/// Outcome of checking a file against its sidecar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
pub enum SidecarStatus {
    /// The stored digest matches the file.
    Verified,
    /// A sidecar exists but the file no longer matches it.
    Mismatch,
    /// There is no sidecar, so no integrity claim exists.
    #[strum(to_string = "No Sidecar")]
    NoSidecar,
    /// The file itself is gone.
    #[strum(to_string = "Missing File")]
    MissingFile,
    /// The file or sidecar could not be read.
    Error,
}

/// Path of the sidecar for `path`: the full file name plus `.sha256`.
pub fn sidecar_path(path: impl AsRef<Path>) -> PathBuf {
    let mut name = OsString::from(path.as_ref().as_os_str());
    name.push(".");
    name.push(SIDECAR_EXTENSION);
    PathBuf::from(name)
}

/// Compute the lowercase hex SHA-256 of a file, streaming it in bounded chunks.
pub fn hash_file(path: impl AsRef<Path>) -> Result<String, IntegrityError> {
    hash_file_with_chunk(path, DEFAULT_CHUNK_SIZE)
}

/// Compute the lowercase hex SHA-256 of a file using a read buffer of `chunk_size` bytes.
pub fn hash_file_with_chunk(
    path: impl AsRef<Path>,
    chunk_size: usize,
) -> Result<String, IntegrityError> {
    let path = path.as_ref();
    let mut file = File::open(path).map_err(|e| IntegrityError::io(path, e))?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; chunk_size.max(1)];

    loop {
        let read = match file.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(IntegrityError::io(path, e)),
        };
        hasher.update(&buffer[..read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Hash `path` and store the digest in its sidecar. Returns the digest.
pub fn write_sidecar(path: impl AsRef<Path>) -> Result<String, IntegrityError> {
    let path = path.as_ref();
    let digest = hash_file(path)?;
    let sidecar = sidecar_path(path);
    fs::write(&sidecar, &digest).map_err(|e| IntegrityError::io(&sidecar, e))?;
    tracing::debug!(path = %path.display(), "wrote checksum sidecar");
    Ok(digest)
}

/// Check `path` against its sidecar.
///
/// Returns `Ok(false)` when the sidecar exists but does not match, and
/// [`IntegrityError::SidecarNotFound`] when there is no sidecar at all.
pub fn verify_sidecar(path: impl AsRef<Path>) -> Result<bool, IntegrityError> {
    let path = path.as_ref();
    let sidecar = sidecar_path(path);
    let expected = match fs::read_to_string(&sidecar) {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(IntegrityError::SidecarNotFound { path: sidecar });
        }
        Err(e) => return Err(IntegrityError::io(&sidecar, e)),
    };
    let actual = hash_file(path)?;
    Ok(expected.trim().eq_ignore_ascii_case(&actual))
}

/// Classify a file's integrity state without returning an error.
pub fn sidecar_status(path: impl AsRef<Path>) -> SidecarStatus {
    let path = path.as_ref();
    if !path.exists() {
        return SidecarStatus::MissingFile;
    }
    match verify_sidecar(path) {
        Ok(true) => SidecarStatus::Verified,
        Ok(false) => SidecarStatus::Mismatch,
        Err(IntegrityError::SidecarNotFound { .. }) => SidecarStatus::NoSidecar,
        Err(_) => SidecarStatus::Error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::OpenOptions;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_hash_known_vector() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("abc.txt");
        fs::write(&path, "abc").unwrap();

        assert_eq!(
            hash_file(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_chunk_size_does_not_change_digest() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("data.bin");
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        fs::write(&path, &data).unwrap();

        let small = hash_file_with_chunk(&path, 7).unwrap();
        let large = hash_file_with_chunk(&path, 1 << 20).unwrap();
        assert_eq!(small, large);
    }

    #[test]
    fn test_sidecar_path_keeps_extension() {
        assert_eq!(
            sidecar_path("/tmp/scan.checksums.csv"),
            PathBuf::from("/tmp/scan.checksums.csv.sha256")
        );
    }

    #[test]
    fn test_sidecar_lifecycle() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("manifest.csv");
        fs::write(&path, "FilePath\n\"/a\"\n").unwrap();

        write_sidecar(&path).unwrap();
        assert!(verify_sidecar(&path).unwrap());
        assert_eq!(sidecar_status(&path), SidecarStatus::Verified);

        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"x").unwrap();
        drop(file);
        assert!(!verify_sidecar(&path).unwrap());
        assert_eq!(sidecar_status(&path), SidecarStatus::Mismatch);

        fs::remove_file(sidecar_path(&path)).unwrap();
        assert!(matches!(
            verify_sidecar(&path),
            Err(IntegrityError::SidecarNotFound { .. })
        ));
        assert_eq!(sidecar_status(&path), SidecarStatus::NoSidecar);
    }

    #[test]
    fn test_verify_accepts_uppercase_and_whitespace() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("f.txt");
        fs::write(&path, "abc").unwrap();
        let digest = hash_file(&path).unwrap();
        fs::write(sidecar_path(&path), format!("  {}\r\n", digest.to_uppercase())).unwrap();

        assert!(verify_sidecar(&path).unwrap());
    }

    #[test]
    fn test_missing_file_status() {
        let temp = TempDir::new().unwrap();
        assert_eq!(
            sidecar_status(temp.path().join("gone.csv")),
            SidecarStatus::MissingFile
        );
        assert!(matches!(
            hash_file(temp.path().join("gone.csv")),
            Err(IntegrityError::Io { .. })
        ));
    }
}

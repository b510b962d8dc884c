use std::fs;

use tempfile::TempDir;

use filetally_core::manifest::{detect_kind, read_entries};
use filetally_core::{
    FileRecord, ManifestError, ManifestKind, ManifestWriter, SidecarStatus, integrity,
};

#[test]
fn test_checksum_manifest_survives_reopen_and_reads_back() {
    let temp = TempDir::new().unwrap();
    let data = temp.path().join("report, final.txt");
    fs::write(&data, "contents").unwrap();
    let metadata = fs::metadata(&data).unwrap();
    let digest = integrity::hash_file(&data).unwrap();
    let manifest = temp.path().join("scan.checksums.csv");

    let mut writer = ManifestWriter::open(ManifestKind::ChecksumManifest, &manifest).unwrap();
    writer
        .append(&FileRecord::new(&data, digest.clone(), &metadata))
        .unwrap();
    drop(writer);

    let mut writer = ManifestWriter::open(ManifestKind::ChecksumManifest, &manifest).unwrap();
    writer
        .append(&FileRecord::error(temp.path().join("locked.bin")))
        .unwrap();
    assert_eq!(writer.rows_written(), 1);
    drop(writer);

    let text = fs::read_to_string(&manifest).unwrap();
    assert_eq!(text.matches("FilePath,Checksum").count(), 1);
    assert!(text.ends_with('\n'));

    assert_eq!(
        detect_kind(&manifest).unwrap(),
        ManifestKind::ChecksumManifest
    );
    let (entries, stats) = read_entries(&manifest, ManifestKind::ChecksumManifest).unwrap();
    assert_eq!(stats.rows, 2);
    assert_eq!(stats.malformed, 0);
    assert_eq!(entries[0].path, data.to_string_lossy());
    assert_eq!(entries[0].checksum.as_deref(), Some(digest.as_str()));
    assert_eq!(entries[1].checksum.as_deref(), Some("ERROR"));
}

#[test]
fn test_candidate_list_with_sidecar() {
    let temp = TempDir::new().unwrap();
    let list = temp.path().join("scan_20240101_000000.csv");

    let mut writer = ManifestWriter::create(ManifestKind::SimpleList, &list).unwrap();
    writer.append_paths(["/data/a", "/data/b, c"]).unwrap();
    drop(writer);
    integrity::write_sidecar(&list).unwrap();

    assert_eq!(integrity::sidecar_status(&list), SidecarStatus::Verified);
    let (entries, _) = read_entries(&list, ManifestKind::SimpleList).unwrap();
    let paths: Vec<&str> = entries.iter().map(|e| e.path.as_str()).collect();
    assert_eq!(paths, vec!["/data/a", "/data/b, c"]);
}

#[test]
fn test_file_without_header() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("plain.txt");
    fs::write(&path, "/a\n/b\n").unwrap();

    assert!(matches!(
        detect_kind(&path),
        Err(ManifestError::MissingHeader { .. })
    ));
    let (entries, _) = read_entries(&path, ManifestKind::SimpleList).unwrap();
    assert_eq!(entries.len(), 2);
}

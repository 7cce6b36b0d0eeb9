//! Archive output read back with the `tar` crate.

use std::fs;
use std::io;

use tempfile::TempDir;

use gpanel::archive::{ArchiveEntry, ArchiveWriter, BLOCK_SIZE};
use gpanel::error::PanelError;

use crate::common::{init_test_logging, read_tar};

#[test]
fn test_reference_reader_accepts_output() {
    init_test_logging();
    let payload: Vec<u8> = (0..=255u8).cycle().take(1300).collect();
    let bytes = ArchiveWriter::new()
        .with_mtime(1_700_000_000)
        .encode(vec![
            ArchiveEntry::bytes("metadata.json", br#"{"fps":30}"#.to_vec()),
            ArchiveEntry::bytes("frame_000000.png", payload.clone()),
            ArchiveEntry::bytes("empty.bin", Vec::new()),
        ])
        .unwrap();

    assert_eq!(bytes.len() % BLOCK_SIZE, 0);
    let members = read_tar(&bytes);
    let names: Vec<_> = members.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, ["metadata.json", "frame_000000.png", "empty.bin"]);

    assert_eq!(members[1].bytes, payload);
    assert_eq!(members[1].size, 1300);
    assert_eq!(members[2].size, 0);
    for member in &members {
        assert_eq!(member.mode, 0o644);
        assert_eq!(member.mtime, 1_700_000_000);
    }
}

#[test]
fn test_ustar_magic_and_typeflag() {
    let bytes = ArchiveWriter::new()
        .with_mtime(0)
        .encode(vec![ArchiveEntry::bytes("a.txt", b"hi".to_vec())])
        .unwrap();
    assert_eq!(bytes[156], b'0');
    assert_eq!(&bytes[257..263], b"ustar\0");
    assert_eq!(&bytes[263..265], b"00");
    assert_eq!(&bytes[100..108], b"    644\0");
    assert_eq!(&bytes[124..136], b"          2\0");
}

#[test]
fn test_write_to_matches_encode() {
    let writer = ArchiveWriter::new().with_mtime(42);
    let entries = || vec![ArchiveEntry::bytes("x", vec![7; 513])];
    let encoded = writer.encode(entries()).unwrap();

    let mut streamed = Vec::new();
    let written = writer.write_to(entries(), &mut streamed).unwrap();
    assert_eq!(written, encoded.len() as u64);
    assert_eq!(streamed, encoded);
}

#[test]
fn test_file_and_deferred_sources() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("notes.txt");
    fs::write(&path, b"from disk").unwrap();

    let bytes = ArchiveWriter::new()
        .encode(vec![
            ArchiveEntry::file("notes.txt", &path),
            ArchiveEntry::deferred("later.txt", || Ok(b"produced late".to_vec())),
        ])
        .unwrap();
    let members = read_tar(&bytes);
    assert_eq!(members[0].bytes, b"from disk");
    assert_eq!(members[1].bytes, b"produced late");
}

#[test]
fn test_unreadable_source_fails_before_output() {
    let dir = TempDir::new().unwrap();
    let mut out = Vec::new();
    let err = ArchiveWriter::new()
        .write_to(
            vec![
                ArchiveEntry::bytes("ok.txt", b"fine".to_vec()),
                ArchiveEntry::file("gone.txt", dir.path().join("missing")),
            ],
            &mut out,
        )
        .unwrap_err();
    assert!(matches!(err, PanelError::ArchiveSource { ref name, .. } if name == "gone.txt"));
    assert!(out.is_empty());
}

#[test]
fn test_failing_deferred_blob_fails_archive() {
    let result = ArchiveWriter::new().encode(vec![ArchiveEntry::deferred("bad", || {
        Err(io::Error::other("decoder crashed"))
    })]);
    assert!(matches!(result, Err(PanelError::ArchiveSource { .. })));
}

#[test]
fn test_long_name_rejected_without_output() {
    let name = "n".repeat(101);
    let mut out = Vec::new();
    let err = ArchiveWriter::new()
        .write_to(vec![ArchiveEntry::bytes(name, vec![1])], &mut out)
        .unwrap_err();
    assert!(matches!(err, PanelError::ArchiveNameTooLong { len: 101, .. }));
    assert!(err.is_user_recoverable());
    assert!(out.is_empty());

    let exact = "n".repeat(100);
    let bytes = ArchiveWriter::new()
        .encode(vec![ArchiveEntry::bytes(exact.clone(), vec![1])])
        .unwrap();
    assert_eq!(read_tar(&bytes)[0].name, exact);
}

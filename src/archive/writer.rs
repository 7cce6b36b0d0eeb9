//! Archive assembly.

use std::io::Write;

use chrono::Utc;
use tracing::{debug, instrument, trace};

use super::header::{self, BLOCK_SIZE, HeaderFields};
use super::ArchiveEntry;
use crate::error::{PanelError, Result};

const ENTRY_MODE: u32 = 0o644;
const ZERO_BLOCK: [u8; BLOCK_SIZE] = [0; BLOCK_SIZE];

/// Encodes ordered entries into a ustar archive.
///
/// Every entry is materialized and validated before the first byte is
/// written, so a failing source never leaves a partial archive behind.
#[derive(Debug, Clone)]
pub struct ArchiveWriter {
    mtime: u64,
}

impl Default for ArchiveWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiveWriter {
    /// Writer stamping entries with the current time.
    #[must_use]
    pub fn new() -> Self {
        Self {
            mtime: Utc::now().timestamp().max(0) as u64,
        }
    }

    /// Use a fixed modification time (seconds since the epoch).
    #[must_use]
    pub fn with_mtime(mut self, mtime: u64) -> Self {
        self.mtime = mtime;
        self
    }

    /// Encode entries into a single in-memory archive.
    #[instrument(skip_all, fields(entries = entries.len()))]
    pub fn encode(&self, entries: Vec<ArchiveEntry>) -> Result<Vec<u8>> {
        let prepared = self.prepare(entries)?;
        let total = archive_len(&prepared);
        let mut out = Vec::with_capacity(total);
        emit(&prepared, &mut out)?;
        debug_assert_eq!(out.len(), total);
        debug!(bytes = out.len(), "Archive encoded");
        Ok(out)
    }

    /// Encode entries into any writer, returning the number of bytes written.
    #[instrument(skip_all, fields(entries = entries.len()))]
    pub fn write_to<W: Write>(&self, entries: Vec<ArchiveEntry>, out: &mut W) -> Result<u64> {
        let prepared = self.prepare(entries)?;
        emit(&prepared, out)?;
        out.flush()?;
        Ok(archive_len(&prepared) as u64)
    }

    /// Materialize every source and build every header up front.
    fn prepare(&self, entries: Vec<ArchiveEntry>) -> Result<Vec<([u8; BLOCK_SIZE], Vec<u8>)>> {
        let mut prepared = Vec::with_capacity(entries.len());
        for entry in entries {
            header::validate_name(&entry.name)?;
            let bytes = entry
                .source
                .materialize()
                .map_err(|e| PanelError::ArchiveSource {
                    name: entry.name.clone(),
                    reason: e.to_string(),
                })?;
            let block = header::encode_header(&HeaderFields {
                name: &entry.name,
                size: bytes.len() as u64,
                mode: ENTRY_MODE,
                mtime: self.mtime,
            })?;
            trace!(name = %entry.name, size = bytes.len(), "Prepared archive entry");
            prepared.push((block, bytes));
        }
        Ok(prepared)
    }
}

fn archive_len(prepared: &[([u8; BLOCK_SIZE], Vec<u8>)]) -> usize {
    let body: usize = prepared
        .iter()
        .map(|(_, bytes)| BLOCK_SIZE + bytes.len() + header::padding_for(bytes.len() as u64))
        .sum();
    body + 2 * BLOCK_SIZE
}

fn emit<W: Write>(prepared: &[([u8; BLOCK_SIZE], Vec<u8>)], out: &mut W) -> Result<()> {
    for (block, bytes) in prepared {
        out.write_all(block)?;
        out.write_all(bytes)?;
        let pad = header::padding_for(bytes.len() as u64);
        out.write_all(&ZERO_BLOCK[..pad])?;
    }
    out.write_all(&ZERO_BLOCK)?;
    out.write_all(&ZERO_BLOCK)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    #[test]
    fn test_empty_archive_is_two_zero_blocks() {
        let out = ArchiveWriter::new().encode(Vec::new()).unwrap();
        assert_eq!(out.len(), 1024);
        assert!(out.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_payload_padded_to_block_boundary() {
        let out = ArchiveWriter::new()
            .with_mtime(0)
            .encode(vec![ArchiveEntry::bytes("a.txt", b"hello".to_vec())])
            .unwrap();
        assert_eq!(out.len(), 512 + 512 + 1024);
        assert_eq!(&out[512..517], b"hello");
        assert!(out[517..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_exact_block_payload_gets_no_padding() {
        let out = ArchiveWriter::new()
            .encode(vec![ArchiveEntry::bytes("block.bin", vec![7u8; 512])])
            .unwrap();
        assert_eq!(out.len(), 512 + 512 + 1024);
    }

    #[test]
    fn test_entries_keep_input_order() {
        let out = ArchiveWriter::new()
            .encode(vec![
                ArchiveEntry::bytes("first", vec![1]),
                ArchiveEntry::bytes("second", vec![2]),
            ])
            .unwrap();
        assert_eq!(&out[..5], b"first");
        assert_eq!(&out[1024..1030], b"second");
    }

    #[test]
    fn test_failing_source_aborts_before_writing() {
        let mut sink = Vec::new();
        let err = ArchiveWriter::new()
            .write_to(
                vec![
                    ArchiveEntry::bytes("ok.bin", vec![1, 2, 3]),
                    ArchiveEntry::deferred("broken.bin", || {
                        Err(io::Error::other("blob revoked"))
                    }),
                ],
                &mut sink,
            )
            .unwrap_err();
        assert!(matches!(err, PanelError::ArchiveSource { ref name, .. } if name == "broken.bin"));
        assert!(sink.is_empty());
    }

    #[test]
    fn test_long_name_aborts_before_writing() {
        let mut sink = Vec::new();
        let err = ArchiveWriter::new()
            .write_to(
                vec![
                    ArchiveEntry::bytes("ok.bin", vec![1]),
                    ArchiveEntry::bytes("x".repeat(120), vec![2]),
                ],
                &mut sink,
            )
            .unwrap_err();
        assert!(matches!(err, PanelError::ArchiveNameTooLong { len: 120, .. }));
        assert!(sink.is_empty());
    }

    #[test]
    fn test_write_to_reports_length() {
        let mut sink = Vec::new();
        let written = ArchiveWriter::new()
            .write_to(vec![ArchiveEntry::bytes("m.json", b"{}".to_vec())], &mut sink)
            .unwrap();
        assert_eq!(written, sink.len() as u64);
    }
}

//! Tar-compatible archive encoding.
//!
//! Entries are packed into the classic ustar layout with no external
//! archiving library: one 512-byte header per entry, the payload padded to a
//! block boundary, and two zero blocks as the end marker.
//!
//! # Usage
//!
//! ```ignore
//! use gpanel::archive::{ArchiveEntry, ArchiveWriter};
//!
//! let bytes = ArchiveWriter::new().encode(vec![
//!     ArchiveEntry::bytes("metadata.json", br#"{"fps":30}"#.to_vec()),
//!     ArchiveEntry::file("frame_000000.png", "/tmp/frame.png"),
//! ])?;
//! ```

pub mod header;
mod writer;

use std::fmt;
use std::io;
use std::path::PathBuf;

pub use header::{BLOCK_SIZE, MAX_ENTRY_SIZE, NAME_LEN};
pub use writer::ArchiveWriter;

/// Deferred producer of entry bytes.
pub type DeferredBlob = Box<dyn FnOnce() -> io::Result<Vec<u8>> + Send>;

/// Where an entry's bytes come from.
pub enum EntrySource {
    /// Bytes already in memory; moved into the archive without copying.
    Bytes(Vec<u8>),
    /// A file read when the archive is finalized.
    File(PathBuf),
    /// Any other lazily materialized blob.
    Deferred(DeferredBlob),
}

impl EntrySource {
    /// Materialize the bytes, consuming the source.
    pub fn materialize(self) -> io::Result<Vec<u8>> {
        match self {
            Self::Bytes(bytes) => Ok(bytes),
            Self::File(path) => std::fs::read(path),
            Self::Deferred(produce) => produce(),
        }
    }
}

impl fmt::Debug for EntrySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
            Self::File(path) => write!(f, "File({})", path.display()),
            Self::Deferred(_) => f.write_str("Deferred"),
        }
    }
}

/// A named blob destined for an archive.
#[derive(Debug)]
pub struct ArchiveEntry {
    pub name: String,
    pub source: EntrySource,
}

impl ArchiveEntry {
    pub fn bytes(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            source: EntrySource::Bytes(bytes),
        }
    }

    pub fn file(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            source: EntrySource::File(path.into()),
        }
    }

    pub fn deferred(
        name: impl Into<String>,
        produce: impl FnOnce() -> io::Result<Vec<u8>> + Send + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            source: EntrySource::Deferred(Box::new(produce)),
        }
    }
}

//! POSIX ustar header block layout.
//!
//! Field offsets follow the published ustar layout. Numeric fields are
//! octal ASCII right-aligned with leading spaces and terminated by a NUL;
//! the checksum field is six octal digits, a NUL and a space.

use crate::error::{PanelError, Result};

/// Size of every header and payload block.
pub const BLOCK_SIZE: usize = 512;

/// Maximum entry name length in bytes.
pub const NAME_LEN: usize = 100;

/// Largest payload expressible in the 12-byte size field (11 octal digits).
pub const MAX_ENTRY_SIZE: u64 = 0o77_777_777_777;

const NAME: (usize, usize) = (0, 100);
const MODE: (usize, usize) = (100, 8);
const UID: (usize, usize) = (108, 8);
const GID: (usize, usize) = (116, 8);
const SIZE: (usize, usize) = (124, 12);
const MTIME: (usize, usize) = (136, 12);
const CHECKSUM: (usize, usize) = (148, 8);
const TYPEFLAG: usize = 156;
const MAGIC: (usize, usize) = (257, 6);
const VERSION: (usize, usize) = (263, 2);
const DEVMAJOR: (usize, usize) = (329, 8);
const DEVMINOR: (usize, usize) = (337, 8);

/// Regular file type flag.
const REGTYPE: u8 = b'0';

/// Header fields for one regular-file entry.
#[derive(Debug, Clone)]
pub struct HeaderFields<'a> {
    pub name: &'a str,
    pub size: u64,
    pub mode: u32,
    pub mtime: u64,
}

/// Encode a complete 512-byte header block.
pub fn encode_header(fields: &HeaderFields<'_>) -> Result<[u8; BLOCK_SIZE]> {
    validate_name(fields.name)?;
    if fields.size > MAX_ENTRY_SIZE {
        return Err(PanelError::ArchiveEntryTooLarge {
            name: fields.name.to_string(),
            size: fields.size,
            max: MAX_ENTRY_SIZE,
        });
    }

    let mut block = [0u8; BLOCK_SIZE];
    let name = fields.name.as_bytes();
    block[NAME.0..NAME.0 + name.len()].copy_from_slice(name);

    write_octal(field_mut(&mut block, MODE), u64::from(fields.mode))?;
    write_octal(field_mut(&mut block, UID), 0)?;
    write_octal(field_mut(&mut block, GID), 0)?;
    write_octal(field_mut(&mut block, SIZE), fields.size)?;
    write_octal(field_mut(&mut block, MTIME), fields.mtime)?;
    block[TYPEFLAG] = REGTYPE;
    field_mut(&mut block, MAGIC).copy_from_slice(b"ustar\0");
    field_mut(&mut block, VERSION).copy_from_slice(b"00");
    write_octal(field_mut(&mut block, DEVMAJOR), 0)?;
    write_octal(field_mut(&mut block, DEVMINOR), 0)?;

    let sum = checksum(&block);
    let field = field_mut(&mut block, CHECKSUM);
    let digits = format!("{sum:06o}");
    field[..6].copy_from_slice(digits.as_bytes());
    field[6] = 0;
    field[7] = b' ';

    Ok(block)
}

/// Unsigned byte sum of a header with the checksum field read as spaces.
pub fn checksum(block: &[u8; BLOCK_SIZE]) -> u32 {
    block
        .iter()
        .enumerate()
        .map(|(i, &b)| {
            if (CHECKSUM.0..CHECKSUM.0 + CHECKSUM.1).contains(&i) {
                u32::from(b' ')
            } else {
                u32::from(b)
            }
        })
        .sum()
}

/// Reject names that do not fit the 100-byte name field.
pub fn validate_name(name: &str) -> Result<()> {
    let len = name.len();
    if len > NAME_LEN {
        return Err(PanelError::ArchiveNameTooLong {
            name: name.to_string(),
            len,
        });
    }
    Ok(())
}

/// Bytes needed to pad `len` up to the next block boundary.
pub const fn padding_for(len: u64) -> usize {
    let rem = (len % BLOCK_SIZE as u64) as usize;
    if rem == 0 { 0 } else { BLOCK_SIZE - rem }
}

fn field_mut(block: &mut [u8; BLOCK_SIZE], (offset, len): (usize, usize)) -> &mut [u8] {
    &mut block[offset..offset + len]
}

fn write_octal(field: &mut [u8], value: u64) -> Result<()> {
    let width = field.len() - 1;
    let digits = format!("{value:>width$o}");
    if digits.len() > width {
        return Err(PanelError::Other(format!(
            "Value {value} does not fit a {width}-digit octal field"
        )));
    }
    field[..width].copy_from_slice(digits.as_bytes());
    field[width] = 0;
    Ok(())
}

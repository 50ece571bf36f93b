//! USTAR header records.
//!
//! ```text
//! offset  size  field
//!      0   100  name
//!    100     8  mode      (octal)
//!    124    12  size      (octal, or base-256 when the high bit is set)
//!    136    12  mtime     (octal)
//!    148     8  checksum  (octal)
//!    156     1  typeflag  ('5' = directory)
//!    257     6  magic     ("ustar\0")
//!    263     2  version   ("00")
//!    345   155  prefix    (joined to name with '/')
//! ```
//!
//! A header is validated before any field is decoded: a record whose
//! checksum field starts with NUL is a null record (end of archive), and
//! the checksum must equal the unsigned sum of all 512 bytes with the
//! checksum field counted as spaces.

use alloc::string::String;

use crate::error::{FsError, TarError};
use crate::path;
use crate::types::EntryKind;

/// Size of a header record and the alignment of entry data.
pub const RECORD_SIZE: usize = 512;

const NAME: core::ops::Range<usize> = 0..100;
const MODE: core::ops::Range<usize> = 100..108;
const UID: core::ops::Range<usize> = 108..116;
const GID: core::ops::Range<usize> = 116..124;
const SIZE: core::ops::Range<usize> = 124..136;
const MTIME: core::ops::Range<usize> = 136..148;
const CHECKSUM: core::ops::Range<usize> = 148..156;
const TYPEFLAG: usize = 156;
const MAGIC: core::ops::Range<usize> = 257..263;
const VERSION: core::ops::Range<usize> = 263..265;
const PREFIX: core::ops::Range<usize> = 345..500;

const USTAR_MAGIC: &[u8; 6] = b"ustar\0";

/// Directory type flag.
pub const TYPE_DIRECTORY: u8 = b'5';
/// Regular file type flag.
pub const TYPE_FILE: u8 = b'0';

/// Decoded TAR header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TarHeader {
    /// Full entry name, prefix already joined, as stored
    pub name: String,
    /// Permission bits
    pub mode: u32,
    /// Data size in bytes
    pub size: u64,
    /// Modification time in Unix seconds
    pub mtime: u64,
    /// Raw type flag
    pub typeflag: u8,
}

impl TarHeader {
    /// Decode and validate a header record.
    pub fn decode(record: &[u8; RECORD_SIZE]) -> Result<Self, TarError> {
        if record[CHECKSUM.start] == 0 {
            return Err(TarError::NullRecord);
        }
        let stored = parse_octal(&record[CHECKSUM]).ok_or(TarError::BadChecksum)?;
        if stored != u64::from(checksum(record)) {
            return Err(TarError::BadChecksum);
        }

        let size = parse_size(&record[SIZE]).ok_or(TarError::BadSize)?;
        if padded_size(size).is_none() {
            return Err(TarError::BadSize);
        }

        let mut name = String::new();
        if record[MAGIC.start..MAGIC.start + 5] == USTAR_MAGIC[..5] {
            let prefix = field_str(&record[PREFIX]);
            if !prefix.is_empty() {
                name.push_str(&prefix);
                name.push(path::SEPARATOR);
            }
        }
        name.push_str(&field_str(&record[NAME]));

        Ok(Self {
            name,
            mode: parse_octal(&record[MODE]).unwrap_or(0) as u32,
            size,
            mtime: parse_octal(&record[MTIME]).unwrap_or(0),
            typeflag: record[TYPEFLAG],
        })
    }

    /// File or directory, from the type flag or a trailing `/`.
    pub fn kind(&self) -> EntryKind {
        if self.typeflag == TYPE_DIRECTORY || self.name.ends_with(path::SEPARATOR) {
            EntryKind::Directory
        } else {
            EntryKind::File
        }
    }

    /// Name with `./`, leading and trailing separators removed.
    pub fn clean_name(&self) -> &str {
        path::entry_name(&self.name)
    }

    /// Bytes from this header to the next: the header plus padded data.
    /// `None` when that distance does not fit in 64 bits.
    pub fn span(&self) -> Option<u64> {
        padded_size(self.size)?.checked_add(RECORD_SIZE as u64)
    }

    /// Encode into a USTAR record with a valid checksum.
    ///
    /// Names longer than 100 bytes are split into prefix and name at a
    /// separator; names that cannot be split are `NameTooLong`.
    pub fn encode(&self) -> Result<[u8; RECORD_SIZE], FsError> {
        let mut record = [0u8; RECORD_SIZE];

        let (prefix, name) = split_name(&self.name)?;
        record[PREFIX][..prefix.len()].copy_from_slice(prefix.as_bytes());
        record[NAME][..name.len()].copy_from_slice(name.as_bytes());

        write_octal(&mut record[MODE], u64::from(self.mode))?;
        write_octal(&mut record[UID], 0)?;
        write_octal(&mut record[GID], 0)?;
        write_octal(&mut record[SIZE], self.size)?;
        write_octal(&mut record[MTIME], self.mtime)?;
        record[TYPEFLAG] = self.typeflag;
        record[MAGIC].copy_from_slice(USTAR_MAGIC);
        record[VERSION].copy_from_slice(b"00");

        write_checksum(&mut record)?;
        Ok(record)
    }
}

/// `size` rounded up to a whole number of records, if representable.
pub fn padded_size(size: u64) -> Option<u64> {
    size.checked_next_multiple_of(RECORD_SIZE as u64)
}

/// Unsigned byte sum with the checksum field read as spaces.
pub fn checksum(record: &[u8; RECORD_SIZE]) -> u32 {
    record
        .iter()
        .enumerate()
        .map(|(i, &b)| if CHECKSUM.contains(&i) { u32::from(b' ') } else { u32::from(b) })
        .sum()
}

/// Store the checksum of `record` in its checksum field.
pub fn write_checksum(record: &mut [u8; RECORD_SIZE]) -> Result<(), FsError> {
    let sum = checksum(record);
    write_octal(&mut record[CHECKSUM.start..CHECKSUM.end - 1], u64::from(sum))?;
    record[CHECKSUM.end - 1] = b' ';
    Ok(())
}

/// Parse an octal field: leading spaces skipped, ends at the first
/// non-octal byte. `None` when there are no digits.
fn parse_octal(field: &[u8]) -> Option<u64> {
    let digits = field.iter().skip_while(|&&b| b == b' ');
    let mut value: u64 = 0;
    let mut seen = false;
    for &b in digits {
        if !(b'0'..=b'7').contains(&b) {
            break;
        }
        value = value.checked_mul(8)?.checked_add(u64::from(b - b'0'))?;
        seen = true;
    }
    seen.then_some(value)
}

/// Size field, accepting the GNU base-256 form for large files.
/// `None` when a base-256 value does not fit in 64 bits.
fn parse_size(field: &[u8]) -> Option<u64> {
    if field[0] & 0x80 == 0 {
        return Some(parse_octal(field).unwrap_or(0));
    }
    let mut value = u64::from(field[0] & 0x7f);
    for &b in &field[1..] {
        value = value.checked_mul(256)?.checked_add(u64::from(b))?;
    }
    Some(value)
}

/// Zero-padded octal, NUL terminated.
fn write_octal(field: &mut [u8], value: u64) -> Result<(), FsError> {
    let width = field.len() - 1;
    let mut rest = value;
    for slot in field[..width].iter_mut().rev() {
        *slot = b'0' + (rest & 7) as u8;
        rest >>= 3;
    }
    if rest != 0 {
        return Err(FsError::invalid_argument("value does not fit tar header field"));
    }
    field[width] = 0;
    Ok(())
}

fn field_str(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

fn split_name(name: &str) -> Result<(&str, &str), FsError> {
    let name_max = NAME.len();
    if name.len() <= name_max {
        return Ok(("", name));
    }
    let prefix_max = PREFIX.len();
    name.char_indices()
        .filter(|&(i, c)| c == path::SEPARATOR && i <= prefix_max && name.len() - i - 1 <= name_max)
        .map(|(i, _)| (&name[..i], &name[i + 1..]))
        .find(|(_, rest)| !rest.is_empty())
        .ok_or(FsError::NameTooLong)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(name: &str, size: u64, typeflag: u8) -> TarHeader {
        TarHeader {
            name: name.into(),
            mode: 0o644,
            size,
            mtime: 1_700_000_000,
            typeflag,
        }
    }

    #[test]
    fn test_decode_encoded() {
        let original = header("lib/foo.py", 1234, TYPE_FILE);
        let record = original.encode().unwrap();
        assert_eq!(&record[257..263], b"ustar\0");

        let decoded = TarHeader::decode(&record).unwrap();
        assert_eq!(decoded, original);
        assert_eq!(decoded.kind(), EntryKind::File);
        assert_eq!(decoded.span(), Some(512 + 1536));
    }

    #[test]
    fn test_null_record() {
        let record = [0u8; RECORD_SIZE];
        assert_eq!(TarHeader::decode(&record), Err(TarError::NullRecord));
    }

    #[test]
    fn test_bad_checksum() {
        let mut record = header("a.txt", 1, TYPE_FILE).encode().unwrap();
        record[0] = b'b';
        assert_eq!(TarHeader::decode(&record), Err(TarError::BadChecksum));

        let mut garbage = [0x41u8; RECORD_SIZE];
        garbage[148] = b'x';
        assert_eq!(TarHeader::decode(&garbage), Err(TarError::BadChecksum));
    }

    #[test]
    fn test_checksum_counts_field_as_spaces() {
        let record = header("x", 0, TYPE_FILE).encode().unwrap();
        let mut blanked = record;
        blanked[148..156].copy_from_slice(b"        ");
        let manual: u32 = blanked.iter().map(|&b| u32::from(b)).sum();
        assert_eq!(checksum(&record), manual);
    }

    #[test]
    fn test_directory_kind() {
        assert_eq!(header("lib", 0, TYPE_DIRECTORY).kind(), EntryKind::Directory);
        assert_eq!(header("lib/", 0, TYPE_FILE).kind(), EntryKind::Directory);
        assert_eq!(header("./lib/", 0, TYPE_DIRECTORY).clean_name(), "lib");
    }

    #[test]
    fn test_long_name_uses_prefix() {
        let dir = "d".repeat(120);
        let name = alloc::format!("{}/file.txt", dir);
        let record = header(&name, 3, TYPE_FILE).encode().unwrap();
        assert_eq!(&record[0..8], b"file.txt");

        let decoded = TarHeader::decode(&record).unwrap();
        assert_eq!(decoded.name, name);
    }

    #[test]
    fn test_unsplittable_name() {
        let name = "n".repeat(150);
        assert_eq!(header(&name, 0, TYPE_FILE).encode(), Err(FsError::NameTooLong));
    }

    #[test]
    fn test_base256_size() {
        let mut field = [0u8; 12];
        field[0] = 0x80;
        field[7] = 0x02;
        field[11] = 0x01;
        assert_eq!(parse_size(&field), Some((2u64 << 32) | 1));
    }

    #[test]
    fn test_base256_size_overflow() {
        let mut field = [0xFFu8; 12];
        assert_eq!(parse_size(&field), None);

        // Fits in 64 bits but cannot be padded to a whole record.
        field[..4].copy_from_slice(&[0x80, 0, 0, 0]);
        let mut record = header("big.bin", 0, TYPE_FILE).encode().unwrap();
        record[SIZE].copy_from_slice(&field);
        write_checksum(&mut record).unwrap();
        assert_eq!(TarHeader::decode(&record), Err(TarError::BadSize));

        record[SIZE].copy_from_slice(&[0xFF; 12]);
        write_checksum(&mut record).unwrap();
        assert_eq!(TarHeader::decode(&record), Err(TarError::BadSize));
    }

    #[test]
    fn test_parse_octal_variants() {
        assert_eq!(parse_octal(b"0000644\0"), Some(0o644));
        assert_eq!(parse_octal(b"   755 \0"), Some(0o755));
        assert_eq!(parse_octal(b"\0\0\0\0"), None);
    }

    #[test]
    fn test_padded_size() {
        assert_eq!(padded_size(0), Some(0));
        assert_eq!(padded_size(1), Some(512));
        assert_eq!(padded_size(512), Some(512));
        assert_eq!(padded_size(513), Some(1024));
        assert_eq!(padded_size(u64::MAX), None);
    }
}

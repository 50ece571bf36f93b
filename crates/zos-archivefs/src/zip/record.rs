//! ZIP record codec.
//!
//! Three fixed-layout little-endian records are read; each starts with a
//! 4-byte signature that is checked before any other field is touched.
//!
//! ```text
//! ┌──────────────────┬──────┬──────────────────┬──────┬─────────────┬──────┐
//! │ local header + A │ data │ local header + B │ data │ central dir │ EOCD │
//! └──────────────────┴──────┴──────────────────┴──────┴─────────────┴──────┘
//!                                                       ▲               │
//!                                                       └── offset_cd ──┘
//! ```

use crate::error::ZipError;

/// End-of-central-directory record size (without comment).
pub const EOCD_SIZE: usize = 22;
/// Central directory file header size (without name, extra, comment).
pub const CD_HEADER_SIZE: usize = 46;
/// Local file header size (without name, extra).
pub const LOCAL_HEADER_SIZE: usize = 30;

/// `PK\x05\x06`
pub const EOCD_SIGNATURE: [u8; 4] = [0x50, 0x4b, 0x05, 0x06];
/// `PK\x01\x02`
pub const CD_SIGNATURE: [u8; 4] = [0x50, 0x4b, 0x01, 0x02];
/// `PK\x03\x04`
pub const LOCAL_SIGNATURE: [u8; 4] = [0x50, 0x4b, 0x03, 0x04];

/// Compression method: stored.
pub const METHOD_STORED: u16 = 0;

fn u16_at(buf: &[u8], off: usize) -> u16 {
    u16::from_le_bytes([buf[off], buf[off + 1]])
}

fn u32_at(buf: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}

fn put_u16(buf: &mut [u8], off: usize, value: u16) {
    buf[off..off + 2].copy_from_slice(&value.to_le_bytes());
}

fn put_u32(buf: &mut [u8], off: usize, value: u32) {
    buf[off..off + 4].copy_from_slice(&value.to_le_bytes());
}

/// End of central directory record.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EndOfCentralDir {
    pub disk_number: u16,
    pub disk_number_cd: u16,
    pub disk_entries: u16,
    pub total_entries: u16,
    pub cd_size: u32,
    pub offset_cd: u32,
    pub comment_len: u16,
}

impl EndOfCentralDir {
    pub fn decode(buf: &[u8; EOCD_SIZE]) -> Result<Self, ZipError> {
        if buf[..4] != EOCD_SIGNATURE {
            return Err(ZipError::BadSignature);
        }
        Ok(Self {
            disk_number: u16_at(buf, 4),
            disk_number_cd: u16_at(buf, 6),
            disk_entries: u16_at(buf, 8),
            total_entries: u16_at(buf, 10),
            cd_size: u32_at(buf, 12),
            offset_cd: u32_at(buf, 16),
            comment_len: u16_at(buf, 20),
        })
    }

    pub fn encode(&self) -> [u8; EOCD_SIZE] {
        let mut buf = [0u8; EOCD_SIZE];
        buf[..4].copy_from_slice(&EOCD_SIGNATURE);
        put_u16(&mut buf, 4, self.disk_number);
        put_u16(&mut buf, 6, self.disk_number_cd);
        put_u16(&mut buf, 8, self.disk_entries);
        put_u16(&mut buf, 10, self.total_entries);
        put_u32(&mut buf, 12, self.cd_size);
        put_u32(&mut buf, 16, self.offset_cd);
        put_u16(&mut buf, 20, self.comment_len);
        buf
    }

    /// Reject archives split over several disks.
    pub fn check_single_disk(&self) -> Result<(), ZipError> {
        if self.disk_number != 0 || self.disk_number_cd != 0 {
            return Err(ZipError::MultiDisk);
        }
        Ok(())
    }
}

/// Offset of the last EOCD signature in `buf` with room for a whole record.
pub fn find_eocd(buf: &[u8]) -> Option<usize> {
    if buf.len() < EOCD_SIZE {
        return None;
    }
    (0..=buf.len() - EOCD_SIZE)
        .rev()
        .find(|&i| buf[i..i + 4] == EOCD_SIGNATURE)
}

/// Central directory file header.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CentralDirRecord {
    pub version: u16,
    pub version_needed: u16,
    pub flags: u16,
    pub compression: u16,
    pub mod_time: u16,
    pub mod_date: u16,
    pub crc32: u32,
    pub size_compressed: u32,
    pub size_uncompressed: u32,
    pub file_name_len: u16,
    pub extra_field_len: u16,
    pub comment_len: u16,
    pub disk_num: u16,
    pub internal_attr: u16,
    pub external_attr: u32,
    pub offset_local_header: u32,
}

impl CentralDirRecord {
    pub fn decode(buf: &[u8; CD_HEADER_SIZE]) -> Result<Self, ZipError> {
        if buf[..4] != CD_SIGNATURE {
            return Err(ZipError::BadSignature);
        }
        Ok(Self {
            version: u16_at(buf, 4),
            version_needed: u16_at(buf, 6),
            flags: u16_at(buf, 8),
            compression: u16_at(buf, 10),
            mod_time: u16_at(buf, 12),
            mod_date: u16_at(buf, 14),
            crc32: u32_at(buf, 16),
            size_compressed: u32_at(buf, 20),
            size_uncompressed: u32_at(buf, 24),
            file_name_len: u16_at(buf, 28),
            extra_field_len: u16_at(buf, 30),
            comment_len: u16_at(buf, 32),
            disk_num: u16_at(buf, 34),
            internal_attr: u16_at(buf, 36),
            external_attr: u32_at(buf, 38),
            offset_local_header: u32_at(buf, 42),
        })
    }

    pub fn encode(&self) -> [u8; CD_HEADER_SIZE] {
        let mut buf = [0u8; CD_HEADER_SIZE];
        buf[..4].copy_from_slice(&CD_SIGNATURE);
        put_u16(&mut buf, 4, self.version);
        put_u16(&mut buf, 6, self.version_needed);
        put_u16(&mut buf, 8, self.flags);
        put_u16(&mut buf, 10, self.compression);
        put_u16(&mut buf, 12, self.mod_time);
        put_u16(&mut buf, 14, self.mod_date);
        put_u32(&mut buf, 16, self.crc32);
        put_u32(&mut buf, 20, self.size_compressed);
        put_u32(&mut buf, 24, self.size_uncompressed);
        put_u16(&mut buf, 28, self.file_name_len);
        put_u16(&mut buf, 30, self.extra_field_len);
        put_u16(&mut buf, 32, self.comment_len);
        put_u16(&mut buf, 34, self.disk_num);
        put_u16(&mut buf, 36, self.internal_attr);
        put_u32(&mut buf, 38, self.external_attr);
        put_u32(&mut buf, 42, self.offset_local_header);
        buf
    }

    /// Bytes of name, extra field and comment following the fixed header.
    pub fn trailer_len(&self) -> u64 {
        u64::from(self.file_name_len) + u64::from(self.extra_field_len) + u64::from(self.comment_len)
    }

    /// Bytes from this record to the next one.
    pub fn span(&self) -> u64 {
        CD_HEADER_SIZE as u64 + self.trailer_len()
    }

    /// Modification time in Unix seconds.
    pub fn mtime(&self) -> u64 {
        dos_to_unix(self.mod_date, self.mod_time)
    }
}

/// Local file header.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LocalFileHeader {
    pub version_needed: u16,
    pub flags: u16,
    pub compression: u16,
    pub mod_time: u16,
    pub mod_date: u16,
    pub crc32: u32,
    pub size_compressed: u32,
    pub size_uncompressed: u32,
    pub file_name_len: u16,
    pub extra_field_len: u16,
}

impl LocalFileHeader {
    pub fn decode(buf: &[u8; LOCAL_HEADER_SIZE]) -> Result<Self, ZipError> {
        if buf[..4] != LOCAL_SIGNATURE {
            return Err(ZipError::BadSignature);
        }
        Ok(Self {
            version_needed: u16_at(buf, 4),
            flags: u16_at(buf, 6),
            compression: u16_at(buf, 8),
            mod_time: u16_at(buf, 10),
            mod_date: u16_at(buf, 12),
            crc32: u32_at(buf, 14),
            size_compressed: u32_at(buf, 18),
            size_uncompressed: u32_at(buf, 22),
            file_name_len: u16_at(buf, 26),
            extra_field_len: u16_at(buf, 28),
        })
    }

    pub fn encode(&self) -> [u8; LOCAL_HEADER_SIZE] {
        let mut buf = [0u8; LOCAL_HEADER_SIZE];
        buf[..4].copy_from_slice(&LOCAL_SIGNATURE);
        put_u16(&mut buf, 4, self.version_needed);
        put_u16(&mut buf, 6, self.flags);
        put_u16(&mut buf, 8, self.compression);
        put_u16(&mut buf, 10, self.mod_time);
        put_u16(&mut buf, 12, self.mod_date);
        put_u32(&mut buf, 14, self.crc32);
        put_u32(&mut buf, 18, self.size_compressed);
        put_u32(&mut buf, 22, self.size_uncompressed);
        put_u16(&mut buf, 26, self.file_name_len);
        put_u16(&mut buf, 28, self.extra_field_len);
        buf
    }

    /// Offset of the entry data from the start of this header.
    pub fn data_offset(&self) -> u64 {
        LOCAL_HEADER_SIZE as u64 + u64::from(self.file_name_len) + u64::from(self.extra_field_len)
    }
}

/// Days from 1970-01-01 to a proleptic Gregorian date.
fn days_from_civil(year: i64, month: u32, day: u32) -> i64 {
    let y = if month <= 2 { year - 1 } else { year };
    let era = y.div_euclid(400);
    let yoe = y - era * 400;
    let m = i64::from(month);
    let doy = (153 * (if m > 2 { m - 3 } else { m + 9 }) + 2) / 5 + i64::from(day) - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

/// Inverse of [`days_from_civil`].
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}

/// MS-DOS date and time to Unix seconds.
///
/// Out-of-range months and days are clamped so a zeroed stamp maps to
/// 1980-01-01.
pub fn dos_to_unix(date: u16, time: u16) -> u64 {
    let year = i64::from((date >> 9) & 0x7f) + 1980;
    let month = u32::from((date >> 5) & 0x0f).clamp(1, 12);
    let day = u32::from(date & 0x1f).max(1);
    let hour = u64::from(time >> 11);
    let minute = u64::from((time >> 5) & 0x3f);
    let second = u64::from(time & 0x1f) * 2;

    let days = days_from_civil(year, month, day) as u64;
    days * 86_400 + hour * 3600 + minute * 60 + second
}

/// Unix seconds to MS-DOS `(date, time)`. Times before 1980 clamp to 1980.
pub fn unix_to_dos(seconds: u64) -> (u16, u16) {
    let seconds = seconds.max(DOS_EPOCH);
    let (year, month, day) = civil_from_days((seconds / 86_400) as i64);
    let rem = seconds % 86_400;
    let date = (((year - 1980).min(127) as u16) << 9) | ((month as u16) << 5) | day as u16;
    let time = (((rem / 3600) as u16) << 11) | ((((rem / 60) % 60) as u16) << 5) | ((rem % 60) / 2) as u16;
    (date, time)
}

/// 1980-01-01 00:00:00 in Unix seconds.
pub const DOS_EPOCH: u64 = 315_532_800;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eocd_decode() {
        let eocd = EndOfCentralDir {
            total_entries: 3,
            disk_entries: 3,
            cd_size: 150,
            offset_cd: 1000,
            ..Default::default()
        };
        let bytes = eocd.encode();
        assert_eq!(&bytes[..4], &[0x50, 0x4b, 0x05, 0x06]);
        assert_eq!(&bytes[16..20], &1000u32.to_le_bytes());
        assert_eq!(EndOfCentralDir::decode(&bytes).unwrap(), eocd);
        assert!(eocd.check_single_disk().is_ok());

        let split = EndOfCentralDir { disk_number_cd: 1, ..eocd };
        assert_eq!(split.check_single_disk(), Err(ZipError::MultiDisk));
    }

    #[test]
    fn test_find_eocd_prefers_last_complete_record() {
        let mut buf = alloc::vec![0u8; 64];
        buf[2..6].copy_from_slice(&EOCD_SIGNATURE);
        buf[30..34].copy_from_slice(&EOCD_SIGNATURE);
        // Too close to the end to hold a whole record
        buf[50..54].copy_from_slice(&EOCD_SIGNATURE);
        assert_eq!(find_eocd(&buf), Some(30));
        assert_eq!(find_eocd(&buf[..20]), None);
        assert_eq!(find_eocd(&[0u8; 40]), None);
    }

    #[test]
    fn test_cd_record_fields() {
        let mut bytes = [0u8; CD_HEADER_SIZE];
        bytes[..4].copy_from_slice(&CD_SIGNATURE);
        bytes[10] = 8;
        bytes[24..28].copy_from_slice(&12u32.to_le_bytes());
        bytes[28] = 7;
        bytes[30] = 4;
        bytes[32] = 2;
        bytes[42..46].copy_from_slice(&0x1234u32.to_le_bytes());

        let record = CentralDirRecord::decode(&bytes).unwrap();
        assert_eq!(record.compression, 8);
        assert_eq!(record.size_uncompressed, 12);
        assert_eq!(record.trailer_len(), 13);
        assert_eq!(record.span(), 59);
        assert_eq!(record.offset_local_header, 0x1234);
        assert_eq!(record.encode(), bytes);
    }

    #[test]
    fn test_bad_signatures() {
        assert_eq!(
            CentralDirRecord::decode(&[0u8; CD_HEADER_SIZE]),
            Err(ZipError::BadSignature)
        );
        assert_eq!(
            LocalFileHeader::decode(&[0u8; LOCAL_HEADER_SIZE]),
            Err(ZipError::BadSignature)
        );
        assert_eq!(EndOfCentralDir::decode(&[0u8; EOCD_SIZE]), Err(ZipError::BadSignature));
    }

    #[test]
    fn test_local_header_data_offset() {
        let header = LocalFileHeader {
            file_name_len: 7,
            extra_field_len: 9,
            ..Default::default()
        };
        let decoded = LocalFileHeader::decode(&header.encode()).unwrap();
        assert_eq!(decoded.data_offset(), 46);
    }

    #[test]
    fn test_dos_time() {
        assert_eq!(dos_to_unix(0x0021, 0), DOS_EPOCH);
        assert_eq!(dos_to_unix(0, 0), DOS_EPOCH);
        // 2024-02-29 13:45:30
        let date = ((2024 - 1980) << 9) | (2 << 5) | 29;
        let time = (13 << 11) | (45 << 5) | 15;
        assert_eq!(dos_to_unix(date, time), 1_709_214_330);
        assert_eq!(unix_to_dos(1_709_214_330), (date, time));
        assert_eq!(unix_to_dos(0), (0x0021, 0));
    }
}

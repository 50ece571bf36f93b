//! ZIP image writer (stored entries only).

use alloc::string::String;
use alloc::vec::Vec;

use super::record::{
    unix_to_dos, CentralDirRecord, EndOfCentralDir, LocalFileHeader, METHOD_STORED,
};
use crate::error::FsError;

const VERSION_STORED: u16 = 10;
const ATTR_DIRECTORY: u32 = 0x10;

struct PendingEntry {
    name: String,
    payload: Vec<u8>,
    method: u16,
    crc32: u32,
    mtime: u64,
    external_attr: u32,
}

/// Builds a single-disk ZIP image in memory.
#[derive(Default)]
pub struct ZipBuilder {
    entries: Vec<PendingEntry>,
    comment: Vec<u8>,
    mtime: u64,
}

impl ZipBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Modification time (Unix seconds) stamped on entries added after this.
    pub fn set_mtime(&mut self, mtime: u64) -> &mut Self {
        self.mtime = mtime;
        self
    }

    /// Archive comment stored after the end-of-central-directory record.
    pub fn set_comment(&mut self, comment: &[u8]) -> Result<&mut Self, FsError> {
        if comment.len() > usize::from(u16::MAX) {
            return Err(FsError::invalid_argument("zip comment too long"));
        }
        self.comment = comment.to_vec();
        Ok(self)
    }

    /// Append a stored file.
    pub fn add_file(&mut self, name: &str, contents: &[u8]) -> Result<&mut Self, FsError> {
        let crc32 = crc32fast::hash(contents);
        self.push(String::from(name), contents.to_vec(), METHOD_STORED, crc32, 0)
    }

    /// Append an explicit directory record (stored as `name/`).
    pub fn add_dir(&mut self, name: &str) -> Result<&mut Self, FsError> {
        let mut stored = String::from(name.trim_end_matches('/'));
        stored.push('/');
        self.push(stored, Vec::new(), METHOD_STORED, 0, ATTR_DIRECTORY)
    }

    /// Append an entry whose payload is already encoded with `method`.
    ///
    /// The payload is written as is; `crc32` is the checksum of the
    /// uncompressed data.
    pub fn add_encoded(
        &mut self,
        name: &str,
        payload: &[u8],
        method: u16,
        crc32: u32,
    ) -> Result<&mut Self, FsError> {
        self.push(String::from(name), payload.to_vec(), method, crc32, 0)
    }

    /// Lay out local headers, data, central directory and EOCD.
    pub fn finish(self) -> Result<Vec<u8>, FsError> {
        let mut out = Vec::new();
        let mut central = Vec::new();

        for entry in &self.entries {
            let offset = to_u32(out.len(), "archive too large")?;
            let size = to_u32(entry.payload.len(), "entry too large")?;
            let name_len = to_u16(entry.name.len(), "entry name too long")?;
            let (mod_date, mod_time) = unix_to_dos(entry.mtime);

            let local = LocalFileHeader {
                version_needed: VERSION_STORED,
                compression: entry.method,
                mod_time,
                mod_date,
                crc32: entry.crc32,
                size_compressed: size,
                size_uncompressed: size,
                file_name_len: name_len,
                ..Default::default()
            };
            out.extend_from_slice(&local.encode());
            out.extend_from_slice(entry.name.as_bytes());
            out.extend_from_slice(&entry.payload);

            let record = CentralDirRecord {
                version: VERSION_STORED,
                version_needed: VERSION_STORED,
                compression: entry.method,
                mod_time,
                mod_date,
                crc32: entry.crc32,
                size_compressed: size,
                size_uncompressed: size,
                file_name_len: name_len,
                external_attr: entry.external_attr,
                offset_local_header: offset,
                ..Default::default()
            };
            central.extend_from_slice(&record.encode());
            central.extend_from_slice(entry.name.as_bytes());
        }

        let count = to_u16(self.entries.len(), "too many entries")?;
        let eocd = EndOfCentralDir {
            disk_entries: count,
            total_entries: count,
            cd_size: to_u32(central.len(), "central directory too large")?,
            offset_cd: to_u32(out.len(), "archive too large")?,
            comment_len: self.comment.len() as u16,
            ..Default::default()
        };
        out.extend_from_slice(&central);
        out.extend_from_slice(&eocd.encode());
        out.extend_from_slice(&self.comment);
        Ok(out)
    }

    fn push(
        &mut self,
        name: String,
        payload: Vec<u8>,
        method: u16,
        crc32: u32,
        external_attr: u32,
    ) -> Result<&mut Self, FsError> {
        to_u16(name.len(), "entry name too long")?;
        to_u32(payload.len(), "entry too large")?;
        self.entries.push(PendingEntry {
            name,
            payload,
            method,
            crc32,
            mtime: self.mtime,
            external_attr,
        });
        Ok(self)
    }
}

fn to_u16(value: usize, what: &str) -> Result<u16, FsError> {
    u16::try_from(value).map_err(|_| FsError::invalid_argument(what))
}

fn to_u32(value: usize, what: &str) -> Result<u32, FsError> {
    u32::try_from(value).map_err(|_| FsError::invalid_argument(what))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zip::record::{find_eocd, CD_HEADER_SIZE, EOCD_SIZE, LOCAL_HEADER_SIZE};

    #[test]
    fn test_layout() {
        let mut builder = ZipBuilder::new();
        builder.add_file("a.txt", b"hello").unwrap();
        builder.add_dir("lib").unwrap();
        let image = builder.finish().unwrap();

        let cd_offset = LOCAL_HEADER_SIZE + 5 + 5 + LOCAL_HEADER_SIZE + 4;
        let cd_size = CD_HEADER_SIZE + 5 + CD_HEADER_SIZE + 4;
        assert_eq!(image.len(), cd_offset + cd_size + EOCD_SIZE);
        assert_eq!(&image[LOCAL_HEADER_SIZE + 5..LOCAL_HEADER_SIZE + 10], b"hello");

        let at = find_eocd(&image).unwrap();
        let eocd = EndOfCentralDir::decode(image[at..at + EOCD_SIZE].try_into().unwrap()).unwrap();
        assert_eq!(eocd.total_entries, 2);
        assert_eq!(eocd.offset_cd as usize, cd_offset);
        assert_eq!(eocd.cd_size as usize, cd_size);

        let first = CentralDirRecord::decode(
            image[cd_offset..cd_offset + CD_HEADER_SIZE].try_into().unwrap(),
        )
        .unwrap();
        assert_eq!(first.crc32, crc32fast::hash(b"hello"));
        assert_eq!(first.offset_local_header, 0);
    }

    #[test]
    fn test_comment_follows_eocd() {
        let mut builder = ZipBuilder::new();
        builder.set_comment(b"built for tests").unwrap();
        let image = builder.finish().unwrap();
        assert_eq!(image.len(), EOCD_SIZE + 15);
        assert_eq!(find_eocd(&image), Some(0));
    }
}

//! TAR image writer.
//!
//! Produces USTAR images the driver can mount, for building boot images on
//! a host and for tests.

use alloc::string::String;
use alloc::vec::Vec;

use super::header::{TarHeader, RECORD_SIZE, TYPE_DIRECTORY, TYPE_FILE};
use crate::error::FsError;

/// Builds a TAR image in memory.
#[derive(Clone, Debug, Default)]
pub struct TarBuilder {
    data: Vec<u8>,
    mtime: u64,
}

impl TarBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Modification time (Unix seconds) stamped on entries added after this.
    pub fn set_mtime(&mut self, mtime: u64) -> &mut Self {
        self.mtime = mtime;
        self
    }

    /// Append a regular file.
    pub fn add_file(&mut self, name: &str, contents: &[u8]) -> Result<&mut Self, FsError> {
        self.push_header(String::from(name), contents.len() as u64, TYPE_FILE)?;
        self.data.extend_from_slice(contents);
        let padding = (RECORD_SIZE - contents.len() % RECORD_SIZE) % RECORD_SIZE;
        self.data.resize(self.data.len() + padding, 0);
        Ok(self)
    }

    /// Append an explicit directory record (stored as `name/`).
    pub fn add_dir(&mut self, name: &str) -> Result<&mut Self, FsError> {
        let mut stored = String::from(name.trim_end_matches('/'));
        stored.push('/');
        self.push_header(stored, 0, TYPE_DIRECTORY)?;
        Ok(self)
    }

    /// Bytes written so far.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if nothing has been added.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Terminate the archive with two null records.
    pub fn finish(mut self) -> Vec<u8> {
        self.data.resize(self.data.len() + 2 * RECORD_SIZE, 0);
        self.data
    }

    fn push_header(&mut self, name: String, size: u64, typeflag: u8) -> Result<(), FsError> {
        let mode = if typeflag == TYPE_DIRECTORY { 0o755 } else { 0o644 };
        let header = TarHeader {
            name,
            mode,
            size,
            mtime: self.mtime,
            typeflag,
        };
        self.data.extend_from_slice(&header.encode()?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let mut builder = TarBuilder::new();
        builder.add_dir("lib").unwrap();
        builder.add_file("lib/a.py", b"print(1)").unwrap();
        assert_eq!(builder.len(), 3 * RECORD_SIZE);

        let image = builder.finish();
        assert_eq!(image.len(), 5 * RECORD_SIZE);
        assert_eq!(&image[..4], b"lib/");
        assert_eq!(&image[2 * RECORD_SIZE..2 * RECORD_SIZE + 8], b"print(1)");
        assert!(image[3 * RECORD_SIZE..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_mtime_applies_to_later_entries() {
        let mut builder = TarBuilder::new();
        builder.add_file("old", b"").unwrap();
        builder.set_mtime(42);
        builder.add_file("new", b"").unwrap();
        let image = builder.finish();

        let first: &[u8; RECORD_SIZE] = image[..RECORD_SIZE].try_into().unwrap();
        let second: &[u8; RECORD_SIZE] = image[RECORD_SIZE..2 * RECORD_SIZE].try_into().unwrap();
        assert_eq!(TarHeader::decode(first).unwrap().mtime, 0);
        assert_eq!(TarHeader::decode(second).unwrap().mtime, 42);
    }
}

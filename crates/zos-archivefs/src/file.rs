//! Open file handles.
//!
//! A handle is a cursor over one entry's data region. The region is
//! contiguous on the device for both formats (TAR data follows its header,
//! stored ZIP data follows its local header), so the whole state is the
//! start address, the size and how much is left.

use zos_blockdev::BlockDevice;

use crate::block::{BlockAddress, BlockIo};
use crate::error::FsError;

/// Seek origin, mirroring `std::io::SeekFrom`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SeekFrom {
    /// Absolute position
    Start(u64),
    /// Relative to the end of the file
    End(i64),
    /// Relative to the current position
    Current(i64),
}

/// Read-only handle on an archive entry.
pub struct FileHandle<'a, D: BlockDevice + ?Sized> {
    io: BlockIo<'a, D>,
    data_start: BlockAddress,
    cursor: BlockAddress,
    size: u64,
    remaining: u64,
    closed: bool,
}

impl<'a, D: BlockDevice + ?Sized> FileHandle<'a, D> {
    pub(crate) fn new(io: BlockIo<'a, D>, data_start: BlockAddress, size: u64) -> Self {
        Self {
            io,
            data_start,
            cursor: data_start,
            size,
            remaining: size,
            closed: false,
        }
    }

    /// Entry size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Bytes left before end of file.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Current position.
    pub fn tell(&self) -> u64 {
        self.size - self.remaining
    }

    /// Check if the handle has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Read up to `buf.len()` bytes. Returns 0 at end of file.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, FsError> {
        self.check_open()?;
        let want = (buf.len() as u64).min(self.remaining) as usize;
        let block_size = self.io.block_size() as usize;

        let mut done = 0;
        while done < want {
            let chunk = (want - done).min(block_size);
            self.io.read_at(self.cursor, &mut buf[done..done + chunk])?;
            self.cursor = self.io.advance(self.cursor, chunk as u64);
            self.remaining -= chunk as u64;
            done += chunk;
        }
        Ok(done)
    }

    /// Read everything from the current position to end of file.
    pub fn read_to_end(&mut self) -> Result<alloc::vec::Vec<u8>, FsError> {
        self.check_open()?;
        let mut data = alloc::vec![0u8; self.remaining as usize];
        let n = self.read(&mut data)?;
        data.truncate(n);
        Ok(data)
    }

    /// Move the cursor. Positions past the end clamp to the end.
    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64, FsError> {
        self.check_open()?;
        let target = match pos {
            SeekFrom::Start(n) => i128::from(n),
            SeekFrom::End(delta) => i128::from(self.size) + i128::from(delta),
            SeekFrom::Current(delta) => i128::from(self.tell()) + i128::from(delta),
        };
        if target < 0 {
            return Err(FsError::invalid_argument("seek before start of file"));
        }
        let position = (target as u128).min(u128::from(self.size)) as u64;

        self.cursor = self.io.advance(self.data_start, position);
        self.remaining = self.size - position;
        Ok(position)
    }

    /// Archives are read only.
    pub fn write(&mut self, _buf: &[u8]) -> Result<usize, FsError> {
        Err(FsError::ReadOnly)
    }

    /// Close the handle. Closing twice is fine.
    pub fn close(&mut self) {
        self.closed = true;
    }

    fn check_open(&self) -> Result<(), FsError> {
        if self.closed {
            return Err(FsError::Closed);
        }
        Ok(())
    }
}

impl<'a, D: BlockDevice + ?Sized> core::fmt::Debug for FileHandle<'a, D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FileHandle")
            .field("data_start", &self.data_start)
            .field("size", &self.size)
            .field("remaining", &self.remaining)
            .field("closed", &self.closed)
            .finish()
    }
}

#[cfg(feature = "std")]
impl<'a, D: BlockDevice + ?Sized> std::io::Read for FileHandle<'a, D> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        FileHandle::read(self, buf).map_err(std::io::Error::from)
    }
}

#[cfg(feature = "std")]
impl<'a, D: BlockDevice + ?Sized> std::io::Seek for FileHandle<'a, D> {
    fn seek(&mut self, pos: std::io::SeekFrom) -> std::io::Result<u64> {
        let pos = match pos {
            std::io::SeekFrom::Start(n) => SeekFrom::Start(n),
            std::io::SeekFrom::End(n) => SeekFrom::End(n),
            std::io::SeekFrom::Current(n) => SeekFrom::Current(n),
        };
        FileHandle::seek(self, pos).map_err(std::io::Error::from)
    }
}

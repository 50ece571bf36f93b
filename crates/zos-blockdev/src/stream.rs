//! Stream-backed block device.
//!
//! Exposes a window `[start, start + len)` of any seekable byte stream (a
//! file, a cursor over a buffer, a flash partition wrapper) as a block
//! device. The final block may be partial; bytes past the end of the
//! window read as zero.
//!
//! Stream devices are read-only: the archive drivers never write, and
//! requiring `Write` would exclude read-only streams such as
//! `Cursor<&[u8]>`.

use std::cell::RefCell;
use std::io::{ErrorKind, Read, Seek, SeekFrom};

use crate::{BlockDevError, BlockDevice, BlockResult, Ioctl, DEFAULT_BLOCK_SIZE};

/// Block device over a seekable stream.
pub struct StreamBlockDevice<S> {
    stream: RefCell<S>,
    block_size: u32,
    /// Byte offset of block 0 within the stream
    start: u64,
    /// Length of the window in bytes
    len: u64,
}

impl<S: Read + Seek> StreamBlockDevice<S> {
    /// Expose the whole stream with the default 512-byte block size.
    pub fn new(stream: S) -> BlockResult<Self> {
        Self::with_window(stream, DEFAULT_BLOCK_SIZE, None, None)
    }

    /// Expose part of a stream.
    ///
    /// `start` must be block aligned and inside the stream. `len` defaults
    /// to everything from `start` to the end of the stream.
    pub fn with_window(
        mut stream: S,
        block_size: u32,
        start: Option<u64>,
        len: Option<u64>,
    ) -> BlockResult<Self> {
        if block_size == 0 {
            return Err(BlockDevError::InvalidArgument);
        }
        let stream_len = stream
            .seek(SeekFrom::End(0))
            .map_err(|_| BlockDevError::IoError)?;
        let start = start.unwrap_or(0);
        if start % u64::from(block_size) != 0 || (start != 0 && start >= stream_len) {
            return Err(BlockDevError::InvalidArgument);
        }
        let len = match len {
            Some(len) if len > 0 => len.min(stream_len - start),
            _ => stream_len - start,
        };
        log::debug!(
            "blockdev: stream window start={} len={} block_size={}",
            start,
            len,
            block_size
        );
        Ok(Self {
            stream: RefCell::new(stream),
            block_size,
            start,
            len,
        })
    }

    /// Give the stream back.
    pub fn into_inner(self) -> S {
        self.stream.into_inner()
    }

    fn read_at(&self, pos: u64, buf: &mut [u8]) -> BlockResult<()> {
        let end = pos
            .checked_add(buf.len() as u64)
            .ok_or(BlockDevError::OutOfRange)?;
        if end > self.padded_len() {
            return Err(BlockDevError::OutOfRange);
        }

        let mut stream = self.stream.borrow_mut();
        stream
            .seek(SeekFrom::Start(self.start + pos))
            .map_err(|_| BlockDevError::IoError)?;

        // The window may stop short of the padded final block.
        let available = self.len.saturating_sub(pos).min(buf.len() as u64) as usize;
        let (data, tail) = buf.split_at_mut(available);
        let mut filled = 0;
        while filled < data.len() {
            match stream.read(&mut data[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(_) => return Err(BlockDevError::IoError),
            }
        }
        data[filled..].fill(0);
        tail.fill(0);
        Ok(())
    }

    fn padded_len(&self) -> u64 {
        u64::from(self.block_count_inner()) * u64::from(self.block_size)
    }

    fn block_count_inner(&self) -> u32 {
        self.len.div_ceil(u64::from(self.block_size)) as u32
    }
}

impl<S: Read + Seek> BlockDevice for StreamBlockDevice<S> {
    fn ioctl(&self, op: Ioctl) -> BlockResult<u32> {
        match op {
            Ioctl::Init | Ioctl::Deinit | Ioctl::Sync => Ok(0),
            Ioctl::BlockCount => Ok(self.block_count_inner()),
            Ioctl::BlockSize => Ok(self.block_size),
            Ioctl::BlockErase(_) => Err(BlockDevError::ReadOnly),
        }
    }

    fn read_blocks(&self, block: u32, buf: &mut [u8]) -> BlockResult<()> {
        if buf.len() % self.block_size as usize != 0 {
            return Err(BlockDevError::BadBufferLength);
        }
        self.read_at(u64::from(block) * u64::from(self.block_size), buf)
    }

    fn write_blocks(&self, _block: u32, _buf: &[u8]) -> BlockResult<()> {
        Err(BlockDevError::ReadOnly)
    }

    fn read_ext(&self, block: u32, offset: u32, buf: &mut [u8]) -> BlockResult<()> {
        if offset as usize + buf.len() > self.block_size as usize {
            return Err(BlockDevError::BadBufferLength);
        }
        let pos = u64::from(block) * u64::from(self.block_size) + u64::from(offset);
        self.read_at(pos, buf)
    }

    fn write_ext(&self, _block: u32, _offset: u32, _buf: &[u8]) -> BlockResult<()> {
        Err(BlockDevError::ReadOnly)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn numbered(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn test_whole_stream_geometry() {
        let dev = StreamBlockDevice::new(Cursor::new(numbered(1300))).unwrap();
        assert_eq!(dev.block_size(), 512);
        // 1300 bytes round up to three blocks
        assert_eq!(dev.block_count().unwrap(), 3);
    }

    #[test]
    fn test_partial_final_block_reads_zero_tail() {
        let dev = StreamBlockDevice::new(Cursor::new(numbered(1300))).unwrap();
        let mut block = vec![0xFFu8; 512];
        dev.read_blocks(2, &mut block).unwrap();

        assert_eq!(block[0], (1024 % 251) as u8);
        assert_eq!(block[275], (1299 % 251) as u8);
        assert!(block[276..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_window_offsets_block_zero() {
        let data = numbered(4096);
        let dev =
            StreamBlockDevice::with_window(Cursor::new(data.as_slice()), 512, Some(1024), None)
                .unwrap();
        assert_eq!(dev.block_count().unwrap(), 6);

        let mut buf = [0u8; 4];
        dev.read_ext(0, 2, &mut buf).unwrap();
        assert_eq!(&buf, &data[1026..1030]);
    }

    #[test]
    fn test_window_rejects_unaligned_start() {
        let result = StreamBlockDevice::with_window(Cursor::new(numbered(4096)), 512, Some(100), None);
        assert!(matches!(result, Err(BlockDevError::InvalidArgument)));
    }

    #[test]
    fn test_window_len_limits_device() {
        let dev = StreamBlockDevice::with_window(Cursor::new(numbered(4096)), 512, None, Some(600))
            .unwrap();
        assert_eq!(dev.block_count().unwrap(), 2);

        let mut buf = [0u8; 512];
        assert_eq!(dev.read_blocks(2, &mut buf), Err(BlockDevError::OutOfRange));
    }

    #[test]
    fn test_writes_refused() {
        let dev = StreamBlockDevice::new(Cursor::new(numbered(512))).unwrap();
        assert_eq!(dev.write_blocks(0, &[0u8; 512]), Err(BlockDevError::ReadOnly));
        assert_eq!(dev.write_ext(0, 0, &[1]), Err(BlockDevError::ReadOnly));
    }
}

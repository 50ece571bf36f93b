//! In-memory block device.
//!
//! Holds a whole image in a `Vec<u8>` padded to a multiple of the block
//! size. Used to mount archives that already sit in RAM and as the test
//! device for the filesystem drivers.

use alloc::vec::Vec;
use core::cell::{Cell, RefCell};

use crate::{BlockDevError, BlockDevice, BlockResult, Ioctl};

/// Block device backed by an in-memory image.
pub struct MemoryBlockDevice {
    /// Image bytes, always a whole number of blocks
    data: RefCell<Vec<u8>>,
    /// Block size in bytes
    block_size: u32,
    /// Reject writes
    read_only: bool,
    /// Block whose reads fail with `IoError` (fault injection)
    faulty_block: Cell<Option<u32>>,
    /// Number of device read calls issued so far
    reads: Cell<u64>,
}

impl MemoryBlockDevice {
    /// Create a zero-filled device of `block_count` blocks.
    pub fn new(block_size: u32, block_count: u32) -> Self {
        let len = block_size as usize * block_count as usize;
        Self::from_parts(alloc::vec![0u8; len], block_size)
    }

    /// Create a device holding `image`, zero-padded to whole blocks.
    pub fn from_image(image: &[u8], block_size: u32) -> Self {
        let mut data = image.to_vec();
        let block = block_size.max(1) as usize;
        let padded = data.len().div_ceil(block) * block;
        data.resize(padded, 0);
        Self::from_parts(data, block_size)
    }

    fn from_parts(data: Vec<u8>, block_size: u32) -> Self {
        Self {
            data: RefCell::new(data),
            block_size,
            read_only: false,
            faulty_block: Cell::new(None),
            reads: Cell::new(0),
        }
    }

    /// Make the device refuse writes.
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Make every read touching `block` fail with `IoError`.
    pub fn fail_reads_at(&self, block: Option<u32>) {
        self.faulty_block.set(block);
    }

    /// Number of read calls the device has served.
    pub fn read_count(&self) -> u64 {
        self.reads.get()
    }

    /// Copy of the raw image.
    pub fn image(&self) -> Vec<u8> {
        self.data.borrow().clone()
    }

    fn byte_range(&self, block: u32, offset: u32, len: usize) -> BlockResult<(usize, usize)> {
        let start = block as usize * self.block_size as usize + offset as usize;
        let end = start.checked_add(len).ok_or(BlockDevError::OutOfRange)?;
        if end > self.data.borrow().len() {
            return Err(BlockDevError::OutOfRange);
        }
        Ok((start, end))
    }

    fn check_fault(&self, first: u32, len: usize, offset: u32) -> BlockResult<()> {
        if let Some(bad) = self.faulty_block.get() {
            let span = (offset as usize + len).div_ceil(self.block_size as usize) as u32;
            if bad >= first && bad < first + span.max(1) {
                return Err(BlockDevError::IoError);
            }
        }
        Ok(())
    }

    fn check_whole_blocks(&self, len: usize) -> BlockResult<()> {
        if self.block_size == 0 || len % self.block_size as usize != 0 {
            return Err(BlockDevError::BadBufferLength);
        }
        Ok(())
    }

    fn check_within_block(&self, offset: u32, len: usize) -> BlockResult<()> {
        if offset as usize + len > self.block_size as usize {
            return Err(BlockDevError::BadBufferLength);
        }
        Ok(())
    }

    fn copy_out(&self, block: u32, offset: u32, buf: &mut [u8]) -> BlockResult<()> {
        self.check_fault(block, buf.len(), offset)?;
        let (start, end) = self.byte_range(block, offset, buf.len())?;
        buf.copy_from_slice(&self.data.borrow()[start..end]);
        self.reads.set(self.reads.get() + 1);
        Ok(())
    }

    fn copy_in(&self, block: u32, offset: u32, buf: &[u8]) -> BlockResult<()> {
        if self.read_only {
            return Err(BlockDevError::ReadOnly);
        }
        let (start, end) = self.byte_range(block, offset, buf.len())?;
        self.data.borrow_mut()[start..end].copy_from_slice(buf);
        Ok(())
    }
}

impl BlockDevice for MemoryBlockDevice {
    fn ioctl(&self, op: Ioctl) -> BlockResult<u32> {
        match op {
            Ioctl::Init | Ioctl::Deinit | Ioctl::Sync => Ok(0),
            Ioctl::BlockSize => Ok(self.block_size),
            Ioctl::BlockCount => {
                let len = self.data.borrow().len();
                Ok((len / self.block_size.max(1) as usize) as u32)
            }
            Ioctl::BlockErase(block) => {
                let zeros = alloc::vec![0u8; self.block_size as usize];
                self.copy_in(block, 0, &zeros)?;
                Ok(0)
            }
        }
    }

    fn read_blocks(&self, block: u32, buf: &mut [u8]) -> BlockResult<()> {
        self.check_whole_blocks(buf.len())?;
        self.copy_out(block, 0, buf)
    }

    fn write_blocks(&self, block: u32, buf: &[u8]) -> BlockResult<()> {
        self.check_whole_blocks(buf.len())?;
        self.copy_in(block, 0, buf)
    }

    fn read_ext(&self, block: u32, offset: u32, buf: &mut [u8]) -> BlockResult<()> {
        self.check_within_block(offset, buf.len())?;
        self.copy_out(block, offset, buf)
    }

    fn write_ext(&self, block: u32, offset: u32, buf: &[u8]) -> BlockResult<()> {
        self.check_within_block(offset, buf.len())?;
        self.copy_in(block, offset, buf)
    }
}

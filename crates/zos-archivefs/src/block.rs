//! Block-spanning I/O.
//!
//! Archive records sit at arbitrary byte offsets, but the device only hands
//! out whole blocks. A [`BlockAddress`] names a byte as (block, offset within
//! block), and [`BlockIo`] reads or writes byte ranges at such an address,
//! splitting the request wherever it crosses a block boundary:
//!
//! ```text
//!            addr.offset
//!                 │◄──── first piece ────►│◄── second piece ──►│
//! ┌───────────────┼───────────────────────┬────────────────────┼────────┐
//! │          block N                      │     block N + 1    │        │
//! └───────────────────────────────────────┴─────────────────────────────┘
//! ```
//!
//! Nothing is cached: every call goes to the device.

use zos_blockdev::BlockDevice;

use crate::error::FsError;

/// Byte position on a block device: `block * block_size + offset`.
///
/// Invariant: `offset < block_size` for the block size the address was
/// built with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct BlockAddress {
    /// Block index
    pub block: u32,
    /// Offset within the block
    pub offset: u32,
}

impl BlockAddress {
    /// Start of the device.
    pub const ZERO: Self = Self { block: 0, offset: 0 };

    /// Address of an absolute byte position.
    pub fn from_byte_offset(pos: u64, block_size: u32) -> Self {
        Self::ZERO.advance(pos, block_size)
    }

    /// Address `n` bytes further on, carrying whole blocks out of the offset.
    ///
    /// Saturates at the last addressable block; use [`checked_advance`]
    /// when the distance comes from archive data.
    ///
    /// [`checked_advance`]: BlockAddress::checked_advance
    pub fn advance(self, n: u64, block_size: u32) -> Self {
        self.checked_advance(n, block_size).unwrap_or(Self {
            block: u32::MAX,
            offset: self.offset,
        })
    }

    /// Address `n` bytes further on, or `None` past block `u32::MAX`.
    pub fn checked_advance(self, n: u64, block_size: u32) -> Option<Self> {
        let block_size = u64::from(block_size);
        let total = u64::from(self.offset).checked_add(n)?;
        let block = u64::from(self.block).checked_add(total / block_size)?;
        Some(Self {
            block: u32::try_from(block).ok()?,
            offset: (total % block_size) as u32,
        })
    }

    /// Absolute byte position.
    pub fn byte_offset(self, block_size: u32) -> u64 {
        u64::from(self.block) * u64::from(block_size) + u64::from(self.offset)
    }
}

/// Byte-range I/O over a block device.
pub struct BlockIo<'a, D: BlockDevice + ?Sized> {
    device: &'a D,
    block_size: u32,
}

impl<'a, D: BlockDevice + ?Sized> Clone for BlockIo<'a, D> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a, D: BlockDevice + ?Sized> Copy for BlockIo<'a, D> {}

impl<'a, D: BlockDevice + ?Sized> BlockIo<'a, D> {
    /// Wrap a device whose block size is already known.
    pub fn new(device: &'a D, block_size: u32) -> Self {
        Self { device, block_size }
    }

    /// Block size used for address arithmetic.
    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    /// Address `n` bytes after `addr`.
    pub fn advance(&self, addr: BlockAddress, n: u64) -> BlockAddress {
        addr.advance(n, self.block_size)
    }

    /// Address `n` bytes after `addr`, if it is still addressable.
    pub fn checked_advance(&self, addr: BlockAddress, n: u64) -> Option<BlockAddress> {
        addr.checked_advance(n, self.block_size)
    }

    /// Fill `buf` with the bytes starting at `addr`.
    pub fn read_at(&self, addr: BlockAddress, buf: &mut [u8]) -> Result<(), FsError> {
        let mut addr = addr;
        let mut done = 0;
        while done < buf.len() {
            let len = self.piece_len(addr, buf.len() - done);
            self.device
                .read_ext(addr.block, addr.offset, &mut buf[done..done + len])?;
            done += len;
            addr = self.advance(addr, len as u64);
        }
        Ok(())
    }

    /// Write `buf` starting at `addr`.
    pub fn write_at(&self, addr: BlockAddress, buf: &[u8]) -> Result<(), FsError> {
        let mut addr = addr;
        let mut done = 0;
        while done < buf.len() {
            let len = self.piece_len(addr, buf.len() - done);
            self.device
                .write_ext(addr.block, addr.offset, &buf[done..done + len])?;
            done += len;
            addr = self.advance(addr, len as u64);
        }
        Ok(())
    }

    fn piece_len(&self, addr: BlockAddress, wanted: usize) -> usize {
        let room = (self.block_size - addr.offset) as usize;
        wanted.min(room)
    }
}

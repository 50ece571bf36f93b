//! Zero OS Block Device Contract
//!
//! A block device is logical storage exposing fixed-size block reads and
//! writes plus a small set of capability ioctls. Filesystem drivers consume
//! this contract and never care whether the blocks come from flash, an SD
//! controller, a VirtIO disk or a plain byte stream.
//!
//! # Components
//!
//! - **BlockDevice**: the trait every device implements
//! - **Ioctl**: capability / control requests (block size, block count, sync...)
//! - **MemoryBlockDevice**: a device backed by an in-memory image
//! - **StreamBlockDevice**: a window of a seekable stream exposed as blocks (`std`)
//!
//! # Addressing
//!
//! ```text
//! byte offset = block * block_size + offset
//!
//! ┌──────────────┬──────────────┬──────────────┬─────
//! │   block 0    │   block 1    │   block 2    │ ...
//! └──────────────┴──────────────┴──────────────┴─────
//!        read_ext(1, 100, buf) ──┘ starts 100 bytes into block 1
//! ```
//!
//! `read_blocks` / `write_blocks` move whole blocks. `read_ext` / `write_ext`
//! move any byte range inside a single block; devices that can address bytes
//! directly should override them.

#![cfg_attr(not(any(feature = "std", test)), no_std)]
extern crate alloc;

pub mod memory;
#[cfg(feature = "std")]
pub mod stream;

use alloc::boxed::Box;
use alloc::rc::Rc;
use alloc::sync::Arc;
use core::fmt;

pub use memory::MemoryBlockDevice;
#[cfg(feature = "std")]
pub use stream::StreamBlockDevice;

/// Block size assumed when a device does not report one.
pub const DEFAULT_BLOCK_SIZE: u32 = 512;

/// Control requests understood by block devices.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Ioctl {
    /// Bring the device up
    Init,
    /// Shut the device down, flushing pending writes
    Deinit,
    /// Flush pending writes
    Sync,
    /// Number of blocks on the device
    BlockCount,
    /// Size of one block in bytes
    BlockSize,
    /// Erase the given block
    BlockErase(u32),
}

/// Block device error type
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockDevError {
    /// Request touches blocks past the end of the device
    OutOfRange,
    /// Buffer length is not valid for the request
    BadBufferLength,
    /// Device refuses writes
    ReadOnly,
    /// Ioctl not implemented by this device
    Unsupported,
    /// I/O error during operation
    IoError,
    /// Invalid argument
    InvalidArgument,
}

impl fmt::Display for BlockDevError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockDevError::OutOfRange => write!(f, "Block out of range"),
            BlockDevError::BadBufferLength => write!(f, "Bad buffer length"),
            BlockDevError::ReadOnly => write!(f, "Device is read only"),
            BlockDevError::Unsupported => write!(f, "Unsupported ioctl"),
            BlockDevError::IoError => write!(f, "I/O error"),
            BlockDevError::InvalidArgument => write!(f, "Invalid argument"),
        }
    }
}

/// Result type for block device operations
pub type BlockResult<T> = Result<T, BlockDevError>;

/// Block-addressed storage.
///
/// All methods take `&self`: a device is a shared resource that may back
/// several mounts, so implementations use interior mutability where they
/// need state.
pub trait BlockDevice {
    /// Issue a control request. Requests without a meaningful answer
    /// (`Init`, `Sync`, ...) return `Ok(0)`.
    fn ioctl(&self, op: Ioctl) -> BlockResult<u32>;

    /// Read whole blocks starting at `block`.
    ///
    /// `buf.len()` must be a multiple of the block size.
    fn read_blocks(&self, block: u32, buf: &mut [u8]) -> BlockResult<()>;

    /// Write whole blocks starting at `block`.
    ///
    /// `buf.len()` must be a multiple of the block size.
    fn write_blocks(&self, block: u32, buf: &[u8]) -> BlockResult<()>;

    /// Read `buf.len()` bytes starting `offset` bytes into `block`.
    ///
    /// The range must not leave the block.
    fn read_ext(&self, block: u32, offset: u32, buf: &mut [u8]) -> BlockResult<()> {
        let block_size = self.ioctl(Ioctl::BlockSize)? as usize;
        let start = offset as usize;
        check_ext_range(block_size, start, buf.len())?;
        if start == 0 && buf.len() == block_size {
            return self.read_blocks(block, buf);
        }
        let mut scratch = alloc::vec![0u8; block_size];
        self.read_blocks(block, &mut scratch)?;
        buf.copy_from_slice(&scratch[start..start + buf.len()]);
        Ok(())
    }

    /// Write `buf` starting `offset` bytes into `block` (read-modify-write).
    fn write_ext(&self, block: u32, offset: u32, buf: &[u8]) -> BlockResult<()> {
        let block_size = self.ioctl(Ioctl::BlockSize)? as usize;
        let start = offset as usize;
        check_ext_range(block_size, start, buf.len())?;
        if start == 0 && buf.len() == block_size {
            return self.write_blocks(block, buf);
        }
        let mut scratch = alloc::vec![0u8; block_size];
        self.read_blocks(block, &mut scratch)?;
        scratch[start..start + buf.len()].copy_from_slice(buf);
        self.write_blocks(block, &scratch)
    }

    /// Device block size, falling back to [`DEFAULT_BLOCK_SIZE`].
    fn block_size(&self) -> u32 {
        match self.ioctl(Ioctl::BlockSize) {
            Ok(size) if size > 0 => size,
            _ => DEFAULT_BLOCK_SIZE,
        }
    }

    /// Number of blocks on the device.
    fn block_count(&self) -> BlockResult<u32> {
        self.ioctl(Ioctl::BlockCount)
    }
}

fn check_ext_range(block_size: usize, offset: usize, len: usize) -> BlockResult<()> {
    if block_size == 0 {
        return Err(BlockDevError::InvalidArgument);
    }
    match offset.checked_add(len) {
        Some(end) if end <= block_size => Ok(()),
        _ => Err(BlockDevError::BadBufferLength),
    }
}

macro_rules! forward_block_device {
    ($($wrapper:ty),*) => {
        $(
            impl<T: BlockDevice + ?Sized> BlockDevice for $wrapper {
                fn ioctl(&self, op: Ioctl) -> BlockResult<u32> {
                    (**self).ioctl(op)
                }

                fn read_blocks(&self, block: u32, buf: &mut [u8]) -> BlockResult<()> {
                    (**self).read_blocks(block, buf)
                }

                fn write_blocks(&self, block: u32, buf: &[u8]) -> BlockResult<()> {
                    (**self).write_blocks(block, buf)
                }

                fn read_ext(&self, block: u32, offset: u32, buf: &mut [u8]) -> BlockResult<()> {
                    (**self).read_ext(block, offset, buf)
                }

                fn write_ext(&self, block: u32, offset: u32, buf: &[u8]) -> BlockResult<()> {
                    (**self).write_ext(block, offset, buf)
                }
            }
        )*
    };
}

// A device is shared between mounts and raw users, never owned by a mount.
forward_block_device!(&T, Box<T>, Rc<T>, Arc<T>);

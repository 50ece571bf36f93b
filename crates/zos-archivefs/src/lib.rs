//! Zero OS Archive Filesystems
//!
//! Read-only TAR and ZIP filesystems mounted straight from a block device.
//! Nothing is unpacked: lookups walk the archive's own records through a
//! block-spanning reader, and file handles stream bytes on demand.
//!
//! - **Block**: `BlockAddress` cursor and block-spanning reads
//! - **Tar**: USTAR header chain driver
//! - **Zip**: stored, single-disk ZIP driver
//! - **File**: read / seek handles over an entry's data
//! - **Service**: `ArchiveFs`, the contract a VFS router mounts
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        VFS router (host)                         │
//! └───────────────────────────────┬──────────────────────────────────┘
//!                                 │ ArchiveFs
//!            ┌────────────────────┴────────────────────┐
//!            ▼                                         ▼
//! ┌──────────────────────┐                 ┌──────────────────────┐
//! │        TarFs         │                 │        ZipFs         │
//! │  header chain walk   │                 │  EOCD + central dir  │
//! └──────────┬───────────┘                 └──────────┬───────────┘
//!            └────────────────────┬────────────────────┘
//!                                 ▼
//! ┌──────────────────────────────────────────────────────────────────┐
//! │          BlockIo (read_at / write_at across blocks)              │
//! └───────────────────────────────┬──────────────────────────────────┘
//!                                 ▼
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                 zos_blockdev::BlockDevice                        │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use zos_archivefs::{ArchiveFs, FindResult, TarBuilder, TarFs};
//! use zos_blockdev::MemoryBlockDevice;
//!
//! let mut builder = TarBuilder::new();
//! builder.add_file("main.py", b"print('hi')\n").unwrap();
//! let device = MemoryBlockDevice::from_image(&builder.finish(), 512);
//!
//! let fs = TarFs::new(&device).unwrap();
//! fs.mount(true, false).unwrap();
//! assert!(matches!(fs.find("main.py").unwrap(), FindResult::File(_)));
//!
//! let mut file = fs.open("main.py", "r").unwrap();
//! assert_eq!(file.read_to_end().unwrap(), b"print('hi')\n");
//! ```

#![cfg_attr(not(any(feature = "std", test)), no_std)]
extern crate alloc;

pub mod block;
pub mod config;
pub mod error;
pub mod file;
mod mount;
pub mod path;
pub mod service;
pub mod shared;
pub mod tar;
pub mod types;
pub mod zip;

// Re-export main types
pub use block::{BlockAddress, BlockIo};
pub use config::{Epoch, FsConfig};
pub use error::{FsError, TarError, ZipError};
pub use file::{FileHandle, SeekFrom};
pub use service::{ArchiveFs, DirIter, OpenMode};
pub use shared::SharedFs;
pub use tar::{TarBuilder, TarFs};
pub use types::{DirEntry, Entry, EntryKind, FindResult, ImportStat, Stat, StatVfs};
pub use zip::{ZipBuilder, ZipFs};

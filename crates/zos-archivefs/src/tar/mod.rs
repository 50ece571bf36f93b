//! TAR filesystem driver.
//!
//! Headers form a chain: each one is followed by its data padded to 512
//! bytes, then the next header. Nothing is indexed, so every lookup walks
//! the chain from block 0:
//!
//! ```text
//! Start ─► read header ─► match? ── yes ─► done
//!              ▲            │ no
//!              │            ▼
//!              └── advance 512 + padded(size)
//!                           │ null record / bad checksum / end of device
//!                           ▼
//!                          End
//! ```

pub mod builder;
pub mod header;

use alloc::boxed::Box;
use alloc::collections::BTreeSet;
use alloc::string::String;

use log::{debug, trace, warn};
use zos_blockdev::BlockDevice;

use crate::block::{BlockAddress, BlockIo};
use crate::config::FsConfig;
use crate::error::{FsError, TarError};
use crate::file::FileHandle;
use crate::mount::MountState;
use crate::path::{self, NameMatch};
use crate::service::{ArchiveFs, DirIter, OpenMode};
use crate::types::{DirEntry, Entry, EntryKind, FindResult, Stat, StatVfs};

pub use builder::TarBuilder;
pub use header::TarHeader;

use header::RECORD_SIZE;

/// Read-only filesystem over a TAR archive on a block device.
pub struct TarFs<D: BlockDevice> {
    device: D,
    state: MountState,
}

/// Where a lookup landed.
enum Lookup {
    Missing,
    /// A header with this name
    Record(BlockAddress, TarHeader),
    /// No header of its own, but entries live below it
    Implied,
}

impl<D: BlockDevice> TarFs<D> {
    /// Attach to a device with default options.
    pub fn new(device: D) -> Result<Self, FsError> {
        Self::with_config(device, FsConfig::default())
    }

    /// Attach to a device.
    ///
    /// A device whose first record is not a valid header attaches fine but
    /// is flagged as holding no filesystem. Device errors and a zero block
    /// size fail the attach.
    pub fn with_config(device: D, config: FsConfig) -> Result<Self, FsError> {
        let mut state = MountState::probe(&device, config)?;
        let io = BlockIo::new(&device, state.block_size);
        state.no_filesystem = read_header(io, &state, BlockAddress::ZERO)?.is_none();
        debug!(
            "tarfs: attached, block size {}, archive {}",
            state.block_size,
            if state.no_filesystem { "absent" } else { "present" }
        );
        Ok(Self { device, state })
    }

    /// Formatting is not supported.
    pub fn mkfs(_device: D) -> Result<(), FsError> {
        Err(FsError::NotImplemented)
    }

    /// Check if attach found no archive on the device.
    pub fn is_no_filesystem(&self) -> bool {
        self.state.no_filesystem
    }

    /// Check if the filesystem is mounted.
    pub fn is_mounted(&self) -> bool {
        self.state.is_mounted()
    }

    /// Block size used for all device access.
    pub fn block_size(&self) -> u32 {
        self.state.block_size
    }

    /// The underlying device.
    pub fn device(&self) -> &D {
        &self.device
    }

    fn io(&self) -> BlockIo<'_, D> {
        BlockIo::new(&self.device, self.state.block_size)
    }

    fn records(&self) -> Records<'_, D> {
        Records::new(self.io(), &self.state)
    }

    /// Walk the chain for a resolved path. First match wins.
    fn lookup(&self, resolved: &str) -> Result<Lookup, FsError> {
        if self.state.no_filesystem {
            return Ok(Lookup::Missing);
        }
        for record in self.records() {
            let (addr, header) = record?;
            match path::match_name(header.clean_name(), resolved) {
                NameMatch::Exact => return Ok(Lookup::Record(addr, header)),
                NameMatch::Descendant => return Ok(Lookup::Implied),
                NameMatch::Mismatch => {}
            }
        }
        Ok(Lookup::Missing)
    }

    fn find_resolved(&self, resolved: &str) -> Result<FindResult, FsError> {
        if resolved.is_empty() {
            return Ok(FindResult::Directory(Entry::synthetic_dir("")));
        }
        Ok(match self.lookup(resolved)? {
            Lookup::Missing => FindResult::NotFound,
            Lookup::Record(_, header) => FindResult::from_entry(entry_of(&header)),
            Lookup::Implied => FindResult::Directory(Entry::synthetic_dir(resolved)),
        })
    }
}

/// Read and decode the header at `addr`.
///
/// `None` at the end of the device or when the record is not a valid
/// header (null record, bad checksum, unreadable size).
fn read_header<D: BlockDevice + ?Sized>(
    io: BlockIo<'_, D>,
    state: &MountState,
    addr: BlockAddress,
) -> Result<Option<TarHeader>, FsError> {
    let pos = addr.byte_offset(io.block_size());
    if !state.contains(pos, RECORD_SIZE as u64) {
        trace!("tarfs: end of device at {}", pos);
        return Ok(None);
    }

    let mut record = [0u8; RECORD_SIZE];
    io.read_at(addr, &mut record)?;
    match TarHeader::decode(&record) {
        Ok(header) => Ok(Some(header)),
        Err(e) => {
            trace!("tarfs: end of archive at {} ({:?})", pos, e);
            Ok(None)
        }
    }
}

fn entry_of(header: &TarHeader) -> Entry {
    let kind = header.kind();
    Entry {
        name: String::from(header.clean_name()),
        size: if kind == EntryKind::File { header.size } else { 0 },
        kind,
        mtime: header.mtime,
    }
}

impl<D: BlockDevice> ArchiveFs for TarFs<D> {
    type Device = D;

    fn mount(&self, readonly: bool, mkfs: bool) -> Result<(), FsError> {
        self.state.mount("tarfs", readonly, mkfs)
    }

    fn umount(&self) {
        self.state.umount("tarfs");
    }

    fn find(&self, path: &str) -> Result<FindResult, FsError> {
        let resolved = self.state.resolve(path)?;
        self.find_resolved(&resolved)
    }

    fn open(&self, path: &str, mode: &str) -> Result<FileHandle<'_, D>, FsError> {
        OpenMode::parse(mode)?;
        let resolved = self.state.resolve(path)?;
        if resolved.is_empty() {
            return Err(FsError::IsADirectory);
        }
        match self.lookup(&resolved)? {
            Lookup::Missing => Err(TarError::NotFound.into()),
            Lookup::Implied => Err(FsError::IsADirectory),
            Lookup::Record(_, header) if header.kind() == EntryKind::Directory => {
                Err(FsError::IsADirectory)
            }
            Lookup::Record(addr, header) => {
                let io = self.io();
                let data_start = io.advance(addr, RECORD_SIZE as u64);
                debug!("tarfs: open {} ({} bytes)", resolved, header.size);
                Ok(FileHandle::new(io, data_start, header.size))
            }
        }
    }

    fn ilistdir(&self, path: &str) -> Result<DirIter<'_>, FsError> {
        let resolved = self.state.resolve(path)?;
        match self.find_resolved(&resolved)? {
            FindResult::NotFound => return Err(FsError::NotFound),
            FindResult::File(_) => return Err(FsError::NotADirectory),
            FindResult::Directory(_) => {}
        }
        let records = if self.state.no_filesystem {
            None
        } else {
            Some(self.records())
        };
        Ok(Box::new(TarDirIter {
            records,
            prefix: path::dir_prefix(&resolved),
            dir: resolved,
            started: false,
            seen: BTreeSet::new(),
        }))
    }

    fn stat(&self, path: &str) -> Result<Stat, FsError> {
        match self.find(path)? {
            FindResult::NotFound => Err(FsError::NotFound),
            FindResult::File(entry) | FindResult::Directory(entry) => Ok(self.state.stat(&entry)),
        }
    }

    fn statvfs(&self, _path: &str) -> Result<StatVfs, FsError> {
        Ok(self.state.statvfs())
    }

    fn chdir(&self, path: &str) -> Result<(), FsError> {
        let resolved = self.state.resolve(path)?;
        match self.find_resolved(&resolved)? {
            FindResult::Directory(_) => {
                debug!("tarfs: chdir /{}", resolved);
                self.state.set_cwd(resolved);
                Ok(())
            }
            FindResult::File(_) => Err(FsError::NotADirectory),
            FindResult::NotFound => Err(FsError::NotFound),
        }
    }

    fn getcwd(&self) -> String {
        self.state.getcwd()
    }
}

/// Walks the header chain, yielding each valid header with its address.
///
/// Ends at a null record, a bad checksum or the end of the device. A device
/// error, or a header whose data reaches past the device or past the last
/// addressable block, is yielded once, then the walk stops.
struct Records<'a, D: BlockDevice + ?Sized> {
    io: BlockIo<'a, D>,
    state: &'a MountState,
    next: Option<BlockAddress>,
}

impl<'a, D: BlockDevice + ?Sized> Records<'a, D> {
    fn new(io: BlockIo<'a, D>, state: &'a MountState) -> Self {
        Self {
            io,
            state,
            next: Some(BlockAddress::ZERO),
        }
    }
}

impl<'a, D: BlockDevice + ?Sized> Iterator for Records<'a, D> {
    type Item = Result<(BlockAddress, TarHeader), FsError>;

    fn next(&mut self) -> Option<Self::Item> {
        let addr = self.next.take()?;
        let header = match read_header(self.io, self.state, addr) {
            Ok(Some(header)) => header,
            Ok(None) => return None,
            Err(e) => return Some(Err(e)),
        };

        let pos = addr.byte_offset(self.io.block_size());
        trace!("tarfs: header '{}' at {} size {}", header.name, pos, header.size);
        let data_end = pos
            .checked_add(RECORD_SIZE as u64)
            .and_then(|end| end.checked_add(header.size));
        let next = header
            .span()
            .and_then(|span| self.io.checked_advance(addr, span));
        match (data_end, next) {
            (Some(end), Some(next)) if self.state.contains(0, end) => {
                self.next = Some(next);
                Some(Ok((addr, header)))
            }
            _ => {
                warn!(
                    "tarfs: header '{}' at {} claims {} bytes beyond the device",
                    header.name, pos, header.size
                );
                Some(Err(TarError::BadSize.into()))
            }
        }
    }
}

/// Lazy listing of one directory.
struct TarDirIter<'a, D: BlockDevice + ?Sized> {
    records: Option<Records<'a, D>>,
    /// Listed directory, archive form
    dir: String,
    /// `dir` plus separator, empty at the root
    prefix: String,
    /// Inside the run of entries below `dir`
    started: bool,
    /// Children already yielded
    seen: BTreeSet<String>,
}

impl<'a, D: BlockDevice + ?Sized> Iterator for TarDirIter<'a, D> {
    type Item = Result<DirEntry, FsError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let records = self.records.as_mut()?;
            let (_, header) = match records.next() {
                Some(Ok(record)) => record,
                Some(Err(e)) => {
                    self.records = None;
                    return Some(Err(e));
                }
                None => {
                    self.records = None;
                    return None;
                }
            };

            let name = header.clean_name();
            let Some(rest) = name.strip_prefix(self.prefix.as_str()) else {
                if name == self.dir {
                    self.started = true;
                    continue;
                }
                if self.started {
                    self.records = None;
                    return None;
                }
                continue;
            };
            self.started = true;
            if rest.is_empty() {
                continue;
            }

            let (child, nested) = path::first_segment(rest);
            if !self.seen.insert(String::from(child)) {
                continue;
            }
            let kind = if nested { EntryKind::Directory } else { header.kind() };
            let size = if kind == EntryKind::File { header.size } else { 0 };
            return Some(Ok(DirEntry {
                name: String::from(child),
                kind,
                size,
            }));
        }
    }
}

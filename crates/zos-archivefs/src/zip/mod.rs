//! ZIP filesystem driver.
//!
//! Attach locates the end-of-central-directory record in the last
//! `block_size + 21` bytes of the device, which covers a record straddling
//! the final block boundary, and checks that the central directory it
//! points at ends before it. Lookups then walk the central directory from
//! `offset_cd` until a record fails its signature check.
//!
//! ZIP has no directory type here: a name is a directory when another
//! entry's name continues it with `/`. When one name is both a file and a
//! directory, the directory wins.

pub mod builder;
pub mod record;

use alloc::boxed::Box;
use alloc::collections::BTreeSet;
use alloc::string::String;
use alloc::vec;

use log::{debug, trace};
use zos_blockdev::BlockDevice;

use crate::block::{BlockAddress, BlockIo};
use crate::config::FsConfig;
use crate::error::{FsError, ZipError};
use crate::file::FileHandle;
use crate::mount::MountState;
use crate::path::{self, NameMatch};
use crate::service::{ArchiveFs, DirIter, OpenMode};
use crate::types::{DirEntry, Entry, EntryKind, FindResult, Stat, StatVfs};

pub use builder::ZipBuilder;
pub use record::{CentralDirRecord, EndOfCentralDir, LocalFileHeader};

use record::{CD_HEADER_SIZE, EOCD_SIZE, LOCAL_HEADER_SIZE, METHOD_STORED};

/// Central directory location, found once at attach.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct CentralDir {
    start: BlockAddress,
    size: u32,
    entries: u16,
}

/// Read-only filesystem over a stored, single-disk ZIP archive.
pub struct ZipFs<D: BlockDevice> {
    device: D,
    state: MountState,
    cd: Option<CentralDir>,
}

enum Lookup {
    Missing,
    File(CentralDirRecord),
    Directory(Entry),
}

impl<D: BlockDevice> ZipFs<D> {
    /// Attach to a device with default options.
    pub fn new(device: D) -> Result<Self, FsError> {
        Self::with_config(device, FsConfig::default())
    }

    /// Attach to a device.
    ///
    /// A device without an end-of-central-directory record attaches fine
    /// but is flagged as holding no filesystem.
    pub fn with_config(device: D, config: FsConfig) -> Result<Self, FsError> {
        let mut state = MountState::probe(&device, config)?;
        if (state.block_size as usize) < EOCD_SIZE {
            return Err(ZipError::BlockSizeTooSmall.into());
        }
        let device_len = state
            .device_len
            .ok_or_else(|| FsError::io("device does not report its block count"))?;

        let cd = locate_central_dir(BlockIo::new(&device, state.block_size), device_len)?;
        state.no_filesystem = cd.is_none();
        match cd {
            Some(cd) => debug!(
                "zipfs: attached, block size {}, {} entries, central directory {} bytes at {:?}",
                state.block_size, cd.entries, cd.size, cd.start
            ),
            None => debug!("zipfs: attached, no end of central directory found"),
        }
        Ok(Self { device, state, cd })
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

    /// Entry count recorded in the end-of-central-directory record.
    pub fn entry_count(&self) -> u16 {
        self.cd.map_or(0, |cd| cd.entries)
    }

    /// The underlying device.
    pub fn device(&self) -> &D {
        &self.device
    }

    /// Read a file fully and compare it against its recorded CRC-32.
    pub fn verify_crc(&self, path: &str) -> Result<bool, FsError> {
        let resolved = self.state.resolve(path)?;
        let record = match self.lookup(&resolved)? {
            Lookup::File(record) => record,
            Lookup::Directory(_) => return Err(FsError::IsADirectory),
            Lookup::Missing => return Err(ZipError::NotFound.into()),
        };
        let data = self.open_record(&record)?.read_to_end()?;
        Ok(crc32fast::hash(&data) == record.crc32)
    }

    fn io(&self) -> BlockIo<'_, D> {
        BlockIo::new(&self.device, self.state.block_size)
    }

    fn records(&self) -> CdRecords<'_, D> {
        CdRecords {
            io: self.io(),
            state: &self.state,
            next: self.cd.map(|cd| cd.start),
        }
    }

    /// Scan the whole central directory for a resolved path.
    fn lookup(&self, resolved: &str) -> Result<Lookup, FsError> {
        let mut file = None;
        for record in self.records() {
            let (record, raw) = record?;
            let name = path::entry_name(&raw);
            match path::match_name(name, resolved) {
                NameMatch::Exact if raw.ends_with(path::SEPARATOR) => {
                    return Ok(Lookup::Directory(self.entry_of(&record, name, EntryKind::Directory)));
                }
                NameMatch::Exact => {
                    if file.is_none() {
                        file = Some(record);
                    }
                }
                NameMatch::Descendant => {
                    return Ok(Lookup::Directory(Entry::synthetic_dir(resolved)));
                }
                NameMatch::Mismatch => {}
            }
        }
        Ok(file.map_or(Lookup::Missing, Lookup::File))
    }

    /// Whether any entry lives below `dir`.
    fn has_descendant(&self, dir: &str) -> Result<bool, FsError> {
        for record in self.records() {
            let (_, raw) = record?;
            if path::match_name(path::entry_name(&raw), dir) == NameMatch::Descendant {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn entry_of(&self, record: &CentralDirRecord, name: &str, kind: EntryKind) -> Entry {
        Entry {
            name: String::from(name),
            size: if kind == EntryKind::File {
                u64::from(record.size_uncompressed)
            } else {
                0
            },
            kind,
            mtime: record.mtime(),
        }
    }

    fn find_resolved(&self, resolved: &str) -> Result<FindResult, FsError> {
        if resolved.is_empty() {
            return Ok(FindResult::Directory(Entry::synthetic_dir("")));
        }
        Ok(match self.lookup(resolved)? {
            Lookup::Missing => FindResult::NotFound,
            Lookup::Directory(entry) => FindResult::Directory(entry),
            Lookup::File(record) => {
                FindResult::File(self.entry_of(&record, resolved, EntryKind::File))
            }
        })
    }

    /// Skip the local header and position a handle on the entry data.
    fn open_record(&self, record: &CentralDirRecord) -> Result<FileHandle<'_, D>, FsError> {
        if record.compression != METHOD_STORED {
            return Err(FsError::Unsupported(alloc::format!(
                "compression method {}",
                record.compression
            )));
        }
        let io = self.io();
        let local_addr =
            BlockAddress::from_byte_offset(u64::from(record.offset_local_header), io.block_size());
        let mut buf = [0u8; LOCAL_HEADER_SIZE];
        io.read_at(local_addr, &mut buf)?;
        let local = LocalFileHeader::decode(&buf)?;

        let data_start = io.advance(local_addr, local.data_offset());
        Ok(FileHandle::new(io, data_start, u64::from(record.size_uncompressed)))
    }
}

/// Find and decode the end-of-central-directory record.
fn locate_central_dir<D: BlockDevice + ?Sized>(
    io: BlockIo<'_, D>,
    device_len: u64,
) -> Result<Option<CentralDir>, FsError> {
    let window = (u64::from(io.block_size()) + EOCD_SIZE as u64 - 1).min(device_len);
    let window_start = device_len - window;
    let mut buf = vec![0u8; window as usize];
    io.read_at(BlockAddress::from_byte_offset(window_start, io.block_size()), &mut buf)?;

    let Some(at) = record::find_eocd(&buf) else {
        return Ok(None);
    };
    let mut raw = [0u8; EOCD_SIZE];
    raw.copy_from_slice(&buf[at..at + EOCD_SIZE]);
    let eocd = EndOfCentralDir::decode(&raw)?;
    eocd.check_single_disk()?;
    let eocd_pos = window_start + at as u64;
    trace!(
        "zipfs: EOCD at {}, cd offset {} size {}",
        eocd_pos,
        eocd.offset_cd,
        eocd.cd_size
    );
    if u64::from(eocd.offset_cd) + u64::from(eocd.cd_size) > eocd_pos {
        return Err(FsError::invalid_format(
            "central directory does not end before the end record",
        ));
    }

    Ok(Some(CentralDir {
        start: BlockAddress::from_byte_offset(u64::from(eocd.offset_cd), io.block_size()),
        size: eocd.cd_size,
        entries: eocd.total_entries,
    }))
}

impl<D: BlockDevice> ArchiveFs for ZipFs<D> {
    type Device = D;

    fn mount(&self, readonly: bool, mkfs: bool) -> Result<(), FsError> {
        self.state.mount("zipfs", readonly, mkfs)
    }

    fn umount(&self) {
        self.state.umount("zipfs");
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
            Lookup::Missing => Err(ZipError::NotFound.into()),
            Lookup::Directory(_) => Err(FsError::IsADirectory),
            Lookup::File(record) => {
                debug!("zipfs: open {} ({} bytes)", resolved, record.size_uncompressed);
                self.open_record(&record)
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
        Ok(Box::new(ZipDirIter {
            fs: self,
            records: Some(self.records()),
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
                debug!("zipfs: chdir /{}", resolved);
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

/// Walks central directory records with their names.
///
/// Ends at the first record whose signature does not match (normally the
/// EOCD) or at the end of the device. A device error is yielded once.
struct CdRecords<'a, D: BlockDevice + ?Sized> {
    io: BlockIo<'a, D>,
    state: &'a MountState,
    next: Option<BlockAddress>,
}

impl<'a, D: BlockDevice + ?Sized> CdRecords<'a, D> {
    fn read(&self, addr: BlockAddress) -> Result<Option<(CentralDirRecord, String)>, FsError> {
        let pos = addr.byte_offset(self.io.block_size());
        if !self.state.contains(pos, CD_HEADER_SIZE as u64) {
            return Ok(None);
        }
        let mut fixed = [0u8; CD_HEADER_SIZE];
        self.io.read_at(addr, &mut fixed)?;
        let record = match CentralDirRecord::decode(&fixed) {
            Ok(record) => record,
            Err(_) => {
                trace!("zipfs: end of central directory at {}", pos);
                return Ok(None);
            }
        };

        let trailer_at = self.io.advance(addr, CD_HEADER_SIZE as u64);
        if !self
            .state
            .contains(trailer_at.byte_offset(self.io.block_size()), record.trailer_len())
        {
            return Err(FsError::invalid_format("central directory record runs off the device"));
        }
        let mut trailer = vec![0u8; record.trailer_len() as usize];
        self.io.read_at(trailer_at, &mut trailer)?;
        let name_len = usize::from(record.file_name_len);
        let name = String::from_utf8_lossy(&trailer[..name_len]).into_owned();
        trace!("zipfs: record '{}' at {} size {}", name, pos, record.size_uncompressed);
        Ok(Some((record, name)))
    }
}

impl<'a, D: BlockDevice + ?Sized> Iterator for CdRecords<'a, D> {
    type Item = Result<(CentralDirRecord, String), FsError>;

    fn next(&mut self) -> Option<Self::Item> {
        let addr = self.next.take()?;
        match self.read(addr) {
            Ok(Some((record, name))) => {
                self.next = Some(self.io.advance(addr, record.span()));
                Some(Ok((record, name)))
            }
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

/// Lazy listing of one directory.
struct ZipDirIter<'a, D: BlockDevice> {
    fs: &'a ZipFs<D>,
    records: Option<CdRecords<'a, D>>,
    dir: String,
    prefix: String,
    started: bool,
    seen: BTreeSet<String>,
}

impl<'a, D: BlockDevice> ZipDirIter<'a, D> {
    fn classify(&self, child: &str, nested: bool, raw: &str) -> Result<EntryKind, FsError> {
        if nested || raw.ends_with(path::SEPARATOR) {
            return Ok(EntryKind::Directory);
        }
        let mut full = self.prefix.clone();
        full.push_str(child);
        Ok(if self.fs.has_descendant(&full)? {
            EntryKind::Directory
        } else {
            EntryKind::File
        })
    }
}

impl<'a, D: BlockDevice> Iterator for ZipDirIter<'a, D> {
    type Item = Result<DirEntry, FsError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let records = self.records.as_mut()?;
            let (record, raw) = match records.next() {
                Some(Ok(item)) => item,
                Some(Err(e)) => {
                    self.records = None;
                    return Some(Err(e));
                }
                None => {
                    self.records = None;
                    return None;
                }
            };

            let name = path::entry_name(&raw);
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
            if self.seen.contains(child) {
                continue;
            }
            let kind = match self.classify(child, nested, &raw) {
                Ok(kind) => kind,
                Err(e) => {
                    self.records = None;
                    return Some(Err(e));
                }
            };
            self.seen.insert(String::from(child));
            let size = if kind == EntryKind::File {
                u64::from(record.size_uncompressed)
            } else {
                0
            };
            return Some(Ok(DirEntry {
                name: String::from(child),
                kind,
                size,
            }));
        }
    }
}

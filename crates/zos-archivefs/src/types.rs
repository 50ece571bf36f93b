//! Filesystem metadata types shared by the TAR and ZIP drivers.

use alloc::string::String;
use serde::{Deserialize, Serialize};

/// Mode bit for directories (`S_IFDIR`).
pub const S_IFDIR: u32 = 0o040000;

/// Mode bit for regular files (`S_IFREG`).
pub const S_IFREG: u32 = 0o100000;

/// Kind of archive entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    /// Regular file
    File,
    /// Directory (explicit or implied by nested names)
    Directory,
}

impl EntryKind {
    /// `st_mode` file type bits.
    pub fn mode(self) -> u32 {
        match self {
            EntryKind::File => S_IFREG,
            EntryKind::Directory => S_IFDIR,
        }
    }
}

/// One archive entry, as produced by a scan.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Full path inside the archive, no leading or trailing `/`
    pub name: String,
    /// Size in bytes (zero for directories)
    pub size: u64,
    /// File or directory
    pub kind: EntryKind,
    /// Modification time in Unix seconds
    pub mtime: u64,
}

impl Entry {
    /// Directory entry with no record of its own (root, implied directories).
    pub fn synthetic_dir(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size: 0,
            kind: EntryKind::Directory,
            mtime: 0,
        }
    }

    /// Check if this is a directory.
    pub fn is_directory(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// Outcome of a path lookup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FindResult {
    /// No entry with that path
    NotFound,
    /// A regular file
    File(Entry),
    /// A directory
    Directory(Entry),
}

impl FindResult {
    /// The entry, if one was found.
    pub fn entry(&self) -> Option<&Entry> {
        match self {
            FindResult::NotFound => None,
            FindResult::File(e) | FindResult::Directory(e) => Some(e),
        }
    }

    /// Consume into the entry, if one was found.
    pub fn into_entry(self) -> Option<Entry> {
        match self {
            FindResult::NotFound => None,
            FindResult::File(e) | FindResult::Directory(e) => Some(e),
        }
    }

    pub(crate) fn from_entry(entry: Entry) -> Self {
        match entry.kind {
            EntryKind::File => FindResult::File(entry),
            EntryKind::Directory => FindResult::Directory(entry),
        }
    }
}

/// Result of an import probe, as asked by a module loader.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImportStat {
    /// Nothing at that path
    NoExist,
    /// A regular file
    File,
    /// A directory
    Dir,
}

/// Directory listing entry: an immediate child of the listed directory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    /// Child name (a single path segment)
    pub name: String,
    /// File or directory
    pub kind: EntryKind,
    /// Size in bytes (zero for directories)
    pub size: u64,
}

/// File status, the `stat()` tuple.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stat {
    /// File type bits (`S_IFDIR` / `S_IFREG`)
    pub mode: u32,
    /// Size in bytes
    pub size: u64,
    /// Access time (same as mtime)
    pub atime: u64,
    /// Modification time, in the configured epoch
    pub mtime: u64,
    /// Change time (same as mtime)
    pub ctime: u64,
}

impl Stat {
    pub(crate) fn new(kind: EntryKind, size: u64, mtime: u64) -> Self {
        Self {
            mode: kind.mode(),
            size,
            atime: mtime,
            mtime,
            ctime: mtime,
        }
    }

    /// Check if this describes a directory.
    pub fn is_directory(&self) -> bool {
        self.mode & S_IFDIR != 0
    }
}

/// Filesystem status, the `statvfs()` tuple.
///
/// Archives have no free-space accounting, so everything but `namemax` is
/// zero.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatVfs {
    pub bsize: u64,
    pub frsize: u64,
    pub blocks: u64,
    pub bfree: u64,
    pub bavail: u64,
    pub files: u64,
    pub ffree: u64,
    pub favail: u64,
    pub flags: u64,
    pub namemax: u64,
}

impl StatVfs {
    /// Placeholder status reporting only the maximum name length.
    pub fn placeholder(namemax: usize) -> Self {
        Self {
            namemax: namemax as u64,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stat_modes() {
        let dir = Stat::new(EntryKind::Directory, 0, 10);
        assert!(dir.is_directory());
        assert_eq!(dir.mode, S_IFDIR);
        assert_eq!(dir.atime, 10);

        let file = Stat::new(EntryKind::File, 12, 10);
        assert!(!file.is_directory());
        assert_eq!(file.size, 12);
    }

    #[test]
    fn test_find_result_entry() {
        let found = FindResult::from_entry(Entry::synthetic_dir("lib"));
        assert!(matches!(found, FindResult::Directory(_)));
        assert_eq!(found.entry().map(|e| e.name.as_str()), Some("lib"));
        assert!(FindResult::NotFound.into_entry().is_none());
    }
}

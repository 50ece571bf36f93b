//! Driver contract for archive filesystems.
//!
//! This is the surface a VFS router mounts: lookups, listings, stat and
//! open, plus the mutating operations, which always fail on an archive.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;

use zos_blockdev::BlockDevice;

use crate::error::FsError;
use crate::file::FileHandle;
use crate::types::{DirEntry, FindResult, ImportStat, Stat, StatVfs};

/// Lazy directory listing.
pub type DirIter<'a> = Box<dyn Iterator<Item = Result<DirEntry, FsError>> + 'a>;

/// Parsed `open()` mode string.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OpenMode {
    /// `b` was given
    pub binary: bool,
}

impl OpenMode {
    /// Parse a mode string such as `"r"` or `"rb"`.
    ///
    /// Any write indicator (`w`, `a`, `x`, `+`) is `ReadOnly`, whatever
    /// else the string holds.
    pub fn parse(mode: &str) -> Result<Self, FsError> {
        if mode.chars().any(|c| matches!(c, 'w' | 'a' | 'x' | '+')) {
            return Err(FsError::ReadOnly);
        }
        let mut parsed = OpenMode::default();
        for c in mode.chars() {
            match c {
                'r' | 't' => {}
                'b' => parsed.binary = true,
                other => {
                    return Err(FsError::invalid_argument(alloc::format!(
                        "invalid mode character '{}'",
                        other
                    )))
                }
            }
        }
        Ok(parsed)
    }
}

/// Read-only archive filesystem driver.
pub trait ArchiveFs {
    /// Device the archive is read from.
    type Device: BlockDevice + ?Sized;

    // ========== Mount ==========

    /// Mount the attached archive.
    fn mount(&self, readonly: bool, mkfs: bool) -> Result<(), FsError>;

    /// Unmount. The archive stays addressable.
    fn umount(&self) {}

    // ========== Lookup ==========

    /// Look up a path.
    fn find(&self, path: &str) -> Result<FindResult, FsError>;

    /// Open a file for reading.
    fn open(&self, path: &str, mode: &str) -> Result<FileHandle<'_, Self::Device>, FsError>;

    /// List the immediate children of a directory.
    fn ilistdir(&self, path: &str) -> Result<DirIter<'_>, FsError>;

    /// List a directory into a vector.
    fn readdir(&self, path: &str) -> Result<Vec<DirEntry>, FsError> {
        self.ilistdir(path)?.collect()
    }

    // ========== Metadata ==========

    /// File status.
    fn stat(&self, path: &str) -> Result<Stat, FsError>;

    /// Filesystem status.
    fn statvfs(&self, path: &str) -> Result<StatVfs, FsError>;

    /// Classify a path for a module loader.
    fn import_stat(&self, path: &str) -> ImportStat {
        match self.find(path) {
            Ok(FindResult::File(_)) => ImportStat::File,
            Ok(FindResult::Directory(_)) => ImportStat::Dir,
            _ => ImportStat::NoExist,
        }
    }

    // ========== Working Directory ==========

    /// Change the current directory.
    fn chdir(&self, path: &str) -> Result<(), FsError>;

    /// Current directory as an absolute path.
    fn getcwd(&self) -> String;

    // ========== Mutation ==========

    /// Archives are read only.
    fn mkdir(&self, _path: &str) -> Result<(), FsError> {
        Err(FsError::ReadOnly)
    }

    /// Archives are read only.
    fn rmdir(&self, _path: &str) -> Result<(), FsError> {
        Err(FsError::ReadOnly)
    }

    /// Archives are read only.
    fn remove(&self, _path: &str) -> Result<(), FsError> {
        Err(FsError::ReadOnly)
    }

    /// Archives are read only.
    fn rename(&self, _from: &str, _to: &str) -> Result<(), FsError> {
        Err(FsError::ReadOnly)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parse() {
        assert_eq!(OpenMode::parse("r").unwrap(), OpenMode { binary: false });
        assert_eq!(OpenMode::parse("rb").unwrap(), OpenMode { binary: true });
        assert_eq!(OpenMode::parse("").unwrap(), OpenMode::default());
        assert_eq!(OpenMode::parse("rt").unwrap(), OpenMode::default());
    }

    #[test]
    fn test_mode_write_indicators() {
        for mode in ["w", "a", "x", "r+", "wb", "ab+", "zw"] {
            assert_eq!(OpenMode::parse(mode), Err(FsError::ReadOnly), "mode {mode}");
        }
    }

    #[test]
    fn test_mode_unknown_character() {
        assert!(matches!(OpenMode::parse("rz"), Err(FsError::InvalidArgument(_))));
    }
}

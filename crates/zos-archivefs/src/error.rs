//! Error types for the archive filesystems.
//!
//! Callers see one taxonomy, [`FsError`], whichever archive format sits
//! behind the mount. Each format keeps its own raw error codes
//! ([`TarError`], [`ZipError`]) and a single mapping into `FsError`, so a
//! bad TAR checksum and a bad ZIP signature both surface as
//! `InvalidFormat`.
//!
//! | Variant | errno |
//! |---------|-------|
//! | `NotFound` | `ENOENT` (2) |
//! | `Io` | `EIO` (5) |
//! | `Closed` | `EBADF` (9) |
//! | `PermissionDenied` | `EACCES` (13) |
//! | `NoFilesystem` | `ENODEV` (19) |
//! | `NotADirectory` | `ENOTDIR` (20) |
//! | `IsADirectory` | `EISDIR` (21) |
//! | `InvalidFormat` / `InvalidArgument` | `EINVAL` (22) |
//! | `ReadOnly` | `EROFS` (30) |
//! | `NameTooLong` | `ENAMETOOLONG` (36) |
//! | `NotImplemented` | `ENOSYS` (38) |
//! | `Unsupported` | `EOPNOTSUPP` (95) |

use alloc::string::String;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zos_blockdev::BlockDevError;

/// Errors from archive filesystem operations.
#[derive(Clone, Debug, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum FsError {
    /// Path not found
    #[error("no such file or directory")]
    NotFound,

    /// Not a directory
    #[error("not a directory")]
    NotADirectory,

    /// Is a directory
    #[error("is a directory")]
    IsADirectory,

    /// Filesystem is read only
    #[error("read-only filesystem")]
    ReadOnly,

    /// Permission denied
    #[error("permission denied")]
    PermissionDenied,

    /// Bad checksum, signature or disk number
    #[error("invalid archive format: {0}")]
    InvalidFormat(String),

    /// Block device failure
    #[error("I/O error: {0}")]
    Io(String),

    /// Operation not implemented by a read-only driver
    #[error("operation not implemented")]
    NotImplemented,

    /// No archive found on the device
    #[error("no filesystem on device")]
    NoFilesystem,

    /// Archive feature outside what the driver reads
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Path longer than the configured maximum
    #[error("path too long")]
    NameTooLong,

    /// Handle already closed
    #[error("file handle is closed")]
    Closed,
}

impl FsError {
    /// Create an I/O error with message.
    pub fn io(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }

    /// Create an invalid format error with message.
    pub fn invalid_format(msg: impl Into<String>) -> Self {
        Self::InvalidFormat(msg.into())
    }

    /// Create an invalid argument error with message.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// POSIX errno for this error.
    pub fn errno(&self) -> i32 {
        match self {
            FsError::NotFound => 2,
            FsError::Io(_) => 5,
            FsError::Closed => 9,
            FsError::PermissionDenied => 13,
            FsError::NoFilesystem => 19,
            FsError::NotADirectory => 20,
            FsError::IsADirectory => 21,
            FsError::InvalidFormat(_) => 22,
            FsError::InvalidArgument(_) => 22,
            FsError::ReadOnly => 30,
            FsError::NameTooLong => 36,
            FsError::NotImplemented => 38,
            FsError::Unsupported(_) => 95,
        }
    }
}

impl From<BlockDevError> for FsError {
    fn from(e: BlockDevError) -> Self {
        match e {
            BlockDevError::ReadOnly => FsError::ReadOnly,
            other => FsError::Io(alloc::format!("{}", other)),
        }
    }
}

#[cfg(feature = "std")]
impl From<FsError> for std::io::Error {
    fn from(e: FsError) -> Self {
        use std::io::ErrorKind;
        let kind = match e {
            FsError::NotFound => ErrorKind::NotFound,
            FsError::ReadOnly | FsError::PermissionDenied => ErrorKind::PermissionDenied,
            FsError::InvalidFormat(_) => ErrorKind::InvalidData,
            FsError::InvalidArgument(_) | FsError::NameTooLong => ErrorKind::InvalidInput,
            FsError::NotImplemented | FsError::Unsupported(_) => ErrorKind::Unsupported,
            _ => ErrorKind::Other,
        };
        std::io::Error::new(kind, e)
    }
}

/// Raw TAR codec results.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TarError {
    /// Generic failure
    Failure,
    /// Archive could not be opened
    OpenFail,
    /// Device read failed
    ReadFail,
    /// Device write failed
    WriteFail,
    /// Seek outside the archive
    SeekFail,
    /// Header checksum mismatch
    BadChecksum,
    /// All-zero record (end of archive)
    NullRecord,
    /// Entry size unreadable or reaching past the device
    BadSize,
    /// No entry with that name
    NotFound,
}

impl From<TarError> for FsError {
    fn from(e: TarError) -> Self {
        match e {
            TarError::Failure => FsError::io("tar failure"),
            TarError::OpenFail => FsError::NoFilesystem,
            TarError::ReadFail => FsError::io("tar read failed"),
            TarError::WriteFail => FsError::ReadOnly,
            TarError::SeekFail => FsError::io("tar seek failed"),
            TarError::BadChecksum => FsError::invalid_format("bad tar header checksum"),
            TarError::NullRecord => FsError::invalid_format("null tar record"),
            TarError::BadSize => FsError::invalid_format("tar entry size out of range"),
            TarError::NotFound => FsError::NotFound,
        }
    }
}

/// Raw ZIP codec results.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ZipError {
    /// Device read failed
    ReadFail,
    /// Record signature mismatch
    BadSignature,
    /// Archive spans several disks
    MultiDisk,
    /// Block size cannot hold the end-of-central-directory record
    BlockSizeTooSmall,
    /// No entry with that name
    NotFound,
}

impl From<ZipError> for FsError {
    fn from(e: ZipError) -> Self {
        match e {
            ZipError::ReadFail => FsError::io("zip read failed"),
            ZipError::BadSignature => FsError::invalid_format("bad zip record signature"),
            ZipError::MultiDisk => FsError::invalid_format("only single-disk zip supported"),
            ZipError::BlockSizeTooSmall => FsError::invalid_argument("block size too small"),
            ZipError::NotFound => FsError::NotFound,
        }
    }
}

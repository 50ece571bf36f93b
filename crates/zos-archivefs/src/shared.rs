//! Mutex-wrapped mount for hosts that reach one archive from several
//! threads.
//!
//! Drivers keep their cwd in a `RefCell`, so they are not `Sync`. Wrapping
//! one in [`SharedFs`] serializes every call per mount. File handles borrow
//! the driver and cannot leave the lock, so whole-file reads happen inside
//! it.

use alloc::string::String;
use alloc::vec::Vec;

use spin::{Mutex, MutexGuard};

use crate::error::FsError;
use crate::service::ArchiveFs;
use crate::types::{DirEntry, FindResult, Stat};

/// A driver behind a spin lock.
pub struct SharedFs<F: ArchiveFs> {
    inner: Mutex<F>,
}

impl<F: ArchiveFs> SharedFs<F> {
    /// Wrap a driver.
    pub fn new(fs: F) -> Self {
        Self {
            inner: Mutex::new(fs),
        }
    }

    /// Lock the driver for a sequence of calls.
    pub fn lock(&self) -> MutexGuard<'_, F> {
        self.inner.lock()
    }

    /// Run `f` with the driver locked.
    pub fn with<R>(&self, f: impl FnOnce(&F) -> R) -> R {
        f(&self.inner.lock())
    }

    /// Read a whole file.
    pub fn read_file(&self, path: &str) -> Result<Vec<u8>, FsError> {
        let fs = self.inner.lock();
        let mut file = fs.open(path, "rb")?;
        let data = file.read_to_end();
        file.close();
        data
    }

    /// Look up a path.
    pub fn find(&self, path: &str) -> Result<FindResult, FsError> {
        self.inner.lock().find(path)
    }

    /// File status.
    pub fn stat(&self, path: &str) -> Result<Stat, FsError> {
        self.inner.lock().stat(path)
    }

    /// List a directory.
    pub fn readdir(&self, path: &str) -> Result<Vec<DirEntry>, FsError> {
        self.inner.lock().readdir(path)
    }

    /// Change the current directory.
    pub fn chdir(&self, path: &str) -> Result<(), FsError> {
        self.inner.lock().chdir(path)
    }

    /// Current directory.
    pub fn getcwd(&self) -> String {
        self.inner.lock().getcwd()
    }

    /// Unwrap the driver.
    pub fn into_inner(self) -> F {
        self.inner.into_inner()
    }
}

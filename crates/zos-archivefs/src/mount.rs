//! Per-mount state shared by both drivers.

use alloc::string::String;
use core::cell::{Cell, RefCell};

use log::{debug, warn};
use zos_blockdev::{BlockDevice, Ioctl};

use crate::config::FsConfig;
use crate::error::FsError;
use crate::path;
use crate::types::{Entry, Stat, StatVfs};

/// Mount state: device geometry, options, cwd.
#[derive(Debug)]
pub(crate) struct MountState {
    pub config: FsConfig,
    pub block_size: u32,
    /// Device length in bytes, when the device reports a block count
    pub device_len: Option<u64>,
    /// Attach found no archive
    pub no_filesystem: bool,
    mounted: Cell<bool>,
    /// Current directory in archive form ("" is the root)
    cwd: RefCell<String>,
}

impl MountState {
    /// Query the device geometry.
    ///
    /// Fails when neither the device nor the config supplies a non-zero
    /// block size.
    pub fn probe<D: BlockDevice + ?Sized>(device: &D, config: FsConfig) -> Result<Self, FsError> {
        let block_size = match device.ioctl(Ioctl::BlockSize) {
            Ok(size) if size > 0 => size,
            _ => {
                warn!(
                    "archivefs: device reports no block size, using {}",
                    config.default_block_size
                );
                config.default_block_size
            }
        };
        if block_size == 0 {
            return Err(FsError::invalid_argument("block size must be non-zero"));
        }
        let device_len = device
            .ioctl(Ioctl::BlockCount)
            .ok()
            .map(|count| u64::from(count) * u64::from(block_size));
        if device_len == Some(0) {
            warn!("archivefs: device is empty");
        }

        Ok(Self {
            config,
            block_size,
            device_len,
            no_filesystem: false,
            mounted: Cell::new(false),
            cwd: RefCell::new(String::new()),
        })
    }

    pub fn mount(&self, driver: &str, readonly: bool, mkfs: bool) -> Result<(), FsError> {
        if self.no_filesystem {
            return Err(if mkfs {
                FsError::NotImplemented
            } else {
                FsError::NoFilesystem
            });
        }
        if !readonly {
            debug!("{}: read-write mount requested, mounting read-only", driver);
        }
        self.mounted.set(true);
        debug!("{}: mounted, block size {}", driver, self.block_size);
        Ok(())
    }

    pub fn umount(&self, driver: &str) {
        if self.mounted.replace(false) {
            debug!("{}: unmounted", driver);
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.get()
    }

    /// Resolve a caller path against the cwd.
    pub fn resolve(&self, p: &str) -> Result<String, FsError> {
        path::resolve(&self.cwd.borrow(), p, self.config.max_path_len)
    }

    pub fn set_cwd(&self, dir: String) {
        *self.cwd.borrow_mut() = dir;
    }

    pub fn getcwd(&self) -> String {
        path::absolute(&self.cwd.borrow())
    }

    pub fn stat(&self, entry: &Entry) -> Stat {
        Stat::new(entry.kind, entry.size, self.config.epoch.adjust(entry.mtime))
    }

    pub fn statvfs(&self) -> StatVfs {
        StatVfs::placeholder(self.config.max_path_len)
    }

    /// Whether `len` bytes at byte offset `pos` lie inside the device.
    pub fn contains(&self, pos: u64, len: u64) -> bool {
        match self.device_len {
            Some(device_len) => pos.checked_add(len).is_some_and(|end| end <= device_len),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zos_blockdev::{BlockDevError, BlockResult, MemoryBlockDevice};

    struct Silent;

    impl BlockDevice for Silent {
        fn ioctl(&self, _op: Ioctl) -> BlockResult<u32> {
            Err(BlockDevError::Unsupported)
        }

        fn read_blocks(&self, _block: u32, _buf: &mut [u8]) -> BlockResult<()> {
            Err(BlockDevError::IoError)
        }

        fn write_blocks(&self, _block: u32, _buf: &[u8]) -> BlockResult<()> {
            Err(BlockDevError::ReadOnly)
        }
    }

    #[test]
    fn test_probe_geometry() {
        let dev = MemoryBlockDevice::new(512, 4);
        let state = MountState::probe(&dev, FsConfig::default()).unwrap();
        assert_eq!(state.block_size, 512);
        assert_eq!(state.device_len, Some(2048));
        assert!(state.contains(1536, 512));
        assert!(!state.contains(1537, 512));
    }

    #[test]
    fn test_probe_falls_back_to_config() {
        let config = FsConfig {
            default_block_size: 4096,
            ..FsConfig::default()
        };
        let state = MountState::probe(&Silent, config).unwrap();
        assert_eq!(state.block_size, 4096);
        assert_eq!(state.device_len, None);
        assert!(state.contains(u64::MAX - 1, 1));
    }

    #[test]
    fn test_probe_rejects_zero_block_size() {
        let config = FsConfig {
            default_block_size: 0,
            ..FsConfig::default()
        };
        assert!(matches!(
            MountState::probe(&Silent, config.clone()),
            Err(FsError::InvalidArgument(_))
        ));

        // A device that answers makes the fallback irrelevant.
        let dev = MemoryBlockDevice::new(512, 1);
        assert_eq!(MountState::probe(&dev, config).unwrap().block_size, 512);
    }

    #[test]
    fn test_mount_flags() {
        let dev = MemoryBlockDevice::new(512, 1);
        let mut state = MountState::probe(&dev, FsConfig::default()).unwrap();
        state.mount("test", true, false).unwrap();
        assert!(state.is_mounted());
        state.umount("test");
        assert!(!state.is_mounted());

        state.no_filesystem = true;
        assert_eq!(state.mount("test", true, false), Err(FsError::NoFilesystem));
        assert_eq!(state.mount("test", true, true), Err(FsError::NotImplemented));
    }

    #[test]
    fn test_cwd() {
        let dev = MemoryBlockDevice::new(512, 1);
        let state = MountState::probe(&dev, FsConfig::default()).unwrap();
        assert_eq!(state.getcwd(), "/");
        state.set_cwd("lib".into());
        assert_eq!(state.getcwd(), "/lib");
        assert_eq!(state.resolve("a.py").unwrap(), "lib/a.py");
    }
}

//! Mount configuration.

use alloc::string::ToString;
use serde::{Deserialize, Serialize};

use crate::error::FsError;

/// Seconds between 1970-01-01 and 2000-01-01.
pub const SECONDS_1970_TO_2000: u64 = 946_684_800;

/// Default maximum path length.
pub const DEFAULT_MAX_PATH_LEN: usize = 1024;

/// Epoch that reported modification times count from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Epoch {
    /// 1970-01-01 (archives store this natively)
    #[default]
    Unix,
    /// 2000-01-01
    Y2000,
}

impl Epoch {
    /// Convert Unix seconds into this epoch, saturating at zero.
    pub fn adjust(self, seconds: u64) -> u64 {
        match self {
            Epoch::Unix => seconds,
            Epoch::Y2000 => seconds.saturating_sub(SECONDS_1970_TO_2000),
        }
    }
}

/// Options shared by both archive drivers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FsConfig {
    /// Block size used when the device does not report one
    pub default_block_size: u32,
    /// Epoch for `mtime` values
    pub epoch: Epoch,
    /// Longest path accepted for `chdir` and lookups
    pub max_path_len: usize,
}

impl Default for FsConfig {
    fn default() -> Self {
        Self {
            default_block_size: zos_blockdev::DEFAULT_BLOCK_SIZE,
            epoch: Epoch::Unix,
            max_path_len: DEFAULT_MAX_PATH_LEN,
        }
    }
}

impl FsConfig {
    /// Parse a configuration from JSON. Missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self, FsError> {
        let config: FsConfig = serde_json::from_str(json)
            .map_err(|e| FsError::invalid_argument(e.to_string()))?;
        if config.default_block_size == 0 {
            return Err(FsError::invalid_argument("default_block_size must be non-zero"));
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json_partial() {
        let config = FsConfig::from_json(r#"{"epoch": "y2000"}"#).unwrap();
        assert_eq!(config.epoch, Epoch::Y2000);
        assert_eq!(config.default_block_size, 512);
        assert_eq!(config.max_path_len, DEFAULT_MAX_PATH_LEN);
    }

    #[test]
    fn test_from_json_rejects_zero_block_size() {
        assert!(FsConfig::from_json(r#"{"default_block_size": 0}"#).is_err());
        assert!(FsConfig::from_json("not json").is_err());
    }

    #[test]
    fn test_epoch_conversion() {
        assert_eq!(Epoch::Unix.adjust(1_000), 1_000);
        assert_eq!(Epoch::Y2000.adjust(SECONDS_1970_TO_2000 + 60), 60);
        assert_eq!(Epoch::Y2000.adjust(5), 0);
    }
}

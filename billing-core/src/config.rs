//! Configuration for the billing store

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Billing store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// RocksDB tuning
    pub rocksdb: RocksDbTuning,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/billing"),
            rocksdb: RocksDbTuning::default(),
        }
    }
}

/// RocksDB tuning knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RocksDbTuning {
    /// Block cache size (MB)
    pub block_cache_mb: usize,

    /// Write buffer size (MB)
    pub write_buffer_mb: usize,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,
}

impl Default for RocksDbTuning {
    fn default() -> Self {
        Self {
            block_cache_mb: 128,
            write_buffer_mb: 64,
            max_background_jobs: 4,
        }
    }
}

impl StoreConfig {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: StoreConfig = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = StoreConfig::default();

        if let Ok(data_dir) = std::env::var("BILLING_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        Ok(config)
    }
}

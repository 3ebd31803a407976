//! Configuration for the fiat ledger

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// Service name
    pub service_name: String,

    /// Bank identity and branch codes
    pub bank: BankConfig,

    /// RocksDB configuration
    pub rocksdb: RocksDbConfig,

    /// Deposit notification channel capacity
    pub notify_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/fiat-ledger"),
            service_name: "fiat-ledger".to_string(),
            bank: BankConfig::default(),
            rocksdb: RocksDbConfig::default(),
            notify_capacity: 256,
        }
    }
}

/// Bank identity configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankConfig {
    /// Fixed bank code carried on every account
    pub bank_code: String,

    /// Branch code for corporate accounts
    pub corporate_branch_code: String,

    /// Branch code for personal accounts
    pub personal_branch_code: String,
}

impl Default for BankConfig {
    fn default() -> Self {
        Self {
            bank_code: "9999".to_string(),
            corporate_branch_code: "001".to_string(),
            personal_branch_code: "002".to_string(),
        }
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RocksDbConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max write buffers
    pub max_write_buffer_number: i32,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,

    /// Enable statistics
    pub enable_statistics: bool,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 64,
            max_write_buffer_number: 4,
            max_background_jobs: 4,
            enable_statistics: false,
        }
    }
}

impl Config {
    /// Load from TOML file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("FIAT_LEDGER_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(code) = std::env::var("FIAT_LEDGER_BANK_CODE") {
            config.bank.bank_code = code;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.service_name, "fiat-ledger");
        assert_eq!(config.bank.bank_code, "9999");
        assert_eq!(config.bank.corporate_branch_code, "001");
        assert_eq!(config.bank.personal_branch_code, "002");
    }
}

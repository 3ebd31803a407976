//! Configuration for the token bridge

use crate::types::TokenId;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// Service name
    pub service_name: String,

    /// Tokens the bridge tracks; deposits in anything else are skipped
    pub tokens: Vec<TokenConfig>,

    /// RocksDB configuration
    pub rocksdb: RocksDbConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/token-bridge"),
            service_name: "token-bridge".to_string(),
            tokens: Vec::new(),
            rocksdb: RocksDbConfig::default(),
        }
    }
}

/// One tracked token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    /// Currency code on the network
    pub currency: String,
    /// Issuer address
    pub issuer: String,
}

impl TokenConfig {
    /// The token identity this config describes
    pub fn token_id(&self) -> TokenId {
        TokenId {
            currency: self.currency.clone(),
            issuer: self.issuer.clone(),
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
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 32,
            max_write_buffer_number: 4,
            max_background_jobs: 2,
        }
    }
}

impl BridgeConfig {
    /// Load from TOML file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: BridgeConfig = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = BridgeConfig::default();

        if let Ok(data_dir) = std::env::var("TOKEN_BRIDGE_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        Ok(config)
    }

    /// Find a tracked token by currency/issuer pair
    pub fn find_token(&self, currency: &str, issuer: &str) -> Option<TokenId> {
        self.tokens
            .iter()
            .find(|t| t.currency == currency && t.issuer == issuer)
            .map(TokenConfig::token_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BridgeConfig::default();
        assert_eq!(config.service_name, "token-bridge");
        assert!(config.tokens.is_empty());
    }

    #[test]
    fn find_token_matches_pair_exactly() {
        let mut config = BridgeConfig::default();
        config.tokens.push(TokenConfig {
            currency: "JPYB".into(),
            issuer: "rISSUER".into(),
        });

        assert!(config.find_token("JPYB", "rISSUER").is_some());
        assert!(config.find_token("JPYB", "rOTHER").is_none());
        assert!(config.find_token("USDB", "rISSUER").is_none());
    }
}

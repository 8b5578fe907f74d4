//! Configuration management for the mempool engine

use crate::cache::{DEFAULT_BLOCK_CAPACITY, DEFAULT_TRANSACTION_CAPACITY};
use crate::error::ChainError;
use crate::mempool::DEFAULT_MAX_TRANSACTIONS;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub mempool: MempoolConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MempoolConfig {
    #[serde(default = "default_max_transactions")]
    pub max_transactions: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_block_capacity")]
    pub block_capacity: usize,
    #[serde(default = "default_transaction_capacity")]
    pub transaction_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

impl Default for MempoolConfig {
    fn default() -> Self {
        Self {
            max_transactions: default_max_transactions(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            block_capacity: default_block_capacity(),
            transaction_capacity: default_transaction_capacity(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_level() }
    }
}

impl LoggingConfig {
    pub fn tracing_level(&self) -> Result<tracing::Level, ChainError> {
        self.level
            .parse()
            .map_err(|_| ChainError::Config(format!("unknown logging.level '{}'", self.level)))
    }
}

impl Config {
    pub fn from_toml_str(s: &str) -> Result<Self, ChainError> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ChainError> {
        if self.database.path.is_empty() {
            return Err(ChainError::Config("database.path must be set".to_string()));
        }
        if self.mempool.max_transactions == 0 {
            return Err(ChainError::Config(
                "mempool.max_transactions must be greater than zero".to_string(),
            ));
        }
        if self.cache.enabled && (self.cache.block_capacity == 0 || self.cache.transaction_capacity == 0) {
            return Err(ChainError::Config(
                "cache capacities must be greater than zero when the cache is enabled".to_string(),
            ));
        }
        self.logging.tracing_level()?;
        Ok(())
    }
}

/// Loads `path`, falling back to defaults when the file does not exist.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ChainError> {
    let path = path.as_ref();
    if !path.exists() {
        let config = Config::default();
        config.validate()?;
        return Ok(config);
    }
    let config_str = fs::read_to_string(path)?;
    Config::from_toml_str(&config_str)
}

fn default_db_path() -> String {
    "./data/chain.db".to_string()
}

fn default_max_transactions() -> usize {
    DEFAULT_MAX_TRANSACTIONS
}

fn default_enabled() -> bool {
    true
}

fn default_block_capacity() -> usize {
    DEFAULT_BLOCK_CAPACITY
}

fn default_transaction_capacity() -> usize {
    DEFAULT_TRANSACTION_CAPACITY
}

fn default_level() -> String {
    "info".to_string()
}

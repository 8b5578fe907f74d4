//! Error types for the mempool rebase engine

use crate::transaction::Outpoint;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
    #[error("Missing input: {0}")]
    MissingInput(Outpoint),
    #[error("Outpoint not found: {0}")]
    OutpointNotFound(Outpoint),
    #[error("Input spent twice by the same transaction: {0}")]
    DuplicateInput(Outpoint),
    #[error("No common ancestor between {tip_a} and {tip_b}")]
    NoCommonAncestor { tip_a: String, tip_b: String },
    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),
    #[error("Invalid block: {0}")]
    InvalidBlock(String),
    #[error("Double spend detected: {0}")]
    DoubleSpendDetected(String),
    #[error("Mempool is full")]
    MempoolFull,
    #[error("Database error: {0}")]
    Database(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ChainError {
    pub fn not_found(kind: &'static str, id: &[u8]) -> Self {
        ChainError::NotFound {
            kind,
            id: hex::encode(id),
        }
    }

    /// True for storage misses, as opposed to backend failures.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ChainError::NotFound { .. })
    }
}

impl From<std::io::Error> for ChainError {
    fn from(err: std::io::Error) -> Self {
        ChainError::Io(err.to_string())
    }
}

impl From<rusqlite::Error> for ChainError {
    fn from(err: rusqlite::Error) -> Self {
        ChainError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for ChainError {
    fn from(err: serde_json::Error) -> Self {
        ChainError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for ChainError {
    fn from(err: toml::de::Error) -> Self {
        ChainError::Config(err.to_string())
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, ChainError>;

//! Error types for the indexer

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] soul_core::SoulError),

    #[error("Storage layer error: {0}")]
    StorageLayer(#[from] soul_storage::StorageError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to start indexer thread: {0}")]
    Thread(String),

    #[error("No open track transaction")]
    NoTransaction,
}

impl From<config::ConfigError> for IndexerError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

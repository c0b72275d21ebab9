/// Indexer configuration
use crate::error::IndexerError;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Operator-tunable indexer settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IndexerConfig {
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Directory holding `indexer_log.txt`
    #[serde(default = "default_data_directory")]
    pub data_directory: PathBuf,

    /// Worker pool size for tag extraction; 1 reads tags on the walking thread
    #[serde(default = "default_thread_count")]
    pub thread_count: usize,

    /// Files processed between commit-and-restart points
    #[serde(default = "default_transaction_interval")]
    pub transaction_interval: u64,

    /// Delete local tracks whose file no longer exists on disk
    #[serde(default = "default_remove_missing_files")]
    pub remove_missing_files: bool,

    /// Write the per-file scan log
    #[serde(default)]
    pub log_enabled: bool,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            data_directory: default_data_directory(),
            thread_count: default_thread_count(),
            transaction_interval: default_transaction_interval(),
            remove_missing_files: default_remove_missing_files(),
            log_enabled: false,
        }
    }
}

impl IndexerConfig {
    /// Load configuration from file and environment
    ///
    /// Reads `path` (or `indexer.toml` in the working directory) when it
    /// exists, then applies `SOUL_INDEXER_*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = config::Config::builder();

        let config_path = path.map_or_else(|| PathBuf::from("indexer.toml"), Path::to_path_buf);
        if config_path.exists() {
            settings = settings.add_source(config::File::from(config_path));
        }

        // Override with environment variables (e.g. SOUL_INDEXER_THREAD_COUNT)
        settings = settings.add_source(
            config::Environment::with_prefix("SOUL_INDEXER")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = settings.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.thread_count == 0 {
            return Err(IndexerError::Config(
                "thread_count must be at least 1".to_string(),
            ));
        }

        if self.transaction_interval == 0 {
            return Err(IndexerError::Config(
                "transaction_interval must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    pub fn log_path(&self) -> PathBuf {
        self.data_directory.join("indexer_log.txt")
    }
}

// Default values
fn default_database_url() -> String {
    "sqlite://./data/library.db".to_string()
}

fn default_data_directory() -> PathBuf {
    PathBuf::from("./data")
}

fn default_thread_count() -> usize {
    if cfg!(target_arch = "arm") {
        2
    } else {
        4
    }
}

fn default_transaction_interval() -> u64 {
    300
}

fn default_remove_missing_files() -> bool {
    true
}

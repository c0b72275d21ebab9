//! Soul Player Library Indexer
//!
//! Keeps the metadata store in line with the configured root directories
//! and plugin sources.
//!
//! # Features
//!
//! - Deduplicated scan queue served by one lazily started background thread
//! - Parallel tag extraction on a per-cycle worker pool
//! - Plugin sources driven through a scan / per-track refresh protocol
//! - Batched writes committed every `transaction_interval` files
//! - Cleanup, playlist repair and sort-order optimization after each scan
//! - Analyzer plugins fed with decoded audio as a final pass
//!
//! # Architecture
//!
//! - `indexer`: public handle, state machine and thread loop
//! - `cycle`: one scan cycle from path changes to completion
//! - `walker`: directory traversal and per-file work
//! - `sources`: source protocol and the writer handed to sources
//! - `finalize`: delete, cleanup and optimize passes
//! - `analysis`: analyzer pipeline
//!
//! # Example
//!
//! ```rust,no_run
//! use soul_core::SyncType;
//! use soul_indexer::{Indexer, IndexerConfig, PluginRegistry};
//!
//! # async fn example() -> soul_indexer::Result<()> {
//! let indexer = Indexer::new(IndexerConfig::load(None)?, PluginRegistry::default()).await?;
//! let mut events = indexer.subscribe();
//!
//! indexer.add_path("/music");
//! indexer.schedule(SyncType::All, None);
//!
//! while let Ok(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! # Ok(())
//! # }
//! ```

mod analysis;
mod config;
mod cycle;
mod error;
mod events;
mod finalize;
mod indexer;
mod scan_log;
mod sources;
mod state;
mod transaction;
mod walker;

pub use config::IndexerConfig;
pub use error::IndexerError;
pub use events::IndexerEvent;
pub use indexer::{Indexer, PluginRegistry};
pub use state::IndexerState;

pub type Result<T> = std::result::Result<T, IndexerError>;

//! Soul Player Core
//!
//! Platform-agnostic types, plugin capability traits, and error handling for
//! the Soul Player library indexer.
//!
//! # Architecture
//!
//! The core crate defines:
//! - **Domain Types**: `SyncContext`, `TrackRecord`, `ReplayGain`, `AudioBuffer`
//! - **Capability Traits**: `TagReader`, `IndexerSource`, `IndexerWriter`, `Analyzer`,
//!   `DecoderFactory`
//! - **Error Handling**: Unified `SoulError` and `Result` types
//!
//! # Example
//!
//! ```rust
//! use soul_core::types::{keys, SyncContext, SyncType, TrackRecord};
//! use soul_core::TagStore;
//!
//! let context = SyncContext::new(SyncType::Sources, Some(3));
//! assert_eq!(context.target_source(), Some(3));
//!
//! let mut track = TrackRecord::new();
//! track.set_value(keys::TITLE, "My Favorite Song");
//! assert_eq!(track.get(keys::TITLE), Some("My Favorite Song"));
//! ```

#![forbid(unsafe_code)]

pub mod error;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use error::{Result, SoulError};
pub use traits::{
    Analyzer, DecodeStream, DecoderFactory, IndexerSource, IndexerWriter, TagReader, TagStore,
};

pub use types::{
    keys, AudioBuffer, AudioFormat, ReplayGain, SampleRate, ScanPaths, ScanResult, SourceId,
    StreamOptions, SyncContext, SyncType, TrackId, TrackRecord, LOCAL_SOURCE_ID,
};

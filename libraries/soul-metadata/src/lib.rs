//! Soul Player Metadata
//!
//! Built-in tag reader for the library indexer.
//!
//! This crate provides [`LoftyTagReader`], which reads tags from MP3, FLAC,
//! OGG, OPUS, MP4/AAC, WAV, AIFF and a few less common containers into a
//! [`soul_core::TagStore`].
//!
//! # Example
//!
//! ```rust,no_run
//! use soul_core::{TagReader, TrackRecord};
//! use soul_metadata::LoftyTagReader;
//! use std::path::Path;
//!
//! # fn example() -> soul_core::Result<()> {
//! let reader = LoftyTagReader::new();
//! let mut track = TrackRecord::new();
//! if reader.can_read("mp3") {
//!     reader.read(Path::new("/music/song.mp3"), &mut track)?;
//! }
//! # Ok(())
//! # }
//! ```

mod error;
mod reader;

pub use error::{MetadataError, Result};
pub use reader::LoftyTagReader;

//! Soul Player Audio
//!
//! Audio decoding for the indexer's analyzer pass.
//!
//! This crate provides:
//! - Audio decoding via Symphonia (MP3, FLAC, OGG, WAV, AAC, AIFF)
//! - Fixed-size interleaved f32 buffers with surround downmix, no DSP
//!
//! # Example: Decoding Audio
//!
//! ```rust,no_run
//! use soul_audio::SymphoniaDecoderFactory;
//! use soul_core::{DecoderFactory, StreamOptions};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let factory = SymphoniaDecoderFactory::new();
//! let mut stream = factory.open("/music/song.flac", &StreamOptions::default())?;
//!
//! while let Some(buffer) = stream.next_buffer()? {
//!     println!("{} frames at {} Hz", buffer.frames(), buffer.format.sample_rate.as_hz());
//! }
//! # Ok(())
//! # }
//! ```

mod decoder;
mod error;

pub use decoder::{SymphoniaDecoderFactory, SymphoniaStream};
pub use error::{AudioError, Result};

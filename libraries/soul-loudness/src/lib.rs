//! Loudness analysis for the Soul library indexer
//!
//! This crate provides:
//! - EBU R128 loudness measurement (integrated LUFS, true peak)
//! - ReplayGain 2.0 track gain calculation
//! - [`ReplayGainAnalyzer`], an indexer analyzer plugin that stores the
//!   measured gain on each track
//!
//! # Example
//!
//! ```ignore
//! use soul_loudness::LoudnessAnalyzer;
//!
//! let mut analyzer = LoudnessAnalyzer::new(44100, 2)?;
//! analyzer.add_frames(&audio_samples)?;
//! let info = analyzer.finalize()?;
//!
//! println!("Integrated loudness: {:.1} LUFS", info.integrated_lufs);
//! ```

#![deny(unsafe_code)]

mod analyzer;
mod error;
mod plugin;
mod replaygain;

pub use analyzer::{LoudnessAnalyzer, LoudnessInfo};
pub use error::{LoudnessError, Result};
pub use plugin::ReplayGainAnalyzer;
pub use replaygain::{replay_gain_for, track_gain_db};

/// ReplayGain 2.0 reference loudness level (-18 LUFS)
pub const REPLAYGAIN_REFERENCE_LUFS: f64 = -18.0;

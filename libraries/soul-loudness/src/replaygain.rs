//! ReplayGain 2.0 calculation
//!
//! ReplayGain 2.0 is based on EBU R128 loudness measurement and uses
//! -18 LUFS as the reference level.
//!
//! - Track Gain = Reference Level (-18 LUFS) - Track Integrated Loudness
//! - Peak = linear sample peak, so `gain + 20*log10(peak) > 0` predicts clipping

use crate::{LoudnessInfo, REPLAYGAIN_REFERENCE_LUFS};
use soul_core::ReplayGain;

/// Gain in dB that brings `info` to the ReplayGain reference level
pub fn track_gain_db(info: &LoudnessInfo) -> f64 {
    REPLAYGAIN_REFERENCE_LUFS - info.integrated_lufs
}

/// ReplayGain values for a single analyzed track
///
/// Without album context the album fields mirror the track fields.
pub fn replay_gain_for(info: &LoudnessInfo) -> ReplayGain {
    ReplayGain::track_only(track_gain_db(info) as f32, info.sample_peak as f32)
}

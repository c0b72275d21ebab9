use serde::{Deserialize, Serialize};

/// ReplayGain values for one track, gains in dB and peaks linear
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ReplayGain {
    pub track_gain: f32,
    pub track_peak: f32,
    pub album_gain: f32,
    pub album_peak: f32,
}

impl ReplayGain {
    /// Gain for a track with no album context; album values mirror the track
    pub fn track_only(gain: f32, peak: f32) -> Self {
        Self {
            track_gain: gain,
            track_peak: peak,
            album_gain: gain,
            album_peak: peak,
        }
    }
}

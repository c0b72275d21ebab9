//! Decoded audio handed from decoders to analyzers

use serde::{Deserialize, Serialize};

/// Sample rate in Hz
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SampleRate(pub u32);

impl SampleRate {
    pub const CD_QUALITY: Self = Self(44_100);

    #[must_use]
    pub fn new(hz: u32) -> Self {
        Self(hz)
    }

    pub fn as_hz(&self) -> u32 {
        self.0
    }
}

/// Shape of the samples in an [`AudioBuffer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    pub sample_rate: SampleRate,
    pub channels: u16,
    /// Precision the decoder produced before conversion to f32
    pub bits_per_sample: u16,
}

impl AudioFormat {
    pub fn new(sample_rate: SampleRate, channels: u16, bits_per_sample: u16) -> Self {
        Self {
            sample_rate,
            channels,
            bits_per_sample,
        }
    }
}

/// Interleaved f32 samples in `[-1.0, 1.0]`
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    pub samples: Vec<f32>,
    pub format: AudioFormat,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, format: AudioFormat) -> Self {
        Self { samples, format }
    }

    /// Samples per channel; zero for a buffer without channels
    pub fn frames(&self) -> usize {
        match usize::from(self.format.channels) {
            0 => 0,
            channels => self.samples.len() / channels,
        }
    }
}

/// Target format of a decode stream opened for analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamOptions {
    /// Frames delivered per buffer
    pub frames_per_buffer: usize,

    /// Output channel count; sources are up- or down-mixed to it
    pub channels: u16,

    /// Whether the playback DSP chain runs on the decoded audio
    pub apply_dsp: bool,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            frames_per_buffer: 2048,
            channels: 2,
            apply_dsp: false,
        }
    }
}

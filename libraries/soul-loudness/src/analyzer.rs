//! EBU R128 loudness analysis
//!
//! Measures integrated loudness and peaks with the ebur128 crate. True peak
//! uses the crate's 4x oversampling as per ITU-R BS.1770.

use crate::error::{LoudnessError, Result};
use ebur128::{EbuR128, Mode};
use std::fmt;

/// Loudness characteristics of one track
#[derive(Debug, Clone, PartialEq)]
pub struct LoudnessInfo {
    /// Integrated loudness in LUFS
    pub integrated_lufs: f64,

    /// Maximum inter-sample peak across channels, linear (1.0 = full scale)
    pub true_peak: f64,

    /// Maximum sample value across channels, linear
    pub sample_peak: f64,

    /// Duration of the analyzed audio in seconds
    pub duration_seconds: f64,
}

impl LoudnessInfo {
    /// True peak in dBTP
    pub fn true_peak_dbfs(&self) -> f64 {
        to_db(self.true_peak)
    }
}

impl fmt::Display for LoudnessInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Loudness: {:.1} LUFS, True Peak: {:.1} dBTP",
            self.integrated_lufs,
            self.true_peak_dbfs()
        )
    }
}

fn to_db(linear: f64) -> f64 {
    if linear > 0.0 {
        20.0 * linear.log10()
    } else {
        -f64::INFINITY
    }
}

/// EBU R128 loudness analyzer fed with interleaved f32 frames
pub struct LoudnessAnalyzer {
    ebur128: EbuR128,
    sample_rate: u32,
    channels: u32,
    samples_processed: usize,
}

impl LoudnessAnalyzer {
    /// Create a new loudness analyzer
    ///
    /// # Errors
    /// Returns error if the sample rate is outside 8000-384000 Hz or the
    /// channel count outside 1-8
    pub fn new(sample_rate: u32, channels: u32) -> Result<Self> {
        if !(8000..=384_000).contains(&sample_rate) {
            return Err(LoudnessError::InvalidSampleRate(sample_rate));
        }
        if !(1..=8).contains(&channels) {
            return Err(LoudnessError::InvalidChannelCount(channels));
        }

        let mode = Mode::I | Mode::SAMPLE_PEAK | Mode::TRUE_PEAK;
        let ebur128 = EbuR128::new(channels, sample_rate, mode)?;

        Ok(Self {
            ebur128,
            sample_rate,
            channels,
            samples_processed: 0,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u32 {
        self.channels
    }

    /// Add interleaved samples; the length must be a multiple of the channel count
    pub fn add_frames(&mut self, samples: &[f32]) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }

        if samples.len() % self.channels as usize != 0 {
            return Err(LoudnessError::AnalysisError(format!(
                "Sample count {} is not divisible by channel count {}",
                samples.len(),
                self.channels
            )));
        }

        self.ebur128.add_frames_f32(samples)?;
        self.samples_processed += samples.len();

        Ok(())
    }

    fn max_over_channels(&self, peak: impl Fn(u32) -> Option<f64>) -> f64 {
        (0..self.channels)
            .filter_map(peak)
            .fold(0.0_f64, f64::max)
    }

    /// Finish the measurement
    ///
    /// # Errors
    /// Returns error if no samples were provided or the audio is silent
    pub fn finalize(self) -> Result<LoudnessInfo> {
        if self.samples_processed == 0 {
            return Err(LoudnessError::NoSamples);
        }

        let integrated_lufs = self.ebur128.loudness_global()?;

        // ebur128 reports -inf for silence
        if !integrated_lufs.is_finite() {
            return Err(LoudnessError::SilentAudio);
        }

        let frames = self.samples_processed / self.channels as usize;

        Ok(LoudnessInfo {
            integrated_lufs,
            true_peak: self.max_over_channels(|ch| self.ebur128.true_peak(ch).ok()),
            sample_peak: self.max_over_channels(|ch| self.ebur128.sample_peak(ch).ok()),
            duration_seconds: frames as f64 / f64::from(self.sample_rate),
        })
    }
}

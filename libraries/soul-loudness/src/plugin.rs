//! Indexer analyzer that measures ReplayGain from decoded audio

use crate::analyzer::LoudnessAnalyzer;
use crate::error::LoudnessError;
use crate::replaygain::replay_gain_for;
use soul_core::types::keys;
use soul_core::{Analyzer, AudioBuffer, AudioFormat, TagStore};
use std::sync::{Mutex, MutexGuard, PoisonError};

struct Measurement {
    format: AudioFormat,
    analyzer: LoudnessAnalyzer,
}

/// Computes track gain and peak for every track that has a filename.
///
/// The indexer drives one track at a time, so a single in-flight
/// measurement is kept and reset by `start`.
#[derive(Default)]
pub struct ReplayGainAnalyzer {
    current: Mutex<Option<Measurement>>,
}

impl ReplayGainAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    fn current(&self) -> MutexGuard<'_, Option<Measurement>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn feed(slot: &mut Option<Measurement>, buffer: &AudioBuffer) -> Result<(), LoudnessError> {
        if slot.is_none() {
            let analyzer = LoudnessAnalyzer::new(
                buffer.format.sample_rate.as_hz(),
                u32::from(buffer.format.channels),
            )?;
            *slot = Some(Measurement {
                format: buffer.format,
                analyzer,
            });
        }

        let Some(measurement) = slot.as_mut() else {
            return Err(LoudnessError::NoSamples);
        };
        if measurement.format.sample_rate != buffer.format.sample_rate
            || measurement.format.channels != buffer.format.channels
        {
            return Err(LoudnessError::FormatChanged(format!(
                "{} Hz x{} -> {} Hz x{}",
                measurement.format.sample_rate.as_hz(),
                measurement.format.channels,
                buffer.format.sample_rate.as_hz(),
                buffer.format.channels
            )));
        }

        measurement.analyzer.add_frames(&buffer.samples)
    }
}

impl Analyzer for ReplayGainAnalyzer {
    fn name(&self) -> &str {
        "replaygain"
    }

    fn start(&self, track: &mut dyn TagStore) -> bool {
        *self.current() = None;
        track.value(keys::FILENAME).is_some()
    }

    fn analyze(&self, track: &mut dyn TagStore, buffer: &AudioBuffer) -> bool {
        let mut slot = self.current();
        match Self::feed(&mut slot, buffer) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(
                    filename = track.value(keys::FILENAME).unwrap_or_default(),
                    "ReplayGain analysis stopped: {}",
                    e
                );
                *slot = None;
                false
            }
        }
    }

    fn end(&self, track: &mut dyn TagStore) -> bool {
        let Some(measurement) = self.current().take() else {
            return false;
        };

        match measurement.analyzer.finalize() {
            Ok(info) => {
                tracing::debug!(
                    filename = track.value(keys::FILENAME).unwrap_or_default(),
                    "{}",
                    info
                );
                track.set_replay_gain(replay_gain_for(&info));
                true
            }
            Err(e) => {
                tracing::debug!("ReplayGain finalize failed: {}", e);
                false
            }
        }
    }
}

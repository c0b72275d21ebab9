/// Analysis decode streams built on Symphonia
use crate::error::{AudioError, Result};
use soul_core::{AudioBuffer, AudioFormat, DecodeStream, DecoderFactory, SampleRate, StreamOptions};
use std::collections::VecDeque;
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// ITU-R BS.775-1 coefficient for center and surround channels (-3dB)
const CENTER_MIX: f32 = 0.707;

const EXTENSIONS: &[&str] = &["mp3", "flac", "ogg", "oga", "opus", "wav", "m4a", "aac", "aiff", "aif"];

/// Opens Symphonia decode streams
///
/// Supports: MP3, FLAC, OGG, WAV, AAC, AIFF
#[derive(Debug, Default, Clone, Copy)]
pub struct SymphoniaDecoderFactory;

impl SymphoniaDecoderFactory {
    /// Create a new decoder factory
    pub fn new() -> Self {
        Self
    }
}

impl DecoderFactory for SymphoniaDecoderFactory {
    fn can_decode(&self, uri: &str) -> bool {
        Path::new(uri)
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| EXTENSIONS.contains(&ext.to_lowercase().as_str()))
    }

    fn open(&self, uri: &str, options: &StreamOptions) -> soul_core::Result<Box<dyn DecodeStream>> {
        Ok(Box::new(SymphoniaStream::open(Path::new(uri), *options)?))
    }
}

/// Short-lived decode stream delivering fixed-size interleaved f32 buffers
///
/// Opening with `apply_dsp` fails; multi-channel audio is only mixed down
/// to the requested channel count.
pub struct SymphoniaStream {
    /// Format reader (container parser)
    format: Box<dyn FormatReader>,
    /// Audio decoder
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
    options: StreamOptions,
    /// Mixed samples not yet handed out
    pending: VecDeque<f32>,
    finished: bool,
}

impl SymphoniaStream {
    /// Probe `path` and prepare its default track for decoding
    pub fn open(path: &Path, options: StreamOptions) -> Result<Self> {
        if !path.exists() {
            return Err(AudioError::FileNotFound(path.display().to_string()));
        }
        if options.channels == 0 || options.frames_per_buffer == 0 {
            return Err(AudioError::InvalidBuffer(format!(
                "{} channels x {} frames",
                options.channels, options.frames_per_buffer
            )));
        }
        if options.apply_dsp {
            return Err(AudioError::Unsupported("apply_dsp"));
        }

        let file = std::fs::File::open(path)?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        // Create a hint to help the format registry guess the format
        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| AudioError::Symphonia(format!("Failed to probe file: {}", e)))?;

        let format = probed.format;
        let track = format
            .default_track()
            .ok_or_else(|| AudioError::DecodeError("No audio tracks found".to_string()))?;

        let sample_rate = track.codec_params.sample_rate.unwrap_or(44100);
        let track_id = track.id;

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| AudioError::Symphonia(format!("Failed to create decoder: {}", e)))?;

        Ok(Self {
            format,
            decoder,
            track_id,
            sample_rate,
            options,
            pending: VecDeque::new(),
            finished: false,
        })
    }

    fn target_samples(&self) -> usize {
        self.options.frames_per_buffer * usize::from(self.options.channels)
    }

    /// Decode the next packet of our track into `pending`
    ///
    /// Returns `false` at end of stream.
    fn decode_packet(&mut self) -> Result<bool> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    return Ok(false);
                }
                // A fresh stream is never seeked, so a reset means the track list changed
                Err(SymphoniaError::ResetRequired) => return Ok(false),
                Err(e) => {
                    return Err(AudioError::Symphonia(format!("Error reading packet: {}", e)));
                }
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(e)) => {
                    tracing::debug!("recoverable decode error: {}", e);
                    continue;
                }
                Err(e) => return Err(AudioError::DecodeError(format!("Decode error: {}", e))),
            };

            let spec = *decoded.spec();
            let mut interleaved = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
            interleaved.copy_interleaved_ref(decoded);

            mix_into(
                interleaved.samples(),
                spec.channels.count(),
                self.options.channels,
                &mut self.pending,
            );
            return Ok(true);
        }
    }
}

impl DecodeStream for SymphoniaStream {
    fn next_buffer(&mut self) -> soul_core::Result<Option<AudioBuffer>> {
        let target = self.target_samples();

        while !self.finished && self.pending.len() < target {
            if !self.decode_packet()? {
                self.finished = true;
            }
        }

        if self.pending.is_empty() {
            return Ok(None);
        }

        let take = target.min(self.pending.len());
        let samples: Vec<f32> = self.pending.drain(..take).collect();
        let format = AudioFormat::new(SampleRate::new(self.sample_rate), self.options.channels, 32);

        Ok(Some(AudioBuffer::new(samples, format)))
    }
}

/// Mix interleaved `source_channels` audio into `target_channels`
///
/// Stereo output uses ITU-R BS.775-1 downmix coefficients for surround
/// layouts (FL, FR, C, LFE, SL, SR); mono output averages every channel.
fn mix_into(samples: &[f32], source_channels: usize, target_channels: u16, out: &mut VecDeque<f32>) {
    if source_channels == 0 {
        return;
    }

    for frame in samples.chunks_exact(source_channels) {
        match (target_channels, source_channels) {
            (1, _) => out.push_back(frame.iter().sum::<f32>() / source_channels as f32),
            (2, 1) => {
                out.push_back(frame[0]);
                out.push_back(frame[0]);
            }
            (2, 2) => {
                out.push_back(frame[0].clamp(-1.0, 1.0));
                out.push_back(frame[1].clamp(-1.0, 1.0));
            }
            (2, _) => {
                let (l, r) = downmix_stereo(frame);
                out.push_back(l);
                out.push_back(r);
            }
            (n, _) => {
                // Wider targets keep the leading channels and pad with silence
                for channel in 0..usize::from(n) {
                    out.push_back(frame.get(channel).copied().unwrap_or(0.0));
                }
            }
        }
    }
}

fn downmix_stereo(frame: &[f32]) -> (f32, f32) {
    let (l, r) = (frame[0], frame[1]);
    let (extra_l, extra_r) = match frame.len() {
        // L, R, C
        3 => (frame[2] * CENTER_MIX, frame[2] * CENTER_MIX),
        // L, R, SL, SR
        4 => (frame[2] * CENTER_MIX, frame[3] * CENTER_MIX),
        // L, R, C, SL, SR
        5 => {
            let c = frame[2] * CENTER_MIX;
            (c + frame[3] * CENTER_MIX, c + frame[4] * CENTER_MIX)
        }
        // L, R, C, LFE, SL, SR, ...
        _ => {
            let c = (frame[2] + frame[3]) * CENTER_MIX;
            (c + frame[4] * CENTER_MIX, c + frame[5] * CENTER_MIX)
        }
    };

    ((l + extra_l).clamp(-1.0, 1.0), (r + extra_r).clamp(-1.0, 1.0))
}

//! Core audio data types
//!
//! Everything past the decoder works on interleaved stereo f32:
//! `[L, R, L, R, ...]`, samples in `[-1.0, 1.0]`.

use lyra_common::time::frames_to_seconds;
use lyra_common::TrackIdentity;
use std::path::PathBuf;

/// Channel count of every buffer past the decoder
pub const CHANNELS: usize = 2;

/// Immutable facts about an opened track
///
/// Shared read-only between the control context, background readers and
/// the render context.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackInfo {
    pub identity: TrackIdentity,
    pub path: PathBuf,
    /// Native sample rate of the file
    pub sample_rate: u32,
    /// Channel count in the file (output is always stereo)
    pub channels: u16,
    /// Total length in frames at `sample_rate`
    pub total_frames: u64,
    /// Short codec name for logging
    pub codec: String,
}

impl TrackInfo {
    /// Duration in seconds
    pub fn duration(&self) -> f64 {
        frames_to_seconds(self.total_frames, self.sample_rate)
    }
}

/// One bounded chunk of decoded PCM
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PcmChunk {
    /// Absolute frame index of the first frame in `samples`
    pub start_frame: u64,
    /// Interleaved stereo samples
    pub samples: Vec<f32>,
    /// Reader reached the end of the track with this chunk
    pub end_of_track: bool,
}

impl PcmChunk {
    pub fn frames(&self) -> usize {
        self.samples.len() / CHANNELS
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// A single stereo sample, as handed to the output device
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AudioFrame {
    pub left: f32,
    pub right: f32,
}

impl AudioFrame {
    /// Create a silent frame (0.0, 0.0)
    pub fn zero() -> Self {
        AudioFrame::default()
    }

    pub fn from_stereo(left: f32, right: f32) -> Self {
        AudioFrame { left, right }
    }

    /// Apply volume scaling to both channels
    pub fn apply_volume(&mut self, volume: f32) {
        self.left *= volume;
        self.right *= volume;
    }

    /// Clamp samples to `[-1.0, 1.0]`
    pub fn clamp(&mut self) {
        self.left = self.left.clamp(-1.0, 1.0);
        self.right = self.right.clamp(-1.0, 1.0);
    }
}

/// Reduce interleaved samples with `channels` channels to interleaved stereo
///
/// Mono is duplicated to both sides; anything wider keeps the front pair.
pub fn to_stereo(samples: &[f32], channels: usize, output: &mut Vec<f32>) {
    match channels {
        0 => {}
        1 => {
            output.reserve(samples.len() * 2);
            for &s in samples {
                output.push(s);
                output.push(s);
            }
        }
        2 => output.extend_from_slice(samples),
        n => {
            output.reserve(samples.len() / n * 2);
            for frame in samples.chunks_exact(n) {
                output.push(frame[0]);
                output.push(frame[1]);
            }
        }
    }
}

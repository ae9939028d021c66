//! Pitch node
//!
//! Shifts pitch without changing duration: WSOLA stretches by the pitch
//! factor, then a rubato resampler shrinks the result back by the same
//! factor. The resampler also converts from the track's rate to the output
//! rate, so every voice leaves this node at the output rate.

use super::stretch::Wsola;
use crate::audio::CHANNELS;
use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::warn;

/// Resampler input block, frames
const RESAMPLER_CHUNK: usize = 256;
/// Resample ratio may move this far from its base in either direction
const MAX_RELATIVE_RATIO: f64 = 2.0;

/// Pitch factor for a semitone offset
pub fn semitones_to_factor(semitones: f64) -> f64 {
    2f64.powf(semitones / 12.0)
}

pub struct PitchNode {
    semitones: f64,
    input_rate: u32,
    output_rate: u32,
    wsola: Wsola,
    resampler: Option<FastFixedIn<f32>>,
    /// Resampler engaged for the previous block
    resampling: bool,
    planar: [Vec<f32>; CHANNELS],
    stretched: Vec<f32>,
}

impl PitchNode {
    pub fn new(input_rate: u32, output_rate: u32) -> Self {
        let mut node = Self {
            semitones: 0.0,
            input_rate,
            output_rate,
            wsola: Wsola::new(input_rate),
            resampler: None,
            resampling: false,
            planar: [Vec::new(), Vec::new()],
            stretched: Vec::new(),
        };
        node.configure(input_rate, output_rate);
        node
    }

    /// Rebuild for a new input or output rate
    pub fn configure(&mut self, input_rate: u32, output_rate: u32) {
        self.input_rate = input_rate.max(1);
        self.output_rate = output_rate.max(1);
        self.wsola = Wsola::new(self.input_rate);
        self.wsola.set_stretch(self.factor());

        let base = self.output_rate as f64 / self.input_rate as f64;
        self.resampler = match FastFixedIn::<f32>::new(
            base,
            MAX_RELATIVE_RATIO,
            PolynomialDegree::Cubic,
            RESAMPLER_CHUNK,
            CHANNELS,
        ) {
            Ok(resampler) => Some(resampler),
            Err(e) => {
                warn!("Failed to create resampler ({} -> {} Hz): {}", input_rate, output_rate, e);
                None
            }
        };
        self.apply_ratio();
        self.clear_buffers();
    }

    pub fn set_semitones(&mut self, semitones: f64) {
        self.semitones = semitones;
        self.wsola.set_stretch(self.factor());
        self.apply_ratio();
    }

    fn factor(&self) -> f64 {
        semitones_to_factor(self.semitones)
    }

    fn resample_ratio(&self) -> f64 {
        self.output_rate as f64 / self.input_rate as f64 / self.factor()
    }

    fn apply_ratio(&mut self) {
        let ratio = self.resample_ratio();
        if let Some(resampler) = self.resampler.as_mut() {
            if let Err(e) = resampler.set_resample_ratio(ratio, false) {
                warn!("Resample ratio {} rejected: {}", ratio, e);
            }
        }
    }

    fn needs_resampling(&self) -> bool {
        (self.resample_ratio() - 1.0).abs() > 1e-9
    }

    pub fn reset(&mut self) {
        self.wsola.reset();
        if let Some(resampler) = self.resampler.as_mut() {
            resampler.reset();
            self.apply_ratio();
        }
        self.clear_buffers();
    }

    fn clear_buffers(&mut self) {
        self.planar.iter_mut().for_each(Vec::clear);
        self.stretched.clear();
        self.resampling = false;
    }

    /// Process interleaved stereo at the input rate into output-rate audio
    pub fn process(&mut self, input: &[f32], output: &mut Vec<f32>) {
        let stretching = !self.wsola.is_identity();
        let resampling = self.needs_resampling() && self.resampler.is_some();

        if !stretching && !resampling {
            if self.resampling {
                self.reset();
            }
            output.extend_from_slice(input);
            return;
        }

        self.stretched.clear();
        if stretching {
            self.wsola.process(input, &mut self.stretched);
        } else {
            self.stretched.extend_from_slice(input);
        }

        if !resampling {
            output.extend_from_slice(&self.stretched);
            return;
        }
        self.resampling = true;

        for frame in self.stretched.chunks_exact(CHANNELS) {
            self.planar[0].push(frame[0]);
            self.planar[1].push(frame[1]);
        }

        let Some(resampler) = self.resampler.as_mut() else {
            return;
        };
        loop {
            let needed = resampler.input_frames_next();
            if self.planar[0].len() < needed {
                break;
            }
            let block = [&self.planar[0][..needed], &self.planar[1][..needed]];
            match resampler.process(&block, None) {
                Ok(planar_out) => {
                    let frames = planar_out[0].len();
                    output.reserve(frames * CHANNELS);
                    for i in 0..frames {
                        output.push(planar_out[0][i]);
                        output.push(planar_out[1][i]);
                    }
                }
                Err(e) => warn!("Resampling failed, dropping block: {}", e),
            }
            self.planar.iter_mut().for_each(|ch| {
                ch.drain(..needed);
            });
        }
    }
}

//! Streaming WSOLA time stretcher
//!
//! Waveform-similarity overlap-add: output is built from Hann-windowed
//! frames at a fixed synthesis hop of half a frame. Each analysis frame is
//! taken near its nominal input position, shifted within a small tolerance
//! to the offset that best continues the previous frame. Duration changes
//! by `stretch`, pitch does not.

use crate::audio::CHANNELS;
use std::f32::consts::PI;

/// Frame length in seconds
const FRAME_SECONDS: f64 = 0.025;
/// Correlation is computed on every n-th frame of the overlap
const CORRELATION_STRIDE: usize = 2;

#[derive(Debug)]
pub struct Wsola {
    /// Output duration divided by input duration
    stretch: f64,
    frame_len: usize,
    /// Synthesis hop, half a frame
    hop: usize,
    tolerance: usize,
    window: Vec<f32>,
    /// Buffered interleaved input
    input: Vec<f32>,
    /// Absolute frame index of `input[0]`
    input_offset: u64,
    /// Absolute frame index of the next nominal analysis frame
    analysis_pos: f64,
    /// Start of the previously chosen analysis frame
    previous: Option<u64>,
    /// Windowed second half of the previous frame
    overlap: Vec<f32>,
}

impl Wsola {
    pub fn new(sample_rate: u32) -> Self {
        let frame_len = (((sample_rate as f64 * FRAME_SECONDS) as usize).max(64)) & !1;
        let hop = frame_len / 2;
        // Periodic Hann: w[n] + w[n + N/2] == 1
        let window = (0..frame_len)
            .map(|n| 0.5 - 0.5 * (2.0 * PI * n as f32 / frame_len as f32).cos())
            .collect();

        Self {
            stretch: 1.0,
            frame_len,
            hop,
            tolerance: frame_len / 4,
            window,
            input: Vec::new(),
            input_offset: 0,
            analysis_pos: 0.0,
            previous: None,
            overlap: vec![0.0; hop * CHANNELS],
        }
    }

    pub fn stretch(&self) -> f64 {
        self.stretch
    }

    pub fn set_stretch(&mut self, stretch: f64) {
        self.stretch = stretch.max(0.05);
    }

    pub fn is_identity(&self) -> bool {
        (self.stretch - 1.0).abs() < 1e-6
    }

    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    /// Drop all buffered input and overlap state
    pub fn reset(&mut self) {
        self.input.clear();
        self.input_offset = 0;
        self.analysis_pos = 0.0;
        self.previous = None;
        self.overlap.iter_mut().for_each(|s| *s = 0.0);
    }

    /// Feed interleaved stereo `input`, appending whatever output is ready
    pub fn process(&mut self, input: &[f32], output: &mut Vec<f32>) {
        self.input.extend_from_slice(input);

        loop {
            let nominal = self.analysis_pos.round() as u64;
            let available_end = self.input_offset + (self.input.len() / CHANNELS) as u64;
            if nominal + (self.tolerance + self.frame_len) as u64 > available_end {
                break;
            }

            let chosen = match self.previous {
                None => nominal.max(self.input_offset),
                Some(prev) => self.best_offset(nominal, prev + self.hop as u64),
            };
            self.overlap_add(chosen, output);

            self.previous = Some(chosen);
            self.analysis_pos += self.hop as f64 / self.stretch;

            let next_nominal = self.analysis_pos.round() as u64;
            let keep_from = next_nominal
                .saturating_sub(self.tolerance as u64)
                .min(chosen + self.hop as u64)
                .max(self.input_offset);
            let drop = (keep_from - self.input_offset) as usize;
            self.input.drain(..drop * CHANNELS);
            self.input_offset = keep_from;
        }
    }

    fn overlap_add(&mut self, start: u64, output: &mut Vec<f32>) {
        let base = (start - self.input_offset) as usize * CHANNELS;
        let hop = self.hop;

        output.reserve(hop * CHANNELS);
        for i in 0..hop {
            let w = self.window[i];
            for c in 0..CHANNELS {
                let idx = i * CHANNELS + c;
                output.push(self.overlap[idx] + self.input[base + idx] * w);
            }
        }
        for i in 0..hop {
            let w = self.window[hop + i];
            for c in 0..CHANNELS {
                let idx = i * CHANNELS + c;
                self.overlap[idx] = self.input[base + hop * CHANNELS + idx] * w;
            }
        }
    }

    /// Offset near `nominal` whose opening best matches the natural
    /// continuation at `natural`
    fn best_offset(&self, nominal: u64, natural: u64) -> u64 {
        let lo = nominal
            .saturating_sub(self.tolerance as u64)
            .max(self.input_offset);
        let hi = nominal + self.tolerance as u64;
        let natural_base = (natural - self.input_offset) as usize;

        let mut best = nominal.max(lo);
        let mut best_score = f32::NEG_INFINITY;
        for candidate in lo..=hi {
            let base = (candidate - self.input_offset) as usize;
            let mut score = 0.0f32;
            for i in (0..self.hop).step_by(CORRELATION_STRIDE) {
                let a = (natural_base + i) * CHANNELS;
                let b = (base + i) * CHANNELS;
                score += (self.input[a] + self.input[a + 1]) * (self.input[b] + self.input[b + 1]);
            }
            if score > best_score {
                best_score = score;
                best = candidate;
            }
        }
        best
    }
}

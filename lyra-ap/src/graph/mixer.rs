//! Mixer: sums voices through per-voice gain ramps and master volume

use crate::audio::{AudioFrame, CHANNELS};
use lyra_common::FadeCurve;

/// Per-voice gain, either steady or ramping along a fade curve
#[derive(Debug, Clone)]
pub struct GainRamp {
    current: f32,
    from: f32,
    target: f32,
    curve: FadeCurve,
    total_frames: usize,
    elapsed: usize,
}

impl GainRamp {
    pub fn fixed(gain: f32) -> Self {
        Self {
            current: gain,
            from: gain,
            target: gain,
            curve: FadeCurve::Linear,
            total_frames: 0,
            elapsed: 0,
        }
    }

    pub fn set(&mut self, gain: f32) {
        *self = Self::fixed(gain);
    }

    /// Ramp from the current gain to `target` over `frames` output frames
    pub fn ramp_to(&mut self, target: f32, frames: usize, curve: FadeCurve) {
        if frames == 0 {
            self.set(target);
            return;
        }
        self.from = self.current;
        self.target = target;
        self.curve = curve;
        self.total_frames = frames;
        self.elapsed = 0;
    }

    pub fn current(&self) -> f32 {
        self.current
    }

    pub fn is_ramping(&self) -> bool {
        self.elapsed < self.total_frames
    }

    /// Gain for the next frame
    pub fn advance(&mut self) -> f32 {
        if self.is_ramping() {
            self.elapsed += 1;
            let t = self.elapsed as f32 / self.total_frames as f32;
            self.current = self.curve.interpolate(self.from, self.target, t);
        }
        self.current
    }
}

#[derive(Debug, Clone)]
pub struct Mixer {
    gains: Vec<GainRamp>,
    master_volume: f32,
}

impl Mixer {
    pub fn new(voices: usize) -> Self {
        Self {
            gains: vec![GainRamp::fixed(1.0); voices],
            master_volume: 1.0,
        }
    }

    pub fn gain_mut(&mut self, voice: usize) -> Option<&mut GainRamp> {
        self.gains.get_mut(voice)
    }

    pub fn gain(&self, voice: usize) -> Option<&GainRamp> {
        self.gains.get(voice)
    }

    pub fn set_master_volume(&mut self, volume: f32) {
        self.master_volume = volume.clamp(0.0, 1.0);
    }

    pub fn master_volume(&self) -> f32 {
        self.master_volume
    }

    /// Mix interleaved voice buffers into `out`
    ///
    /// `inputs[i]` belongs to voice `i` and holds at least `out.len()`
    /// frames, or is `None` for an idle voice.
    pub fn mix(&mut self, inputs: &[Option<&[f32]>], out: &mut [AudioFrame]) {
        out.iter_mut().for_each(|f| *f = AudioFrame::zero());

        for (voice, input) in inputs.iter().enumerate() {
            let Some(gain) = self.gains.get_mut(voice) else {
                continue;
            };
            let Some(samples) = input else {
                continue;
            };
            for (frame, pair) in out.iter_mut().zip(samples.chunks_exact(CHANNELS)) {
                let g = gain.advance();
                frame.left += pair[0] * g;
                frame.right += pair[1] * g;
            }
        }

        for frame in out.iter_mut() {
            frame.apply_volume(self.master_volume);
            frame.clamp();
        }
    }
}

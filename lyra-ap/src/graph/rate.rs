//! Rate node: pitch-preserving speed change
//!
//! Runs at the output rate after the pitch node. At speed 1.0 audio passes
//! through untouched.

use super::stretch::Wsola;

pub struct RateNode {
    speed: f64,
    wsola: Wsola,
}

impl RateNode {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            speed: 1.0,
            wsola: Wsola::new(sample_rate),
        }
    }

    pub fn configure(&mut self, sample_rate: u32) {
        self.wsola = Wsola::new(sample_rate);
        self.wsola.set_stretch(1.0 / self.speed);
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn set_speed(&mut self, speed: f64) {
        let was_bypassed = self.wsola.is_identity();
        self.speed = speed;
        self.wsola.set_stretch(1.0 / speed);
        if was_bypassed && !self.wsola.is_identity() {
            self.wsola.reset();
        }
    }

    pub fn reset(&mut self) {
        self.wsola.reset();
    }

    pub fn process(&mut self, input: &[f32], output: &mut Vec<f32>) {
        if self.wsola.is_identity() {
            output.extend_from_slice(input);
        } else {
            self.wsola.process(input, output);
        }
    }
}

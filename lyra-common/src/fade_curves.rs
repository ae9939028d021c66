//! Fade curves for track-to-track crossfades
//!
//! A crossfade ramps the outgoing voice with `fade_out` and the incoming
//! voice with `fade_in`, both driven by the same normalized progress `t`.

use serde::{Deserialize, Serialize};
use std::f32::consts::{FRAC_PI_2, PI};
use std::str::FromStr;

/// Gain curve applied over the duration of a crossfade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum FadeCurve {
    /// v(t) = t
    Linear,

    /// v(t) = t², slow start
    Exponential,

    /// Fade-out (1-t)², fade-in √t; fast start
    Logarithmic,

    /// v(t) = 0.5 × (1 - cos(π t))
    SCurve,

    /// v(t) = sin(t × π/2); constant summed power across the fade
    #[default]
    EqualPower,
}

impl FadeCurve {
    /// Gain for the incoming voice at progress `t` (0.0 → 0.0, 1.0 → 1.0)
    pub fn fade_in(&self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);

        match self {
            FadeCurve::Linear => t,
            FadeCurve::Exponential => t * t,
            FadeCurve::Logarithmic => t.sqrt(),
            FadeCurve::SCurve => 0.5 * (1.0 - (PI * t).cos()),
            FadeCurve::EqualPower => (t * FRAC_PI_2).sin(),
        }
    }

    /// Gain for the outgoing voice at progress `t` (0.0 → 1.0, 1.0 → 0.0)
    pub fn fade_out(&self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);

        match self {
            FadeCurve::Linear => 1.0 - t,
            FadeCurve::Exponential | FadeCurve::Logarithmic => {
                let inv = 1.0 - t;
                inv * inv
            }
            FadeCurve::SCurve => 0.5 * (1.0 + (PI * t).cos()),
            FadeCurve::EqualPower => (t * FRAC_PI_2).cos(),
        }
    }

    /// Interpolate a gain ramp from `from` to `to` along this curve
    ///
    /// Rising ramps follow `fade_in`, falling ramps follow `fade_out`.
    pub fn interpolate(&self, from: f32, to: f32, t: f32) -> f32 {
        if to >= from {
            from + (to - from) * self.fade_in(t)
        } else {
            to + (from - to) * self.fade_out(t)
        }
    }

    /// Canonical lowercase name, accepted back by `FromStr`
    pub fn as_str(&self) -> &'static str {
        match self {
            FadeCurve::Linear => "linear",
            FadeCurve::Exponential => "exponential",
            FadeCurve::Logarithmic => "logarithmic",
            FadeCurve::SCurve => "s_curve",
            FadeCurve::EqualPower => "equal_power",
        }
    }

    pub fn all_variants() -> &'static [FadeCurve] {
        &[
            FadeCurve::Linear,
            FadeCurve::Exponential,
            FadeCurve::Logarithmic,
            FadeCurve::SCurve,
            FadeCurve::EqualPower,
        ]
    }
}

impl FromStr for FadeCurve {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "linear" => Ok(FadeCurve::Linear),
            "exponential" => Ok(FadeCurve::Exponential),
            "logarithmic" => Ok(FadeCurve::Logarithmic),
            "cosine" | "scurve" | "s-curve" | "s_curve" => Ok(FadeCurve::SCurve),
            "equal_power" | "equalpower" => Ok(FadeCurve::EqualPower),
            other => Err(crate::Error::InvalidInput(format!(
                "Unknown fade curve: {}",
                other
            ))),
        }
    }
}

impl std::fmt::Display for FadeCurve {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

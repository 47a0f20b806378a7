//! Fade-out curves for the end-of-message crossfade
//!
//! The outgoing spin's volume is ramped from 1.0 to 0.0 in discrete steps;
//! the curve maps normalized ramp progress to a volume multiplier.

use serde::{Deserialize, Serialize};
use std::f32::consts::{FRAC_PI_2, PI};

/// Fade-out curve applied to an outgoing spin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FadeCurve {
    /// v(t) = 1 - t
    #[default]
    Linear,

    /// v(t) = (1 - t)²
    /// Fast drop, long tail
    Logarithmic,

    /// v(t) = 0.5 × (1 + cos(π × t))
    SCurve,

    /// v(t) = cos(t × π/2)
    /// Holds perceived loudness longer before dropping
    EqualPower,
}

impl FadeCurve {
    /// Volume multiplier at `position` (0.0 = fade start, 1.0 = fade end)
    ///
    /// Returns 1.0 at the start of the fade and 0.0 at the end for every curve.
    pub fn calculate_fade_out(&self, position: f32) -> f32 {
        let t = position.clamp(0.0, 1.0);

        match self {
            FadeCurve::Linear => 1.0 - t,
            FadeCurve::Logarithmic => {
                let inv = 1.0 - t;
                inv * inv
            }
            FadeCurve::SCurve => 0.5 * (1.0 + (PI * t).cos()),
            FadeCurve::EqualPower => (t * FRAC_PI_2).cos().max(0.0),
        }
    }

    /// Parse a curve name from configuration
    ///
    /// Accepts `cosine` and `s-curve` spellings for [`FadeCurve::SCurve`].
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "linear" => Some(FadeCurve::Linear),
            "logarithmic" => Some(FadeCurve::Logarithmic),
            "cosine" | "scurve" | "s-curve" | "s_curve" => Some(FadeCurve::SCurve),
            "equal_power" | "equalpower" => Some(FadeCurve::EqualPower),
            _ => None,
        }
    }

    /// Get all available fade curve variants
    pub fn all_variants() -> &'static [FadeCurve] {
        &[
            FadeCurve::Linear,
            FadeCurve::Logarithmic,
            FadeCurve::SCurve,
            FadeCurve::EqualPower,
        ]
    }
}

impl std::fmt::Display for FadeCurve {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FadeCurve::Linear => "Linear",
            FadeCurve::Logarithmic => "Logarithmic",
            FadeCurve::SCurve => "S-Curve",
            FadeCurve::EqualPower => "Equal Power",
        };
        write!(f, "{}", name)
    }
}

//! Stepped fade-out ramp
//!
//! The outgoing item's volume drops from 1.0 to 0.0 in discrete steps, one
//! timer firing per step. The volume at each step comes from a [`FadeCurve`].

use std::time::Duration;

use playola_common::FadeCurve;

/// Fade steps per second of fade
pub const FADE_STEPS_PER_SECOND: u32 = 100;

/// Spacing between fade step timers
pub const FADE_STEP_INTERVAL: Duration = Duration::from_millis(10);

/// Default crossfade length
pub const DEFAULT_CROSSFADE: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fader {
    duration: Duration,
    curve: FadeCurve,
    total_steps: u32,
}

impl Fader {
    pub fn new(duration: Duration, curve: FadeCurve) -> Self {
        let total_steps = (duration.as_secs_f64() * FADE_STEPS_PER_SECOND as f64).round() as u32;
        Self {
            duration,
            curve,
            total_steps: total_steps.max(1),
        }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn curve(&self) -> FadeCurve {
        self.curve
    }

    pub fn total_steps(&self) -> u32 {
        self.total_steps
    }

    /// Volume after `step` steps (0 = full volume)
    pub fn volume_at(&self, step: u32) -> f32 {
        let position = step.min(self.total_steps) as f32 / self.total_steps as f32;
        self.curve.calculate_fade_out(position)
    }

    pub fn is_finished(&self, step: u32) -> bool {
        step >= self.total_steps
    }
}

impl Default for Fader {
    fn default() -> Self {
        Self::new(DEFAULT_CROSSFADE, FadeCurve::Linear)
    }
}

use log::warn;
use serde::{Deserialize, Serialize};

use crate::ease::EaseKind;

/// Upper bound for any single dilation effect, in seconds. Longer requests
/// are cut to this length with a warning.
pub const EFFECT_DURATION_MAX: f64 = 60.0;

/// Parameters of a hit-slow: ease in, hold at the center scale, ease out.
///
/// `center_weight` is carried for authored data but has no influence on
/// the scale curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct HitSlowParams {
    pub duration: f64,
    pub center_weight: f64,
    pub center_time_scale: f64,
    pub center_hold_duration: f64,
    pub ease: EaseKind,
}

impl Default for HitSlowParams {
    fn default() -> Self {
        Self {
            duration: 1.0,
            center_weight: 0.5,
            center_time_scale: 0.1,
            center_hold_duration: 0.2,
            ease: EaseKind::default(),
        }
    }
}

impl HitSlowParams {
    /// Clamp every field into its legal range. Non-finite values become zero.
    pub fn validate(&mut self) {
        self.duration = effect_duration(self.duration);
        self.center_weight = finite_or_zero(self.center_weight).clamp(0.0, 1.0);
        self.center_time_scale = finite_or_zero(self.center_time_scale).clamp(0.0, 1.0);
        self.center_hold_duration =
            finite_or_zero(self.center_hold_duration).clamp(0.0, self.duration);
    }

    /// Copy of `self` with [`validate`](Self::validate) applied.
    pub fn validated(mut self) -> Self {
        self.validate();
        self
    }

    /// Length of each of the in and out transitions.
    pub fn transition_duration(&self) -> f64 {
        ((self.duration - self.center_hold_duration) / 2.0).max(0.0)
    }

    /// Elapsed time at which the hold phase begins.
    pub fn center_start(&self) -> f64 {
        self.transition_duration()
    }

    /// Elapsed time at which the out transition begins.
    pub fn center_end(&self) -> f64 {
        self.transition_duration() + self.center_hold_duration
    }
}

/// A time dilation effect request, independent of how it is armed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum DilationEffect {
    /// Full freeze for `duration` seconds.
    Stop { duration: f64 },
    /// Eased slow-motion.
    Slow(HitSlowParams),
}

impl DilationEffect {
    pub fn duration(&self) -> f64 {
        match self {
            Self::Stop { duration } => *duration,
            Self::Slow(params) => params.duration,
        }
    }

    pub fn validated(self) -> Self {
        match self {
            Self::Stop { duration } => Self::Stop {
                duration: effect_duration(duration),
            },
            Self::Slow(params) => Self::Slow(params.validated()),
        }
    }
}

fn finite_or_zero(x: f64) -> f64 {
    if x.is_finite() { x } else { 0.0 }
}

fn effect_duration(x: f64) -> f64 {
    let x = finite_or_zero(x);
    if x > EFFECT_DURATION_MAX {
        warn!("Dilation duration {x}s capped at {EFFECT_DURATION_MAX}s");
    }
    x.clamp(0.0, EFFECT_DURATION_MAX)
}

// Shared data for the timing core: ease curves, dilation effect parameters,
// and the JSON timing configuration.

pub mod config;
pub mod ease;
pub mod effect;

pub use config::{
    BEAT_DIVISION_MAX, BEAT_DIVISION_MIN, BPM_MAX, BPM_MIN, DEFAULT_BEAT_DIVISION, DEFAULT_BPM,
    DilationPreset, HitSlowConfig, HitStopConfig, TimingConfig,
};
pub use ease::{EaseKind, lerp};
pub use effect::{DilationEffect, EFFECT_DURATION_MAX, HitSlowParams};

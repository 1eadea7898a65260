use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::ease::EaseKind;
use crate::effect::{DilationEffect, EFFECT_DURATION_MAX, HitSlowParams};

pub const BPM_MIN: f64 = 1.0;
pub const BPM_MAX: f64 = 999.0;
pub const DEFAULT_BPM: f64 = 120.0;
pub const BEAT_DIVISION_MIN: u32 = 1;
pub const BEAT_DIVISION_MAX: u32 = 64;
pub const DEFAULT_BEAT_DIVISION: u32 = 16;

/// Hit-stop defaults used when a caller does not pass explicit values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct HitStopConfig {
    pub duration: f64,
    pub quantize_on_beat: bool,
}

impl Default for HitStopConfig {
    fn default() -> Self {
        Self {
            duration: 0.08,
            quantize_on_beat: true,
        }
    }
}

/// Hit-slow defaults used when a caller does not pass explicit values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct HitSlowConfig {
    pub duration: f64,
    pub center_weight: f64,
    pub center_time_scale: f64,
    pub center_hold_duration: f64,
    pub ease: EaseKind,
    pub quantize_on_beat: bool,
}

impl Default for HitSlowConfig {
    fn default() -> Self {
        let params = HitSlowParams::default();
        Self {
            duration: params.duration,
            center_weight: params.center_weight,
            center_time_scale: params.center_time_scale,
            center_hold_duration: params.center_hold_duration,
            ease: params.ease,
            quantize_on_beat: true,
        }
    }
}

impl HitSlowConfig {
    pub fn params(&self) -> HitSlowParams {
        HitSlowParams {
            duration: self.duration,
            center_weight: self.center_weight,
            center_time_scale: self.center_time_scale,
            center_hold_duration: self.center_hold_duration,
            ease: self.ease,
        }
    }

    fn validate(&mut self) {
        let params = self.params().validated();
        self.duration = params.duration;
        self.center_weight = params.center_weight;
        self.center_time_scale = params.center_time_scale;
        self.center_hold_duration = params.center_hold_duration;
    }
}

/// A named, authored dilation effect.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DilationPreset {
    pub effect: DilationEffect,
    #[serde(default = "default_true")]
    pub quantize_on_beat: bool,
}

fn default_true() -> bool {
    true
}

/// Timing configuration (timing.json).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct TimingConfig {
    pub bpm: f64,
    /// Subdivisions per measure used by `quantize` when none is given.
    pub default_beat_division: u32,
    /// Subdivisions per measure used to arm beat-aligned dilation effects.
    pub dilation_beat_division: u32,
    pub hit_stop: HitStopConfig,
    pub hit_slow: HitSlowConfig,
    pub presets: BTreeMap<String, DilationPreset>,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            bpm: DEFAULT_BPM,
            default_beat_division: DEFAULT_BEAT_DIVISION,
            dilation_beat_division: DEFAULT_BEAT_DIVISION,
            hit_stop: HitStopConfig::default(),
            hit_slow: HitSlowConfig::default(),
            presets: BTreeMap::new(),
        }
    }
}

impl TimingConfig {
    pub fn validate(&mut self) {
        if !self.bpm.is_finite() {
            log::warn!("Non-finite bpm in timing config, using {DEFAULT_BPM}");
            self.bpm = DEFAULT_BPM;
        }
        self.bpm = self.bpm.clamp(BPM_MIN, BPM_MAX);
        self.default_beat_division = self
            .default_beat_division
            .clamp(BEAT_DIVISION_MIN, BEAT_DIVISION_MAX);
        self.dilation_beat_division = self
            .dilation_beat_division
            .clamp(BEAT_DIVISION_MIN, BEAT_DIVISION_MAX);
        self.hit_stop.duration = if self.hit_stop.duration.is_finite() {
            self.hit_stop.duration.clamp(0.0, EFFECT_DURATION_MAX)
        } else {
            0.0
        };
        self.hit_slow.validate();
        for preset in self.presets.values_mut() {
            preset.effect = preset.effect.validated();
        }
    }

    /// Look up a preset by name.
    pub fn preset(&self, name: &str) -> Option<&DilationPreset> {
        self.presets.get(name)
    }

    /// Read config from a JSON file.
    pub fn read(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading timing config {}", path.display()))?;
        let mut config: TimingConfig = serde_json::from_str(&data)
            .with_context(|| format!("parsing timing config {}", path.display()))?;
        config.validate();
        Ok(config)
    }

    /// Write config to a JSON file.
    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("writing timing config {}", path.display()))?;
        Ok(())
    }
}

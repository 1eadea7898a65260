// Cue scripts: timed session commands replayed by the simulator.

use std::path::Path;

use anyhow::{Context, Result, bail};
use cadenza_timing::TimingSession;
use cadenza_types::HitSlowParams;
use log::debug;
use serde::{Deserialize, Serialize};

/// One command of a cue script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum CueAction {
    /// Trigger a named preset from the timing config.
    Preset { name: String },
    /// Hit-stop; missing fields use the config defaults.
    HitStop {
        #[serde(default)]
        duration: Option<f64>,
        #[serde(default)]
        quantize_on_beat: Option<bool>,
    },
    /// Hit-slow; missing fields use the config defaults.
    HitSlow {
        #[serde(default)]
        params: Option<HitSlowParams>,
        #[serde(default)]
        quantize_on_beat: Option<bool>,
    },
    /// Emit `marker` on the next grid line.
    Quantize {
        marker: String,
        #[serde(default)]
        beat_division: Option<u32>,
        #[serde(default)]
        offset: f64,
    },
    /// Emit `marker` after `beats` beats.
    QuantizeBeats {
        marker: String,
        beats: f64,
        #[serde(default)]
        offset: f64,
    },
    ForceStop,
    Tempo { bpm: f64 },
}

/// A command and the host time, in seconds, at which it is issued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cue {
    pub at: f64,
    #[serde(flatten)]
    pub action: CueAction,
}

/// Cues ordered by issue time. Cues sharing a time keep their file order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CueScript {
    cues: Vec<Cue>,
}

impl CueScript {
    pub fn new(mut cues: Vec<Cue>) -> Result<Self> {
        if let Some(bad) = cues.iter().find(|c| !c.at.is_finite() || c.at < 0.0) {
            bail!("cue time must be a non-negative number, got {}", bad.at);
        }
        cues.sort_by(|a, b| a.at.total_cmp(&b.at));
        Ok(Self { cues })
    }

    pub fn parse(json: &str) -> Result<Self> {
        let cues: Vec<Cue> = serde_json::from_str(json).context("parsing cue script")?;
        Self::new(cues)
    }

    pub fn read(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading cue script {}", path.display()))?;
        Self::parse(&data).with_context(|| format!("loading cue script {}", path.display()))
    }

    pub fn cues(&self) -> &[Cue] {
        &self.cues
    }

    pub fn len(&self) -> usize {
        self.cues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cues.is_empty()
    }
}

impl CueAction {
    /// Issues the command against `session`. `emit` builds the callback for
    /// marker cues.
    pub fn apply<F, C>(&self, session: &mut TimingSession, emit: F)
    where
        F: FnOnce(String) -> C,
        C: FnOnce() + 'static,
    {
        debug!("Cue {self:?}");
        match self {
            Self::Preset { name } => {
                session.apply_preset(name);
            }
            Self::HitStop {
                duration,
                quantize_on_beat,
            } => {
                let defaults = session.config().hit_stop;
                session.hit_stop(
                    duration.unwrap_or(defaults.duration),
                    quantize_on_beat.unwrap_or(defaults.quantize_on_beat),
                );
            }
            Self::HitSlow {
                params,
                quantize_on_beat,
            } => {
                let defaults = session.config().hit_slow;
                session.hit_slow(
                    params.unwrap_or_else(|| defaults.params()),
                    quantize_on_beat.unwrap_or(defaults.quantize_on_beat),
                );
            }
            Self::Quantize {
                marker,
                beat_division,
                offset,
            } => {
                session.quantize(
                    emit(marker.clone()),
                    *beat_division,
                    *offset,
                    Some(marker.as_str()),
                );
            }
            Self::QuantizeBeats {
                marker,
                beats,
                offset,
            } => {
                session.quantize_action(
                    *beats,
                    emit(marker.clone()),
                    *offset,
                    Some(marker.as_str()),
                );
            }
            Self::ForceStop => session.force_stop(),
            Self::Tempo { bpm } => session.set_tempo(*bpm),
        }
    }
}

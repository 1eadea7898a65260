// BeatClock: converts monotonic/audio time into beat-relative time.
//
// Music playback position is authoritative whenever the attached source is
// actively playing; the monotonic clock offset by the start reference covers
// the rest (before playback begins, or while the source stalls).

use std::fmt;
use std::rc::Rc;

use cadenza_types::DEFAULT_BPM;
use log::{debug, info, warn};

use crate::audio_source::AudioTimeSource;
use crate::time_provider::{SystemTimeProvider, TimeProvider};

/// Beats per measure. The grid is fixed to 4/4.
pub const BEATS_PER_MEASURE: f64 = 4.0;

/// Which clock `current_time` is reading from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeSourceKind {
    Stopped,
    Monotonic,
    Audio,
}

impl fmt::Display for TimeSourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => write!(f, "stopped"),
            Self::Monotonic => write!(f, "monotonic"),
            Self::Audio => write!(f, "audio"),
        }
    }
}

/// Global musical clock for one running session.
pub struct BeatClock {
    tempo: f64,
    running: bool,
    reference_start_us: i64,
    source: Option<Rc<dyn AudioTimeSource>>,
    time: Box<dyn TimeProvider>,
    session: u64,
}

impl BeatClock {
    /// Creates a stopped clock reading monotonic time from `time`.
    pub fn new(tempo: f64, time: Box<dyn TimeProvider>) -> Self {
        let tempo = if is_valid_tempo(tempo) {
            tempo
        } else {
            warn!("Invalid tempo {tempo}, using {DEFAULT_BPM}");
            DEFAULT_BPM
        };
        Self {
            tempo,
            running: false,
            reference_start_us: 0,
            source: None,
            time,
            session: 0,
        }
    }

    /// Creates a stopped clock backed by the system monotonic clock.
    pub fn with_system_time(tempo: f64) -> Self {
        Self::new(tempo, Box::new(SystemTimeProvider::new()))
    }

    pub fn tempo(&self) -> f64 {
        self.tempo
    }

    /// Changes the tempo. Zero, negative and non-finite values are ignored.
    ///
    /// Already scheduled actions keep the time computed at registration.
    pub fn set_tempo(&mut self, bpm: f64) {
        if !is_valid_tempo(bpm) {
            warn!("Ignoring invalid tempo {bpm}");
            return;
        }
        if bpm != self.tempo {
            debug!(
                "Tempo {} -> {} at t={:.4}",
                self.tempo,
                bpm,
                self.current_time()
            );
            self.tempo = bpm;
        }
    }

    /// Seconds per beat.
    pub fn beat_duration(&self) -> f64 {
        60.0 / self.tempo
    }

    /// Seconds per 4/4 measure.
    pub fn measure_duration(&self) -> f64 {
        BEATS_PER_MEASURE * self.beat_duration()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Identifier of the current run. Incremented by every `start`.
    pub fn session(&self) -> u64 {
        self.session
    }

    /// Starts a fresh run, optionally following an audio playback source.
    ///
    /// Calling `start` while already running restarts from zero.
    pub fn start(&mut self, source: Option<Rc<dyn AudioTimeSource>>) {
        self.reference_start_us = self.time.now_us();
        self.source = source;
        self.running = true;
        self.session += 1;
        info!(
            "Beat clock started (session {}, {} bpm, audio source: {})",
            self.session,
            self.tempo,
            self.source.is_some()
        );
    }

    /// Stops the clock and detaches the audio source.
    pub fn stop(&mut self) {
        if self.running {
            info!("Beat clock stopped (session {})", self.session);
        }
        self.running = false;
        self.source = None;
    }

    /// Which clock the current time is read from.
    pub fn time_source_kind(&self) -> TimeSourceKind {
        if !self.running {
            TimeSourceKind::Stopped
        } else if self
            .source
            .as_ref()
            .is_some_and(|s| s.is_actively_playing())
        {
            TimeSourceKind::Audio
        } else {
            TimeSourceKind::Monotonic
        }
    }

    /// Current clock time in seconds. Returns 0 when not running.
    pub fn current_time(&self) -> f64 {
        match self.time_source_kind() {
            TimeSourceKind::Stopped => 0.0,
            TimeSourceKind::Audio => self
                .source
                .as_ref()
                .map_or(0.0, |s| s.playback_position_seconds()),
            TimeSourceKind::Monotonic => {
                (self.time.now_us() - self.reference_start_us) as f64 / 1_000_000.0
            }
        }
    }

    /// Current position in beats.
    pub fn current_beat(&self) -> f64 {
        self.current_time() / self.beat_duration()
    }

    /// Current position in measures.
    pub fn current_measure(&self) -> f64 {
        self.current_time() / self.measure_duration()
    }

    /// Fractional position within the current beat, in [0, 1).
    pub fn beat_phase(&self) -> f64 {
        self.current_beat().rem_euclid(1.0)
    }

    /// Next grid line of a `beat_division`-per-measure grid strictly after
    /// the current time.
    ///
    /// # Panics
    ///
    /// Panics if `beat_division` is zero.
    pub fn next_subdivision_time(&self, beat_division: u32) -> f64 {
        assert!(beat_division > 0, "beat division must be positive");
        let division_duration = self.beat_duration() * BEATS_PER_MEASURE / beat_division as f64;
        next_multiple_after(self.current_time(), division_duration)
    }

    /// Start of the next measure strictly after the current time.
    pub fn next_measure_time(&self) -> f64 {
        next_multiple_after(self.current_time(), self.measure_duration())
    }
}

fn is_valid_tempo(bpm: f64) -> bool {
    bpm.is_finite() && bpm > 0.0
}

/// Smallest multiple of `step` strictly greater than `now`.
fn next_multiple_after(now: f64, step: f64) -> f64 {
    let next = ((now / step).floor() + 1.0) * step;
    if next > now { next } else { next + step }
}

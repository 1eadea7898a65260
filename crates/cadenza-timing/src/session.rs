// TimingSession: owns the clock, the scheduler and the dilation composer
// for one host, and drives them from a single per-frame tick.

use std::fmt;
use std::rc::Rc;

use cadenza_types::{DilationEffect, HitSlowParams, TimingConfig};
use log::{info, warn};

use crate::audio_source::AudioTimeSource;
use crate::beat_clock::BeatClock;
use crate::dilation::TimeDilationComposer;
use crate::listener::TimeScaleListener;
use crate::scheduler::{ActionHandle, ActionStatus, BeatTimer, PendingInfo, QuantizedScheduler};
use crate::time_provider::{SystemTimeProvider, TimeProvider};

/// Work item stored in the session scheduler.
pub enum SessionAction {
    Callback(Box<dyn FnOnce()>),
    /// Beat-armed dilation effect, started when it fires.
    Dilation(DilationEffect),
}

impl From<DilationEffect> for SessionAction {
    fn from(effect: DilationEffect) -> Self {
        Self::Dilation(effect)
    }
}

impl fmt::Debug for SessionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Callback(_) => f.write_str("Callback"),
            Self::Dilation(effect) => f.debug_tuple("Dilation").field(effect).finish(),
        }
    }
}

pub struct TimingSession {
    clock: BeatClock,
    scheduler: QuantizedScheduler<SessionAction>,
    dilation: TimeDilationComposer,
    config: TimingConfig,
}

impl TimingSession {
    /// Builds a stopped session. The config is validated on a private copy.
    pub fn from_config(config: &TimingConfig, time: Box<dyn TimeProvider>) -> Self {
        let mut config = config.clone();
        config.validate();
        Self {
            clock: BeatClock::new(config.bpm, time),
            scheduler: QuantizedScheduler::new(),
            dilation: TimeDilationComposer::with_beat_division(config.dilation_beat_division),
            config,
        }
    }

    pub fn with_system_time(config: &TimingConfig) -> Self {
        Self::from_config(config, Box::new(SystemTimeProvider::new()))
    }

    pub fn clock(&self) -> &BeatClock {
        &self.clock
    }

    pub fn dilation(&self) -> &TimeDilationComposer {
        &self.dilation
    }

    pub fn config(&self) -> &TimingConfig {
        &self.config
    }

    /// Starts a fresh clock session. Anything still pending is dropped,
    /// including a beat-armed dilation effect. A running effect continues.
    pub fn start(&mut self, source: Option<Rc<dyn AudioTimeSource>>) {
        self.scheduler.stop();
        self.dilation.disarm();
        self.clock.start(source);
    }

    /// Stops the clock, drops pending actions and ends any dilation effect.
    pub fn stop(&mut self) {
        self.clock.stop();
        self.scheduler.stop();
        self.dilation.force_stop();
    }

    pub fn set_tempo(&mut self, bpm: f64) {
        self.clock.set_tempo(bpm);
    }

    /// Runs `handler` on the next grid line plus `offset_seconds`.
    /// `None` uses the configured default beat division.
    pub fn quantize<F>(
        &mut self,
        handler: F,
        beat_division: Option<u32>,
        offset_seconds: f64,
        description: Option<&str>,
    ) -> Option<ActionHandle>
    where
        F: FnOnce() + 'static,
    {
        let division = beat_division.unwrap_or(self.config.default_beat_division);
        self.scheduler.quantize(
            &self.clock,
            SessionAction::Callback(Box::new(handler)),
            division,
            offset_seconds,
            description,
        )
    }

    /// Runs `handler` `beat_count` beats plus `offset_seconds` from now.
    pub fn quantize_action<F>(
        &mut self,
        beat_count: f64,
        handler: F,
        offset_seconds: f64,
        description: Option<&str>,
    ) -> Option<ActionHandle>
    where
        F: FnOnce() + 'static,
    {
        self.scheduler.quantize_action(
            &self.clock,
            beat_count,
            SessionAction::Callback(Box::new(handler)),
            offset_seconds,
            description,
        )
    }

    pub fn quantize_timer(&self, beat_count: f64, offset_seconds: f64) -> Option<BeatTimer> {
        self.scheduler
            .quantize_timer(&self.clock, beat_count, offset_seconds)
    }

    pub fn cancel(&mut self, handle: ActionHandle) -> bool {
        self.scheduler.cancel(handle)
    }

    pub fn status(&self, handle: ActionHandle) -> Option<ActionStatus> {
        self.scheduler.status(handle)
    }

    pub fn pending_count(&self) -> usize {
        self.scheduler.pending_count()
    }

    pub fn pending_snapshot(&self) -> Vec<PendingInfo> {
        self.scheduler.pending_snapshot()
    }

    pub fn hit_stop(&mut self, duration: f64, quantize_on_beat: bool) {
        self.dilation
            .hit_stop(duration, quantize_on_beat, &mut self.scheduler, &self.clock);
    }

    /// Hit-stop with the configured duration and arming.
    pub fn hit_stop_default(&mut self) {
        let cfg = self.config.hit_stop;
        self.hit_stop(cfg.duration, cfg.quantize_on_beat);
    }

    pub fn hit_slow(&mut self, params: HitSlowParams, quantize_on_beat: bool) {
        self.dilation
            .hit_slow(params, quantize_on_beat, &mut self.scheduler, &self.clock);
    }

    /// Hit-slow with the configured parameters and arming.
    pub fn hit_slow_default(&mut self) {
        let cfg = self.config.hit_slow;
        self.hit_slow(cfg.params(), cfg.quantize_on_beat);
    }

    /// Triggers the named preset. Returns false for unknown names.
    pub fn apply_preset(&mut self, name: &str) -> bool {
        let Some(preset) = self.config.preset(name).copied() else {
            warn!("Unknown dilation preset '{name}'");
            return false;
        };
        info!("Applying dilation preset '{name}'");
        self.dilation.request(
            preset.effect,
            preset.quantize_on_beat,
            &mut self.scheduler,
            &self.clock,
        );
        true
    }

    pub fn force_stop(&mut self) {
        self.dilation.force_stop();
    }

    pub fn register_listener(&self, listener: Rc<dyn TimeScaleListener>) -> bool {
        self.dilation.register(listener)
    }

    pub fn unregister_listener<L: ?Sized>(&self, listener: &Rc<L>) -> bool {
        self.dilation.unregister(listener)
    }

    /// Advances one frame: releases due actions in insertion order, then
    /// ticks the composer by `delta_time`. Returns the broadcast scale.
    pub fn tick(&mut self, delta_time: f64) -> f64 {
        for fired in self.scheduler.pump(&self.clock) {
            match fired.action {
                SessionAction::Callback(handler) => handler(),
                SessionAction::Dilation(effect) => {
                    self.dilation.fire_armed(fired.handle, effect);
                }
            }
        }
        // The pump drops stale entries without firing them.
        if let Some(handle) = self.dilation.armed_handle()
            && self.scheduler.status(handle) != Some(ActionStatus::Pending)
        {
            self.dilation.disarm();
        }
        self.dilation.tick(delta_time)
    }
}

// TimeDilationComposer: hit-stop / hit-slow state machine.
//
// Idle --hit_stop--> Freeze --remaining <= 0--> Idle
// Idle --hit_slow--> Slow(In) -> Slow(Loop) -> Slow(Out) --remaining <= 0--> Idle
// any --force_stop--> Idle
//
// Beat-aligned effects are armed through the quantized scheduler and only
// start once the armed action fires.

use std::fmt;
use std::rc::Rc;

use cadenza_types::{DEFAULT_BEAT_DIVISION, DilationEffect, HitSlowParams, lerp};
use log::{debug, warn};

use crate::beat_clock::BeatClock;
use crate::listener::{ListenerRegistry, TimeScaleListener};
use crate::scheduler::{ActionHandle, QuantizedScheduler};

/// Remaining time at or below this counts as elapsed.
const TIME_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DilationMode {
    #[default]
    Idle,
    Freeze,
    Slow,
}

/// Phase of a hit-slow. `None` outside of `DilationMode::Slow`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlowPhase {
    #[default]
    None,
    In,
    Loop,
    Out,
}

impl fmt::Display for DilationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Freeze => write!(f, "freeze"),
            Self::Slow => write!(f, "slow"),
        }
    }
}

/// Point-in-time view of the composer for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DilationSnapshot {
    pub mode: DilationMode,
    pub slow_phase: SlowPhase,
    pub remaining_time: f64,
    pub elapsed_slow_time: f64,
    pub scale: f64,
    pub center_weight: f64,
    pub armed: bool,
}

pub struct TimeDilationComposer {
    mode: DilationMode,
    slow_phase: SlowPhase,
    remaining_time: f64,
    elapsed_slow_time: f64,
    slow: HitSlowParams,
    current_scale: f64,
    armed: Option<ActionHandle>,
    beat_division: u32,
    listeners: Rc<ListenerRegistry>,
}

impl TimeDilationComposer {
    pub fn new() -> Self {
        Self::with_beat_division(DEFAULT_BEAT_DIVISION)
    }

    /// Composer whose beat-aligned effects snap to a `beat_division`-per-measure grid.
    pub fn with_beat_division(beat_division: u32) -> Self {
        Self {
            mode: DilationMode::Idle,
            slow_phase: SlowPhase::None,
            remaining_time: 0.0,
            elapsed_slow_time: 0.0,
            slow: HitSlowParams::default(),
            current_scale: 1.0,
            armed: None,
            beat_division: beat_division.max(1),
            listeners: Rc::new(ListenerRegistry::new()),
        }
    }

    pub fn mode(&self) -> DilationMode {
        self.mode
    }

    pub fn slow_phase(&self) -> SlowPhase {
        self.slow_phase
    }

    pub fn remaining_time(&self) -> f64 {
        self.remaining_time
    }

    /// Last scale computed by `tick` or `force_stop`.
    pub fn current_scale(&self) -> f64 {
        self.current_scale
    }

    /// Parameters of the current (or last) hit-slow.
    pub fn slow_params(&self) -> &HitSlowParams {
        &self.slow
    }

    pub fn is_active(&self) -> bool {
        self.mode != DilationMode::Idle
    }

    /// True while a beat-aligned effect waits for its grid line.
    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// Scheduler slot of the effect waiting for its grid line, if any.
    pub fn armed_handle(&self) -> Option<ActionHandle> {
        self.armed
    }

    /// Forgets a waiting effect without touching the active one or the
    /// listeners. Returns true if something was armed.
    pub fn disarm(&mut self) -> bool {
        let was_armed = self.armed.take().is_some();
        if was_armed {
            debug!("Dilation effect disarmed");
        }
        was_armed
    }

    pub fn beat_division(&self) -> u32 {
        self.beat_division
    }

    pub fn snapshot(&self) -> DilationSnapshot {
        DilationSnapshot {
            mode: self.mode,
            slow_phase: self.slow_phase,
            remaining_time: self.remaining_time,
            elapsed_slow_time: self.elapsed_slow_time,
            scale: self.current_scale,
            center_weight: self.slow.center_weight,
            armed: self.armed.is_some(),
        }
    }

    /// Shared handle to the listener registry, for listeners that need to
    /// unregister themselves from inside a notification.
    pub fn listeners(&self) -> Rc<ListenerRegistry> {
        Rc::clone(&self.listeners)
    }

    pub fn register(&self, listener: Rc<dyn TimeScaleListener>) -> bool {
        self.listeners.register(listener)
    }

    pub fn unregister<L: ?Sized>(&self, listener: &Rc<L>) -> bool {
        self.listeners.unregister(listener)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Freezes time for `duration` seconds.
    ///
    /// With `quantize_on_beat` the freeze starts on the next grid line; the
    /// scale stays untouched until then. If the scheduler declines (clock
    /// stopped) the freeze starts immediately.
    pub fn hit_stop<A: From<DilationEffect>>(
        &mut self,
        duration: f64,
        quantize_on_beat: bool,
        scheduler: &mut QuantizedScheduler<A>,
        clock: &BeatClock,
    ) {
        self.request(
            DilationEffect::Stop { duration },
            quantize_on_beat,
            scheduler,
            clock,
        );
    }

    /// Starts an eased slow-motion effect. Arming follows `hit_stop`.
    pub fn hit_slow<A: From<DilationEffect>>(
        &mut self,
        params: HitSlowParams,
        quantize_on_beat: bool,
        scheduler: &mut QuantizedScheduler<A>,
        clock: &BeatClock,
    ) {
        self.request(
            DilationEffect::Slow(params),
            quantize_on_beat,
            scheduler,
            clock,
        );
    }

    /// Starts or arms `effect`. A newer request always replaces an armed one.
    pub fn request<A: From<DilationEffect>>(
        &mut self,
        effect: DilationEffect,
        quantize_on_beat: bool,
        scheduler: &mut QuantizedScheduler<A>,
        clock: &BeatClock,
    ) {
        let effect = effect.validated();
        if effect.duration() <= 0.0 {
            warn!("Ignoring dilation effect with non-positive duration: {effect:?}");
            return;
        }

        if let Some(previous) = self.armed.take() {
            scheduler.cancel(previous);
            debug!("Replaced armed dilation effect");
        }

        if quantize_on_beat {
            let label = match effect {
                DilationEffect::Stop { .. } => "hit-stop",
                DilationEffect::Slow(_) => "hit-slow",
            };
            let action = A::from(effect);
            if let Some(handle) =
                scheduler.quantize(clock, action, self.beat_division, 0.0, Some(label))
            {
                self.armed = Some(handle);
                return;
            }
            debug!("Beat arming unavailable, starting {label} immediately");
        }
        self.begin(effect);
    }

    /// Starts an armed effect whose scheduler action fired. Returns false
    /// when the arming was superseded or cancelled by `force_stop`.
    pub fn fire_armed(&mut self, handle: ActionHandle, effect: DilationEffect) -> bool {
        if self.armed != Some(handle) {
            debug!("Ignoring superseded dilation arming");
            return false;
        }
        self.armed = None;
        self.begin(effect.validated());
        true
    }

    /// Starts `effect` now, replacing any active effect.
    pub fn begin(&mut self, effect: DilationEffect) {
        match effect {
            DilationEffect::Stop { duration } => {
                if duration <= 0.0 {
                    return;
                }
                self.mode = DilationMode::Freeze;
                self.slow_phase = SlowPhase::None;
                self.remaining_time = duration;
                self.elapsed_slow_time = 0.0;
                debug!("Hit-stop for {duration:.3}s");
            }
            DilationEffect::Slow(params) => {
                if params.duration <= 0.0 {
                    return;
                }
                self.mode = DilationMode::Slow;
                self.slow_phase = SlowPhase::In;
                self.remaining_time = params.duration;
                self.elapsed_slow_time = 0.0;
                self.slow = params;
                debug!(
                    "Hit-slow for {:.3}s (center {:.3}, hold {:.3}, {:?})",
                    params.duration,
                    params.center_time_scale,
                    params.center_hold_duration,
                    params.ease
                );
            }
        }
    }

    /// Advances the effect by `delta_time` seconds and broadcasts the
    /// resulting scale. Returns the scale.
    pub fn tick(&mut self, delta_time: f64) -> f64 {
        let dt = if delta_time.is_finite() {
            delta_time.max(0.0)
        } else {
            0.0
        };

        let scale = match self.mode {
            DilationMode::Idle => 1.0,
            DilationMode::Freeze => {
                self.remaining_time -= dt;
                if self.remaining_time <= TIME_EPSILON {
                    self.reset_idle();
                    1.0
                } else {
                    0.0
                }
            }
            DilationMode::Slow => {
                self.elapsed_slow_time += dt;
                self.remaining_time -= dt;
                if self.remaining_time <= TIME_EPSILON {
                    self.reset_idle();
                    1.0
                } else {
                    self.slow_scale()
                }
            }
        };

        self.current_scale = scale;
        self.listeners.broadcast(scale);
        scale
    }

    /// Cancels any active or armed effect and broadcasts scale 1.
    pub fn force_stop(&mut self) {
        if self.is_active() || self.armed.is_some() {
            debug!("Force stop from {}", self.mode);
        }
        self.armed = None;
        self.reset_idle();
        self.current_scale = 1.0;
        self.listeners.broadcast(1.0);
    }

    fn reset_idle(&mut self) {
        if self.mode != DilationMode::Idle {
            debug!("Dilation {} -> idle", self.mode);
        }
        self.mode = DilationMode::Idle;
        self.slow_phase = SlowPhase::None;
        self.remaining_time = 0.0;
        self.elapsed_slow_time = 0.0;
    }

    fn slow_scale(&mut self) -> f64 {
        let elapsed = self.elapsed_slow_time;
        let transition = self.slow.transition_duration();
        let center_start = self.slow.center_start();
        let center_end = self.slow.center_end();
        let center = self.slow.center_time_scale;

        let (phase, scale) = if elapsed < center_start {
            let t = if transition > 0.0 {
                elapsed / transition
            } else {
                1.0
            };
            (SlowPhase::In, lerp(1.0, center, self.slow.ease.apply(t)))
        } else if elapsed < center_end {
            (SlowPhase::Loop, center)
        } else {
            let t = if transition > 0.0 {
                (elapsed - center_end) / transition
            } else {
                1.0
            };
            (SlowPhase::Out, lerp(center, 1.0, self.slow.ease.apply(t)))
        };

        if phase != self.slow_phase {
            debug!("Hit-slow phase {:?} -> {:?} at {:.3}s", self.slow_phase, phase, elapsed);
            self.slow_phase = phase;
        }
        scale
    }
}

impl Default for TimeDilationComposer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time_provider::ManualTimeProvider;
    use cadenza_types::EaseKind;
    use std::cell::RefCell;

    fn slow_params(duration: f64, hold: f64, center: f64) -> HitSlowParams {
        HitSlowParams {
            duration,
            center_weight: 0.5,
            center_time_scale: center,
            center_hold_duration: hold,
            ease: EaseKind::Linear,
        }
    }

    fn stopped_parts() -> (BeatClock, QuantizedScheduler<DilationEffect>) {
        let tp = Rc::new(ManualTimeProvider::new());
        (
            BeatClock::new(120.0, Box::new(tp)),
            QuantizedScheduler::new(),
        )
    }

    #[derive(Default)]
    struct Recorder {
        calls: RefCell<Vec<f64>>,
    }

    impl TimeScaleListener for Recorder {
        fn on_time_scale_changed(&self, scale: f64) {
            self.calls.borrow_mut().push(scale);
        }
    }

    #[test]
    fn idle_reports_one() {
        let mut c = TimeDilationComposer::new();
        assert_eq!(c.tick(0.016), 1.0);
        assert_eq!(c.mode(), DilationMode::Idle);
        assert_eq!(c.slow_phase(), SlowPhase::None);
    }

    #[test]
    fn hit_stop_freezes_until_duration_elapses() {
        let mut c = TimeDilationComposer::new();
        c.begin(DilationEffect::Stop { duration: 0.5 });
        let mut elapsed = 0.0;
        while elapsed + 0.05 < 0.5 - 1e-9 {
            assert_eq!(c.tick(0.05), 0.0, "at {elapsed}");
            elapsed += 0.05;
        }
        // Tick that reaches 0.5 cumulative.
        assert_eq!(c.tick(0.05), 1.0);
        assert_eq!(c.mode(), DilationMode::Idle);
        assert_eq!(c.tick(0.05), 1.0);
    }

    #[test]
    fn hit_slow_curve_matches_phases() {
        let mut c = TimeDilationComposer::new();
        c.begin(DilationEffect::Slow(slow_params(1.0, 0.2, 0.1)));

        assert!((c.tick(0.0) - 1.0).abs() < 1e-9);
        assert_eq!(c.slow_phase(), SlowPhase::In);

        // Halfway through the 0.4s in-transition.
        assert!((c.tick(0.2) - 0.55).abs() < 1e-9);

        // Mid-hold.
        assert!((c.tick(0.3) - 0.1).abs() < 1e-9);
        assert_eq!(c.slow_phase(), SlowPhase::Loop);

        // Halfway through the out-transition (elapsed 0.8).
        assert!((c.tick(0.3) - 0.55).abs() < 1e-9);
        assert_eq!(c.slow_phase(), SlowPhase::Out);

        // End: clamped to idle.
        assert_eq!(c.tick(0.2), 1.0);
        assert_eq!(c.mode(), DilationMode::Idle);
        assert_eq!(c.slow_phase(), SlowPhase::None);
    }

    #[test]
    fn zero_center_scale_is_full_freeze_in_hold() {
        let mut c = TimeDilationComposer::new();
        c.begin(DilationEffect::Slow(slow_params(1.0, 0.4, 0.0)));
        c.tick(0.5);
        assert_eq!(c.current_scale(), 0.0);
        assert_eq!(c.mode(), DilationMode::Slow);
    }

    #[test]
    fn hold_equal_to_duration_skips_transitions() {
        let mut c = TimeDilationComposer::new();
        c.begin(DilationEffect::Slow(slow_params(0.5, 0.5, 0.25)));
        assert_eq!(c.tick(0.0), 0.25);
        assert_eq!(c.slow_phase(), SlowPhase::Loop);
        assert_eq!(c.tick(0.25), 0.25);
        assert_eq!(c.tick(0.25), 1.0);
    }

    #[test]
    fn center_weight_is_stored_but_inert() {
        let mut light = TimeDilationComposer::new();
        let mut heavy = TimeDilationComposer::new();
        let mut p = slow_params(1.0, 0.2, 0.1);
        p.center_weight = 0.0;
        light.begin(DilationEffect::Slow(p));
        p.center_weight = 1.0;
        heavy.begin(DilationEffect::Slow(p));
        for _ in 0..10 {
            assert_eq!(light.tick(0.07), heavy.tick(0.07));
        }
        assert_eq!(heavy.snapshot().center_weight, 1.0);
    }

    #[test]
    fn newer_effect_overwrites_active_one() {
        let mut c = TimeDilationComposer::new();
        c.begin(DilationEffect::Stop { duration: 0.5 });
        c.tick(0.1);
        c.begin(DilationEffect::Slow(slow_params(1.0, 0.2, 0.1)));
        assert_eq!(c.mode(), DilationMode::Slow);
        assert!((c.remaining_time() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn force_stop_returns_to_idle_and_broadcasts() {
        let mut c = TimeDilationComposer::new();
        let rec = Rc::new(Recorder::default());
        c.register(rec.clone());

        c.begin(DilationEffect::Slow(slow_params(1.0, 0.2, 0.1)));
        c.tick(0.5);
        c.force_stop();
        assert_eq!(c.mode(), DilationMode::Idle);
        assert_eq!(*rec.calls.borrow().last().unwrap(), 1.0);

        c.tick(0.1);
        assert_eq!(c.slow_phase(), SlowPhase::None);
        assert_eq!(*rec.calls.borrow(), vec![0.1, 1.0, 1.0]);
    }

    #[test]
    fn non_positive_duration_is_ignored() {
        let (clock, mut sched) = stopped_parts();
        let mut c = TimeDilationComposer::new();
        c.hit_stop(0.0, false, &mut sched, &clock);
        c.hit_slow(slow_params(-1.0, 0.0, 0.1), false, &mut sched, &clock);
        assert!(!c.is_active());
    }

    #[test]
    fn quantized_request_without_running_clock_starts_now() {
        let (clock, mut sched) = stopped_parts();
        let mut c = TimeDilationComposer::new();
        c.hit_stop(0.2, true, &mut sched, &clock);
        assert_eq!(c.mode(), DilationMode::Freeze);
        assert!(!c.is_armed());
        assert!(sched.is_empty());
    }

    #[test]
    fn quantized_request_waits_for_grid() {
        let tp = Rc::new(ManualTimeProvider::new());
        let mut clock = BeatClock::new(120.0, Box::new(Rc::clone(&tp)));
        clock.start(None);
        let mut sched: QuantizedScheduler<DilationEffect> = QuantizedScheduler::new();
        let mut c = TimeDilationComposer::with_beat_division(4);

        tp.advance(100_000);
        c.hit_stop(0.2, true, &mut sched, &clock);
        assert!(c.is_armed());
        assert_eq!(c.mode(), DilationMode::Idle);
        assert_eq!(c.tick(0.1), 1.0);

        tp.advance(400_000);
        for fired in sched.pump(&clock) {
            assert!(c.fire_armed(fired.handle, fired.action));
        }
        assert_eq!(c.mode(), DilationMode::Freeze);
        assert_eq!(c.tick(0.1), 0.0);
    }

    #[test]
    fn disarm_keeps_active_effect_and_listeners_quiet() {
        let tp = Rc::new(ManualTimeProvider::new());
        let mut clock = BeatClock::new(120.0, Box::new(Rc::clone(&tp)));
        clock.start(None);
        let mut sched: QuantizedScheduler<DilationEffect> = QuantizedScheduler::new();
        let mut c = TimeDilationComposer::new();
        let rec = Rc::new(Recorder::default());
        c.register(rec.clone());

        c.begin(DilationEffect::Stop { duration: 1.0 });
        c.hit_slow(slow_params(1.0, 0.2, 0.1), true, &mut sched, &clock);
        let handle = c.armed_handle().unwrap();

        assert!(c.disarm());
        assert!(!c.disarm());
        assert!(!c.is_armed());
        assert!(!c.snapshot().armed);
        assert_eq!(c.mode(), DilationMode::Freeze);
        assert!(rec.calls.borrow().is_empty());
        assert!(!c.fire_armed(handle, DilationEffect::Slow(slow_params(1.0, 0.2, 0.1))));
    }

    #[test]
    fn force_stop_disarms_pending_effect() {
        let tp = Rc::new(ManualTimeProvider::new());
        let mut clock = BeatClock::new(120.0, Box::new(Rc::clone(&tp)));
        clock.start(None);
        let mut sched: QuantizedScheduler<DilationEffect> = QuantizedScheduler::new();
        let mut c = TimeDilationComposer::new();

        c.hit_slow(slow_params(1.0, 0.2, 0.1), true, &mut sched, &clock);
        c.force_stop();
        tp.advance(1_000_000);
        for fired in sched.pump(&clock) {
            assert!(!c.fire_armed(fired.handle, fired.action));
        }
        assert!(!c.is_active());
    }

    #[test]
    fn rearming_cancels_previous_arming() {
        let tp = Rc::new(ManualTimeProvider::new());
        let mut clock = BeatClock::new(120.0, Box::new(Rc::clone(&tp)));
        clock.start(None);
        let mut sched: QuantizedScheduler<DilationEffect> = QuantizedScheduler::new();
        let mut c = TimeDilationComposer::new();

        c.hit_stop(0.3, true, &mut sched, &clock);
        c.hit_slow(slow_params(1.0, 0.2, 0.1), true, &mut sched, &clock);
        assert_eq!(sched.pending_count(), 1);

        tp.advance(1_000_000);
        let fired = sched.pump(&clock);
        assert_eq!(fired.len(), 1);
        let f = fired.into_iter().next().unwrap();
        assert!(c.fire_armed(f.handle, f.action));
        assert_eq!(c.mode(), DilationMode::Slow);
    }

    #[test]
    fn immediate_request_supersedes_armed_one() {
        let tp = Rc::new(ManualTimeProvider::new());
        let mut clock = BeatClock::new(120.0, Box::new(Rc::clone(&tp)));
        clock.start(None);
        let mut sched: QuantizedScheduler<DilationEffect> = QuantizedScheduler::new();
        let mut c = TimeDilationComposer::new();

        c.hit_slow(slow_params(1.0, 0.2, 0.1), true, &mut sched, &clock);
        c.hit_stop(0.3, false, &mut sched, &clock);
        assert!(!c.is_armed());
        assert!(sched.is_empty());
        assert_eq!(c.mode(), DilationMode::Freeze);
    }

    #[test]
    fn negative_and_nan_delta_are_ignored() {
        let mut c = TimeDilationComposer::new();
        c.begin(DilationEffect::Stop { duration: 0.5 });
        c.tick(-1.0);
        c.tick(f64::NAN);
        assert!((c.remaining_time() - 0.5).abs() < 1e-12);
        assert_eq!(c.current_scale(), 0.0);
    }

    #[test]
    fn registered_then_unregistered_listener_hears_nothing() {
        let mut c = TimeDilationComposer::new();
        let rec = Rc::new(Recorder::default());
        c.register(rec.clone());
        c.unregister(&rec);
        c.begin(DilationEffect::Stop { duration: 0.1 });
        c.tick(0.05);
        c.tick(0.05);
        c.force_stop();
        assert!(rec.calls.borrow().is_empty());
        assert_eq!(c.listener_count(), 0);
    }
}

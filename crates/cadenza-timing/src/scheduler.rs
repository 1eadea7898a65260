// QuantizedScheduler: defers actions to the beat grid.
//
// Pending actions live in an index-addressable slot arena. Each slot is a
// small state machine (Pending -> Fired | Cancelled) polled by `pump` once
// per tick; nothing ever runs inside the call that registered it.

use log::{debug, warn};

use crate::beat_clock::BeatClock;

/// Addresses one slot of the scheduler arena.
///
/// Handles go stale once their slot is recycled for a later action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActionHandle {
    index: u32,
    generation: u32,
}

/// Lifecycle of a scheduled action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionStatus {
    Pending,
    Fired,
    Cancelled,
}

struct PendingAction<A> {
    beat_division: u32,
    offset_seconds: f64,
    scheduled_time: f64,
    description: Option<String>,
    session: u64,
    seq: u64,
    action: A,
}

enum SlotState<A> {
    Pending(PendingAction<A>),
    Fired,
    Cancelled,
}

struct Slot<A> {
    generation: u32,
    state: SlotState<A>,
}

/// Read-only view of a pending action, for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingInfo {
    pub handle: ActionHandle,
    /// Subdivisions per measure; 0 for actions scheduled by beat count.
    pub beat_division: u32,
    pub offset_seconds: f64,
    pub scheduled_time: f64,
    pub description: Option<String>,
}

/// An action whose wake time has elapsed, released by [`QuantizedScheduler::pump`].
#[derive(Debug)]
pub struct FiredAction<A> {
    pub handle: ActionHandle,
    pub scheduled_time: f64,
    pub description: Option<String>,
    pub action: A,
}

/// Fire-and-forget wait of a fixed musical length, polled against the clock.
///
/// Bound to the clock session it was created in: after a stop or restart it
/// never becomes ready.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeatTimer {
    wake_time: f64,
    session: u64,
}

impl BeatTimer {
    /// Clock time at which the timer becomes ready.
    pub fn wake_time(&self) -> f64 {
        self.wake_time
    }

    pub fn is_ready(&self, clock: &BeatClock) -> bool {
        self.is_live(clock) && clock.current_time() >= self.wake_time
    }

    /// Seconds left until ready, never negative. Infinite once the session
    /// that created the timer is over.
    pub fn remaining(&self, clock: &BeatClock) -> f64 {
        if !self.is_live(clock) {
            return f64::INFINITY;
        }
        (self.wake_time - clock.current_time()).max(0.0)
    }

    fn is_live(&self, clock: &BeatClock) -> bool {
        clock.is_running() && clock.session() == self.session
    }
}

/// Holds actions until a beat-grid time and releases them in insertion order.
pub struct QuantizedScheduler<A> {
    slots: Vec<Slot<A>>,
    free: Vec<u32>,
    next_seq: u64,
    pending: usize,
}

impl<A> QuantizedScheduler<A> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            next_seq: 0,
            pending: 0,
        }
    }

    /// Schedules `action` on the next line of a `beat_division`-per-measure
    /// grid, plus `offset_seconds`.
    ///
    /// Returns `None` without scheduling when the clock is not running,
    /// `beat_division` is zero, or the offset is not finite.
    pub fn quantize(
        &mut self,
        clock: &BeatClock,
        action: A,
        beat_division: u32,
        offset_seconds: f64,
        description: Option<&str>,
    ) -> Option<ActionHandle> {
        if !clock.is_running() {
            debug!("quantize declined: clock not running ({description:?})");
            return None;
        }
        if beat_division == 0 {
            warn!("quantize declined: beat division must be positive ({description:?})");
            return None;
        }
        if !offset_seconds.is_finite() {
            warn!("quantize declined: non-finite offset ({description:?})");
            return None;
        }
        let scheduled_time = clock.next_subdivision_time(beat_division) + offset_seconds;
        Some(self.insert(
            clock,
            action,
            beat_division,
            offset_seconds,
            scheduled_time,
            description,
        ))
    }

    /// Schedules `action` `beat_count` beats from now, plus `offset_seconds`,
    /// without snapping to the grid.
    pub fn quantize_action(
        &mut self,
        clock: &BeatClock,
        beat_count: f64,
        action: A,
        offset_seconds: f64,
        description: Option<&str>,
    ) -> Option<ActionHandle> {
        if !clock.is_running() {
            debug!("quantize_action declined: clock not running ({description:?})");
            return None;
        }
        if !beat_count.is_finite() || !offset_seconds.is_finite() {
            warn!("quantize_action declined: non-finite beat count or offset ({description:?})");
            return None;
        }
        let scheduled_time =
            clock.current_time() + beat_count * clock.beat_duration() + offset_seconds;
        Some(self.insert(clock, action, 0, offset_seconds, scheduled_time, description))
    }

    /// Returns a timer that becomes ready `beat_count` beats plus
    /// `offset_seconds` from now. The timer is not tracked by the scheduler.
    /// Declined while the clock is stopped.
    pub fn quantize_timer(
        &self,
        clock: &BeatClock,
        beat_count: f64,
        offset_seconds: f64,
    ) -> Option<BeatTimer> {
        if !clock.is_running() {
            debug!("quantize_timer declined: clock not running");
            return None;
        }
        if !beat_count.is_finite() || !offset_seconds.is_finite() {
            warn!("quantize_timer declined: non-finite beat count or offset");
            return None;
        }
        Some(BeatTimer {
            wake_time: clock.current_time() + beat_count * clock.beat_duration() + offset_seconds,
            session: clock.session(),
        })
    }

    fn insert(
        &mut self,
        clock: &BeatClock,
        action: A,
        beat_division: u32,
        offset_seconds: f64,
        scheduled_time: f64,
        description: Option<&str>,
    ) -> ActionHandle {
        let seq = self.next_seq;
        self.next_seq += 1;
        let pending = PendingAction {
            beat_division,
            offset_seconds,
            scheduled_time,
            description: description.map(str::to_owned),
            session: clock.session(),
            seq,
            action,
        };

        let handle = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.generation = slot.generation.wrapping_add(1);
                slot.state = SlotState::Pending(pending);
                ActionHandle {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    state: SlotState::Pending(pending),
                });
                ActionHandle {
                    index,
                    generation: 0,
                }
            }
        };
        self.pending += 1;
        debug!(
            "Scheduled {:?} for t={:.4} (now {:.4}, division {}, {} pending)",
            description,
            scheduled_time,
            clock.current_time(),
            beat_division,
            self.pending
        );
        handle
    }

    /// Releases every action whose wake time has elapsed, in insertion order.
    ///
    /// Actions from a previous clock session, or any action while the clock
    /// is stopped, are dropped instead of released.
    pub fn pump(&mut self, clock: &BeatClock) -> Vec<FiredAction<A>> {
        if self.pending == 0 {
            return Vec::new();
        }
        let running = clock.is_running();
        let session = clock.session();
        let now = clock.current_time();

        let mut due: Vec<(u64, usize)> = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| match &slot.state {
                SlotState::Pending(p)
                    if !running || p.session != session || p.scheduled_time <= now =>
                {
                    Some((p.seq, i))
                }
                _ => None,
            })
            .collect();
        due.sort_unstable_by_key(|&(seq, _)| seq);

        let mut fired = Vec::with_capacity(due.len());
        for (_, index) in due {
            let slot = &mut self.slots[index];
            let live = matches!(
                &slot.state,
                SlotState::Pending(p) if running && p.session == session
            );
            let next = if live {
                SlotState::Fired
            } else {
                SlotState::Cancelled
            };
            let SlotState::Pending(p) = std::mem::replace(&mut slot.state, next) else {
                continue;
            };
            let handle = ActionHandle {
                index: index as u32,
                generation: slot.generation,
            };
            self.free.push(index as u32);
            self.pending -= 1;
            if live {
                debug!(
                    "Firing {:?} scheduled for t={:.4} at t={:.4}",
                    p.description, p.scheduled_time, now
                );
                fired.push(FiredAction {
                    handle,
                    scheduled_time: p.scheduled_time,
                    description: p.description,
                    action: p.action,
                });
            } else {
                debug!("Dropping stale action {:?}", p.description);
            }
        }
        fired
    }

    /// Cancels a pending action. Returns false for fired, cancelled or
    /// stale handles.
    pub fn cancel(&mut self, handle: ActionHandle) -> bool {
        let Some(slot) = self.slots.get_mut(handle.index as usize) else {
            return false;
        };
        if slot.generation != handle.generation || !matches!(slot.state, SlotState::Pending(_)) {
            return false;
        }
        if let SlotState::Pending(p) = std::mem::replace(&mut slot.state, SlotState::Cancelled) {
            debug!("Cancelled {:?}", p.description);
        }
        self.free.push(handle.index);
        self.pending -= 1;
        true
    }

    /// Status of the action behind `handle`, or `None` once its slot has
    /// been reused.
    pub fn status(&self, handle: ActionHandle) -> Option<ActionStatus> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        Some(match slot.state {
            SlotState::Pending(_) => ActionStatus::Pending,
            SlotState::Fired => ActionStatus::Fired,
            SlotState::Cancelled => ActionStatus::Cancelled,
        })
    }

    /// Drops every pending action without firing it.
    pub fn stop(&mut self) {
        if self.pending > 0 {
            debug!("Scheduler stop: dropping {} pending actions", self.pending);
        }
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if matches!(slot.state, SlotState::Pending(_)) {
                slot.state = SlotState::Cancelled;
                self.free.push(index as u32);
            }
        }
        self.pending = 0;
    }

    /// Number of pending actions. Diagnostics only.
    pub fn pending_count(&self) -> usize {
        self.pending
    }

    pub fn is_empty(&self) -> bool {
        self.pending == 0
    }

    /// Pending actions in insertion order. Diagnostics only: the order is
    /// not the firing order.
    pub fn pending_snapshot(&self) -> Vec<PendingInfo> {
        let mut entries: Vec<(u64, PendingInfo)> = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| match &slot.state {
                SlotState::Pending(p) => Some((
                    p.seq,
                    PendingInfo {
                        handle: ActionHandle {
                            index: i as u32,
                            generation: slot.generation,
                        },
                        beat_division: p.beat_division,
                        offset_seconds: p.offset_seconds,
                        scheduled_time: p.scheduled_time,
                        description: p.description.clone(),
                    },
                )),
                _ => None,
            })
            .collect();
        entries.sort_unstable_by_key(|(seq, _)| *seq);
        entries.into_iter().map(|(_, info)| info).collect()
    }

    /// Earliest wake time among pending actions.
    pub fn next_wake_time(&self) -> Option<f64> {
        self.slots
            .iter()
            .filter_map(|slot| match &slot.state {
                SlotState::Pending(p) => Some(p.scheduled_time),
                _ => None,
            })
            .min_by(f64::total_cmp)
    }
}

impl<A> Default for QuantizedScheduler<A> {
    fn default() -> Self {
        Self::new()
    }
}

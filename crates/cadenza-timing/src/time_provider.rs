use std::cell::Cell;
use std::rc::Rc;
use std::time::Instant;

/// Abstraction over monotonic time sources.
/// Implementations: SystemTimeProvider (production), ManualTimeProvider (tests, offline hosts).
pub trait TimeProvider {
    /// Current time in microseconds from an arbitrary epoch. Never decreases.
    fn now_us(&self) -> i64;

    /// Current time in seconds from the same epoch.
    fn now_secs(&self) -> f64 {
        self.now_us() as f64 / 1_000_000.0
    }
}

impl<T: TimeProvider + ?Sized> TimeProvider for Rc<T> {
    fn now_us(&self) -> i64 {
        (**self).now_us()
    }
}

/// System time provider using std::time::Instant.
pub struct SystemTimeProvider {
    start: Instant,
}

impl SystemTimeProvider {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemTimeProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeProvider for SystemTimeProvider {
    fn now_us(&self) -> i64 {
        self.start.elapsed().as_micros() as i64
    }
}

/// Manually advanced time provider.
///
/// Share it through an `Rc` so the host can advance time while a clock
/// reads it.
#[derive(Debug, Default)]
pub struct ManualTimeProvider {
    current_us: Cell<i64>,
}

impl ManualTimeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_time(&self, us: i64) {
        self.current_us.set(us);
    }

    pub fn advance(&self, delta_us: i64) {
        self.current_us.set(self.current_us.get() + delta_us.max(0));
    }

    pub fn advance_secs(&self, delta: f64) {
        self.advance((delta * 1_000_000.0).round() as i64);
    }
}

impl TimeProvider for ManualTimeProvider {
    fn now_us(&self) -> i64 {
        self.current_us.get()
    }
}

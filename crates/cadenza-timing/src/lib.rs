// Beat clock, quantized scheduler and hit-stop / hit-slow time dilation

pub mod audio_source;
pub mod beat_clock;
pub mod dilation;
pub mod listener;
pub mod scheduler;
pub mod session;
pub mod time_provider;

pub use audio_source::{AudioTimeSource, ManualAudioSource};
pub use beat_clock::{BEATS_PER_MEASURE, BeatClock, TimeSourceKind};
pub use dilation::{DilationMode, DilationSnapshot, SlowPhase, TimeDilationComposer};
pub use listener::{ListenerRegistry, TimeScaleListener};
pub use scheduler::{
    ActionHandle, ActionStatus, BeatTimer, FiredAction, PendingInfo, QuantizedScheduler,
};
pub use session::{SessionAction, TimingSession};
pub use time_provider::{ManualTimeProvider, SystemTimeProvider, TimeProvider};

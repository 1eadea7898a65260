use std::cell::Cell;

/// Playback position provider polled by the beat clock.
///
/// The clock never pushes into the source; it only asks whether playback is
/// live and where it is.
pub trait AudioTimeSource {
    fn is_actively_playing(&self) -> bool;

    /// Playback position of the music track, in seconds.
    fn playback_position_seconds(&self) -> f64;
}

/// Audio source driven by hand, for tests and offline simulation.
#[derive(Debug, Default)]
pub struct ManualAudioSource {
    playing: Cell<bool>,
    position: Cell<f64>,
}

impl ManualAudioSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_playing(&self, playing: bool) {
        self.playing.set(playing);
    }

    pub fn set_position(&self, seconds: f64) {
        self.position.set(seconds);
    }

    /// Advance the playback position when playing. Paused sources hold.
    pub fn advance(&self, delta: f64) {
        if self.playing.get() {
            self.position.set(self.position.get() + delta);
        }
    }
}

impl AudioTimeSource for ManualAudioSource {
    fn is_actively_playing(&self) -> bool {
        self.playing.get()
    }

    fn playback_position_seconds(&self) -> f64 {
        self.position.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paused_source_does_not_advance() {
        let src = ManualAudioSource::new();
        src.advance(1.0);
        assert_eq!(src.playback_position_seconds(), 0.0);

        src.set_playing(true);
        src.advance(0.25);
        assert!(src.is_actively_playing());
        assert_eq!(src.playback_position_seconds(), 0.25);
    }
}

// Offline frame loop: a simulated track, a manual clock and a cue script
// driving one TimingSession, one JSON line per frame.

use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

use anyhow::{Context, Result, ensure};
use cadenza_timing::{
    AudioTimeSource, ManualAudioSource, ManualTimeProvider, TimeScaleListener, TimingSession,
};
use cadenza_types::TimingConfig;
use log::info;
use serde::Serialize;

use crate::script::CueScript;

/// Host timing of one simulation run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimOptions {
    pub fps: f64,
    pub seconds: f64,
    /// Host time before the track starts playing.
    pub lead_in: f64,
}

impl SimOptions {
    fn check(&self) -> Result<()> {
        ensure!(
            self.fps.is_finite() && self.fps > 0.0,
            "fps must be positive, got {}",
            self.fps
        );
        ensure!(
            self.seconds.is_finite() && self.seconds >= 0.0,
            "seconds must be non-negative, got {}",
            self.seconds
        );
        ensure!(
            self.lead_in.is_finite() && self.lead_in >= 0.0,
            "lead-in must be non-negative, got {}",
            self.lead_in
        );
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    pub frame: u64,
    /// Host time in seconds.
    pub time: f64,
    /// Beat clock time in seconds.
    pub clock_time: f64,
    pub beat: f64,
    pub source: String,
    pub scale: f64,
    pub mode: String,
    /// Game time accumulated through the scale.
    pub scaled_time: f64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fired: Vec<String>,
}

/// Counts scale broadcasts, to show the listener path in the summary log.
#[derive(Default)]
struct BroadcastCounter {
    count: RefCell<u64>,
}

impl TimeScaleListener for BroadcastCounter {
    fn on_time_scale_changed(&self, _scale: f64) {
        *self.count.borrow_mut() += 1;
    }
}

/// Runs the simulation and writes one JSON line per frame to `out`.
/// Returns the number of frames written.
pub fn run<W: Write>(
    config: &TimingConfig,
    script: &CueScript,
    options: SimOptions,
    out: &mut W,
) -> Result<u64> {
    options.check()?;

    let time = Rc::new(ManualTimeProvider::new());
    let track = Rc::new(ManualAudioSource::new());
    let mut session = TimingSession::from_config(config, Box::new(Rc::clone(&time)));
    let counter = Rc::new(BroadcastCounter::default());
    session.register_listener(counter.clone());

    let fired: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
    let dt = 1.0 / options.fps;
    let frame_us = (dt * 1_000_000.0).round() as i64;
    let frames = (options.seconds * options.fps).round() as u64;

    session.start(Some(track.clone() as Rc<dyn AudioTimeSource>));
    info!(
        "Simulating {frames} frames at {} fps, {} cues, lead-in {:.3}s",
        options.fps,
        script.len(),
        options.lead_in
    );

    let mut cues = script.cues().iter().peekable();
    let mut scaled_time = 0.0;
    for frame in 0..frames {
        let host_time = frame as f64 * dt;

        if !track.is_actively_playing() && host_time >= options.lead_in {
            // Hand over to the track without a jump in clock time.
            track.set_position(session.clock().current_time());
            track.set_playing(true);
            info!("Track playing at host time {host_time:.3}s");
        }

        while let Some(cue) = cues.next_if(|c| c.at <= host_time + 1e-9) {
            let sink = Rc::clone(&fired);
            cue.action.apply(&mut session, move |marker| {
                move || sink.borrow_mut().push(marker)
            });
        }

        let scale = session.tick(dt);
        scaled_time += dt * scale;

        let clock = session.clock();
        let record = Frame {
            frame,
            time: host_time,
            clock_time: clock.current_time(),
            beat: clock.current_beat(),
            source: clock.time_source_kind().to_string(),
            scale,
            mode: session.dilation().mode().to_string(),
            scaled_time,
            fired: std::mem::take(&mut *fired.borrow_mut()),
        };
        serde_json::to_writer(&mut *out, &record).context("writing frame")?;
        writeln!(out).context("writing frame")?;

        time.advance(frame_us);
        track.advance(frame_us as f64 / 1_000_000.0);
    }

    session.stop();
    info!(
        "Simulation done: {frames} frames, {} scale broadcasts, {:.3}s scaled time",
        counter.count.borrow(),
        scaled_time
    );
    Ok(frames)
}

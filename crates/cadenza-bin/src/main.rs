// cadenza-sim: headless driver for a beat-synchronized timing session.
//
// Replays a cue script against a simulated music track and prints one JSON
// line per frame (time, beat, scale, mode, fired markers).

mod script;
mod sim;

use std::io::{BufWriter, Write};
use std::path::PathBuf;

use anyhow::Result;
use cadenza_types::TimingConfig;
use clap::Parser;
use log::info;

use script::CueScript;
use sim::SimOptions;

#[derive(Parser, Debug)]
#[command(
    name = "cadenza-sim",
    about = "Simulate beat-quantized actions and hit-stop / hit-slow effects"
)]
struct Args {
    /// Path to timing config JSON file.
    #[arg(long, default_value = "timing.json")]
    config: PathBuf,

    /// Path to a cue script JSON file.
    #[arg(long)]
    script: Option<PathBuf>,

    /// Tempo override.
    #[arg(long)]
    bpm: Option<f64>,

    /// Simulated frames per second.
    #[arg(long, default_value_t = 60.0)]
    fps: f64,

    /// Simulated length in seconds.
    #[arg(long, default_value_t = 8.0)]
    seconds: f64,

    /// Seconds before the simulated track starts playing.
    #[arg(long, default_value_t = 0.5)]
    lead_in: f64,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    info!("cadenza-sim starting");

    // Load config from file, falling back to defaults if not found
    let mut config = if args.config.exists() {
        let c = TimingConfig::read(&args.config)?;
        info!("Loaded timing config {}", args.config.display());
        c
    } else {
        info!(
            "Timing config {} not found, using defaults",
            args.config.display()
        );
        TimingConfig::default()
    };
    if let Some(bpm) = args.bpm {
        config.bpm = bpm;
        config.validate();
    }

    let script = match &args.script {
        Some(path) => CueScript::read(path)?,
        None => CueScript::default(),
    };

    let options = SimOptions {
        fps: args.fps,
        seconds: args.seconds,
        lead_in: args.lead_in,
    };

    let stdout = std::io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    sim::run(&config, &script, options, &mut out)?;
    out.flush()?;
    Ok(())
}

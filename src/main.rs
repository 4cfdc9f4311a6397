//! loopgrid CLI: offline demo render and live duplex looping.
//!
//! Usage:
//!   loopgrid demo --wav demo.wav
//!   loopgrid --config loopgrid.toml live

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use lg_master::{frames_to_wav, Controller, Frame, GridState, LoopgridConfig};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::{fs, io};

#[derive(Parser, Debug)]
#[command(name = "loopgrid")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Bar-synchronised clip looper", long_about = None)]
struct Args {
    /// TOML session config
    #[arg(short, long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Override the configured tempo
    #[arg(long, global = true)]
    bpm: Option<f32>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Record a synthetic tone into clip 0/0 and loop it, offline
    Demo {
        /// Bars of input to record
        #[arg(long, default_value_t = 2)]
        bars: usize,

        /// Bars of playback to render after the take
        #[arg(long, default_value_t = 4)]
        loops: usize,

        /// Write the mixdown here
        #[arg(long, value_name = "FILE")]
        wav: Option<PathBuf>,
    },
    /// Run against the default audio devices, reading commands from stdin
    Live,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => LoopgridConfig::load(path)?,
        None => LoopgridConfig::default(),
    };
    if let Some(bpm) = args.bpm {
        config.engine.bpm = bpm;
    }
    log::info!(
        "{}x{} grid at {} Hz, {} BPM",
        config.tracks,
        config.scenes,
        config.engine.sample_rate,
        config.engine.bpm
    );

    match args.command {
        Commands::Demo { bars, loops, wav } => demo(config, bars, loops, wav),
        Commands::Live => live(config),
    }
}

fn demo(config: LoopgridConfig, bars: usize, loops: usize, wav: Option<PathBuf>) -> Result<()> {
    if bars == 0 {
        bail!("need at least one bar to record");
    }
    let sample_rate = config.engine.sample_rate;
    let mut ctrl = Controller::new(config);
    let mut mix = Vec::new();

    ctrl.queue_record(0, 0)?;
    let lead_in = ctrl.frames_until_bar().unwrap_or(0);
    mix.extend(ctrl.render_silence(lead_in)?);
    print_status(&ctrl, 0, 0)?;

    let bar_frames = ctrl.frames_until_bar().unwrap_or(0);
    let input = tone(bars * bar_frames, sample_rate, 220.0);
    let (take, last_bar) = input.split_at((bars - 1) * bar_frames);
    mix.extend(ctrl.render_offline(take)?);
    // play lands on the closing bar line and commits the take
    ctrl.queue_play(0, 0)?;
    mix.extend(ctrl.render_offline(last_bar)?);
    print_status(&ctrl, 0, 0)?;

    mix.extend(ctrl.render_silence(loops * bar_frames)?);
    print_status(&ctrl, 0, 0)?;
    if ctrl.dropped_frames() > 0 {
        log::warn!("{} input frames dropped", ctrl.dropped_frames());
    }

    if let Some(path) = wav {
        let bytes = frames_to_wav(&mix, sample_rate);
        fs::write(&path, &bytes).with_context(|| format!("writing {}", path.display()))?;
        println!("Wrote {} frames to {}", mix.len(), path.display());
    }
    Ok(())
}

/// Decaying sine bursts, one per beat-ish, as stand-in input.
fn tone(frames: usize, sample_rate: u32, freq: f32) -> Vec<Frame> {
    let rate = sample_rate as f32;
    let burst = (rate / 2.0) as usize;
    (0..frames)
        .map(|i| {
            let t = i as f32 / rate;
            let env = 1.0 - (i % burst.max(1)) as f32 / burst.max(1) as f32;
            Frame::mono(0.5 * env * (std::f32::consts::TAU * freq * t).sin())
        })
        .collect()
}

fn print_status(ctrl: &Controller, track: usize, scene: usize) -> Result<()> {
    let status = ctrl.clip_status(track, scene)?;
    println!(
        "clip {}/{}: {:<12} beats {:>3}  length {:>8}  buffer {:>8}/{:<8}",
        track,
        scene,
        status.state,
        status.beats,
        status.length,
        status.buffer_length,
        status.audio_buffer_size
    );
    if let Some(pos) = ctrl.position() {
        let beats_per_bar = ctrl.config().engine.beats_per_bar;
        println!(
            "  at bar {} beat {}",
            pos.bar(beats_per_bar) + 1,
            pos.beat_in_bar(beats_per_bar) + 1
        );
    }
    Ok(())
}

fn live(config: LoopgridConfig) -> Result<()> {
    let mut ctrl = Controller::new(config);
    ctrl.start_live().context("starting audio")?;
    println!("Commands: play|stop|record|reset|save T S, beats T S N, bpm X, status, quit");

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let words: Vec<&str> = line.split_whitespace().collect();
        if words.first() == Some(&"quit") {
            break;
        }
        if let Err(e) = run_command(&mut ctrl, &words) {
            println!("error: {:#}", e);
        }
        for snapshot in ctrl.take_snapshots() {
            println!(
                "saved clip {}/{}: {} frames, {} beats",
                snapshot.track, snapshot.scene, snapshot.length, snapshot.beats
            );
        }
        let _ = io::stdout().flush();
    }

    ctrl.stop_live();
    println!("Done.");
    Ok(())
}

fn run_command(ctrl: &mut Controller, words: &[&str]) -> Result<()> {
    let cell = || -> Result<(usize, usize)> {
        let track = words.get(1).context("missing track")?.parse()?;
        let scene = words.get(2).context("missing scene")?.parse()?;
        Ok((track, scene))
    };
    match words.first().copied() {
        None => {}
        Some("play") => {
            let (t, s) = cell()?;
            ctrl.queue_play(t, s)?;
        }
        Some("stop") => {
            let (t, s) = cell()?;
            ctrl.queue_stop(t, s)?;
        }
        Some("record") => {
            let (t, s) = cell()?;
            ctrl.queue_record(t, s)?;
        }
        Some("reset") => {
            let (t, s) = cell()?;
            ctrl.reset(t, s)?;
        }
        Some("save") => {
            let (t, s) = cell()?;
            ctrl.save(t, s)?;
        }
        Some("beats") => {
            let (t, s) = cell()?;
            let beats = words.get(3).context("missing beat count")?.parse()?;
            ctrl.set_beats(t, s, beats)?;
        }
        Some("bpm") => {
            let bpm = words.get(1).context("missing tempo")?.parse()?;
            ctrl.set_bpm(bpm);
        }
        Some("status") => {
            for track in 0..ctrl.tracks() {
                for scene in 0..ctrl.scenes() {
                    if ctrl.state(track, scene)? != GridState::Empty {
                        print_status(ctrl, track, scene)?;
                    }
                }
            }
        }
        Some(other) => bail!("unknown command '{}'", other),
    }
    Ok(())
}

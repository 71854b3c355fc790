// Copyright 2026 the Turnstile Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Simulated stadium operations map driving the turnstile engine.
//!
//! Starts three entity streams (crowd flow, patrols and shuttles), registers
//! a culled facilities layer, and runs a frame loop against a console layer
//! sink. Render cost is simulated so the adaptive controller has something to
//! react to: a load spike in the middle of the run pushes frame times over
//! budget, and the engine steps quality down, then recovers once the spike
//! passes.
//!
//! ```text
//! RUST_LOG=info cargo run -p ops_demo -- --frames 900 --trace-json ops.json
//! ```

mod scene;
mod sinks;

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::Parser;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use serde::Deserialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use turnstile_backend_posix::{FramePacer, ProcMemoryProbe, now};
use turnstile_core::animation::LoopMode;
use turnstile_core::engine::{Engine, EngineConfig};
use turnstile_core::error::TaskError;
use turnstile_core::registry::TaskKind;
use turnstile_core::time::{Duration, HostTime};
use turnstile_core::timing::FrameFeedback;
use turnstile_core::trace::Tracer;
use turnstile_debug::chrome::ChromeTraceSink;
use turnstile_debug::pretty::PrettyPrintSink;

use crate::sinks::{ConsoleSink, Fanout};

const FACILITY_COUNT: usize = 5_000;

#[derive(Debug, Parser)]
#[command(about = "Drive the turnstile engine with a simulated stadium")]
struct Args {
    /// Frames to run.
    #[arg(long, default_value_t = 600)]
    frames: u64,

    /// Display refresh rate the pacer ticks at.
    #[arg(long, default_value_t = 60)]
    fps: u32,

    /// Sleep between frames instead of advancing a synthetic clock.
    #[arg(long)]
    realtime: bool,

    /// TOML file with `[engine]` overrides.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Use the battery-saver quality ladder.
    #[arg(long)]
    battery_saver: bool,

    /// Seed for scene generation.
    #[arg(long, default_value_t = 7)]
    seed: u64,

    /// Write a Chrome trace of the run to this path.
    #[arg(long)]
    trace_json: Option<PathBuf>,

    /// Print every trace event, not just ticks, summaries and failures.
    #[arg(long)]
    verbose: bool,

    /// Print trace events to stderr.
    #[arg(long)]
    pretty: bool,

    /// Baseline simulated render cost per frame, in milliseconds.
    #[arg(long, default_value_t = 4)]
    load_ms: u64,

    /// Extra render cost during the mid-run spike, in milliseconds.
    #[arg(long, default_value_t = 20)]
    spike_ms: u64,

    /// Walkers in the crowd-flow stream.
    #[arg(long, default_value_t = 400)]
    crowd: usize,

    /// Guards in the patrol stream.
    #[arg(long, default_value_t = 24)]
    patrol: usize,

    /// Vehicles in the shuttle stream.
    #[arg(long, default_value_t = 6)]
    shuttle: usize,

    /// Make the shuttle layer reject this many publishes at startup.
    #[arg(long, default_value_t = 0)]
    flaky_shuttle: u32,

    /// Frames between camera moves.
    #[arg(long, default_value_t = 180)]
    camera_every: u64,
}

/// On-disk demo configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DemoFile {
    engine: Option<EngineConfig>,
}

fn load_config(args: &Args) -> anyhow::Result<EngineConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            let file: DemoFile =
                toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
            file.engine.unwrap_or_default()
        }
        None => EngineConfig::standard(),
    };
    if args.battery_saver {
        config.rate = EngineConfig::battery_saver().rate;
    }
    config.validate().context("invalid engine configuration")?;
    Ok(config)
}

/// Simulated cost of building one frame.
fn render_cost(args: &Args, frame: u64, features: usize) -> Duration {
    let spike_start = args.frames / 3;
    let spike_end = spike_start + args.frames / 6;
    let spike = if (spike_start..spike_end).contains(&frame) {
        args.spike_ms
    } else {
        0
    };
    let per_feature_us = u64::try_from(features).unwrap_or(u64::MAX).saturating_mul(8);
    Duration::from_millis(args.load_ms + spike).saturating_add(Duration(per_feature_us.saturating_mul(1_000)))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    if args.frames == 0 {
        bail!("--frames must be at least 1");
    }
    let config = load_config(&args)?;
    let top_fps = config.rate.levels.last().map_or(0, |level| level.fps);
    info!(target_fps = top_fps, max_tasks = config.max_tasks, "engine configured");

    let mut sink = ConsoleSink::default();
    if args.flaky_shuttle > 0 {
        sink.reject_next("shuttle", args.flaky_shuttle);
    }
    let mut engine = Engine::new(config, sink)?.with_memory_probe(ProcMemoryProbe::new());

    // Scene.
    let mut rng = SmallRng::seed_from_u64(args.seed);
    for (name, specs) in [
        ("crowd-flow", scene::crowd_flow(&mut rng, args.crowd)),
        ("patrol", scene::patrols(&mut rng, args.patrol)),
        ("shuttle", scene::shuttles(args.shuttle)),
    ] {
        let report = engine.start_stream(name, specs);
        for rejected in &report.rejected {
            warn!(stream = name, "entity rejected: {rejected}");
        }
        info!(stream = name, accepted = report.accepted, "stream started");
    }
    let facilities = engine.register_source("facilities", scene::facilities(&mut rng, FACILITY_COUNT));
    let cameras = scene::camera_stops();
    engine.set_viewport(cameras[0]);

    // Host tasks.
    engine.schedule(
        "ops/telemetry",
        TaskKind::Interval(Duration::from_secs(1)),
        |stage, ctx| {
            info!(
                at_ms = ctx.now.nanos() / 1_000_000,
                target_fps = stage.controller().target_fps(),
                streams = stage.animation().active_count(),
                shown = stage.sink().total_features(),
                "ops heartbeat"
            );
            Ok(())
        },
    );
    let mut feed_rng = SmallRng::seed_from_u64(args.seed.wrapping_add(1));
    engine.schedule(
        "ops/feed",
        TaskKind::Interval(Duration::from_secs(2)),
        move |stage, _| {
            let fresh = scene::facilities(&mut feed_rng, FACILITY_COUNT);
            if stage.culling_mut().replace_source_data(facilities, fresh) {
                Ok(())
            } else {
                Err(TaskError::MissingOwner("facilities".into()))
            }
        },
    );

    // Diagnostics.
    let mut fanout = Fanout {
        pretty: args.pretty.then(|| {
            let sink = PrettyPrintSink::stderr();
            if args.verbose { sink } else { sink.quiet() }
        }),
        chrome: args.trace_json.as_ref().map(|_| ChromeTraceSink::new()),
    };

    // Frame loop.
    let mut pacer = FramePacer::new(args.fps);
    let mut clock = if args.realtime { now() } else { HostTime::from_millis(1_000) };
    for frame in 0..args.frames {
        if frame > 0 && frame % args.camera_every.max(1) == 0 {
            let stop = cameras[usize::try_from(frame / args.camera_every.max(1)).unwrap_or(0) % cameras.len()];
            info!(zoom = stop.zoom, "camera moved");
            engine.set_viewport(stop);
        }
        // Swap crowd flow for a reversed bounce half way through, like a
        // gate closure rerouting people.
        if frame == args.frames / 2 {
            let specs = scene::crowd_flow(&mut rng, args.crowd)
                .into_iter()
                .map(|spec| spec.with_mode(LoopMode::Bounce))
                .collect::<Vec<_>>();
            engine.start_stream("crowd-flow", specs);
        }

        let tick = if args.realtime { pacer.wait() } else { pacer.tick_at(clock) };
        let report = {
            let mut tracer = Tracer::new(&mut fanout);
            engine.on_frame(&tick, &mut tracer)
        };
        if let Some(change) = report.quality_change {
            info!(
                from = change.from_fps,
                to = change.to_fps,
                reason = ?change.reason,
                "quality changed"
            );
        }
        if let Some(cleanup) = report.cleanup {
            warn!(reason = ?cleanup.reason, pruned = cleanup.pruned_tasks, "resource cleanup");
        }
        for failure in &report.failures {
            warn!(owner = %failure.owner, attempts = failure.attempts, "task gave up: {}", failure.error);
        }

        let cost = render_cost(&args, frame, engine.sink().total_features());
        let submitted_at = if args.realtime {
            std::thread::sleep(std::time::Duration::from_nanos(cost.nanos()));
            now()
        } else {
            tick.now.saturating_add(cost)
        };
        let feedback = FrameFeedback {
            build_start: tick.now,
            submitted_at,
        };
        {
            let mut tracer = Tracer::new(&mut fanout);
            engine.observe(&feedback, &mut tracer);
        }
        if !args.realtime {
            // The next frame cannot start before this one was submitted.
            let interval = pacer.interval();
            clock = tick.now.saturating_add(cost.max(interval));
        }

        if frame % u64::from(args.fps.max(1)) == 0 {
            info!("{}", engine.telemetry());
        }
    }

    // Shutdown.
    let telemetry = engine.telemetry();
    engine.teardown();
    info!(
        publishes = engine.sink().publishes(),
        missed = pacer.missed(),
        leaked = engine.registry().len(),
        "run finished: {telemetry}"
    );
    for (layer, features) in engine.sink().layers() {
        info!(layer, features, "final layer");
    }

    if let (Some(path), Some(chrome)) = (&args.trace_json, &fanout.chrome) {
        let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        chrome
            .write_to(&mut writer)
            .with_context(|| format!("writing {}", path.display()))?;
        info!(events = chrome.len(), path = %path.display(), "chrome trace written");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use turnstile_core::trace::{RenderFeedbackEvent, TraceSink};

    use super::*;

    #[test]
    fn demo_config_file_parses() {
        let text = include_str!("../ops.toml");
        let file: DemoFile = toml::from_str(text).unwrap();
        let config = file.engine.unwrap();
        assert_eq!(config.max_tasks, 128);
        assert_eq!(config.culling.interval, Duration::from_millis(100));
        config.validate().unwrap();
    }

    #[test]
    fn render_cost_spikes_mid_run() {
        let args = Args::parse_from(["ops_demo", "--frames", "600"]);
        let calm = render_cost(&args, 10, 0);
        let spiking = render_cost(&args, 250, 0);
        assert_eq!(calm, Duration::from_millis(4));
        assert_eq!(spiking, Duration::from_millis(24));
    }

    #[test]
    fn empty_file_keeps_standard_config() {
        let file: DemoFile = toml::from_str("").unwrap();
        assert!(file.engine.is_none());
    }

    #[test]
    fn fanout_without_sinks_is_silent() {
        let mut fanout = Fanout::default();
        fanout.on_render_feedback(&RenderFeedbackEvent {
            frame_index: 0,
            render_time: Duration::from_millis(3),
        });
        assert!(fanout.chrome.is_none());
    }
}

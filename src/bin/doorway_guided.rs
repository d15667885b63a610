//! doorway_guided - live doorway guidance daemon
//!
//! This daemon:
//! 1. Loads configuration (TOML file + DOORWAY_GUIDE_* overrides)
//! 2. Connects to the frame source and derives the session geometry once
//! 3. Runs the detector on every frame and speaks throttled guidance
//! 4. Optionally records every annotated frame
//! 5. Stops on Ctrl-C or when the source ends

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use doorway_guide::{
    config::SpeechMode, open_recorder, open_source, session, speech, BackendRegistry,
    FrameGeometry, GuideConfig, GuidanceSession, RecorderConfig, SourceConfig, SystemClock,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// TOML configuration file.
    #[arg(long, env = "DOORWAY_GUIDE_CONFIG")]
    config: Option<PathBuf>,
    /// Frame source (stub://name, file path, device or stream URL).
    #[arg(long)]
    source: Option<String>,
    /// Detection script replayed by the scripted backend.
    #[arg(long)]
    script: Option<PathBuf>,
    /// Speech mode: log, blocking or queued.
    #[arg(long)]
    speech: Option<String>,
    /// Stop after this many frames.
    #[arg(long)]
    max_frames: Option<u64>,
    /// Record annotated frames here (.rgb, or any container FFmpeg writes).
    #[arg(long)]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = GuideConfig::load_from(args.config.as_deref())?;
    if let Some(source) = args.source {
        cfg.source.url = source;
    }
    if let Some(script) = args.script {
        cfg.detector.script_path = Some(script);
    }
    if let Some(max_frames) = args.max_frames {
        cfg.source.max_frames = Some(max_frames);
    }
    if let Some(mode) = args.speech.as_deref() {
        cfg.speech.mode = SpeechMode::parse(mode)?;
    }
    if let Some(output) = args.output {
        cfg.output.path = Some(output);
    }

    let mut source = open_source(SourceConfig {
        url: cfg.source.url.clone(),
        target_fps: cfg.source.target_fps,
        width: cfg.source.width,
        height: cfg.source.height,
        max_frames: cfg.source.max_frames,
    })?;
    source.connect()?;

    let (width, height) = source.resolution();
    let geometry = FrameGeometry::compute(width, height)
        .with_context(|| format!("unusable capture resolution from {}", cfg.source.url))?;
    log::info!(
        "geometry {}x{}: left<{} right>{} far<{:.1}px",
        geometry.frame_width,
        geometry.frame_height,
        geometry.left_bound,
        geometry.right_bound,
        geometry.distance_threshold
    );

    let mut detectors = BackendRegistry::from_settings(&cfg.detector)?;
    detectors.warm_up()?;
    log::info!(
        "detector backends: {:?} (default {})",
        detectors.list(),
        detectors.default_name().unwrap_or("none")
    );

    let sink = speech::from_settings(&cfg.speech)?;
    log::info!("speech sink: {}", sink.name());
    let mut guidance = GuidanceSession::new(
        geometry,
        cfg.guidance.target_label.clone(),
        cfg.guidance.interval,
        sink,
    )?;

    let mut recorder = match &cfg.output.path {
        Some(path) => Some(open_recorder(RecorderConfig {
            path: path.clone(),
            width,
            height,
            fps: cfg.source.target_fps,
        })?),
        None => None,
    };

    let stop = Arc::new(AtomicBool::new(false));
    let handler_stop = Arc::clone(&stop);
    ctrlc::set_handler(move || {
        handler_stop.store(true, Ordering::SeqCst);
    })
    .context("error setting Ctrl-C handler")?;

    log::info!(
        "doorway_guided running. target={} interval={:?} source={}",
        guidance.target_label(),
        cfg.guidance.interval,
        cfg.source.url
    );

    let clock = SystemClock::new();
    let stats = session::run(
        source.as_mut(),
        &mut detectors,
        &mut guidance,
        recorder.as_deref_mut().map(|r| r as _),
        &clock,
        &stop,
    )?;

    log::info!(
        "session finished: frames={} detections={} spoken={} suppressed={} rejected={} speech_failures={} recorded={} max_age={}ms",
        stats.frames,
        stats.detections,
        stats.spoken,
        stats.suppressed,
        stats.rejected,
        stats.speech_failures,
        stats.frames_recorded,
        stats.max_frame_age_ms
    );
    Ok(())
}

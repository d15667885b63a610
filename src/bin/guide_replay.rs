//! guide_replay - offline replay of a recorded detection script
//!
//! Feeds scripted detections through the guidance session on a manual clock
//! and prints what would have been spoken. No camera or audio is touched.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use doorway_guide::{
    detect::read_script, Clock, FrameGeometry, GuidanceSession, LogSpeech, ManualClock,
    DEFAULT_ANNOUNCEMENT_INTERVAL, DOOR_LABEL,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// JSON detection script.
    script: PathBuf,
    /// Frame width in pixels.
    #[arg(long, default_value_t = 960)]
    width: u32,
    /// Frame height in pixels.
    #[arg(long, default_value_t = 540)]
    height: u32,
    /// Frame rate used for entries without `at_secs`.
    #[arg(long, default_value_t = 30)]
    fps: u32,
    /// Announcement interval in seconds.
    #[arg(long)]
    interval: Option<f64>,
    /// Class label to guide toward.
    #[arg(long, default_value = DOOR_LABEL)]
    label: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();
    if args.fps == 0 {
        return Err(anyhow!("fps must be >= 1"));
    }
    let interval = match args.interval {
        Some(secs) if secs.is_finite() && secs > 0.0 => seconds(secs)?,
        Some(_) => return Err(anyhow!("interval must be greater than zero")),
        None => DEFAULT_ANNOUNCEMENT_INTERVAL,
    };

    let mut script = read_script(&args.script)?;
    script.sort_by_key(|entry| entry.frame);

    let geometry = FrameGeometry::compute(args.width, args.height)?;
    let mut session =
        GuidanceSession::new(geometry, args.label, interval, Box::new(LogSpeech::new()))?;
    let clock = ManualClock::new();

    for entry in &script {
        let at = match entry.at_secs {
            Some(secs) if secs.is_finite() && secs >= 0.0 => seconds(secs)?,
            Some(secs) => return Err(anyhow!("frame {}: invalid at_secs {}", entry.frame, secs)),
            None => seconds((entry.frame - 1) as f64 / args.fps as f64)?,
        };
        clock.set(at);
        let outcome = session.process_frame(&entry.detections, clock.now());
        // The gate only ever admits the first well-formed detection of a frame.
        for (i, instruction) in outcome.instructions.iter().enumerate() {
            let verdict = if i == 0 && outcome.spoken.is_some() {
                "SPOKEN"
            } else {
                "suppressed"
            };
            println!(
                "t={:>7.2}s frame={:<6} {:<10} {:?}/{:?} {}",
                at.as_secs_f64(),
                entry.frame,
                verdict,
                instruction.zone,
                instruction.distance,
                instruction.phrase
            );
        }
        if outcome.rejected > 0 {
            println!(
                "t={:>7.2}s frame={:<6} rejected {} malformed detection(s)",
                at.as_secs_f64(),
                entry.frame,
                outcome.rejected
            );
        }
    }

    let stats = session.stats();
    println!("replay summary:");
    println!("  frames: {}", stats.frames);
    println!("  instructions: {}", stats.instructions);
    println!("  spoken: {}", stats.spoken);
    println!("  suppressed: {}", stats.suppressed);
    println!("  rejected: {}", stats.rejected);
    Ok(())
}

fn seconds(secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs)
        .map_err(|e| anyhow!("{} seconds is out of range: {}", secs, e))
}

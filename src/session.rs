//! Per-frame guidance session.
//!
//! `GuidanceSession` owns everything that lives for a whole session: the frame
//! geometry, the announcement gate and the speech sink. Each frame's detections
//! go through label filtering, classification and the gate, in that order.

use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::announce::{AnnouncementGate, Clock};
use crate::detect::{filter, BackendRegistry, Detection};
use crate::geometry::FrameGeometry;
use crate::guidance::{classify, Instruction};
use crate::ingest::FrameSource;
use crate::output::FrameRecorder;
use crate::speech::SpeechSink;

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);

/// What happened to one frame's detections.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameOutcome {
    /// Instructions for every well-formed target detection, in detector order.
    pub instructions: Vec<Instruction>,
    /// The instruction that was spoken, if the gate was open.
    pub spoken: Option<Instruction>,
    /// Target detections rejected as malformed.
    pub rejected: usize,
}

impl FrameOutcome {
    pub fn suppressed(&self) -> usize {
        self.instructions.len() - usize::from(self.spoken.is_some())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub frames: u64,
    pub detections: u64,
    pub instructions: u64,
    pub spoken: u64,
    pub suppressed: u64,
    pub rejected: u64,
    pub speech_failures: u64,
    pub frames_recorded: u64,
    /// Largest capture-to-decision delay seen, in milliseconds.
    pub max_frame_age_ms: u64,
}

pub struct GuidanceSession {
    geometry: FrameGeometry,
    gate: AnnouncementGate,
    target_label: String,
    speech: Box<dyn SpeechSink>,
    stats: SessionStats,
}

impl GuidanceSession {
    pub fn new(
        geometry: FrameGeometry,
        target_label: impl Into<String>,
        interval: Duration,
        speech: Box<dyn SpeechSink>,
    ) -> Result<Self> {
        geometry.validate()?;
        let target_label = target_label.into();
        if target_label.trim().is_empty() {
            return Err(anyhow!("target label must not be empty"));
        }
        if interval.is_zero() {
            return Err(anyhow!("announcement interval must be greater than zero"));
        }
        Ok(Self {
            geometry,
            gate: AnnouncementGate::new(interval),
            target_label,
            speech,
            stats: SessionStats::default(),
        })
    }

    pub fn geometry(&self) -> &FrameGeometry {
        &self.geometry
    }

    pub fn gate(&self) -> &AnnouncementGate {
        &self.gate
    }

    pub fn target_label(&self) -> &str {
        &self.target_label
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Process one frame's detections at session time `now`.
    ///
    /// At most one instruction is spoken per frame, and only if the gate is
    /// open. The gate is recorded only after the speech sink accepted the
    /// phrase, so a failed playback is retried on the next qualifying frame.
    pub fn process_frame(&mut self, detections: &[Detection], now: Duration) -> FrameOutcome {
        self.stats.frames += 1;
        self.stats.detections += detections.len() as u64;

        let mut outcome = FrameOutcome::default();
        let mut speech_failed = false;
        for det in filter::matching(detections, &self.target_label) {
            let instruction = match classify(det, &self.geometry) {
                Ok(instruction) => instruction,
                Err(e) => {
                    log::warn!("skipping {} detection: {}", self.target_label, e);
                    outcome.rejected += 1;
                    continue;
                }
            };
            outcome.instructions.push(instruction);

            if speech_failed || outcome.spoken.is_some() || !self.gate.should_announce(now) {
                log::debug!(
                    "suppressed ({:?}, {:.1}s left): {}",
                    self.gate.phase(now),
                    self.gate.remaining(now).as_secs_f32(),
                    instruction
                );
                continue;
            }

            match self.speech.speak(instruction.phrase) {
                Ok(()) => {
                    self.gate.record(now);
                    log::info!("announced: {}", instruction);
                    outcome.spoken = Some(instruction);
                }
                Err(e) => {
                    log::error!("speech failed ({}): {}", self.speech.name(), e);
                    self.stats.speech_failures += 1;
                    speech_failed = true;
                }
            }
        }

        if outcome.instructions.is_empty() && outcome.rejected == 0 {
            log::trace!("no {} in frame", self.target_label);
        }
        self.stats.instructions += outcome.instructions.len() as u64;
        self.stats.spoken += u64::from(outcome.spoken.is_some());
        self.stats.suppressed += outcome.suppressed() as u64;
        self.stats.rejected += outcome.rejected as u64;
        outcome
    }
}

/// Drive a session from a frame source until it ends or `stop` is set.
///
/// The geometry is derived once from the source's reported resolution. When a
/// recorder is given, every frame is written with its detections drawn in. A
/// recording failure stops the recording but never the guidance.
pub fn run<C: Clock>(
    source: &mut dyn FrameSource,
    detectors: &mut BackendRegistry,
    session: &mut GuidanceSession,
    mut recorder: Option<&mut dyn FrameRecorder>,
    clock: &C,
    stop: &AtomicBool,
) -> Result<SessionStats> {
    let (width, height) = source.resolution();
    if (width, height) != (session.geometry.frame_width, session.geometry.frame_height) {
        return Err(anyhow!(
            "source resolution {}x{} does not match session geometry {}x{}",
            width,
            height,
            session.geometry.frame_width,
            session.geometry.frame_height
        ));
    }
    let label = session.target_label.clone();
    let mut last_health_log = Instant::now();

    while !stop.load(Ordering::SeqCst) {
        let Some(frame) = source.next_frame()? else {
            log::info!("source ended");
            break;
        };
        let detections = detectors.detect_for_label(&label, &frame)?;
        session.process_frame(&detections, clock.now());
        let age_ms = u64::try_from(frame.age_ms()).unwrap_or(u64::MAX);
        session.stats.max_frame_age_ms = session.stats.max_frame_age_ms.max(age_ms);

        let mut recording_failed = false;
        if let Some(sink) = recorder.as_deref_mut() {
            match sink.record(&frame, &detections) {
                Ok(()) => session.stats.frames_recorded += 1,
                Err(e) => {
                    log::error!("recording ({}) stopped: {}", sink.name(), e);
                    recording_failed = true;
                }
            }
        }
        if recording_failed {
            recorder = None;
        }

        if last_health_log.elapsed() >= HEALTH_LOG_INTERVAL {
            let source_stats = source.stats();
            let stats = session.stats();
            log::info!(
                "source health={} frames={} url={} age={}ms spoken={} suppressed={} rejected={}",
                source.is_healthy(),
                source_stats.frames_captured,
                source_stats.url,
                age_ms,
                stats.spoken,
                stats.suppressed,
                stats.rejected
            );
            last_health_log = Instant::now();
        }
    }

    if stop.load(Ordering::SeqCst) {
        log::info!("stop requested, session ending");
    }
    if let Some(sink) = recorder {
        if let Err(e) = sink.finish() {
            log::error!("recording ({}) did not finish cleanly: {}", sink.name(), e);
        }
    }
    Ok(session.stats().clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::announce::ManualClock;
    use crate::detect::{BoundingBox, ScriptedBackend, ScriptedFrame};
    use crate::frame::Frame;
    use crate::ingest::{SourceConfig, SyntheticSource};
    use crate::speech::LogSpeech;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Transcript(Arc<Mutex<Vec<String>>>);

    impl SpeechSink for Transcript {
        fn name(&self) -> &'static str {
            "transcript"
        }
        fn speak(&mut self, phrase: &str) -> Result<()> {
            self.0.lock().unwrap().push(phrase.to_string());
            Ok(())
        }
    }

    struct Broken;

    impl SpeechSink for Broken {
        fn name(&self) -> &'static str {
            "broken"
        }
        fn speak(&mut self, _phrase: &str) -> Result<()> {
            Err(anyhow!("audio device missing"))
        }
    }

    /// Records which frames arrived and how many detections each carried.
    #[derive(Default)]
    struct Tape {
        frames: Vec<(u64, usize)>,
        fail_at: Option<u64>,
        finished: bool,
    }

    impl FrameRecorder for Tape {
        fn name(&self) -> &'static str {
            "tape"
        }
        fn record(&mut self, frame: &Frame, detections: &[Detection]) -> Result<()> {
            if self.fail_at == Some(frame.sequence) {
                return Err(anyhow!("disk full"));
            }
            self.frames.push((frame.sequence, detections.len()));
            Ok(())
        }
        fn finish(&mut self) -> Result<()> {
            self.finished = true;
            Ok(())
        }
        fn frames_written(&self) -> u64 {
            self.frames.len() as u64
        }
    }

    fn hall_source(max_frames: u64) -> SyntheticSource {
        let mut source = SyntheticSource::new(SourceConfig {
            url: "stub://hall".to_string(),
            target_fps: 30,
            width: 900,
            height: 540,
            max_frames: Some(max_frames),
        })
        .unwrap();
        source.connect().unwrap();
        source
    }

    fn door(x1: i32, x2: i32) -> Detection {
        Detection::new("door", BoundingBox::new(x1, 0, x2, 50))
    }

    fn session(speech: Box<dyn SpeechSink>) -> GuidanceSession {
        let geometry = FrameGeometry::compute(900, 540).unwrap();
        GuidanceSession::new(geometry, "door", Duration::from_secs(6), speech).unwrap()
    }

    #[test]
    fn one_announcement_per_frame_and_window() {
        let transcript = Transcript::default();
        let mut s = session(Box::new(transcript.clone()));

        let out = s.process_frame(&[door(100, 140), door(650, 800)], Duration::ZERO);
        assert_eq!(out.instructions.len(), 2);
        assert_eq!(
            out.spoken.unwrap().phrase,
            "door is on the left; rotate left to approach."
        );
        assert_eq!(out.suppressed(), 1);

        let out = s.process_frame(&[door(400, 500)], Duration::from_secs(3));
        assert!(out.spoken.is_none());
        assert_eq!(out.instructions.len(), 1);

        let out = s.process_frame(&[door(400, 500)], Duration::from_secs(7));
        assert_eq!(out.spoken.unwrap().phrase, "door is centered and close.");

        assert_eq!(transcript.0.lock().unwrap().len(), 2);
        assert_eq!(s.stats().spoken, 2);
        assert_eq!(s.stats().suppressed, 2);
    }

    #[test]
    fn other_labels_and_degenerate_boxes_are_skipped() {
        let mut s = session(Box::new(LogSpeech::new()));
        let chair = Detection::new("chair", BoundingBox::new(100, 0, 140, 50));
        let out = s.process_frame(&[chair, door(300, 300), door(650, 800)], Duration::ZERO);
        assert_eq!(out.rejected, 1);
        assert_eq!(out.instructions.len(), 1);
        assert_eq!(
            out.spoken.unwrap().phrase,
            "door is on the right; no rotation needed."
        );
        assert_eq!(s.stats().detections, 3);
    }

    #[test]
    fn failed_speech_leaves_gate_open() {
        let mut s = session(Box::new(Broken));
        let out = s.process_frame(&[door(100, 140), door(400, 500)], Duration::ZERO);
        assert!(out.spoken.is_none());
        assert_eq!(s.stats().speech_failures, 1);
        assert!(s.gate().should_announce(Duration::from_secs(1)));
    }

    #[test]
    fn rejects_bad_session_parameters() {
        let g = FrameGeometry::compute(640, 480).unwrap();
        assert!(GuidanceSession::new(
            FrameGeometry::default(),
            "door",
            Duration::from_secs(6),
            Box::new(LogSpeech::new())
        )
        .is_err());
        assert!(GuidanceSession::new(g, "", Duration::from_secs(6), Box::new(LogSpeech::new()))
            .is_err());
        assert!(GuidanceSession::new(g, "door", Duration::ZERO, Box::new(LogSpeech::new()))
            .is_err());
    }

    #[test]
    fn run_drives_source_until_exhausted() {
        let mut source = SyntheticSource::new(SourceConfig {
            url: "stub://hall".to_string(),
            target_fps: 30,
            width: 900,
            height: 540,
            max_frames: Some(3),
        })
        .unwrap();
        source.connect().unwrap();

        let mut detectors = BackendRegistry::new();
        detectors.register(ScriptedBackend::new(vec![
            ScriptedFrame {
                frame: 1,
                at_secs: None,
                detections: vec![door(100, 140)],
            },
            ScriptedFrame {
                frame: 3,
                at_secs: None,
                detections: vec![door(650, 800)],
            },
        ]));

        let transcript = Transcript::default();
        let mut s = session(Box::new(transcript.clone()));
        let clock = ManualClock::new();
        let stop = AtomicBool::new(false);

        let stats = run(&mut source, &mut detectors, &mut s, None, &clock, &stop).unwrap();
        assert_eq!(stats.frames, 3);
        assert_eq!(stats.spoken, 1);
        assert_eq!(stats.suppressed, 1);
        assert_eq!(transcript.0.lock().unwrap().len(), 1);
    }

    #[test]
    fn run_records_every_frame_with_its_detections() {
        let mut source = hall_source(3);
        let mut detectors = BackendRegistry::new();
        detectors.register(ScriptedBackend::new(vec![ScriptedFrame {
            frame: 2,
            at_secs: None,
            detections: vec![door(100, 140), door(650, 800)],
        }])
        .with_labels(["door"]));
        let mut s = session(Box::new(LogSpeech::new()));
        let mut tape = Tape::default();
        let stop = AtomicBool::new(false);

        let stats = run(
            &mut source,
            &mut detectors,
            &mut s,
            Some(&mut tape),
            &ManualClock::new(),
            &stop,
        )
        .unwrap();
        assert_eq!(tape.frames, vec![(1, 0), (2, 2), (3, 0)]);
        assert!(tape.finished);
        assert_eq!(stats.frames_recorded, 3);
        assert_eq!(stats.spoken, 1);
    }

    #[test]
    fn recording_failure_keeps_guidance_running() {
        let mut source = hall_source(4);
        let mut detectors = BackendRegistry::new();
        detectors.register(ScriptedBackend::new(vec![ScriptedFrame {
            frame: 3,
            at_secs: None,
            detections: vec![door(400, 500)],
        }]));
        let transcript = Transcript::default();
        let mut s = session(Box::new(transcript.clone()));
        let mut tape = Tape {
            fail_at: Some(2),
            ..Tape::default()
        };
        let stop = AtomicBool::new(false);

        let stats = run(
            &mut source,
            &mut detectors,
            &mut s,
            Some(&mut tape),
            &ManualClock::new(),
            &stop,
        )
        .unwrap();
        assert_eq!(stats.frames, 4);
        assert_eq!(stats.frames_recorded, 1);
        assert_eq!(tape.frames, vec![(1, 0)]);
        assert!(!tape.finished);
        assert_eq!(
            *transcript.0.lock().unwrap(),
            vec!["door is centered and close."]
        );
    }

    #[test]
    fn run_stops_when_flag_set() {
        let mut source = SyntheticSource::new(SourceConfig {
            url: "stub://hall".to_string(),
            width: 900,
            height: 540,
            ..SourceConfig::default()
        })
        .unwrap();
        source.connect().unwrap();
        let mut detectors = BackendRegistry::new();
        detectors.register(ScriptedBackend::new(Vec::new()).with_labels(["door"]));
        let mut s = session(Box::new(LogSpeech::new()));
        let stop = AtomicBool::new(true);
        let clock = ManualClock::new();
        let stats = run(&mut source, &mut detectors, &mut s, None, &clock, &stop).unwrap();
        assert_eq!(stats.frames, 0);
    }

    #[test]
    fn run_rejects_resolution_mismatch() {
        let mut source = SyntheticSource::new(SourceConfig {
            url: "stub://hall".to_string(),
            width: 640,
            height: 480,
            ..SourceConfig::default()
        })
        .unwrap();
        let mut detectors = BackendRegistry::new();
        let mut s = session(Box::new(LogSpeech::new()));
        let stop = AtomicBool::new(false);
        let clock = ManualClock::new();
        assert!(run(&mut source, &mut detectors, &mut s, None, &clock, &stop).is_err());
    }
}

//! Doorway Guide
//!
//! Spoken guidance toward a doorway from live object detection.
//!
//! # Architecture
//!
//! Each frame flows through a fixed pipeline:
//!
//! 1. **Ingest**: a frame source delivers RGB frames at a fixed resolution.
//! 2. **Detect**: a detector backend turns the frame into validated `Detection`s.
//! 3. **Filter**: only detections carrying the target label (`door`) survive.
//! 4. **Classify**: each doorway is placed in a horizontal zone (left/center/right)
//!    and given a distance qualifier (near/far) from its on-screen width.
//! 5. **Gate**: at most one instruction is spoken per announcement interval.
//! 6. **Record**: optionally, every frame is written out with its boxes drawn in.
//!
//! # Module Structure
//!
//! - `geometry`, `guidance`, `announce`: the guidance core, free of I/O
//! - `detect`: detector boundary, backends and label filtering
//! - `ingest`, `frame`: frame sources
//! - `speech`: speech sinks (logging, blocking command, queued playback)
//! - `output`: annotated frame recorders
//! - `session`: per-frame driver that owns all session state
//! - `config`: TOML + environment configuration

pub mod announce;
pub mod config;
pub mod detect;
mod error;
pub mod frame;
pub mod geometry;
pub mod guidance;
pub mod ingest;
pub mod output;
pub mod session;
pub mod speech;

pub use announce::{
    AnnouncementGate, AnnouncementState, Clock, GatePhase, ManualClock, SystemClock,
    DEFAULT_ANNOUNCEMENT_INTERVAL,
};
pub use config::GuideConfig;
pub use detect::{
    filter_by_label, BackendRegistry, BoundingBox, Detection, DetectorBackend, ScriptedBackend,
    ScriptedFrame, DOOR_LABEL,
};
pub use error::GuidanceError;
pub use frame::Frame;
pub use geometry::FrameGeometry;
pub use guidance::{classify, Distance, Instruction, Zone};
pub use ingest::{open_source, FrameSource, SourceConfig, SyntheticSource};
pub use output::{annotate, open_recorder, FrameRecorder, RecorderConfig};
pub use session::{FrameOutcome, GuidanceSession, SessionStats};
pub use speech::{CommandSpeech, LogSpeech, QueuedSpeech, SpeechSink};

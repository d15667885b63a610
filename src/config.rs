use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::announce::DEFAULT_ANNOUNCEMENT_INTERVAL;
use crate::detect::DOOR_LABEL;

const DEFAULT_SOURCE_URL: &str = "stub://camera";
const DEFAULT_SOURCE_FPS: u32 = 30;
const DEFAULT_SOURCE_WIDTH: u32 = 960;
const DEFAULT_SOURCE_HEIGHT: u32 = 540;
const DEFAULT_DETECTOR_BACKEND: &str = "scripted";
const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;
const DEFAULT_INPUT_SIZE: u32 = 640;
const DEFAULT_SPEECH_COMMAND: &str = "espeak-ng";
const DEFAULT_SPEECH_QUEUE: usize = 1;

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct GuideConfigFile {
    source: Option<SourceConfigFile>,
    detector: Option<DetectorConfigFile>,
    guidance: Option<GuidanceConfigFile>,
    speech: Option<SpeechConfigFile>,
    output: Option<OutputConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    url: Option<String>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
    max_frames: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    script_path: Option<PathBuf>,
    labels: Option<Vec<String>>,
    confidence_threshold: Option<f32>,
    input_size: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct GuidanceConfigFile {
    target_label: Option<String>,
    interval_secs: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct SpeechConfigFile {
    mode: Option<String>,
    command: Option<String>,
    args: Option<Vec<String>>,
    queue: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct OutputConfigFile {
    path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct GuideConfig {
    pub source: SourceSettings,
    pub detector: DetectorSettings,
    pub guidance: GuidanceSettings,
    pub speech: SpeechSettings,
    pub output: OutputSettings,
}

#[derive(Debug, Clone)]
pub struct SourceSettings {
    pub url: String,
    pub target_fps: u32,
    pub width: u32,
    pub height: u32,
    pub max_frames: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    /// `scripted` or `tract`.
    pub backend: String,
    pub model_path: Option<PathBuf>,
    pub script_path: Option<PathBuf>,
    /// Class names in model output order.
    pub labels: Vec<String>,
    pub confidence_threshold: f32,
    pub input_size: u32,
}

#[derive(Debug, Clone)]
pub struct GuidanceSettings {
    pub target_label: String,
    pub interval: Duration,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpeechMode {
    /// Log phrases only.
    Log,
    /// Run the speech command and wait for playback.
    Blocking,
    /// Queue phrases for a playback thread.
    Queued,
}

impl SpeechMode {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "log" => Ok(Self::Log),
            "blocking" => Ok(Self::Blocking),
            "queued" => Ok(Self::Queued),
            other => Err(anyhow!(
                "unknown speech mode '{}' (expected log, blocking or queued)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SpeechSettings {
    pub mode: SpeechMode,
    pub command: String,
    pub args: Vec<String>,
    pub queue: usize,
}

#[derive(Debug, Clone, Default)]
pub struct OutputSettings {
    /// Annotated recording target. `None` disables recording.
    pub path: Option<PathBuf>,
}

impl GuideConfig {
    /// Load from `DOORWAY_GUIDE_CONFIG` (if set), then apply env overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("DOORWAY_GUIDE_CONFIG").ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    /// Load from an explicit file (if any), then apply env overrides.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => read_config_file(path)?,
            None => GuideConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg)?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: GuideConfigFile) -> Result<Self> {
        let source = file.source.unwrap_or_default();
        let detector = file.detector.unwrap_or_default();
        let guidance = file.guidance.unwrap_or_default();
        let speech = file.speech.unwrap_or_default();
        let output = file.output.unwrap_or_default();

        let interval = match guidance.interval_secs {
            Some(secs) => interval_from_secs(secs)?,
            None => DEFAULT_ANNOUNCEMENT_INTERVAL,
        };
        let mode = match speech.mode.as_deref() {
            Some(mode) => SpeechMode::parse(mode)?,
            None => SpeechMode::Blocking,
        };

        Ok(Self {
            source: SourceSettings {
                url: source.url.unwrap_or_else(|| DEFAULT_SOURCE_URL.to_string()),
                target_fps: source.target_fps.unwrap_or(DEFAULT_SOURCE_FPS),
                width: source.width.unwrap_or(DEFAULT_SOURCE_WIDTH),
                height: source.height.unwrap_or(DEFAULT_SOURCE_HEIGHT),
                max_frames: source.max_frames,
            },
            detector: DetectorSettings {
                backend: detector
                    .backend
                    .unwrap_or_else(|| DEFAULT_DETECTOR_BACKEND.to_string()),
                model_path: detector.model_path,
                script_path: detector.script_path,
                labels: detector
                    .labels
                    .unwrap_or_else(|| vec![DOOR_LABEL.to_string()]),
                confidence_threshold: detector
                    .confidence_threshold
                    .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD),
                input_size: detector.input_size.unwrap_or(DEFAULT_INPUT_SIZE),
            },
            guidance: GuidanceSettings {
                target_label: guidance
                    .target_label
                    .unwrap_or_else(|| DOOR_LABEL.to_string()),
                interval,
            },
            speech: SpeechSettings {
                mode,
                command: speech
                    .command
                    .unwrap_or_else(|| DEFAULT_SPEECH_COMMAND.to_string()),
                args: speech.args.unwrap_or_default(),
                queue: speech.queue.unwrap_or(DEFAULT_SPEECH_QUEUE),
            },
            output: OutputSettings { path: output.path },
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("DOORWAY_GUIDE_SOURCE") {
            if !url.trim().is_empty() {
                self.source.url = url;
            }
        }
        if let Ok(label) = std::env::var("DOORWAY_GUIDE_TARGET_LABEL") {
            if !label.trim().is_empty() {
                self.guidance.target_label = label.trim().to_string();
            }
        }
        if let Ok(interval) = std::env::var("DOORWAY_GUIDE_INTERVAL_SECS") {
            let secs: f64 = interval.parse().map_err(|_| {
                anyhow!("DOORWAY_GUIDE_INTERVAL_SECS must be a number of seconds")
            })?;
            self.guidance.interval = interval_from_secs(secs)?;
        }
        if let Ok(path) = std::env::var("DOORWAY_GUIDE_MODEL_PATH") {
            if !path.trim().is_empty() {
                self.detector.model_path = Some(PathBuf::from(path));
                self.detector.backend = "tract".to_string();
            }
        }
        if let Ok(mode) = std::env::var("DOORWAY_GUIDE_SPEECH") {
            self.speech.mode = SpeechMode::parse(&mode)?;
        }
        if let Ok(path) = std::env::var("DOORWAY_GUIDE_OUTPUT") {
            self.output.path = if path.trim().is_empty() {
                None
            } else {
                Some(PathBuf::from(path))
            };
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if self.source.width == 0 || self.source.height == 0 {
            return Err(anyhow!(
                "source resolution {}x{} must be positive",
                self.source.width,
                self.source.height
            ));
        }
        if self.source.target_fps == 0 {
            return Err(anyhow!("source target_fps must be >= 1"));
        }
        match self.detector.backend.as_str() {
            "scripted" => {}
            "tract" => {
                if self.detector.model_path.is_none() {
                    return Err(anyhow!("tract detector requires model_path"));
                }
            }
            other => return Err(anyhow!("unknown detector backend '{}'", other)),
        }
        if !(0.0..=1.0).contains(&self.detector.confidence_threshold) {
            return Err(anyhow!("confidence_threshold must be within 0..=1"));
        }
        if self.detector.labels.iter().any(|l| l.trim().is_empty()) {
            return Err(anyhow!("detector labels must not be empty strings"));
        }
        if self.detector.backend == "tract"
            && !self.detector.labels.contains(&self.guidance.target_label)
        {
            return Err(anyhow!(
                "target label '{}' is not among detector labels {:?}",
                self.guidance.target_label,
                self.detector.labels
            ));
        }
        if self.speech.mode != SpeechMode::Log && self.speech.command.trim().is_empty() {
            return Err(anyhow!("speech command must be set unless mode is log"));
        }
        self.speech.queue = self.speech.queue.max(1);
        Ok(())
    }
}

fn interval_from_secs(secs: f64) -> Result<Duration> {
    if !secs.is_finite() || secs <= 0.0 {
        return Err(anyhow!("announcement interval must be greater than zero"));
    }
    Duration::try_from_secs_f64(secs)
        .map_err(|e| anyhow!("announcement interval {} is out of range: {}", secs, e))
}

fn read_config_file(path: &Path) -> Result<GuideConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = toml::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_capture_setup() {
        let cfg = GuideConfig::from_file(GuideConfigFile::default()).unwrap();
        assert_eq!(cfg.source.url, "stub://camera");
        assert_eq!((cfg.source.width, cfg.source.height), (960, 540));
        assert_eq!(cfg.source.target_fps, 30);
        assert_eq!(cfg.guidance.target_label, "door");
        assert_eq!(cfg.guidance.interval, Duration::from_secs(6));
        assert_eq!(cfg.speech.mode, SpeechMode::Blocking);
        assert!(cfg.output.path.is_none());
    }

    #[test]
    fn parses_toml_sections() {
        let file: GuideConfigFile = toml::from_str(
            r#"
            [source]
            url = "/dev/video0"
            width = 1280
            height = 720

            [guidance]
            interval_secs = 4.5

            [speech]
            mode = "queued"
            command = "say"

            [output]
            path = "output.mp4"
            "#,
        )
        .unwrap();
        let mut cfg = GuideConfig::from_file(file).unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.source.url, "/dev/video0");
        assert_eq!(cfg.guidance.interval, Duration::from_millis(4500));
        assert_eq!(cfg.speech.mode, SpeechMode::Queued);
        assert_eq!(cfg.speech.command, "say");
        assert_eq!(cfg.output.path, Some(PathBuf::from("output.mp4")));
    }

    #[test]
    fn rejects_unknown_sections_and_bad_values() {
        assert!(toml::from_str::<GuideConfigFile>("[display]\nwindow = true").is_err());
        assert!(interval_from_secs(0.0).is_err());
        assert!(interval_from_secs(f64::NAN).is_err());
        assert!(interval_from_secs(1e30).is_err());
        assert!(SpeechMode::parse("shout").is_err());

        let mut cfg = GuideConfig::from_file(GuideConfigFile::default()).unwrap();
        cfg.source.width = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = GuideConfig::from_file(GuideConfigFile::default()).unwrap();
        cfg.detector.backend = "tract".to_string();
        assert!(cfg.validate().is_err());
    }
}

use std::collections::HashMap;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::detect::backend::DetectorBackend;
use crate::detect::result::Detection;
use crate::frame::Frame;

/// One entry of a detection script.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScriptedFrame {
    /// 1-based frame sequence the detections belong to.
    pub frame: u64,
    /// Session time of the frame, used by offline replay.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at_secs: Option<f64>,
    #[serde(default)]
    pub detections: Vec<Detection>,
}

/// Replays pre-recorded detections keyed by frame sequence.
///
/// Frames without a script entry yield no detections.
pub struct ScriptedBackend {
    labels: Vec<String>,
    frames: HashMap<u64, Vec<Detection>>,
}

impl ScriptedBackend {
    pub fn new(script: Vec<ScriptedFrame>) -> Self {
        let mut labels: Vec<String> = Vec::new();
        let mut frames: HashMap<u64, Vec<Detection>> = HashMap::new();
        for entry in script {
            for det in &entry.detections {
                if !labels.contains(&det.class_label) {
                    labels.push(det.class_label.clone());
                }
            }
            frames.entry(entry.frame).or_default().extend(entry.detections);
        }
        Self { labels, frames }
    }

    /// Load a JSON array of [`ScriptedFrame`] entries.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let script = read_script(path)?;
        Ok(Self::new(script))
    }

    /// Declare labels the backend may emit even if the script never uses them.
    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for label in labels {
            let label = label.into();
            if !self.labels.contains(&label) {
                self.labels.push(label);
            }
        }
        self
    }
}

impl DetectorBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        Ok(self.frames.get(&frame.sequence).cloned().unwrap_or_default())
    }
}

pub fn read_script<P: AsRef<Path>>(path: P) -> Result<Vec<ScriptedFrame>> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read detection script {}", path.display()))?;
    let script: Vec<ScriptedFrame> = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid detection script {}: {}", path.display(), e))?;
    if script.iter().any(|entry| entry.frame == 0) {
        return Err(anyhow!(
            "detection script {}: frame numbers start at 1",
            path.display()
        ));
    }
    Ok(script)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::result::BoundingBox;

    fn frame(sequence: u64) -> Frame {
        Frame::new(vec![0; 3], 1, 1, sequence).unwrap()
    }

    #[test]
    fn replays_by_sequence() {
        let mut backend = ScriptedBackend::new(vec![
            ScriptedFrame {
                frame: 2,
                at_secs: None,
                detections: vec![Detection::new("door", BoundingBox::new(1, 1, 5, 5))],
            },
            ScriptedFrame {
                frame: 2,
                at_secs: None,
                detections: vec![Detection::new("chair", BoundingBox::new(6, 1, 9, 5))],
            },
        ]);

        assert!(backend.detect(&frame(1)).unwrap().is_empty());
        let second = backend.detect(&frame(2)).unwrap();
        assert_eq!(second.len(), 2);
        assert_eq!(second[0].class_label, "door");
        assert!(backend.supports_label("chair"));
        assert!(!backend.supports_label("window"));
        assert!(backend.with_labels(["window"]).supports_label("window"));
    }

    #[test]
    fn reads_script_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(
            &mut file,
            br#"[{"frame": 1, "at_secs": 0.5, "detections": [
                {"class_label": "door", "bounding_box": {"x1": 100, "y1": 0, "x2": 140, "y2": 50}}
            ]}]"#,
        )
        .unwrap();
        let script = read_script(file.path()).unwrap();
        assert_eq!(script[0].at_secs, Some(0.5));

        let mut backend = ScriptedBackend::from_path(file.path()).unwrap();
        assert_eq!(backend.detect(&frame(1)).unwrap().len(), 1);
    }

    #[test]
    fn frame_zero_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, br#"[{"frame": 0}]"#).unwrap();
        assert!(read_script(file.path()).is_err());
    }
}

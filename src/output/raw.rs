//! Raw RGB24 recording.
//!
//! Frames are appended back to back with no header. Play them with
//! `ffplay -f rawvideo -pixel_format rgb24 -video_size WxH -framerate FPS file.rgb`.

use anyhow::{anyhow, Context, Result};
use std::fs::File;
use std::io::{BufWriter, Write};

use super::{annotate, FrameRecorder, RecorderConfig};
use crate::detect::Detection;
use crate::frame::Frame;

pub struct RawRecorder {
    config: RecorderConfig,
    writer: BufWriter<File>,
    frames_written: u64,
}

impl RawRecorder {
    pub fn create(config: RecorderConfig) -> Result<Self> {
        let file = File::create(&config.path)
            .with_context(|| format!("failed to create {}", config.path.display()))?;
        log::info!(
            "RawRecorder: writing {}x{} rgb24 frames to {}",
            config.width,
            config.height,
            config.path.display()
        );
        Ok(Self {
            config,
            writer: BufWriter::new(file),
            frames_written: 0,
        })
    }
}

impl FrameRecorder for RawRecorder {
    fn name(&self) -> &'static str {
        "raw"
    }

    fn record(&mut self, frame: &Frame, detections: &[Detection]) -> Result<()> {
        if (frame.width, frame.height) != (self.config.width, self.config.height) {
            return Err(anyhow!(
                "frame {}x{} does not match recording size {}x{}",
                frame.width,
                frame.height,
                self.config.width,
                self.config.height
            ));
        }
        self.writer
            .write_all(&annotate(frame, detections))
            .with_context(|| format!("write frame to {}", self.config.path.display()))?;
        self.frames_written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer
            .flush()
            .with_context(|| format!("flush {}", self.config.path.display()))?;
        log::info!(
            "RawRecorder: {} frames written to {}",
            self.frames_written,
            self.config.path.display()
        );
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.frames_written
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;

    #[test]
    fn appends_annotated_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hall.rgb");
        let mut recorder = RawRecorder::create(RecorderConfig {
            path: path.clone(),
            width: 4,
            height: 4,
            fps: 30,
        })
        .unwrap();

        let frame = Frame::new(vec![0; 4 * 4 * 3], 4, 4, 1).unwrap();
        let door = Detection::new("door", BoundingBox::new(0, 0, 3, 3));
        recorder.record(&frame, &[door]).unwrap();
        recorder.record(&frame, &[]).unwrap();
        recorder.finish().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes.len(), 2 * 4 * 4 * 3);
        assert!(bytes[..48].iter().any(|&b| b != 0));
        assert!(bytes[48..].iter().all(|&b| b == 0));
        assert_eq!(recorder.frames_written(), 2);
    }

    #[test]
    fn rejects_frames_of_another_size() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = RawRecorder::create(RecorderConfig {
            path: dir.path().join("hall.rgb"),
            width: 4,
            height: 4,
            fps: 30,
        })
        .unwrap();
        let frame = Frame::new(vec![0; 2 * 2 * 3], 2, 2, 1).unwrap();
        assert!(recorder.record(&frame, &[]).is_err());
    }
}

//! Annotated frame recording.
//!
//! A [`FrameRecorder`] receives every processed frame together with the
//! detections the detector produced for it, draws the boxes onto a copy of the
//! pixels and writes the result out:
//! - Raw RGB24 frames appended to a `.rgb` file (always available)
//! - Encoded video (`.mp4`, `.avi`, `.mkv`, ...) through FFmpeg
//!   (feature: ingest-ffmpeg)

#[cfg(feature = "ingest-ffmpeg")]
pub(crate) mod ffmpeg_writer;
pub mod raw;

use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};

use crate::detect::{BoundingBox, Detection};
use crate::frame::Frame;

pub use raw::RawRecorder;

const BOX_THICKNESS: u32 = 2;

const PALETTE: [[u8; 3]; 6] = [
    [0, 220, 0],
    [255, 64, 64],
    [64, 128, 255],
    [255, 200, 0],
    [200, 0, 255],
    [0, 200, 200],
];

/// Where and how annotated frames are written.
#[derive(Clone, Debug)]
pub struct RecorderConfig {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

/// Sink for annotated frames.
pub trait FrameRecorder {
    fn name(&self) -> &'static str;

    /// Annotate and write one frame.
    fn record(&mut self, frame: &Frame, detections: &[Detection]) -> Result<()>;

    /// Flush buffered output. Called once when the session ends.
    fn finish(&mut self) -> Result<()>;

    fn frames_written(&self) -> u64;
}

/// Open the recorder matching the output file extension.
pub fn open_recorder(config: RecorderConfig) -> Result<Box<dyn FrameRecorder>> {
    if config.width == 0 || config.height == 0 {
        return Err(anyhow!(
            "recording resolution {}x{} must be positive",
            config.width,
            config.height
        ));
    }
    if config.fps == 0 {
        return Err(anyhow!("recording fps must be >= 1"));
    }
    if is_raw_path(&config.path) {
        return Ok(Box::new(RawRecorder::create(config)?));
    }
    #[cfg(feature = "ingest-ffmpeg")]
    {
        Ok(Box::new(ffmpeg_writer::FfmpegRecorder::create(config)?))
    }
    #[cfg(not(feature = "ingest-ffmpeg"))]
    {
        Err(anyhow!(
            "recording to {} requires the ingest-ffmpeg feature (or a .rgb path)",
            config.path.display()
        ))
    }
}

fn is_raw_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("rgb"))
}

/// Copy of the frame's pixels with every detection outlined.
///
/// Each class label keeps the same colour for the whole session.
pub fn annotate(frame: &Frame, detections: &[Detection]) -> Vec<u8> {
    let mut pixels = frame.pixels().to_vec();
    for det in detections {
        draw_rect(
            &mut pixels,
            frame.width,
            frame.height,
            &det.bounding_box,
            label_color(&det.class_label),
            BOX_THICKNESS,
        );
    }
    pixels
}

fn label_color(label: &str) -> [u8; 3] {
    let sum = label.bytes().fold(0usize, |acc, b| acc.wrapping_add(b as usize));
    PALETTE[sum % PALETTE.len()]
}

fn draw_rect(
    pixels: &mut [u8],
    width: u32,
    height: u32,
    bbox: &BoundingBox,
    color: [u8; 3],
    thickness: u32,
) {
    if width == 0 || height == 0 {
        return;
    }
    let clamp = |v: i32, max: u32| -> u32 { v.clamp(0, max as i32 - 1) as u32 };
    let x0 = clamp(bbox.x1, width);
    let y0 = clamp(bbox.y1, height);
    let x1 = clamp(bbox.x2, width);
    let y1 = clamp(bbox.y2, height);

    let mut put = |x: u32, y: u32| {
        let offset = (y as usize * width as usize + x as usize) * 3;
        if let Some(px) = pixels.get_mut(offset..offset + 3) {
            px.copy_from_slice(&color);
        }
    };
    for t in 0..thickness {
        let xx0 = x0 + t;
        let yy0 = y0 + t;
        let xx1 = x1.saturating_sub(t);
        let yy1 = y1.saturating_sub(t);
        if xx0 > xx1 || yy0 > yy1 {
            break;
        }
        for x in xx0..=xx1 {
            put(x, yy0);
            put(x, yy1);
        }
        for y in yy0..=yy1 {
            put(xx0, y);
            put(xx1, y);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pixel(pixels: &[u8], width: u32, x: u32, y: u32) -> [u8; 3] {
        let offset = ((y * width + x) * 3) as usize;
        [pixels[offset], pixels[offset + 1], pixels[offset + 2]]
    }

    #[test]
    fn outlines_boxes_without_touching_interior() {
        let frame = Frame::new(vec![0; 20 * 10 * 3], 20, 10, 1).unwrap();
        let door = Detection::new("door", BoundingBox::new(2, 1, 12, 8));
        let out = annotate(&frame, &[door]);
        let color = label_color("door");

        assert_eq!(pixel(&out, 20, 2, 1), color);
        assert_eq!(pixel(&out, 20, 12, 8), color);
        assert_eq!(pixel(&out, 20, 3, 2), color);
        assert_eq!(pixel(&out, 20, 7, 5), [0, 0, 0]);
        assert_eq!(pixel(&out, 20, 15, 5), [0, 0, 0]);
        assert!(frame.pixels().iter().all(|&b| b == 0));
    }

    #[test]
    fn clamps_boxes_that_leave_the_frame() {
        let frame = Frame::new(vec![0; 8 * 8 * 3], 8, 8, 1).unwrap();
        let door = Detection::new("door", BoundingBox::new(-5, -5, 50, 50));
        let out = annotate(&frame, &[door]);
        assert_eq!(out.len(), frame.pixels().len());
        assert_eq!(pixel(&out, 8, 0, 0), label_color("door"));
        assert_eq!(pixel(&out, 8, 7, 7), label_color("door"));
    }

    #[test]
    fn rejects_unusable_recorder_settings() {
        let dir = tempfile::tempdir().unwrap();
        let config = RecorderConfig {
            path: dir.path().join("out.rgb"),
            width: 0,
            height: 540,
            fps: 30,
        };
        assert!(open_recorder(config.clone()).is_err());
        assert!(open_recorder(RecorderConfig {
            width: 960,
            fps: 0,
            ..config
        })
        .is_err());
    }

    #[cfg(not(feature = "ingest-ffmpeg"))]
    #[test]
    fn encoded_video_needs_ffmpeg() {
        let dir = tempfile::tempdir().unwrap();
        let err = open_recorder(RecorderConfig {
            path: dir.path().join("out.mp4"),
            width: 960,
            height: 540,
            fps: 30,
        })
        .err()
        .unwrap();
        assert!(err.to_string().contains("ingest-ffmpeg"));
    }
}

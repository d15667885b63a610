//! Frame ingestion sources.
//!
//! This module provides the sources the guidance session pulls frames from:
//! - Synthetic source (`stub://name`) for tests and dry runs
//! - Local video files, devices and stream URLs decoded with FFmpeg
//!   (feature: ingest-ffmpeg)
//! - Jetson CSI cameras (`csi://0`) and arbitrary GStreamer pipelines
//!   (`gst://...`) pulled through an appsink (feature: ingest-gstreamer)
//!
//! Every source reports its resolution once connected. The session derives its
//! frame geometry from that resolution and never re-reads it.

#[cfg(feature = "ingest-ffmpeg")]
pub(crate) mod ffmpeg_source;
#[cfg(feature = "ingest-gstreamer")]
pub(crate) mod gstreamer_source;
pub mod pipeline;
pub mod synthetic;

use anyhow::{anyhow, Result};

use crate::frame::Frame;

pub use synthetic::SyntheticSource;

/// Configuration shared by every source.
#[derive(Clone, Debug)]
pub struct SourceConfig {
    /// `stub://name`, `csi://<sensor>`, `gst://<pipeline>`, a local path, or
    /// (with ingest-ffmpeg) any URL FFmpeg can open.
    pub url: String,
    /// Target frame rate. Sources may decimate to this rate.
    pub target_fps: u32,
    /// Output width. Decoded frames are scaled to this size.
    pub width: u32,
    /// Output height.
    pub height: u32,
    /// Stop after this many frames. `None` runs until the source ends.
    pub max_frames: Option<u64>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: "stub://camera".to_string(),
            target_fps: 30,
            width: 960,
            height: 540,
            max_frames: None,
        }
    }
}

/// Statistics for a frame source.
#[derive(Clone, Debug)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub url: String,
}

/// A source of frames for the session loop.
pub trait FrameSource {
    /// Open the underlying capture.
    fn connect(&mut self) -> Result<()>;

    /// Resolution frames will be delivered at. Valid after `connect`.
    fn resolution(&self) -> (u32, u32);

    /// Next frame, or `None` once the source is exhausted.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    fn is_healthy(&self) -> bool;

    fn stats(&self) -> SourceStats;
}

/// Open the source named by `config.url`.
pub fn open_source(config: SourceConfig) -> Result<Box<dyn FrameSource>> {
    if config.url.trim().is_empty() {
        return Err(anyhow!("source url must not be empty"));
    }
    if config.url.starts_with("stub://") {
        return Ok(Box::new(SyntheticSource::new(config)?));
    }
    if let Some(description) = pipeline::describe(&config)? {
        #[cfg(feature = "ingest-gstreamer")]
        {
            return Ok(Box::new(gstreamer_source::GstreamerSource::new(
                config,
                description,
            )?));
        }
        #[cfg(not(feature = "ingest-gstreamer"))]
        {
            log::debug!("pipeline not built: {}", description);
            return Err(anyhow!(
                "source '{}' requires the ingest-gstreamer feature",
                config.url
            ));
        }
    }
    #[cfg(feature = "ingest-ffmpeg")]
    {
        Ok(Box::new(ffmpeg_source::FfmpegSource::new(config)?))
    }
    #[cfg(not(feature = "ingest-ffmpeg"))]
    {
        Err(anyhow!(
            "source '{}' requires the ingest-ffmpeg feature",
            config.url
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_urls_open_without_features() {
        let source = open_source(SourceConfig::default()).unwrap();
        assert_eq!(source.stats().url, "stub://camera");
    }

    #[test]
    fn empty_url_is_rejected() {
        let config = SourceConfig {
            url: "  ".to_string(),
            ..SourceConfig::default()
        };
        assert!(open_source(config).is_err());
    }

    #[cfg(not(feature = "ingest-gstreamer"))]
    #[test]
    fn camera_pipelines_need_gstreamer() {
        let config = SourceConfig {
            url: "csi://0".to_string(),
            ..SourceConfig::default()
        };
        let err = open_source(config).err().unwrap();
        assert!(err.to_string().contains("ingest-gstreamer"));

        let config = SourceConfig {
            url: "csi://front".to_string(),
            ..SourceConfig::default()
        };
        let err = open_source(config).err().unwrap();
        assert!(err.to_string().contains("sensor id"));
    }

    #[cfg(not(feature = "ingest-ffmpeg"))]
    #[test]
    fn file_paths_need_ffmpeg() {
        let config = SourceConfig {
            url: "/tmp/hallway.mp4".to_string(),
            ..SourceConfig::default()
        };
        let err = open_source(config).err().unwrap();
        assert!(err.to_string().contains("ingest-ffmpeg"));
    }
}

//! GStreamer appsink frame source.
//!
//! Runs a `csi://` or `gst://` pipeline (see [`super::pipeline`]) and pulls
//! RGB samples from its appsink. End of stream ends the source. Bus errors and
//! long stalls are reported as errors.

use anyhow::{anyhow, Context, Result};
use gstreamer::prelude::*;
use std::time::{Duration, Instant};

use super::pipeline::APPSINK_NAME;
use super::{FrameSource, SourceConfig, SourceStats};
use crate::frame::Frame;

pub(crate) struct GstreamerSource {
    config: SourceConfig,
    pipeline: gstreamer::Pipeline,
    appsink: gstreamer_app::AppSink,
    frame_count: u64,
    last_frame_at: Option<Instant>,
    connected_at: Option<Instant>,
    last_error: Option<String>,
    ended: bool,
}

impl GstreamerSource {
    pub(crate) fn new(config: SourceConfig, description: String) -> Result<Self> {
        gstreamer::init().context("initialize gstreamer")?;
        log::debug!("GstreamerSource: pipeline {}", description);

        let pipeline = gstreamer::parse::launch(&description)
            .with_context(|| format!("build pipeline for {}", config.url))?
            .downcast::<gstreamer::Pipeline>()
            .map_err(|_| anyhow!("{} did not produce a pipeline", config.url))?;

        let appsink = pipeline
            .by_name(APPSINK_NAME)
            .context("appsink element missing from pipeline")?
            .downcast::<gstreamer_app::AppSink>()
            .map_err(|_| anyhow!("appsink element has unexpected type"))?;

        let caps = gstreamer::Caps::builder("video/x-raw")
            .field("format", "RGB")
            .field("width", config.width as i32)
            .field("height", config.height as i32)
            .build();
        appsink.set_caps(Some(&caps));

        Ok(Self {
            config,
            pipeline,
            appsink,
            frame_count: 0,
            last_frame_at: None,
            connected_at: None,
            last_error: None,
            ended: false,
        })
    }

    fn frame_timeout(&self) -> Duration {
        let base_ms = if self.config.target_fps == 0 {
            500
        } else {
            (1000 / self.config.target_fps).saturating_mul(4)
        };
        Duration::from_millis(base_ms.max(500) as u64)
    }

    fn health_grace(&self) -> Duration {
        let base_ms = if self.config.target_fps == 0 {
            2_000
        } else {
            (1000 / self.config.target_fps).saturating_mul(6)
        };
        Duration::from_millis(base_ms.max(2_000) as u64)
    }

    fn poll_bus(&mut self) {
        let Some(bus) = self.pipeline.bus() else {
            return;
        };
        while let Some(message) = bus.timed_pop(gstreamer::ClockTime::ZERO) {
            use gstreamer::MessageView;
            match message.view() {
                MessageView::Error(err) => {
                    self.last_error = Some(format!(
                        "gstreamer error from {:?}: {}",
                        err.src().map(|s| s.path_string()),
                        err.error()
                    ));
                }
                MessageView::Eos(..) => self.ended = true,
                _ => {}
            }
        }
    }
}

impl FrameSource for GstreamerSource {
    fn connect(&mut self) -> Result<()> {
        self.pipeline
            .set_state(gstreamer::State::Playing)
            .with_context(|| format!("start pipeline for {}", self.config.url))?;
        self.connected_at = Some(Instant::now());
        log::info!(
            "GstreamerSource: connected to {} ({}x{})",
            self.config.url,
            self.config.width,
            self.config.height
        );
        Ok(())
    }

    fn resolution(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self
            .config
            .max_frames
            .is_some_and(|max| self.frame_count >= max)
        {
            return Ok(None);
        }

        let timeout = self.frame_timeout();
        let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        let waiting_since = Instant::now();
        let sample = loop {
            self.poll_bus();
            if let Some(err) = &self.last_error {
                return Err(anyhow!("{}: {}", self.config.url, err));
            }
            if let Some(sample) = self
                .appsink
                .try_pull_sample(gstreamer::ClockTime::from_mseconds(timeout_ms))
            {
                break sample;
            }
            if self.ended || self.appsink.is_eos() {
                self.ended = true;
                log::info!(
                    "GstreamerSource: {} ended after {} frames",
                    self.config.url,
                    self.frame_count
                );
                return Ok(None);
            }
            let waited = waiting_since.elapsed();
            if waited > self.health_grace() {
                return Err(anyhow!("{} stalled for {:?}", self.config.url, waited));
            }
            log::warn!("GstreamerSource: {} stalled for {:?}", self.config.url, waited);
        };

        let (pixels, width, height) = sample_to_pixels(&sample)?;
        self.frame_count += 1;
        self.last_frame_at = Some(Instant::now());
        Frame::new(pixels, width, height, self.frame_count).map(Some)
    }

    fn is_healthy(&self) -> bool {
        if self.last_error.is_some() {
            return false;
        }
        let Some(connected_at) = self.connected_at else {
            return false;
        };
        let Some(last_frame_at) = self.last_frame_at else {
            return connected_at.elapsed() <= Duration::from_secs(5);
        };
        last_frame_at.elapsed() <= self.health_grace()
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            url: self.config.url.clone(),
        }
    }
}

impl Drop for GstreamerSource {
    fn drop(&mut self) {
        if let Err(e) = self.pipeline.set_state(gstreamer::State::Null) {
            log::warn!("GstreamerSource: failed to stop pipeline: {}", e);
        }
    }
}

fn sample_to_pixels(sample: &gstreamer::Sample) -> Result<(Vec<u8>, u32, u32)> {
    let buffer = sample.buffer().context("sample missing buffer")?;
    let caps = sample.caps().context("sample missing caps")?;
    let info = gstreamer_video::VideoInfo::from_caps(caps).context("parse caps as video info")?;

    let width = info.width();
    let height = info.height();
    let row_bytes = width as usize * 3;
    let stride = info
        .stride()
        .first()
        .copied()
        .context("video info has no planes")? as usize;

    let map = buffer.map_readable().context("map sample buffer")?;
    let data = map.as_slice();

    if stride == row_bytes {
        let pixels = data
            .get(..row_bytes * height as usize)
            .context("sample buffer is shorter than its caps")?;
        return Ok((pixels.to_vec(), width, height));
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let end = start + row_bytes;
        pixels.extend_from_slice(
            data.get(start..end)
                .context("sample buffer row is out of bounds")?,
        );
    }
    Ok((pixels, width, height))
}

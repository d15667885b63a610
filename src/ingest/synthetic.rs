//! Synthetic frame source (`stub://`).
//!
//! Produces deterministic gradient frames at the configured resolution. The
//! pixels carry no doorway; pair it with a scripted detector.

use anyhow::{anyhow, Result};

use super::{FrameSource, SourceConfig, SourceStats};
use crate::frame::{rgb_len, Frame};

pub struct SyntheticSource {
    config: SourceConfig,
    frame_count: u64,
    connected: bool,
}

impl SyntheticSource {
    pub fn new(config: SourceConfig) -> Result<Self> {
        if !config.url.starts_with("stub://") {
            return Err(anyhow!("synthetic source requires a stub:// url"));
        }
        rgb_len(config.width, config.height)?;
        Ok(Self {
            config,
            frame_count: 0,
            connected: false,
        })
    }

    fn generate_pixels(&self) -> Result<Vec<u8>> {
        let mut pixels = vec![0u8; rgb_len(self.config.width, self.config.height)?];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 + self.frame_count) % 256) as u8;
        }
        Ok(pixels)
    }
}

impl FrameSource for SyntheticSource {
    fn connect(&mut self) -> Result<()> {
        self.connected = true;
        log::info!(
            "SyntheticSource: connected to {} ({}x{})",
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
        if !self.connected {
            return Err(anyhow!("synthetic source not connected"));
        }
        if self
            .config
            .max_frames
            .is_some_and(|max| self.frame_count >= max)
        {
            return Ok(None);
        }
        self.frame_count += 1;
        let pixels = self.generate_pixels()?;
        Frame::new(
            pixels,
            self.config.width,
            self.config.height,
            self.frame_count,
        )
        .map(Some)
    }

    fn is_healthy(&self) -> bool {
        self.connected
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            url: self.config.url.clone(),
        }
    }
}

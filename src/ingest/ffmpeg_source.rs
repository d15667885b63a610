//! FFmpeg-backed frame source.
//!
//! Opens anything FFmpeg can demux (local files, capture devices, stream URLs),
//! decodes the best video stream and scales every frame to the configured
//! RGB24 resolution.

use anyhow::{anyhow, Context, Result};
use ffmpeg_next as ffmpeg;
use std::time::{Duration, Instant};

use super::{FrameSource, SourceConfig, SourceStats};
use crate::frame::Frame;

pub(crate) struct FfmpegSource {
    config: SourceConfig,
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    frame_count: u64,
    last_frame_at: Option<Instant>,
    connected_at: Option<Instant>,
    last_error: Option<String>,
    /// EOF has been sent to the decoder; only buffered frames remain.
    draining: bool,
    ended: bool,
}

impl FfmpegSource {
    pub(crate) fn new(config: SourceConfig) -> Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;
        let input = ffmpeg::format::input(&config.url)
            .with_context(|| format!("failed to open '{}' with ffmpeg", config.url))?;
        let input_stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| anyhow!("'{}' has no video track", config.url))?;
        let stream_index = input_stream.index();
        let context = ffmpeg::codec::context::Context::from_parameters(input_stream.parameters())
            .context("load video decoder parameters")?;
        let decoder = context
            .decoder()
            .video()
            .context("open ffmpeg video decoder")?;

        let scaler = ffmpeg::software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::util::format::pixel::Pixel::RGB24,
            config.width,
            config.height,
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .context("create ffmpeg scaler")?;

        Ok(Self {
            config,
            input,
            stream_index,
            decoder,
            scaler,
            frame_count: 0,
            last_frame_at: None,
            connected_at: None,
            last_error: None,
            draining: false,
            ended: false,
        })
    }

    fn emit(&mut self, decoded: &ffmpeg::frame::Video) -> Result<Frame> {
        let mut rgb_frame = ffmpeg::frame::Video::empty();
        self.scaler
            .run(decoded, &mut rgb_frame)
            .context("scale frame to RGB")?;
        let pixels = frame_to_pixels(&rgb_frame)?;

        self.frame_count += 1;
        self.last_frame_at = Some(Instant::now());
        Frame::new(
            pixels,
            rgb_frame.width(),
            rgb_frame.height(),
            self.frame_count,
        )
    }

    fn end_of_stream(&mut self) -> Result<Option<Frame>> {
        self.ended = true;
        log::info!(
            "FfmpegSource: {} ended after {} frames",
            self.config.url,
            self.frame_count
        );
        Ok(None)
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
}

impl FrameSource for FfmpegSource {
    fn connect(&mut self) -> Result<()> {
        self.connected_at = Some(Instant::now());
        log::info!(
            "FfmpegSource: connected to {} ({}x{} -> {}x{})",
            self.config.url,
            self.decoder.width(),
            self.decoder.height(),
            self.config.width,
            self.config.height
        );
        Ok(())
    }

    fn resolution(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.ended
            || self
                .config
                .max_frames
                .is_some_and(|max| self.frame_count >= max)
        {
            return Ok(None);
        }
        if let Some(last_frame_at) = self.last_frame_at {
            if last_frame_at.elapsed() > self.frame_timeout() {
                log::warn!(
                    "FfmpegSource: {} stalled for {:?}",
                    self.config.url,
                    last_frame_at.elapsed()
                );
            }
        }

        let mut decoded = ffmpeg::frame::Video::empty();
        if self.decoder.receive_frame(&mut decoded).is_ok() {
            return self.emit(&decoded).map(Some);
        }
        if self.draining {
            return self.end_of_stream();
        }

        let stream_index = self.stream_index;
        let mut packet = ffmpeg::Packet::empty();
        loop {
            match packet.read(&mut self.input) {
                Ok(()) => {}
                Err(ffmpeg::Error::Eof) => break,
                Err(e) => {
                    self.last_error = Some(e.to_string());
                    return Err(anyhow!("read packet from {}: {}", self.config.url, e));
                }
            }
            if packet.stream() != stream_index {
                continue;
            }
            self.decoder
                .send_packet(&packet)
                .context("send packet to ffmpeg decoder")?;
            if self.decoder.receive_frame(&mut decoded).is_ok() {
                return self.emit(&decoded).map(Some);
            }
        }

        // Frames still buffered in the decoder come out on the following calls.
        self.draining = true;
        self.decoder.send_eof().context("flush ffmpeg decoder")?;
        if self.decoder.receive_frame(&mut decoded).is_ok() {
            return self.emit(&decoded).map(Some);
        }
        self.end_of_stream()
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

fn frame_to_pixels(frame: &ffmpeg::frame::Video) -> Result<Vec<u8>> {
    let width = frame.width() as usize;
    let height = frame.height() as usize;
    let row_bytes = width * 3;
    let stride = frame.stride(0);
    let data = frame.data(0);

    if stride == row_bytes {
        return data
            .get(..row_bytes * height)
            .map(<[u8]>::to_vec)
            .context("ffmpeg frame is shorter than its dimensions");
    }

    let mut pixels = Vec::with_capacity(row_bytes * height);
    for row in 0..height {
        let start = row * stride;
        let end = start + row_bytes;
        pixels.extend_from_slice(
            data.get(start..end)
                .context("ffmpeg frame row is out of bounds")?,
        );
    }
    Ok(pixels)
}

//! FFmpeg-encoded recording.
//!
//! Annotated RGB frames are converted to YUV420P and encoded as MPEG-4 Part 2
//! into whatever container the output path's extension selects.

use anyhow::{anyhow, Context, Result};
use ffmpeg_next as ffmpeg;

use super::{annotate, FrameRecorder, RecorderConfig};
use crate::detect::Detection;
use crate::frame::Frame;

const GOP_SIZE: u32 = 30;
const MAX_B_FRAMES: usize = 2;

pub(crate) struct FfmpegRecorder {
    config: RecorderConfig,
    output: ffmpeg::format::context::Output,
    encoder: ffmpeg::encoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    stream_index: usize,
    encoder_time_base: ffmpeg::Rational,
    stream_time_base: ffmpeg::Rational,
    next_pts: i64,
    frames_written: u64,
    finished: bool,
}

impl FfmpegRecorder {
    pub(crate) fn create(config: RecorderConfig) -> Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;
        let mut output = ffmpeg::format::output(&config.path)
            .with_context(|| format!("failed to create {}", config.path.display()))?;
        let codec = ffmpeg::encoder::find(ffmpeg::codec::Id::MPEG4)
            .ok_or_else(|| anyhow!("ffmpeg was built without an MPEG-4 encoder"))?;
        let global_header = output
            .format()
            .flags()
            .contains(ffmpeg::format::flag::Flags::GLOBAL_HEADER);

        let fps = i32::try_from(config.fps).context("recording fps out of range")?;
        let encoder_time_base = ffmpeg::Rational::new(1, fps);

        let mut stream = output.add_stream(codec).context("add video stream")?;
        let stream_index = stream.index();
        let mut video = ffmpeg::codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()
            .context("create video encoder")?;
        video.set_width(config.width);
        video.set_height(config.height);
        video.set_format(ffmpeg::format::Pixel::YUV420P);
        video.set_time_base(encoder_time_base);
        video.set_frame_rate(Some(ffmpeg::Rational::new(fps, 1)));
        video.set_gop(GOP_SIZE);
        video.set_max_b_frames(MAX_B_FRAMES);
        if global_header {
            video.set_flags(ffmpeg::codec::flag::Flags::GLOBAL_HEADER);
        }
        let encoder = video.open_as(codec).context("open MPEG-4 encoder")?;
        stream.set_parameters(&encoder);
        stream.set_time_base(encoder_time_base);

        output
            .write_header()
            .with_context(|| format!("write header to {}", config.path.display()))?;
        let stream_time_base = output
            .stream(stream_index)
            .ok_or_else(|| anyhow!("video stream missing after header"))?
            .time_base();

        let scaler = ffmpeg::software::scaling::Context::get(
            ffmpeg::format::Pixel::RGB24,
            config.width,
            config.height,
            ffmpeg::format::Pixel::YUV420P,
            config.width,
            config.height,
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .context("create ffmpeg scaler")?;

        log::info!(
            "FfmpegRecorder: encoding {}x{}@{} to {}",
            config.width,
            config.height,
            config.fps,
            config.path.display()
        );
        Ok(Self {
            config,
            output,
            encoder,
            scaler,
            stream_index,
            encoder_time_base,
            stream_time_base,
            next_pts: 0,
            frames_written: 0,
            finished: false,
        })
    }

    fn write_packets(&mut self) -> Result<()> {
        let mut packet = ffmpeg::Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {
            packet.set_stream(self.stream_index);
            packet.rescale_ts(self.encoder_time_base, self.stream_time_base);
            packet
                .write_interleaved(&mut self.output)
                .context("write encoded packet")?;
        }
        Ok(())
    }
}

impl FrameRecorder for FfmpegRecorder {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    fn record(&mut self, frame: &Frame, detections: &[Detection]) -> Result<()> {
        if self.finished {
            return Err(anyhow!(
                "recording to {} already finished",
                self.config.path.display()
            ));
        }
        if (frame.width, frame.height) != (self.config.width, self.config.height) {
            return Err(anyhow!(
                "frame {}x{} does not match recording size {}x{}",
                frame.width,
                frame.height,
                self.config.width,
                self.config.height
            ));
        }

        let pixels = annotate(frame, detections);
        let mut rgb = ffmpeg::frame::Video::new(
            ffmpeg::format::Pixel::RGB24,
            self.config.width,
            self.config.height,
        );
        copy_rows(&pixels, &mut rgb, self.config.width as usize * 3)?;

        let mut yuv = ffmpeg::frame::Video::empty();
        self.scaler
            .run(&rgb, &mut yuv)
            .context("convert frame to YUV420P")?;
        yuv.set_pts(Some(self.next_pts));
        self.next_pts += 1;

        self.encoder
            .send_frame(&yuv)
            .context("send frame to encoder")?;
        self.write_packets()?;
        self.frames_written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        self.encoder.send_eof().context("flush encoder")?;
        self.write_packets()?;
        self.output
            .write_trailer()
            .with_context(|| format!("write trailer to {}", self.config.path.display()))?;
        log::info!(
            "FfmpegRecorder: {} frames written to {}",
            self.frames_written,
            self.config.path.display()
        );
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.frames_written
    }
}

impl Drop for FfmpegRecorder {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            log::error!("FfmpegRecorder: {}", e);
        }
    }
}

fn copy_rows(pixels: &[u8], frame: &mut ffmpeg::frame::Video, row_bytes: usize) -> Result<()> {
    let stride = frame.stride(0);
    let data = frame.data_mut(0);
    for (row, src) in pixels.chunks_exact(row_bytes).enumerate() {
        let start = row * stride;
        data.get_mut(start..start + row_bytes)
            .context("ffmpeg frame row is out of bounds")?
            .copy_from_slice(src);
    }
    Ok(())
}

//! GStreamer pipeline descriptions for `csi://` and `gst://` sources.
//!
//! Every pipeline ends in the same tail: convert to packed RGB at the
//! configured output size and hand buffers to an `appsink` named `sink`.

use anyhow::{anyhow, Context, Result};

use super::SourceConfig;

pub const CSI_SCHEME: &str = "csi://";
pub const GST_SCHEME: &str = "gst://";

/// Name of the appsink element frames are pulled from.
pub const APPSINK_NAME: &str = "sink";

/// Sensor mode requested from the camera before downscaling.
const CSI_CAPTURE_WIDTH: u32 = 1920;
const CSI_CAPTURE_HEIGHT: u32 = 1080;

/// A Jetson CSI camera addressed as `csi://<sensor-id>[?flip=<method>]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CsiCamera {
    pub sensor_id: u32,
    /// `nvvidconv flip-method`, 0..=7.
    pub flip_method: u32,
}

impl CsiCamera {
    pub fn parse(url: &str) -> Result<Self> {
        let rest = url
            .strip_prefix(CSI_SCHEME)
            .ok_or_else(|| anyhow!("'{}' is not a csi:// url", url))?;
        let (sensor, query) = match rest.split_once('?') {
            Some((sensor, query)) => (sensor, Some(query)),
            None => (rest, None),
        };
        let sensor_id = if sensor.is_empty() {
            0
        } else {
            sensor
                .parse()
                .with_context(|| format!("invalid CSI sensor id '{}'", sensor))?
        };

        let mut flip_method = 0;
        for pair in query.into_iter().flat_map(|q| q.split('&')) {
            match pair.split_once('=') {
                Some(("flip", value)) => {
                    flip_method = value
                        .parse()
                        .with_context(|| format!("invalid flip method '{}'", value))?;
                }
                _ => return Err(anyhow!("unknown csi:// option '{}'", pair)),
            }
        }
        if flip_method > 7 {
            return Err(anyhow!("flip method {} is outside 0..=7", flip_method));
        }
        Ok(Self {
            sensor_id,
            flip_method,
        })
    }

    /// `nvarguscamerasrc` capture at 1080p, scaled on the VIC to the output size.
    pub fn pipeline(&self, config: &SourceConfig) -> String {
        format!(
            "nvarguscamerasrc sensor-id={} ! \
             video/x-raw(memory:NVMM), width=(int){}, height=(int){}, framerate=(fraction){}/1 ! \
             nvvidconv flip-method={} ! \
             video/x-raw, width=(int){}, height=(int){}, format=(string)BGRx ! {}",
            self.sensor_id,
            CSI_CAPTURE_WIDTH,
            CSI_CAPTURE_HEIGHT,
            config.target_fps,
            self.flip_method,
            config.width,
            config.height,
            appsink_tail(config)
        )
    }
}

/// Pipeline description for a `csi://` or `gst://` url, or `None` for other urls.
///
/// A `gst://` url carries a pipeline fragment without a sink, for example
/// `gst://v4l2src device=/dev/video0`. The RGB conversion and appsink are
/// appended.
pub fn describe(config: &SourceConfig) -> Result<Option<String>> {
    if config.url.starts_with(CSI_SCHEME) {
        return Ok(Some(CsiCamera::parse(&config.url)?.pipeline(config)));
    }
    if let Some(fragment) = config.url.strip_prefix(GST_SCHEME) {
        let fragment = fragment.trim().trim_end_matches('!').trim();
        if fragment.is_empty() {
            return Err(anyhow!("gst:// url has an empty pipeline"));
        }
        if fragment.contains("appsink") {
            return Err(anyhow!(
                "gst:// pipeline must not contain its own appsink; one is appended"
            ));
        }
        return Ok(Some(format!("{} ! {}", fragment, appsink_tail(config))));
    }
    Ok(None)
}

fn appsink_tail(config: &SourceConfig) -> String {
    format!(
        "videoconvert ! videoscale ! \
         video/x-raw, format=(string)RGB, width=(int){}, height=(int){} ! \
         appsink name={} sync=false max-buffers=1 drop=true",
        config.width, config.height, APPSINK_NAME
    )
}

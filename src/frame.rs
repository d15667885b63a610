//! Captured frames.
//!
//! A `Frame` is produced by an ingest source, handed to a detector and then
//! dropped. Nothing in the crate keeps pixels past the frame that produced them.

use anyhow::{anyhow, Result};
use std::time::Instant;

/// Packed RGB24 frame.
pub struct Frame {
    pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// 1-based index assigned by the source.
    pub sequence: u64,
    captured_at: Instant,
}

impl Frame {
    pub fn new(pixels: Vec<u8>, width: u32, height: u32, sequence: u64) -> Result<Self> {
        let expected = rgb_len(width, height)?;
        if pixels.len() != expected {
            return Err(anyhow!(
                "frame {}x{} expects {} RGB bytes, received {}",
                width,
                height,
                expected,
                pixels.len()
            ));
        }
        Ok(Self {
            pixels,
            width,
            height,
            sequence,
            captured_at: Instant::now(),
        })
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Milliseconds since the source produced this frame.
    pub fn age_ms(&self) -> u128 {
        self.captured_at.elapsed().as_millis()
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("sequence", &self.sequence)
            .finish_non_exhaustive()
    }
}

pub(crate) fn rgb_len(width: u32, height: u32) -> Result<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(3))
        .ok_or_else(|| anyhow!("frame dimensions overflow"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_mismatched_buffer() {
        assert!(Frame::new(vec![0; 12], 2, 2, 1).is_ok());
        assert!(Frame::new(vec![0; 11], 2, 2, 1).is_err());
    }

    #[test]
    fn age_grows_after_capture() {
        let frame = Frame::new(vec![0; 3], 1, 1, 1).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(frame.age_ms() >= 5);
    }
}

//! Frame geometry shared by every guidance decision in a session.
//!
//! The frame is split into three vertical zones of equal width. A doorway
//! narrower than a tenth of the frame width is considered far away.

use crate::GuidanceError;

/// Fraction of the frame width below which a doorway reads as far away.
pub const DISTANCE_THRESHOLD_RATIO: f64 = 0.10;

/// Zone boundaries and distance threshold derived from the capture resolution.
///
/// Computed once at session start. `Default` yields an all-zero geometry,
/// which [`FrameGeometry::validate`] rejects.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameGeometry {
    pub frame_width: u32,
    pub frame_height: u32,
    /// `frame_width / 3`, floor division.
    pub left_bound: u32,
    /// `2 * frame_width / 3`, floor division.
    pub right_bound: u32,
    /// `frame_width * 0.10`.
    pub distance_threshold: f64,
}

impl FrameGeometry {
    pub fn compute(frame_width: u32, frame_height: u32) -> Result<Self, GuidanceError> {
        if frame_width == 0 || frame_height == 0 {
            return Err(GuidanceError::InvalidGeometry {
                width: frame_width,
                height: frame_height,
            });
        }
        let width = u64::from(frame_width);
        Ok(Self {
            frame_width,
            frame_height,
            left_bound: (width / 3) as u32,
            right_bound: (2 * width / 3) as u32,
            distance_threshold: f64::from(frame_width) * DISTANCE_THRESHOLD_RATIO,
        })
    }

    /// Re-checks a geometry value that may be stale or defaulted.
    pub fn validate(&self) -> Result<(), GuidanceError> {
        let expected = Self::compute(self.frame_width, self.frame_height)?;
        if expected != *self {
            return Err(GuidanceError::InvalidGeometry {
                width: self.frame_width,
                height: self.frame_height,
            });
        }
        Ok(())
    }
}

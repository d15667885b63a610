//! Doorway guidance decisions.
//!
//! Maps a detected doorway and the session geometry to a spoken instruction.
//! Everything here is pure: the same detection and geometry always yield the
//! same instruction.

use std::fmt;

use crate::detect::Detection;
use crate::geometry::FrameGeometry;
use crate::GuidanceError;

/// Horizontal third of the frame containing the doorway center.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Zone {
    Left,
    Center,
    Right,
}

/// Apparent distance derived from the doorway's on-screen width.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Distance {
    Near,
    Far,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Instruction {
    pub zone: Zone,
    pub distance: Distance,
    pub phrase: &'static str,
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.phrase)
    }
}

pub fn phrase_for(zone: Zone, distance: Distance) -> &'static str {
    match (zone, distance) {
        (Zone::Left, Distance::Far) => "door is on the left; rotate left to approach.",
        (Zone::Left, Distance::Near) => "door is on the left; no rotation needed.",
        (Zone::Right, Distance::Far) => "door is on the right; rotate right to approach.",
        (Zone::Right, Distance::Near) => "door is on the right; no rotation needed.",
        (Zone::Center, Distance::Far) => "door is centered and far; go straight.",
        (Zone::Center, Distance::Near) => "door is centered and close.",
    }
}

/// Strict comparisons: a center exactly on a bound is `Center`.
pub fn zone_for(center_x: i64, geometry: &FrameGeometry) -> Zone {
    if center_x < i64::from(geometry.left_bound) {
        Zone::Left
    } else if center_x > i64::from(geometry.right_bound) {
        Zone::Right
    } else {
        Zone::Center
    }
}

pub fn distance_for(door_width: i64, geometry: &FrameGeometry) -> Distance {
    if (door_width as f64) < geometry.distance_threshold {
        Distance::Far
    } else {
        Distance::Near
    }
}

/// Classify a doorway detection against the session geometry.
///
/// Degenerate boxes (`x1 >= x2`) are rejected instead of being read as a
/// zero-width, far-away doorway.
pub fn classify(
    detection: &Detection,
    geometry: &FrameGeometry,
) -> Result<Instruction, GuidanceError> {
    geometry.validate()?;
    let bbox = &detection.bounding_box;
    if bbox.x1 >= bbox.x2 {
        return Err(GuidanceError::DegenerateBox {
            x1: bbox.x1,
            x2: bbox.x2,
        });
    }

    let zone = zone_for(bbox.center_x(), geometry);
    let distance = distance_for(bbox.width(), geometry);
    Ok(Instruction {
        zone,
        distance,
        phrase: phrase_for(zone, distance),
    })
}

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box in frame pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Horizontal center, floor of `(x1 + x2) / 2`.
    pub fn center_x(&self) -> i64 {
        (i64::from(self.x1) + i64::from(self.x2)).div_euclid(2)
    }

    /// `x2 - x1`. Negative or zero for degenerate boxes.
    pub fn width(&self) -> i64 {
        i64::from(self.x2) - i64::from(self.x1)
    }

    pub fn height(&self) -> i64 {
        i64::from(self.y2) - i64::from(self.y1)
    }

    pub fn is_degenerate(&self) -> bool {
        self.x1 >= self.x2 || self.y1 >= self.y2
    }
}

/// One detector output record for a single frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class_label: String,
    pub bounding_box: BoundingBox,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

impl Detection {
    pub fn new(class_label: impl Into<String>, bounding_box: BoundingBox) -> Self {
        Self {
            class_label: class_label.into(),
            bounding_box,
            confidence: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(confidence);
        self
    }

    /// Build a detection from raw detector coordinates.
    ///
    /// Coordinates are truncated to whole pixels the same way the detector
    /// boxes are consumed downstream. Non-finite or inverted boxes are rejected
    /// here so backends never hand malformed records to the session.
    pub fn from_xyxy(class_label: &str, xyxy: [f32; 4], confidence: f32) -> Result<Self> {
        if xyxy.iter().any(|v| !v.is_finite()) {
            return Err(anyhow!("non-finite box coordinates for '{}'", class_label));
        }
        let [x1, y1, x2, y2] = xyxy.map(|v| v as i32);
        let bbox = BoundingBox::new(x1, y1, x2, y2);
        if bbox.is_degenerate() {
            return Err(anyhow!(
                "inverted box ({}, {}, {}, {}) for '{}'",
                x1,
                y1,
                x2,
                y2,
                class_label
            ));
        }
        Ok(Self::new(class_label, bbox).with_confidence(confidence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn center_uses_floor_division() {
        assert_eq!(BoundingBox::new(100, 0, 141, 50).center_x(), 120);
        assert_eq!(BoundingBox::new(-3, 0, 0, 50).center_x(), -2);
    }

    #[test]
    fn from_xyxy_truncates_and_validates() {
        let d = Detection::from_xyxy("door", [10.9, 2.2, 40.5, 80.0], 0.7).unwrap();
        assert_eq!(d.bounding_box, BoundingBox::new(10, 2, 40, 80));
        assert_eq!(d.confidence, Some(0.7));

        assert!(Detection::from_xyxy("door", [40.0, 0.0, 10.0, 5.0], 0.9).is_err());
        assert!(Detection::from_xyxy("door", [f32::NAN, 0.0, 10.0, 5.0], 0.9).is_err());
    }

    #[test]
    fn replay_records_parse_without_confidence() {
        let d: Detection = serde_json::from_str(
            r#"{"class_label":"door","bounding_box":{"x1":1,"y1":2,"x2":3,"y2":4}}"#,
        )
        .unwrap();
        assert_eq!(d.confidence, None);
        assert_eq!(d.bounding_box.width(), 2);
    }
}

use thiserror::Error;

/// Errors raised by the guidance core.
///
/// An empty detection set is not an error; it simply means nothing to announce.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuidanceError {
    #[error("invalid frame geometry {width}x{height}: dimensions must be positive")]
    InvalidGeometry { width: u32, height: u32 },
    #[error("degenerate bounding box: x1={x1} must be less than x2={x2}")]
    DegenerateBox { x1: i32, x2: i32 },
}

use crate::detect::result::Detection;

/// Default class label the guidance session looks for.
pub const DOOR_LABEL: &str = "door";

/// Detections whose label matches `target_label` exactly, in input order.
pub fn matching<'a>(
    detections: &'a [Detection],
    target_label: &'a str,
) -> impl Iterator<Item = &'a Detection> + 'a {
    detections
        .iter()
        .filter(move |d| d.class_label == target_label)
}

/// Collecting form of [`matching`]. An empty result means nothing to announce.
pub fn filter_by_label<'a>(detections: &'a [Detection], target_label: &str) -> Vec<&'a Detection> {
    detections
        .iter()
        .filter(|d| d.class_label == target_label)
        .collect()
}

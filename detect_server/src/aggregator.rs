use indexmap::IndexMap;

use crate::bbox::Detection;

/// Number of detections per class label.
///
/// Labels are ordered by their first appearance among the detections, every count is at
/// least one.
pub type CountMapping = IndexMap<String, usize>;

/// Count detections per class label.
pub fn aggregate(detections: &[Detection]) -> CountMapping {
    let mut counts = CountMapping::new();
    for detection in detections {
        *counts.entry(detection.label.clone()).or_insert(0) += 1;
    }
    counts
}

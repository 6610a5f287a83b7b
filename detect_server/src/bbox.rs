//! Bounding boxes and detection records.
//!
use serde::Serialize;

/// Axis-aligned box in pixel coordinates with the origin at the top-left frame corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl BBox {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Enclosed area, zero for boxes with a negative extent.
    pub fn area(&self) -> i64 {
        if self.width <= 0 || self.height <= 0 {
            return 0;
        }
        self.width as i64 * self.height as i64
    }

    /// Overlap of two boxes, `None` if they do not overlap.
    pub fn intersection(&self, other: &BBox) -> Option<BBox> {
        let x_tl = self.x.max(other.x);
        let y_tl = self.y.max(other.y);
        // Corners of saturated boxes lie beyond i32
        let x_br = self.right().min(other.right());
        let y_br = self.bottom().min(other.bottom());

        if x_br <= x_tl as i64 || y_br <= y_tl as i64 {
            return None;
        }
        // The overlap is never wider than either box, so it fits again
        Some(BBox::new(
            x_tl,
            y_tl,
            (x_br - x_tl as i64) as i32,
            (y_br - y_tl as i64) as i32,
        ))
    }

    fn right(&self) -> i64 {
        self.x as i64 + self.width as i64
    }

    fn bottom(&self) -> i64 {
        self.y as i64 + self.height as i64
    }
}

/// Calculate the intersection-over-union metric for two bounding boxes.
///
/// Two boxes without any area are treated as identical.
pub fn iou(bbox_a: &BBox, bbox_b: &BBox) -> f32 {
    let area_a = bbox_a.area();
    let area_b = bbox_b.area();
    if area_a + area_b == 0 {
        return 1.0;
    }

    let overlap_area = bbox_a
        .intersection(bbox_b)
        .map(|overlap| overlap.area())
        .unwrap_or(0);

    (overlap_area as f64 / (area_a + area_b - overlap_area) as f64) as f32
}

/// Box proposed by the network for a single class.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Candidate {
    pub bbox: BBox,
    pub confidence: f32,
    pub class_id: usize,
}

/// Candidate that survived suppression, with its class label.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
    pub bbox: BBox,
    pub confidence: f32,
    pub class_id: usize,
    pub label: String,
}

impl Detection {
    pub fn new(candidate: Candidate, label: impl Into<String>) -> Self {
        Self {
            bbox: candidate.bbox,
            confidence: candidate.confidence,
            class_id: candidate.class_id,
            label: label.into(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_area() {
        assert_eq!(BBox::new(3, 4, 10, 20).area(), 200);
        assert_eq!(BBox::new(3, 4, 0, 20).area(), 0);
        assert_eq!(BBox::new(3, 4, -5, 20).area(), 0);
    }

    #[test]
    fn test_intersection() {
        let a = BBox::new(0, 0, 10, 10);
        assert_eq!(
            a.intersection(&BBox::new(5, 5, 10, 10)),
            Some(BBox::new(5, 5, 5, 5))
        );
        // Touching edges do not overlap
        assert_eq!(a.intersection(&BBox::new(10, 0, 10, 10)), None);
        assert_eq!(a.intersection(&BBox::new(-20, -20, 5, 5)), None);
    }

    #[test]
    fn test_iou() {
        let a = BBox::new(0, 0, 10, 10);
        assert_eq!(iou(&a, &a), 1.0);
        assert_eq!(iou(&a, &BBox::new(20, 20, 10, 10)), 0.0);
        // 25 / (100 + 100 - 25)
        assert!((iou(&a, &BBox::new(5, 5, 10, 10)) - 25.0 / 175.0).abs() < 1e-6);
        // Contained box covering 40% of the outer one
        assert_eq!(iou(&a, &BBox::new(0, 0, 10, 4)), 0.4);
    }

    #[test]
    fn test_saturated_boxes() {
        let huge = BBox::new(1 << 30, 1 << 30, i32::MAX, i32::MAX);
        assert_eq!(huge.intersection(&huge), Some(huge));
        assert_eq!(iou(&huge, &huge), 1.0);

        let offset = BBox::new(i32::MAX - 10, i32::MAX - 10, i32::MAX, i32::MAX);
        assert_eq!(
            huge.intersection(&offset),
            Some(BBox::new(i32::MAX - 10, i32::MAX - 10, (1 << 30) + 10, (1 << 30) + 10))
        );
        assert_eq!(huge.intersection(&BBox::new(0, 0, 10, 10)), None);
    }

    #[test]
    fn test_iou_of_empty_boxes() {
        let empty = BBox::new(5, 5, 0, 0);
        assert_eq!(iou(&empty, &empty), 1.0);
        assert_eq!(iou(&empty, &BBox::new(0, 0, 10, 10)), 0.0);
    }
}

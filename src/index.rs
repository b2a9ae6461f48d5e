//! Per-frame containment lookup over person and vehicle boxes.

use crate::detect::Detection;
use crate::geometry::Point;

/// Answers "which candidate box contains this point?" for one frame.
///
/// Callers only depend on this trait, so a spatial tree can replace the linear
/// scan without touching correlation logic.
pub trait GeometricIndex {
    fn build(candidates: Vec<Detection>) -> Self
    where
        Self: Sized;

    /// Highest-confidence candidate containing `point`; ties keep input order.
    fn containing(&self, point: Point) -> Option<&Detection>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// O(n) scan over candidates pre-sorted by descending confidence.
#[derive(Clone, Debug, Default)]
pub struct LinearIndex {
    candidates: Vec<Detection>,
}

impl GeometricIndex for LinearIndex {
    fn build(mut candidates: Vec<Detection>) -> Self {
        // Stable sort: equal confidences keep discovery order.
        candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        Self { candidates }
    }

    fn containing(&self, point: Point) -> Option<&Detection> {
        self.candidates.iter().find(|c| c.bbox.contains(point))
    }

    fn len(&self) -> usize {
        self.candidates.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::BoundingBox;

    #[test]
    fn prefers_highest_confidence_among_overlapping_boxes() {
        let low = Detection::person(BoundingBox::new(0.0, 0.0, 100.0, 100.0), 0.6);
        let high = Detection::person(BoundingBox::new(40.0, 40.0, 60.0, 60.0), 0.95);
        let index = LinearIndex::build(vec![low, high]);

        assert_eq!(index.containing(Point::new(50.0, 50.0)), Some(&high));
        assert_eq!(index.containing(Point::new(10.0, 10.0)), Some(&low));
        assert_eq!(index.containing(Point::new(150.0, 10.0)), None);
    }

    #[test]
    fn equal_confidence_keeps_discovery_order() {
        let first = Detection::vehicle(BoundingBox::new(0.0, 0.0, 100.0, 100.0), 0.7);
        let second = Detection::vehicle(BoundingBox::new(10.0, 10.0, 90.0, 90.0), 0.7);
        let index = LinearIndex::build(vec![first, second]);
        assert_eq!(index.containing(Point::new(50.0, 50.0)), Some(&first));
    }

    #[test]
    fn empty_index_finds_nothing() {
        let index = LinearIndex::build(Vec::new());
        assert!(index.is_empty());
        assert_eq!(index.containing(Point::new(0.0, 0.0)), None);
    }
}

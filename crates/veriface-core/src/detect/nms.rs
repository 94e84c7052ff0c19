//! Non-maximum suppression over scored boxes.

use crate::domain::BoundingBox;

/// Overlap metric for suppression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressionMode {
    /// Intersection over union.
    Union,
    /// Intersection over the smaller box's area.
    Min,
}

/// Greedy NMS: keep the highest-scored box, drop everything overlapping it
/// at or above the threshold, repeat.
#[derive(Debug, Clone, Copy)]
pub struct Nms {
    pub overlap_threshold: f32,
    pub mode: SuppressionMode,
}

impl Nms {
    #[must_use]
    pub const fn union(overlap_threshold: f32) -> Self {
        Self {
            overlap_threshold,
            mode: SuppressionMode::Union,
        }
    }

    #[must_use]
    pub const fn min(overlap_threshold: f32) -> Self {
        Self {
            overlap_threshold,
            mode: SuppressionMode::Min,
        }
    }

    /// Suppresses `items`, reading each item's box through `bbox_of`.
    /// Returns survivors in descending score order.
    #[must_use]
    pub fn suppress<T, F>(&self, mut items: Vec<T>, bbox_of: F) -> Vec<T>
    where
        F: Fn(&T) -> &BoundingBox,
    {
        items.sort_by(|a, b| {
            bbox_of(b)
                .score
                .partial_cmp(&bbox_of(a).score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut kept: Vec<T> = Vec::with_capacity(items.len());
        for item in items {
            let bbox = bbox_of(&item);
            let overlaps = kept.iter().any(|k| {
                let other = bbox_of(k);
                let overlap = match self.mode {
                    SuppressionMode::Union => bbox.iou(other),
                    SuppressionMode::Min => bbox.iou_min(other),
                };
                overlap >= self.overlap_threshold
            });
            if !overlaps {
                kept.push(item);
            }
        }
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boxed(x1: f32, y1: f32, side: f32, score: f32) -> BoundingBox {
        BoundingBox::new(x1, y1, x1 + side - 1.0, y1 + side - 1.0, score)
    }

    #[test]
    fn keeps_highest_of_identical_boxes() {
        let boxes = vec![
            boxed(0.0, 0.0, 10.0, 0.7),
            boxed(0.0, 0.0, 10.0, 0.9),
            boxed(0.0, 0.0, 10.0, 0.8),
        ];
        let kept = Nms::union(0.5).suppress(boxes, |b| b);
        assert_eq!(kept.len(), 1);
        assert!((kept[0].score - 0.9).abs() < f32::EPSILON);
    }

    #[test]
    fn keeps_disjoint_boxes() {
        let boxes = vec![boxed(0.0, 0.0, 10.0, 0.9), boxed(50.0, 50.0, 10.0, 0.8)];
        let kept = Nms::union(0.5).suppress(boxes, |b| b);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn min_mode_suppresses_nested_boxes() {
        // The small box is fully inside the large one. Union overlap is low
        // but min-mode overlap is 1.0.
        let boxes = vec![boxed(0.0, 0.0, 40.0, 0.9), boxed(10.0, 10.0, 10.0, 0.8)];
        assert_eq!(Nms::union(0.7).suppress(boxes.clone(), |b| b).len(), 2);
        assert_eq!(Nms::min(0.7).suppress(boxes, |b| b).len(), 1);
    }

    #[test]
    fn applying_twice_is_a_no_op() {
        let boxes = vec![
            boxed(0.0, 0.0, 10.0, 0.9),
            boxed(4.0, 4.0, 10.0, 0.8),
            boxed(30.0, 30.0, 10.0, 0.7),
            boxed(33.0, 30.0, 10.0, 0.6),
        ];
        let nms = Nms::union(0.3);
        let once = nms.suppress(boxes, |b| b);
        let twice = nms.suppress(once.clone(), |b| b);
        assert_eq!(once, twice);
    }

    #[test]
    fn result_is_sorted_by_score() {
        let boxes = vec![
            boxed(0.0, 0.0, 10.0, 0.5),
            boxed(50.0, 0.0, 10.0, 0.95),
            boxed(0.0, 50.0, 10.0, 0.75),
        ];
        let kept = Nms::union(0.5).suppress(boxes, |b| b);
        let scores: Vec<f32> = kept.iter().map(|b| b.score).collect();
        assert_eq!(scores, vec![0.95, 0.75, 0.5]);
    }
}

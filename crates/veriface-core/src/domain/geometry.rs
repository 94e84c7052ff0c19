//! Bounding boxes and facial landmarks in source-image pixel coordinates.

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]

use serde::{Deserialize, Serialize};

/// Axis-aligned face box. `x2`/`y2` are inclusive, so `width = x2 - x1 + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    /// Detection confidence in `[0, 1]`.
    pub score: f32,
}

impl BoundingBox {
    #[must_use]
    pub const fn new(x1: f32, y1: f32, x2: f32, y2: f32, score: f32) -> Self {
        Self {
            x1,
            y1,
            x2,
            y2,
            score,
        }
    }

    #[must_use]
    pub fn width(&self) -> f32 {
        self.x2 - self.x1 + 1.0
    }

    #[must_use]
    pub fn height(&self) -> f32 {
        self.y2 - self.y1 + 1.0
    }

    #[must_use]
    pub fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    /// Intersection area with `other`, zero when disjoint.
    #[must_use]
    pub fn intersection(&self, other: &Self) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);
        (ix2 - ix1 + 1.0).max(0.0) * (iy2 - iy1 + 1.0).max(0.0)
    }

    /// Intersection over union.
    #[must_use]
    pub fn iou(&self, other: &Self) -> f32 {
        let inter = self.intersection(other);
        let union = self.area() + other.area() - inter;
        if union > 0.0 {
            inter / union
        } else {
            0.0
        }
    }

    /// Intersection over the smaller box's area.
    #[must_use]
    pub fn iou_min(&self, other: &Self) -> f32 {
        let inter = self.intersection(other);
        let min_area = self.area().min(other.area());
        if min_area > 0.0 {
            inter / min_area
        } else {
            0.0
        }
    }

    /// Applies the per-box regression offsets `(tx1, ty1, tx2, ty2)`:
    /// each corner moves by `offset * side_length`.
    #[must_use]
    pub fn calibrated(&self, offsets: [f32; 4]) -> Self {
        let w = self.width();
        let h = self.height();
        Self {
            x1: self.x1 + offsets[0] * w,
            y1: self.y1 + offsets[1] * h,
            x2: self.x2 + offsets[2] * w,
            y2: self.y2 + offsets[3] * h,
            score: self.score,
        }
    }

    /// Expands the shorter side to match the longer one, keeping the center
    /// fixed.
    #[must_use]
    pub fn squared(&self) -> Self {
        let side = self.width().max(self.height());
        let cx = (self.x1 + self.x2) * 0.5;
        let cy = (self.y1 + self.y2) * 0.5;
        let half = (side - 1.0) * 0.5;
        Self {
            x1: cx - half,
            y1: cy - half,
            x2: cx + half,
            y2: cy + half,
            score: self.score,
        }
    }

    /// Rounds all corners to integral pixel coordinates.
    #[must_use]
    pub fn rounded(&self) -> Self {
        Self {
            x1: self.x1.round(),
            y1: self.y1.round(),
            x2: self.x2.round(),
            y2: self.y2.round(),
            score: self.score,
        }
    }

    /// Clamps the box into `[0, width-1] x [0, height-1]`.
    #[must_use]
    pub fn clamped(&self, width: u32, height: u32) -> Self {
        let max_x = (width - 1) as f32;
        let max_y = (height - 1) as f32;
        Self {
            x1: self.x1.clamp(0.0, max_x),
            y1: self.y1.clamp(0.0, max_y),
            x2: self.x2.clamp(0.0, max_x),
            y2: self.y2.clamp(0.0, max_y),
            score: self.score,
        }
    }

    /// A box degenerates when clamping or calibration collapses a side.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.x1 < self.x2 && self.y1 < self.y2
    }
}

/// The ordered five-point landmark constellation:
/// left eye, right eye, nose, mouth-left, mouth-right.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmarks {
    pub points: [(f32, f32); 5],
}

impl Landmarks {
    #[must_use]
    pub const fn new(points: [(f32, f32); 5]) -> Self {
        Self { points }
    }

    /// Builds landmarks from a detector output row laid out as
    /// `[x0..x4, y0..y4]` in box-relative `[0, 1]` coordinates, projected
    /// into the source frame of `bbox`.
    #[must_use]
    pub fn from_box_relative(row: &[f32], bbox: &BoundingBox) -> Self {
        debug_assert!(row.len() >= 10);
        let w = bbox.width();
        let h = bbox.height();
        let mut points = [(0.0f32, 0.0f32); 5];
        for (i, point) in points.iter_mut().enumerate() {
            *point = (bbox.x1 + row[i] * w, bbox.y1 + row[i + 5] * h);
        }
        Self { points }
    }

    #[must_use]
    pub const fn left_eye(&self) -> (f32, f32) {
        self.points[0]
    }

    #[must_use]
    pub const fn right_eye(&self) -> (f32, f32) {
        self.points[1]
    }

    #[must_use]
    pub const fn nose(&self) -> (f32, f32) {
        self.points[2]
    }
}

/// A detected face: box plus landmarks when the output stage produced them.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceDetection {
    pub bbox: BoundingBox,
    pub landmarks: Option<Landmarks>,
}

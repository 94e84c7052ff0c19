//! Sharpness gate based on Laplacian variance.
//!
//! The RGB input is converted to grayscale with (0.299, 0.587, 0.114) luma
//! weights and convolved with the 3×3 Laplacian kernel
//! `[[0, 1, 0], [1, -4, 1], [0, 1, 0]]`. The score is the mean of squared
//! responses over all pixels: the response map is zero at the one-pixel
//! border where the kernel does not fit, and those zeros stay in the
//! denominator. A uniform frame scores exactly 0.

use crate::domain::Frame;

/// Sharpness gate tuning.
///
/// The two profiles belong to different call sites: the still-image
/// pipeline gates at 45, the capture-time preview check at 100.
#[derive(Debug, Clone)]
pub struct SharpnessConfig {
    /// Minimum Laplacian variance to pass.
    pub threshold: f64,
    /// Reason string carried by the failing verdict.
    pub failure_reason: &'static str,
}

impl SharpnessConfig {
    /// Still-image profile.
    #[must_use]
    pub const fn batch() -> Self {
        Self {
            threshold: 45.0,
            failure_reason: "Image is blurry",
        }
    }

    /// Capture-time profile with the stricter threshold.
    #[must_use]
    pub const fn realtime() -> Self {
        Self {
            threshold: 100.0,
            failure_reason: "Image is too blurry",
        }
    }
}

impl Default for SharpnessConfig {
    fn default() -> Self {
        Self::batch()
    }
}

/// Measured sharpness plus the gate decision.
#[derive(Debug, Clone, Copy)]
pub struct SharpnessAssessment {
    pub variance: f64,
    pub is_sharp: bool,
}

/// The quality gate itself.
#[derive(Debug, Clone, Default)]
pub struct SharpnessGate {
    config: SharpnessConfig,
}

impl SharpnessGate {
    #[must_use]
    pub const fn new(config: SharpnessConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub const fn config(&self) -> &SharpnessConfig {
        &self.config
    }

    /// Scores the frame and applies the threshold (pass iff
    /// `variance >= threshold`).
    #[must_use]
    pub fn evaluate(&self, frame: &Frame) -> SharpnessAssessment {
        let variance = laplacian_variance(frame);
        SharpnessAssessment {
            variance,
            is_sharp: variance >= self.config.threshold,
        }
    }
}

/// Mean of squared Laplacian responses over all pixels.
#[must_use]
pub fn laplacian_variance(frame: &Frame) -> f64 {
    let luma = frame.luma_plane();
    let (height, width) = luma.dim();
    if width < 3 || height < 3 {
        return 0.0;
    }

    let mut sum_sq = 0.0f64;
    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let center = f64::from(luma[[y, x]]);
            let response = f64::from(luma[[y - 1, x]])
                + f64::from(luma[[y + 1, x]])
                + f64::from(luma[[y, x - 1]])
                + f64::from(luma[[y, x + 1]])
                - 4.0 * center;
            sum_sq += response * response;
        }
    }

    sum_sq / (width as f64 * height as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn uniform(side: u32, value: u8) -> Frame {
        Frame::new(RgbaImage::from_pixel(
            side,
            side,
            Rgba([value, value, value, 255]),
        ))
    }

    fn checkerboard(side: u32, cell: u32) -> Frame {
        Frame::new(RgbaImage::from_fn(side, side, |x, y| {
            if (x / cell + y / cell) % 2 == 0 {
                Rgba([255, 255, 255, 255])
            } else {
                Rgba([0, 0, 0, 255])
            }
        }))
    }

    #[test]
    fn uniform_frame_scores_exactly_zero() {
        assert!(laplacian_variance(&uniform(224, 128)).abs() < f64::EPSILON);
        assert!(laplacian_variance(&uniform(224, 255)).abs() < f64::EPSILON);
    }

    #[test]
    fn checkerboard_scores_high() {
        let variance = laplacian_variance(&checkerboard(128, 8));
        assert!(variance > 1000.0, "variance = {variance}");
    }

    #[test]
    fn gradient_scores_low() {
        let frame = Frame::new(RgbaImage::from_fn(128, 128, |x, _| {
            let v = (x * 2) as u8;
            Rgba([v, v, v, 255])
        }));
        let variance = laplacian_variance(&frame);
        assert!(variance < 45.0, "variance = {variance}");
    }

    #[test]
    fn tiny_frame_scores_zero() {
        assert!(laplacian_variance(&uniform(2, 77)).abs() < f64::EPSILON);
    }

    #[test]
    fn batch_gate_fails_uniform_frames() {
        let gate = SharpnessGate::default();
        let assessment = gate.evaluate(&uniform(224, 128));
        assert!(!assessment.is_sharp);
        assert!(assessment.variance.abs() < f64::EPSILON);
        assert_eq!(gate.config().failure_reason, "Image is blurry");
    }

    #[test]
    fn batch_gate_passes_checkerboard() {
        let gate = SharpnessGate::default();
        assert!(gate.evaluate(&checkerboard(224, 8)).is_sharp);
    }

    #[test]
    fn realtime_profile_is_stricter() {
        let realtime = SharpnessConfig::realtime();
        assert!(realtime.threshold > SharpnessConfig::batch().threshold);
        assert_eq!(realtime.failure_reason, "Image is too blurry");
    }

    #[test]
    fn pass_is_inclusive_at_the_threshold() {
        // A synthetic frame tuned so its variance brackets a custom
        // threshold pins the >= semantics.
        let frame = checkerboard(64, 16);
        let variance = laplacian_variance(&frame);
        let gate = SharpnessGate::new(SharpnessConfig {
            threshold: variance,
            failure_reason: "Image is blurry",
        });
        assert!(gate.evaluate(&frame).is_sharp);
    }
}

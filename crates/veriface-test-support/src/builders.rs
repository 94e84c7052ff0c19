//! Synthetic frame builders for pipeline tests.

use image::{Rgba, RgbaImage};
use veriface_core::Frame;

/// Builds frames with known gate behavior.
///
/// Sizes default to 224 so the classifier-stage resize is the identity and
/// statistics are exact.
pub struct SyntheticFrameBuilder;

impl SyntheticFrameBuilder {
    /// A solid-color frame.
    #[must_use]
    pub fn uniform(side: u32, rgb: [u8; 3]) -> Frame {
        Frame::new(RgbaImage::from_pixel(
            side,
            side,
            Rgba([rgb[0], rgb[1], rgb[2], 255]),
        ))
    }

    /// Pure white 224×224: zero sharpness, maximal brightness.
    #[must_use]
    pub fn white() -> Frame {
        Self::uniform(224, [255, 255, 255])
    }

    /// Uniform mid-gray 224×224: zero sharpness.
    #[must_use]
    pub fn gray() -> Frame {
        Self::uniform(224, [128, 128, 128])
    }

    /// High-contrast checkerboard: passes the sharpness gate, fails the
    /// albedo outlier rule (two-valued channels have no upper outliers).
    #[must_use]
    pub fn checkerboard(side: u32, cell: u32) -> Frame {
        Frame::new(RgbaImage::from_fn(side, side, |x, y| {
            if (x / cell + y / cell) % 2 == 0 {
                Rgba([255, 255, 255, 255])
            } else {
                Rgba([0, 0, 0, 255])
            }
        }))
    }

    /// Mid-gray base scattered with bright pixels: sharp enough for the
    /// quality gate and carries upper-bound outliers in every channel, so it
    /// walks through both deterministic gates.
    #[must_use]
    pub fn speckled(side: u32, base: u8) -> Frame {
        let mut image = RgbaImage::from_pixel(side, side, Rgba([base, base, base, 255]));
        for i in 0..(side / 4) {
            let x = (i * 7 + 3) % side;
            let y = (i * 13 + 5) % side;
            image.put_pixel(x, y, Rgba([250, 250, 250, 255]));
        }
        Frame::new(image)
    }

    /// Standard gate-passing frame.
    #[must_use]
    pub fn gate_passing() -> Frame {
        Self::speckled(224, 100)
    }

    /// Overwrites a rectangle, e.g. to simulate a mask over the lower face.
    #[must_use]
    pub fn with_rectangle(frame: &Frame, x: u32, y: u32, w: u32, h: u32, rgb: [u8; 3]) -> Frame {
        let mut image = frame.image().clone();
        for py in y..(y + h).min(image.height()) {
            for px in x..(x + w).min(image.width()) {
                image.put_pixel(px, py, Rgba([rgb[0], rgb[1], rgb[2], 255]));
            }
        }
        Frame::new(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_has_requested_color() {
        let frame = SyntheticFrameBuilder::uniform(100, [1, 2, 3]);
        assert_eq!(frame.image().get_pixel(50, 50).0[..3], [1, 2, 3]);
    }

    #[test]
    fn speckled_contains_bright_pixels() {
        let frame = SyntheticFrameBuilder::speckled(224, 100);
        let bright = frame.image().pixels().filter(|p| p[0] > 200).count();
        assert!(bright > 10);
    }

    #[test]
    fn rectangle_overwrites_region() {
        let frame = SyntheticFrameBuilder::gate_passing();
        let masked = SyntheticFrameBuilder::with_rectangle(&frame, 50, 150, 112, 40, [0, 0, 0]);
        assert_eq!(masked.image().get_pixel(100, 170).0[..3], [0, 0, 0]);
        assert_eq!(
            masked.image().get_pixel(10, 10).0[..3],
            frame.image().get_pixel(10, 10).0[..3]
        );
    }
}

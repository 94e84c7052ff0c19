//! Frame: the pipeline's image buffer.
//!
//! Owns an 8-bit RGBA raster and produces the resized/cropped/padded views
//! and float tensor layouts the inference stages consume. The alpha channel
//! is carried but ignored by every numeric conversion.

// Pixel loops convert u8 -> f32 -> usize freely.
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]

use image::{imageops, imageops::FilterType, Rgba, RgbaImage};
use ndarray::{Array2, Array4};

use super::error::PipelineError;
use super::geometry::BoundingBox;

/// Frames with `min(W, H) <= MIN_DIMENSION` are rejected at the pipeline
/// entry.
pub const MIN_DIMENSION: u32 = 64;
/// Frames with `max(W, H) >= MAX_DIMENSION` are rejected at the pipeline
/// entry.
pub const MAX_DIMENSION: u32 = 4096;

/// Luma weights used for grayscale conversion in the sharpness gate.
const LUMA_WEIGHTS: [f32; 3] = [0.299, 0.587, 0.114];

/// Resize interpolation quality.
///
/// `Bilinear` is required for the refine/output detector stages and the
/// 112×112 embedding input; `Nearest` is acceptable for the detector's
/// stage-1 image pyramid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    Bilinear,
    Nearest,
}

impl Interpolation {
    const fn filter(self) -> FilterType {
        match self {
            Self::Bilinear => FilterType::Triangle,
            Self::Nearest => FilterType::Nearest,
        }
    }
}

/// Immutable 8-bit RGBA raster.
#[derive(Debug, Clone)]
pub struct Frame {
    image: RgbaImage,
}

impl Frame {
    /// Wraps an already-decoded raster. No size-bound validation is applied;
    /// intermediate crops and aligned faces are smaller than the pipeline's
    /// input bounds.
    #[must_use]
    pub fn new(image: RgbaImage) -> Self {
        Self { image }
    }

    /// Constructs a frame from raw RGBA bytes, validating the pipeline's
    /// acceptance bounds.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidImage`] if the byte length does not
    /// match `width * height * 4` or the dimensions are out of bounds.
    pub fn from_rgba_bytes(bytes: Vec<u8>, width: u32, height: u32) -> Result<Self, PipelineError> {
        let expected = width as usize * height as usize * 4;
        if bytes.len() != expected {
            return Err(PipelineError::InvalidImage(format!(
                "RGBA buffer is {} bytes, expected {expected} for {width}x{height}",
                bytes.len()
            )));
        }
        let image = RgbaImage::from_raw(width, height, bytes).ok_or_else(|| {
            PipelineError::InvalidImage(format!("cannot build {width}x{height} RGBA raster"))
        })?;
        let frame = Self { image };
        frame.validate_dimensions()?;
        Ok(frame)
    }

    /// Checks the acceptance bounds: `min(W, H) > 64` and `max(W, H) < 4096`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidImage`] when out of bounds.
    pub fn validate_dimensions(&self) -> Result<(), PipelineError> {
        let (w, h) = self.image.dimensions();
        if w.min(h) <= MIN_DIMENSION {
            return Err(PipelineError::InvalidImage(format!(
                "{w}x{h} is below the minimum dimension of {MIN_DIMENSION}"
            )));
        }
        if w.max(h) >= MAX_DIMENSION {
            return Err(PipelineError::InvalidImage(format!(
                "{w}x{h} exceeds the maximum dimension of {MAX_DIMENSION}"
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    #[must_use]
    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    #[must_use]
    pub fn into_image(self) -> RgbaImage {
        self.image
    }

    /// Resizes to `width` x `height`. Resizing to the current size returns
    /// an identical frame.
    #[must_use]
    pub fn resize(&self, width: u32, height: u32, interpolation: Interpolation) -> Self {
        if (width, height) == self.image.dimensions() {
            return self.clone();
        }
        Self {
            image: imageops::resize(&self.image, width, height, interpolation.filter()),
        }
    }

    /// Crops the rectangle clipped to the frame bounds.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidImage`] if the clipped area is empty.
    pub fn crop(&self, x: u32, y: u32, width: u32, height: u32) -> Result<Self, PipelineError> {
        let (img_w, img_h) = self.image.dimensions();
        if x >= img_w || y >= img_h {
            return Err(PipelineError::InvalidImage(format!(
                "crop origin ({x}, {y}) outside {img_w}x{img_h} frame"
            )));
        }
        let width = width.min(img_w - x);
        let height = height.min(img_h - y);
        if width == 0 || height == 0 {
            return Err(PipelineError::InvalidImage(
                "crop rectangle has zero area".into(),
            ));
        }
        Ok(Self {
            image: imageops::crop_imm(&self.image, x, y, width, height).to_image(),
        })
    }

    /// Extracts the (inclusive) integer bounding box, zero-filling any part
    /// that falls outside the frame. Used by the detector's refine stages,
    /// whose calibrated boxes may overhang the image.
    #[must_use]
    pub fn crop_box_padded(&self, bbox: &BoundingBox) -> Self {
        let x1 = bbox.x1.round() as i64;
        let y1 = bbox.y1.round() as i64;
        let x2 = bbox.x2.round() as i64;
        let y2 = bbox.y2.round() as i64;
        let out_w = (x2 - x1 + 1).max(1) as u32;
        let out_h = (y2 - y1 + 1).max(1) as u32;

        let (img_w, img_h) = self.image.dimensions();
        let mut out = RgbaImage::from_pixel(out_w, out_h, Rgba([0, 0, 0, 255]));
        for oy in 0..out_h {
            let sy = y1 + i64::from(oy);
            if sy < 0 || sy >= i64::from(img_h) {
                continue;
            }
            for ox in 0..out_w {
                let sx = x1 + i64::from(ox);
                if sx < 0 || sx >= i64::from(img_w) {
                    continue;
                }
                out.put_pixel(ox, oy, *self.image.get_pixel(sx as u32, sy as u32));
            }
        }
        Self { image: out }
    }

    /// Crops a centered `size` x `size` square.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidImage`] if the frame is smaller than
    /// `size` in either dimension.
    pub fn center_crop(&self, size: u32) -> Result<Self, PipelineError> {
        let (w, h) = self.image.dimensions();
        if w < size || h < size {
            return Err(PipelineError::InvalidImage(format!(
                "{w}x{h} frame too small for a {size}x{size} center crop"
            )));
        }
        self.crop((w - size) / 2, (h - size) / 2, size, size)
    }

    /// Converts to an NCHW float tensor normalized per channel as
    /// `(pixel / 255 - mean) / std`.
    #[must_use]
    pub fn to_chw_tensor(&self, mean: [f32; 3], std: [f32; 3]) -> Array4<f32> {
        let (w, h) = self.image.dimensions();
        Array4::from_shape_fn((1, 3, h as usize, w as usize), |(_, c, y, x)| {
            let px = self.image.get_pixel(x as u32, y as u32)[c];
            (f32::from(px) / 255.0 - mean[c]) / std[c]
        })
    }

    /// Converts to an NCHW float tensor with the detector/embedder
    /// normalization `(pixel - 127.5) * 0.0078125`.
    #[must_use]
    pub fn to_chw_tensor_scaled(&self) -> Array4<f32> {
        let (w, h) = self.image.dimensions();
        Array4::from_shape_fn((1, 3, h as usize, w as usize), |(_, c, y, x)| {
            (f32::from(self.image.get_pixel(x as u32, y as u32)[c]) - 127.5) * 0.007_812_5
        })
    }

    /// Converts to an HWC float tensor normalized per channel as
    /// `(pixel / 255 - mean) / std`. Intermediate-work layout; model inputs
    /// use the NCHW variants.
    #[must_use]
    pub fn to_hwc_tensor(&self, mean: [f32; 3], std: [f32; 3]) -> ndarray::Array3<f32> {
        let (w, h) = self.image.dimensions();
        ndarray::Array3::from_shape_fn((h as usize, w as usize, 3), |(y, x, c)| {
            let px = self.image.get_pixel(x as u32, y as u32)[c];
            (f32::from(px) / 255.0 - mean[c]) / std[c]
        })
    }

    /// Grayscale plane with (0.299, 0.587, 0.114) luma weights, in 0..255.
    #[must_use]
    pub fn luma_plane(&self) -> Array2<f32> {
        let (w, h) = self.image.dimensions();
        Array2::from_shape_fn((h as usize, w as usize), |(y, x)| {
            let px = self.image.get_pixel(x as u32, y as u32);
            LUMA_WEIGHTS[0] * f32::from(px[0])
                + LUMA_WEIGHTS[1] * f32::from(px[1])
                + LUMA_WEIGHTS[2] * f32::from(px[2])
        })
    }

    /// One color channel as raw 0..255 doubles, row-major.
    #[must_use]
    pub fn channel_plane_f64(&self, channel: usize) -> Vec<f64> {
        debug_assert!(channel < 3);
        self.image
            .pixels()
            .map(|px| f64::from(px[channel]))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Frame {
        Frame::new(RgbaImage::from_pixel(
            width,
            height,
            Rgba([rgb[0], rgb[1], rgb[2], 255]),
        ))
    }

    #[test]
    fn from_rgba_bytes_validates_length() {
        let err = Frame::from_rgba_bytes(vec![0u8; 10], 100, 100).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidImage(_)));
    }

    #[test]
    fn rejects_lower_bound_inclusive() {
        let bytes = vec![0u8; 64 * 64 * 4];
        let err = Frame::from_rgba_bytes(bytes, 64, 64).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidImage(_)));

        let bytes = vec![0u8; 65 * 65 * 4];
        assert!(Frame::from_rgba_bytes(bytes, 65, 65).is_ok());
    }

    #[test]
    fn rejects_upper_bound_exclusive() {
        // 4095 is accepted, 4096 is not. Use a thin strip to keep the
        // allocation small.
        let bytes = vec![0u8; 4095 * 65 * 4];
        assert!(Frame::from_rgba_bytes(bytes, 4095, 65).is_ok());

        let bytes = vec![0u8; 4096 * 65 * 4];
        let err = Frame::from_rgba_bytes(bytes, 4096, 65).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidImage(_)));
    }

    #[test]
    fn resize_to_same_size_is_identity() {
        let frame = solid(100, 80, [10, 200, 30]);
        let resized = frame.resize(100, 80, Interpolation::Bilinear);
        assert_eq!(frame.image().as_raw(), resized.image().as_raw());
    }

    #[test]
    fn resize_changes_dimensions() {
        let frame = solid(100, 80, [10, 200, 30]);
        let resized = frame.resize(50, 40, Interpolation::Bilinear);
        assert_eq!((resized.width(), resized.height()), (50, 40));
    }

    #[test]
    fn crop_clips_to_bounds() {
        let frame = solid(100, 100, [1, 2, 3]);
        let cropped = frame.crop(90, 90, 50, 50).unwrap();
        assert_eq!((cropped.width(), cropped.height()), (10, 10));
    }

    #[test]
    fn crop_outside_fails() {
        let frame = solid(100, 100, [1, 2, 3]);
        assert!(frame.crop(100, 0, 10, 10).is_err());
    }

    #[test]
    fn padded_crop_zero_fills() {
        let frame = solid(100, 100, [200, 200, 200]);
        let bbox = BoundingBox::new(-5.0, -5.0, 4.0, 4.0, 1.0);
        let crop = frame.crop_box_padded(&bbox);
        assert_eq!((crop.width(), crop.height()), (10, 10));
        // Top-left quadrant is outside the source: black.
        assert_eq!(crop.image().get_pixel(0, 0).0[..3], [0, 0, 0]);
        // Bottom-right quadrant overlaps the source.
        assert_eq!(crop.image().get_pixel(9, 9).0[..3], [200, 200, 200]);
    }

    #[test]
    fn center_crop_is_centered() {
        let mut image = RgbaImage::from_pixel(100, 100, Rgba([0, 0, 0, 255]));
        image.put_pixel(50, 50, Rgba([255, 0, 0, 255]));
        let crop = Frame::new(image).center_crop(10).unwrap();
        assert_eq!(crop.image().get_pixel(5, 5).0[0], 255);
    }

    #[test]
    fn scaled_tensor_normalization() {
        let frame = solid(70, 70, [127, 127, 127]);
        let tensor = frame.to_chw_tensor_scaled();
        assert_eq!(tensor.shape(), &[1, 3, 70, 70]);
        let expected = (127.0 - 127.5) * 0.007_812_5;
        assert!((tensor[[0, 0, 0, 0]] - expected).abs() < 1e-6);
    }

    #[test]
    fn chw_tensor_applies_per_channel_stats() {
        let frame = solid(70, 70, [255, 0, 128]);
        let mean = [0.485, 0.456, 0.406];
        let std = [0.229, 0.224, 0.225];
        let tensor = frame.to_chw_tensor(mean, std);
        assert!((tensor[[0, 0, 0, 0]] - (1.0 - 0.485) / 0.229).abs() < 1e-5);
        assert!((tensor[[0, 1, 0, 0]] - (0.0 - 0.456) / 0.224).abs() < 1e-5);
        assert!((tensor[[0, 2, 0, 0]] - (128.0 / 255.0 - 0.406) / 0.225).abs() < 1e-5);
    }

    #[test]
    fn hwc_tensor_matches_chw_layout() {
        let frame = solid(70, 70, [10, 20, 30]);
        let mean = [0.0, 0.0, 0.0];
        let std = [1.0, 1.0, 1.0];
        let hwc = frame.to_hwc_tensor(mean, std);
        let chw = frame.to_chw_tensor(mean, std);
        assert_eq!(hwc.shape(), &[70, 70, 3]);
        for c in 0..3 {
            assert!((hwc[[5, 9, c]] - chw[[0, c, 5, 9]]).abs() < f32::EPSILON);
        }
    }

    #[test]
    fn luma_uses_rec601_weights() {
        let frame = solid(70, 70, [100, 50, 200]);
        let luma = frame.luma_plane();
        let expected = 0.299 * 100.0 + 0.587 * 50.0 + 0.114 * 200.0;
        assert!((luma[[0, 0]] - expected).abs() < 1e-4);
    }

    #[test]
    fn channel_plane_extracts_raw_values() {
        let frame = solid(70, 70, [7, 77, 177]);
        assert!((frame.channel_plane_f64(1)[0] - 77.0).abs() < f64::EPSILON);
        assert_eq!(frame.channel_plane_f64(2).len(), 70 * 70);
    }
}

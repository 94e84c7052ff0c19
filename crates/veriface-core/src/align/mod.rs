//! Face alignment via a 4-DOF similarity transform.
//!
//! The five detected landmarks are mapped onto a fixed reference
//! constellation by a least-squares similarity (isotropic scale, rotation,
//! translation), estimated in f64. A reflective candidate is also fitted and
//! the transform with the smaller Euclidean residual wins. The chosen
//! transform's inverse drives a bilinear warp into a 112×112 crop with black
//! padding outside the source domain.

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]

use image::{Rgba, RgbaImage};

use crate::domain::{Frame, Landmarks, PipelineError};

/// Side length of the aligned output crop.
pub const ALIGNED_SIZE: u32 = 112;

/// Reference landmark positions for a 112×112 output:
/// left eye, right eye, nose, mouth-left, mouth-right.
pub const REFERENCE_LANDMARKS: [(f64, f64); 5] = [
    (30.29, 51.70),
    (65.53, 51.50),
    (48.03, 71.74),
    (33.55, 92.37),
    (62.73, 92.20),
];

/// Maximum forward/inverse round-trip error at the reference points before
/// the transform is considered degenerate.
const ROUNDTRIP_TOLERANCE: f64 = 1.0;

/// An estimated similarity transform between landmark frames.
#[derive(Debug, Clone)]
pub struct AlignmentTransform {
    /// Row-convention 3×3 matrix mapping source points to the reference
    /// frame: `[x y 1] · M = [u v 1]`.
    to_reference: [[f64; 3]; 3],
    /// Column-convention 2×3 sampling matrix (reference frame to source):
    /// `[[a, b, tx], [c, d, ty]]`.
    sampling: [[f64; 3]; 2],
    /// Summed Euclidean residual of the fit against the reference points.
    pub residual: f64,
    /// Whether the mirrored candidate won.
    pub reflective: bool,
}

impl AlignmentTransform {
    /// Maps a source point into the reference frame.
    #[must_use]
    pub fn map_to_reference(&self, point: (f64, f64)) -> (f64, f64) {
        let (x, y) = point;
        let m = &self.to_reference;
        (
            x * m[0][0] + y * m[1][0] + m[2][0],
            x * m[0][1] + y * m[1][1] + m[2][1],
        )
    }

    /// Maps a reference-frame point back into the source image.
    #[must_use]
    pub fn map_to_source(&self, point: (f64, f64)) -> (f64, f64) {
        let (u, v) = point;
        let s = &self.sampling;
        (
            s[0][0] * u + s[0][1] * v + s[0][2],
            s[1][0] * u + s[1][1] * v + s[1][2],
        )
    }
}

/// 4-DOF parameters of the non-reflective fit.
#[derive(Debug, Clone, Copy)]
struct SimilarityParams {
    sc: f64,
    ss: f64,
    tx: f64,
    ty: f64,
}

/// Estimates the similarity mapping `src` onto `dst` by least squares.
///
/// Builds the 2M×4 system with rows `[x y 1 0]` (target `u`) and
/// `[y -x 0 1]` (target `v`), solves the normal equations `AᵀA r = Aᵀb`
/// with partially-pivoted Gaussian elimination, and repeats against
/// y-axis-mirrored targets for the reflective candidate.
fn estimate_similarity(
    src: &[(f64, f64); 5],
    dst: &[(f64, f64); 5],
) -> Option<AlignmentTransform> {
    let direct = solve_params(src, dst).map(row_matrix);

    let mirrored_dst: [(f64, f64); 5] = std::array::from_fn(|i| (-dst[i].0, dst[i].1));
    // Un-mirror the fitted matrix so it lands in the true reference frame.
    let mirrored = solve_params(src, &mirrored_dst)
        .map(row_matrix)
        .map(|m| mat_mul(&m, &[[-1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]));

    let candidates = [(direct, false), (mirrored, true)];
    let mut best: Option<AlignmentTransform> = None;
    for (matrix, reflective) in candidates {
        let Some(to_reference) = matrix else {
            continue;
        };
        let Some(inverse) = invert_3x3(&to_reference) else {
            continue;
        };
        let sampling = [
            [inverse[0][0], inverse[1][0], inverse[2][0]],
            [inverse[0][1], inverse[1][1], inverse[2][1]],
        ];
        let transform = AlignmentTransform {
            to_reference,
            sampling,
            residual: residual(&to_reference, src, dst),
            reflective,
        };
        let better = best
            .as_ref()
            .map_or(true, |b| transform.residual < b.residual);
        if better {
            best = Some(transform);
        }
    }
    best
}

fn solve_params(src: &[(f64, f64); 5], dst: &[(f64, f64); 5]) -> Option<SimilarityParams> {
    // Accumulate AᵀA and Aᵀb without materializing the 10×4 design matrix.
    let mut ata = [[0.0f64; 4]; 4];
    let mut atb = [0.0f64; 4];

    for i in 0..5 {
        let (x, y) = src[i];
        let (u, v) = dst[i];
        let r1 = [x, y, 1.0, 0.0];
        let r2 = [y, -x, 0.0, 1.0];
        for j in 0..4 {
            for k in 0..4 {
                ata[j][k] += r1[j] * r1[k] + r2[j] * r2[k];
            }
            atb[j] += r1[j] * u + r2[j] * v;
        }
    }

    let x = solve_4x4(&ata, &atb)?;
    Some(SimilarityParams {
        sc: x[0],
        ss: x[1],
        tx: x[2],
        ty: x[3],
    })
}

/// Row-convention matrix for the solved parameters:
/// `[x y 1] · M = (sc·x + ss·y + tx, -ss·x + sc·y + ty)`.
fn row_matrix(p: SimilarityParams) -> [[f64; 3]; 3] {
    [
        [p.sc, -p.ss, 0.0],
        [p.ss, p.sc, 0.0],
        [p.tx, p.ty, 1.0],
    ]
}

/// Gaussian elimination with partial pivoting on the 4×4 normal equations.
fn solve_4x4(a: &[[f64; 4]; 4], b: &[f64; 4]) -> Option<[f64; 4]> {
    let mut m = [[0.0f64; 5]; 4];
    for i in 0..4 {
        m[i][..4].copy_from_slice(&a[i]);
        m[i][4] = b[i];
    }

    for col in 0..4 {
        let mut pivot_row = col;
        let mut pivot_val = m[col][col].abs();
        for row in (col + 1)..4 {
            if m[row][col].abs() > pivot_val {
                pivot_val = m[row][col].abs();
                pivot_row = row;
            }
        }
        if pivot_val < 1e-12 {
            return None;
        }
        m.swap(col, pivot_row);

        for row in (col + 1)..4 {
            let factor = m[row][col] / m[col][col];
            for j in col..5 {
                m[row][j] -= factor * m[col][j];
            }
        }
    }

    let mut x = [0.0f64; 4];
    for i in (0..4).rev() {
        x[i] = m[i][4];
        for j in (i + 1)..4 {
            x[i] -= m[i][j] * x[j];
        }
        x[i] /= m[i][i];
    }
    Some(x)
}

fn mat_mul(a: &[[f64; 3]; 3], b: &[[f64; 3]; 3]) -> [[f64; 3]; 3] {
    let mut out = [[0.0f64; 3]; 3];
    for i in 0..3 {
        for j in 0..3 {
            for (k, b_row) in b.iter().enumerate() {
                out[i][j] += a[i][k] * b_row[j];
            }
        }
    }
    out
}

fn invert_3x3(m: &[[f64; 3]; 3]) -> Option<[[f64; 3]; 3]> {
    let det = m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
        - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0]);
    if det.abs() < 1e-12 {
        return None;
    }
    let inv_det = 1.0 / det;
    let mut out = [[0.0f64; 3]; 3];
    for i in 0..3 {
        for j in 0..3 {
            let (r0, r1) = match i {
                0 => (1, 2),
                1 => (0, 2),
                _ => (0, 1),
            };
            let (c0, c1) = match j {
                0 => (1, 2),
                1 => (0, 2),
                _ => (0, 1),
            };
            let minor = m[r0][c0] * m[r1][c1] - m[r0][c1] * m[r1][c0];
            let sign = if (i + j) % 2 == 0 { 1.0 } else { -1.0 };
            // Adjugate transposes the cofactor matrix.
            out[j][i] = sign * minor * inv_det;
        }
    }
    Some(out)
}

fn residual(matrix: &[[f64; 3]; 3], src: &[(f64, f64); 5], dst: &[(f64, f64); 5]) -> f64 {
    let mut total = 0.0;
    for i in 0..5 {
        let (x, y) = src[i];
        let u = x * matrix[0][0] + y * matrix[1][0] + matrix[2][0];
        let v = x * matrix[0][1] + y * matrix[1][1] + matrix[2][1];
        total += ((u - dst[i].0).powi(2) + (v - dst[i].1).powi(2)).sqrt();
    }
    total
}

/// Aligns detected faces onto the reference constellation.
#[derive(Debug, Clone)]
pub struct FaceAligner {
    output_size: u32,
    reference: [(f64, f64); 5],
}

impl Default for FaceAligner {
    fn default() -> Self {
        Self {
            output_size: ALIGNED_SIZE,
            reference: REFERENCE_LANDMARKS,
        }
    }
}

impl FaceAligner {
    /// Estimates the similarity transform for the given landmarks.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidImage`] when the landmark geometry is
    /// degenerate (singular fit, or the forward/inverse round trip drifts
    /// more than a pixel at the reference points).
    pub fn estimate(&self, landmarks: &Landmarks) -> Result<AlignmentTransform, PipelineError> {
        let src: [(f64, f64); 5] =
            std::array::from_fn(|i| (f64::from(landmarks.points[i].0), f64::from(landmarks.points[i].1)));
        let transform = estimate_similarity(&src, &self.reference).ok_or_else(|| {
            PipelineError::InvalidImage("landmark geometry produced a singular alignment".into())
        })?;

        for &point in &self.reference {
            let roundtrip = transform.map_to_reference(transform.map_to_source(point));
            let err = ((roundtrip.0 - point.0).powi(2) + (roundtrip.1 - point.1).powi(2)).sqrt();
            if err > ROUNDTRIP_TOLERANCE {
                return Err(PipelineError::InvalidImage(
                    "alignment transform failed the round-trip check".into(),
                ));
            }
        }
        Ok(transform)
    }

    /// Produces the aligned crop for a face.
    ///
    /// # Errors
    ///
    /// Propagates [`estimate`](Self::estimate) failures.
    pub fn align(&self, frame: &Frame, landmarks: &Landmarks) -> Result<Frame, PipelineError> {
        let transform = self.estimate(landmarks)?;
        Ok(self.warp(frame, &transform))
    }

    /// Applies the sampling matrix: every output pixel is bilinearly
    /// interpolated from its source position, black outside the source.
    fn warp(&self, frame: &Frame, transform: &AlignmentTransform) -> Frame {
        let source = frame.image();
        let (src_w, src_h) = source.dimensions();
        let size = self.output_size;
        let mut out = RgbaImage::from_pixel(size, size, Rgba([0, 0, 0, 255]));

        for oy in 0..size {
            for ox in 0..size {
                let (sx, sy) = transform.map_to_source((f64::from(ox), f64::from(oy)));
                let x0 = sx.floor() as i64;
                let y0 = sy.floor() as i64;
                let fx = sx - x0 as f64;
                let fy = sy - y0 as f64;

                let sample = |x: i64, y: i64, c: usize| -> f64 {
                    if x >= 0 && x < i64::from(src_w) && y >= 0 && y < i64::from(src_h) {
                        f64::from(source.get_pixel(x as u32, y as u32)[c])
                    } else {
                        0.0
                    }
                };

                let mut px = [0u8; 4];
                px[3] = 255;
                for (c, value) in px.iter_mut().enumerate().take(3) {
                    let interp = sample(x0, y0, c) * (1.0 - fx) * (1.0 - fy)
                        + sample(x0 + 1, y0, c) * fx * (1.0 - fy)
                        + sample(x0, y0 + 1, c) * (1.0 - fx) * fy
                        + sample(x0 + 1, y0 + 1, c) * fx * fy;
                    *value = interp.round().clamp(0.0, 255.0) as u8;
                }
                out.put_pixel(ox, oy, Rgba(px));
            }
        }
        Frame::new(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn landmarks_f32(points: [(f64, f64); 5]) -> Landmarks {
        Landmarks::new(std::array::from_fn(|i| {
            (points[i].0 as f32, points[i].1 as f32)
        }))
    }

    #[test]
    fn identity_when_landmarks_match_reference() {
        let t = estimate_similarity(&REFERENCE_LANDMARKS, &REFERENCE_LANDMARKS).expect("fit");
        assert!(!t.reflective);
        assert!(t.residual < 1e-6, "residual = {}", t.residual);
        let mapped = t.map_to_reference(REFERENCE_LANDMARKS[0]);
        assert!((mapped.0 - REFERENCE_LANDMARKS[0].0).abs() < 1e-6);
        assert!((mapped.1 - REFERENCE_LANDMARKS[0].1).abs() < 1e-6);
    }

    #[test]
    fn doubled_landmarks_fit_with_half_scale() {
        let doubled: [(f64, f64); 5] =
            std::array::from_fn(|i| (REFERENCE_LANDMARKS[i].0 * 2.0, REFERENCE_LANDMARKS[i].1 * 2.0));
        let t = estimate_similarity(&doubled, &REFERENCE_LANDMARKS).expect("fit");
        // Mapping a doubled point lands on the reference point.
        let mapped = t.map_to_reference(doubled[2]);
        assert!((mapped.0 - REFERENCE_LANDMARKS[2].0).abs() < 1e-6);
        assert!((mapped.1 - REFERENCE_LANDMARKS[2].1).abs() < 1e-6);
        // And the sampling direction scales back up.
        let back = t.map_to_source(REFERENCE_LANDMARKS[2]);
        assert!((back.0 - doubled[2].0).abs() < 1e-6);
    }

    #[test]
    fn translated_and_rotated_landmarks_recovered() {
        let angle: f64 = 0.3;
        let (sin, cos) = angle.sin_cos();
        let moved: [(f64, f64); 5] = std::array::from_fn(|i| {
            let (x, y) = REFERENCE_LANDMARKS[i];
            (cos * x - sin * y + 40.0, sin * x + cos * y + 25.0)
        });
        let t = estimate_similarity(&moved, &REFERENCE_LANDMARKS).expect("fit");
        assert!(t.residual < 1e-6, "residual = {}", t.residual);
        for (i, &point) in moved.iter().enumerate() {
            let (u, v) = t.map_to_reference(point);
            assert!((u - REFERENCE_LANDMARKS[i].0).abs() < 1e-6);
            assert!((v - REFERENCE_LANDMARKS[i].1).abs() < 1e-6);
        }
    }

    #[test]
    fn mirrored_landmarks_select_reflective_candidate() {
        let mirrored: [(f64, f64); 5] =
            std::array::from_fn(|i| (112.0 - REFERENCE_LANDMARKS[i].0, REFERENCE_LANDMARKS[i].1));
        let t = estimate_similarity(&mirrored, &REFERENCE_LANDMARKS).expect("fit");
        assert!(t.reflective);
        assert!(t.residual < 1e-6, "residual = {}", t.residual);
    }

    #[test]
    fn collinear_landmarks_fail() {
        let aligner = FaceAligner::default();
        // All five points identical: singular system.
        let degenerate = landmarks_f32([(50.0, 50.0); 5]);
        assert!(aligner.estimate(&degenerate).is_err());
    }

    #[test]
    fn estimate_passes_roundtrip_check_on_clean_input() {
        let aligner = FaceAligner::default();
        let landmarks = landmarks_f32([
            (80.0, 60.0),
            (120.0, 60.0),
            (100.0, 85.0),
            (85.0, 110.0),
            (115.0, 110.0),
        ]);
        let t = aligner.estimate(&landmarks).expect("estimate");
        for &p in &REFERENCE_LANDMARKS {
            let rt = t.map_to_reference(t.map_to_source(p));
            let err = ((rt.0 - p.0).powi(2) + (rt.1 - p.1).powi(2)).sqrt();
            assert!(err < 1.0, "round-trip error {err}");
        }
    }

    #[test]
    fn warp_output_has_aligned_size_and_black_padding() {
        use image::{Rgba, RgbaImage};

        let frame = Frame::new(RgbaImage::from_pixel(
            200,
            200,
            Rgba([90, 90, 90, 255]),
        ));
        // Landmarks far in a corner so part of the crop samples outside.
        let landmarks = landmarks_f32([
            (5.0, 5.0),
            (25.0, 5.0),
            (15.0, 17.0),
            (8.0, 28.0),
            (22.0, 28.0),
        ]);
        let aligner = FaceAligner::default();
        let aligned = aligner.align(&frame, &landmarks).expect("align");
        assert_eq!((aligned.width(), aligned.height()), (112, 112));
        // The top-left output corner maps well outside the source corner.
        assert_eq!(aligned.image().get_pixel(0, 0).0[..3], [0, 0, 0]);
    }

    #[test]
    fn bright_patch_lands_near_reference_eye() {
        use image::{Rgba, RgbaImage};

        let mut image = RgbaImage::from_pixel(200, 200, Rgba([0, 0, 0, 255]));
        let src: [(f64, f64); 5] = [
            (80.0, 60.0),
            (120.0, 60.0),
            (100.0, 85.0),
            (85.0, 110.0),
            (115.0, 110.0),
        ];
        // 5x5 bright patch at the left-eye position.
        for dy in 0..5u32 {
            for dx in 0..5u32 {
                image.put_pixel(78 + dx, 58 + dy, Rgba([255, 255, 255, 255]));
            }
        }
        let aligner = FaceAligner::default();
        let aligned = aligner
            .align(&Frame::new(image), &landmarks_f32(src))
            .expect("align");

        let (ref_x, ref_y) = (
            REFERENCE_LANDMARKS[0].0.round() as u32,
            REFERENCE_LANDMARKS[0].1.round() as u32,
        );
        let mut max_val = 0u8;
        for dy in 0..5u32 {
            for dx in 0..5u32 {
                let x = (ref_x + dx).saturating_sub(2).min(111);
                let y = (ref_y + dy).saturating_sub(2).min(111);
                max_val = max_val.max(aligned.image().get_pixel(x, y)[0]);
            }
        }
        assert!(
            max_val > 100,
            "expected bright patch near ({ref_x}, {ref_y}), max={max_val}"
        );
    }
}

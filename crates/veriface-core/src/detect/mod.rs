//! Cascaded face detection with landmarks.
//!
//! Three serial stages over an image pyramid: a fully-convolutional proposal
//! network scans every scale, a refine network re-scores 24×24 crops of the
//! survivors, and the output network re-scores 48×48 crops and regresses the
//! five facial landmarks. Every stage consumes all of the prior stage's
//! survivors; an empty result at any stage means no face.

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]

mod nms;

pub use nms::{Nms, SuppressionMode};

use std::sync::Arc;

use ndarray::{s, Array4, ArrayD, Axis, Ix2, Ix4};

use crate::domain::{BoundingBox, FaceDetection, Frame, Interpolation, Landmarks, PipelineError};
use crate::inference::{ModelKind, ModelSession, ModelStore};
use crate::pipeline::CancellationToken;

/// Proposal-network receptive field in pixels.
const CELL_SIZE: usize = 12;
/// Proposal-network output stride in pixels.
const STRIDE: usize = 2;
/// Refine-stage input side.
const REFINE_SIZE: u32 = 24;
/// Output-stage input side.
const OUTPUT_SIZE: u32 = 48;
/// Crops per refine/output inference call.
const BATCH_SIZE: usize = 16;

/// Cascade tuning knobs.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Smallest detectable face in pixels.
    pub min_face_size: u32,
    /// Pyramid shrink factor between scales.
    pub scale_factor: f32,
    /// Per-stage face-confidence thresholds.
    pub score_thresholds: [f32; 3],
    /// Per-stage NMS overlap thresholds.
    pub nms_thresholds: [f32; 3],
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            min_face_size: 12,
            scale_factor: 0.709,
            score_thresholds: [0.1, 0.7, 0.9],
            nms_thresholds: [0.7, 0.7, 0.7],
        }
    }
}

/// A stage-internal box with its regression offsets.
#[derive(Debug, Clone)]
struct Candidate {
    bbox: BoundingBox,
    offsets: [f32; 4],
}

/// Three-stage cascade face detector.
pub struct FaceDetector {
    proposal_net: Arc<dyn ModelSession>,
    refine_net: Arc<dyn ModelSession>,
    output_net: Arc<dyn ModelSession>,
    config: DetectorConfig,
}

impl FaceDetector {
    /// Loads the three cascade models from the store.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::ModelLoadFailed`] if any stage model cannot
    /// be loaded.
    pub fn new(store: &ModelStore, config: DetectorConfig) -> Result<Self, PipelineError> {
        Ok(Self {
            proposal_net: store.load(ModelKind::PNet)?,
            refine_net: store.load(ModelKind::RNet)?,
            output_net: store.load(ModelKind::ONet)?,
            config,
        })
    }

    /// Builds a detector over already-constructed sessions.
    #[must_use]
    pub fn from_sessions(
        proposal_net: Arc<dyn ModelSession>,
        refine_net: Arc<dyn ModelSession>,
        output_net: Arc<dyn ModelSession>,
        config: DetectorConfig,
    ) -> Self {
        Self {
            proposal_net,
            refine_net,
            output_net,
            config,
        }
    }

    /// Runs the full cascade. An empty result means no face was found.
    ///
    /// # Errors
    ///
    /// Propagates inference failures and cancellation.
    pub fn detect(
        &self,
        frame: &Frame,
        cancel: &CancellationToken,
    ) -> Result<Vec<FaceDetection>, PipelineError> {
        let proposals = self.proposal_stage(frame, cancel)?;
        tracing::debug!(count = proposals.len(), "proposal stage done");
        if proposals.is_empty() {
            return Ok(Vec::new());
        }

        let refined = self.refine_stage(frame, &proposals, cancel)?;
        tracing::debug!(count = refined.len(), "refine stage done");
        if refined.is_empty() {
            return Ok(Vec::new());
        }

        let faces = self.output_stage(frame, &refined, cancel)?;
        tracing::debug!(count = faces.len(), "output stage done");
        Ok(faces)
    }

    /// Runs the cascade and picks the single pipeline face: highest output
    /// score, ties broken by larger box area.
    ///
    /// # Errors
    ///
    /// Propagates inference failures and cancellation.
    pub fn detect_best(
        &self,
        frame: &Frame,
        cancel: &CancellationToken,
    ) -> Result<Option<FaceDetection>, PipelineError> {
        let faces = self.detect(frame, cancel)?;
        Ok(faces.into_iter().max_by(|a, b| {
            a.bbox
                .score
                .partial_cmp(&b.bbox.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(
                    a.bbox
                        .area()
                        .partial_cmp(&b.bbox.area())
                        .unwrap_or(std::cmp::Ordering::Equal),
                )
        }))
    }

    /// Pyramid scales `m * factor^k` while the scaled short side still
    /// exceeds one receptive field.
    fn scales(&self, width: u32, height: u32) -> Vec<f32> {
        let m = CELL_SIZE as f32 / self.config.min_face_size as f32;
        let min_side = width.min(height) as f32;
        let mut scales = Vec::new();
        let mut scale = m;
        while min_side * scale > CELL_SIZE as f32 {
            scales.push(scale);
            scale *= self.config.scale_factor;
        }
        scales
    }

    fn proposal_stage(
        &self,
        frame: &Frame,
        cancel: &CancellationToken,
    ) -> Result<Vec<Candidate>, PipelineError> {
        let (width, height) = (frame.width(), frame.height());
        let mut candidates = Vec::new();

        for scale in self.scales(width, height) {
            cancel.checkpoint()?;

            let scaled_w = (width as f32 * scale).ceil() as u32;
            let scaled_h = (height as f32 * scale).ceil() as u32;
            let scaled = frame.resize(scaled_w, scaled_h, Interpolation::Bilinear);

            let mut outputs = self
                .proposal_net
                .run(scaled.to_chw_tensor_scaled().into_dyn())?;
            let (offsets, probs) = take_pair(&mut outputs, self.proposal_net.name())?;
            let offsets = to_ix4(offsets, "proposal offsets")?;
            let probs = to_ix4(probs, "proposal scores")?;

            let grid_h = probs.shape()[2];
            let grid_w = probs.shape()[3];
            for row in 0..grid_h {
                for col in 0..grid_w {
                    let score = probs[[0, 1, row, col]];
                    if score <= self.config.score_thresholds[0] {
                        continue;
                    }
                    let x1 = ((STRIDE * col + 1) as f32 / scale).round();
                    let y1 = ((STRIDE * row + 1) as f32 / scale).round();
                    let x2 = ((STRIDE * col + 1 + CELL_SIZE) as f32 / scale).round();
                    let y2 = ((STRIDE * row + 1 + CELL_SIZE) as f32 / scale).round();
                    candidates.push(Candidate {
                        bbox: BoundingBox::new(x1, y1, x2, y2, score),
                        offsets: [
                            offsets[[0, 0, row, col]],
                            offsets[[0, 1, row, col]],
                            offsets[[0, 2, row, col]],
                            offsets[[0, 3, row, col]],
                        ],
                    });
                }
            }
        }

        Ok(self.calibrate_and_square(candidates, self.config.nms_thresholds[0], width, height))
    }

    fn refine_stage(
        &self,
        frame: &Frame,
        proposals: &[Candidate],
        cancel: &CancellationToken,
    ) -> Result<Vec<Candidate>, PipelineError> {
        let mut survivors = Vec::new();

        for chunk in proposals.chunks(BATCH_SIZE) {
            cancel.checkpoint()?;
            let input = self.batch_crops(frame, chunk, REFINE_SIZE);
            let mut outputs = self.refine_net.run(input.into_dyn())?;
            let (offsets, probs) = take_pair(&mut outputs, self.refine_net.name())?;
            let offsets = to_ix2(offsets, "refine offsets")?;
            let probs = to_ix2(probs, "refine scores")?;

            for (n, candidate) in chunk.iter().enumerate() {
                let score = probs[[n, 1]];
                if score > self.config.score_thresholds[1] {
                    let mut bbox = candidate.bbox;
                    bbox.score = score;
                    survivors.push(Candidate {
                        bbox,
                        offsets: [
                            offsets[[n, 0]],
                            offsets[[n, 1]],
                            offsets[[n, 2]],
                            offsets[[n, 3]],
                        ],
                    });
                }
            }
        }

        let (width, height) = (frame.width(), frame.height());
        Ok(self.calibrate_and_square(survivors, self.config.nms_thresholds[1], width, height))
    }

    fn output_stage(
        &self,
        frame: &Frame,
        refined: &[Candidate],
        cancel: &CancellationToken,
    ) -> Result<Vec<FaceDetection>, PipelineError> {
        let (width, height) = (frame.width(), frame.height());
        let mut faces = Vec::new();

        for chunk in refined.chunks(BATCH_SIZE) {
            cancel.checkpoint()?;
            let input = self.batch_crops(frame, chunk, OUTPUT_SIZE);
            let mut outputs = self.output_net.run(input.into_dyn())?;
            if outputs.len() != 3 {
                return Err(PipelineError::Inference(format!(
                    "'{}' produced {} outputs, expected 3",
                    self.output_net.name(),
                    outputs.len()
                )));
            }
            let probs = to_ix2(outputs.pop().unwrap_or_default(), "output scores")?;
            let offsets = to_ix2(outputs.pop().unwrap_or_default(), "output offsets")?;
            let landmark_rows = to_ix2(outputs.pop().unwrap_or_default(), "output landmarks")?;

            for (n, candidate) in chunk.iter().enumerate() {
                let score = probs[[n, 1]];
                if score <= self.config.score_thresholds[2] {
                    continue;
                }
                let mut scored = candidate.bbox;
                scored.score = score;

                // Landmarks are box-relative to the pre-calibration square.
                let row = landmark_rows.slice(s![n, ..]).to_vec();
                let landmarks = Landmarks::from_box_relative(&row, &scored);

                let bbox = scored
                    .calibrated([
                        offsets[[n, 0]],
                        offsets[[n, 1]],
                        offsets[[n, 2]],
                        offsets[[n, 3]],
                    ])
                    .clamped(width, height);
                if bbox.is_valid() {
                    faces.push(FaceDetection {
                        bbox,
                        landmarks: Some(landmarks),
                    });
                }
            }
        }

        Ok(Nms::min(self.config.nms_thresholds[2]).suppress(faces, |f| &f.bbox))
    }

    /// Shared post-processing for the first two stages: suppress, apply the
    /// regression offsets, convert to a square, round, and clamp.
    fn calibrate_and_square(
        &self,
        candidates: Vec<Candidate>,
        nms_threshold: f32,
        width: u32,
        height: u32,
    ) -> Vec<Candidate> {
        Nms::union(nms_threshold)
            .suppress(candidates, |c| &c.bbox)
            .into_iter()
            .map(|c| Candidate {
                bbox: c
                    .bbox
                    .calibrated(c.offsets)
                    .squared()
                    .rounded()
                    .clamped(width, height),
                offsets: [0.0; 4],
            })
            .filter(|c| c.bbox.is_valid())
            .collect()
    }

    /// Stacks zero-padded crops of each candidate, resized to
    /// `size` x `size` and normalized, into one NCHW batch.
    fn batch_crops(&self, frame: &Frame, chunk: &[Candidate], size: u32) -> Array4<f32> {
        let mut input = Array4::zeros((chunk.len(), 3, size as usize, size as usize));
        for (n, candidate) in chunk.iter().enumerate() {
            let crop = frame
                .crop_box_padded(&candidate.bbox)
                .resize(size, size, Interpolation::Bilinear);
            let tensor = crop.to_chw_tensor_scaled();
            input
                .slice_mut(s![n, .., .., ..])
                .assign(&tensor.index_axis(Axis(0), 0));
        }
        input
    }
}

fn take_pair(
    outputs: &mut Vec<ArrayD<f32>>,
    model: &str,
) -> Result<(ArrayD<f32>, ArrayD<f32>), PipelineError> {
    if outputs.len() != 2 {
        return Err(PipelineError::Inference(format!(
            "'{model}' produced {} outputs, expected 2",
            outputs.len()
        )));
    }
    let probs = outputs.pop().unwrap_or_default();
    let offsets = outputs.pop().unwrap_or_default();
    Ok((offsets, probs))
}

fn to_ix4(array: ArrayD<f32>, what: &str) -> Result<ndarray::Array4<f32>, PipelineError> {
    array
        .into_dimensionality::<Ix4>()
        .map_err(|e| PipelineError::Inference(format!("{what}: {e}")))
}

fn to_ix2(array: ArrayD<f32>, what: &str) -> Result<ndarray::Array2<f32>, PipelineError> {
    array
        .into_dimensionality::<Ix2>()
        .map_err(|e| PipelineError::Inference(format!("{what}: {e}")))
}

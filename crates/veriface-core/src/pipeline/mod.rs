//! Liveness pipeline orchestration.
//!
//! One call walks an explicit sequence — validate, optional face crop,
//! sharpness, albedo, occlusion, liveness — short-circuiting on the first
//! failing gate while keeping whatever diagnostic scores were produced.

mod cancel;
mod engine;

pub use cancel::CancellationToken;
pub use engine::{EnrollOutcome, FaceEngine, IdentifyOutcome, VerifyOutcome};

use std::sync::Arc;

use crate::detect::FaceDetector;
use crate::domain::{Frame, Interpolation, LivenessVerdict, PipelineError, Prediction};
use crate::inference::{ModelKind, ModelStore};
use crate::modules::{
    AlbedoCheck, AlbedoConfig, LivenessConfig, LivenessEnsemble, OcclusionClassifier,
    OcclusionConfig, OcclusionLabel, SharpnessConfig, SharpnessGate, CLASSIFIER_INPUT_SIZE,
};
use crate::ports::{FaceCropOutcome, FaceCropProvider};

/// Verdict reason for an empty detector result.
pub const NO_FACE_REASON: &str = "No face detected in the image";
/// Verdict reason when the albedo statistics call spoof.
pub const ALBEDO_REASON: &str = "Albedo check failed: Image is spoof";
/// Verdict reason when the liveness ensemble calls spoof.
pub const LIVENESS_REASON: &str = "Liveness check failed";

/// Pipeline-wide configuration, immutable per run.
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub skip_face_cropping: bool,
    pub skip_albedo_check: bool,
    pub skip_occlusion_check: bool,
    pub sharpness: SharpnessConfig,
    pub albedo: AlbedoConfig,
    pub occlusion: OcclusionConfig,
    pub liveness: LivenessConfig,
}

/// The sequential gate pipeline.
pub struct LivenessPipeline {
    config: PipelineConfig,
    sharpness: SharpnessGate,
    albedo: AlbedoCheck,
    occlusion: OcclusionClassifier,
    liveness: LivenessEnsemble,
    face_crop: Option<Arc<dyn FaceCropProvider>>,
}

impl LivenessPipeline {
    /// Assembles the pipeline from the model store.
    ///
    /// A missing occlusion model degrades open (the gate reports `normal`);
    /// missing liveness models are fatal.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::ModelLoadFailed`] for the liveness members.
    pub fn new(
        store: &ModelStore,
        config: PipelineConfig,
        face_crop: Option<Arc<dyn FaceCropProvider>>,
    ) -> Result<Self, PipelineError> {
        let occlusion_session = if config.skip_occlusion_check {
            None
        } else {
            match store.load(ModelKind::Occlusion) {
                Ok(session) => Some(session),
                Err(e) => {
                    tracing::warn!(error = %e, "occlusion model unavailable; gate degrades open");
                    None
                }
            }
        };
        let liveness = LivenessEnsemble::new(
            store.load(ModelKind::LivenessFull)?,
            store.load(ModelKind::LivenessHalf)?,
            config.liveness.clone(),
        );

        Ok(Self {
            sharpness: SharpnessGate::new(config.sharpness.clone()),
            albedo: AlbedoCheck::new(config.albedo.clone()),
            occlusion: OcclusionClassifier::new(occlusion_session, config.occlusion.clone()),
            liveness,
            face_crop,
            config,
        })
    }

    /// Assembles the pipeline from pre-built gates. Test seam.
    #[must_use]
    pub fn from_components(
        config: PipelineConfig,
        occlusion: OcclusionClassifier,
        liveness: LivenessEnsemble,
        face_crop: Option<Arc<dyn FaceCropProvider>>,
    ) -> Self {
        Self {
            sharpness: SharpnessGate::new(config.sharpness.clone()),
            albedo: AlbedoCheck::new(config.albedo.clone()),
            occlusion,
            liveness,
            face_crop,
            config,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs the gate sequence on one frame.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidImage`] for out-of-bounds input,
    /// [`PipelineError::Cancelled`] when the token fires, and inference
    /// errors from the classifier gates. Gate rejections are verdicts, not
    /// errors.
    pub fn detect_liveness(
        &self,
        frame: &Frame,
        cancel: &CancellationToken,
    ) -> Result<LivenessVerdict, PipelineError> {
        frame.validate_dimensions()?;

        let working = self.face_cropped(frame);

        cancel.checkpoint()?;
        let sharpness = self.sharpness.evaluate(&working);
        if !sharpness.is_sharp {
            tracing::debug!(variance = sharpness.variance, "sharpness gate rejected");
            return Ok(LivenessVerdict::spoof(
                1.0,
                self.config.sharpness.failure_reason,
            ));
        }

        if !self.config.skip_albedo_check {
            let albedo = self.albedo.analyze(&working);
            if !albedo.is_live {
                tracing::debug!(
                    brightness = albedo.brightness,
                    outliers = ?albedo.outlier_counts,
                    "albedo gate rejected"
                );
                return Ok(LivenessVerdict::spoof(1.0, ALBEDO_REASON));
            }
        }

        let mut occlusion_scores = None;
        if !self.config.skip_occlusion_check {
            let outcome = self.occlusion.classify(&working, cancel)?;
            occlusion_scores = Some(outcome.scores);
            if outcome.label != OcclusionLabel::Normal {
                tracing::debug!(label = outcome.label.as_str(), "occlusion gate rejected");
                return Ok(LivenessVerdict::spoof(
                    outcome.confidence,
                    format!("Face is occluded: {}", outcome.label.as_str()),
                )
                .with_occlusion_scores(outcome.scores));
            }
        }

        let outcome = self.liveness.classify(&working, cancel)?;
        let mut verdict = match outcome.prediction {
            Prediction::Live => LivenessVerdict::live(outcome.confidence),
            Prediction::Spoof => LivenessVerdict::spoof(outcome.confidence, LIVENESS_REASON),
        }
        .with_liveness_scores(outcome.scores);
        if let Some(scores) = occlusion_scores {
            verdict = verdict.with_occlusion_scores(scores);
        }
        Ok(verdict)
    }

    /// Entry point over raw decoded pixels.
    ///
    /// # Errors
    ///
    /// As [`detect_liveness`](Self::detect_liveness), plus
    /// [`PipelineError::InvalidImage`] when the buffer does not describe a
    /// `width` x `height` RGBA raster.
    pub fn detect_liveness_rgba(
        &self,
        bytes: Vec<u8>,
        width: u32,
        height: u32,
        cancel: &CancellationToken,
    ) -> Result<LivenessVerdict, PipelineError> {
        let frame = Frame::from_rgba_bytes(bytes, width, height)?;
        self.detect_liveness(&frame, cancel)
    }

    /// Step 2: the face-crop collaborator is advisory. Any failure falls
    /// back to the original frame.
    fn face_cropped(&self, frame: &Frame) -> Frame {
        if self.config.skip_face_cropping {
            return frame.clone();
        }
        let Some(provider) = &self.face_crop else {
            return frame.clone();
        };
        match provider.crop(frame) {
            Ok(FaceCropOutcome::Cropped(cropped)) => cropped,
            Ok(FaceCropOutcome::NoFace) => {
                tracing::warn!("face crop found no face; using the original frame");
                frame.clone()
            }
            Err(e) => {
                tracing::warn!(error = %e, "face crop failed; using the original frame");
                frame.clone()
            }
        }
    }
}

/// Reference [`FaceCropProvider`]: tight box around the largest detected
/// face, resized to 256 and center-cropped to the classifier input size.
pub struct DetectorFaceCrop {
    detector: Arc<FaceDetector>,
}

impl DetectorFaceCrop {
    #[must_use]
    pub fn new(detector: Arc<FaceDetector>) -> Self {
        Self { detector }
    }
}

impl FaceCropProvider for DetectorFaceCrop {
    fn crop(&self, frame: &Frame) -> anyhow::Result<FaceCropOutcome> {
        let faces = self.detector.detect(frame, &CancellationToken::new())?;
        let Some(face) = faces.into_iter().max_by(|a, b| {
            a.bbox
                .area()
                .partial_cmp(&b.bbox.area())
                .unwrap_or(std::cmp::Ordering::Equal)
        }) else {
            return Ok(FaceCropOutcome::NoFace);
        };

        let cropped = frame
            .crop_box_padded(&face.bbox)
            .resize(256, 256, Interpolation::Bilinear)
            .center_crop(CLASSIFIER_INPUT_SIZE)?;
        Ok(FaceCropOutcome::Cropped(cropped))
    }
}

//! Face-occlusion classifier.
//!
//! Two-class model over a 224×224 ImageNet-normalized input. The same input
//! is scored `iterations` times and the softmaxed probabilities averaged;
//! the weights are deterministic, so the repetition only hedges against
//! session-level numeric nondeterminism. When no session is available the
//! check degrades open and reports `normal` with full confidence.

use std::sync::Arc;

use crate::domain::{Frame, Interpolation, OcclusionScores, PipelineError};
use crate::inference::ModelSession;
use crate::modules::{softmax2, CLASSIFIER_INPUT_SIZE, IMAGENET_MEAN, IMAGENET_STD};
use crate::pipeline::CancellationToken;

/// Occlusion gate tuning.
#[derive(Debug, Clone)]
pub struct OcclusionConfig {
    /// Averaged `normal` probability strictly above this counts as an
    /// unoccluded face.
    pub threshold: f32,
    /// Inference repetitions averaged into the final probabilities.
    pub iterations: usize,
}

impl Default for OcclusionConfig {
    fn default() -> Self {
        Self {
            threshold: 0.7,
            iterations: 3,
        }
    }
}

/// Classifier labels. Anything that is not `normal` counts as occluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcclusionLabel {
    Normal,
    Occluded,
}

impl OcclusionLabel {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Occluded => "occluded",
        }
    }
}

/// Outcome of one occlusion classification.
#[derive(Debug, Clone, Copy)]
pub struct OcclusionOutcome {
    pub label: OcclusionLabel,
    pub confidence: f32,
    pub scores: OcclusionScores,
}

/// The occlusion gate. The session is optional: a missing model degrades
/// open rather than blocking the pipeline.
pub struct OcclusionClassifier {
    session: Option<Arc<dyn ModelSession>>,
    config: OcclusionConfig,
}

impl OcclusionClassifier {
    #[must_use]
    pub fn new(session: Option<Arc<dyn ModelSession>>, config: OcclusionConfig) -> Self {
        Self { session, config }
    }

    #[must_use]
    pub const fn config(&self) -> &OcclusionConfig {
        &self.config
    }

    /// Classifies the frame.
    ///
    /// # Errors
    ///
    /// Propagates inference failures and cancellation.
    pub fn classify(
        &self,
        frame: &Frame,
        cancel: &CancellationToken,
    ) -> Result<OcclusionOutcome, PipelineError> {
        let Some(session) = &self.session else {
            tracing::warn!("occlusion model not loaded; reporting normal");
            return Ok(OcclusionOutcome {
                label: OcclusionLabel::Normal,
                confidence: 1.0,
                scores: OcclusionScores {
                    occluded: 0.0,
                    normal: 1.0,
                },
            });
        };

        let input = frame
            .resize(
                CLASSIFIER_INPUT_SIZE,
                CLASSIFIER_INPUT_SIZE,
                Interpolation::Bilinear,
            )
            .to_chw_tensor(IMAGENET_MEAN, IMAGENET_STD);

        let iterations = self.config.iterations.max(1);
        let mut sum_occluded = 0.0f32;
        let mut sum_normal = 0.0f32;
        for _ in 0..iterations {
            cancel.checkpoint()?;
            let outputs = session.run(input.clone().into_dyn())?;
            let logits: Vec<f32> = outputs
                .first()
                .map(|o| o.iter().copied().collect())
                .unwrap_or_default();
            if logits.len() < 2 {
                return Err(PipelineError::Inference(format!(
                    "occlusion model produced {} values, expected 2",
                    logits.len()
                )));
            }
            let (occluded, normal) = softmax2(logits[0], logits[1]);
            sum_occluded += occluded;
            sum_normal += normal;
        }

        let scores = OcclusionScores {
            occluded: sum_occluded / iterations as f32,
            normal: sum_normal / iterations as f32,
        };
        let label = if scores.normal > self.config.threshold {
            OcclusionLabel::Normal
        } else {
            OcclusionLabel::Occluded
        };
        let confidence = match label {
            OcclusionLabel::Normal => scores.normal,
            OcclusionLabel::Occluded => scores.occluded,
        };

        Ok(OcclusionOutcome {
            label,
            confidence,
            scores,
        })
    }
}

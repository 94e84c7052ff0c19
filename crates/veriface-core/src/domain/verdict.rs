//! Liveness verdict types returned by the pipeline.

use serde::{Deserialize, Serialize};

/// Final call on a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Prediction {
    Live,
    Spoof,
}

impl std::fmt::Display for Prediction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Live => write!(f, "Live"),
            Self::Spoof => write!(f, "Spoof"),
        }
    }
}

/// Combined live/spoof probabilities from the liveness ensemble.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LivenessScores {
    pub live: f32,
    pub spoof: f32,
}

/// Averaged occluded/normal probabilities from the occlusion classifier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OcclusionScores {
    pub occluded: f32,
    pub normal: f32,
}

/// Outcome of a liveness invocation.
///
/// Early-terminating gates leave the diagnostic score maps absent; they are
/// populated only when the corresponding classifier actually ran.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LivenessVerdict {
    pub prediction: Prediction,
    /// Confidence in `[0, 1]` for the predicted label.
    pub confidence: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub liveness_scores: Option<LivenessScores>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occlusion_scores: Option<OcclusionScores>,
}

impl LivenessVerdict {
    /// A passing verdict with no failure reason.
    #[must_use]
    pub const fn live(confidence: f32) -> Self {
        Self {
            prediction: Prediction::Live,
            confidence,
            failure_reason: None,
            liveness_scores: None,
            occlusion_scores: None,
        }
    }

    /// A failing verdict carrying the gate's reason.
    #[must_use]
    pub fn spoof(confidence: f32, reason: impl Into<String>) -> Self {
        Self {
            prediction: Prediction::Spoof,
            confidence,
            failure_reason: Some(reason.into()),
            liveness_scores: None,
            occlusion_scores: None,
        }
    }

    #[must_use]
    pub fn with_liveness_scores(mut self, scores: LivenessScores) -> Self {
        self.liveness_scores = Some(scores);
        self
    }

    #[must_use]
    pub fn with_occlusion_scores(mut self, scores: OcclusionScores) -> Self {
        self.occlusion_scores = Some(scores);
        self
    }

    #[must_use]
    pub fn is_live(&self) -> bool {
        self.prediction == Prediction::Live
    }
}

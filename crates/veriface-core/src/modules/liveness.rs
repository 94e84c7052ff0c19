//! Two-model liveness ensemble.
//!
//! Both members score the same 224×224 ImageNet-normalized input and emit
//! already-softmaxed `(live, spoof)` probabilities. Their outputs are
//! combined by fixed weights; with averaging enabled (the default) the
//! combined scores are produced over several rounds, the per-round labels
//! majority-voted, and the confidence is the winning label's mean combined
//! score.

use std::sync::Arc;

use ndarray::Array4;

use crate::domain::{Frame, Interpolation, LivenessScores, PipelineError, Prediction};
use crate::inference::ModelSession;
use crate::modules::{CLASSIFIER_INPUT_SIZE, IMAGENET_MEAN, IMAGENET_STD};
use crate::pipeline::CancellationToken;

/// Liveness ensemble tuning.
#[derive(Debug, Clone)]
pub struct LivenessConfig {
    /// Combined live probability strictly above this counts as live.
    pub threshold: f32,
    /// Ensemble weights for the (full, half) members.
    pub model_weights: (f32, f32),
    /// Averaging rounds.
    pub iterations: usize,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            threshold: 0.75,
            model_weights: (0.5, 0.5),
            iterations: 3,
        }
    }
}

/// Outcome of a liveness classification.
#[derive(Debug, Clone, Copy)]
pub struct LivenessOutcome {
    pub prediction: Prediction,
    pub confidence: f32,
    pub scores: LivenessScores,
}

/// The weighted two-member ensemble.
pub struct LivenessEnsemble {
    full: Arc<dyn ModelSession>,
    half: Arc<dyn ModelSession>,
    config: LivenessConfig,
}

impl LivenessEnsemble {
    #[must_use]
    pub fn new(
        full: Arc<dyn ModelSession>,
        half: Arc<dyn ModelSession>,
        config: LivenessConfig,
    ) -> Self {
        Self { full, half, config }
    }

    #[must_use]
    pub const fn config(&self) -> &LivenessConfig {
        &self.config
    }

    /// One weighted inference round over both members.
    fn combined_scores(
        &self,
        input: &Array4<f32>,
        cancel: &CancellationToken,
    ) -> Result<LivenessScores, PipelineError> {
        let (w_full, w_half) = self.config.model_weights;
        cancel.checkpoint()?;
        let full = probabilities(&*self.full, input)?;
        cancel.checkpoint()?;
        let half = probabilities(&*self.half, input)?;
        Ok(LivenessScores {
            live: w_full * full.0 + w_half * half.0,
            spoof: w_full * full.1 + w_half * half.1,
        })
    }

    /// Single-shot classification without averaging.
    ///
    /// # Errors
    ///
    /// Propagates inference failures and cancellation.
    pub fn classify_once(
        &self,
        frame: &Frame,
        cancel: &CancellationToken,
    ) -> Result<LivenessOutcome, PipelineError> {
        let input = preprocess(frame);
        let scores = self.combined_scores(&input, cancel)?;
        let prediction = label_for(&scores, self.config.threshold);
        Ok(LivenessOutcome {
            prediction,
            confidence: confidence_for(prediction, &scores),
            scores,
        })
    }

    /// Averaged classification: per-round labels are majority-voted (ties
    /// fall to the first label reaching the majority count) and the final
    /// confidence is the winning label's mean combined score across rounds.
    ///
    /// # Errors
    ///
    /// Propagates inference failures and cancellation.
    pub fn classify(
        &self,
        frame: &Frame,
        cancel: &CancellationToken,
    ) -> Result<LivenessOutcome, PipelineError> {
        let input = preprocess(frame);
        let rounds = self.config.iterations.max(1);
        let majority = rounds / 2 + 1;

        let mut live_votes = 0usize;
        let mut spoof_votes = 0usize;
        let mut winner_by_majority: Option<Prediction> = None;
        let mut all_scores = Vec::with_capacity(rounds);

        for _ in 0..rounds {
            let scores = self.combined_scores(&input, cancel)?;
            match label_for(&scores, self.config.threshold) {
                Prediction::Live => live_votes += 1,
                Prediction::Spoof => spoof_votes += 1,
            }
            if winner_by_majority.is_none() {
                if live_votes >= majority {
                    winner_by_majority = Some(Prediction::Live);
                } else if spoof_votes >= majority {
                    winner_by_majority = Some(Prediction::Spoof);
                }
            }
            all_scores.push(scores);
        }

        let prediction = winner_by_majority.unwrap_or(if live_votes >= spoof_votes {
            Prediction::Live
        } else {
            Prediction::Spoof
        });

        let mean_live =
            all_scores.iter().map(|s| s.live).sum::<f32>() / all_scores.len() as f32;
        let mean_spoof =
            all_scores.iter().map(|s| s.spoof).sum::<f32>() / all_scores.len() as f32;
        let scores = LivenessScores {
            live: mean_live,
            spoof: mean_spoof,
        };

        Ok(LivenessOutcome {
            prediction,
            confidence: confidence_for(prediction, &scores),
            scores,
        })
    }
}

fn preprocess(frame: &Frame) -> Array4<f32> {
    frame
        .resize(
            CLASSIFIER_INPUT_SIZE,
            CLASSIFIER_INPUT_SIZE,
            Interpolation::Bilinear,
        )
        .to_chw_tensor(IMAGENET_MEAN, IMAGENET_STD)
}

/// Extracts the `(live, spoof)` pair; the members softmax internally.
fn probabilities(
    session: &dyn ModelSession,
    input: &Array4<f32>,
) -> Result<(f32, f32), PipelineError> {
    let outputs = session.run(input.clone().into_dyn())?;
    let values: Vec<f32> = outputs
        .first()
        .map(|o| o.iter().copied().collect())
        .unwrap_or_default();
    if values.len() < 2 {
        return Err(PipelineError::Inference(format!(
            "liveness model '{}' produced {} values, expected 2",
            session.name(),
            values.len()
        )));
    }
    Ok((values[0], values[1]))
}

fn label_for(scores: &LivenessScores, threshold: f32) -> Prediction {
    if scores.live > threshold {
        Prediction::Live
    } else {
        Prediction::Spoof
    }
}

const fn confidence_for(prediction: Prediction, scores: &LivenessScores) -> f32 {
    match prediction {
        Prediction::Live => scores.live,
        Prediction::Spoof => scores.spoof,
    }
}

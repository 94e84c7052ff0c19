//! Identity embedding extraction from an aligned face crop.

use std::sync::Arc;

use crate::domain::{Embedding, Frame, Interpolation, PipelineError, EMBEDDING_DIM};
use crate::inference::ModelSession;
use crate::pipeline::CancellationToken;

/// Embedding network input side length.
pub const EMBEDDER_INPUT_SIZE: u32 = 112;

/// Extracts 512-D identity vectors from aligned 112×112 faces.
pub struct EmbeddingExtractor {
    session: Arc<dyn ModelSession>,
}

impl EmbeddingExtractor {
    #[must_use]
    pub fn new(session: Arc<dyn ModelSession>) -> Self {
        Self { session }
    }

    /// Runs the embedding network on the aligned crop. Inputs that are not
    /// already 112×112 are bilinearly resized.
    ///
    /// # Errors
    ///
    /// Propagates inference failures and cancellation; a malformed output
    /// vector surfaces as [`PipelineError::Inference`].
    pub fn extract(
        &self,
        aligned: &Frame,
        cancel: &CancellationToken,
    ) -> Result<Embedding, PipelineError> {
        cancel.checkpoint()?;
        let input = aligned
            .resize(EMBEDDER_INPUT_SIZE, EMBEDDER_INPUT_SIZE, Interpolation::Bilinear)
            .to_chw_tensor_scaled();
        let outputs = self.session.run(input.into_dyn())?;
        let values: Vec<f32> = outputs
            .first()
            .map(|o| o.iter().copied().collect())
            .unwrap_or_default();
        if values.len() != EMBEDDING_DIM {
            return Err(PipelineError::Inference(format!(
                "embedding model produced {} values, expected {EMBEDDING_DIM}",
                values.len()
            )));
        }
        Embedding::from_f32(&values)
            .map_err(|e| PipelineError::Inference(format!("embedding output: {e}")))
    }
}

//! Pipeline error kinds.
//!
//! Gate failures (blur, albedo, occlusion, liveness, no face) are not errors;
//! they surface as structured [`LivenessVerdict`](super::LivenessVerdict)
//! values. The variants here abort the call.

use thiserror::Error;

/// Fatal failures of a pipeline invocation.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Source raster is outside the accepted size bounds or malformed.
    #[error("invalid input image: {0}")]
    InvalidImage(String),

    /// A model could not be decrypted or constructed.
    #[error("failed to load model '{name}': {source}")]
    ModelLoadFailed {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    /// A session failed mid-call. No retry happens inside the core.
    #[error("inference failed: {0}")]
    Inference(String),

    /// The caller's cancellation token fired; no verdict was produced.
    #[error("operation cancelled")]
    Cancelled,
}

impl PipelineError {
    /// Shorthand for [`PipelineError::ModelLoadFailed`].
    pub fn model_load(name: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::ModelLoadFailed {
            name: name.into(),
            source: source.into(),
        }
    }
}

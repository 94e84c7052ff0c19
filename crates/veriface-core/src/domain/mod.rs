//! Core domain types: frames, geometry, verdicts, embeddings, errors.

mod embedding;
mod error;
mod frame;
mod geometry;
mod verdict;

pub use embedding::{Embedding, EmbeddingError, DEFAULT_COSINE_THRESHOLD, EMBEDDING_DIM};
pub use error::PipelineError;
pub use frame::{Frame, Interpolation, MAX_DIMENSION, MIN_DIMENSION};
pub use geometry::{BoundingBox, FaceDetection, Landmarks};
pub use verdict::{LivenessScores, LivenessVerdict, OcclusionScores, Prediction};

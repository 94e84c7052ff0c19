//! veriface-core — on-device face liveness and verification.
//!
//! Given a still RGBA image, the pipeline decides whether the face in it is
//! genuine (live, unoccluded, in focus, correctly illuminated) and, when it
//! is, produces a 512-dimensional embedding for identity comparison.
//!
//! The crate is organized around the flow:
//!
//! 1. [`detect`] — cascaded face detection with five landmarks;
//! 2. [`align`] — similarity-transform alignment to a 112×112 crop;
//! 3. [`modules`] — sharpness, albedo, occlusion, and liveness gates plus
//!    the embedding extractor;
//! 4. [`pipeline`] — the short-circuiting orchestrator and the async
//!    enroll/verify engine;
//! 5. [`inference`] — encrypted model loading and ONNX sessions;
//! 6. [`ports`] — the collaborator interfaces (model bytes, key material,
//!    embedding storage, remote verification, face cropping).

pub mod align;
pub mod detect;
pub mod domain;
pub mod inference;
pub mod modules;
pub mod pipeline;
pub mod ports;

pub use domain::{
    BoundingBox, Embedding, FaceDetection, Frame, Interpolation, Landmarks, LivenessScores,
    LivenessVerdict, OcclusionScores, PipelineError, Prediction, DEFAULT_COSINE_THRESHOLD,
    EMBEDDING_DIM,
};
pub use inference::{ModelKind, ModelSession, ModelStore};
pub use pipeline::{
    CancellationToken, EnrollOutcome, FaceEngine, IdentifyOutcome, LivenessPipeline,
    PipelineConfig, VerifyOutcome,
};

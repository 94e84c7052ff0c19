//! Inference sessions with named, ordered I/O.
//!
//! [`ModelSession`] is the seam between the numeric pipeline and the ONNX
//! runtime: every classifier and detector stage talks to a trait object, so
//! tests substitute scripted sessions without model binaries.

use std::sync::Mutex;

use ndarray::{ArrayD, IxDyn};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;

use crate::domain::PipelineError;

/// A loaded model. Implementations guard their scratch state so that one
/// `run` covers preprocess, inference, and postprocess exclusively.
pub trait ModelSession: Send + Sync + std::fmt::Debug {
    /// Model identifier, used in logs and error messages.
    fn name(&self) -> &str;

    /// Graph input names in declaration order. Every model in this pipeline
    /// takes exactly one image tensor.
    fn input_names(&self) -> &[String];

    /// Graph output names in declaration order; `run` returns tensors in
    /// this order.
    fn output_names(&self) -> &[String];

    /// Feeds one input tensor and returns all outputs.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Inference`] on any session failure.
    fn run(&self, input: ArrayD<f32>) -> Result<Vec<ArrayD<f32>>, PipelineError>;
}

/// ONNX Runtime backed session.
///
/// The inner [`Session`] is behind a `Mutex`: `run` takes the lock for the
/// whole inference call, and intra-op threads are pinned to 1 so the lock
/// never spans an unbounded wait.
#[derive(Debug)]
pub struct OrtModelSession {
    name: String,
    input_names: Vec<String>,
    output_names: Vec<String>,
    session: Mutex<Session>,
}

impl OrtModelSession {
    /// Builds a session from in-memory (already decrypted) model bytes.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::ModelLoadFailed`] when graph construction
    /// fails.
    pub fn from_model_bytes(name: &str, bytes: &[u8]) -> Result<Self, PipelineError> {
        let session = Session::builder()
            .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|b| b.with_intra_threads(1))
            .and_then(|b| b.commit_from_memory(bytes))
            .map_err(|e| PipelineError::model_load(name, anyhow::anyhow!("{e}")))?;

        let input_names = session.inputs.iter().map(|i| i.name.clone()).collect();
        let output_names = session.outputs.iter().map(|o| o.name.clone()).collect();
        tracing::debug!(model = name, ?input_names, ?output_names, "session ready");

        Ok(Self {
            name: name.to_string(),
            input_names,
            output_names,
            session: Mutex::new(session),
        })
    }
}

impl ModelSession for OrtModelSession {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_names(&self) -> &[String] {
        &self.input_names
    }

    fn output_names(&self) -> &[String] {
        &self.output_names
    }

    fn run(&self, input: ArrayD<f32>) -> Result<Vec<ArrayD<f32>>, PipelineError> {
        let input_name = self.input_names.first().ok_or_else(|| {
            PipelineError::Inference(format!("model '{}' declares no inputs", self.name))
        })?;

        let shape: Vec<usize> = input.shape().to_vec();
        let (data, _) = input.into_raw_vec_and_offset();
        let tensor = Tensor::from_array((shape, data)).map_err(|e| {
            PipelineError::Inference(format!("input tensor for '{}': {e}", self.name))
        })?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| PipelineError::Inference(format!("session lock poisoned: {}", self.name)))?;
        let outputs = session
            .run(ort::inputs![input_name.as_str() => tensor])
            .map_err(|e| PipelineError::Inference(format!("'{}' run failed: {e}", self.name)))?;

        let mut result = Vec::with_capacity(self.output_names.len());
        for out_name in &self.output_names {
            let (shape, data) = outputs[out_name.as_str()]
                .try_extract_tensor::<f32>()
                .map_err(|e| {
                    PipelineError::Inference(format!(
                        "extracting '{out_name}' from '{}': {e}",
                        self.name
                    ))
                })?;
            let dims: Vec<usize> = shape.iter().map(|&d| d as usize).collect();
            let array = ArrayD::from_shape_vec(IxDyn(&dims), data.to_vec()).map_err(|e| {
                PipelineError::Inference(format!("reshaping '{out_name}': {e}"))
            })?;
            result.push(array);
        }
        Ok(result)
    }
}

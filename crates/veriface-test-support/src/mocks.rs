//! Scripted sessions and mock ports.

#![allow(clippy::cast_precision_loss)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use ndarray::{Array1, Array2, Array4, ArrayD};

use veriface_core::domain::{Embedding, EMBEDDING_DIM};
use veriface_core::inference::{ModelSession, KEY_LEN};
use veriface_core::ports::{
    EmbeddingStore, EnrolledRecord, FaceCropOutcome, FaceCropProvider, KeySource, ModelByteSource,
    RemoteResponse, RemoteVerifyApi,
};
use veriface_core::PipelineError;

type Behavior = Box<dyn Fn(&ArrayD<f32>) -> Vec<ArrayD<f32>> + Send + Sync>;

/// A [`ModelSession`] whose outputs are computed by a closure.
pub struct ScriptedSession {
    name: String,
    input_names: Vec<String>,
    output_names: Vec<String>,
    behavior: Behavior,
}

impl std::fmt::Debug for ScriptedSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedSession")
            .field("name", &self.name)
            .field("input_names", &self.input_names)
            .field("output_names", &self.output_names)
            .finish_non_exhaustive()
    }
}

impl ScriptedSession {
    #[must_use]
    pub fn new(name: &str, output_names: &[&str], behavior: Behavior) -> Arc<dyn ModelSession> {
        Arc::new(Self {
            name: name.to_string(),
            input_names: vec!["input".to_string()],
            output_names: output_names.iter().map(|s| (*s).to_string()).collect(),
            behavior,
        })
    }

    /// Two-class session emitting fixed raw logits (occlusion-style).
    #[must_use]
    pub fn fixed_logits(name: &str, logits: [f32; 2]) -> Arc<dyn ModelSession> {
        Self::new(
            name,
            &["logits"],
            Box::new(move |_| vec![Array1::from_vec(logits.to_vec()).into_dyn()]),
        )
    }

    /// Two-class session emitting fixed, already-softmaxed probabilities
    /// (liveness-style).
    #[must_use]
    pub fn fixed_probabilities(name: &str, probs: [f32; 2]) -> Arc<dyn ModelSession> {
        Self::new(
            name,
            &["probabilities"],
            Box::new(move |_| vec![Array1::from_vec(probs.to_vec()).into_dyn()]),
        )
    }

    /// Embedding session deriving a deterministic 512-vector from the input
    /// mean. Different inputs decorrelate quickly, so distinct frames
    /// produce low cosine similarity while identical frames reproduce the
    /// exact vector.
    #[must_use]
    pub fn embedding_from_input() -> Arc<dyn ModelSession> {
        Self::new(
            "embedding",
            &["embedding"],
            Box::new(|input| {
                let mean = input.iter().copied().sum::<f32>() / input.len() as f32;
                let phase = mean * 13.7;
                let values: Vec<f32> = (0..EMBEDDING_DIM)
                    .map(|i| (phase + i as f32 * 0.618).sin())
                    .collect();
                vec![Array1::from_vec(values).into_dyn()]
            }),
        )
    }

    /// Proposal network emitting one confident cell at the grid center of
    /// every scale.
    #[must_use]
    pub fn proposal_grid(score: f32) -> Arc<dyn ModelSession> {
        Self::new(
            "pnet",
            &["offsets", "scores"],
            Box::new(move |input| {
                let h = input.shape()[2];
                let w = input.shape()[3];
                let grid_h = h.saturating_sub(12) / 2 + 1;
                let grid_w = w.saturating_sub(12) / 2 + 1;
                let offsets = Array4::<f32>::zeros((1, 4, grid_h, grid_w));
                let mut scores = Array4::<f32>::zeros((1, 2, grid_h, grid_w));
                scores[[0, 1, grid_h / 2, grid_w / 2]] = score;
                vec![offsets.into_dyn(), scores.into_dyn()]
            }),
        )
    }

    /// Refine network scoring every crop identically.
    #[must_use]
    pub fn refine_all(score: f32) -> Arc<dyn ModelSession> {
        Self::new(
            "rnet",
            &["offsets", "scores"],
            Box::new(move |input| {
                let n = input.shape()[0];
                let offsets = Array2::<f32>::zeros((n, 4));
                let mut scores = Array2::<f32>::zeros((n, 2));
                scores.column_mut(1).fill(score);
                vec![offsets.into_dyn(), scores.into_dyn()]
            }),
        )
    }

    /// Output network scoring every crop identically with a spread landmark
    /// constellation (`[x0..x4, y0..y4]`, box-relative).
    #[must_use]
    pub fn output_all(score: f32, landmark_row: [f32; 10]) -> Arc<dyn ModelSession> {
        Self::new(
            "onet",
            &["landmarks", "offsets", "scores"],
            Box::new(move |input| {
                let n = input.shape()[0];
                let mut landmarks = Array2::<f32>::zeros((n, 10));
                for mut row in landmarks.rows_mut() {
                    for (i, value) in landmark_row.iter().enumerate() {
                        row[i] = *value;
                    }
                }
                let offsets = Array2::<f32>::zeros((n, 4));
                let mut scores = Array2::<f32>::zeros((n, 2));
                scores.column_mut(1).fill(score);
                vec![landmarks.into_dyn(), offsets.into_dyn(), scores.into_dyn()]
            }),
        )
    }

    /// A face-shaped landmark row usable with [`ScriptedSession::output_all`].
    #[must_use]
    pub const fn face_landmark_row() -> [f32; 10] {
        [0.3, 0.7, 0.5, 0.35, 0.65, 0.3, 0.3, 0.5, 0.75, 0.75]
    }
}

impl ModelSession for ScriptedSession {
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
        Ok((self.behavior)(&input))
    }
}

/// Map-backed [`ModelByteSource`].
#[derive(Default)]
pub struct MockByteSource {
    payloads: HashMap<String, Vec<u8>>,
}

impl MockByteSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_payload(mut self, name: &str, bytes: Vec<u8>) -> Self {
        self.payloads.insert(name.to_string(), bytes);
        self
    }
}

impl ModelByteSource for MockByteSource {
    fn get(&self, name: &str) -> anyhow::Result<Vec<u8>> {
        self.payloads
            .get(name)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no payload for {name}"))
    }
}

/// Fixed-key [`KeySource`].
pub struct MockKeySource(pub [u8; KEY_LEN]);

impl KeySource for MockKeySource {
    fn get(&self) -> anyhow::Result<[u8; KEY_LEN]> {
        Ok(self.0)
    }
}

/// [`FaceCropProvider`] with a scripted outcome.
pub enum MockFaceCrop {
    /// Always report no face.
    NoFace,
    /// Always fail.
    Failing,
}

impl FaceCropProvider for MockFaceCrop {
    fn crop(&self, _frame: &veriface_core::Frame) -> anyhow::Result<FaceCropOutcome> {
        match self {
            Self::NoFace => Ok(FaceCropOutcome::NoFace),
            Self::Failing => anyhow::bail!("face crop backend unavailable"),
        }
    }
}

/// [`RemoteVerifyApi`] returning a canned response and recording requests.
pub struct MockRemoteVerify {
    response: RemoteResponse,
    requests: Mutex<Vec<(String, usize)>>,
}

impl MockRemoteVerify {
    #[must_use]
    pub fn new(response: RemoteResponse) -> Self {
        Self {
            response,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// `(user_id, payload_len)` pairs seen so far.
    #[must_use]
    pub fn requests(&self) -> Vec<(String, usize)> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl RemoteVerifyApi for MockRemoteVerify {
    async fn verify(&self, user_id: &str, face_jpeg: &[u8]) -> anyhow::Result<RemoteResponse> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((user_id.to_string(), face_jpeg.len()));
        Ok(self.response.clone())
    }
}

/// Synchronous in-memory [`EmbeddingStore`] for engine tests.
#[derive(Default)]
pub struct MockEmbeddingStore {
    records: Mutex<HashMap<String, EnrolledRecord>>,
    match_counts: Mutex<HashMap<String, u64>>,
}

impl MockEmbeddingStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn match_count(&self, user_id: &str) -> u64 {
        self.match_counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(user_id)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl EmbeddingStore for MockEmbeddingStore {
    async fn put(
        &self,
        user_id: &str,
        name: &str,
        embedding: &Embedding,
        image_blob: Option<&[u8]>,
    ) -> anyhow::Result<bool> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                user_id.to_string(),
                EnrolledRecord {
                    name: name.to_string(),
                    embedding: embedding.clone(),
                    image_blob: image_blob.map(<[u8]>::to_vec),
                    enrolled_at: "1970-01-01T00:00:00Z".to_string(),
                },
            );
        Ok(true)
    }

    async fn get(&self, user_id: &str) -> anyhow::Result<Option<EnrolledRecord>> {
        Ok(self
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(user_id)
            .cloned())
    }

    async fn list(&self) -> anyhow::Result<HashMap<String, EnrolledRecord>> {
        Ok(self
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    async fn delete(&self, user_id: &str) -> anyhow::Result<bool> {
        Ok(self
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(user_id)
            .is_some())
    }

    async fn increment_match(&self, user_id: &str) -> anyhow::Result<bool> {
        let exists = self
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(user_id);
        if exists {
            *self
                .match_counts
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .entry(user_id.to_string())
                .or_insert(0) += 1;
        }
        Ok(exists)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_session_reports_metadata() {
        let session = ScriptedSession::fixed_logits("occlusion", [1.0, -1.0]);
        assert_eq!(session.name(), "occlusion");
        assert_eq!(session.input_names().len(), 1);
        let out = session
            .run(ArrayD::zeros(ndarray::IxDyn(&[1, 3, 4, 4])))
            .expect("run");
        assert_eq!(out[0].len(), 2);
    }

    #[test]
    fn embedding_mock_is_input_sensitive() {
        let session = ScriptedSession::embedding_from_input();
        let a = session
            .run(ArrayD::from_elem(ndarray::IxDyn(&[1, 3, 4, 4]), 0.1))
            .expect("run");
        let b = session
            .run(ArrayD::from_elem(ndarray::IxDyn(&[1, 3, 4, 4]), 0.9))
            .expect("run");
        assert_ne!(a[0], b[0]);
        assert_eq!(a[0].len(), EMBEDDING_DIM);
    }

    #[test]
    fn byte_source_serves_registered_payloads() {
        let source = MockByteSource::new().with_payload("pnet", vec![1, 2, 3]);
        assert_eq!(source.get("pnet").expect("payload"), vec![1, 2, 3]);
        assert!(source.get("rnet").is_err());
    }
}

//! Identity embeddings and cosine comparison.
//!
//! Inference produces 512 float32 values; they are promoted to f64 here so
//! the cosine math matches across platforms. Stored vectors are kept as-is,
//! without L2 pre-normalization.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Dimensionality of the identity embedding.
pub const EMBEDDING_DIM: usize = 512;

/// Cosine similarity above this counts as an identity match.
pub const DEFAULT_COSINE_THRESHOLD: f64 = 0.7;

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("invalid embedding dimension: {0} (expected {EMBEDDING_DIM})")]
    InvalidDimension(usize),
    #[error("embedding contains a non-finite value")]
    NonFinite,
}

/// A 512-dimensional identity vector.
///
/// Serializes as a bare JSON array of 512 doubles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding {
    values: Vec<f64>,
}

impl Embedding {
    /// Validates dimensionality and finiteness.
    ///
    /// # Errors
    ///
    /// Returns [`EmbeddingError`] on a wrong dimension or NaN/Inf entries.
    pub fn new(values: Vec<f64>) -> Result<Self, EmbeddingError> {
        if values.len() != EMBEDDING_DIM {
            return Err(EmbeddingError::InvalidDimension(values.len()));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(EmbeddingError::NonFinite);
        }
        Ok(Self { values })
    }

    /// Promotes raw float32 model output.
    ///
    /// # Errors
    ///
    /// Returns [`EmbeddingError`] on a wrong dimension or NaN/Inf entries.
    pub fn from_f32(values: &[f32]) -> Result<Self, EmbeddingError> {
        Self::new(values.iter().map(|&v| f64::from(v)).collect())
    }

    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    /// Exact dot-product cosine similarity; no pre-normalization of either
    /// operand. Returns 0 for a zero vector.
    #[must_use]
    pub fn cosine(&self, other: &Self) -> f64 {
        let mut dot = 0.0f64;
        let mut norm_a = 0.0f64;
        let mut norm_b = 0.0f64;
        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }
        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 {
            dot / denom
        } else {
            0.0
        }
    }

    /// Strict-greater match gate.
    #[must_use]
    pub fn matches(&self, other: &Self, threshold: f64) -> bool {
        self.cosine(other) > threshold
    }

    /// Encodes as the persisted JSON array form.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.values).unwrap_or_else(|_| "[]".to_string())
    }

    /// Decodes the persisted JSON array form.
    ///
    /// # Errors
    ///
    /// Returns an error when the payload is not a 512-double array.
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let values: Vec<f64> = serde_json::from_str(json)?;
        Ok(Self::new(values)?)
    }
}

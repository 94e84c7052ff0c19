//! Model registry: decrypts model payloads and caches live sessions.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::domain::PipelineError;
use crate::ports::{KeySource, ModelByteSource};

use super::crypto::decrypt_model_bytes;
use super::session::{ModelSession, OrtModelSession};

/// The models this pipeline knows how to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelKind {
    PNet,
    RNet,
    ONet,
    Embedding,
    Occlusion,
    /// Full-width liveness ensemble member.
    LivenessFull,
    /// Half-width liveness ensemble member.
    LivenessHalf,
}

impl ModelKind {
    /// Stable payload name used with [`ModelByteSource::get`].
    #[must_use]
    pub const fn payload_name(self) -> &'static str {
        match self {
            Self::PNet => "pnet",
            Self::RNet => "rnet",
            Self::ONet => "onet",
            Self::Embedding => "embedding",
            Self::Occlusion => "occlusion",
            Self::LivenessFull => "liveness_1_0x",
            Self::LivenessHalf => "liveness_0_5x",
        }
    }

    pub const ALL: [Self; 7] = [
        Self::PNet,
        Self::RNet,
        Self::ONet,
        Self::Embedding,
        Self::Occlusion,
        Self::LivenessFull,
        Self::LivenessHalf,
    ];
}

/// Long-lived session cache. Sessions are shared by immutable handle; the
/// cache itself is the only mutable state and sits behind one lock.
pub struct ModelStore {
    bytes: Arc<dyn ModelByteSource>,
    keys: Arc<dyn KeySource>,
    cache: Mutex<HashMap<ModelKind, Arc<dyn ModelSession>>>,
}

impl ModelStore {
    #[must_use]
    pub fn new(bytes: Arc<dyn ModelByteSource>, keys: Arc<dyn KeySource>) -> Self {
        Self {
            bytes,
            keys,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Eagerly loads a set of models, typically at boot so the first
    /// pipeline call pays no decryption cost.
    ///
    /// # Errors
    ///
    /// Returns the first load failure.
    pub fn preload(&self, kinds: &[ModelKind]) -> Result<(), PipelineError> {
        for &kind in kinds {
            self.load(kind)?;
        }
        Ok(())
    }

    /// Returns the cached session for `kind`, loading and decrypting it on
    /// first use.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::ModelLoadFailed`] when the payload is
    /// missing, the key is wrong, or graph construction fails.
    pub fn load(&self, kind: ModelKind) -> Result<Arc<dyn ModelSession>, PipelineError> {
        let name = kind.payload_name();
        {
            let cache = self
                .cache
                .lock()
                .map_err(|_| PipelineError::Inference("model cache lock poisoned".into()))?;
            if let Some(session) = cache.get(&kind) {
                return Ok(Arc::clone(session));
            }
        }

        let ciphertext = self
            .bytes
            .get(name)
            .map_err(|e| PipelineError::model_load(name, e))?;
        let key = self
            .keys
            .get()
            .map_err(|e| PipelineError::model_load(name, e))?;
        let plaintext =
            decrypt_model_bytes(&ciphertext, &key).map_err(|e| PipelineError::model_load(name, e))?;
        tracing::info!(model = name, bytes = plaintext.len(), "model decrypted");

        let session: Arc<dyn ModelSession> =
            Arc::new(OrtModelSession::from_model_bytes(name, &plaintext)?);

        let mut cache = self
            .cache
            .lock()
            .map_err(|_| PipelineError::Inference("model cache lock poisoned".into()))?;
        Ok(Arc::clone(cache.entry(kind).or_insert(session)))
    }
}

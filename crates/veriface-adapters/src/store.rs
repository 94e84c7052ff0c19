//! In-memory embedding store.
//!
//! A `tokio::sync::RwLock` map with the same observable semantics a
//! persistent backend must provide: replace-on-put, atomic match counting,
//! and RFC 3339 timestamps.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;

use veriface_core::domain::Embedding;
use veriface_core::ports::{EmbeddingStore, EnrolledRecord};

/// Per-user bookkeeping kept next to the record.
#[derive(Debug, Clone)]
struct StoredEntry {
    record: EnrolledRecord,
    match_count: u64,
    last_match_at: Option<String>,
}

/// Volatile [`EmbeddingStore`] implementation.
#[derive(Default)]
pub struct MemoryEmbeddingStore {
    entries: RwLock<HashMap<String, StoredEntry>>,
}

impl MemoryEmbeddingStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Match statistics for a user: `(count, last_match_at)`.
    pub async fn match_stats(&self, user_id: &str) -> Option<(u64, Option<String>)> {
        self.entries
            .read()
            .await
            .get(user_id)
            .map(|e| (e.match_count, e.last_match_at.clone()))
    }
}

#[async_trait]
impl EmbeddingStore for MemoryEmbeddingStore {
    async fn put(
        &self,
        user_id: &str,
        name: &str,
        embedding: &Embedding,
        image_blob: Option<&[u8]>,
    ) -> anyhow::Result<bool> {
        let entry = StoredEntry {
            record: EnrolledRecord {
                name: name.to_string(),
                embedding: embedding.clone(),
                image_blob: image_blob.map(<[u8]>::to_vec),
                enrolled_at: Utc::now().to_rfc3339(),
            },
            match_count: 0,
            last_match_at: None,
        };
        self.entries
            .write()
            .await
            .insert(user_id.to_string(), entry);
        debug!(user_id, "embedding stored");
        Ok(true)
    }

    async fn get(&self, user_id: &str) -> anyhow::Result<Option<EnrolledRecord>> {
        Ok(self
            .entries
            .read()
            .await
            .get(user_id)
            .map(|e| e.record.clone()))
    }

    async fn list(&self) -> anyhow::Result<HashMap<String, EnrolledRecord>> {
        Ok(self
            .entries
            .read()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), v.record.clone()))
            .collect())
    }

    async fn delete(&self, user_id: &str) -> anyhow::Result<bool> {
        Ok(self.entries.write().await.remove(user_id).is_some())
    }

    async fn increment_match(&self, user_id: &str) -> anyhow::Result<bool> {
        let mut entries = self.entries.write().await;
        let Some(entry) = entries.get_mut(user_id) else {
            return Ok(false);
        };
        entry.match_count += 1;
        entry.last_match_at = Some(Utc::now().to_rfc3339());
        Ok(true)
    }
}

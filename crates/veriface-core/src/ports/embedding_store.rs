//! Async key/value port for enrolled embeddings.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::domain::Embedding;

/// One enrolled identity.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrolledRecord {
    /// Display name supplied at enrollment.
    pub name: String,
    pub embedding: Embedding,
    /// Optional reference image (encoded bytes) stored alongside.
    pub image_blob: Option<Vec<u8>>,
    /// Enrollment timestamp, RFC 3339.
    pub enrolled_at: String,
}

/// Persistent storage for enrolled embeddings. Implementations decide the
/// backend; the core only awaits these calls and holds no lock across them.
#[async_trait]
pub trait EmbeddingStore: Send + Sync {
    /// Inserts or replaces a record. Returns whether the write happened.
    ///
    /// # Errors
    ///
    /// Backend failures.
    async fn put(
        &self,
        user_id: &str,
        name: &str,
        embedding: &Embedding,
        image_blob: Option<&[u8]>,
    ) -> anyhow::Result<bool>;

    /// Fetches a record by user id.
    ///
    /// # Errors
    ///
    /// Backend failures.
    async fn get(&self, user_id: &str) -> anyhow::Result<Option<EnrolledRecord>>;

    /// Lists all records keyed by user id.
    ///
    /// # Errors
    ///
    /// Backend failures.
    async fn list(&self) -> anyhow::Result<HashMap<String, EnrolledRecord>>;

    /// Removes a record. Returns whether anything was deleted.
    ///
    /// # Errors
    ///
    /// Backend failures.
    async fn delete(&self, user_id: &str) -> anyhow::Result<bool>;

    /// Atomically bumps the user's match counter and last-match timestamp.
    /// Returns whether the user existed.
    ///
    /// # Errors
    ///
    /// Backend failures.
    async fn increment_match(&self, user_id: &str) -> anyhow::Result<bool>;
}

//! Enrollment and verification flows over the embedding store.
//!
//! Composes the detector, aligner, liveness pipeline, and embedder into the
//! two end-to-end operations. The surface is async: inference blocks the
//! current task, the store is awaited, and no lock is held across an await.

use std::io::Cursor;
use std::sync::Arc;

use anyhow::Context;

use crate::align::FaceAligner;
use crate::detect::FaceDetector;
use crate::domain::{Embedding, Frame, LivenessVerdict, DEFAULT_COSINE_THRESHOLD};
use crate::modules::EmbeddingExtractor;
use crate::ports::{EmbeddingStore, RemoteVerdict, RemoteVerifyApi};

use super::{CancellationToken, LivenessPipeline, LIVENESS_REASON, NO_FACE_REASON};

/// Result of an enrollment attempt.
#[derive(Debug, Clone)]
pub struct EnrollOutcome {
    pub verdict: LivenessVerdict,
    /// Present when every gate passed and the embedding was extracted.
    pub embedding: Option<Embedding>,
    /// Whether the store accepted the record.
    pub stored: bool,
}

/// Result of a verification attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum VerifyOutcome {
    Match { similarity: f64 },
    Mismatch { similarity: f64 },
    NotEnrolled,
    /// The frame failed a liveness gate before comparison.
    Rejected(LivenessVerdict),
}

/// Result of a one-to-many identification sweep.
#[derive(Debug, Clone, PartialEq)]
pub enum IdentifyOutcome {
    Match {
        user_id: String,
        name: String,
        similarity: f64,
    },
    /// No enrolled identity cleared the threshold.
    NoMatch { best_similarity: f64 },
    /// Nothing is enrolled yet.
    EmptyGallery,
    /// The frame failed a liveness gate before comparison.
    Rejected(LivenessVerdict),
}

/// One gated, aligned, embedded frame.
struct ProcessedFrame {
    verdict: LivenessVerdict,
    accepted: Option<(Embedding, Frame)>,
}

/// The full verification engine.
pub struct FaceEngine {
    detector: FaceDetector,
    aligner: FaceAligner,
    pipeline: LivenessPipeline,
    embedder: EmbeddingExtractor,
    store: Arc<dyn EmbeddingStore>,
    cosine_threshold: f64,
}

impl FaceEngine {
    #[must_use]
    pub fn new(
        detector: FaceDetector,
        pipeline: LivenessPipeline,
        embedder: EmbeddingExtractor,
        store: Arc<dyn EmbeddingStore>,
    ) -> Self {
        Self {
            detector,
            aligner: FaceAligner::default(),
            pipeline,
            embedder,
            store,
            cosine_threshold: DEFAULT_COSINE_THRESHOLD,
        }
    }

    #[must_use]
    pub fn with_cosine_threshold(mut self, threshold: f64) -> Self {
        self.cosine_threshold = threshold;
        self
    }

    /// Detect, align, gate, and embed one frame.
    ///
    /// A clean run returns the live verdict plus the embedding and the
    /// aligned crop; a gate rejection returns the spoof verdict alone.
    async fn process(
        &self,
        frame: &Frame,
        cancel: &CancellationToken,
    ) -> anyhow::Result<ProcessedFrame> {
        let Some(face) = self.detector.detect_best(frame, cancel)? else {
            return Ok(ProcessedFrame {
                verdict: LivenessVerdict::spoof(1.0, NO_FACE_REASON),
                accepted: None,
            });
        };
        let Some(landmarks) = face.landmarks else {
            return Ok(ProcessedFrame {
                verdict: LivenessVerdict::spoof(1.0, NO_FACE_REASON),
                accepted: None,
            });
        };
        let aligned = self.aligner.align(frame, &landmarks)?;

        let verdict = self.pipeline.detect_liveness(frame, cancel)?;
        if !verdict.is_live() {
            return Ok(ProcessedFrame {
                verdict,
                accepted: None,
            });
        }

        let embedding = self.embedder.extract(&aligned, cancel)?;
        Ok(ProcessedFrame {
            verdict,
            accepted: Some((embedding, aligned)),
        })
    }

    /// Enrolls a user: on a fully-live frame the embedding is written to the
    /// store under `user_id`.
    ///
    /// # Errors
    ///
    /// Pipeline failures and store failures.
    pub async fn enroll(
        &self,
        user_id: &str,
        name: &str,
        frame: &Frame,
        image_blob: Option<&[u8]>,
        cancel: &CancellationToken,
    ) -> anyhow::Result<EnrollOutcome> {
        let processed = self.process(frame, cancel).await?;
        let verdict = processed.verdict;
        let Some((embedding, _)) = processed.accepted else {
            tracing::info!(user_id, reason = ?verdict.failure_reason, "enrollment rejected");
            return Ok(EnrollOutcome {
                verdict,
                embedding: None,
                stored: false,
            });
        };

        let stored = self
            .store
            .put(user_id, name, &embedding, image_blob)
            .await
            .context("storing enrollment")?;
        tracing::info!(user_id, stored, "enrollment complete");
        Ok(EnrollOutcome {
            verdict,
            embedding: Some(embedding),
            stored,
        })
    }

    /// Verifies a frame against the user's enrolled embedding. A cosine
    /// similarity strictly above the threshold is a match and bumps the
    /// store's match counter.
    ///
    /// # Errors
    ///
    /// Pipeline failures and store failures.
    pub async fn verify(
        &self,
        user_id: &str,
        frame: &Frame,
        cancel: &CancellationToken,
    ) -> anyhow::Result<VerifyOutcome> {
        let processed = self.process(frame, cancel).await?;
        let Some((embedding, _)) = processed.accepted else {
            return Ok(VerifyOutcome::Rejected(processed.verdict));
        };

        let Some(record) = self
            .store
            .get(user_id)
            .await
            .context("loading enrolled record")?
        else {
            return Ok(VerifyOutcome::NotEnrolled);
        };

        let similarity = embedding.cosine(&record.embedding);
        if similarity > self.cosine_threshold {
            self.store
                .increment_match(user_id)
                .await
                .context("recording match")?;
            tracing::info!(user_id, similarity, "verification matched");
            Ok(VerifyOutcome::Match { similarity })
        } else {
            tracing::info!(user_id, similarity, "verification mismatched");
            Ok(VerifyOutcome::Mismatch { similarity })
        }
    }

    /// Sweeps the whole gallery for the closest enrolled identity.
    ///
    /// # Errors
    ///
    /// Pipeline failures and store failures.
    pub async fn identify(
        &self,
        frame: &Frame,
        cancel: &CancellationToken,
    ) -> anyhow::Result<IdentifyOutcome> {
        let processed = self.process(frame, cancel).await?;
        let Some((embedding, _)) = processed.accepted else {
            return Ok(IdentifyOutcome::Rejected(processed.verdict));
        };

        let gallery = self.store.list().await.context("listing gallery")?;
        if gallery.is_empty() {
            return Ok(IdentifyOutcome::EmptyGallery);
        }

        let mut best: Option<(String, String, f64)> = None;
        for (user_id, record) in gallery {
            let similarity = embedding.cosine(&record.embedding);
            let better = best.as_ref().map_or(true, |(_, _, s)| similarity > *s);
            if better {
                best = Some((user_id, record.name, similarity));
            }
        }

        let Some((user_id, name, similarity)) = best else {
            return Ok(IdentifyOutcome::EmptyGallery);
        };
        if similarity > self.cosine_threshold {
            self.store
                .increment_match(&user_id)
                .await
                .context("recording match")?;
            tracing::info!(%user_id, similarity, "identification matched");
            Ok(IdentifyOutcome::Match {
                user_id,
                name,
                similarity,
            })
        } else {
            Ok(IdentifyOutcome::NoMatch {
                best_similarity: similarity,
            })
        }
    }

    /// Verifies through the remote API: the aligned face is encoded as JPEG
    /// and posted; the response code decides the outcome.
    ///
    /// # Errors
    ///
    /// Pipeline failures, transport failures, and unrecognized response
    /// codes.
    pub async fn verify_remote(
        &self,
        api: &dyn RemoteVerifyApi,
        user_id: &str,
        frame: &Frame,
        cancel: &CancellationToken,
    ) -> anyhow::Result<VerifyOutcome> {
        let processed = self.process(frame, cancel).await?;
        let Some((_, aligned)) = processed.accepted else {
            return Ok(VerifyOutcome::Rejected(processed.verdict));
        };

        let jpeg = encode_jpeg(&aligned).context("encoding aligned face")?;
        let response = api
            .verify(user_id, &jpeg)
            .await
            .context("remote verification call")?;

        match response.verdict() {
            RemoteVerdict::Match => Ok(VerifyOutcome::Match {
                similarity: response
                    .details
                    .as_ref()
                    .and_then(|d| d.similarity)
                    .unwrap_or(1.0),
            }),
            RemoteVerdict::Mismatch { similarity } => Ok(VerifyOutcome::Mismatch {
                similarity: similarity.unwrap_or(0.0),
            }),
            RemoteVerdict::NotEnrolled => Ok(VerifyOutcome::NotEnrolled),
            RemoteVerdict::Spoof => Ok(VerifyOutcome::Rejected(LivenessVerdict::spoof(
                1.0,
                LIVENESS_REASON,
            ))),
            RemoteVerdict::Unrecognized { code, message } => {
                anyhow::bail!("unrecognized remote response {code}: {message}")
            }
        }
    }
}

/// Encodes an aligned crop as JPEG for the remote multipart upload.
fn encode_jpeg(frame: &Frame) -> anyhow::Result<Vec<u8>> {
    let rgb = image::DynamicImage::ImageRgba8(frame.image().clone()).to_rgb8();
    let mut buffer = Cursor::new(Vec::new());
    rgb.write_to(&mut buffer, image::ImageFormat::Jpeg)
        .context("JPEG encoding")?;
    Ok(buffer.into_inner())
}

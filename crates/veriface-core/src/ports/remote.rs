//! Optional remote verification API: opaque request/response plus the
//! response-code mapping the core applies.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Detail block of a remote verification response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spoof_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occlusion_label: Option<String>,
}

/// Raw remote verification response payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteResponse {
    pub status: String,
    pub code: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<RemoteDetails>,
}

/// The core's interpretation of a remote response.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteVerdict {
    Match,
    Mismatch { similarity: Option<f64> },
    NotEnrolled,
    Spoof,
    Unrecognized { code: u16, message: String },
}

impl RemoteResponse {
    /// Maps the response onto a verdict:
    /// 400 with `spoof_label == "spoof"` is a spoof rejection, 404 means the
    /// user is not enrolled, 407 is an identity mismatch (with similarity
    /// when reported), and 200 or `status == "success"` is a match.
    #[must_use]
    pub fn verdict(&self) -> RemoteVerdict {
        match self.code {
            400 if self
                .details
                .as_ref()
                .and_then(|d| d.spoof_label.as_deref())
                == Some("spoof") =>
            {
                RemoteVerdict::Spoof
            }
            404 => RemoteVerdict::NotEnrolled,
            407 => RemoteVerdict::Mismatch {
                similarity: self.details.as_ref().and_then(|d| d.similarity),
            },
            200 => RemoteVerdict::Match,
            _ if self.status == "success" => RemoteVerdict::Match,
            code => RemoteVerdict::Unrecognized {
                code,
                message: self.message.clone(),
            },
        }
    }
}

/// Transport for the remote verification call: a multipart POST of the
/// aligned-face JPEG, answered with a [`RemoteResponse`].
#[async_trait]
pub trait RemoteVerifyApi: Send + Sync {
    /// # Errors
    ///
    /// Transport-level failures.
    async fn verify(&self, user_id: &str, face_jpeg: &[u8]) -> anyhow::Result<RemoteResponse>;
}

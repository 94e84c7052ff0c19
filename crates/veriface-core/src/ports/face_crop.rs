//! Port for the external face-crop collaborator.

use crate::domain::Frame;

/// Result of a crop attempt.
#[derive(Debug, Clone)]
pub enum FaceCropOutcome {
    /// A 224×224 crop centered on the detected face.
    Cropped(Frame),
    /// The collaborator found no face.
    NoFace,
}

/// Produces the tight face crop the anti-spoof gates run on. The pipeline
/// treats any failure (error or [`FaceCropOutcome::NoFace`]) as advisory and
/// falls back to the original frame.
pub trait FaceCropProvider: Send + Sync {
    /// # Errors
    ///
    /// Implementations may fail on inference errors; the pipeline logs and
    /// continues.
    fn crop(&self, frame: &Frame) -> anyhow::Result<FaceCropOutcome>;
}

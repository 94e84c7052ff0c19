//! Anti-spoof gate modules and the embedding extractor.

mod albedo;
mod embedder;
mod liveness;
mod occlusion;
mod sharpness;

pub use albedo::{AlbedoCheck, AlbedoConfig, AlbedoResult};
pub use embedder::EmbeddingExtractor;
pub use liveness::{LivenessConfig, LivenessEnsemble, LivenessOutcome};
pub use occlusion::{OcclusionClassifier, OcclusionConfig, OcclusionLabel, OcclusionOutcome};
pub use sharpness::{SharpnessAssessment, SharpnessConfig, SharpnessGate};

/// ImageNet channel means, used by the 224×224 classifier inputs.
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// ImageNet channel standard deviations.
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];
/// Classifier input side length.
pub const CLASSIFIER_INPUT_SIZE: u32 = 224;

/// Two-way softmax over raw logits.
#[must_use]
pub(crate) fn softmax2(a: f32, b: f32) -> (f32, f32) {
    // Shift by the max for numeric stability.
    let m = a.max(b);
    let ea = (a - m).exp();
    let eb = (b - m).exp();
    let sum = ea + eb;
    (ea / sum, eb / sum)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn softmax2_sums_to_one() {
        let (a, b) = softmax2(2.0, -1.0);
        assert!((a + b - 1.0).abs() < 1e-6);
        assert!(a > b);
    }

    #[test]
    fn softmax2_equal_logits_split_evenly() {
        let (a, b) = softmax2(3.0, 3.0);
        assert!((a - 0.5).abs() < 1e-6);
        assert!((b - 0.5).abs() < 1e-6);
    }

    #[test]
    fn softmax2_handles_large_logits() {
        let (a, b) = softmax2(1000.0, -1000.0);
        assert!(a > 0.999);
        assert!(b < 1e-3);
        assert!(a.is_finite() && b.is_finite());
    }
}

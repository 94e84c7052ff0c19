//! Albedo spoof check: channel-wise outlier statistics plus a brightness
//! gate.
//!
//! "Albedo" is a loose name; the statistic is the diversity of channel
//! intensities. Printed or replayed faces tend to flatten the green and blue
//! channels, so a live frame is expected to carry at least one upper-bound
//! outlier in each. A very bright frame (flash or overexposure) is spoof
//! outright.

use crate::domain::{Frame, Interpolation};
use crate::modules::CLASSIFIER_INPUT_SIZE;

/// Albedo gate tuning.
#[derive(Debug, Clone)]
pub struct AlbedoConfig {
    /// Mean brightness strictly above this is an overexposure spoof.
    pub brightness_threshold: f64,
    /// IQR multiplier for the per-channel upper outlier bound.
    pub iqr_multiplier: f64,
}

impl Default for AlbedoConfig {
    fn default() -> Self {
        Self {
            brightness_threshold: 200.0,
            iqr_multiplier: 1.5,
        }
    }
}

/// Full diagnostics of one albedo analysis. Channel indices are R, G, B.
#[derive(Debug, Clone)]
pub struct AlbedoResult {
    pub is_live: bool,
    /// Whether the brightness gate alone decided spoof.
    pub overexposed: bool,
    /// Mean of the three channel means.
    pub brightness: f64,
    /// Standard deviation of the luma plane.
    pub contrast: f64,
    pub channel_means: [f64; 3],
    pub channel_variances: [f64; 3],
    pub upper_bounds: [f64; 3],
    pub outlier_counts: [usize; 3],
}

/// The albedo spoof check.
#[derive(Debug, Clone, Default)]
pub struct AlbedoCheck {
    config: AlbedoConfig,
}

impl AlbedoCheck {
    #[must_use]
    pub const fn new(config: AlbedoConfig) -> Self {
        Self { config }
    }

    /// Analyzes a frame on its 224×224 bilinear resize.
    #[must_use]
    pub fn analyze(&self, frame: &Frame) -> AlbedoResult {
        let resized = frame.resize(
            CLASSIFIER_INPUT_SIZE,
            CLASSIFIER_INPUT_SIZE,
            Interpolation::Bilinear,
        );

        let mut channel_means = [0.0f64; 3];
        let mut channel_variances = [0.0f64; 3];
        let mut upper_bounds = [0.0f64; 3];
        let mut outlier_counts = [0usize; 3];

        for channel in 0..3 {
            let values = resized.channel_plane_f64(channel);
            let mean = values.iter().sum::<f64>() / values.len() as f64;
            let variance =
                values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / values.len() as f64;

            let mut sorted = values.clone();
            sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            let q25 = quantile(&sorted, 0.25);
            let q75 = quantile(&sorted, 0.75);
            let upper = mean + self.config.iqr_multiplier * (q75 - q25);

            channel_means[channel] = mean;
            channel_variances[channel] = variance;
            upper_bounds[channel] = upper;
            outlier_counts[channel] = values.iter().filter(|&&v| v > upper).count();
        }

        let brightness = channel_means.iter().sum::<f64>() / 3.0;
        let contrast = luma_std_dev(&resized);
        let overexposed = brightness > self.config.brightness_threshold;
        let is_live = !overexposed && outlier_counts[1] > 0 && outlier_counts[2] > 0;

        AlbedoResult {
            is_live,
            overexposed,
            brightness,
            contrast,
            channel_means,
            channel_variances,
            upper_bounds,
            outlier_counts,
        }
    }
}

/// Linear-interpolated quantile of an already-sorted slice.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = (lo + 1).min(sorted.len() - 1);
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

fn luma_std_dev(frame: &Frame) -> f64 {
    let luma = frame.luma_plane();
    let n = luma.len() as f64;
    let mean = luma.iter().map(|&v| f64::from(v)).sum::<f64>() / n;
    let var = luma
        .iter()
        .map(|&v| {
            let d = f64::from(v) - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    var.sqrt()
}

//! Arithmetic and recency-weighted means

use crate::buffer::Sample;

/// Arithmetic mean of the sample values
pub fn mean(samples: &[Sample]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    let sum: f64 = samples.iter().map(|s| s.value).sum();
    // SAFETY: usize to f64 - window sizes are far below 2^53
    Some(sum / samples.len() as f64)
}

/// Recency-weighted mean
///
/// Samples must be ordered oldest to newest. The i-th sample weighs `2^i`,
/// so every sample counts as much as all older samples combined. Weights are
/// evaluated relative to the newest sample (`2^-(n-1-i)`) so long windows
/// never overflow; very old samples simply underflow to zero weight.
pub fn weighted_mean(samples: &[Sample]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }

    let newest = samples.len() - 1;
    let mut weighted_sum = 0.0;
    let mut total_weight = 0.0;
    for (i, sample) in samples.iter().enumerate() {
        let age = i32::try_from(newest - i).unwrap_or(i32::MAX);
        let weight = 0.5_f64.powi(age);
        weighted_sum += weight * sample.value;
        total_weight += weight;
    }

    Some(weighted_sum / total_weight)
}

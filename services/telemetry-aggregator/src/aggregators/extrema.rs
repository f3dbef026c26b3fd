//! Window extrema

use crate::buffer::Sample;

/// Smallest sample value
pub fn minimum(samples: &[Sample]) -> Option<f64> {
    samples.iter().map(|s| s.value).reduce(f64::min)
}

/// Largest sample value
pub fn maximum(samples: &[Sample]) -> Option<f64> {
    samples.iter().map(|s| s.value).reduce(f64::max)
}

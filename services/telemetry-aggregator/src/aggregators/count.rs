//! Sample counting

use crate::buffer::Sample;

/// Number of samples in the window; an empty window counts as zero
pub fn count(samples: &[Sample]) -> f64 {
    // SAFETY: usize to f64 - window sizes are far below 2^53
    samples.len() as f64
}

//! Per data point buffer trimming

use crate::datapoint::DataPoint;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Trims one data point's buffer to the longest window its methods read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PurgeTask {
    data_point: usize,
    keep: Duration,
}

impl PurgeTask {
    /// Purge entity for the data point at `index`
    pub fn for_data_point(index: usize, data_point: &DataPoint) -> Self {
        Self {
            data_point: index,
            keep: data_point.max_window(),
        }
    }

    pub const fn data_point(&self) -> usize {
        self.data_point
    }

    /// Retention applied to the buffer
    pub const fn keep(&self) -> Duration {
        self.keep
    }

    /// Evict expired samples; returns the number removed
    pub fn run(&self, data_points: &[DataPoint], now: Instant) -> usize {
        let Some(data_point) = data_points.get(self.data_point) else {
            return 0;
        };
        let removed = data_point.buffer().purge(now, self.keep);
        if removed > 0 {
            debug!(
                topic = data_point.input_topic(),
                removed,
                retained = data_point.buffer().len(),
                "Purged expired samples"
            );
        }
        removed
    }
}

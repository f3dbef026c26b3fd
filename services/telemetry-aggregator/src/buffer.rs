//! Per-topic sample storage
//!
//! A [`SampleBuffer`] holds timestamped readings in arrival order behind a
//! reader-friendly lock. The subscription handler is the only appender;
//! jobs take short read locks to copy their window out, and the purge pass
//! takes the write lock only to pop expired samples from the front.

use parking_lot::RwLock;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// One timestamped reading
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Arrival time
    pub ts: Instant,
    /// Reading
    pub value: f64,
}

/// Append-only sample store with front eviction
#[derive(Debug)]
pub struct SampleBuffer {
    samples: RwLock<VecDeque<Sample>>,
    max_samples: usize,
}

impl SampleBuffer {
    /// Create a buffer holding at most `max_samples` samples
    pub fn new(max_samples: usize) -> Self {
        Self {
            samples: RwLock::new(VecDeque::new()),
            max_samples: max_samples.max(1),
        }
    }

    /// Append a reading
    ///
    /// Timestamps older than the newest stored sample are clamped to it so
    /// the buffer stays sorted. Returns the number of samples evicted to
    /// respect the size cap.
    pub fn append(&self, ts: Instant, value: f64) -> usize {
        let mut samples = self.samples.write();

        let ts = samples.back().map_or(ts, |last| ts.max(last.ts));
        samples.push_back(Sample { ts, value });

        let mut evicted = 0;
        while samples.len() > self.max_samples {
            samples.pop_front();
            evicted += 1;
        }
        evicted
    }

    /// Copy of the samples with `ts` in `[now - duration, now]`, oldest first
    pub fn window(&self, now: Instant, duration: Duration) -> Vec<Sample> {
        let samples = self.samples.read();

        let start = match now.checked_sub(duration) {
            Some(from) => samples.partition_point(|s| s.ts < from),
            None => 0,
        };
        let end = samples.partition_point(|s| s.ts <= now);

        samples.range(start..end.max(start)).copied().collect()
    }

    /// Drop samples older than `now - keep`; returns how many were removed
    pub fn purge(&self, now: Instant, keep: Duration) -> usize {
        let Some(cutoff) = now.checked_sub(keep) else {
            return 0;
        };

        // Cheap check under the read lock before contending with the writer
        if self.samples.read().front().is_none_or(|s| s.ts >= cutoff) {
            return 0;
        }

        let mut samples = self.samples.write();
        let expired = samples.partition_point(|s| s.ts < cutoff);
        samples.drain(..expired);
        expired
    }

    /// Number of stored samples
    pub fn len(&self) -> usize {
        self.samples.read().len()
    }

    /// True when no samples are stored
    pub fn is_empty(&self) -> bool {
        self.samples.read().is_empty()
    }

    /// Most recent sample, if any
    pub fn latest(&self) -> Option<Sample> {
        self.samples.read().back().copied()
    }

    /// Sample cap; appends beyond it evict the oldest sample
    pub const fn capacity(&self) -> usize {
        self.max_samples
    }
}

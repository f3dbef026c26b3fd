//! Engine counters

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free counters shared by the scheduler, workers and handlers
#[derive(Debug, Default)]
pub struct ManagerStats {
    ticks: AtomicU64,
    jobs_submitted: AtomicU64,
    jobs_completed: AtomicU64,
    jobs_failed: AtomicU64,
    jobs_skipped: AtomicU64,
    jobs_cancelled: AtomicU64,
    publishes_suppressed: AtomicU64,
    publishes_queued: AtomicU64,
    publishes_dropped: AtomicU64,
    publishes_failed: AtomicU64,
    samples_accepted: AtomicU64,
    samples_rejected: AtomicU64,
    samples_purged: AtomicU64,
    unsubscribes_failed: AtomicU64,
    started_at: Mutex<Option<DateTime<Utc>>>,
}

/// Point-in-time copy of [`ManagerStats`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub ticks: u64,
    pub jobs_submitted: u64,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    /// Jobs not enqueued because the previous tick's ticket was still pending
    pub jobs_skipped: u64,
    /// Queued jobs discarded by `stop()`
    pub jobs_cancelled: u64,
    /// Empty windows with no last-valid value to fall back on
    pub publishes_suppressed: u64,
    pub publishes_queued: u64,
    /// Results dropped because the outbound queue was full
    pub publishes_dropped: u64,
    pub publishes_failed: u64,
    pub samples_accepted: u64,
    pub samples_rejected: u64,
    pub samples_purged: u64,
    /// Unsubscribe calls the transport rejected during stop or rollback
    pub unsubscribes_failed: u64,
    /// Wall-clock time of the last successful `start()`
    pub started_at: Option<DateTime<Utc>>,
}

macro_rules! counters {
    ($($field:ident => $record:ident),* $(,)?) => {
        impl ManagerStats {
            $(
                pub(crate) fn $record(&self, n: u64) {
                    self.$field.fetch_add(n, Ordering::Relaxed);
                }
            )*

            /// Copy every counter
            pub fn snapshot(&self) -> StatsSnapshot {
                StatsSnapshot {
                    $($field: self.$field.load(Ordering::Relaxed),)*
                    started_at: *self.started_at.lock(),
                }
            }
        }
    };
}

counters! {
    ticks => record_ticks,
    jobs_submitted => record_jobs_submitted,
    jobs_completed => record_jobs_completed,
    jobs_failed => record_jobs_failed,
    jobs_skipped => record_jobs_skipped,
    jobs_cancelled => record_jobs_cancelled,
    publishes_suppressed => record_publishes_suppressed,
    publishes_queued => record_publishes_queued,
    publishes_dropped => record_publishes_dropped,
    publishes_failed => record_publishes_failed,
    samples_accepted => record_samples_accepted,
    samples_rejected => record_samples_rejected,
    samples_purged => record_samples_purged,
    unsubscribes_failed => record_unsubscribes_failed,
}

impl ManagerStats {
    pub(crate) fn mark_started(&self) {
        *self.started_at.lock() = Some(Utc::now());
    }
}

//! Periodic update cycle
//!
//! Every cycle the scheduler trims each buffer and then hands one ticket
//! per job to the worker pool. Both steps see the same tick instant, so a
//! purge never removes a sample a job of the same cycle would read.

use crate::job::JobTicket;
use crate::pool::JobSubmitter;
use crate::registry::Registry;
use crate::stats::ManagerStats;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

/// Handle to the running update loop
#[derive(Debug)]
pub struct UpdateScheduler {
    cycle: Duration,
    shutdown_tx: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

impl UpdateScheduler {
    /// Start ticking; the first tick fires one full cycle after this call
    pub fn spawn(
        cycle: Duration,
        registry: Arc<Registry>,
        submitter: JobSubmitter,
        stats: Arc<ManagerStats>,
    ) -> Self {
        let (shutdown_tx, mut shutdown_rx) = broadcast::channel::<()>(1);
        let first_tick = Instant::now() + cycle;

        let task = tokio::spawn(async move {
            let mut interval = interval_at(first_tick, cycle);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => break,
                    tick = interval.tick() => run_cycle(tick, &registry, &submitter, &stats),
                }
            }
            debug!("Update scheduler stopped");
        });

        info!(cycle_secs = cycle.as_secs_f64(), "Update scheduler started");
        Self {
            cycle,
            shutdown_tx,
            task,
        }
    }

    pub const fn cycle(&self) -> Duration {
        self.cycle
    }

    pub(crate) fn abort(&self) {
        self.task.abort();
    }

    /// Stop issuing ticks; a cycle already in progress completes first
    pub async fn cancel(self) {
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.task.await {
            warn!(error = %e, "Update scheduler ended abnormally");
        }
    }
}

/// One update cycle at `now`
pub fn run_cycle(now: Instant, registry: &Registry, submitter: &JobSubmitter, stats: &ManagerStats) {
    stats.record_ticks(1);

    let purged: usize = registry
        .purges()
        .iter()
        .map(|purge| purge.run(registry.data_points(), now))
        .sum();
    if purged > 0 {
        stats.record_samples_purged(purged as u64);
    }

    let mut submitted = 0u64;
    let mut skipped = 0u64;
    for (index, job) in registry.jobs().iter().enumerate() {
        if !job.try_mark_pending() {
            warn!(
                topic = job.output_topic(),
                "Previous execution still pending, skipping this cycle"
            );
            skipped += 1;
            continue;
        }
        match submitter.submit(JobTicket { job: index, now }) {
            Ok(()) => submitted += 1,
            Err(e) => {
                job.clear_pending();
                warn!(topic = job.output_topic(), error = %e, "Failed to submit job");
                skipped += 1;
            }
        }
    }

    stats.record_jobs_submitted(submitted);
    stats.record_jobs_skipped(skipped);
    trace!(purged, submitted, skipped, "Update cycle issued");
}

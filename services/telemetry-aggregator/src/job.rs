//! Aggregation jobs
//!
//! A job is one (data point, method) pair. Jobs are allocated once in the
//! [`Registry`] and addressed by index; each tick the scheduler only sends a
//! small [`JobTicket`] naming the job and the tick time.

use crate::error::{AggregatorError, AggregatorResult};
use crate::outbox::OutboxSender;
use crate::policy::{LastValidSlot, NoDataBehavior, Resolution};
use crate::registry::Registry;
use crate::stats::ManagerStats;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::debug;

/// One scheduled (data point, method) execution unit
#[derive(Debug)]
pub struct Job {
    data_point: usize,
    method: usize,
    output_topic: String,
    last_valid: LastValidSlot,
    pending: AtomicBool,
}

impl Job {
    /// Job for method `method` of data point `data_point`
    pub fn new(data_point: usize, method: usize, output_topic: impl Into<String>) -> Self {
        Self {
            data_point,
            method,
            output_topic: output_topic.into(),
            last_valid: LastValidSlot::default(),
            pending: AtomicBool::new(false),
        }
    }

    pub const fn data_point(&self) -> usize {
        self.data_point
    }

    pub const fn method(&self) -> usize {
        self.method
    }

    pub fn output_topic(&self) -> &str {
        &self.output_topic
    }

    /// Last successfully computed value
    pub fn last_value(&self) -> Option<f64> {
        self.last_valid.get()
    }

    /// True while a ticket for this job sits in the queue
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Claim the single queue slot of this job; false if a ticket is
    /// already queued
    pub(crate) fn try_mark_pending(&self) -> bool {
        self.pending
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn clear_pending(&self) {
        self.pending.store(false, Ordering::Release);
    }
}

/// Request to run one job against the window ending at `now`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobTicket {
    pub job: usize,
    pub now: Instant,
}

/// Everything a worker needs to run jobs
#[derive(Debug)]
pub struct JobContext {
    registry: Arc<Registry>,
    behavior: NoDataBehavior,
    outbox: OutboxSender,
    stats: Arc<ManagerStats>,
}

impl JobContext {
    pub fn new(
        registry: Arc<Registry>,
        behavior: NoDataBehavior,
        outbox: OutboxSender,
        stats: Arc<ManagerStats>,
    ) -> Self {
        Self {
            registry,
            behavior,
            outbox,
            stats,
        }
    }

    pub fn stats(&self) -> &ManagerStats {
        &self.stats
    }

    /// A worker took the ticket of `job` off the queue
    pub fn release(&self, job: usize) {
        if let Some(job) = self.registry.jobs().get(job) {
            job.clear_pending();
        }
    }

    /// Output topic of a job, for log context
    pub fn topic_of(&self, job: usize) -> &str {
        self.registry
            .jobs()
            .get(job)
            .map_or("<unknown>", Job::output_topic)
    }

    /// Snapshot the window, aggregate, apply the no-data policy and queue
    /// the result for publishing
    pub fn execute(&self, ticket: JobTicket) -> AggregatorResult<Resolution> {
        let job = self
            .registry
            .jobs()
            .get(ticket.job)
            .ok_or(AggregatorError::UnknownJob { job: ticket.job })?;
        let data_point = &self.registry.data_points()[job.data_point];
        let method = &data_point.methods()[job.method];

        let window = data_point.buffer().window(ticket.now, method.window());
        let aggregate = method.compute(&window)?;
        let resolution = self.behavior.resolve(aggregate, &job.last_valid);

        match resolution.value() {
            Some(value) => {
                self.outbox.offer(&job.output_topic, value);
            }
            None => self.stats.record_publishes_suppressed(1),
        }

        debug!(
            topic = %job.output_topic,
            samples = window.len(),
            ?resolution,
            "Job executed"
        );
        Ok(resolution)
    }
}

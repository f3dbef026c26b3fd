//! Fixed-size worker pool
//!
//! N worker tasks share one bounded ticket queue. A failing or panicking
//! job is logged and counted; the worker moves on to the next ticket.

use crate::error::{AggregatorError, AggregatorResult};
use crate::job::{JobContext, JobTicket};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

type SharedReceiver = Arc<Mutex<mpsc::Receiver<JobTicket>>>;

/// Cloneable, non-blocking handle for enqueueing tickets
#[derive(Debug, Clone)]
pub struct JobSubmitter {
    tx: mpsc::Sender<JobTicket>,
}

impl JobSubmitter {
    /// Enqueue a ticket without waiting
    pub fn submit(&self, ticket: JobTicket) -> AggregatorResult<()> {
        self.tx
            .try_send(ticket)
            .map_err(|_| AggregatorError::QueueFull { job: ticket.job })
    }

    /// Submitter whose queue is read by the caller instead of a pool
    #[cfg(test)]
    pub(crate) fn detached(capacity: usize) -> (Self, mpsc::Receiver<JobTicket>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

/// Running set of workers
#[derive(Debug)]
pub struct WorkerPool {
    submitter: JobSubmitter,
    receiver: SharedReceiver,
    workers: Vec<JoinHandle<()>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl WorkerPool {
    /// Spawn `size` workers over a queue holding at most `queue_capacity` tickets
    pub fn spawn(size: usize, queue_capacity: usize, ctx: Arc<JobContext>) -> Self {
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let receiver: SharedReceiver = Arc::new(Mutex::new(rx));
        let (shutdown_tx, _) = broadcast::channel::<()>(1);

        let workers = (0..size)
            .map(|worker_id| {
                let receiver = Arc::clone(&receiver);
                let shutdown_rx = shutdown_tx.subscribe();
                let ctx = Arc::clone(&ctx);
                tokio::spawn(worker_loop(worker_id, receiver, shutdown_rx, ctx))
            })
            .collect();

        info!(workers = size, queue_capacity, "Worker pool started");
        Self {
            submitter: JobSubmitter { tx },
            receiver,
            workers,
            shutdown_tx,
        }
    }

    pub fn submitter(&self) -> JobSubmitter {
        self.submitter.clone()
    }

    /// Number of live worker tasks
    pub fn active_workers(&self) -> usize {
        self.workers.len()
    }

    pub(crate) fn abort(&self) {
        for worker in &self.workers {
            worker.abort();
        }
    }

    /// Stop the workers
    ///
    /// Tickets not yet picked up are discarded; jobs already running get
    /// `grace` to finish before their workers are aborted. Returns the
    /// number of discarded tickets.
    pub async fn shutdown(self, grace: Duration) -> usize {
        let Self {
            submitter,
            receiver,
            mut workers,
            shutdown_tx,
        } = self;
        drop(submitter);
        let _ = shutdown_tx.send(());

        let joined = tokio::time::timeout(grace, async {
            for worker in &mut workers {
                if let Err(e) = worker.await {
                    warn!(error = %e, "Worker ended abnormally");
                }
            }
        })
        .await;

        if joined.is_err() {
            warn!(
                grace_ms = grace.as_millis() as u64,
                "Workers still busy after grace period, aborting"
            );
            for worker in &workers {
                worker.abort();
            }
        }

        let mut cancelled = 0;
        if let Ok(mut rx) = receiver.try_lock() {
            rx.close();
            while rx.try_recv().is_ok() {
                cancelled += 1;
            }
        }

        info!(cancelled, "Worker pool stopped");
        cancelled
    }
}

async fn worker_loop(
    worker_id: usize,
    receiver: SharedReceiver,
    mut shutdown_rx: broadcast::Receiver<()>,
    ctx: Arc<JobContext>,
) {
    debug!(worker_id, "Worker started");
    loop {
        let ticket = {
            let mut rx = tokio::select! {
                biased;
                _ = shutdown_rx.recv() => break,
                guard = receiver.lock() => guard,
            };
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => break,
                ticket = rx.recv() => ticket,
            }
        };
        let Some(ticket) = ticket else {
            break;
        };
        ctx.release(ticket.job);

        match catch_unwind(AssertUnwindSafe(|| ctx.execute(ticket))) {
            Ok(Ok(_)) => ctx.stats().record_jobs_completed(1),
            Ok(Err(e)) => {
                warn!(
                    worker_id,
                    topic = ctx.topic_of(ticket.job),
                    error = %e,
                    "Job failed, skipped this cycle"
                );
                ctx.stats().record_jobs_failed(1);
            }
            Err(_) => {
                error!(
                    worker_id,
                    topic = ctx.topic_of(ticket.job),
                    "Job panicked, skipped this cycle"
                );
                ctx.stats().record_jobs_failed(1);
            }
        }
    }
    debug!(worker_id, "Worker stopped");
}

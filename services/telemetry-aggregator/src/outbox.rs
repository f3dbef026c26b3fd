//! Bounded outbound publish queue
//!
//! Jobs hand results to the outbox without awaiting the transport. A single
//! task drains the queue into [`PubSubClient::publish`]; when the queue is
//! full the newest result is dropped instead of stalling a worker.

use crate::stats::ManagerStats;
use services_common::PubSubClient;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// One aggregate waiting to be published
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub topic: String,
    pub value: f64,
}

impl Outbound {
    /// Wire form: the number as text
    pub fn payload(&self) -> Vec<u8> {
        self.value.to_string().into_bytes()
    }
}

/// Non-blocking handle used by jobs
#[derive(Debug, Clone)]
pub struct OutboxSender {
    tx: mpsc::Sender<Outbound>,
    stats: Arc<ManagerStats>,
}

impl OutboxSender {
    /// Queue a value; returns `false` if it had to be dropped
    pub fn offer(&self, topic: &str, value: f64) -> bool {
        let outbound = Outbound {
            topic: topic.to_string(),
            value,
        };
        match self.tx.try_send(outbound) {
            Ok(()) => {
                self.stats.record_publishes_queued(1);
                true
            }
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                warn!(topic = %dropped.topic, "Publish queue full, dropping result");
                self.stats.record_publishes_dropped(1);
                false
            }
            Err(mpsc::error::TrySendError::Closed(dropped)) => {
                debug!(topic = %dropped.topic, "Publish queue closed, dropping result");
                self.stats.record_publishes_dropped(1);
                false
            }
        }
    }
}

/// Owner of the drain task
#[derive(Debug)]
pub struct Outbox {
    sender: OutboxSender,
    shutdown_tx: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

impl Outbox {
    /// Start draining into `client`
    pub fn spawn(client: Arc<dyn PubSubClient>, capacity: usize, stats: Arc<ManagerStats>) -> Self {
        let (tx, mut rx) = mpsc::channel::<Outbound>(capacity);
        let (shutdown_tx, mut shutdown_rx) = broadcast::channel::<()>(1);
        let task_stats = Arc::clone(&stats);

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    next = rx.recv() => match next {
                        Some(outbound) => deliver(client.as_ref(), outbound, &task_stats).await,
                        None => break,
                    },
                    _ = shutdown_rx.recv() => {
                        rx.close();
                        while let Some(outbound) = rx.recv().await {
                            deliver(client.as_ref(), outbound, &task_stats).await;
                        }
                        break;
                    }
                }
            }
            debug!("Outbox drained");
        });

        Self {
            sender: OutboxSender { tx, stats },
            shutdown_tx,
            task,
        }
    }

    pub fn sender(&self) -> OutboxSender {
        self.sender.clone()
    }

    pub(crate) fn abort(&self) {
        self.task.abort();
    }

    /// Flush what is queued, waiting at most `grace`
    pub async fn close(self, grace: Duration) {
        let Self {
            sender,
            shutdown_tx,
            mut task,
        } = self;
        drop(sender);
        let _ = shutdown_tx.send(());

        if tokio::time::timeout(grace, &mut task).await.is_err() {
            warn!(grace_ms = grace.as_millis() as u64, "Outbox did not drain in time, aborting");
            task.abort();
        }
    }
}

async fn deliver(client: &dyn PubSubClient, outbound: Outbound, stats: &ManagerStats) {
    if let Err(e) = client.publish(&outbound.topic, outbound.payload()).await {
        warn!(topic = %outbound.topic, error = %e, "Failed to publish aggregate");
        stats.record_publishes_failed(1);
    }
}

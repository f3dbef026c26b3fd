//! Top-level orchestrator
//!
//! `DataPointManager` owns the topology, subscribes the input topics and runs
//! the worker pool and update scheduler between `start()` and `stop()`.

use crate::config::AggregatorConfig;
use crate::datapoint::DataPoint;
use crate::error::{AggregatorError, AggregatorResult};
use crate::job::JobContext;
use crate::outbox::Outbox;
use crate::pool::WorkerPool;
use crate::registry::Registry;
use crate::scheduler::UpdateScheduler;
use crate::stats::{ManagerStats, StatsSnapshot};
use services_common::{PubSubClient, SubscriptionId};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Components alive while the manager is running
#[derive(Debug)]
struct Running {
    subscriptions: Vec<SubscriptionId>,
    outbox: Outbox,
    pool: WorkerPool,
    scheduler: UpdateScheduler,
}

/// Windowed aggregation engine
pub struct DataPointManager {
    config: AggregatorConfig,
    client: Arc<dyn PubSubClient>,
    registry: Arc<Registry>,
    stats: Arc<ManagerStats>,
    running: Mutex<Option<Running>>,
    active_workers: AtomicUsize,
    subscriptions: AtomicUsize,
}

impl DataPointManager {
    /// Build the manager in the stopped state
    ///
    /// The configuration is validated here; an invalid one never produces a
    /// manager.
    pub fn new(config: AggregatorConfig, client: Arc<dyn PubSubClient>) -> AggregatorResult<Self> {
        config.validate()?;
        let registry = Arc::new(Registry::build(&config)?);

        info!(
            data_points = registry.data_points().len(),
            jobs = registry.jobs().len(),
            workers = config.workers,
            update_cycle_secs = config.update_cycle_secs,
            no_data_behavior = ?config.no_data_behavior,
            "Data point manager created"
        );

        Ok(Self {
            config,
            client,
            registry,
            stats: Arc::new(ManagerStats::default()),
            running: Mutex::new(None),
            active_workers: AtomicUsize::new(0),
            subscriptions: AtomicUsize::new(0),
        })
    }

    /// Subscribe every input topic and start the workers and the timer
    ///
    /// Calling `start()` on a running manager does nothing. If any
    /// subscription fails, the ones already made are undone and the manager
    /// stays stopped.
    pub async fn start(&self) -> AggregatorResult<()> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            debug!("Data point manager already running");
            return Ok(());
        }

        let subscriptions = self.subscribe_all().await?;
        // tickets discarded by a previous stop() left their slots claimed
        self.registry.clear_pending();

        let outbox = Outbox::spawn(
            Arc::clone(&self.client),
            self.config.publish_queue_capacity,
            Arc::clone(&self.stats),
        );
        let ctx = Arc::new(JobContext::new(
            Arc::clone(&self.registry),
            self.config.no_data_behavior,
            outbox.sender(),
            Arc::clone(&self.stats),
        ));
        let pool = WorkerPool::spawn(self.config.workers, self.registry.jobs().len(), ctx);
        let scheduler = UpdateScheduler::spawn(
            self.config.update_cycle(),
            Arc::clone(&self.registry),
            pool.submitter(),
            Arc::clone(&self.stats),
        );

        self.active_workers.store(pool.active_workers(), Ordering::Release);
        self.subscriptions.store(subscriptions.len(), Ordering::Release);
        self.stats.mark_started();

        info!(
            subscriptions = subscriptions.len(),
            workers = pool.active_workers(),
            "Data point manager started"
        );

        *running = Some(Running {
            subscriptions,
            outbox,
            pool,
            scheduler,
        });
        Ok(())
    }

    /// Stop the timer, the workers and the subscriptions
    ///
    /// Queued jobs are discarded, running ones get the configured grace
    /// period. Stopping a stopped manager does nothing.
    pub async fn stop(&self) {
        let mut state = self.running.lock().await;
        let Some(running) = state.take() else {
            debug!("Data point manager already stopped");
            return;
        };
        let grace = self.config.shutdown_grace();

        running.scheduler.cancel().await;

        let cancelled = running.pool.shutdown(grace).await;
        self.stats.record_jobs_cancelled(cancelled as u64);
        self.active_workers.store(0, Ordering::Release);

        for id in running.subscriptions {
            if let Err(e) = self.client.unsubscribe(id).await {
                warn!(subscription = %id, error = %e, "Failed to unsubscribe");
                self.stats.record_unsubscribes_failed(1);
            }
        }
        // the ids are dropped either way; failures only show in the stats
        self.subscriptions.store(0, Ordering::Release);

        running.outbox.close(grace).await;

        info!(cancelled_jobs = cancelled, "Data point manager stopped");
    }

    async fn subscribe_all(&self) -> AggregatorResult<Vec<SubscriptionId>> {
        let mut subscriptions = Vec::with_capacity(self.registry.data_points().len());

        for data_point in self.registry.data_points() {
            let handler = data_point.ingest_handler(Arc::clone(&self.stats));
            match self.client.subscribe(data_point.input_topic(), handler).await {
                Ok(id) => {
                    debug!(topic = data_point.input_topic(), subscription = %id, "Subscribed");
                    subscriptions.push(id);
                }
                Err(source) => {
                    warn!(
                        topic = data_point.input_topic(),
                        error = %source,
                        "Subscribe failed, rolling back start"
                    );
                    for id in subscriptions {
                        if let Err(e) = self.client.unsubscribe(id).await {
                            warn!(subscription = %id, error = %e, "Failed to unsubscribe");
                            self.stats.record_unsubscribes_failed(1);
                        }
                    }
                    return Err(AggregatorError::Subscribe {
                        topic: data_point.input_topic().to_string(),
                        source,
                    });
                }
            }
        }

        Ok(subscriptions)
    }

    pub fn is_running(&self) -> bool {
        self.active_workers.load(Ordering::Acquire) > 0
    }

    /// Number of live workers: 0 when stopped, the configured count when running
    pub fn active_workers(&self) -> usize {
        self.active_workers.load(Ordering::Acquire)
    }

    /// Input topic subscriptions the manager holds
    ///
    /// `stop()` releases every id and resets this to 0 even when the
    /// transport rejects an unsubscribe; those rejections are counted in
    /// [`StatsSnapshot::unsubscribes_failed`].
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.load(Ordering::Acquire)
    }

    pub fn data_points(&self) -> &[DataPoint] {
        self.registry.data_points()
    }

    pub fn purge_count(&self) -> usize {
        self.registry.purges().len()
    }

    /// Jobs issued every cycle, one per (data point, method)
    pub fn job_count(&self) -> usize {
        self.registry.jobs().len()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Last value computed for `output_topic`, if any
    pub fn last_value(&self, output_topic: &str) -> Option<f64> {
        self.registry
            .job_for_topic(output_topic)
            .and_then(|job| job.last_value())
    }
}

impl std::fmt::Debug for DataPointManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataPointManager")
            .field("data_points", &self.registry.data_points().len())
            .field("jobs", &self.registry.jobs().len())
            .field("active_workers", &self.active_workers())
            .field("subscriptions", &self.subscription_count())
            .finish_non_exhaustive()
    }
}

impl Drop for DataPointManager {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            warn!("Data point manager dropped while running, aborting tasks");
            running.scheduler.abort();
            running.pool.abort();
            running.outbox.abort();
        }
    }
}

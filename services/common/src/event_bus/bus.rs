//! Core Event Bus Implementation
//!
//! In-process broker implementing [`PubSubClient`] on tokio broadcast channels

use super::{
    BusResult, EventBusError, MessageEnvelope, MessageMetadata, PubSubClient, SubscriptionId,
    TopicHandler, TopicMessage,
};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::constants::DEFAULT_BUS_CAPACITY;

type Envelope = MessageEnvelope<TopicMessage>;

/// Event bus configuration
#[derive(Debug, Clone)]
pub struct EventBusConfig {
    /// Per-topic channel capacity
    pub capacity: usize,
    /// Enable metrics collection
    pub enable_metrics: bool,
    /// Source name stamped on published envelopes
    pub source: String,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_BUS_CAPACITY,
            enable_metrics: true,
            source: "event_bus".to_string(),
        }
    }
}

/// Live subscription bookkeeping
struct Subscription {
    topic: String,
    task: JoinHandle<()>,
}

/// Main event bus implementation
pub struct EventBus {
    /// Configuration
    config: EventBusConfig,
    /// Connection state
    connected: AtomicBool,
    /// Topic-based broadcasters
    broadcasters: RwLock<FxHashMap<String, broadcast::Sender<Envelope>>>,
    /// Active subscriptions by handle
    subscriptions: Mutex<FxHashMap<SubscriptionId, Subscription>>,
    /// Next subscription handle
    next_subscription: AtomicU64,
    /// Metrics collector
    metrics: Arc<super::metrics::BusMetrics>,
}

impl EventBus {
    /// Create a new, disconnected event bus
    #[must_use]
    pub fn new(config: EventBusConfig) -> Self {
        Self {
            config,
            connected: AtomicBool::new(false),
            broadcasters: RwLock::new(FxHashMap::default()),
            subscriptions: Mutex::new(FxHashMap::default()),
            next_subscription: AtomicU64::new(1),
            metrics: Arc::new(super::metrics::BusMetrics::new()),
        }
    }

    /// Get bus capacity
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.config.capacity
    }

    /// Whether [`PubSubClient::connect`] has been called
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn ensure_connected(&self) -> BusResult<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(EventBusError::NotConnected)
        }
    }

    fn validate_topic(topic: &str) -> BusResult<()> {
        if topic.trim().is_empty() {
            return Err(EventBusError::InvalidTopic {
                topic: topic.to_string(),
            });
        }
        Ok(())
    }

    /// Get or create broadcaster for topic
    fn get_or_create_broadcaster(&self, topic: &str) -> broadcast::Sender<Envelope> {
        if let Some(broadcaster) = self.broadcasters.read().get(topic) {
            return broadcaster.clone();
        }

        let mut broadcasters = self.broadcasters.write();
        broadcasters
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.config.capacity).0)
            .clone()
    }

    /// Publish a prepared message
    pub fn publish_message(&self, message: TopicMessage) -> BusResult<()> {
        self.ensure_connected()?;
        Self::validate_topic(&message.topic)?;

        let topic = message.topic.clone();
        let envelope = MessageEnvelope::new(
            message,
            MessageMetadata {
                source: self.config.source.clone(),
                ..Default::default()
            },
        );

        let broadcaster = self.broadcasters.read().get(&topic).cloned();
        match broadcaster.map(|tx| tx.send(envelope)) {
            Some(Ok(subscriber_count)) => {
                debug!(topic = %topic, subscribers = subscriber_count, "Message published");
            }
            _ => {
                debug!(topic = %topic, "No subscribers for topic");
                if self.config.enable_metrics {
                    self.metrics.record_no_subscribers(&topic);
                }
            }
        }

        if self.config.enable_metrics {
            self.metrics.record_publish(&topic);
        }
        Ok(())
    }

    /// Get metrics for the event bus
    #[must_use]
    pub fn metrics(&self) -> Arc<super::metrics::BusMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Get current subscription count for a topic
    #[must_use]
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.subscriptions
            .lock()
            .values()
            .filter(|sub| sub.topic == topic)
            .count()
    }

    /// Get the total number of live subscriptions
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.lock().len()
    }

    /// List all topics with at least one subscription
    #[must_use]
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self
            .subscriptions
            .lock()
            .values()
            .map(|sub| sub.topic.clone())
            .collect();
        topics.sort();
        topics.dedup();
        topics
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("config", &self.config)
            .field("connected", &self.is_connected())
            .field("subscriptions", &self.subscription_count())
            .finish()
    }
}

#[async_trait]
impl PubSubClient for EventBus {
    async fn connect(&self) -> BusResult<()> {
        self.connected.store(true, Ordering::Release);
        debug!("Event bus connected");
        Ok(())
    }

    async fn disconnect(&self) -> BusResult<()> {
        self.connected.store(false, Ordering::Release);

        let drained: Vec<Subscription> = {
            let mut subscriptions = self.subscriptions.lock();
            subscriptions.drain().map(|(_, sub)| sub).collect()
        };
        for sub in &drained {
            sub.task.abort();
        }
        self.broadcasters.write().clear();

        debug!(dropped_subscriptions = drained.len(), "Event bus disconnected");
        Ok(())
    }

    async fn subscribe(&self, topic: &str, handler: TopicHandler) -> BusResult<SubscriptionId> {
        self.ensure_connected()?;
        Self::validate_topic(topic)?;

        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        let mut receiver = self.get_or_create_broadcaster(topic).subscribe();
        let metrics = self.config.enable_metrics.then(|| Arc::clone(&self.metrics));
        let topic_name = topic.to_string();

        let task = tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(envelope) => {
                        let payload = &envelope.message.payload;
                        if catch_unwind(AssertUnwindSafe(|| handler(payload))).is_err() {
                            error!(
                                topic = %topic_name,
                                message_id = %envelope.metadata.message_id,
                                "Subscription handler panicked"
                            );
                        }
                        if let Some(metrics) = &metrics {
                            metrics.record_delivery(&topic_name);
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(topic = %topic_name, skipped, "Subscriber lagging, messages dropped");
                        if let Some(metrics) = &metrics {
                            metrics.record_lagged(&topic_name, skipped);
                        }
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        self.subscriptions.lock().insert(
            id,
            Subscription {
                topic: topic.to_string(),
                task,
            },
        );

        debug!(topic = topic, subscription = %id, "Subscribed");
        Ok(id)
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> BusResult<()> {
        let removed = self.subscriptions.lock().remove(&id);
        match removed {
            Some(sub) => {
                sub.task.abort();
                debug!(topic = %sub.topic, subscription = %id, "Unsubscribed");
                Ok(())
            }
            None => Err(EventBusError::UnknownSubscription { id }),
        }
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> BusResult<()> {
        self.publish_message(TopicMessage::new(topic, payload))
    }
}

impl Drop for EventBus {
    fn drop(&mut self) {
        for sub in self.subscriptions.get_mut().values() {
            sub.task.abort();
        }
    }
}

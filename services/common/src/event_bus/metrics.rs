//! Metrics collection for the event bus

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

type CounterMap = RwLock<FxHashMap<String, AtomicU64>>;

/// Bus metrics collector
pub struct BusMetrics {
    /// Messages published by topic
    publishes: CounterMap,
    /// Messages published while nobody was subscribed, by topic
    no_subscribers: CounterMap,
    /// Handler invocations by topic
    deliveries: CounterMap,
    /// Messages skipped by lagging subscribers, by topic
    lagged: CounterMap,
    /// Start time for uptime calculation
    start_time: Instant,
}

impl BusMetrics {
    /// Create new metrics collector
    #[must_use]
    pub fn new() -> Self {
        Self {
            publishes: RwLock::new(FxHashMap::default()),
            no_subscribers: RwLock::new(FxHashMap::default()),
            deliveries: RwLock::new(FxHashMap::default()),
            lagged: RwLock::new(FxHashMap::default()),
            start_time: Instant::now(),
        }
    }

    fn add(map: &CounterMap, topic: &str, n: u64) {
        let counters = map.read();
        if let Some(counter) = counters.get(topic) {
            counter.fetch_add(n, Ordering::Relaxed);
        } else {
            drop(counters);
            map.write()
                .entry(topic.to_string())
                .or_insert_with(|| AtomicU64::new(0))
                .fetch_add(n, Ordering::Relaxed);
        }
    }

    fn get(map: &CounterMap, topic: &str) -> u64 {
        map.read()
            .get(topic)
            .map_or(0, |c| c.load(Ordering::Relaxed))
    }

    /// Record a published message
    pub fn record_publish(&self, topic: &str) {
        Self::add(&self.publishes, topic, 1);
    }

    /// Record a message with no subscribers
    pub fn record_no_subscribers(&self, topic: &str) {
        Self::add(&self.no_subscribers, topic, 1);
    }

    /// Record a handler invocation
    pub fn record_delivery(&self, topic: &str) {
        Self::add(&self.deliveries, topic, 1);
    }

    /// Record messages a lagging subscriber never saw
    pub fn record_lagged(&self, topic: &str, skipped: u64) {
        Self::add(&self.lagged, topic, skipped);
    }

    /// Get publish count for topic
    pub fn get_publish_count(&self, topic: &str) -> u64 {
        Self::get(&self.publishes, topic)
    }

    /// Get delivery count for topic
    pub fn get_delivery_count(&self, topic: &str) -> u64 {
        Self::get(&self.deliveries, topic)
    }

    /// Get count of messages published with no subscribers
    pub fn get_no_subscriber_count(&self, topic: &str) -> u64 {
        Self::get(&self.no_subscribers, topic)
    }

    /// Get count of messages skipped by lagging subscribers
    pub fn get_lagged_count(&self, topic: &str) -> u64 {
        Self::get(&self.lagged, topic)
    }

    /// Get comprehensive metrics snapshot
    pub fn snapshot(&self) -> EventBusMetrics {
        let mut all_topics = std::collections::HashSet::new();
        all_topics.extend(self.publishes.read().keys().cloned());
        all_topics.extend(self.deliveries.read().keys().cloned());
        all_topics.extend(self.lagged.read().keys().cloned());

        let topic_metrics = all_topics
            .into_iter()
            .map(|topic| {
                let metrics = TopicMetrics {
                    publish_count: self.get_publish_count(&topic),
                    delivery_count: self.get_delivery_count(&topic),
                    no_subscriber_count: self.get_no_subscriber_count(&topic),
                    lagged_count: self.get_lagged_count(&topic),
                };
                (topic, metrics)
            })
            .collect();

        EventBusMetrics {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            topic_metrics,
        }
    }
}

impl Default for BusMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BusMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusMetrics")
            .field("topics", &self.publishes.read().len())
            .field("uptime", &self.start_time.elapsed())
            .finish()
    }
}

/// Comprehensive metrics snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventBusMetrics {
    /// Bus uptime in seconds
    pub uptime_seconds: u64,
    /// Metrics by topic
    pub topic_metrics: FxHashMap<String, TopicMetrics>,
}

/// Per-topic metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicMetrics {
    /// Number of messages published
    pub publish_count: u64,
    /// Number of handler invocations
    pub delivery_count: u64,
    /// Messages published while nobody listened
    pub no_subscriber_count: u64,
    /// Messages skipped by lagging subscribers
    pub lagged_count: u64,
}

impl EventBusMetrics {
    /// Get total messages published across all topics
    #[must_use]
    pub fn total_published(&self) -> u64 {
        self.topic_metrics.values().map(|m| m.publish_count).sum()
    }

    /// Get total handler invocations across all topics
    #[must_use]
    pub fn total_delivered(&self) -> u64 {
        self.topic_metrics.values().map(|m| m.delivery_count).sum()
    }

    /// Get topics sorted by message count
    #[must_use]
    pub fn busiest_topics(&self) -> Vec<(String, u64)> {
        let mut topics: Vec<_> = self
            .topic_metrics
            .iter()
            .map(|(topic, metrics)| (topic.clone(), metrics.publish_count))
            .collect();
        topics.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        topics
    }
}

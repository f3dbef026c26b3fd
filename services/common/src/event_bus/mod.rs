//! Topic-based pub/sub for the telemetry services
//!
//! Defines the client contract the aggregation engine consumes and an
//! in-process implementation with:
//! - Per-topic broadcast channels
//! - Handler-based subscriptions that can be cancelled individually
//! - Lag detection for slow subscribers
//! - Metrics collection

pub mod bus;
pub mod message;
pub mod metrics;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Arc;

// Re-export main types
pub use bus::{EventBus, EventBusConfig};
pub use message::{MessageEnvelope, TopicMessage};
pub use metrics::{BusMetrics, EventBusMetrics, TopicMetrics};

/// Core message trait for all event bus messages
pub trait BusMessage: Send + Sync + Clone + Debug + 'static {
    /// Get the message topic for routing
    fn topic(&self) -> &str;
}

/// Message metadata attached to every published envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageMetadata {
    /// Message ID
    pub message_id: String,
    /// Source service
    pub source: String,
    /// Message timestamp (nanoseconds)
    pub timestamp: u64,
}

impl Default for MessageMetadata {
    fn default() -> Self {
        Self {
            message_id: uuid::Uuid::new_v4().to_string(),
            source: "unknown".to_string(),
            timestamp: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                // SAFETY: u128 to u64 - nanoseconds since epoch fits in u64 for centuries
                .as_nanos() as u64,
        }
    }
}

/// Callback invoked with the raw payload of every message on a topic
pub type TopicHandler = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Handle identifying one subscription on a client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriptionId(pub u64);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Pub/sub client contract consumed by the services
///
/// Implementations deliver payloads on their own tasks; handlers must
/// therefore be cheap and must not block.
#[async_trait]
pub trait PubSubClient: Send + Sync {
    /// Open the connection to the broker
    async fn connect(&self) -> BusResult<()>;

    /// Close the connection, dropping every subscription
    async fn disconnect(&self) -> BusResult<()>;

    /// Register a handler for a topic
    async fn subscribe(&self, topic: &str, handler: TopicHandler) -> BusResult<SubscriptionId>;

    /// Cancel a subscription returned by [`PubSubClient::subscribe`]
    async fn unsubscribe(&self, id: SubscriptionId) -> BusResult<()>;

    /// Publish a payload to a topic
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> BusResult<()>;
}

/// Error types for event bus operations
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    /// Client is not connected
    #[error("Client not connected")]
    NotConnected,

    /// Unknown subscription handle
    #[error("Unknown subscription: {id}")]
    UnknownSubscription {
        /// Subscription handle
        id: SubscriptionId,
    },

    /// Invalid topic name
    #[error("Invalid topic: {topic:?}")]
    InvalidTopic {
        /// Topic name
        topic: String,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Channel error
    #[error("Channel error: {0}")]
    Channel(String),
}

/// Result type for event bus operations
pub type BusResult<T> = std::result::Result<T, EventBusError>;

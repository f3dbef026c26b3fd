//! Message types and envelope for the event bus

use super::{BusMessage, BusResult, MessageMetadata};
use serde::{Deserialize, Serialize};

/// Message envelope wrapping the actual message with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEnvelope<T: BusMessage> {
    /// The actual message
    pub message: T,
    /// Message metadata
    pub metadata: MessageMetadata,
}

impl<T: BusMessage> MessageEnvelope<T> {
    /// Create a new message envelope
    pub const fn new(message: T, metadata: MessageMetadata) -> Self {
        Self { message, metadata }
    }

    /// Create a message envelope with default metadata
    pub fn with_defaults(message: T, source: impl Into<String>) -> Self {
        let metadata = MessageMetadata {
            source: source.into(),
            ..Default::default()
        };
        Self { message, metadata }
    }

    /// Get the message topic
    pub fn topic(&self) -> &str {
        self.message.topic()
    }

    /// Get message age in milliseconds
    pub fn age_ms(&self) -> u64 {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            // SAFETY: u128 to u64 - milliseconds since epoch fits in u64
            .as_millis() as u64;
        now.saturating_sub(self.metadata.timestamp / 1_000_000)
    }
}

/// Raw payload addressed to a topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicMessage {
    /// Destination topic
    pub topic: String,
    /// Opaque payload bytes
    pub payload: Vec<u8>,
}

impl TopicMessage {
    /// Create a message from raw bytes
    pub fn new(topic: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            topic: topic.into(),
            payload,
        }
    }

    /// Create a message whose payload is the textual form of `value`
    pub fn text(topic: impl Into<String>, value: impl ToString) -> Self {
        Self::new(topic, value.to_string().into_bytes())
    }

    /// Create a message whose payload is `value` encoded as JSON
    pub fn json<V: Serialize>(topic: impl Into<String>, value: &V) -> BusResult<Self> {
        Ok(Self::new(topic, serde_json::to_vec(value)?))
    }

    /// Payload as UTF-8, if it is valid text
    pub fn payload_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }
}

impl BusMessage for TopicMessage {
    fn topic(&self) -> &str {
        &self.topic
    }
}

//! Telemetry Aggregator Error Types

use services_common::EventBusError;
use thiserror::Error;

/// Aggregation engine errors
#[derive(Debug, Error)]
pub enum AggregatorError {
    /// Configuration rejected at construction
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// Configuration file could not be read
    #[error("Failed to read configuration {path}: {source}")]
    ConfigIo {
        path: String,
        source: std::io::Error,
    },

    /// Configuration could not be parsed
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),

    /// Unknown aggregation kind name
    #[error("Unknown aggregation kind: {kind}")]
    UnknownKind { kind: String },

    /// Sample payload is not a finite number
    #[error("Malformed sample on {topic}: {reason}")]
    MalformedSample { topic: String, reason: String },

    /// Aggregation produced NaN or infinity
    #[error("Aggregation {method} produced a non-finite value")]
    NonFiniteResult { method: String },

    /// Subscribing an input topic failed
    #[error("Failed to subscribe to {topic}: {source}")]
    Subscribe {
        topic: String,
        source: EventBusError,
    },

    /// Job index outside the registry
    #[error("Unknown job: {job}")]
    UnknownJob { job: usize },

    /// Job queue has no room for the ticket
    #[error("Job queue full, job {job} skipped")]
    QueueFull { job: usize },

    /// Transport error from the pub/sub client
    #[error("Bus error: {0}")]
    Bus(#[from] EventBusError),
}

impl AggregatorError {
    pub(crate) fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }
}

/// Result type for aggregation engine operations
pub type AggregatorResult<T> = std::result::Result<T, AggregatorError>;

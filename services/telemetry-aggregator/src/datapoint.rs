//! Data points: one raw input topic plus its aggregations

use crate::aggregators::AggregationMethod;
use crate::buffer::SampleBuffer;
use crate::config::DataPointConfig;
use crate::error::{AggregatorError, AggregatorResult};
use crate::stats::ManagerStats;
use services_common::TopicHandler;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

/// An input topic, its sample buffer and the methods computed over it
#[derive(Debug)]
pub struct DataPoint {
    input_topic: String,
    output_topic_prefix: String,
    buffer: Arc<SampleBuffer>,
    methods: Vec<AggregationMethod>,
}

impl DataPoint {
    /// Build a data point from validated configuration
    pub fn from_config(config: &DataPointConfig, max_samples: usize) -> AggregatorResult<Self> {
        let methods = config
            .methods
            .iter()
            .map(|m| {
                AggregationMethod::new(
                    m.name.clone(),
                    m.kind,
                    Duration::from_secs(m.window_secs),
                    format!("{}{}", config.output_topic_prefix, m.name),
                )
            })
            .collect::<AggregatorResult<Vec<_>>>()?;

        Ok(Self {
            input_topic: config.input_topic.clone(),
            output_topic_prefix: config.output_topic_prefix.clone(),
            buffer: Arc::new(SampleBuffer::new(max_samples)),
            methods,
        })
    }

    pub fn input_topic(&self) -> &str {
        &self.input_topic
    }

    pub fn output_topic_prefix(&self) -> &str {
        &self.output_topic_prefix
    }

    pub fn methods(&self) -> &[AggregationMethod] {
        &self.methods
    }

    pub fn buffer(&self) -> &Arc<SampleBuffer> {
        &self.buffer
    }

    /// Longest window any method needs; older samples are never read
    pub fn max_window(&self) -> Duration {
        self.methods
            .iter()
            .map(AggregationMethod::window)
            .max()
            .unwrap_or_default()
    }

    /// Subscription callback feeding this data point's buffer
    ///
    /// The handler only holds the buffer and the counters, never the manager.
    pub fn ingest_handler(&self, stats: Arc<ManagerStats>) -> TopicHandler {
        let buffer = Arc::clone(&self.buffer);
        let topic = self.input_topic.clone();

        Arc::new(move |payload: &[u8]| match parse_sample(&topic, payload) {
            Ok(value) => {
                let evicted = buffer.append(Instant::now(), value);
                stats.record_samples_accepted(1);
                if evicted > 0 {
                    stats.record_samples_purged(evicted as u64);
                }
            }
            Err(e) => {
                warn!(topic = %topic, error = %e, "Dropping malformed sample");
                stats.record_samples_rejected(1);
            }
        })
    }
}

/// Decode a sample payload: a finite number written as text
pub fn parse_sample(topic: &str, payload: &[u8]) -> AggregatorResult<f64> {
    let malformed = |reason: String| AggregatorError::MalformedSample {
        topic: topic.to_string(),
        reason,
    };

    let text = std::str::from_utf8(payload).map_err(|e| malformed(e.to_string()))?;
    let value: f64 = text
        .trim()
        .parse()
        .map_err(|_| malformed(format!("not a number: {:?}", text.trim())))?;

    if value.is_finite() {
        Ok(value)
    } else {
        Err(malformed(format!("non-finite value {value}")))
    }
}

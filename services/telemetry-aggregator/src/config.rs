//! Telemetry aggregator configuration

use crate::aggregators::AggregationKind;
use crate::error::{AggregatorError, AggregatorResult};
use crate::policy::NoDataBehavior;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default seconds between aggregation ticks
pub const DEFAULT_UPDATE_CYCLE_SECS: u64 = 30;
/// Longest accepted update cycle, one day
pub const MAX_UPDATE_CYCLE_SECS: u64 = 86_400;
/// Longest accepted aggregation window, one week
pub const MAX_WINDOW_SECS: u64 = 7 * 86_400;
/// Default worker count
pub const DEFAULT_WORKERS: usize = 2;
/// Default bound on waiting for in-flight work during `stop()`
pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 5000;
/// Default outbound publish queue length
pub const DEFAULT_PUBLISH_QUEUE_CAPACITY: usize = 1024;
/// Default hard cap on buffered samples per data point
pub const DEFAULT_MAX_SAMPLES: usize = 100_000;

/// Aggregation engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// Seconds between aggregation ticks
    pub update_cycle_secs: u64,

    /// Number of concurrent aggregation workers
    pub workers: usize,

    /// Published value when a window is empty
    pub no_data_behavior: NoDataBehavior,

    /// Milliseconds `stop()` waits for in-flight jobs and pending publishes
    pub shutdown_grace_ms: u64,

    /// Outbound publish queue length; results beyond it are dropped
    pub publish_queue_capacity: usize,

    /// Hard cap on samples kept per data point
    pub max_samples_per_data_point: usize,

    /// Input topics and their derived outputs
    pub data_points: Vec<DataPointConfig>,
}

/// One raw input topic and its aggregations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPointConfig {
    /// Raw sensor topic to subscribe to
    pub input_topic: String,

    /// Prefix of every output topic; the method name is appended
    pub output_topic_prefix: String,

    /// Aggregations computed for this input
    pub methods: Vec<MethodConfig>,
}

/// One aggregation of a data point
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodConfig {
    /// Method name, also the output topic suffix
    pub name: String,

    /// Statistic to compute
    pub kind: AggregationKind,

    /// Trailing window length in seconds
    pub window_secs: u64,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            update_cycle_secs: DEFAULT_UPDATE_CYCLE_SECS,
            workers: DEFAULT_WORKERS,
            no_data_behavior: NoDataBehavior::default(),
            shutdown_grace_ms: DEFAULT_SHUTDOWN_GRACE_MS,
            publish_queue_capacity: DEFAULT_PUBLISH_QUEUE_CAPACITY,
            max_samples_per_data_point: DEFAULT_MAX_SAMPLES,
            data_points: Vec::new(),
        }
    }
}

impl AggregatorConfig {
    /// Parse a JSON configuration document
    pub fn from_json_str(json: &str) -> AggregatorResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file
    pub fn from_file(path: &Path) -> AggregatorResult<Self> {
        let json = std::fs::read_to_string(path).map_err(|source| AggregatorError::ConfigIo {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// Add a data point, builder style
    #[must_use]
    pub fn with_data_point(mut self, data_point: DataPointConfig) -> Self {
        self.data_points.push(data_point);
        self
    }

    pub const fn update_cycle(&self) -> Duration {
        Duration::from_secs(self.update_cycle_secs)
    }

    pub const fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// Total number of (data point, method) jobs
    pub fn job_count(&self) -> usize {
        self.data_points.iter().map(|dp| dp.methods.len()).sum()
    }

    /// Reject configurations the engine cannot run
    pub fn validate(&self) -> AggregatorResult<()> {
        if self.workers == 0 {
            return Err(AggregatorError::invalid_config("workers must be at least 1"));
        }
        if self.update_cycle_secs == 0 {
            return Err(AggregatorError::invalid_config(
                "update_cycle_secs must be positive",
            ));
        }
        if self.update_cycle_secs > MAX_UPDATE_CYCLE_SECS {
            return Err(AggregatorError::invalid_config(format!(
                "update_cycle_secs must not exceed {MAX_UPDATE_CYCLE_SECS}"
            )));
        }
        if self.publish_queue_capacity == 0 {
            return Err(AggregatorError::invalid_config(
                "publish_queue_capacity must be positive",
            ));
        }
        if self.max_samples_per_data_point == 0 {
            return Err(AggregatorError::invalid_config(
                "max_samples_per_data_point must be positive",
            ));
        }

        let mut output_topics = FxHashSet::default();
        for data_point in &self.data_points {
            data_point.validate()?;
            for topic in data_point.output_topics() {
                if !output_topics.insert(topic.clone()) {
                    return Err(AggregatorError::invalid_config(format!(
                        "duplicate output topic {topic}"
                    )));
                }
            }
        }
        Ok(())
    }
}

impl DataPointConfig {
    /// Create a data point with no methods
    pub fn new(input_topic: impl Into<String>, output_topic_prefix: impl Into<String>) -> Self {
        Self {
            input_topic: input_topic.into(),
            output_topic_prefix: output_topic_prefix.into(),
            methods: Vec::new(),
        }
    }

    /// Add a method, builder style
    #[must_use]
    pub fn with_method(mut self, name: impl Into<String>, kind: AggregationKind, window_secs: u64) -> Self {
        self.methods.push(MethodConfig {
            name: name.into(),
            kind,
            window_secs,
        });
        self
    }

    /// Output topic of every method, in declaration order
    pub fn output_topics(&self) -> impl Iterator<Item = String> + '_ {
        self.methods
            .iter()
            .map(|m| format!("{}{}", self.output_topic_prefix, m.name))
    }

    fn validate(&self) -> AggregatorResult<()> {
        if self.input_topic.trim().is_empty() {
            return Err(AggregatorError::invalid_config("input_topic must not be empty"));
        }
        if self.methods.is_empty() {
            return Err(AggregatorError::invalid_config(format!(
                "data point {} has no methods",
                self.input_topic
            )));
        }
        for method in &self.methods {
            if method.name.trim().is_empty() {
                return Err(AggregatorError::invalid_config(format!(
                    "data point {} has a method without a name",
                    self.input_topic
                )));
            }
            if method.window_secs == 0 {
                return Err(AggregatorError::invalid_config(format!(
                    "method {} of {} has a zero-length window",
                    method.name, self.input_topic
                )));
            }
            if method.window_secs > MAX_WINDOW_SECS {
                return Err(AggregatorError::invalid_config(format!(
                    "method {} of {} has a window longer than {MAX_WINDOW_SECS}s",
                    method.name, self.input_topic
                )));
            }
        }
        Ok(())
    }
}

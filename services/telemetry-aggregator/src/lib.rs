//! Telemetry Aggregator Service
//!
//! Subscribes to raw sensor readings on a pub/sub bus, keeps a trailing
//! buffer of timestamped samples per input topic and every update cycle
//! republishes derived statistics:
//! - Arithmetic and recency-weighted mean
//! - Minimum and maximum
//! - Sample count
//!
//! Each statistic has its own trailing window and output topic
//! `{output_topic_prefix}{method_name}`.

pub mod aggregators;
pub mod buffer;
pub mod config;
pub mod datapoint;
pub mod error;
pub mod job;
pub mod manager;
pub mod outbox;
pub mod policy;
pub mod pool;
pub mod purge;
pub mod registry;
pub mod scheduler;
pub mod stats;

pub use aggregators::{Aggregate, AggregationKind, AggregationMethod};
pub use buffer::{Sample, SampleBuffer};
pub use config::{AggregatorConfig, DataPointConfig, MethodConfig};
pub use datapoint::{parse_sample, DataPoint};
pub use error::{AggregatorError, AggregatorResult};
pub use manager::DataPointManager;
pub use policy::{NoDataBehavior, Resolution};
pub use stats::StatsSnapshot;

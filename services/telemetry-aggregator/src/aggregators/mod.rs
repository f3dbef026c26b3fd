//! Aggregation methods
//!
//! The kind registry is a closed enum resolved once when a method is built,
//! so evaluating a window is a plain `match` with no string dispatch.

pub mod count;
pub mod extrema;
pub mod mean;

use crate::buffer::Sample;
use crate::error::{AggregatorError, AggregatorResult};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Statistic computed over a window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationKind {
    /// Arithmetic mean
    Avg,
    /// Recency-weighted mean
    Wavg,
    /// Minimum value
    Min,
    /// Maximum value
    Max,
    /// Number of samples
    Count,
}

impl AggregationKind {
    /// All supported kinds
    pub const ALL: [Self; 5] = [Self::Avg, Self::Wavg, Self::Min, Self::Max, Self::Count];

    /// Configuration name of the kind
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Avg => "avg",
            Self::Wavg => "wavg",
            Self::Min => "min",
            Self::Max => "max",
            Self::Count => "count",
        }
    }

    /// Evaluate the statistic; `None` means the window held no data
    pub fn evaluate(self, samples: &[Sample]) -> Option<f64> {
        match self {
            Self::Avg => mean::mean(samples),
            Self::Wavg => mean::weighted_mean(samples),
            Self::Min => extrema::minimum(samples),
            Self::Max => extrema::maximum(samples),
            Self::Count => Some(count::count(samples)),
        }
    }
}

impl std::fmt::Display for AggregationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AggregationKind {
    type Err = AggregatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| AggregatorError::UnknownKind {
                kind: s.to_string(),
            })
    }
}

/// Outcome of evaluating one method over one window
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Aggregate {
    /// A computed value
    Value(f64),
    /// The window was empty
    NoData,
}

/// A named statistic bound to a trailing window and an output topic
#[derive(Debug, Clone)]
pub struct AggregationMethod {
    name: String,
    kind: AggregationKind,
    window: Duration,
    output_topic: String,
}

impl AggregationMethod {
    /// Create a method; the window must be non-zero
    pub fn new(
        name: impl Into<String>,
        kind: AggregationKind,
        window: Duration,
        output_topic: impl Into<String>,
    ) -> AggregatorResult<Self> {
        let name = name.into();
        if window.is_zero() {
            return Err(AggregatorError::invalid_config(format!(
                "method {name} has a zero-length window"
            )));
        }
        Ok(Self {
            name,
            kind,
            window,
            output_topic: output_topic.into(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn kind(&self) -> AggregationKind {
        self.kind
    }

    pub const fn window(&self) -> Duration {
        self.window
    }

    pub fn output_topic(&self) -> &str {
        &self.output_topic
    }

    /// Compute the statistic over samples already restricted to the window
    pub fn compute(&self, samples: &[Sample]) -> AggregatorResult<Aggregate> {
        match self.kind.evaluate(samples) {
            Some(value) if value.is_finite() => Ok(Aggregate::Value(value)),
            Some(_) => Err(AggregatorError::NonFiniteResult {
                method: self.name.clone(),
            }),
            None => Ok(Aggregate::NoData),
        }
    }
}

//! What to publish when a window holds no data

use crate::aggregators::Aggregate;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Process-wide empty-window behaviour, fixed for a manager's lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NoDataBehavior {
    /// Republish the job's last successfully computed value
    #[default]
    #[serde(alias = "last_valid")]
    LastValid,
}

/// Decision taken for one job execution
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolution {
    /// Publish a freshly computed value
    Publish(f64),
    /// Publish the value retained from an earlier cycle
    Republish(f64),
    /// Publish nothing this cycle
    Suppress,
}

impl Resolution {
    /// Value to publish, if any
    pub const fn value(self) -> Option<f64> {
        match self {
            Self::Publish(v) | Self::Republish(v) => Some(v),
            Self::Suppress => None,
        }
    }
}

/// Last successfully computed value of one job
#[derive(Debug, Default)]
pub struct LastValidSlot(Mutex<Option<f64>>);

impl LastValidSlot {
    pub fn get(&self) -> Option<f64> {
        *self.0.lock()
    }

    fn store(&self, value: f64) {
        *self.0.lock() = Some(value);
    }
}

impl NoDataBehavior {
    /// Resolve an aggregate into the value to publish, updating the slot
    pub fn resolve(self, aggregate: Aggregate, slot: &LastValidSlot) -> Resolution {
        match (self, aggregate) {
            (_, Aggregate::Value(value)) => {
                slot.store(value);
                Resolution::Publish(value)
            }
            (Self::LastValid, Aggregate::NoData) => {
                slot.get().map_or(Resolution::Suppress, Resolution::Republish)
            }
        }
    }
}

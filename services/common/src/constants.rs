//! Common constants used across all services
//!
//! Single source of truth for shared magic numbers

// Buffer sizes
pub const DEFAULT_BUS_CAPACITY: usize = 10000;

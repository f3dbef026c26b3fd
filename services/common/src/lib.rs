//! Common utilities and the pub/sub contract shared by the telemetry services

pub mod constants;
pub mod event_bus;

pub use constants::*;
pub use event_bus::*;

//! Relay and server statistics

pub mod metrics;

pub use metrics::{RelayStats, RelayStatsSnapshot, ServerStats};

//! Prometheus metrics functionality.
//
//! Counters are recorded through the `metrics` facade; they are no-ops until
//! a recorder (e.g. metrics-exporter-prometheus) is installed.

pub mod meter;

// Re-export commonly used items
pub use meter::*;

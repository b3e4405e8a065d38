//! Telemetry and observability subsystem.
//!
//! Provides the counter core used by pools and workers; snapshots are
//! cheap and can be taken at any time.

pub mod metrics;

pub use metrics::{Metrics, MetricsSnapshot};

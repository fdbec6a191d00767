//! Observability: grouping and codec telemetry behind a sink boundary.
//!
//! Counters are thread-local; independent groupings on separate threads
//! report independently.

pub(crate) mod metrics;
pub(crate) mod sink;

// re-exports
pub use metrics::{EventOps, EventReport, LevelCounters};
pub use sink::{MetricsEvent, MetricsSink, metrics_report, metrics_reset_all, with_metrics_sink};

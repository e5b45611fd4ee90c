//! Observability: runtime telemetry (metrics) and sink abstractions.
//!
//! This module does not read tracker internals directly.
//! Tracker, fixup, and submission code report through `sink::record`.

pub(crate) mod metrics;
pub(crate) mod sink;

// re-exports
pub use metrics::{EntityCounters, EventOps, EventReport};
pub use sink::{FixupKind, MetricsEvent, MetricsSink, metrics_report, metrics_reset_all};

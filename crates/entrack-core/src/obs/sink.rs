//! Metrics sink boundary.
//!
//! Tracker logic MUST NOT depend on obs::metrics directly.
//! All instrumentation flows through MetricsEvent and MetricsSink.
//!
//! This module is the only allowed bridge between tracking logic
//! and the global metrics state.
use crate::obs::metrics;
use std::cell::Cell;

thread_local! {
    static SINK_OVERRIDE: Cell<Option<&'static dyn MetricsSink>> = const { Cell::new(None) };
}

///
/// FixupKind
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FixupKind {
    Connect,
    Sever,
    OrphanDeleted,
    CascadeDeleted,
    SetNull,
    JoinCreated,
    JoinRemoved,
    KeyPropagated,
}

///
/// MetricsEvent
///

#[derive(Clone, Copy, Debug)]
pub enum MetricsEvent {
    DetectFinish {
        entities_scanned: u64,
        properties_changed: u64,
        navigations_changed: u64,
    },
    Tracked {
        entity: &'static str,
    },
    IdentityResolved {
        entity: &'static str,
    },
    Fixup {
        kind: FixupKind,
        entity: &'static str,
    },
    SubmitFinish {
        inserts: u64,
        updates: u64,
        deletes: u64,
        succeeded: bool,
    },
}

///
/// MetricsSink
///

pub trait MetricsSink {
    fn record(&self, event: MetricsEvent);
}

/// GlobalMetricsSink
/// Default sink that writes into thread-local metrics state.
/// Acts as the concrete sink when no scoped override is installed.

pub(crate) struct GlobalMetricsSink;

impl MetricsSink for GlobalMetricsSink {
    fn record(&self, event: MetricsEvent) {
        match event {
            MetricsEvent::DetectFinish {
                entities_scanned,
                properties_changed,
                navigations_changed,
            } => metrics::with_state_mut(|m| {
                m.ops.detect_passes = m.ops.detect_passes.saturating_add(1);
                m.ops.entities_scanned = m.ops.entities_scanned.saturating_add(entities_scanned);
                m.ops.properties_changed =
                    m.ops.properties_changed.saturating_add(properties_changed);
                m.ops.navigations_changed =
                    m.ops.navigations_changed.saturating_add(navigations_changed);
            }),

            MetricsEvent::Tracked { entity } => metrics::with_state_mut(|m| {
                m.ops.tracked = m.ops.tracked.saturating_add(1);
                let entry = m.entities.entry(entity.to_string()).or_default();
                entry.tracked = entry.tracked.saturating_add(1);
            }),

            MetricsEvent::IdentityResolved { .. } => metrics::with_state_mut(|m| {
                m.ops.identity_resolutions = m.ops.identity_resolutions.saturating_add(1);
            }),

            MetricsEvent::Fixup { kind, entity } => metrics::with_state_mut(|m| {
                let counter = match kind {
                    FixupKind::Connect => &mut m.ops.fixup_connects,
                    FixupKind::Sever => &mut m.ops.fixup_severs,
                    FixupKind::OrphanDeleted => &mut m.ops.orphans_deleted,
                    FixupKind::CascadeDeleted => &mut m.ops.cascade_deletes,
                    FixupKind::SetNull => &mut m.ops.set_nulls,
                    FixupKind::JoinCreated => &mut m.ops.join_records_created,
                    FixupKind::JoinRemoved => &mut m.ops.join_records_removed,
                    FixupKind::KeyPropagated => &mut m.ops.keys_propagated,
                };
                *counter = counter.saturating_add(1);

                let entry = m.entities.entry(entity.to_string()).or_default();
                entry.fixups = entry.fixups.saturating_add(1);
                if matches!(kind, FixupKind::CascadeDeleted | FixupKind::OrphanDeleted) {
                    entry.deletes_cascaded = entry.deletes_cascaded.saturating_add(1);
                }
            }),

            MetricsEvent::SubmitFinish {
                inserts,
                updates,
                deletes,
                succeeded,
            } => metrics::with_state_mut(|m| {
                m.ops.submits = m.ops.submits.saturating_add(1);
                if succeeded {
                    m.ops.inserts = m.ops.inserts.saturating_add(inserts);
                    m.ops.updates = m.ops.updates.saturating_add(updates);
                    m.ops.deletes = m.ops.deletes.saturating_add(deletes);
                } else {
                    m.ops.submit_failures = m.ops.submit_failures.saturating_add(1);
                }
            }),
        }
    }
}

pub(crate) const GLOBAL_METRICS_SINK: GlobalMetricsSink = GlobalMetricsSink;

pub(crate) fn record(event: MetricsEvent) {
    match SINK_OVERRIDE.with(Cell::get) {
        Some(sink) => sink.record(event),
        None => GLOBAL_METRICS_SINK.record(event),
    }
}

/// Snapshot the current metrics state.
///
/// `window_start_ms` filters by window start (`EventState::window_start_ms`),
/// not by per-event timestamps.
#[must_use]
pub fn metrics_report(window_start_ms: Option<u64>) -> metrics::EventReport {
    metrics::report_window_start(window_start_ms)
}

/// Reset all metrics state.
pub fn metrics_reset_all() {
    metrics::reset_all();
}

/// Run a closure with a temporary metrics sink override.
pub(crate) fn with_metrics_sink<T>(sink: &'static dyn MetricsSink, f: impl FnOnce() -> T) -> T {
    struct Guard(Option<&'static dyn MetricsSink>);

    impl Drop for Guard {
        fn drop(&mut self) {
            SINK_OVERRIDE.with(|cell| cell.set(self.0));
        }
    }

    let prev = SINK_OVERRIDE.with(|cell| cell.replace(Some(sink)));
    let _guard = Guard(prev);

    f()
}

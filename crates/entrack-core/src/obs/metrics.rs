//! Process-local (per-thread) metrics state.
//!
//! Counters saturate instead of wrapping. State is thread-local because a
//! session is single-threaded; every thread observes only its own sessions.

use serde::Serialize;
use std::{
    cell::RefCell,
    collections::BTreeMap,
    time::{SystemTime, UNIX_EPOCH},
};

///
/// EventOps
/// Aggregate counters across every entity type.
///

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct EventOps {
    pub detect_passes: u64,
    pub entities_scanned: u64,
    pub properties_changed: u64,
    pub navigations_changed: u64,

    pub tracked: u64,
    pub identity_resolutions: u64,

    pub fixup_connects: u64,
    pub fixup_severs: u64,
    pub orphans_deleted: u64,
    pub cascade_deletes: u64,
    pub set_nulls: u64,
    pub join_records_created: u64,
    pub join_records_removed: u64,
    pub keys_propagated: u64,

    pub submits: u64,
    pub submit_failures: u64,
    pub inserts: u64,
    pub updates: u64,
    pub deletes: u64,
}

///
/// EntityCounters
/// Per-entity-type counters.
///

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct EntityCounters {
    pub tracked: u64,
    pub fixups: u64,
    pub deletes_cascaded: u64,
}

///
/// EventState
///

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct EventState {
    pub ops: EventOps,
    pub entities: BTreeMap<String, EntityCounters>,
    pub window_start_ms: u64,
}

impl Default for EventState {
    fn default() -> Self {
        Self {
            ops: EventOps::default(),
            entities: BTreeMap::new(),
            window_start_ms: now_millis(),
        }
    }
}

///
/// EventReport
///

#[derive(Clone, Debug, Default, Serialize)]
pub struct EventReport {
    /// Counters for the current window; `None` when the window started after the filter.
    pub counters: Option<EventState>,
    /// Per-entity counters sorted by entity name.
    pub entity_counters: Vec<(String, EntityCounters)>,
}

thread_local! {
    static EVENT_STATE: RefCell<EventState> = RefCell::new(EventState::default());
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

pub(crate) fn with_state<R>(f: impl FnOnce(&EventState) -> R) -> R {
    EVENT_STATE.with(|state| f(&state.borrow()))
}

pub(crate) fn with_state_mut<R>(f: impl FnOnce(&mut EventState) -> R) -> R {
    EVENT_STATE.with(|state| f(&mut state.borrow_mut()))
}

pub(crate) fn reset_all() {
    with_state_mut(|state| *state = EventState::default());
}

/// Snapshot counters; `window_start_ms` filters out windows that began before it.
pub(crate) fn report_window_start(window_start_ms: Option<u64>) -> EventReport {
    with_state(|state| {
        if let Some(requested) = window_start_ms
            && requested > state.window_start_ms
        {
            return EventReport::default();
        }

        EventReport {
            counters: Some(state.clone()),
            entity_counters: state
                .entities
                .iter()
                .map(|(name, counters)| (name.clone(), counters.clone()))
                .collect(),
        }
    })
}

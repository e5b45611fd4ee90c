//! Module: session
//! Responsibility: the public unit-of-work surface over one tracker.
//! Does not own: tracking rules (see `tracker`) or command ordering (see `persist`).
//!
//! Invariants:
//! - Every operation that can emit metrics runs under the session's sink.
//! - Auto-detection, when enabled, runs before enumeration, entry access,
//!   `has_changes`, cascade resolution, and submission.

mod debug;

#[cfg(test)]
mod tests;

pub use debug::DebugViewMode;

use crate::{
    config::{IdentityResolution, Timing, TrackingOptions},
    error::InternalError,
    model::Schema,
    obs::sink::{MetricsSink, with_metrics_sink},
    persist::{Row, Store, SubmitSummary},
    traits::{EntityId, EntityKind, Handle},
    tracker::{EntityEntry, EntityState, EntryRef, TrackMode, Tracker},
    value::KeyValue,
};
use std::sync::Arc;
use tracing::debug;

///
/// Session
///
/// Session-scoped tracking context: an arena of entity instances, the
/// entries tracking them, and policy (options, metrics).
///

pub struct Session {
    tracker: Tracker,
    metrics: Option<&'static dyn MetricsSink>,
}

impl Session {
    #[must_use]
    pub fn new(schema: Arc<Schema>) -> Self {
        Self::with_options(schema, TrackingOptions::default())
    }

    #[must_use]
    pub fn with_options(schema: Arc<Schema>, options: TrackingOptions) -> Self {
        Self {
            tracker: Tracker::new(schema, options),
            metrics: None,
        }
    }

    #[must_use]
    pub fn metrics_sink(mut self, sink: &'static dyn MetricsSink) -> Self {
        self.metrics = Some(sink);
        self
    }

    // Every tracker mutation runs under the session's sink, if one is set.
    fn with_metrics<T>(&mut self, f: impl FnOnce(&mut Tracker) -> T) -> T {
        let tracker = &mut self.tracker;
        if let Some(sink) = self.metrics {
            with_metrics_sink(sink, || f(tracker))
        } else {
            f(tracker)
        }
    }

    #[must_use]
    pub fn schema(&self) -> Arc<Schema> {
        self.tracker.schema()
    }

    #[must_use]
    pub const fn options(&self) -> &TrackingOptions {
        &self.tracker.options
    }

    // ---------------------------------------------------------------------
    // Options
    // ---------------------------------------------------------------------

    pub const fn set_orphan_timing(&mut self, timing: Timing) {
        self.tracker.options.orphan_timing = timing;
    }

    pub const fn set_cascade_timing(&mut self, timing: Timing) {
        self.tracker.options.cascade_timing = timing;
    }

    pub const fn set_auto_detect_changes(&mut self, enabled: bool) {
        self.tracker.options.auto_detect_changes = enabled;
    }

    pub const fn set_identity_resolution(&mut self, policy: IdentityResolution) {
        self.tracker.options.identity_resolution = policy;
    }

    // ---------------------------------------------------------------------
    // Instances
    // ---------------------------------------------------------------------

    /// Place an instance in the session without tracking it.
    pub fn create<E: EntityKind>(&mut self, entity: E) -> Result<Handle<E>, InternalError> {
        self.tracker.insert(Box::new(entity)).map(Handle::from_id)
    }

    pub fn get<E: EntityKind>(&self, handle: Handle<E>) -> Result<&E, InternalError> {
        self.tracker
            .entity(handle.id())?
            .downcast_ref::<E>()
            .ok_or_else(|| mismatched::<E>(handle.id()))
    }

    /// Mutable access; changes are picked up by the next detection pass.
    pub fn get_mut<E: EntityKind>(&mut self, handle: Handle<E>) -> Result<&mut E, InternalError> {
        self.tracker
            .entity_mut(handle.id())?
            .downcast_mut::<E>()
            .ok_or_else(|| mismatched::<E>(handle.id()))
    }

    /// Tracked instance of `E` with `key`, if any.
    #[must_use]
    pub fn find<E: EntityKind>(&self, key: impl Into<KeyValue>) -> Option<Handle<E>> {
        self.tracker
            .find(E::MODEL.name, &key.into())
            .map(Handle::from_id)
    }

    // ---------------------------------------------------------------------
    // Tracking
    // ---------------------------------------------------------------------

    /// Track the instance and everything reachable from it as new.
    pub fn add<E: EntityKind>(&mut self, handle: Handle<E>) -> Result<Handle<E>, InternalError> {
        self.track(handle, TrackMode::Add)
    }

    /// Track as existing rows; instances without a key are tracked as new.
    pub fn attach<E: EntityKind>(&mut self, handle: Handle<E>) -> Result<Handle<E>, InternalError> {
        self.track(handle, TrackMode::Attach)
    }

    /// Track as existing rows with every property modified.
    pub fn update<E: EntityKind>(&mut self, handle: Handle<E>) -> Result<Handle<E>, InternalError> {
        self.track(handle, TrackMode::Update)
    }

    fn track<E: EntityKind>(&mut self, handle: Handle<E>, mode: TrackMode) -> Result<Handle<E>, InternalError> {
        let resolved = self.with_metrics(|tracker| -> Result<_, InternalError> {
            let resolved = tracker.track_graph(&[handle.id()], mode)?;
            tracker.settle(false)?;
            Ok(resolved)
        })?;

        Ok(resolved.first().map_or(handle, |&id| Handle::from_id(id)))
    }

    /// Mark for deletion; a new instance is simply no longer tracked.
    pub fn remove<E: EntityKind>(&mut self, handle: Handle<E>) -> Result<(), InternalError> {
        self.with_metrics(|tracker| tracker.set_state(handle.id(), EntityState::Deleted))
    }

    /// Stop tracking one instance; related entries keep their own state.
    pub fn detach<E: EntityKind>(&mut self, handle: Handle<E>) -> Result<(), InternalError> {
        self.with_metrics(|tracker| tracker.set_state(handle.id(), EntityState::Detached))
    }

    /// Stop tracking everything.
    pub fn clear(&mut self) {
        self.tracker.clear();
        debug!("session cleared");
    }

    /// Track an instance read from a store; an already tracked instance
    /// with the same identity wins and is returned instead. Under
    /// `MergeIncoming` the tracked instance takes the incoming values as
    /// its current and original values.
    pub fn materialize<E: EntityKind>(&mut self, entity: E) -> Result<Handle<E>, InternalError> {
        let handle = self.create(entity)?;
        self.track(handle, TrackMode::Materialize)
    }

    /// Materialize one stored row of the named entity.
    pub fn materialize_row(&mut self, entity: &str, row: &Row) -> Result<EntityId, InternalError> {
        self.with_metrics(|tracker| {
            let mut instance = tracker.instantiate(entity)?;
            let model = instance.model();
            for (field, value) in row.iter() {
                if model.field(field).is_some() {
                    instance.set_value(field, value.clone())?;
                }
            }

            // Rows of tracked identities reuse the tracked instance.
            if let Some(holder) = tracker.resolve_stored(instance.as_ref())? {
                return Ok(holder);
            }

            let id = tracker.insert(instance)?;
            let resolved = tracker.track_graph(&[id], TrackMode::Materialize)?;
            Ok(resolved.first().copied().unwrap_or(id))
        })
    }

    /// Materialize every stored row of `E`.
    pub fn load<E: EntityKind>(&mut self, store: &dyn Store) -> Result<Vec<Handle<E>>, InternalError> {
        Ok(self
            .load_entity(store, E::MODEL.name)?
            .into_iter()
            .map(Handle::from_id)
            .collect())
    }

    /// Materialize every stored row of the named entity, including join records.
    pub fn load_entity(&mut self, store: &dyn Store, entity: &str) -> Result<Vec<EntityId>, InternalError> {
        let schema = self.schema();
        let model = schema.require_entity(entity)?.model;
        let rows = store.scan(model)?;

        let ids = rows
            .iter()
            .map(|row| self.materialize_row(entity, row))
            .collect::<Result<Vec<_>, _>>()?;
        debug!(entity, rows = ids.len(), "loaded");

        Ok(ids)
    }

    // ---------------------------------------------------------------------
    // Entries
    // ---------------------------------------------------------------------

    /// Entry of one instance, after detecting that instance's own changes.
    pub fn entry<E: EntityKind>(&mut self, handle: Handle<E>) -> Result<EntityEntry<'_>, InternalError> {
        if self.tracker.options.auto_detect_changes {
            self.with_metrics(|tracker| tracker.detect_one(handle.id()))?;
        }

        EntityEntry::new(&mut self.tracker, handle.id())
    }

    /// Read-only entry without triggering detection.
    pub fn entry_ref<E: EntityKind>(&self, handle: Handle<E>) -> Result<EntryRef<'_>, InternalError> {
        EntryRef::new(&self.tracker, handle.id())
    }

    /// Every tracked entry, ordered by entity name then key.
    pub fn entries(&mut self) -> Result<Vec<EntryRef<'_>>, InternalError> {
        self.auto_detect()?;
        self.collect_entries(|_| true)
    }

    pub fn entries_of<E: EntityKind>(&mut self) -> Result<Vec<EntryRef<'_>>, InternalError> {
        self.auto_detect()?;
        self.collect_entries(|name| name == E::MODEL.name)
    }

    fn collect_entries(&self, filter: impl Fn(&str) -> bool) -> Result<Vec<EntryRef<'_>>, InternalError> {
        self.tracker
            .identities()
            .filter(|(name, _, _)| filter(*name))
            .map(|(_, _, id)| EntryRef::new(&self.tracker, id))
            .collect()
    }

    #[must_use]
    pub fn tracked_count(&self) -> usize {
        self.tracker.tracked_count()
    }

    // ---------------------------------------------------------------------
    // Detection and submission
    // ---------------------------------------------------------------------

    fn auto_detect(&mut self) -> Result<(), InternalError> {
        if self.tracker.options.auto_detect_changes {
            self.detect_changes()?;
        }

        Ok(())
    }

    /// Scan every tracked instance and fix up what changed.
    pub fn detect_changes(&mut self) -> Result<(), InternalError> {
        self.with_metrics(Tracker::detect_all).map(|_| ())
    }

    pub fn has_changes(&mut self) -> Result<bool, InternalError> {
        self.auto_detect()?;

        Ok(self.tracker.tracked_ids().into_iter().any(|id| {
            matches!(
                self.tracker.state(id),
                EntityState::Added | EntityState::Modified | EntityState::Deleted
            )
        }))
    }

    /// Resolve deferred orphan and cascade deletions now.
    pub fn cascade_changes(&mut self) -> Result<(), InternalError> {
        self.auto_detect()?;
        self.with_metrics(|tracker| tracker.settle(true))
    }

    /// Persist every pending change through `store` in one transaction.
    pub fn submit(&mut self, store: &mut dyn Store) -> Result<SubmitSummary, InternalError> {
        self.with_metrics(|tracker| tracker.submit(store))
    }

    /// Human-readable dump of every tracked entry.
    #[must_use]
    pub fn debug_view(&self, mode: DebugViewMode) -> String {
        debug::render(&self.tracker, mode)
    }
}

fn mismatched<E: EntityKind>(id: EntityId) -> InternalError {
    InternalError::access(format!("entity {id} is not a '{}'", E::MODEL.name))
}

use crate::error::Error;
use entrack_core::{
    self as core,
    config::{IdentityResolution, Timing, TrackingOptions},
    model::Schema,
    obs::MetricsSink,
    persist::{Row, Store, SubmitSummary},
    session::DebugViewMode,
    tracker::{EntityEntry, EntryRef},
    traits::{EntityId, EntityKind, Handle},
    value::KeyValue,
};
use std::sync::Arc;

///
/// Session
/// Public facade over one unit of work.
/// Converts core errors into `entrack::Error`.
///

pub struct Session {
    inner: core::session::Session,
}

impl Session {
    #[must_use]
    pub fn new(schema: Arc<Schema>) -> Self {
        Self {
            inner: core::session::Session::new(schema),
        }
    }

    #[must_use]
    pub fn with_options(schema: Arc<Schema>, options: TrackingOptions) -> Self {
        Self {
            inner: core::session::Session::with_options(schema, options),
        }
    }

    /// Override the metrics sink for operations executed through this session.
    #[must_use]
    pub fn metrics_sink(mut self, sink: &'static dyn MetricsSink) -> Self {
        self.inner = self.inner.metrics_sink(sink);
        self
    }

    #[must_use]
    pub fn schema(&self) -> Arc<Schema> {
        self.inner.schema()
    }

    #[must_use]
    pub const fn options(&self) -> &TrackingOptions {
        self.inner.options()
    }

    //
    // Options
    //

    pub const fn set_orphan_timing(&mut self, timing: Timing) {
        self.inner.set_orphan_timing(timing);
    }

    pub const fn set_cascade_timing(&mut self, timing: Timing) {
        self.inner.set_cascade_timing(timing);
    }

    pub const fn set_auto_detect_changes(&mut self, enabled: bool) {
        self.inner.set_auto_detect_changes(enabled);
    }

    pub const fn set_identity_resolution(&mut self, policy: IdentityResolution) {
        self.inner.set_identity_resolution(policy);
    }

    //
    // Instances
    //

    pub fn create<E: EntityKind>(&mut self, entity: E) -> Result<Handle<E>, Error> {
        Ok(self.inner.create(entity)?)
    }

    pub fn get<E: EntityKind>(&self, handle: Handle<E>) -> Result<&E, Error> {
        Ok(self.inner.get(handle)?)
    }

    pub fn get_mut<E: EntityKind>(&mut self, handle: Handle<E>) -> Result<&mut E, Error> {
        Ok(self.inner.get_mut(handle)?)
    }

    #[must_use]
    pub fn find<E: EntityKind>(&self, key: impl Into<KeyValue>) -> Option<Handle<E>> {
        self.inner.find(key)
    }

    //
    // Tracking
    //

    pub fn add<E: EntityKind>(&mut self, handle: Handle<E>) -> Result<Handle<E>, Error> {
        Ok(self.inner.add(handle)?)
    }

    pub fn attach<E: EntityKind>(&mut self, handle: Handle<E>) -> Result<Handle<E>, Error> {
        Ok(self.inner.attach(handle)?)
    }

    pub fn update<E: EntityKind>(&mut self, handle: Handle<E>) -> Result<Handle<E>, Error> {
        Ok(self.inner.update(handle)?)
    }

    pub fn remove<E: EntityKind>(&mut self, handle: Handle<E>) -> Result<(), Error> {
        Ok(self.inner.remove(handle)?)
    }

    pub fn detach<E: EntityKind>(&mut self, handle: Handle<E>) -> Result<(), Error> {
        Ok(self.inner.detach(handle)?)
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }

    pub fn materialize<E: EntityKind>(&mut self, entity: E) -> Result<Handle<E>, Error> {
        Ok(self.inner.materialize(entity)?)
    }

    pub fn materialize_row(&mut self, entity: &str, row: &Row) -> Result<EntityId, Error> {
        Ok(self.inner.materialize_row(entity, row)?)
    }

    pub fn load<E: EntityKind>(&mut self, store: &dyn Store) -> Result<Vec<Handle<E>>, Error> {
        Ok(self.inner.load(store)?)
    }

    pub fn load_entity(&mut self, store: &dyn Store, entity: &str) -> Result<Vec<EntityId>, Error> {
        Ok(self.inner.load_entity(store, entity)?)
    }

    //
    // Entries
    //

    pub fn entry<E: EntityKind>(&mut self, handle: Handle<E>) -> Result<EntityEntry<'_>, Error> {
        Ok(self.inner.entry(handle)?)
    }

    pub fn entry_ref<E: EntityKind>(&self, handle: Handle<E>) -> Result<EntryRef<'_>, Error> {
        Ok(self.inner.entry_ref(handle)?)
    }

    pub fn entries(&mut self) -> Result<Vec<EntryRef<'_>>, Error> {
        Ok(self.inner.entries()?)
    }

    pub fn entries_of<E: EntityKind>(&mut self) -> Result<Vec<EntryRef<'_>>, Error> {
        Ok(self.inner.entries_of::<E>()?)
    }

    #[must_use]
    pub fn tracked_count(&self) -> usize {
        self.inner.tracked_count()
    }

    //
    // Detection and submission
    //

    pub fn detect_changes(&mut self) -> Result<(), Error> {
        Ok(self.inner.detect_changes()?)
    }

    pub fn has_changes(&mut self) -> Result<bool, Error> {
        Ok(self.inner.has_changes()?)
    }

    pub fn cascade_changes(&mut self) -> Result<(), Error> {
        Ok(self.inner.cascade_changes()?)
    }

    pub fn submit(&mut self, store: &mut dyn Store) -> Result<SubmitSummary, Error> {
        Ok(self.inner.submit(store)?)
    }

    #[must_use]
    pub fn debug_view(&self, mode: DebugViewMode) -> String {
        self.inner.debug_view(mode)
    }
}

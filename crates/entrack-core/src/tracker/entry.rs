//! Module: entry
//! Responsibility: public entry views and explicit state transitions.
//! Does not own: automatic transitions driven by detection or fixup.
//!
//! Invariants:
//! - One entry per instance; views over the same instance compare equal.
//! - A rejected transition leaves the entry exactly as it was.


use crate::{
    error::InternalError,
    traits::{EntityId, EntityKind, EntityValue},
    tracker::{
        EntityState, NavigationEntry, Slot, Tracker,
        snapshot::{ForeignKeyValue, PropertyEntry},
    },
    value::{KeyValue, Value},
};
use tracing::debug;

///
/// EntryRef
///
/// Read-only view of one entry.
///

#[derive(Clone, Copy)]
pub struct EntryRef<'a> {
    tracker: &'a Tracker,
    slot: &'a Slot,
    id: EntityId,
}

impl<'a> EntryRef<'a> {
    pub(crate) fn new(tracker: &'a Tracker, id: EntityId) -> Result<Self, InternalError> {
        Ok(Self {
            tracker,
            slot: tracker.slot(id)?,
            id,
        })
    }

    #[must_use]
    pub const fn id(&self) -> EntityId {
        self.id
    }

    #[must_use]
    pub const fn state(&self) -> EntityState {
        self.slot.entry.state
    }

    #[must_use]
    pub fn entity_name(&self) -> &'static str {
        self.slot.entity.model().name
    }

    #[must_use]
    pub fn entity(&self) -> &'a dyn EntityValue {
        self.slot.entity.as_ref()
    }

    /// Typed access to the instance, if it is an `E`.
    #[must_use]
    pub fn get<E: EntityKind>(&self) -> Option<&'a E> {
        self.entity().downcast_ref::<E>()
    }

    #[must_use]
    pub fn key(&self) -> KeyValue {
        self.tracker.key(self.id).unwrap_or_default()
    }

    /// Scalar property entries in model field order; empty when Detached.
    #[must_use]
    pub fn properties(&self) -> &'a [PropertyEntry] {
        self.slot.entry.snapshot.properties()
    }

    #[must_use]
    pub fn property(&self, name: &str) -> Option<&'a PropertyEntry> {
        self.slot.entry.snapshot.by_name(name)
    }

    #[must_use]
    pub fn is_modified(&self, property: &str) -> bool {
        self.property(property).is_some_and(|p| p.modified)
    }

    #[must_use]
    pub fn original_value(&self, property: &str) -> Option<&'a Value> {
        self.property(property).map(|p| &p.original)
    }

    #[must_use]
    pub fn has_temporary_values(&self) -> bool {
        self.slot.entry.snapshot.any_temporary()
    }

    /// Foreign key of the named relationship, distinguishing a severed
    /// required key from a null optional one.
    #[must_use]
    pub fn foreign_key(&self, relation: &str) -> Option<ForeignKeyValue> {
        let schema = self.tracker.schema();
        let (_, model) = schema.relation_by_name(relation)?;
        if model.dependent != self.entity_name() || !self.state().is_tracked() {
            return None;
        }

        Some(self.slot.entry.snapshot.foreign_key(model.foreign_key))
    }

    /// Entry of the tracked principal referenced through `relation`.
    #[must_use]
    pub fn principal(&self, relation: &str) -> Option<EntryRef<'a>> {
        let schema = self.tracker.schema();
        let (id, _) = schema.relation_by_name(relation)?;
        let principal = self.tracker.principal_of(id, self.id)?;

        Self::new(self.tracker, principal).ok()
    }

    #[must_use]
    pub fn navigations(&self) -> &'a [NavigationEntry] {
        &self.slot.entry.navigations
    }

    #[must_use]
    pub fn navigation(&self, name: &str) -> Option<&'a NavigationEntry> {
        self.slot.entry.navigation(name)
    }
}

impl PartialEq for EntryRef<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.tracker, other.tracker) && self.id == other.id
    }
}

impl Eq for EntryRef<'_> {}

impl std::fmt::Debug for EntryRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryRef")
            .field("id", &self.id)
            .field("entity", &self.entity_name())
            .field("key", &self.key())
            .field("state", &self.state())
            .finish()
    }
}

///
/// EntityEntry
///
/// Mutable view of one entry: explicit transitions and flag changes.
///

pub struct EntityEntry<'a> {
    tracker: &'a mut Tracker,
    id: EntityId,
}

impl<'a> EntityEntry<'a> {
    pub(crate) fn new(tracker: &'a mut Tracker, id: EntityId) -> Result<Self, InternalError> {
        tracker.slot(id)?;
        Ok(Self { tracker, id })
    }

    /// Read-only view borrowing this entry.
    #[must_use]
    pub fn view(&self) -> EntryRef<'_> {
        EntryRef {
            tracker: self.tracker,
            slot: &self.tracker.slots[self.id.index()],
            id: self.id,
        }
    }

    #[must_use]
    pub const fn id(&self) -> EntityId {
        self.id
    }

    #[must_use]
    pub fn state(&self) -> EntityState {
        self.tracker.state(self.id)
    }

    #[must_use]
    pub fn key(&self) -> KeyValue {
        self.view().key()
    }

    #[must_use]
    pub fn property(&self, name: &str) -> Option<&PropertyEntry> {
        self.view().property(name)
    }

    #[must_use]
    pub fn navigation(&self, name: &str) -> Option<&NavigationEntry> {
        self.view().navigation(name)
    }

    #[must_use]
    pub fn foreign_key(&self, relation: &str) -> Option<ForeignKeyValue> {
        self.view().foreign_key(relation)
    }

    pub fn set_state(&mut self, state: EntityState) -> Result<(), InternalError> {
        self.tracker.set_state(self.id, state)
    }

    pub fn set_property_modified(&mut self, property: &str, modified: bool) -> Result<(), InternalError> {
        self.tracker.set_property_modified(self.id, property, modified)
    }

    /// Mark whether a navigation holds every related entity.
    pub fn set_loaded(&mut self, navigation: &str, loaded: bool) -> Result<(), InternalError> {
        let name = self.tracker.model(self.id)?.name;
        let entry = &mut self.tracker.slot_mut(self.id)?.entry;
        let nav = entry.navigation_mut(navigation).ok_or_else(|| {
            InternalError::tracker_not_found(format!("'{name}' has no tracked navigation '{navigation}'"))
        })?;
        nav.loaded = loaded;

        Ok(())
    }

    /// Detect this entry's own changes; returns whether anything changed.
    pub fn detect_changes(&mut self) -> Result<bool, InternalError> {
        Ok(self.tracker.detect_one(self.id)?.changed())
    }
}

impl Tracker {
    /// Explicit state assignment, validated against the transition table.
    pub(crate) fn set_state(&mut self, id: EntityId, to: EntityState) -> Result<(), InternalError> {
        let model = self.model(id)?;
        let from = self.state(id);
        if from == to {
            return Ok(());
        }

        match (from, to) {
            (_, EntityState::Detached) => self.untrack(id)?,

            (EntityState::Detached, EntityState::Deleted)
            | (
                EntityState::Unchanged | EntityState::Modified | EntityState::Deleted,
                EntityState::Added,
            ) => return Err(InternalError::invalid_transition(model.name, from, to)),

            (EntityState::Detached, _) => {
                self.track_one(id, to)?;
                self.initial_fixup(id, to != EntityState::Added)?;
                self.settle(false)?;
            }

            (_, EntityState::Deleted) => {
                self.mark_deleted(id, false)?;
                self.settle(false)?;
            }

            (EntityState::Added, _) if self.has_temporary_key(id) => {
                return Err(InternalError::invalid_transition(model.name, from, to));
            }

            (EntityState::Added | EntityState::Unchanged | EntityState::Modified | EntityState::Deleted, _) => {
                self.pending_cascades.remove(&id);
                let entry = &mut self.slot_mut(id)?.entry;
                entry.orphaned = false;
                if to == EntityState::Unchanged {
                    entry.snapshot.accept();
                } else {
                    entry.snapshot.mark_all_modified(model);
                }
                entry.state = to;
                entry.sync_modified_state();
                self.reindex_foreign_keys(id)?;
            }
        }

        debug!(entity = model.name, %id, %from, %to, "explicit state change");

        Ok(())
    }

    pub(crate) fn set_property_modified(
        &mut self,
        id: EntityId,
        property: &str,
        modified: bool,
    ) -> Result<(), InternalError> {
        let model = self.model(id)?;
        let state = self.state(id);
        if model.is_key(property) {
            return Err(InternalError::tracker_invariant(format!(
                "key property '{}.{property}' cannot be flagged modified",
                model.name
            )));
        }
        if matches!(state, EntityState::Detached | EntityState::Deleted) {
            return Err(InternalError::tracker_invariant(format!(
                "properties of a {state} '{}' cannot be flagged",
                model.name
            )));
        }

        let index = model.field_index(property).ok_or_else(|| {
            InternalError::model_unsupported(format!("'{}' has no field '{property}'", model.name))
        })?;
        let entry = &mut self.slot_mut(id)?.entry;
        if let Some(entry_property) = entry.snapshot.get_mut(index) {
            entry_property.modified = modified;
        }
        entry.sync_modified_state();

        Ok(())
    }
}

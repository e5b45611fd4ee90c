//! Module: tracker
//! Responsibility: per-session tracking state: the entity arena, entries,
//! identity map, relationship graph, and pending orphan/cascade work.
//! Does not own: persistence ordering or store I/O (see `persist`).
//!
//! Invariants:
//! - An instance is in the identity map iff its entry is not Detached.
//! - Every tracked entry has a snapshot and one navigation entry per binding.
//! - Fixup writes go to the live instance and the snapshot together, so
//!   detection never re-reports a change the engine made itself.

mod attach;
mod detect;
pub(crate) mod entry;
mod fixup;
mod graph;
mod identity;
pub(crate) mod join;
mod snapshot;

pub use entry::{EntityEntry, EntryRef};
pub use join::JoinRecord;
pub use snapshot::{ForeignKeyValue, PropertyEntry};

pub(crate) use attach::TrackMode;
pub(crate) use detect::DetectStats;

use crate::{
    config::TrackingOptions,
    error::InternalError,
    model::{EntityModel, KeyGeneration, NavigationBinding, RelationId, Schema},
    traits::{EntityId, EntityValue, Navigation},
    value::{KeyValue, Value},
};
use graph::RelationshipGraph;
use identity::IdentityMap;
use snapshot::ValueSnapshot;
use std::{
    collections::BTreeSet,
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{SystemTime, UNIX_EPOCH},
};
use ulid::Ulid;

///
/// EntityState
///

#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum EntityState {
    #[default]
    Detached,
    Unchanged,
    Added,
    Modified,
    Deleted,
}

impl EntityState {
    #[must_use]
    pub const fn is_tracked(self) -> bool {
        !matches!(self, Self::Detached)
    }
}

impl fmt::Display for EntityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Detached => "Detached",
            Self::Unchanged => "Unchanged",
            Self::Added => "Added",
            Self::Modified => "Modified",
            Self::Deleted => "Deleted",
        };
        f.write_str(label)
    }
}

///
/// NavigationEntry
///
/// Recorded value of one navigation as of the last detection or fixup.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NavigationEntry {
    pub name: &'static str,
    pub current: Navigation,
    /// Whether the navigation is known to hold every related entity.
    pub loaded: bool,
}

///
/// Entry
///

#[derive(Debug, Default)]
pub(crate) struct Entry {
    pub(crate) state: EntityState,
    pub(crate) snapshot: ValueSnapshot,
    pub(crate) navigations: Vec<NavigationEntry>,
    /// Deleted by orphan or cascade resolution rather than explicitly.
    pub(crate) orphaned: bool,
}

impl Entry {
    pub(crate) fn navigation(&self, name: &str) -> Option<&NavigationEntry> {
        self.navigations.iter().find(|nav| nav.name == name)
    }

    pub(crate) fn navigation_mut(&mut self, name: &str) -> Option<&mut NavigationEntry> {
        self.navigations.iter_mut().find(|nav| nav.name == name)
    }

    // Keep "Modified iff some property is modified" after a flag change.
    fn sync_modified_state(&mut self) {
        let any = self.snapshot.any_modified();
        match self.state {
            EntityState::Unchanged if any => self.state = EntityState::Modified,
            EntityState::Modified if !any => self.state = EntityState::Unchanged,
            _ => {}
        }
    }
}

///
/// Slot
///

#[derive(Debug)]
pub(crate) struct Slot {
    pub(crate) entity: Box<dyn EntityValue>,
    pub(crate) entry: Entry,
}

static CLIENT_KEY_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

// Client-generated keys are unique per process: the random component is a sequence.
fn next_client_key() -> Ulid {
    let sequence = CLIENT_KEY_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    Ulid::from_parts(now_millis(), u128::from(sequence))
}

pub(crate) const fn empty_navigation(binding: &NavigationBinding) -> Navigation {
    if binding.is_collection() {
        Navigation::Collection(Vec::new())
    } else {
        Navigation::Reference(None)
    }
}

// Collections compare as sets.
pub(crate) fn same_navigation(a: &Navigation, b: &Navigation) -> bool {
    match (a, b) {
        (Navigation::Collection(a), Navigation::Collection(b)) => {
            a.iter().collect::<BTreeSet<_>>() == b.iter().collect::<BTreeSet<_>>()
        }
        _ => a == b,
    }
}

///
/// Tracker
///

#[derive(Debug)]
pub(crate) struct Tracker {
    schema: Arc<Schema>,
    pub(crate) options: TrackingOptions,
    slots: Vec<Slot>,
    identity: IdentityMap,
    graph: RelationshipGraph,
    next_temporary: i64,
    pending_orphans: BTreeSet<(EntityId, RelationId)>,
    pending_cascades: BTreeSet<EntityId>,
}

impl Tracker {
    pub(crate) fn new(schema: Arc<Schema>, options: TrackingOptions) -> Self {
        Self {
            schema,
            options,
            slots: Vec::new(),
            identity: IdentityMap::default(),
            graph: RelationshipGraph::default(),
            next_temporary: -1,
            pending_orphans: BTreeSet::new(),
            pending_cascades: BTreeSet::new(),
        }
    }

    pub(crate) fn schema(&self) -> Arc<Schema> {
        Arc::clone(&self.schema)
    }

    // ------------------------------------------------------------------
    // Arena
    // ------------------------------------------------------------------

    /// Place an untracked instance into the arena.
    pub(crate) fn insert(&mut self, entity: Box<dyn EntityValue>) -> Result<EntityId, InternalError> {
        self.schema.require_entity(entity.model().name)?;
        let index = u32::try_from(self.slots.len())
            .map_err(|_| InternalError::tracker_invariant("entity arena is full"))?;

        self.slots.push(Slot {
            entity,
            entry: Entry::default(),
        });

        Ok(EntityId(index))
    }

    /// Blank instance of a registered entity: its constructor, or a join record.
    pub(crate) fn instantiate(&self, name: &str) -> Result<Box<dyn EntityValue>, InternalError> {
        let descriptor = self.schema.require_entity(name)?;
        match descriptor.create {
            Some(create) => Ok(create()),
            None if descriptor.join_of.is_some() => Ok(Box::new(JoinRecord::new(descriptor.model))),
            None => Err(InternalError::model_unsupported(format!(
                "entity '{name}' has no constructor; register it with `entity::<E>()`"
            ))),
        }
    }

    pub(crate) fn slot(&self, id: EntityId) -> Result<&Slot, InternalError> {
        self.slots
            .get(id.index())
            .ok_or_else(|| InternalError::tracker_not_found(format!("no entity {id} in this session")))
    }

    pub(crate) fn slot_mut(&mut self, id: EntityId) -> Result<&mut Slot, InternalError> {
        self.slots
            .get_mut(id.index())
            .ok_or_else(|| InternalError::tracker_not_found(format!("no entity {id} in this session")))
    }

    pub(crate) fn entity(&self, id: EntityId) -> Result<&dyn EntityValue, InternalError> {
        Ok(self.slot(id)?.entity.as_ref())
    }

    pub(crate) fn entity_mut(&mut self, id: EntityId) -> Result<&mut dyn EntityValue, InternalError> {
        Ok(self.slot_mut(id)?.entity.as_mut())
    }

    pub(crate) fn state(&self, id: EntityId) -> EntityState {
        self.slots
            .get(id.index())
            .map_or(EntityState::Detached, |slot| slot.entry.state)
    }

    pub(crate) fn model(&self, id: EntityId) -> Result<&'static EntityModel, InternalError> {
        Ok(self.slot(id)?.entity.model())
    }

    /// Key from the snapshot for tracked entries, from the live instance otherwise.
    pub(crate) fn key(&self, id: EntityId) -> Result<KeyValue, InternalError> {
        let slot = self.slot(id)?;
        if slot.entry.state.is_tracked() {
            Ok(slot.entry.snapshot.key(slot.entity.model()))
        } else {
            Ok(slot.entity.key())
        }
    }

    /// Tracked ids in arena order.
    pub(crate) fn tracked_ids(&self) -> Vec<EntityId> {
        (0..self.slots.len())
            .filter(|&index| self.slots[index].entry.state.is_tracked())
            .filter_map(|index| u32::try_from(index).ok().map(EntityId))
            .collect()
    }

    #[cfg(test)]
    pub(crate) const fn arena_len(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn tracked_count(&self) -> usize {
        self.identity.len()
    }

    pub(crate) fn identities(&self) -> impl Iterator<Item = (&'static str, &KeyValue, EntityId)> {
        self.identity.iter()
    }

    pub(crate) fn find(&self, entity: &'static str, key: &KeyValue) -> Option<EntityId> {
        self.identity.find(entity, key)
    }

    /// Untrack everything; instances stay in the arena as Detached.
    pub(crate) fn clear(&mut self) {
        for slot in &mut self.slots {
            slot.entry = Entry::default();
        }
        self.identity.clear();
        self.graph.clear();
        self.pending_orphans.clear();
        self.pending_cascades.clear();
    }

    // ------------------------------------------------------------------
    // Keys
    // ------------------------------------------------------------------

    fn next_temporary_key(&mut self) -> Value {
        let value = Value::Int(self.next_temporary);
        self.next_temporary = self.next_temporary.saturating_sub(1);
        value
    }

    fn generate_key(&mut self, model: &EntityModel) -> Option<(Value, bool)> {
        match model.key_generation {
            KeyGeneration::Store => Some((self.next_temporary_key(), true)),
            KeyGeneration::Client => Some((Value::Ulid(next_client_key()), false)),
            KeyGeneration::None => None,
        }
    }

    /// True when any key component is a placeholder awaiting a generated value.
    pub(crate) fn has_temporary_key(&self, id: EntityId) -> bool {
        self.slot(id).is_ok_and(|slot| {
            let model = slot.entity.model();
            model
                .primary_key
                .iter()
                .any(|name| slot.entry.snapshot.by_name(name).is_some_and(|p| p.temporary))
        })
    }

    // ------------------------------------------------------------------
    // Scalar writes
    // ------------------------------------------------------------------

    /// Write one scalar to the live instance and, when tracked, its snapshot.
    pub(crate) fn write_value(
        &mut self,
        id: EntityId,
        field: &str,
        value: Value,
        temporary: bool,
    ) -> Result<(), InternalError> {
        let slot = self.slot_mut(id)?;
        let model = slot.entity.model();
        let index = model.field_index(field).ok_or_else(|| {
            InternalError::model_unsupported(format!("'{}' has no field '{field}'", model.name))
        })?;

        if slot.entity.get_value(field).as_ref() != Some(&value) {
            slot.entity.set_value(field, value.clone())?;
        }
        if !slot.entry.state.is_tracked() {
            return Ok(());
        }

        let Some(property) = slot.entry.snapshot.get_mut(index) else {
            return Ok(());
        };
        let changed = property.current != value || property.conceptual_null;
        property.current = value;
        property.temporary = temporary;
        property.conceptual_null = false;

        if changed {
            self.refresh_property(id, index)?;
        }

        Ok(())
    }

    /// Recompute one property's modified flag and the entry state from it.
    pub(crate) fn refresh_property(&mut self, id: EntityId, index: usize) -> Result<(), InternalError> {
        let slot = self.slot_mut(id)?;
        if !matches!(
            slot.entry.state,
            EntityState::Unchanged | EntityState::Modified
        ) {
            return Ok(());
        }

        let model = slot.entity.model();
        if let Some(property) = slot.entry.snapshot.get_mut(index)
            && !model.is_key(property.name)
        {
            property.modified = property.current != property.original || property.conceptual_null;
        }
        slot.entry.sync_modified_state();

        Ok(())
    }

    // ------------------------------------------------------------------
    // Navigation writes
    // ------------------------------------------------------------------

    fn live_navigation(&self, id: EntityId, binding: &NavigationBinding) -> Result<Navigation, InternalError> {
        Ok(self
            .entity(id)?
            .get_navigation(binding.name())
            .unwrap_or_else(|| empty_navigation(binding)))
    }

    // Apply `edit` to the live navigation and to its recorded value.
    fn edit_navigation(
        &mut self,
        id: EntityId,
        name: &str,
        edit: impl Fn(&mut Navigation),
    ) -> Result<(), InternalError> {
        let slot = self.slot_mut(id)?;
        if !slot.entry.state.is_tracked() {
            return Ok(());
        }

        if let Some(mut live) = slot.entity.get_navigation(name) {
            let before = live.clone();
            edit(&mut live);
            if live != before {
                slot.entity.set_navigation(name, live)?;
            }
        }
        if let Some(recorded) = slot.entry.navigation_mut(name) {
            edit(&mut recorded.current);
        }

        Ok(())
    }

    pub(crate) fn set_reference(
        &mut self,
        id: EntityId,
        name: &str,
        target: Option<EntityId>,
    ) -> Result<(), InternalError> {
        self.edit_navigation(id, name, |nav| {
            if let Navigation::Reference(current) = nav {
                *current = target;
            }
        })
    }

    pub(crate) fn add_member(&mut self, id: EntityId, name: &str, target: EntityId) -> Result<(), InternalError> {
        self.edit_navigation(id, name, |nav| {
            if let Navigation::Collection(items) = nav
                && !items.contains(&target)
            {
                items.push(target);
            }
        })
    }

    pub(crate) fn remove_member(
        &mut self,
        id: EntityId,
        name: &str,
        target: EntityId,
    ) -> Result<(), InternalError> {
        self.edit_navigation(id, name, |nav| {
            if let Navigation::Collection(items) = nav {
                items.retain(|item| *item != target);
            }
        })
    }

    /// Rewire a live navigation from a discarded duplicate to the tracked instance.
    pub(crate) fn replace_target(
        &mut self,
        id: EntityId,
        name: &str,
        from: EntityId,
        to: EntityId,
    ) -> Result<(), InternalError> {
        let entity = self.entity_mut(id)?;
        let Some(mut live) = entity.get_navigation(name) else {
            return Ok(());
        };

        let changed = match &mut live {
            Navigation::Reference(target) if *target == Some(from) => {
                *target = Some(to);
                true
            }
            Navigation::Collection(items) if items.contains(&from) => {
                items.retain(|item| *item != from);
                if !items.contains(&to) {
                    items.push(to);
                }
                true
            }
            _ => false,
        };
        if changed {
            entity.set_navigation(name, live)?;
        }

        Ok(())
    }
}

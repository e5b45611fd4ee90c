//! Module: attach
//! Responsibility: bring untracked entity graphs under tracking (add, attach,
//! update, discovery, materialization) and run their initial fixup.
//! Does not own: navigation diffing (shared with `detect`).
//!
//! Invariants:
//! - Identity conflicts are found before any instance is tracked, so a
//!   rejected graph leaves the tracker untouched.
//! - Every tracked instance receives initial fixup exactly once.

use crate::{
    config::IdentityResolution,
    error::InternalError,
    model::KeyGeneration,
    obs::sink::{MetricsEvent, record},
    model::EntityModel,
    traits::{EntityId, EntityValue},
    tracker::{
        Entry, EntityState, NavigationEntry, Tracker, empty_navigation,
        snapshot::{ForeignKeyValue, ValueSnapshot},
    },
    value::{KeyValue, Value},
};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use tracing::{debug, trace};

///
/// TrackMode
/// How an untracked graph enters the tracker.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum TrackMode {
    /// Every reachable instance is new.
    Add,
    /// Instances with a key are existing rows; unset keys are new.
    Attach,
    /// Like `Attach`, but keyed instances are assumed fully modified.
    Update,
    /// Reached from a tracked navigation during change detection.
    Discover,
    /// Loaded from a store; the tracked instance wins unless the policy
    /// merges incoming rows, which then overwrite values and originals.
    Materialize,
}

impl TrackMode {
    const fn state_for(self, key_unset: bool) -> EntityState {
        match self {
            Self::Add => EntityState::Added,
            Self::Attach | Self::Discover | Self::Update if key_unset => EntityState::Added,
            Self::Attach | Self::Discover | Self::Materialize => EntityState::Unchanged,
            Self::Update => EntityState::Modified,
        }
    }

    // Join records created while tracking existing rows mirror existing rows.
    pub(crate) const fn existing_graph(self) -> bool {
        matches!(self, Self::Attach | Self::Materialize | Self::Update)
    }
}

impl Tracker {
    /// Track every untracked instance reachable from `roots`.
    ///
    /// Returns the tracked instance for each root; a root that duplicates an
    /// already tracked identity resolves to that instance.
    pub(crate) fn track_graph(
        &mut self,
        roots: &[EntityId],
        mode: TrackMode,
    ) -> Result<Vec<EntityId>, InternalError> {
        // Materialization never fails on a conflict.
        let policy = match (mode, self.options.identity_resolution) {
            (TrackMode::Materialize, IdentityResolution::Reject) => IdentityResolution::PreserveExisting,
            (_, policy) => policy,
        };
        let schema = self.schema();

        // Phase 1: collect the untracked subgraph reachable from the roots.
        let mut order = Vec::new();
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::new();
        for &root in roots {
            self.slot(root)?;
            if !self.state(root).is_tracked() && seen.insert(root) {
                queue.push_back(root);
            }
        }
        while let Some(id) = queue.pop_front() {
            order.push(id);
            let entity = self.entity(id)?;
            let descriptor = schema.require_entity(entity.model().name)?;
            for binding in &descriptor.navigations {
                let Some(navigation) = entity.get_navigation(binding.name()) else {
                    continue;
                };
                for target in navigation.targets() {
                    self.slot(target)?;
                    if !self.state(target).is_tracked() && seen.insert(target) {
                        queue.push_back(target);
                    }
                }
            }
        }

        // Phase 2: decide states and resolve identities without mutating anything.
        let mut plan = Vec::with_capacity(order.len());
        let mut claimed: BTreeMap<(&'static str, KeyValue), EntityId> = BTreeMap::new();
        let mut resolved: BTreeMap<EntityId, EntityId> = BTreeMap::new();
        for &id in &order {
            let entity = self.entity(id)?;
            let model = entity.model();
            let key = entity.key();
            let state = mode.state_for(key.is_unset());

            let generated = state == EntityState::Added
                && key.is_unset()
                && model.key_generation != KeyGeneration::None;
            if !generated {
                let holder = self
                    .identity
                    .find(model.name, &key)
                    .or_else(|| claimed.get(&(model.name, key.clone())).copied());
                if let Some(holder) = holder {
                    if policy == IdentityResolution::Reject {
                        return Err(InternalError::identity_conflict(model.name, key));
                    }
                    resolved.insert(id, holder);
                    continue;
                }
                claimed.insert((model.name, key), id);
            }

            plan.push((id, state));
        }

        // Phase 3: duplicates either donate their values or are dropped.
        for (&incoming, &holder) in &resolved {
            if policy == IdentityResolution::MergeIncoming {
                let source = self.entity(incoming)?;
                let (model, values) = (source.model(), non_key_values(source));
                if mode == TrackMode::Materialize {
                    self.refresh_values(holder, model, values)?;
                } else {
                    self.merge_values(holder, values)?;
                }
            }
            record(MetricsEvent::IdentityResolved {
                entity: self.model(holder)?.name,
            });
        }

        // Phase 4: rewire navigations away from dropped duplicates.
        if !resolved.is_empty() {
            for &(id, _) in &plan {
                let descriptor = schema.require_entity(self.model(id)?.name)?;
                for binding in &descriptor.navigations {
                    for target in self.live_navigation(id, binding)?.targets() {
                        if let Some(&holder) = resolved.get(&target) {
                            self.replace_target(id, binding.name(), target, holder)?;
                        }
                    }
                }
            }
        }

        // Phase 5: track.
        for &(id, state) in &plan {
            self.track_one(id, state)?;
        }

        // Phase 6: initial fixup once the whole subgraph is tracked.
        for &(id, _) in &plan {
            self.initial_fixup(id, mode.existing_graph())?;
        }

        debug!(
            ?mode,
            tracked = plan.len(),
            resolved = resolved.len(),
            "tracked entity graph"
        );

        Ok(roots
            .iter()
            .map(|root| resolved.get(root).copied().unwrap_or(*root))
            .collect())
    }

    // Copy non-key scalars from a discarded duplicate onto the tracked instance.
    fn merge_values(
        &mut self,
        holder: EntityId,
        values: Vec<(&'static str, Value)>,
    ) -> Result<(), InternalError> {
        let target = self.entity_mut(holder)?;
        for (field, value) in values {
            target.set_value(field, value)?;
        }

        Ok(())
    }

    /// Tracked instance already holding the identity of a stored row.
    ///
    /// Under `MergeIncoming` the row's values replace the tracked values and
    /// originals. Nothing is placed in the arena for the row.
    pub(crate) fn resolve_stored(&mut self, row: &dyn EntityValue) -> Result<Option<EntityId>, InternalError> {
        let model = row.model();
        let key = row.key();
        if key.is_unset() {
            return Ok(None);
        }
        let Some(holder) = self.identity.find(model.name, &key) else {
            return Ok(None);
        };

        if self.options.identity_resolution == IdentityResolution::MergeIncoming {
            self.refresh_values(holder, model, non_key_values(row))?;
        }
        record(MetricsEvent::IdentityResolved { entity: model.name });
        trace!(entity = model.name, %key, %holder, "stored row resolved to tracked instance");

        Ok(Some(holder))
    }

    // Stored values become both current and original; foreign keys they move are fixed up.
    fn refresh_values(
        &mut self,
        holder: EntityId,
        model: &'static EntityModel,
        values: Vec<(&'static str, Value)>,
    ) -> Result<(), InternalError> {
        if !matches!(self.state(holder), EntityState::Unchanged | EntityState::Modified) {
            return Ok(());
        }

        let mut moved = Vec::new();
        let slot = self.slot_mut(holder)?;
        for (field, value) in values {
            slot.entity.set_value(field, value.clone())?;
            if let Some(property) = slot.entry.snapshot.by_name_mut(field) {
                if property.current != value || property.conceptual_null {
                    moved.push(field);
                }
                property.original = value.clone();
                property.current = value;
                property.conceptual_null = false;
            }
        }
        slot.entry.snapshot.recompute_modified(model);
        slot.entry.sync_modified_state();

        let schema = self.schema();
        for (relation, relation_model) in schema.relations_as_dependent(model.name) {
            if relation_model.foreign_key.iter().any(|field| moved.contains(field)) {
                self.foreign_key_changed(relation, holder)?;
            }
        }

        Ok(())
    }

    /// Start tracking one instance in `state` (keys, snapshot, identity, graph).
    pub(crate) fn track_one(&mut self, id: EntityId, state: EntityState) -> Result<(), InternalError> {
        let schema = self.schema();
        let model = self.model(id)?;
        let descriptor = schema.require_entity(model.name)?;

        // Store keys get a placeholder until insert; client keys are final.
        let mut temporary = false;
        if state == EntityState::Added
            && self.entity(id)?.key().is_unset()
            && let Some((value, placeholder)) = self.generate_key(model)
            && let Some(field) = model.primary_key.first()
        {
            self.entity_mut(id)?.set_value(field, value)?;
            temporary = placeholder;
        }

        let slot = self.slot_mut(id)?;
        let mut snapshot = ValueSnapshot::capture(slot.entity.as_ref());
        if temporary {
            for name in model.primary_key {
                if let Some(property) = snapshot.by_name_mut(name) {
                    property.temporary = true;
                }
            }
        }
        if state == EntityState::Modified {
            snapshot.mark_all_modified(model);
        }
        let key = snapshot.key(model);

        slot.entry = Entry {
            state,
            snapshot,
            navigations: descriptor
                .navigations
                .iter()
                .map(|binding| NavigationEntry {
                    name: binding.name(),
                    current: empty_navigation(binding),
                    loaded: state == EntityState::Added,
                })
                .collect(),
            orphaned: false,
        };
        slot.entry.sync_modified_state();

        if self.identity.insert(model.name, key.clone(), id).is_err() {
            self.slot_mut(id)?.entry = Entry::default();
            return Err(InternalError::identity_conflict(model.name, key));
        }
        self.reindex_foreign_keys(id)?;

        record(MetricsEvent::Tracked { entity: model.name });
        trace!(entity = model.name, %id, %key, %state, "tracking");

        Ok(())
    }

    /// Index every non-null foreign key the entry currently holds.
    pub(crate) fn reindex_foreign_keys(&mut self, id: EntityId) -> Result<(), InternalError> {
        let schema = self.schema();
        let model = self.model(id)?;

        for (relation, relation_model) in schema.relations_as_dependent(model.name) {
            let value = match self.slot(id)?.entry.snapshot.foreign_key(relation_model.foreign_key) {
                ForeignKeyValue::Value(key) => Some(key),
                ForeignKeyValue::Null | ForeignKeyValue::Severed => None,
            };
            self.graph.set_foreign_key(relation, id, value);
        }

        Ok(())
    }

    /// Fix up a freshly tracked instance against everything already tracked.
    pub(crate) fn initial_fixup(&mut self, id: EntityId, existing_graph: bool) -> Result<(), InternalError> {
        let schema = self.schema();
        let model = self.model(id)?;
        let descriptor = schema.require_entity(model.name)?;

        // Phase 1: navigations the instance arrived with win over foreign keys.
        for binding in &descriptor.navigations {
            self.reconcile_navigation(id, binding, existing_graph)?;
        }

        // Phase 2: foreign keys that reference tracked principals.
        for (relation, _) in schema.relations_as_dependent(model.name) {
            if let Some(principal) = self.principal_of(relation, id) {
                self.connect(relation, principal, id)?;
            }
        }

        // Phase 3: tracked dependents already pointing at this instance.
        let key = self.key(id)?;
        for (relation, _) in schema.relations_as_principal(model.name) {
            for dependent in self.graph.dependents(relation, &key) {
                if dependent != id
                    && matches!(
                        self.state(dependent),
                        EntityState::Unchanged | EntityState::Modified | EntityState::Added
                    )
                {
                    self.connect(relation, id, dependent)?;
                }
            }
        }

        Ok(())
    }

    /// Track an untracked instance reached from a tracked navigation.
    pub(crate) fn discover(&mut self, id: EntityId) -> Result<EntityId, InternalError> {
        if self.state(id).is_tracked() {
            return Ok(id);
        }

        let resolved = self.track_graph(&[id], TrackMode::Discover)?;
        Ok(resolved.into_iter().next().unwrap_or(id))
    }

    /// Stop tracking one instance; it stays in the arena as Detached.
    pub(crate) fn untrack(&mut self, id: EntityId) -> Result<(), InternalError> {
        let slot = self.slot_mut(id)?;
        if !slot.entry.state.is_tracked() {
            return Ok(());
        }

        let model = slot.entity.model();
        let key = slot.entry.snapshot.key(model);
        slot.entry = Entry::default();

        self.identity.remove(model.name, &key, id);
        self.graph.remove_dependent(id);
        self.pending_orphans.retain(|(dependent, _)| *dependent != id);
        self.pending_cascades.remove(&id);

        trace!(entity = model.name, %id, %key, "detached");

        Ok(())
    }
}

// Non-key scalars of `source`, in field order.
fn non_key_values(source: &dyn EntityValue) -> Vec<(&'static str, Value)> {
    let model = source.model();
    model
        .fields
        .iter()
        .filter(|field| !model.is_key(field.name))
        .filter_map(|field| source.get_value(field.name).map(|value| (field.name, value)))
        .collect()
}

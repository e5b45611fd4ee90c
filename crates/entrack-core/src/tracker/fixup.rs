//! Module: fixup
//! Responsibility: keep foreign keys and both navigation ends of every
//! relationship consistent, and derive orphan/cascade state transitions.
//! Does not own: change discovery (see `detect`) or submission.
//!
//! Invariants:
//! - After `connect`, the dependent's foreign key equals the principal key and
//!   both navigations reference each other.
//! - A severed required relationship leaves a conceptual null and a pending
//!   orphan; it is never written as a null value.
//! - Navigations of a deleted subgraph are left as they were.

use crate::{
    config::Timing,
    error::InternalError,
    model::{Cardinality, DeleteBehavior, JoinSide, NavigationBinding, RelationId, SkipId},
    obs::sink::{FixupKind, MetricsEvent, record},
    traits::{EntityId, Navigation},
    tracker::{EntityState, Tracker, snapshot::ForeignKeyValue},
    value::{KeyValue, Value},
};
use tracing::{debug, trace, warn};

impl Tracker {
    // ------------------------------------------------------------------
    // Graph queries
    // ------------------------------------------------------------------

    /// Tracked principal the dependent's foreign key currently points at.
    pub(crate) fn principal_of(&self, relation: RelationId, dependent: EntityId) -> Option<EntityId> {
        let key = self.graph.foreign_key(relation, dependent)?;
        let principal = self.schema.relation(relation).principal;

        self.identity.find(principal, key)
    }

    /// Tracked dependents whose foreign key matches the principal key.
    pub(crate) fn dependents_of(
        &self,
        relation: RelationId,
        principal: EntityId,
    ) -> Result<Vec<EntityId>, InternalError> {
        let key = self.key(principal)?;

        Ok(self
            .graph
            .dependents(relation, &key)
            .into_iter()
            .filter(|id| self.state(*id).is_tracked())
            .collect())
    }

    fn fixup_event(&self, kind: FixupKind, id: EntityId) {
        if let Ok(model) = self.model(id) {
            record(MetricsEvent::Fixup {
                kind,
                entity: model.name,
            });
        }
    }

    // ------------------------------------------------------------------
    // Navigation ends
    // ------------------------------------------------------------------

    fn link_principal_side(
        &mut self,
        relation: RelationId,
        principal: EntityId,
        dependent: EntityId,
    ) -> Result<(), InternalError> {
        match self.schema.principal_navigation(relation) {
            Some(NavigationBinding::Dependents {
                name,
                cardinality: Cardinality::Many,
                ..
            }) => self.add_member(principal, name, dependent),
            Some(NavigationBinding::Dependents {
                name,
                cardinality: Cardinality::One,
                ..
            }) => self.set_reference(principal, name, Some(dependent)),
            _ => Ok(()),
        }
    }

    fn unlink_principal_side(
        &mut self,
        relation: RelationId,
        principal: EntityId,
        dependent: EntityId,
    ) -> Result<(), InternalError> {
        match self.schema.principal_navigation(relation) {
            Some(NavigationBinding::Dependents {
                name,
                cardinality: Cardinality::Many,
                ..
            }) => self.remove_member(principal, name, dependent),
            Some(NavigationBinding::Dependents {
                name,
                cardinality: Cardinality::One,
                ..
            }) => self.clear_reference_if(principal, name, dependent),
            _ => Ok(()),
        }
    }

    fn clear_reference_if(
        &mut self,
        id: EntityId,
        name: &str,
        target: EntityId,
    ) -> Result<(), InternalError> {
        self.edit_navigation(id, name, |nav| {
            if let Navigation::Reference(current) = nav
                && *current == Some(target)
            {
                *current = None;
            }
        })
    }

    // ------------------------------------------------------------------
    // Connect / sever
    // ------------------------------------------------------------------

    /// Associate `dependent` with `principal`, moving it away from any previous principal.
    pub(crate) fn connect(
        &mut self,
        relation: RelationId,
        principal: EntityId,
        dependent: EntityId,
    ) -> Result<(), InternalError> {
        let schema = self.schema();
        let model = schema.relation(relation);

        if let Some(previous) = self.principal_of(relation, dependent)
            && previous != principal
        {
            self.unlink_principal_side(relation, previous, dependent)?;
        }

        // One-to-one: the principal reference holds a single dependent.
        if model.is_one_to_one() {
            for other in self.dependents_of(relation, principal)? {
                if other != dependent && self.state(other) != EntityState::Deleted {
                    self.sever(relation, other, Some(principal))?;
                }
            }
        }

        let (key, temporary) = {
            let slot = self.slot(principal)?;
            let principal_model = slot.entity.model();
            let mut parts = Vec::with_capacity(principal_model.primary_key.len());
            let mut temporary = Vec::with_capacity(principal_model.primary_key.len());
            for name in principal_model.primary_key {
                match slot.entry.snapshot.by_name(name) {
                    Some(property) => {
                        parts.push(property.current.clone());
                        temporary.push(property.temporary);
                    }
                    None => {
                        parts.push(slot.entity.get_value(name).unwrap_or(Value::Null));
                        temporary.push(false);
                    }
                }
            }
            (KeyValue::new(parts), temporary)
        };

        for ((field, value), temporary) in model
            .foreign_key
            .iter()
            .zip(key.parts())
            .zip(temporary)
        {
            self.write_value(dependent, field, value.clone(), temporary)?;
        }
        self.graph.set_foreign_key(relation, dependent, Some(key));
        self.pending_orphans.remove(&(dependent, relation));

        if self.state(dependent) == EntityState::Deleted && self.slot(dependent)?.entry.orphaned {
            self.revive(dependent)?;
        }

        if let Some(name) = model.dependent_navigation {
            self.set_reference(dependent, name, Some(principal))?;
        }
        self.link_principal_side(relation, principal, dependent)?;
        self.ensure_skip_membership(dependent)?;

        self.fixup_event(FixupKind::Connect, dependent);
        trace!(relation = model.name, %principal, %dependent, "connected");

        Ok(())
    }

    /// Break the association between `dependent` and its principal.
    ///
    /// Optional relationships null the foreign key. Required relationships
    /// record a conceptual null and leave the orphan decision to `settle`.
    pub(crate) fn sever(
        &mut self,
        relation: RelationId,
        dependent: EntityId,
        principal: Option<EntityId>,
    ) -> Result<(), InternalError> {
        if !matches!(
            self.state(dependent),
            EntityState::Unchanged | EntityState::Modified | EntityState::Added
        ) {
            return Ok(());
        }

        let schema = self.schema();
        let model = schema.relation(relation);

        match principal {
            Some(principal) => {
                self.unlink_principal_side(relation, principal, dependent)?;
                if let Some(name) = model.dependent_navigation {
                    self.clear_reference_if(dependent, name, principal)?;
                }
            }
            None => {
                if let Some(name) = model.dependent_navigation {
                    self.set_reference(dependent, name, None)?;
                }
            }
        }
        self.graph.set_foreign_key(relation, dependent, None);

        if model.required {
            self.mark_conceptual_null(dependent, model.foreign_key)?;
            self.pending_orphans.insert((dependent, relation));
        } else {
            for field in model.foreign_key {
                self.write_value(dependent, field, Value::Null, false)?;
            }
        }

        self.fixup_event(FixupKind::Sever, dependent);
        debug!(
            relation = model.name,
            %dependent,
            required = model.required,
            "severed relationship"
        );

        Ok(())
    }

    fn mark_conceptual_null(&mut self, id: EntityId, fields: &[&str]) -> Result<(), InternalError> {
        let model = self.model(id)?;
        for field in fields {
            let Some(index) = model.field_index(field) else {
                continue;
            };
            if let Some(property) = self.slot_mut(id)?.entry.snapshot.get_mut(index) {
                property.conceptual_null = true;
            }
            self.refresh_property(id, index)?;
        }

        Ok(())
    }

    /// React to a foreign key scalar the application changed directly.
    pub(crate) fn foreign_key_changed(
        &mut self,
        relation: RelationId,
        dependent: EntityId,
    ) -> Result<(), InternalError> {
        let schema = self.schema();
        let model = schema.relation(relation);
        let previous = self.principal_of(relation, dependent);
        let value = self.slot(dependent)?.entry.snapshot.foreign_key(model.foreign_key);

        match value {
            ForeignKeyValue::Value(key) => {
                self.graph.set_foreign_key(relation, dependent, Some(key.clone()));
                self.pending_orphans.remove(&(dependent, relation));

                let next = self.identity.find(model.principal, &key);
                if let Some(previous) = previous
                    && Some(previous) != next
                {
                    self.unlink_principal_side(relation, previous, dependent)?;
                }
                match next {
                    Some(principal) => self.connect(relation, principal, dependent)?,
                    None => {
                        if let Some(name) = model.dependent_navigation {
                            self.set_reference(dependent, name, None)?;
                        }
                    }
                }
            }
            ForeignKeyValue::Null | ForeignKeyValue::Severed => {
                self.graph.set_foreign_key(relation, dependent, None);
                if let Some(previous) = previous {
                    self.unlink_principal_side(relation, previous, dependent)?;
                }
                if let Some(name) = model.dependent_navigation {
                    self.set_reference(dependent, name, None)?;
                }
            }
        }

        Ok(())
    }

    // ------------------------------------------------------------------
    // Deletion, orphans, cascades
    // ------------------------------------------------------------------

    /// Mark an entity Deleted (Added entities become Detached) and apply
    /// principal-deletion fixup to its dependents.
    pub(crate) fn mark_deleted(&mut self, id: EntityId, orphaned: bool) -> Result<(), InternalError> {
        match self.state(id) {
            EntityState::Detached => Err(InternalError::invalid_transition(
                self.model(id)?.name,
                EntityState::Detached,
                EntityState::Deleted,
            )),
            EntityState::Deleted => Ok(()),
            EntityState::Added => {
                // Never persisted: dependents are resolved now, then the entry goes away.
                self.slot_mut(id)?.entry.state = EntityState::Deleted;
                self.apply_set_null(id)?;
                self.apply_cascade(id)?;
                self.untrack(id)
            }
            EntityState::Unchanged | EntityState::Modified => {
                let entry = &mut self.slot_mut(id)?.entry;
                entry.state = EntityState::Deleted;
                entry.orphaned = orphaned;
                entry.snapshot.clear_modified();

                self.apply_set_null(id)?;
                if self.options.cascade_timing != Timing::Never {
                    self.pending_cascades.insert(id);
                }

                Ok(())
            }
        }
    }

    /// Bring an orphan-deleted entity back after it was re-parented.
    pub(crate) fn revive(&mut self, id: EntityId) -> Result<(), InternalError> {
        let slot = self.slot_mut(id)?;
        let model = slot.entity.model();
        slot.entry.state = EntityState::Unchanged;
        slot.entry.orphaned = false;
        slot.entry.snapshot.recompute_modified(model);
        slot.entry.sync_modified_state();
        self.pending_cascades.remove(&id);

        debug!(entity = model.name, %id, "revived re-parented entity");

        Ok(())
    }

    // Optional dependents of a deleted principal lose their foreign key right away.
    fn apply_set_null(&mut self, principal: EntityId) -> Result<(), InternalError> {
        let schema = self.schema();
        let name = self.model(principal)?.name;

        for (relation, model) in schema.relations_as_principal(name) {
            if model.on_delete != DeleteBehavior::SetNull {
                continue;
            }
            for dependent in self.dependents_of(relation, principal)? {
                if dependent == principal || self.state(dependent) == EntityState::Deleted {
                    continue;
                }
                for field in model.foreign_key {
                    self.write_value(dependent, field, Value::Null, false)?;
                }
                self.graph.set_foreign_key(relation, dependent, None);
                if let Some(nav) = model.dependent_navigation {
                    self.clear_reference_if(dependent, nav, principal)?;
                }
                self.fixup_event(FixupKind::SetNull, dependent);
            }
        }

        Ok(())
    }

    // Cascade-delete dependents of a principal that is still deleted.
    fn apply_cascade(&mut self, principal: EntityId) -> Result<(), InternalError> {
        if self.state(principal) != EntityState::Deleted {
            return Ok(());
        }

        let schema = self.schema();
        let name = self.model(principal)?.name;
        for (relation, model) in schema.relations_as_principal(name) {
            if model.on_delete != DeleteBehavior::Cascade {
                continue;
            }
            for dependent in self.dependents_of(relation, principal)? {
                if dependent == principal
                    || !matches!(
                        self.state(dependent),
                        EntityState::Unchanged | EntityState::Modified | EntityState::Added
                    )
                {
                    continue;
                }

                self.fixup_event(FixupKind::CascadeDeleted, dependent);
                debug!(relation = model.name, %principal, %dependent, "cascade delete");
                self.mark_deleted(dependent, true)?;
            }
        }

        Ok(())
    }

    fn resolve_orphan(&mut self, dependent: EntityId, relation: RelationId) -> Result<(), InternalError> {
        if !matches!(
            self.state(dependent),
            EntityState::Unchanged | EntityState::Modified | EntityState::Added
        ) {
            return Ok(());
        }

        let fields = self.schema.relation(relation).foreign_key;
        if self.slot(dependent)?.entry.snapshot.foreign_key(fields) != ForeignKeyValue::Severed {
            return Ok(());
        }

        self.fixup_event(FixupKind::OrphanDeleted, dependent);
        debug!(relation = self.schema.relation(relation).name, %dependent, "orphan delete");
        self.mark_deleted(dependent, true)
    }

    const fn due(timing: Timing, force: bool) -> bool {
        match timing {
            Timing::Immediate => true,
            Timing::OnSubmit => force,
            Timing::Never => false,
        }
    }

    /// Resolve pending orphans and cascades whose timing has come.
    ///
    /// `force` also resolves `OnSubmit` work; `Never` work is left for submission
    /// validation to report.
    pub(crate) fn settle(&mut self, force: bool) -> Result<(), InternalError> {
        loop {
            let mut progressed = false;

            if Self::due(self.options.orphan_timing, force) && !self.pending_orphans.is_empty() {
                for (dependent, relation) in std::mem::take(&mut self.pending_orphans) {
                    self.resolve_orphan(dependent, relation)?;
                }
                progressed = true;
            }
            if Self::due(self.options.cascade_timing, force) && !self.pending_cascades.is_empty() {
                for principal in std::mem::take(&mut self.pending_cascades) {
                    self.apply_cascade(principal)?;
                }
                progressed = true;
            }

            if !progressed {
                return Ok(());
            }
        }
    }

    // ------------------------------------------------------------------
    // Key propagation
    // ------------------------------------------------------------------

    /// Re-key an entry and carry the new key into every dependent foreign key.
    pub(crate) fn rekey(&mut self, id: EntityId, old: &KeyValue, new: KeyValue) -> Result<(), InternalError> {
        let model = self.model(id)?;
        if self.identity.rekey(model.name, old, new.clone(), id).is_err() {
            return Err(InternalError::identity_conflict(model.name, new));
        }
        for (field, value) in model.primary_key.iter().zip(new.parts()) {
            self.write_value(id, field, value.clone(), false)?;
        }

        self.propagate_key(id, old, &new)
    }

    fn propagate_key(
        &mut self,
        principal: EntityId,
        old: &KeyValue,
        new: &KeyValue,
    ) -> Result<(), InternalError> {
        let schema = self.schema();
        let name = self.model(principal)?.name;

        for (relation, model) in schema.relations_as_principal(name) {
            for dependent in self.graph.dependents(relation, old) {
                if !self.state(dependent).is_tracked() {
                    continue;
                }

                let dependent_old = self.key(dependent)?;
                for (field, value) in model.foreign_key.iter().zip(new.parts()) {
                    self.write_value(dependent, field, value.clone(), false)?;
                }
                self.graph.set_foreign_key(relation, dependent, Some(new.clone()));

                // Join records key on their foreign keys.
                let dependent_new = self.key(dependent)?;
                if dependent_new != dependent_old {
                    let dependent_name = self.model(dependent)?.name;
                    if self
                        .identity
                        .rekey(dependent_name, &dependent_old, dependent_new.clone(), dependent)
                        .is_err()
                    {
                        return Err(InternalError::identity_conflict(dependent_name, dependent_new));
                    }
                    self.propagate_key(dependent, &dependent_old, &dependent_new)?;
                }

                self.fixup_event(FixupKind::KeyPropagated, dependent);
            }
        }

        Ok(())
    }

    // ------------------------------------------------------------------
    // Many-to-many
    // ------------------------------------------------------------------

    fn skip_ends(side: JoinSide, owner: EntityId, target: EntityId) -> (EntityId, EntityId) {
        match side {
            JoinSide::Left => (owner, target),
            JoinSide::Right => (target, owner),
        }
    }

    /// Join record (including deleted ones) linking `left` and `right`.
    fn find_join(
        &self,
        skip: SkipId,
        left: EntityId,
        right: EntityId,
    ) -> Result<Option<EntityId>, InternalError> {
        let (left_relation, right_relation) = self.schema.skip_relations(skip);
        let key = self.key(left)?;

        Ok(self
            .graph
            .dependents(left_relation, &key)
            .into_iter()
            .find(|join| {
                self.state(*join).is_tracked() && self.principal_of(right_relation, *join) == Some(right)
            }))
    }

    /// `target` was added to a skip collection of `owner`.
    pub(crate) fn skip_add(
        &mut self,
        skip: SkipId,
        side: JoinSide,
        owner: EntityId,
        target: EntityId,
        existing_graph: bool,
    ) -> Result<(), InternalError> {
        let (left, right) = Self::skip_ends(side, owner, target);

        match self.find_join(skip, left, right)? {
            Some(join) => {
                if self.state(join) == EntityState::Deleted {
                    self.revive(join)?;
                }
                self.ensure_skip_membership(join)
            }
            None => self.create_join(skip, left, right, existing_graph),
        }
    }

    /// `target` was removed from a skip collection of `owner`.
    pub(crate) fn skip_remove(
        &mut self,
        skip: SkipId,
        side: JoinSide,
        owner: EntityId,
        target: EntityId,
    ) -> Result<(), InternalError> {
        let (left, right) = Self::skip_ends(side, owner, target);
        let model = self.schema.skip(skip);

        let Some(join) = self.find_join(skip, left, right)? else {
            warn!(skip = model.name, %owner, %target, "no join record for removed member");
            return Ok(());
        };
        if self.state(join) != EntityState::Deleted {
            self.fixup_event(FixupKind::JoinRemoved, join);
            self.mark_deleted(join, false)?;
        }

        if let Some(name) = self.schema.skip_navigation(skip, side.other()) {
            self.remove_member(target, name, owner)?;
        }

        Ok(())
    }

    fn create_join(
        &mut self,
        skip: SkipId,
        left: EntityId,
        right: EntityId,
        existing_graph: bool,
    ) -> Result<(), InternalError> {
        let schema = self.schema();
        let model = schema.skip(skip);
        let join_model = model.join.model();
        let (left_relation, right_relation) = schema.skip_relations(skip);
        let join = self.insert(self.instantiate(join_model.name)?)?;

        // Key fields are the two foreign keys; write them before the identity is claimed.
        for (relation, principal) in [(left_relation, left), (right_relation, right)] {
            let key = self.key(principal)?;
            let entity = self.entity_mut(join)?;
            for (field, value) in schema.relation(relation).foreign_key.iter().zip(key.parts()) {
                entity.set_value(field, value.clone())?;
            }
        }

        let state = if existing_graph
            && self.state(left) != EntityState::Added
            && self.state(right) != EntityState::Added
        {
            EntityState::Unchanged
        } else {
            EntityState::Added
        };
        self.track_one(join, state)?;
        self.connect(left_relation, left, join)?;
        self.connect(right_relation, right, join)?;

        self.fixup_event(FixupKind::JoinCreated, join);
        debug!(skip = model.name, %left, %right, %join, %state, "created join record");

        Ok(())
    }

    /// Reflect a live join record in both skip navigations.
    pub(crate) fn ensure_skip_membership(&mut self, join: EntityId) -> Result<(), InternalError> {
        let schema = self.schema();
        let Some(skip) = schema.require_entity(self.model(join)?.name)?.join_of else {
            return Ok(());
        };
        if self.state(join) == EntityState::Deleted {
            return Ok(());
        }

        let (left_relation, right_relation) = schema.skip_relations(skip);
        let (Some(left), Some(right)) = (
            self.principal_of(left_relation, join),
            self.principal_of(right_relation, join),
        ) else {
            return Ok(());
        };

        let model = schema.skip(skip);
        self.add_member(left, model.left_navigation, right)?;
        if let Some(name) = model.right_navigation {
            self.add_member(right, name, left)?;
        }

        Ok(())
    }
}

//! Module: graph
//! Responsibility: foreign-key index of tracked dependents per relation.
//! Does not own: navigation values (kept on entries) or key resolution.
//!
//! Invariants:
//! - A dependent is indexed under at most one foreign-key value per relation.
//! - Null or severed foreign keys are never indexed.
//!
//! Dependent → principal resolves through the identity map using the
//! indexed foreign key; principal → dependents is a lookup by the
//! principal's key, so a principal tracked after its dependents finds them.


use crate::{model::RelationId, traits::EntityId, value::KeyValue};
use std::collections::{BTreeMap, BTreeSet};

///
/// RelationshipGraph
///

#[derive(Debug, Default)]
pub(crate) struct RelationshipGraph {
    by_foreign_key: BTreeMap<(RelationId, KeyValue), BTreeSet<EntityId>>,
    foreign_keys: BTreeMap<(RelationId, EntityId), KeyValue>,
}

impl RelationshipGraph {
    /// Foreign-key value `dependent` is indexed under for `relation`.
    pub(crate) fn foreign_key(&self, relation: RelationId, dependent: EntityId) -> Option<&KeyValue> {
        self.foreign_keys.get(&(relation, dependent))
    }

    /// Re-index one dependent; `None` removes it from the relation.
    pub(crate) fn set_foreign_key(
        &mut self,
        relation: RelationId,
        dependent: EntityId,
        value: Option<KeyValue>,
    ) {
        if self.foreign_keys.get(&(relation, dependent)) == value.as_ref() {
            return;
        }

        if let Some(old) = self.foreign_keys.remove(&(relation, dependent)) {
            self.unindex(relation, old, dependent);
        }
        if let Some(value) = value {
            self.by_foreign_key
                .entry((relation, value.clone()))
                .or_default()
                .insert(dependent);
            self.foreign_keys.insert((relation, dependent), value);
        }
    }

    /// Dependents whose foreign key equals `principal_key`, in id order.
    pub(crate) fn dependents(&self, relation: RelationId, principal_key: &KeyValue) -> Vec<EntityId> {
        self.by_foreign_key
            .get(&(relation, principal_key.clone()))
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Drop every foreign key held by `dependent`.
    pub(crate) fn remove_dependent(&mut self, dependent: EntityId) {
        let relations: Vec<RelationId> = self
            .foreign_keys
            .keys()
            .filter(|(_, id)| *id == dependent)
            .map(|(relation, _)| *relation)
            .collect();

        for relation in relations {
            self.set_foreign_key(relation, dependent, None);
        }
    }

    pub(crate) fn clear(&mut self) {
        self.by_foreign_key.clear();
        self.foreign_keys.clear();
    }

    fn unindex(&mut self, relation: RelationId, value: KeyValue, dependent: EntityId) {
        let slot = (relation, value);
        if let Some(set) = self.by_foreign_key.get_mut(&slot) {
            set.remove(&dependent);
            if set.is_empty() {
                self.by_foreign_key.remove(&slot);
            }
        }
    }
}

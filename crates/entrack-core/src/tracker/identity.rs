//! Module: identity
//! Responsibility: map each `(entity, key)` identity to the single tracked
//! instance of one session.
//! Does not own: conflict policy (applied by graph attach) or entry state.
//!
//! Invariants:
//! - At most one instance per identity.
//! - An instance is mapped iff its entry is not Detached.

#[cfg(test)]
mod tests;

use crate::{traits::EntityId, value::KeyValue};
use std::collections::BTreeMap;

///
/// IdentityMap
///

#[derive(Debug, Default)]
pub(crate) struct IdentityMap {
    map: BTreeMap<(&'static str, KeyValue), EntityId>,
}

impl IdentityMap {
    pub(crate) fn find(&self, entity: &'static str, key: &KeyValue) -> Option<EntityId> {
        self.map.get(&(entity, key.clone())).copied()
    }

    /// Return the instance already holding this identity, or claim it for `id`.
    pub(crate) fn get_or_insert(
        &mut self,
        entity: &'static str,
        key: KeyValue,
        id: EntityId,
    ) -> EntityId {
        *self.map.entry((entity, key)).or_insert(id)
    }

    /// Claim an identity; returns the current holder when it is taken by another instance.
    pub(crate) fn insert(
        &mut self,
        entity: &'static str,
        key: KeyValue,
        id: EntityId,
    ) -> Result<(), EntityId> {
        match self.get_or_insert(entity, key, id) {
            holder if holder == id => Ok(()),
            holder => Err(holder),
        }
    }

    /// Release an identity, but only if `id` is its holder.
    pub(crate) fn remove(&mut self, entity: &'static str, key: &KeyValue, id: EntityId) -> bool {
        let slot = (entity, key.clone());
        if self.map.get(&slot) == Some(&id) {
            self.map.remove(&slot);
            return true;
        }

        false
    }

    /// Move `id` from `old` to `new`, failing if `new` belongs to another instance.
    pub(crate) fn rekey(
        &mut self,
        entity: &'static str,
        old: &KeyValue,
        new: KeyValue,
        id: EntityId,
    ) -> Result<(), EntityId> {
        if let Some(holder) = self.find(entity, &new)
            && holder != id
        {
            return Err(holder);
        }

        self.remove(entity, old, id);
        self.map.insert((entity, new), id);

        Ok(())
    }

    pub(crate) fn len(&self) -> usize {
        self.map.len()
    }

    pub(crate) fn clear(&mut self) {
        self.map.clear();
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&'static str, &KeyValue, EntityId)> {
        self.map.iter().map(|((entity, key), id)| (*entity, key, *id))
    }
}

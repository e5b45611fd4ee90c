//! Module: snapshot
//! Responsibility: per-entity original/current scalar snapshots and the
//! property flags derived from them.
//! Does not own: entity state transitions or relationship bookkeeping.
//!
//! Invariants:
//! - `original` is fixed when tracking starts and only reset by accepting changes.
//! - `current` mirrors the live value as of the last detection or fixup write.
//! - `conceptual_null` marks a non-nullable foreign key that is logically null.

use crate::{
    model::EntityModel,
    traits::EntityValue,
    value::{KeyValue, Value},
};

///
/// PropertyEntry
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PropertyEntry {
    pub name: &'static str,
    pub current: Value,
    pub original: Value,
    pub modified: bool,
    /// Holds a placeholder until the store generates the real value.
    pub temporary: bool,
    /// Severed required foreign key awaiting orphan resolution.
    pub conceptual_null: bool,
}

impl PropertyEntry {
    #[must_use]
    pub const fn is_modified(&self) -> bool {
        self.modified
    }

    #[must_use]
    pub const fn is_temporary(&self) -> bool {
        self.temporary
    }
}

///
/// ForeignKeyValue
///
/// Tri-state view of a foreign key: a concrete reference, SQL null, or a
/// severed non-nullable key whose live value is stale but logically null.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ForeignKeyValue {
    Value(KeyValue),
    Null,
    Severed,
}

///
/// ValueSnapshot
///

#[derive(Clone, Debug, Default)]
pub(crate) struct ValueSnapshot {
    properties: Vec<PropertyEntry>,
}

impl ValueSnapshot {
    /// Capture live values as both original and current.
    pub(crate) fn capture(entity: &dyn EntityValue) -> Self {
        let model = entity.model();
        let properties = model
            .fields
            .iter()
            .map(|field| {
                let value = entity.get_value(field.name).unwrap_or(Value::Null);
                PropertyEntry {
                    name: field.name,
                    current: value.clone(),
                    original: value,
                    modified: false,
                    temporary: false,
                    conceptual_null: false,
                }
            })
            .collect();

        Self { properties }
    }

    pub(crate) fn properties(&self) -> &[PropertyEntry] {
        &self.properties
    }

    pub(crate) fn get(&self, index: usize) -> Option<&PropertyEntry> {
        self.properties.get(index)
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut PropertyEntry> {
        self.properties.get_mut(index)
    }

    pub(crate) fn by_name(&self, name: &str) -> Option<&PropertyEntry> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub(crate) fn by_name_mut(&mut self, name: &str) -> Option<&mut PropertyEntry> {
        self.properties.iter_mut().find(|p| p.name == name)
    }

    /// Current values of `fields`, in order.
    pub(crate) fn current_of(&self, fields: &[&str]) -> KeyValue {
        KeyValue::new(
            fields
                .iter()
                .map(|name| self.by_name(name).map_or(Value::Null, |p| p.current.clone()))
                .collect(),
        )
    }

    /// Original values of `fields`, in order.
    pub(crate) fn original_of(&self, fields: &[&str]) -> KeyValue {
        KeyValue::new(
            fields
                .iter()
                .map(|name| self.by_name(name).map_or(Value::Null, |p| p.original.clone()))
                .collect(),
        )
    }

    pub(crate) fn key(&self, model: &EntityModel) -> KeyValue {
        self.current_of(model.primary_key)
    }

    /// Tri-state value of a foreign key made of `fields`.
    pub(crate) fn foreign_key(&self, fields: &[&str]) -> ForeignKeyValue {
        let severed = fields
            .iter()
            .any(|name| self.by_name(name).is_some_and(|p| p.conceptual_null));
        if severed {
            return ForeignKeyValue::Severed;
        }

        let value = self.current_of(fields);
        if value.has_null() {
            ForeignKeyValue::Null
        } else {
            ForeignKeyValue::Value(value)
        }
    }

    pub(crate) fn any_modified(&self) -> bool {
        self.properties.iter().any(|p| p.modified)
    }

    pub(crate) fn any_temporary(&self) -> bool {
        self.properties.iter().any(|p| p.temporary)
    }

    /// Flag every non-key property modified.
    pub(crate) fn mark_all_modified(&mut self, model: &EntityModel) {
        for property in &mut self.properties {
            property.modified = !model.is_key(property.name);
        }
    }

    /// Derive every non-key flag from the values it guards.
    pub(crate) fn recompute_modified(&mut self, model: &EntityModel) {
        for property in &mut self.properties {
            property.modified = !model.is_key(property.name)
                && (property.current != property.original || property.conceptual_null);
        }
    }

    pub(crate) fn clear_modified(&mut self) {
        for property in &mut self.properties {
            property.modified = false;
        }
    }

    /// Accept current values as the new originals.
    pub(crate) fn accept(&mut self) {
        for property in &mut self.properties {
            property.original = property.current.clone();
            property.modified = false;
            property.temporary = false;
            property.conceptual_null = false;
        }
    }
}

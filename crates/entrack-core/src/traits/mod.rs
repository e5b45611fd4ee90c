//! Entity capability contracts.
//!
//! Entities are plain application structs. The tracker never reflects over
//! them: each type exposes its scalar properties and navigations through
//! [`EntityValue`], a string-keyed accessor surface, and its static shape
//! through [`EntityKind::MODEL`]. Navigations hold [`Handle`]s into the
//! session arena rather than owning pointers, so cyclic graphs
//! (Blog ↔ Post ↔ Tag) need no shared ownership.

use crate::{
    error::InternalError,
    model::EntityModel,
    value::{KeyValue, Value},
};
use std::{
    any::Any,
    fmt::{self, Debug},
    hash::{Hash, Hasher},
    marker::PhantomData,
};

///
/// EntityId
/// Arena slot of one entity instance inside a session.
///

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct EntityId(pub(crate) u32);

impl EntityId {
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

///
/// Handle
/// Typed reference to an entity instance held by a session.
///

pub struct Handle<E> {
    id: EntityId,
    _marker: PhantomData<fn() -> E>,
}

impl<E> Handle<E> {
    #[must_use]
    pub const fn from_id(id: EntityId) -> Self {
        Self {
            id,
            _marker: PhantomData,
        }
    }

    #[must_use]
    pub const fn id(self) -> EntityId {
        self.id
    }
}

impl<E> Clone for Handle<E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for Handle<E> {}

impl<E> PartialEq for Handle<E> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<E> Eq for Handle<E> {}

impl<E> Hash for Handle<E> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<E> Debug for Handle<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({})", self.id)
    }
}

///
/// Navigation
///
/// Live value of one navigation property, by arena id.
/// Collections are compared as sets; order is irrelevant.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Navigation {
    Reference(Option<EntityId>),
    Collection(Vec<EntityId>),
}

impl Navigation {
    #[must_use]
    pub fn reference<E>(handle: Option<Handle<E>>) -> Self {
        Self::Reference(handle.map(Handle::id))
    }

    #[must_use]
    pub fn collection<E>(handles: &[Handle<E>]) -> Self {
        Self::Collection(handles.iter().map(|h| h.id()).collect())
    }

    /// Every entity this navigation currently points at.
    #[must_use]
    pub fn targets(&self) -> Vec<EntityId> {
        match self {
            Self::Reference(target) => target.iter().copied().collect(),
            Self::Collection(items) => items.clone(),
        }
    }

    /// Convert into a typed reference slot value.
    pub fn into_reference<E>(self) -> Result<Option<Handle<E>>, InternalError> {
        match self {
            Self::Reference(target) => Ok(target.map(Handle::from_id)),
            Self::Collection(_) => Err(InternalError::access(
                "collection value assigned to a reference navigation",
            )),
        }
    }

    /// Convert into a typed collection slot value.
    pub fn into_collection<E>(self) -> Result<Vec<Handle<E>>, InternalError> {
        match self {
            Self::Collection(items) => Ok(items.into_iter().map(Handle::from_id).collect()),
            Self::Reference(_) => Err(InternalError::access(
                "reference value assigned to a collection navigation",
            )),
        }
    }
}

///
/// EntityValue
///
/// Object-safe accessor surface of one entity instance.
/// Unknown field or navigation names return `None` / an access error.
///

pub trait EntityValue: Any + Debug {
    fn model(&self) -> &'static EntityModel;

    fn get_value(&self, field: &str) -> Option<Value>;

    fn set_value(&mut self, field: &str, value: Value) -> Result<(), InternalError>;

    fn get_navigation(&self, _name: &str) -> Option<Navigation> {
        None
    }

    fn set_navigation(&mut self, name: &str, _value: Navigation) -> Result<(), InternalError> {
        Err(InternalError::access(format!(
            "'{}' has no navigation '{name}'",
            self.model().name
        )))
    }
}

impl dyn EntityValue {
    /// Current primary key, read from the live instance.
    #[must_use]
    pub fn key(&self) -> KeyValue {
        let model = self.model();
        KeyValue::new(
            model
                .primary_key
                .iter()
                .map(|field| self.get_value(field).unwrap_or(Value::Null))
                .collect(),
        )
    }

    /// Read a composite value for an arbitrary field list (e.g. a foreign key).
    #[must_use]
    pub fn values_of(&self, fields: &[&str]) -> KeyValue {
        KeyValue::new(
            fields
                .iter()
                .map(|field| self.get_value(field).unwrap_or(Value::Null))
                .collect(),
        )
    }

    pub fn downcast_ref<E: EntityKind>(&self) -> Option<&E> {
        (self as &dyn Any).downcast_ref::<E>()
    }

    pub fn downcast_mut<E: EntityKind>(&mut self) -> Option<&mut E> {
        (self as &mut dyn Any).downcast_mut::<E>()
    }
}

///
/// EntityKind
/// Statically-known entity type.
///

pub trait EntityKind: EntityValue + Sized {
    const MODEL: &'static EntityModel;
}

//! Runtime data model definitions.
//!
//! Types in `model` describe *what exists*: entity shapes, the relationships
//! between them, and the validated [`Schema`] a session tracks against.
//! Entity and relationship descriptors are `'static` so entity types can
//! expose them as associated constants.

pub mod relation;
pub mod schema;

pub use relation::{
    Cardinality, DeleteBehavior, JoinEntity, PrincipalNavigation, RelationModel,
    SkipNavigationModel,
};
pub use schema::{
    EntityDescriptor, JoinSide, NavigationBinding, RelationId, Schema, SchemaBuilder, SchemaError,
    SchemaErrors, SkipId,
};

///
/// FieldKind
///
/// Scalar storage shape of one property; aligned with `Value` variants.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FieldKind {
    Blob,
    Bool,
    Int,
    Text,
    Timestamp,
    Uint,
    Ulid,
}

///
/// FieldModel
/// Runtime metadata for one scalar property.
///

#[derive(Debug)]
pub struct FieldModel {
    /// Property name as used by snapshots, commands, and the debug view.
    pub name: &'static str,
    pub kind: FieldKind,
    pub nullable: bool,
    /// Original value is sent with updates/deletes for conflict detection.
    pub concurrency_token: bool,
}

impl FieldModel {
    #[must_use]
    pub const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            nullable: false,
            concurrency_token: false,
        }
    }

    #[must_use]
    pub const fn nullable(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            nullable: true,
            concurrency_token: false,
        }
    }

    #[must_use]
    pub const fn token(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            nullable: false,
            concurrency_token: true,
        }
    }
}

///
/// KeyGeneration
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum KeyGeneration {
    /// The application always supplies key values.
    None,
    /// The store generates an `Int` key on insert; a temporary value is used until then.
    Store,
    /// A `Ulid` key is generated when the entity starts being tracked as Added.
    Client,
}

///
/// EntityModel
/// Minimal runtime model for one entity type.
///

#[derive(Debug)]
pub struct EntityModel {
    /// Stable entity name used for identity, commands, and diagnostics.
    pub name: &'static str,
    /// Primary key field names (points at entries in `fields`).
    pub primary_key: &'static [&'static str],
    /// Ordered field list; snapshots are indexed by this order.
    pub fields: &'static [FieldModel],
    pub key_generation: KeyGeneration,
}

impl EntityModel {
    #[must_use]
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|field| field.name == name)
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&'static FieldModel> {
        self.fields.iter().find(|field| field.name == name)
    }

    #[must_use]
    pub fn is_key(&self, name: &str) -> bool {
        self.primary_key.contains(&name)
    }
}

// Models are `'static` singletons; equality is identity.
impl PartialEq for EntityModel {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
    }
}

impl Eq for EntityModel {}

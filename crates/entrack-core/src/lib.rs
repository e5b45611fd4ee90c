//! Core runtime for entrack: entity models, change tracking, relationship
//! fixup, and unit-of-work persistence.
//!
//! ## Layout
//! - `model`: static entity/relationship shapes and the validated `Schema`.
//! - `traits` / `value`: the accessor surface entity types implement.
//! - `tracker`: entries, snapshots, identity, fixup, orphan/cascade state.
//! - `persist`: command ordering, the `Store` boundary, and `MemoryStore`.
//! - `session`: the public unit-of-work surface.
//! - `obs`: metrics events and sinks.

// public exports are one module level down
pub mod config;
pub mod error;
pub mod model;
pub mod obs;
pub mod persist;
pub mod session;
pub mod tracker;
pub mod traits;
pub mod value;

// test
#[cfg(test)]
pub(crate) mod test_support;

///
/// Prelude
///
/// Prelude contains only domain vocabulary.
/// No errors, stores, or metrics helpers are re-exported here.
///

pub mod prelude {
    pub use crate::{
        config::{IdentityResolution, Timing, TrackingOptions},
        model::{
            DeleteBehavior, EntityModel, FieldKind, FieldModel, KeyGeneration,
            PrincipalNavigation, RelationModel, Schema, SkipNavigationModel,
        },
        session::Session,
        tracker::EntityState,
        traits::{EntityKind, EntityValue, Handle, Navigation},
        value::{FieldValue, KeyValue, Value, assign},
    };
}

//! ## Crate layout
//! - `core`: runtime models, tracker, fixup, persistence planning, and observability.
//! - `error`: the public error taxonomy every session operation returns.
//!
//! [`Session`] is the unit of work: create or load entity instances, mutate
//! them as plain structs, and `submit` the accumulated changes through a
//! [`Store`] in one transaction.

pub use entrack_core as core;

pub mod error;
mod session;

pub use error::Error;
pub use session::Session;

pub use core::{
    obs::{MetricsEvent, MetricsSink, metrics_report, metrics_reset_all},
    persist::{Command, CommandKind, CommandOutcome, MemoryStore, Row, Store, SubmitSummary},
    session::DebugViewMode,
    tracker::{EntityEntry, EntityState, EntryRef, ForeignKeyValue, PropertyEntry},
};

//
// Consts
//

/// Workspace version re-export for downstream tooling/tests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

///
/// Prelude
/// Everything needed to declare entities and run a session.
///

pub mod prelude {
    pub use crate::{
        Error, MemoryStore, Row, Session, Store as _,
        core::{
            config::{IdentityResolution, Timing, TrackingOptions},
            model::{
                DeleteBehavior, EntityModel, FieldKind, FieldModel, JoinEntity, KeyGeneration,
                PrincipalNavigation, RelationModel, Schema, SkipNavigationModel,
            },
            traits::{EntityKind, EntityValue, Handle, Navigation},
            value::{FieldValue, KeyValue, Value, assign},
        },
    };
}

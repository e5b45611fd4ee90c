//! Module: persist
//! Responsibility: the store boundary (rows, commands, the `Store` trait) and
//! the unit of work that turns tracked changes into one ordered transaction.
//! Does not own: change detection or fixup (see `tracker`).
//!
//! Invariants:
//! - A submission either commits every command or leaves all entries untouched.
//! - Principals are inserted before their dependents; dependents are deleted
//!   before their principals.

mod guard;
mod memory;
mod plan;
mod submit;


pub use memory::MemoryStore;
pub use submit::SubmitSummary;

use crate::{
    error::StoreError,
    model::EntityModel,
    value::{KeyValue, Value},
};
use derive_more::{Deref, DerefMut};
use std::{collections::BTreeMap, fmt};

///
/// Row
///
/// Field-name → value map exchanged with a store.
///

#[derive(Clone, Debug, Default, Deref, DerefMut, Eq, PartialEq)]
pub struct Row(BTreeMap<String, Value>);

impl Row {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    /// Primary key of the row under `model`.
    pub fn key(&self, model: &EntityModel) -> Result<KeyValue, StoreError> {
        model
            .primary_key
            .iter()
            .map(|field| {
                self.0.get(*field).cloned().ok_or_else(|| StoreError::MissingKey {
                    entity: model.name.to_string(),
                    field: (*field).to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(KeyValue::new)
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

///
/// Command
///
/// One persistence operation, ordered by the submission planner.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Command {
    /// Store-generated key fields are omitted from `values`.
    Insert {
        model: &'static EntityModel,
        values: Row,
    },
    /// `values` holds only modified properties; `tokens` the original
    /// concurrency-token values to match.
    Update {
        model: &'static EntityModel,
        key: KeyValue,
        values: Row,
        tokens: Row,
    },
    Delete {
        model: &'static EntityModel,
        key: KeyValue,
        tokens: Row,
    },
}

impl Command {
    #[must_use]
    pub const fn model(&self) -> &'static EntityModel {
        match self {
            Self::Insert { model, .. } | Self::Update { model, .. } | Self::Delete { model, .. } => {
                model
            }
        }
    }

    #[must_use]
    pub const fn kind(&self) -> CommandKind {
        match self {
            Self::Insert { .. } => CommandKind::Insert,
            Self::Update { .. } => CommandKind::Update,
            Self::Delete { .. } => CommandKind::Delete,
        }
    }
}

///
/// CommandKind
///

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum CommandKind {
    Insert,
    Update,
    Delete,
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        };
        f.write_str(label)
    }
}

///
/// CommandOutcome
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CommandOutcome {
    /// The row was inserted; `generated` holds a store-generated key value.
    Inserted { generated: Option<Value> },
    /// Rows matched by an update or delete; zero signals a concurrency conflict.
    Affected(u64),
}

///
/// Store
///
/// Minimal transactional persistence boundary.
/// `execute` is only valid between `begin` and `commit`/`rollback`.
///

pub trait Store {
    /// Every row currently stored for `model`.
    fn scan(&self, model: &EntityModel) -> Result<Vec<Row>, StoreError>;

    fn begin(&mut self) -> Result<(), StoreError>;

    fn execute(&mut self, command: &Command) -> Result<CommandOutcome, StoreError>;

    fn commit(&mut self) -> Result<(), StoreError>;

    fn rollback(&mut self) -> Result<(), StoreError>;
}

//! Module: memory
//! Responsibility: transactional in-memory `Store` for tests and embedding.
//! Does not own: foreign-key enforcement; ordering is the planner's job.

use crate::{
    error::StoreError,
    model::{EntityModel, FieldKind, KeyGeneration},
    persist::{Command, CommandKind, CommandOutcome, Row, Store},
    value::{KeyValue, Value},
};
use std::collections::BTreeMap;

type Table = BTreeMap<KeyValue, Row>;

#[derive(Clone, Debug, Default)]
struct Tables {
    rows: BTreeMap<&'static str, Table>,
    sequences: BTreeMap<&'static str, i64>,
}

///
/// MemoryStore
///
/// Tables keyed by entity name then primary key. `begin` snapshots the
/// committed state; `rollback` restores it. Store-generated keys come from a
/// per-entity sequence starting at 1.
///

#[derive(Debug, Default)]
pub struct MemoryStore {
    committed: Tables,
    pending: Option<Tables>,
    fail_on: Option<(CommandKind, &'static str)>,
    log: Vec<Command>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a committed row outside any transaction.
    pub fn seed(&mut self, model: &'static EntityModel, row: Row) -> Result<(), StoreError> {
        let key = row.key(model)?;
        if let Some(value) = key.parts().first().and_then(Value::as_int)
            && model.key_generation == KeyGeneration::Store
        {
            let sequence = self.committed.sequences.entry(model.name).or_default();
            *sequence = (*sequence).max(value);
        }
        self.committed.rows.entry(model.name).or_default().insert(key, row);

        Ok(())
    }

    /// Fail the next command of `kind` against `entity` with a backend error.
    pub fn fail_on(&mut self, kind: CommandKind, entity: &'static str) {
        self.fail_on = Some((kind, entity));
    }

    /// Committed row, if present.
    #[must_use]
    pub fn row(&self, entity: &str, key: &KeyValue) -> Option<&Row> {
        self.committed.rows.get(entity)?.get(key)
    }

    /// Number of committed rows for `entity`.
    #[must_use]
    pub fn len(&self, entity: &str) -> usize {
        self.committed.rows.get(entity).map_or(0, BTreeMap::len)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.committed.rows.values().all(BTreeMap::is_empty)
    }

    /// Every command executed so far, committed or not, in order.
    #[must_use]
    pub fn log(&self) -> &[Command] {
        &self.log
    }

    pub fn clear_log(&mut self) {
        self.log.clear();
    }

    /// Overwrite one committed value, as a concurrent writer would.
    pub fn touch(
        &mut self,
        entity: &'static str,
        key: &KeyValue,
        field: &str,
        value: Value,
    ) -> Result<(), StoreError> {
        let row = self
            .committed
            .rows
            .get_mut(entity)
            .and_then(|table| table.get_mut(key))
            .ok_or_else(|| StoreError::UnknownEntity {
                entity: entity.to_string(),
            })?;
        row.insert(field.to_string(), value);

        Ok(())
    }

    fn tables(&mut self) -> Result<&mut Tables, StoreError> {
        self.pending.as_mut().ok_or(StoreError::NoTransaction)
    }
}

// Every token must match its stored value.
fn tokens_match(row: &Row, tokens: &Row) -> bool {
    tokens.iter().all(|(field, value)| row.get(field) == Some(value))
}

impl Store for MemoryStore {
    fn scan(&self, model: &EntityModel) -> Result<Vec<Row>, StoreError> {
        Ok(self
            .committed
            .rows
            .get(model.name)
            .map(|table| table.values().cloned().collect())
            .unwrap_or_default())
    }

    fn begin(&mut self) -> Result<(), StoreError> {
        if self.pending.is_some() {
            return Err(StoreError::TransactionActive);
        }
        self.pending = Some(self.committed.clone());

        Ok(())
    }

    fn execute(&mut self, command: &Command) -> Result<CommandOutcome, StoreError> {
        self.log.push(command.clone());
        let model = command.model();
        if self.fail_on == Some((command.kind(), model.name)) {
            self.fail_on = None;
            return Err(StoreError::Backend {
                message: format!("injected {} failure on '{}'", command.kind(), model.name),
            });
        }

        let tables = self.tables()?;
        match command {
            Command::Insert { values, .. } => {
                let mut row = values.clone();
                let mut generated = None;
                if model.key_generation == KeyGeneration::Store
                    && let [field] = model.primary_key
                    && !row.contains_key(*field)
                    && model.field(field).is_some_and(|f| f.kind == FieldKind::Int)
                {
                    let sequence = tables.sequences.entry(model.name).or_default();
                    *sequence += 1;
                    let value = Value::Int(*sequence);
                    row.insert((*field).to_string(), value.clone());
                    generated = Some(value);
                }

                let key = row.key(model)?;
                let table = tables.rows.entry(model.name).or_default();
                if table.contains_key(&key) {
                    return Err(StoreError::DuplicateKey {
                        entity: model.name.to_string(),
                        key,
                    });
                }
                table.insert(key, row);

                Ok(CommandOutcome::Inserted { generated })
            }

            Command::Update {
                key, values, tokens, ..
            } => {
                let Some(row) = tables
                    .rows
                    .get_mut(model.name)
                    .and_then(|table| table.get_mut(key))
                    .filter(|row| tokens_match(row, tokens))
                else {
                    return Ok(CommandOutcome::Affected(0));
                };
                for (field, value) in values.iter() {
                    row.insert(field.clone(), value.clone());
                }

                Ok(CommandOutcome::Affected(1))
            }

            Command::Delete { key, tokens, .. } => {
                let Some(table) = tables.rows.get_mut(model.name) else {
                    return Ok(CommandOutcome::Affected(0));
                };
                if !table.get(key).is_some_and(|row| tokens_match(row, tokens)) {
                    return Ok(CommandOutcome::Affected(0));
                }
                table.remove(key);

                Ok(CommandOutcome::Affected(1))
            }
        }
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        let pending = self.pending.take().ok_or(StoreError::NoTransaction)?;
        self.committed = pending;

        Ok(())
    }

    fn rollback(&mut self) -> Result<(), StoreError> {
        self.pending.take().ok_or(StoreError::NoTransaction)?;

        Ok(())
    }
}

//! Module: submit
//! Responsibility: validate, execute, and accept one unit of work.
//! Does not own: command ordering (see `plan`) or store semantics.
//!
//! Invariants:
//! - Nothing reaches the store while the change set has integrity violations.
//! - Entries are only accepted after the store commits.
//! - Temporary values are substituted as generated keys come back, never guessed.

use crate::{
    error::{IntegrityReport, IntegrityViolation, InternalError},
    obs::sink::{MetricsEvent, record},
    persist::{
        Command, CommandKind, CommandOutcome, Row, Store,
        guard::TransactionGuard,
        plan::{Step, plan},
    },
    traits::EntityId,
    tracker::{EntityState, ForeignKeyValue, PropertyEntry, Tracker},
    value::{KeyValue, Value},
};
use std::collections::BTreeMap;
use tracing::{debug, trace};

///
/// SubmitSummary
///
/// Commands applied by one successful submission.
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SubmitSummary {
    pub inserts: u64,
    pub updates: u64,
    pub deletes: u64,
}

impl SubmitSummary {
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.inserts + self.updates + self.deletes
    }

    const fn count(&mut self, kind: CommandKind) {
        match kind {
            CommandKind::Insert => self.inserts += 1,
            CommandKind::Update => self.updates += 1,
            CommandKind::Delete => self.deletes += 1,
        }
    }
}

// Store value for one snapshot property, resolving placeholders.
fn resolve(
    entity: &str,
    property: &PropertyEntry,
    generated: &BTreeMap<Value, Value>,
) -> Result<Value, InternalError> {
    if !property.temporary {
        return Ok(property.current.clone());
    }

    generated.get(&property.current).cloned().ok_or_else(|| {
        InternalError::fixup_invariant(format!(
            "temporary value {} of '{entity}.{}' was not generated before use",
            property.current, property.name
        ))
    })
}

impl Tracker {
    /// Referential problems that would make the pending change set invalid.
    pub(crate) fn validate(&self) -> Result<IntegrityReport, InternalError> {
        let schema = self.schema();
        let mut report = IntegrityReport::default();

        for id in self.tracked_ids() {
            let slot = self.slot(id)?;
            let model = slot.entity.model();
            let key = self.key(id)?;

            if slot.entry.state == EntityState::Deleted {
                for (relation, relation_model) in schema.relations_as_principal(model.name) {
                    for dependent in self.dependents_of(relation, id)? {
                        if self.state(dependent) == EntityState::Deleted {
                            continue;
                        }
                        report.push(IntegrityViolation::DependentsRemain {
                            relation: relation_model.name,
                            principal: model.name,
                            principal_key: key.clone(),
                            dependent: relation_model.dependent,
                            dependent_key: self.key(dependent)?,
                        });
                    }
                }
                continue;
            }

            for (_, relation_model) in schema.relations_as_dependent(model.name) {
                if relation_model.required
                    && slot.entry.snapshot.foreign_key(relation_model.foreign_key)
                        == ForeignKeyValue::Severed
                {
                    report.push(IntegrityViolation::SeveredRequired {
                        relation: relation_model.name,
                        dependent: model.name,
                        key: key.clone(),
                    });
                }
            }
        }

        Ok(report)
    }

    /// Persist every pending change as one store transaction.
    pub(crate) fn submit(&mut self, store: &mut dyn Store) -> Result<SubmitSummary, InternalError> {
        // Phase 1: bring the change set up to date.
        if self.options.auto_detect_changes {
            self.detect_all()?;
        }
        self.settle(true)?;

        // Phase 2: reject before touching the store.
        let report = self.validate()?;
        if !report.is_empty() {
            record(MetricsEvent::SubmitFinish {
                inserts: 0,
                updates: 0,
                deletes: 0,
                succeeded: false,
            });
            return Err(InternalError::integrity(report));
        }

        let steps = plan(self)?;
        if steps.is_empty() {
            debug!("submit: nothing to save");
            return Ok(SubmitSummary::default());
        }

        // Phase 3: execute; the guard rolls back on any early return.
        let result = self.execute(store, &steps);
        record(MetricsEvent::SubmitFinish {
            inserts: result.as_ref().map_or(0, |(summary, _)| summary.inserts),
            updates: result.as_ref().map_or(0, |(summary, _)| summary.updates),
            deletes: result.as_ref().map_or(0, |(summary, _)| summary.deletes),
            succeeded: result.is_ok(),
        });
        let (summary, assigned) = result?;

        // Phase 4: the store committed; accept everything.
        self.accept_submitted(&steps, assigned)?;

        debug!(
            inserts = summary.inserts,
            updates = summary.updates,
            deletes = summary.deletes,
            "submit committed"
        );

        Ok(summary)
    }

    fn execute(
        &self,
        store: &mut dyn Store,
        steps: &[Step],
    ) -> Result<(SubmitSummary, Vec<(EntityId, Value)>), InternalError> {
        let mut guard = TransactionGuard::begin(store)?;
        let mut generated = BTreeMap::new();
        let mut assigned = Vec::new();
        let mut summary = SubmitSummary::default();

        for step in steps {
            let command = self.command_for(*step, &generated)?;
            trace!(kind = %step.kind, entity = command.model().name, id = %step.id, "execute");

            match guard.execute(&command)? {
                CommandOutcome::Inserted { generated: value } => {
                    if let Some(placeholder) = self.temporary_key_value(step.id)? {
                        let value = value.ok_or_else(|| {
                            InternalError::persist_unsupported(format!(
                                "store generated no key for '{}'",
                                command.model().name
                            ))
                        })?;
                        generated.insert(placeholder, value.clone());
                        assigned.push((step.id, value));
                    }
                }
                CommandOutcome::Affected(0) => {
                    let model = command.model();
                    return Err(InternalError::concurrency_conflict(model.name, self.key(step.id)?));
                }
                CommandOutcome::Affected(_) => {}
            }

            summary.count(step.kind);
        }
        guard.commit()?;

        Ok((summary, assigned))
    }

    // Placeholder value of a store-generated key, if the entry still has one.
    fn temporary_key_value(&self, id: EntityId) -> Result<Option<Value>, InternalError> {
        let slot = self.slot(id)?;
        let model = slot.entity.model();

        Ok(model
            .primary_key
            .first()
            .and_then(|name| slot.entry.snapshot.by_name(name))
            .filter(|property| property.temporary)
            .map(|property| property.current.clone()))
    }

    fn command_for(&self, step: Step, generated: &BTreeMap<Value, Value>) -> Result<Command, InternalError> {
        let slot = self.slot(step.id)?;
        let model = slot.entity.model();
        let snapshot = &slot.entry.snapshot;
        let key = snapshot.key(model);
        let tokens = || -> Row {
            model
                .fields
                .iter()
                .filter(|field| field.concurrency_token)
                .filter_map(|field| {
                    snapshot
                        .by_name(field.name)
                        .map(|p| (field.name.to_string(), p.original.clone()))
                })
                .collect()
        };

        let command = match step.kind {
            CommandKind::Insert => Command::Insert {
                model,
                values: snapshot
                    .properties()
                    .iter()
                    .filter(|p| !(p.temporary && model.is_key(p.name)))
                    .map(|p| Ok((p.name.to_string(), resolve(model.name, p, generated)?)))
                    .collect::<Result<Row, InternalError>>()?,
            },
            CommandKind::Update => Command::Update {
                model,
                key,
                values: snapshot
                    .properties()
                    .iter()
                    .filter(|p| p.modified)
                    .map(|p| Ok((p.name.to_string(), resolve(model.name, p, generated)?)))
                    .collect::<Result<Row, InternalError>>()?,
                tokens: tokens(),
            },
            CommandKind::Delete => Command::Delete {
                model,
                key,
                tokens: tokens(),
            },
        };

        Ok(command)
    }

    // Generated keys replace placeholders, then every saved entry is accepted.
    fn accept_submitted(
        &mut self,
        steps: &[Step],
        assigned: Vec<(EntityId, Value)>,
    ) -> Result<(), InternalError> {
        for (id, value) in assigned {
            let old = self.key(id)?;
            self.rekey(id, &old, KeyValue::single(value))?;
        }

        for step in steps {
            match step.kind {
                CommandKind::Delete => self.untrack(step.id)?,
                CommandKind::Insert | CommandKind::Update => {
                    let entry = &mut self.slot_mut(step.id)?.entry;
                    entry.snapshot.accept();
                    entry.state = EntityState::Unchanged;
                }
            }
        }

        Ok(())
    }
}

//! Module: plan
//! Responsibility: order pending changes so every command can be applied
//! against a store that enforces foreign keys.
//! Does not own: command construction or execution.
//!
//! Invariants:
//! - All inserts/updates precede all deletes.
//! - An Added principal is written before any dependent referencing it.
//! - A deleted dependent is removed before the deleted principal it
//!   originally referenced.
//! - Ties are broken by arena order, so plans are deterministic.

use crate::{
    error::InternalError,
    persist::CommandKind,
    traits::EntityId,
    tracker::{EntityState, Tracker},
};
use std::collections::{BTreeMap, BTreeSet};

///
/// Step
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct Step {
    pub(crate) id: EntityId,
    pub(crate) kind: CommandKind,
}

type Edges = BTreeMap<EntityId, BTreeSet<EntityId>>;

/// Build the ordered command plan for every pending change.
pub(crate) fn plan(tracker: &Tracker) -> Result<Vec<Step>, InternalError> {
    let schema = tracker.schema();

    let mut writes = Vec::new();
    let mut deletes = Vec::new();
    for id in tracker.tracked_ids() {
        match tracker.state(id) {
            EntityState::Added | EntityState::Modified => writes.push(id),
            EntityState::Deleted => deletes.push(id),
            EntityState::Unchanged | EntityState::Detached => {}
        }
    }

    // Phase 1: writes, principal before dependent.
    let mut write_edges = Edges::new();
    for &id in &writes {
        let name = tracker.model(id)?.name;
        for (relation, _) in schema.relations_as_dependent(name) {
            if let Some(principal) = tracker.principal_of(relation, id)
                && principal != id
                && tracker.state(principal) == EntityState::Added
            {
                write_edges.entry(principal).or_default().insert(id);
            }
        }
    }

    // Phase 2: deletes, dependent before principal, by original foreign keys.
    let mut delete_edges = Edges::new();
    for &id in &deletes {
        let slot = tracker.slot(id)?;
        let name = slot.entity.model().name;
        for (_, relation) in schema.relations_as_dependent(name) {
            let original = slot.entry.snapshot.original_of(relation.foreign_key);
            if original.has_null() {
                continue;
            }
            if let Some(principal) = tracker.find(relation.principal, &original)
                && principal != id
                && tracker.state(principal) == EntityState::Deleted
            {
                delete_edges.entry(id).or_default().insert(principal);
            }
        }
    }

    let mut steps = Vec::with_capacity(writes.len() + deletes.len());
    for id in order(&writes, &write_edges).map_err(|cycle| cycle_error(tracker, &cycle))? {
        let kind = if tracker.state(id) == EntityState::Added {
            CommandKind::Insert
        } else {
            CommandKind::Update
        };
        steps.push(Step { id, kind });
    }
    for id in order(&deletes, &delete_edges).map_err(|cycle| cycle_error(tracker, &cycle))? {
        steps.push(Step {
            id,
            kind: CommandKind::Delete,
        });
    }

    Ok(steps)
}

/// Kahn's algorithm over `nodes`; on a cycle, returns the nodes left unordered.
pub(crate) fn order(nodes: &[EntityId], edges: &Edges) -> Result<Vec<EntityId>, Vec<EntityId>> {
    let mut indegree: BTreeMap<EntityId, usize> = nodes.iter().map(|&id| (id, 0)).collect();
    for targets in edges.values() {
        for target in targets {
            if let Some(count) = indegree.get_mut(target) {
                *count += 1;
            }
        }
    }

    let mut ready: BTreeSet<EntityId> = indegree
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(id, _)| *id)
        .collect();
    let mut ordered = Vec::with_capacity(nodes.len());
    while let Some(id) = ready.pop_first() {
        ordered.push(id);
        for next in edges.get(&id).into_iter().flatten() {
            if let Some(count) = indegree.get_mut(next) {
                *count -= 1;
                if *count == 0 {
                    ready.insert(*next);
                }
            }
        }
    }

    if ordered.len() == indegree.len() {
        Ok(ordered)
    } else {
        Err(indegree
            .into_iter()
            .filter(|(_, count)| *count > 0)
            .map(|(id, _)| id)
            .collect())
    }
}

fn cycle_error(tracker: &Tracker, cycle: &[EntityId]) -> InternalError {
    let members = cycle
        .iter()
        .map(|&id| match (tracker.model(id), tracker.key(id)) {
            (Ok(model), Ok(key)) => format!("'{}' {key}", model.name),
            _ => id.to_string(),
        })
        .collect::<Vec<_>>()
        .join(", ");

    InternalError::persist_unsupported(format!(
        "changes cannot be ordered: dependency cycle among {members}"
    ))
}

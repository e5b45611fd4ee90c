//! Module: detect
//! Responsibility: reconcile live instances against their snapshots and hand
//! every divergence to fixup.
//! Does not own: fixup policy or state-transition rules.
//!
//! Invariants:
//! - Scalars compare against the current snapshot, never the original.
//! - A second pass with no intervening mutation observes nothing.
//! - Single-entity detection never resolves orphans or cascades.

use crate::{
    error::InternalError,
    model::NavigationBinding,
    obs::sink::{MetricsEvent, record},
    traits::{EntityId, Navigation},
    tracker::{EntityState, Tracker, empty_navigation, same_navigation},
    value::Value,
};
use std::collections::BTreeSet;
use tracing::{debug, trace};

///
/// DetectStats
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub(crate) struct DetectStats {
    pub(crate) entities_scanned: u64,
    pub(crate) properties_changed: u64,
    pub(crate) navigations_changed: u64,
}

impl DetectStats {
    pub(crate) const fn changed(&self) -> bool {
        self.properties_changed > 0 || self.navigations_changed > 0
    }
}

// Members present in `to` but not `from`, and the reverse.
fn diff(from: &Navigation, to: &Navigation) -> (Vec<EntityId>, Vec<EntityId>) {
    let before: BTreeSet<EntityId> = from.targets().into_iter().collect();
    let after: BTreeSet<EntityId> = to.targets().into_iter().collect();

    (
        after.difference(&before).copied().collect(),
        before.difference(&after).copied().collect(),
    )
}

impl Tracker {
    /// Full pass over every tracked entry, then resolve immediate orphans/cascades.
    pub(crate) fn detect_all(&mut self) -> Result<DetectStats, InternalError> {
        let mut stats = DetectStats::default();

        // Instances discovered mid-pass are fixed up as they are tracked.
        for id in self.tracked_ids() {
            if matches!(self.state(id), EntityState::Unchanged | EntityState::Modified | EntityState::Added) {
                self.detect_entity(id, &mut stats)?;
            }
        }
        self.settle(false)?;

        record(MetricsEvent::DetectFinish {
            entities_scanned: stats.entities_scanned,
            properties_changed: stats.properties_changed,
            navigations_changed: stats.navigations_changed,
        });
        debug!(
            scanned = stats.entities_scanned,
            properties = stats.properties_changed,
            navigations = stats.navigations_changed,
            "detect changes"
        );

        Ok(stats)
    }

    /// Detect one entry's changes; cross-entity orphan/cascade decisions wait
    /// for a full pass.
    pub(crate) fn detect_one(&mut self, id: EntityId) -> Result<DetectStats, InternalError> {
        let mut stats = DetectStats::default();
        if matches!(self.state(id), EntityState::Unchanged | EntityState::Modified | EntityState::Added) {
            self.detect_entity(id, &mut stats)?;
        }

        Ok(stats)
    }

    fn detect_entity(&mut self, id: EntityId, stats: &mut DetectStats) -> Result<(), InternalError> {
        let schema = self.schema();
        let model = self.model(id)?;
        let descriptor = schema.require_entity(model.name)?;
        stats.entities_scanned += 1;

        // Phase 1: scalars.
        let changes: Vec<(usize, Value)> = {
            let slot = self.slot(id)?;
            model
                .fields
                .iter()
                .enumerate()
                .filter_map(|(index, field)| {
                    let live = slot.entity.get_value(field.name).unwrap_or(Value::Null);
                    let recorded = slot.entry.snapshot.get(index)?;
                    (recorded.current != live).then_some((index, live))
                })
                .collect()
        };

        let key_changed = changes
            .iter()
            .any(|(index, _)| model.fields.get(*index).is_some_and(|f| model.is_key(f.name)));
        if key_changed {
            self.change_key(id)?;
        }

        let mut foreign_keys = BTreeSet::new();
        for (index, live) in changes {
            let Some(field) = model.fields.get(index) else {
                continue;
            };
            if model.is_key(field.name) {
                continue;
            }

            if let Some(property) = self.slot_mut(id)?.entry.snapshot.get_mut(index) {
                property.current = live;
                property.temporary = false;
                property.conceptual_null = false;
            }
            self.refresh_property(id, index)?;
            stats.properties_changed += 1;

            for (relation, relation_model) in schema.relations_as_dependent(model.name) {
                if relation_model.foreign_key.contains(&field.name) {
                    foreign_keys.insert(relation);
                }
            }
        }
        for relation in foreign_keys {
            self.foreign_key_changed(relation, id)?;
        }

        // Phase 2: navigations.
        for binding in &descriptor.navigations {
            if self.reconcile_navigation(id, binding, false)? {
                stats.navigations_changed += 1;
            }
        }

        Ok(())
    }

    // Keys are immutable once an entity exists in the store.
    fn change_key(&mut self, id: EntityId) -> Result<(), InternalError> {
        let model = self.model(id)?;
        let state = self.state(id);
        if state != EntityState::Added {
            return Err(InternalError::detect_unsupported(format!(
                "key of {state} '{}' {} was changed; only new entities may change their key",
                model.name,
                self.key(id)?
            )));
        }

        let old = self.key(id)?;
        let new = self.entity(id)?.key();
        self.rekey(id, &old, new)
    }

    /// Diff one navigation against its recorded value and fix up the difference.
    ///
    /// Returns whether the navigation had changed.
    pub(crate) fn reconcile_navigation(
        &mut self,
        id: EntityId,
        binding: &NavigationBinding,
        existing_graph: bool,
    ) -> Result<bool, InternalError> {
        let live = self.live_navigation(id, binding)?;
        let recorded = self
            .slot(id)?
            .entry
            .navigation(binding.name())
            .map_or_else(|| empty_navigation(binding), |nav| nav.current.clone());
        if same_navigation(&live, &recorded) {
            return Ok(false);
        }

        match *binding {
            NavigationBinding::Principal { name, relation } => match live {
                Navigation::Reference(Some(target)) => {
                    let target = self.resolve_target(id, name, target)?;
                    self.connect(relation, target, id)?;
                }
                _ => {
                    if let Some(principal) = self.principal_of(relation, id) {
                        self.sever(relation, id, Some(principal))?;
                    }
                }
            },

            NavigationBinding::Dependents { name, relation, .. } => {
                let (added, removed) = diff(&recorded, &live);
                for dependent in removed {
                    if self.principal_of(relation, dependent) == Some(id) {
                        self.sever(relation, dependent, Some(id))?;
                    } else {
                        trace!(%id, %dependent, navigation = name, "member already moved");
                    }
                }
                for dependent in added {
                    let dependent = self.resolve_target(id, name, dependent)?;
                    self.connect(relation, id, dependent)?;
                }
            }

            NavigationBinding::Skip { name, skip, side } => {
                let (added, removed) = diff(&recorded, &live);
                for target in removed {
                    self.skip_remove(skip, side, id, target)?;
                }
                for target in added {
                    let target = self.resolve_target(id, name, target)?;
                    self.skip_add(skip, side, id, target, existing_graph)?;
                }
            }
        }

        // Record what the navigation holds after fixup.
        let now = self.live_navigation(id, binding)?;
        if let Some(navigation) = self.slot_mut(id)?.entry.navigation_mut(binding.name()) {
            navigation.current = now;
        }

        Ok(true)
    }

    // Track a navigation target if needed; rewire the owner onto the tracked duplicate.
    fn resolve_target(&mut self, owner: EntityId, name: &str, target: EntityId) -> Result<EntityId, InternalError> {
        let resolved = self.discover(target)?;
        if resolved != target {
            self.replace_target(owner, name, target, resolved)?;
        }

        Ok(resolved)
    }
}

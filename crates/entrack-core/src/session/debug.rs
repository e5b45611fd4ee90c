//! Human-readable dump of tracked entries.
//!
//! ```text
//! Blog {id: 1} Modified
//!   id: 1 PK
//!   name: 'renamed' Modified Originally 'news'
//!   author_id: <null> FK
//!   posts: [{id: 10}]
//! ```

use crate::{
    traits::{EntityId, Navigation},
    tracker::{EntryRef, Tracker},
    value::{KeyValue, Value},
};
use std::{collections::BTreeSet, fmt::Write};

///
/// DebugViewMode
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum DebugViewMode {
    /// One line per entry: entity, key, state.
    #[default]
    Short,
    /// Adds property and navigation lines.
    Long,
}

const REDACTED: &str = "<redacted>";

fn named_key(fields: &[&str], key: &KeyValue) -> String {
    let parts = fields
        .iter()
        .zip(key.parts())
        .map(|(field, value)| format!("{field}: {value}"))
        .collect::<Vec<_>>()
        .join(", ");

    format!("{{{parts}}}")
}

fn target_key(tracker: &Tracker, target: EntityId) -> String {
    match (tracker.model(target), tracker.key(target)) {
        (Ok(model), Ok(key)) => named_key(model.primary_key, &key),
        _ => target.to_string(),
    }
}

// Entries ordered by entity name, then key.
pub(crate) fn render(tracker: &Tracker, mode: DebugViewMode) -> String {
    let schema = tracker.schema();
    let redact = !tracker.options.sensitive_debug_values;
    let mut out = String::new();

    for (_, _, id) in tracker.identities() {
        let Ok(entry) = EntryRef::new(tracker, id) else {
            continue;
        };
        let model = entry.entity().model();
        let _ = writeln!(
            out,
            "{} {} {}",
            model.name,
            named_key(model.primary_key, &entry.key()),
            entry.state()
        );
        if mode == DebugViewMode::Short {
            continue;
        }

        let foreign_keys: BTreeSet<&str> = schema
            .relations_as_dependent(model.name)
            .flat_map(|(_, relation)| relation.foreign_key.iter().copied())
            .collect();

        for property in entry.properties() {
            let is_key = model.is_key(property.name);
            let is_foreign_key = foreign_keys.contains(property.name);
            let shown = |value: &Value| {
                if redact && !is_key && !is_foreign_key {
                    REDACTED.to_string()
                } else {
                    value.to_string()
                }
            };

            let current = if property.conceptual_null {
                Value::Null.to_string()
            } else {
                shown(&property.current)
            };
            let mut line = format!("  {}: {current}", property.name);
            if is_key {
                line.push_str(" PK");
            }
            if is_foreign_key {
                line.push_str(" FK");
            }
            if property.modified {
                let _ = write!(line, " Modified Originally {}", shown(&property.original));
            }
            if property.temporary {
                line.push_str(" Temporary");
            }
            let _ = writeln!(out, "{line}");
        }

        for navigation in entry.navigations() {
            let rendered = match &navigation.current {
                Navigation::Reference(None) => Value::Null.to_string(),
                Navigation::Reference(Some(target)) => target_key(tracker, *target),
                Navigation::Collection(items) => format!(
                    "[{}]",
                    items
                        .iter()
                        .map(|target| target_key(tracker, *target))
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            };
            let _ = writeln!(out, "  {}: {rendered}", navigation.name);
        }
    }

    out
}

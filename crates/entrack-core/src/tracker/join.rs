//! Module: join
//! Responsibility: the key-only instance standing in for implicit
//! many-to-many join entities.
//! Does not own: join creation or removal (see `fixup`).
//!
//! Invariants:
//! - A record holds exactly one value per model field, in field order.
//! - Writes are checked against the declared field kind.

use crate::{
    error::InternalError,
    model::EntityModel,
    traits::EntityValue,
    value::Value,
};

///
/// JoinRecord
///
/// Key-only join record synthesized for many-to-many relationships that do
/// not declare their own join type. Values are stored in model field order.
///

#[derive(Clone, Debug)]
pub struct JoinRecord {
    model: &'static EntityModel,
    values: Vec<Value>,
}

impl JoinRecord {
    #[must_use]
    pub fn new(model: &'static EntityModel) -> Self {
        Self {
            model,
            values: model
                .fields
                .iter()
                .map(|field| {
                    if field.nullable {
                        Value::Null
                    } else {
                        Value::default_for(field.kind)
                    }
                })
                .collect(),
        }
    }
}

impl EntityValue for JoinRecord {
    fn model(&self) -> &'static EntityModel {
        self.model
    }

    fn get_value(&self, field: &str) -> Option<Value> {
        let index = self.model.field_index(field)?;
        self.values.get(index).cloned()
    }

    fn set_value(&mut self, field: &str, value: Value) -> Result<(), InternalError> {
        let name = self.model.name;
        let Some(index) = self.model.field_index(field) else {
            return Err(InternalError::access(format!("'{name}' has no field '{field}'")));
        };
        let declared = &self.model.fields[index];
        if !value.matches_kind(declared.kind, declared.nullable) {
            return Err(InternalError::access(format!(
                "value {value} does not fit field '{name}.{field}'"
            )));
        }

        self.values[index] = value;
        Ok(())
    }
}

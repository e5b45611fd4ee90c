//! Module: schema
//! Responsibility: registry of entity models, relationships, and
//! many-to-many skip navigations, validated once at build time.
//! Does not own: instance state, snapshots, or graph indexes.
//!
//! Invariants:
//! - Every relation endpoint and join entity is registered.
//! - Foreign keys align with the principal primary key (arity and kind).
//! - Optional relations use nullable foreign-key fields.
//! - Navigation names are unique per entity.


use crate::{
    error::{ErrorClass, ErrorOrigin, InternalError},
    model::{
        Cardinality, DeleteBehavior, EntityModel, FieldKind, JoinEntity, KeyGeneration,
        RelationModel, SkipNavigationModel,
    },
    traits::{EntityKind, EntityValue},
};
use std::{collections::BTreeMap, fmt};
use thiserror::Error as ThisError;

///
/// RelationId
///

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct RelationId(pub(crate) usize);

///
/// SkipId
///

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct SkipId(pub(crate) usize);

///
/// JoinSide
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum JoinSide {
    Left,
    Right,
}

impl JoinSide {
    #[must_use]
    pub const fn other(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }
}

///
/// NavigationBinding
///
/// Resolved meaning of one navigation property on one entity type.
///

#[derive(Clone, Copy, Debug)]
pub enum NavigationBinding {
    /// Dependent-side reference to the principal.
    Principal {
        name: &'static str,
        relation: RelationId,
    },
    /// Principal-side collection (`Many`) or reference (`One`) of dependents.
    Dependents {
        name: &'static str,
        relation: RelationId,
        cardinality: Cardinality,
    },
    /// Many-to-many collection that skips over the join entity.
    Skip {
        name: &'static str,
        skip: SkipId,
        side: JoinSide,
    },
}

impl NavigationBinding {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Principal { name, .. }
            | Self::Dependents { name, .. }
            | Self::Skip { name, .. } => name,
        }
    }

    #[must_use]
    pub const fn is_collection(&self) -> bool {
        matches!(
            self,
            Self::Dependents {
                cardinality: Cardinality::Many,
                ..
            } | Self::Skip { .. }
        )
    }
}

///
/// EntityDescriptor
///

#[derive(Debug)]
pub struct EntityDescriptor {
    pub model: &'static EntityModel,
    pub navigations: Vec<NavigationBinding>,
    /// Blank-instance constructor, used for store loads and join records.
    pub create: Option<fn() -> Box<dyn EntityValue>>,
    /// Set when this entity is the join entity of a skip navigation.
    pub join_of: Option<SkipId>,
}

impl EntityDescriptor {
    #[must_use]
    pub fn navigation(&self, name: &str) -> Option<&NavigationBinding> {
        self.navigations.iter().find(|nav| nav.name() == name)
    }
}

///
/// SchemaError
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum SchemaError {
    #[error("entity '{0}' is registered twice")]
    DuplicateEntity(&'static str),

    #[error("entity '{entity}' has primary key field '{field}' that is not a declared field")]
    UnknownKeyField {
        entity: &'static str,
        field: &'static str,
    },

    #[error("entity '{0}' declares no primary key")]
    EmptyKey(&'static str),

    #[error("entity '{0}' uses store key generation but its key is not a single Int field")]
    InvalidStoreKey(&'static str),

    #[error("entity '{0}' uses client key generation but its key is not a single Ulid field")]
    InvalidClientKey(&'static str),

    #[error("relation '{relation}' references unregistered entity '{entity}'")]
    UnknownEntity {
        relation: &'static str,
        entity: &'static str,
    },

    #[error("relation '{relation}' foreign key field '{field}' is not declared on '{entity}'")]
    UnknownForeignKeyField {
        relation: &'static str,
        entity: &'static str,
        field: &'static str,
    },

    #[error("relation '{0}' foreign key arity does not match the principal key")]
    ForeignKeyArity(&'static str),

    #[error("relation '{relation}' foreign key field '{field}' has a different kind than the principal key")]
    ForeignKeyKind {
        relation: &'static str,
        field: &'static str,
    },

    #[error("optional relation '{relation}' needs nullable foreign key field '{field}'")]
    NonNullableOptional {
        relation: &'static str,
        field: &'static str,
    },

    #[error("relation '{0}' uses SetNull on a required relationship")]
    SetNullOnRequired(&'static str),

    #[error("entity '{entity}' declares navigation '{name}' more than once")]
    DuplicateNavigation {
        entity: &'static str,
        name: &'static str,
    },

    #[error("relation '{0}' is declared twice")]
    DuplicateRelation(&'static str),

    #[error("skip navigation '{skip}' names unknown relation '{relation}'")]
    UnknownSkipRelation {
        skip: &'static str,
        relation: &'static str,
    },

    #[error("skip navigation '{skip}' relation '{relation}' does not join '{expected}'")]
    SkipRelationMismatch {
        skip: &'static str,
        relation: &'static str,
        expected: &'static str,
    },
}

///
/// SchemaErrors
/// Aggregated validation failures; schema build reports all of them at once.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SchemaErrors(pub Vec<SchemaError>);

impl fmt::Display for SchemaErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for SchemaErrors {}

impl From<SchemaErrors> for InternalError {
    fn from(err: SchemaErrors) -> Self {
        Self::new(ErrorClass::Unsupported, ErrorOrigin::Model, err.to_string())
    }
}

///
/// SchemaBuilder
///

#[derive(Default)]
pub struct SchemaBuilder {
    entities: Vec<(&'static EntityModel, Option<fn() -> Box<dyn EntityValue>>)>,
    relations: Vec<&'static RelationModel>,
    skips: Vec<&'static SkipNavigationModel>,
}

impl SchemaBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entity type that can be loaded from a store.
    #[must_use]
    pub fn entity<E: EntityKind + Default>(mut self) -> Self {
        fn create<E: EntityKind + Default>() -> Box<dyn EntityValue> {
            Box::new(E::default())
        }

        self.entities.push((E::MODEL, Some(create::<E>)));
        self
    }

    /// Register a model without a constructor (materialize-only entity).
    #[must_use]
    pub fn model(mut self, model: &'static EntityModel) -> Self {
        self.entities.push((model, None));
        self
    }

    #[must_use]
    pub fn relation(mut self, relation: &'static RelationModel) -> Self {
        self.relations.push(relation);
        self
    }

    /// Register a many-to-many skip navigation; its join entity is registered implicitly.
    #[must_use]
    pub fn skip(mut self, skip: &'static SkipNavigationModel) -> Self {
        self.skips.push(skip);
        self
    }

    pub fn build(self) -> Result<Schema, SchemaErrors> {
        let mut errors = Vec::new();

        // Phase 1: entities, including join entities of skip navigations.
        let mut entities: BTreeMap<&'static str, EntityDescriptor> = BTreeMap::new();
        for (model, create) in &self.entities {
            if entities.contains_key(model.name) {
                errors.push(SchemaError::DuplicateEntity(model.name));
                continue;
            }
            validate_entity(model, &mut errors);
            entities.insert(
                model.name,
                EntityDescriptor {
                    model,
                    navigations: Vec::new(),
                    create: *create,
                    join_of: None,
                },
            );
        }
        for (index, skip) in self.skips.iter().enumerate() {
            let model = skip.join.model();
            let create = match skip.join {
                JoinEntity::Declared { create, .. } => Some(create),
                JoinEntity::Implicit { .. } => None,
            };
            let descriptor = entities.entry(model.name).or_insert_with(|| {
                validate_entity(model, &mut errors);
                EntityDescriptor {
                    model,
                    navigations: Vec::new(),
                    create,
                    join_of: None,
                }
            });
            descriptor.join_of = Some(SkipId(index));
            if descriptor.create.is_none() {
                descriptor.create = create;
            }
        }

        // Phase 2: relations and their navigation bindings.
        let mut seen_relations = BTreeMap::new();
        for (index, relation) in self.relations.iter().enumerate() {
            if seen_relations.insert(relation.name, index).is_some() {
                errors.push(SchemaError::DuplicateRelation(relation.name));
                continue;
            }
            validate_relation(relation, &entities, &mut errors);

            let id = RelationId(index);
            if let Some(name) = relation.dependent_navigation
                && let Some(descriptor) = entities.get_mut(relation.dependent)
            {
                bind(
                    descriptor,
                    NavigationBinding::Principal { name, relation: id },
                    &mut errors,
                );
            }
            if let Some(nav) = relation.principal_navigation
                && let Some(descriptor) = entities.get_mut(relation.principal)
            {
                bind(
                    descriptor,
                    NavigationBinding::Dependents {
                        name: nav.name,
                        relation: id,
                        cardinality: nav.cardinality,
                    },
                    &mut errors,
                );
            }
        }

        // Phase 3: skip navigations resolve against registered relations.
        let mut skip_relations = Vec::with_capacity(self.skips.len());
        for (index, skip) in self.skips.iter().enumerate() {
            let id = SkipId(index);
            let left = resolve_skip_relation(
                skip,
                skip.left_relation,
                skip.left,
                &self.relations,
                &mut errors,
            );
            let right = resolve_skip_relation(
                skip,
                skip.right_relation,
                skip.right,
                &self.relations,
                &mut errors,
            );
            skip_relations.push((
                left.unwrap_or(RelationId(usize::MAX)),
                right.unwrap_or(RelationId(usize::MAX)),
            ));

            if let Some(descriptor) = entities.get_mut(skip.left) {
                bind(
                    descriptor,
                    NavigationBinding::Skip {
                        name: skip.left_navigation,
                        skip: id,
                        side: JoinSide::Left,
                    },
                    &mut errors,
                );
            } else {
                errors.push(SchemaError::UnknownEntity {
                    relation: skip.name,
                    entity: skip.left,
                });
            }
            match entities.get_mut(skip.right) {
                Some(descriptor) => {
                    if let Some(name) = skip.right_navigation {
                        bind(
                            descriptor,
                            NavigationBinding::Skip {
                                name,
                                skip: id,
                                side: JoinSide::Right,
                            },
                            &mut errors,
                        );
                    }
                }
                None => errors.push(SchemaError::UnknownEntity {
                    relation: skip.name,
                    entity: skip.right,
                }),
            }
        }

        if !errors.is_empty() {
            return Err(SchemaErrors(errors));
        }

        Ok(Schema {
            entities,
            relations: self.relations,
            skips: self.skips,
            skip_relations,
        })
    }
}

// Register one navigation binding, rejecting duplicate names per entity.
fn bind(
    descriptor: &mut EntityDescriptor,
    binding: NavigationBinding,
    errors: &mut Vec<SchemaError>,
) {
    if descriptor.navigation(binding.name()).is_some() {
        errors.push(SchemaError::DuplicateNavigation {
            entity: descriptor.model.name,
            name: binding.name(),
        });
        return;
    }
    descriptor.navigations.push(binding);
}

fn validate_entity(model: &'static EntityModel, errors: &mut Vec<SchemaError>) {
    if model.primary_key.is_empty() {
        errors.push(SchemaError::EmptyKey(model.name));
    }
    for field in model.primary_key {
        if model.field(field).is_none() {
            errors.push(SchemaError::UnknownKeyField {
                entity: model.name,
                field,
            });
        }
    }

    let single_kind = match model.primary_key {
        [name] => model.field(name).map(|field| field.kind),
        _ => None,
    };
    match model.key_generation {
        KeyGeneration::Store if single_kind != Some(FieldKind::Int) => {
            errors.push(SchemaError::InvalidStoreKey(model.name));
        }
        KeyGeneration::Client if single_kind != Some(FieldKind::Ulid) => {
            errors.push(SchemaError::InvalidClientKey(model.name));
        }
        _ => {}
    }
}

fn validate_relation(
    relation: &'static RelationModel,
    entities: &BTreeMap<&'static str, EntityDescriptor>,
    errors: &mut Vec<SchemaError>,
) {
    let principal = entities.get(relation.principal);
    let dependent = entities.get(relation.dependent);
    for (entity, found) in [
        (relation.principal, principal.is_some()),
        (relation.dependent, dependent.is_some()),
    ] {
        if !found {
            errors.push(SchemaError::UnknownEntity {
                relation: relation.name,
                entity,
            });
        }
    }
    let (Some(principal), Some(dependent)) = (principal, dependent) else {
        return;
    };

    if relation.foreign_key.len() != principal.model.primary_key.len() {
        errors.push(SchemaError::ForeignKeyArity(relation.name));
        return;
    }
    if relation.required && relation.on_delete == DeleteBehavior::SetNull {
        errors.push(SchemaError::SetNullOnRequired(relation.name));
    }

    for (fk_name, pk_name) in relation
        .foreign_key
        .iter()
        .zip(principal.model.primary_key.iter())
    {
        let Some(fk) = dependent.model.field(fk_name) else {
            errors.push(SchemaError::UnknownForeignKeyField {
                relation: relation.name,
                entity: relation.dependent,
                field: fk_name,
            });
            continue;
        };
        if let Some(pk) = principal.model.field(pk_name)
            && pk.kind != fk.kind
        {
            errors.push(SchemaError::ForeignKeyKind {
                relation: relation.name,
                field: fk_name,
            });
        }
        if !relation.required && !fk.nullable {
            errors.push(SchemaError::NonNullableOptional {
                relation: relation.name,
                field: fk_name,
            });
        }
    }
}

fn resolve_skip_relation(
    skip: &'static SkipNavigationModel,
    relation_name: &'static str,
    expected_principal: &'static str,
    relations: &[&'static RelationModel],
    errors: &mut Vec<SchemaError>,
) -> Option<RelationId> {
    let Some(index) = relations.iter().position(|r| r.name == relation_name) else {
        errors.push(SchemaError::UnknownSkipRelation {
            skip: skip.name,
            relation: relation_name,
        });
        return None;
    };

    let relation = relations[index];
    if relation.principal != expected_principal || relation.dependent != skip.join.model().name {
        errors.push(SchemaError::SkipRelationMismatch {
            skip: skip.name,
            relation: relation_name,
            expected: expected_principal,
        });
        return None;
    }

    Some(RelationId(index))
}

///
/// Schema
///
/// Validated, immutable registry shared by every session tracking against it.
///

#[derive(Debug)]
pub struct Schema {
    entities: BTreeMap<&'static str, EntityDescriptor>,
    relations: Vec<&'static RelationModel>,
    skips: Vec<&'static SkipNavigationModel>,
    skip_relations: Vec<(RelationId, RelationId)>,
}

impl Schema {
    #[must_use]
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::new()
    }

    #[must_use]
    pub fn entity(&self, name: &str) -> Option<&EntityDescriptor> {
        self.entities.get(name)
    }

    /// Look up an entity, reporting unregistered names as a model error.
    pub fn require_entity(&self, name: &str) -> Result<&EntityDescriptor, InternalError> {
        self.entity(name).ok_or_else(|| {
            InternalError::model_unsupported(format!("entity '{name}' is not registered"))
        })
    }

    pub fn entities(&self) -> impl Iterator<Item = &EntityDescriptor> {
        self.entities.values()
    }

    #[must_use]
    pub fn relation(&self, id: RelationId) -> &'static RelationModel {
        self.relations[id.0]
    }

    #[must_use]
    pub fn relation_by_name(&self, name: &str) -> Option<(RelationId, &'static RelationModel)> {
        self.relations
            .iter()
            .position(|r| r.name == name)
            .map(|index| (RelationId(index), self.relations[index]))
    }

    /// Relations in which `entity` holds the foreign key.
    pub fn relations_as_dependent<'a>(
        &'a self,
        entity: &'a str,
    ) -> impl Iterator<Item = (RelationId, &'static RelationModel)> + 'a {
        self.relations
            .iter()
            .enumerate()
            .filter(move |(_, r)| r.dependent == entity)
            .map(|(index, r)| (RelationId(index), *r))
    }

    /// Relations in which `entity` is referenced by the foreign key.
    pub fn relations_as_principal<'a>(
        &'a self,
        entity: &'a str,
    ) -> impl Iterator<Item = (RelationId, &'static RelationModel)> + 'a {
        self.relations
            .iter()
            .enumerate()
            .filter(move |(_, r)| r.principal == entity)
            .map(|(index, r)| (RelationId(index), *r))
    }

    #[must_use]
    pub fn skip(&self, id: SkipId) -> &'static SkipNavigationModel {
        self.skips[id.0]
    }

    /// Join relations `(left, right)` of a skip navigation.
    #[must_use]
    pub fn skip_relations(&self, id: SkipId) -> (RelationId, RelationId) {
        self.skip_relations[id.0]
    }

    /// Navigation on `entity` bound to the principal side of `relation`, if any.
    #[must_use]
    pub fn principal_navigation(&self, relation: RelationId) -> Option<NavigationBinding> {
        let model = self.relation(relation);
        let descriptor = self.entity(model.principal)?;
        descriptor.navigations.iter().copied().find(|nav| {
            matches!(nav, NavigationBinding::Dependents { relation: r, .. } if *r == relation)
        })
    }

    /// Skip navigation binding on one side of a many-to-many relationship.
    #[must_use]
    pub fn skip_navigation(&self, skip: SkipId, side: JoinSide) -> Option<&'static str> {
        let model = self.skip(skip);
        match side {
            JoinSide::Left => Some(model.left_navigation),
            JoinSide::Right => model.right_navigation,
        }
    }
}

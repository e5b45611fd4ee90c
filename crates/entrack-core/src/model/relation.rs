use crate::{model::EntityModel, traits::EntityValue};

///
/// Cardinality
/// Shape of the principal-side navigation.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Cardinality {
    One,
    Many,
}

///
/// DeleteBehavior
/// What happens to tracked dependents when their principal is deleted.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DeleteBehavior {
    /// Dependents are deleted with the principal.
    Cascade,
    /// Dependent foreign keys are nulled; requires an optional relationship.
    SetNull,
    /// Deleting a principal with live dependents fails at submission.
    Restrict,
}

///
/// PrincipalNavigation
///

#[derive(Clone, Copy, Debug)]
pub struct PrincipalNavigation {
    pub name: &'static str,
    pub cardinality: Cardinality,
}

impl PrincipalNavigation {
    #[must_use]
    pub const fn many(name: &'static str) -> Self {
        Self {
            name,
            cardinality: Cardinality::Many,
        }
    }

    #[must_use]
    pub const fn one(name: &'static str) -> Self {
        Self {
            name,
            cardinality: Cardinality::One,
        }
    }
}

///
/// RelationModel
///
/// One foreign-key relationship between a principal and a dependent type.
/// `foreign_key` lists dependent fields aligned with the principal primary key.
///

#[derive(Debug)]
pub struct RelationModel {
    pub name: &'static str,
    pub principal: &'static str,
    pub dependent: &'static str,
    pub foreign_key: &'static [&'static str],
    pub principal_navigation: Option<PrincipalNavigation>,
    pub dependent_navigation: Option<&'static str>,
    pub required: bool,
    pub on_delete: DeleteBehavior,
}

impl RelationModel {
    #[must_use]
    pub const fn is_one_to_one(&self) -> bool {
        matches!(
            self.principal_navigation,
            Some(PrincipalNavigation {
                cardinality: Cardinality::One,
                ..
            })
        )
    }
}

///
/// JoinEntity
///
/// How join records of a many-to-many relationship are materialized.
/// Fixup treats both variants the same once a record exists.
///

#[derive(Clone, Copy, Debug)]
pub enum JoinEntity {
    /// A user-visible join type; `create` returns a blank instance.
    Declared {
        model: &'static EntityModel,
        create: fn() -> Box<dyn EntityValue>,
    },
    /// A synthesized key-only record carrying just the two foreign keys.
    Implicit { model: &'static EntityModel },
}

impl JoinEntity {
    #[must_use]
    pub const fn model(&self) -> &'static EntityModel {
        match self {
            Self::Declared { model, .. } | Self::Implicit { model } => model,
        }
    }
}

///
/// SkipNavigationModel
///
/// Many-to-many relationship exposed as collection navigations on both
/// sides that skip over the join entity.
///

#[derive(Debug)]
pub struct SkipNavigationModel {
    pub name: &'static str,
    pub left: &'static str,
    pub left_navigation: &'static str,
    pub right: &'static str,
    pub right_navigation: Option<&'static str>,
    pub join: JoinEntity,
    /// Relation whose principal is `left` and dependent is the join entity.
    pub left_relation: &'static str,
    /// Relation whose principal is `right` and dependent is the join entity.
    pub right_relation: &'static str,
}

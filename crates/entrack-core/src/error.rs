use crate::{tracker::EntityState, value::KeyValue};
use std::fmt;
use thiserror::Error as ThisError;

///
/// InternalError
///
/// Structured runtime error with a stable internal classification.
/// Every fallible engine operation reports through this type; `detail`
/// carries the origin-specific payload callers may branch on.
///

#[derive(Debug, ThisError)]
#[error("{message}")]
pub struct InternalError {
    pub class: ErrorClass,
    pub origin: ErrorOrigin,
    pub message: String,

    /// Optional structured error detail.
    pub detail: Option<ErrorDetail>,
}

impl InternalError {
    /// Construct an InternalError without detail.
    pub fn new(class: ErrorClass, origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self {
            class,
            origin,
            message: message.into(),
            detail: None,
        }
    }

    #[must_use]
    pub fn with_detail(mut self, detail: ErrorDetail) -> Self {
        self.detail = Some(detail);
        self
    }

    /// Construct a model-origin unsupported error (bad schema or field access).
    pub(crate) fn model_unsupported(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Unsupported, ErrorOrigin::Model, message)
    }

    /// Construct an access-origin error for a rejected field/navigation write.
    pub(crate) fn access(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Unsupported, ErrorOrigin::Access, message)
    }

    /// Construct a tracker-origin invariant violation.
    pub(crate) fn tracker_invariant(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::InvariantViolation, ErrorOrigin::Tracker, message)
    }

    /// Construct a tracker-origin not-found error for an unknown handle.
    pub(crate) fn tracker_not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::NotFound, ErrorOrigin::Tracker, message)
    }

    /// Construct a detect-origin unsupported error.
    pub(crate) fn detect_unsupported(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Unsupported, ErrorOrigin::Detect, message)
    }

    /// Construct a fixup-origin invariant violation.
    pub(crate) fn fixup_invariant(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::InvariantViolation, ErrorOrigin::Fixup, message)
    }

    /// Construct a persist-origin unsupported error (unorderable change set).
    pub(crate) fn persist_unsupported(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Unsupported, ErrorOrigin::Persist, message)
    }

    /// Invalid explicit state transition.
    pub(crate) fn invalid_transition(entity: &str, from: EntityState, to: EntityState) -> Self {
        Self::new(
            ErrorClass::InvariantViolation,
            ErrorOrigin::Tracker,
            format!("invalid state transition for '{entity}': {from} -> {to}"),
        )
        .with_detail(ErrorDetail::Transition { from, to })
    }

    /// Two distinct instances presented for the same identity.
    pub(crate) fn identity_conflict(entity: &'static str, key: KeyValue) -> Self {
        Self::new(
            ErrorClass::Conflict,
            ErrorOrigin::Identity,
            format!("another instance of '{entity}' with key {key} is already tracked"),
        )
        .with_detail(ErrorDetail::Identity { entity, key })
    }

    /// An update or delete affected no rows.
    pub(crate) fn concurrency_conflict(entity: &'static str, key: KeyValue) -> Self {
        Self::new(
            ErrorClass::Conflict,
            ErrorOrigin::Persist,
            format!(
                "concurrency conflict: '{entity}' {key} was changed or removed since it was read"
            ),
        )
        .with_detail(ErrorDetail::Concurrency { entity, key })
    }

    /// Aggregated referential-integrity failure raised before any command runs.
    pub(crate) fn integrity(report: IntegrityReport) -> Self {
        Self::new(
            ErrorClass::InvariantViolation,
            ErrorOrigin::Persist,
            format!("submission rejected: {report}"),
        )
        .with_detail(ErrorDetail::Integrity(report))
    }

    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self.class, ErrorClass::Conflict)
    }

    #[must_use]
    pub const fn integrity_report(&self) -> Option<&IntegrityReport> {
        match &self.detail {
            Some(ErrorDetail::Integrity(report)) => Some(report),
            _ => None,
        }
    }

    #[must_use]
    pub fn display_with_class(&self) -> String {
        format!("{}:{}: {}", self.origin, self.class, self.message)
    }
}

impl From<StoreError> for InternalError {
    fn from(err: StoreError) -> Self {
        let class = match err {
            StoreError::DuplicateKey { .. } => ErrorClass::Conflict,
            StoreError::UnknownEntity { .. } | StoreError::MissingKey { .. } => {
                ErrorClass::Unsupported
            }
            StoreError::NoTransaction | StoreError::TransactionActive => {
                ErrorClass::InvariantViolation
            }
            StoreError::Backend { .. } => ErrorClass::Internal,
        };

        Self {
            class,
            origin: ErrorOrigin::Store,
            message: err.to_string(),
            detail: Some(ErrorDetail::Store(err)),
        }
    }
}

///
/// ErrorDetail
///
/// Structured, origin-specific error detail carried by [`InternalError`].
///

#[derive(Debug, ThisError)]
pub enum ErrorDetail {
    #[error("{0}")]
    Integrity(IntegrityReport),

    #[error("transition {from} -> {to} is not allowed")]
    Transition { from: EntityState, to: EntityState },

    #[error("identity conflict on '{entity}' {key}")]
    Identity { entity: &'static str, key: KeyValue },

    #[error("concurrency conflict on '{entity}' {key}")]
    Concurrency { entity: &'static str, key: KeyValue },

    #[error("{0}")]
    Store(StoreError),
}

///
/// StoreError
///
/// Failure reported by a persistence backend.
/// Never returned directly from the session; always wrapped in [`ErrorDetail::Store`].
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum StoreError {
    #[error("no transaction is active")]
    NoTransaction,

    #[error("a transaction is already active")]
    TransactionActive,

    #[error("unknown entity '{entity}'")]
    UnknownEntity { entity: String },

    #[error("row for '{entity}' is missing key field '{field}'")]
    MissingKey { entity: String, field: String },

    #[error("duplicate key for '{entity}': {key}")]
    DuplicateKey { entity: String, key: KeyValue },

    #[error("backend failure: {message}")]
    Backend { message: String },
}

///
/// IntegrityViolation
///
/// One unresolved referential-integrity problem found at submission time.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum IntegrityViolation {
    /// A required relationship was severed and orphan resolution is disabled.
    SeveredRequired {
        relation: &'static str,
        dependent: &'static str,
        key: KeyValue,
    },

    /// A deleted principal still has live dependents that were not cascaded.
    DependentsRemain {
        relation: &'static str,
        principal: &'static str,
        principal_key: KeyValue,
        dependent: &'static str,
        dependent_key: KeyValue,
    },
}

impl fmt::Display for IntegrityViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SeveredRequired {
                relation,
                dependent,
                key,
            } => write!(
                f,
                "'{dependent}' {key} was severed from required relationship '{relation}'"
            ),
            Self::DependentsRemain {
                relation,
                principal,
                principal_key,
                dependent,
                dependent_key,
            } => write!(
                f,
                "deleted '{principal}' {principal_key} is still referenced by '{dependent}' {dependent_key} through '{relation}'"
            ),
        }
    }
}

///
/// IntegrityReport
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct IntegrityReport {
    pub violations: Vec<IntegrityViolation>,
}

impl IntegrityReport {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    pub(crate) fn push(&mut self, violation: IntegrityViolation) {
        self.violations.push(violation);
    }
}

impl fmt::Display for IntegrityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for violation in &self.violations {
            if !first {
                f.write_str("; ")?;
            }
            first = false;
            write!(f, "{violation}")?;
        }

        Ok(())
    }
}

///
/// ErrorClass
/// Internal error taxonomy for runtime classification.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorClass {
    NotFound,
    Internal,
    Conflict,
    Unsupported,
    InvariantViolation,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::NotFound => "not_found",
            Self::Internal => "internal",
            Self::Conflict => "conflict",
            Self::Unsupported => "unsupported",
            Self::InvariantViolation => "invariant_violation",
        };
        write!(f, "{label}")
    }
}

///
/// ErrorOrigin
/// Internal origin taxonomy for runtime classification.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorOrigin {
    Model,
    Access,
    Identity,
    Tracker,
    Detect,
    Fixup,
    Persist,
    Store,
}

impl fmt::Display for ErrorOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Model => "model",
            Self::Access => "access",
            Self::Identity => "identity",
            Self::Tracker => "tracker",
            Self::Detect => "detect",
            Self::Fixup => "fixup",
            Self::Persist => "persist",
            Self::Store => "store",
        };
        write!(f, "{label}")
    }
}

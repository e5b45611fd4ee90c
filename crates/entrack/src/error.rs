use derive_more::Display;
use entrack_core::error::{
    ErrorClass, ErrorDetail, ErrorOrigin as CoreErrorOrigin, InternalError, StoreError,
};
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

///
/// Error
/// Public error type with a stable kind + origin taxonomy.
///

#[derive(Debug, Deserialize, Serialize, ThisError)]
#[error("{message}")]
pub struct Error {
    pub kind: ErrorKind,
    pub origin: ErrorOrigin,
    pub message: String,
}

impl Error {
    pub fn new(kind: ErrorKind, origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self {
            kind,
            origin,
            message: message.into(),
        }
    }

    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::Tracking(TrackingErrorKind::IdentityConflict)
                | ErrorKind::Submit(SubmitErrorKind::Conflict)
                | ErrorKind::Store(StoreErrorKind::DuplicateKey)
        )
    }
}

impl From<InternalError> for Error {
    fn from(err: InternalError) -> Self {
        let kind = match &err.detail {
            Some(ErrorDetail::Identity { .. }) => {
                ErrorKind::Tracking(TrackingErrorKind::IdentityConflict)
            }
            Some(ErrorDetail::Transition { .. }) => {
                ErrorKind::Tracking(TrackingErrorKind::InvalidTransition)
            }
            Some(ErrorDetail::Integrity(_)) => ErrorKind::Submit(SubmitErrorKind::Integrity),
            Some(ErrorDetail::Concurrency { .. }) => ErrorKind::Submit(SubmitErrorKind::Conflict),
            Some(ErrorDetail::Store(StoreError::DuplicateKey { .. })) => {
                ErrorKind::Store(StoreErrorKind::DuplicateKey)
            }
            Some(ErrorDetail::Store(StoreError::Backend { .. })) => {
                ErrorKind::Store(StoreErrorKind::Unavailable)
            }
            Some(ErrorDetail::Store(_)) | None => match (err.class, err.origin) {
                (ErrorClass::NotFound, _) => ErrorKind::Tracking(TrackingErrorKind::NotFound),
                (ErrorClass::Unsupported, CoreErrorOrigin::Persist) => {
                    ErrorKind::Submit(SubmitErrorKind::Unorderable)
                }
                (ErrorClass::Unsupported, CoreErrorOrigin::Model | CoreErrorOrigin::Access) => {
                    ErrorKind::Model
                }
                (ErrorClass::Unsupported, _) => ErrorKind::Tracking(TrackingErrorKind::Unsupported),
                (ErrorClass::Conflict | ErrorClass::InvariantViolation | ErrorClass::Internal, _) => {
                    ErrorKind::Internal
                }
            },
        };

        Self::new(kind, err.origin.into(), err.message)
    }
}

///
/// ErrorKind
/// Public error taxonomy for callers.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum ErrorKind {
    /// Schema or entity accessor rejected the request.
    Model,
    Tracking(TrackingErrorKind),
    Submit(SubmitErrorKind),
    Store(StoreErrorKind),

    /// The caller cannot remediate this.
    Internal,
}

///
/// TrackingErrorKind
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum TrackingErrorKind {
    /// A second instance was presented for a tracked identity.
    IdentityConflict,

    /// The requested state change is not allowed from the current state.
    InvalidTransition,

    /// The handle does not belong to this session.
    NotFound,

    /// The change cannot be tracked (for example a key edit on a saved entity).
    Unsupported,
}

///
/// SubmitErrorKind
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum SubmitErrorKind {
    /// Referential problems were found before anything reached the store.
    Integrity,

    /// An update or delete matched no row.
    Conflict,

    /// The change set has a dependency cycle.
    Unorderable,
}

///
/// StoreErrorKind
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum StoreErrorKind {
    DuplicateKey,
    Unavailable,
}

///
/// ErrorOrigin
/// Public origin taxonomy for callers.
///

#[derive(Clone, Copy, Debug, Deserialize, Display, Eq, PartialEq, Serialize)]
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

impl From<CoreErrorOrigin> for ErrorOrigin {
    fn from(origin: CoreErrorOrigin) -> Self {
        match origin {
            CoreErrorOrigin::Model => Self::Model,
            CoreErrorOrigin::Access => Self::Access,
            CoreErrorOrigin::Identity => Self::Identity,
            CoreErrorOrigin::Tracker => Self::Tracker,
            CoreErrorOrigin::Detect => Self::Detect,
            CoreErrorOrigin::Fixup => Self::Fixup,
            CoreErrorOrigin::Persist => Self::Persist,
            CoreErrorOrigin::Store => Self::Store,
        }
    }
}

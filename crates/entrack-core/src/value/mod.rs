//! Scalar property values and primary/foreign key tuples.


use crate::{error::InternalError, model::FieldKind};
use std::fmt::{self, Display};
use ulid::Ulid;

///
/// Value
///
/// Snapshot representation of one scalar property.
///
/// Null → the property holds no value (SQL NULL / `Option::None`).
///

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Value {
    Null,
    Blob(Vec<u8>),
    Bool(bool),
    Int(i64),
    Text(String),
    /// Milliseconds since the unix epoch.
    Timestamp(i64),
    Uint(u64),
    Ulid(Ulid),
}

impl Value {
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Sentinel "unset" value for a field kind.
    #[must_use]
    pub const fn default_for(kind: FieldKind) -> Self {
        match kind {
            FieldKind::Blob => Self::Blob(Vec::new()),
            FieldKind::Bool => Self::Bool(false),
            FieldKind::Int => Self::Int(0),
            FieldKind::Text => Self::Text(String::new()),
            FieldKind::Timestamp => Self::Timestamp(0),
            FieldKind::Uint => Self::Uint(0),
            FieldKind::Ulid => Self::Ulid(Ulid::nil()),
        }
    }

    /// True when the value is null or the kind-specific default.
    #[must_use]
    pub fn is_unset(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Blob(bytes) => bytes.is_empty(),
            Self::Bool(v) => !v,
            Self::Int(v) | Self::Timestamp(v) => *v == 0,
            Self::Text(v) => v.is_empty(),
            Self::Uint(v) => *v == 0,
            Self::Ulid(v) => v.is_nil(),
        }
    }

    /// Whether this value may be stored in a field of `kind`.
    #[must_use]
    pub const fn matches_kind(&self, kind: FieldKind, nullable: bool) -> bool {
        matches!(
            (self, kind),
            (Self::Blob(_), FieldKind::Blob)
                | (Self::Bool(_), FieldKind::Bool)
                | (Self::Int(_), FieldKind::Int)
                | (Self::Text(_), FieldKind::Text)
                | (Self::Timestamp(_), FieldKind::Timestamp)
                | (Self::Uint(_), FieldKind::Uint)
                | (Self::Ulid(_), FieldKind::Ulid)
        ) || (nullable && self.is_null())
    }

    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("<null>"),
            Self::Blob(bytes) => write!(f, "<{} bytes>", bytes.len()),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) | Self::Timestamp(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "'{v}'"),
            Self::Uint(v) => write!(f, "{v}"),
            Self::Ulid(v) => write!(f, "{v}"),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Self::Uint(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<Ulid> for Value {
    fn from(v: Ulid) -> Self {
        Self::Ulid(v)
    }
}

///
/// KeyValue
///
/// Ordered tuple of key component values, aligned with the declaring
/// field list (primary key or foreign key).
///

#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct KeyValue(Vec<Value>);

impl KeyValue {
    #[must_use]
    pub const fn new(parts: Vec<Value>) -> Self {
        Self(parts)
    }

    #[must_use]
    pub fn single(value: impl Into<Value>) -> Self {
        Self(vec![value.into()])
    }

    #[must_use]
    pub fn parts(&self) -> &[Value] {
        &self.0
    }

    #[must_use]
    pub fn into_parts(self) -> Vec<Value> {
        self.0
    }

    /// True if every component is unset (no identity assigned yet).
    #[must_use]
    pub fn is_unset(&self) -> bool {
        self.0.iter().all(Value::is_unset)
    }

    /// True if any component is null (a foreign key that references nothing).
    #[must_use]
    pub fn has_null(&self) -> bool {
        self.0.iter().any(Value::is_null)
    }
}

impl Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{part}")?;
        }
        f.write_str("}")
    }
}

macro_rules! key_value_from {
    ( $( $ty:ty ),* $(,)? ) => {
        $(
            impl From<$ty> for KeyValue {
                fn from(value: $ty) -> Self {
                    Self::single(value)
                }
            }
        )*
    };
}

key_value_from!(Value, i64, u64, bool, &str, String, Ulid);

///
/// FieldValue
///
/// Conversion between a Rust field type and its snapshot [`Value`].
///

pub trait FieldValue: Sized {
    fn to_value(&self) -> Value;

    fn from_value(value: Value) -> Option<Self>;
}

impl FieldValue for i64 {
    fn to_value(&self) -> Value {
        Value::Int(*self)
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Int(v) => Some(v),
            _ => None,
        }
    }
}

impl FieldValue for u64 {
    fn to_value(&self) -> Value {
        Value::Uint(*self)
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Uint(v) => Some(v),
            _ => None,
        }
    }
}

impl FieldValue for bool {
    fn to_value(&self) -> Value {
        Value::Bool(*self)
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Bool(v) => Some(v),
            _ => None,
        }
    }
}

impl FieldValue for String {
    fn to_value(&self) -> Value {
        Value::Text(self.clone())
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }
}

impl FieldValue for Vec<u8> {
    fn to_value(&self) -> Value {
        Value::Blob(self.clone())
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Blob(v) => Some(v),
            _ => None,
        }
    }
}

impl FieldValue for Ulid {
    fn to_value(&self) -> Value {
        Value::Ulid(*self)
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Ulid(v) => Some(v),
            _ => None,
        }
    }
}

impl<T: FieldValue> FieldValue for Option<T> {
    fn to_value(&self) -> Value {
        self.as_ref().map_or(Value::Null, FieldValue::to_value)
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Null => Some(None),
            other => T::from_value(other).map(Some),
        }
    }
}

/// Write `value` into a typed field slot, rejecting kind mismatches.
///
/// Intended for `EntityValue::set_value` implementations.
pub fn assign<T: FieldValue>(
    slot: &mut T,
    entity: &str,
    field: &str,
    value: Value,
) -> Result<(), InternalError> {
    let rendered = value.to_string();
    match T::from_value(value) {
        Some(v) => {
            *slot = v;
            Ok(())
        }
        None => Err(InternalError::access(format!(
            "value {rendered} does not fit field '{entity}.{field}'"
        ))),
    }
}

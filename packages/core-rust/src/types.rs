use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Generic runtime value passed between callers and backing policies.
///
/// Every argument marshalled into an execution context and every result read
/// back out of it is a `Value`. `Null` is the only variant without a
/// [`ValueClass`]; whether it is acceptable depends on the descriptor it is
/// matched against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Absent value.
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed 64-bit integer.
    Int(i64),
    /// 64-bit IEEE 754 floating point.
    Float(f64),
    /// UTF-8 string.
    String(String),
    /// Opaque binary data.
    Bytes(Vec<u8>),
    /// Point in time, milliseconds since the Unix epoch.
    DateTime(i64),
    /// Ordered sequence of values.
    Array(Vec<Value>),
    /// String-keyed map. `BTreeMap` keeps iteration deterministic.
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Runtime representation class of this value, `None` for [`Value::Null`].
    #[must_use]
    pub fn class(&self) -> Option<ValueClass> {
        match self {
            Self::Null => None,
            Self::Bool(_) => Some(ValueClass::Bool),
            Self::Int(_) => Some(ValueClass::Int),
            Self::Float(_) => Some(ValueClass::Float),
            Self::String(_) => Some(ValueClass::String),
            Self::Bytes(_) => Some(ValueClass::Bytes),
            Self::DateTime(_) => Some(ValueClass::DateTime),
            Self::Array(_) => Some(ValueClass::Array),
            Self::Map(_) => Some(ValueClass::Map),
        }
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

/// Representation class of a runtime value, or of a formal parameter.
///
/// `Any` only appears on the formal side: it is the class of a parameter whose
/// interface signature does not narrow the accepted representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueClass {
    Bool,
    Int,
    Float,
    String,
    Bytes,
    DateTime,
    Array,
    Map,
    Any,
}

impl ValueClass {
    /// Whether a value of class `actual` can be passed where `self` is declared.
    #[must_use]
    pub fn is_assignable_from(self, actual: ValueClass) -> bool {
        self == Self::Any || self == actual
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::String => "string",
            Self::Bytes => "bytes",
            Self::DateTime => "date_time",
            Self::Array => "array",
            Self::Map => "map",
            Self::Any => "any",
        }
    }
}

impl fmt::Display for ValueClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

/// A [`Value`] could not be converted into the requested Rust type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("expected {expected}, found {}", .found.map_or("null", ValueClass::as_str))]
pub struct ValueConversionError {
    pub expected: ValueClass,
    pub found: Option<ValueClass>,
}

macro_rules! value_conversions {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Self::$variant(v)
                }
            }

            impl TryFrom<Value> for $ty {
                type Error = ValueConversionError;

                fn try_from(value: Value) -> Result<Self, Self::Error> {
                    match value {
                        Value::$variant(v) => Ok(v),
                        other => Err(ValueConversionError {
                            expected: ValueClass::$variant,
                            found: other.class(),
                        }),
                    }
                }
            }
        )*
    };
}

value_conversions!(
    bool => Bool,
    i64 => Int,
    f64 => Float,
    String => String,
    Vec<u8> => Bytes,
    Vec<Value> => Array,
    BTreeMap<String, Value> => Map,
);

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_has_no_class() {
        assert_eq!(Value::Null.class(), None);
        assert!(Value::Null.is_null());
        assert_eq!(Value::from("x").class(), Some(ValueClass::String));
        assert_eq!(Value::DateTime(0).class(), Some(ValueClass::DateTime));
    }

    #[test]
    fn any_accepts_every_class() {
        for class in [
            ValueClass::Bool,
            ValueClass::Int,
            ValueClass::Float,
            ValueClass::String,
            ValueClass::Bytes,
            ValueClass::DateTime,
            ValueClass::Array,
            ValueClass::Map,
        ] {
            assert!(ValueClass::Any.is_assignable_from(class));
            assert!(class.is_assignable_from(class));
        }
        assert!(!ValueClass::Int.is_assignable_from(ValueClass::Float));
    }

    #[test]
    fn try_from_matching_variant() {
        assert_eq!(i64::try_from(Value::Int(42)), Ok(42));
        assert_eq!(String::try_from(Value::from("hi")), Ok("hi".to_string()));
    }

    #[test]
    fn try_from_mismatch_reports_classes() {
        let err = i64::try_from(Value::from("42")).unwrap_err();
        assert_eq!(err.expected, ValueClass::Int);
        assert_eq!(err.found, Some(ValueClass::String));
        assert_eq!(err.to_string(), "expected int, found string");

        let err = bool::try_from(Value::Null).unwrap_err();
        assert_eq!(err.to_string(), "expected bool, found null");
    }

    #[test]
    fn option_into_value() {
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some(5)), Value::Int(5));
    }
}

//! Declared data types of operation arguments and results.
//!
//! A `DataType` is what an operation template declares; a [`ValueClass`] is
//! how a value is actually represented at runtime. Each known data type admits
//! a fixed, closed set of representation classes.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::ValueClass;

/// Declared type of an argument or result descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    String,
    Integer,
    Decimal,
    Float,
    Boolean,
    DateTime,
    Binary,
    List,
    Map,
    /// Type could not be determined from the declaration. Never accepted.
    Unknown,
}

impl DataType {
    /// Representation classes this data type accepts. Empty for [`DataType::Unknown`].
    #[must_use]
    pub fn accepted_classes(self) -> &'static [ValueClass] {
        match self {
            Self::String => &[ValueClass::String],
            Self::Integer => &[ValueClass::Int],
            Self::Decimal => &[ValueClass::Int, ValueClass::Float],
            Self::Float => &[ValueClass::Float],
            Self::Boolean => &[ValueClass::Bool],
            Self::DateTime => &[ValueClass::DateTime],
            Self::Binary => &[ValueClass::Bytes],
            Self::List => &[ValueClass::Array],
            Self::Map => &[ValueClass::Map],
            Self::Unknown => &[],
        }
    }

    /// Whether a value or formal parameter of `class` can be carried by this type.
    ///
    /// The formal class [`ValueClass::Any`] is accepted by every known type;
    /// the concrete runtime class is then checked separately.
    #[must_use]
    pub fn accepts(self, class: ValueClass) -> bool {
        if self.is_unknown() {
            return false;
        }
        class == ValueClass::Any || self.accepted_classes().contains(&class)
    }

    #[must_use]
    pub fn is_unknown(self) -> bool {
        self == Self::Unknown
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Decimal => "decimal",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::DateTime => "date_time",
            Self::Binary => "binary",
            Self::List => "list",
            Self::Map => "map",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_types_accept_their_class() {
        assert!(DataType::String.accepts(ValueClass::String));
        assert!(DataType::Integer.accepts(ValueClass::Int));
        assert!(DataType::Boolean.accepts(ValueClass::Bool));
        assert!(DataType::Binary.accepts(ValueClass::Bytes));
        assert!(!DataType::String.accepts(ValueClass::Int));
        assert!(!DataType::Integer.accepts(ValueClass::Float));
    }

    #[test]
    fn decimal_accepts_int_and_float() {
        assert!(DataType::Decimal.accepts(ValueClass::Int));
        assert!(DataType::Decimal.accepts(ValueClass::Float));
        assert!(!DataType::Decimal.accepts(ValueClass::String));
    }

    #[test]
    fn any_formal_is_accepted_by_known_types_only() {
        assert!(DataType::Map.accepts(ValueClass::Any));
        assert!(!DataType::Unknown.accepts(ValueClass::Any));
        assert!(DataType::Unknown.accepted_classes().is_empty());
    }

    #[test]
    fn serde_uses_snake_case() {
        let json = serde_json::to_string(&DataType::DateTime).unwrap();
        assert_eq!(json, "\"date_time\"");
    }
}

//! Keys and typed attribute values.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a dictionary entry.
pub type Key = u64;

// ═══════════════════════════════════════════════════════════════════════════════
// ATTRIBUTE TYPE
// ═══════════════════════════════════════════════════════════════════════════════

/// Storage type of an attribute.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttributeType {
    /// Unsigned 64-bit integer
    UInt64,
    /// Signed 64-bit integer
    Int64,
    /// 64-bit float
    Float64,
    /// Variable-length UTF-8 string
    String,
}

impl AttributeType {
    /// Returns true for fixed-width numeric types.
    pub fn is_numeric(self) -> bool {
        !matches!(self, AttributeType::String)
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AttributeType::UInt64 => "UInt64",
            AttributeType::Int64 => "Int64",
            AttributeType::Float64 => "Float64",
            AttributeType::String => "String",
        };
        f.write_str(name)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ATTRIBUTE VALUE
// ═══════════════════════════════════════════════════════════════════════════════

/// A single attribute value.
///
/// Serialized untagged, so JSON numbers and strings map directly. A bare
/// non-negative integer deserializes as `UInt64`; use [`AttributeValue::coerce`]
/// to convert it to the declared attribute type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// Unsigned 64-bit integer
    UInt64(u64),
    /// Signed 64-bit integer
    Int64(i64),
    /// 64-bit float
    Float64(f64),
    /// UTF-8 string
    String(String),
}

impl AttributeValue {
    /// Returns the type of this value.
    pub fn attribute_type(&self) -> AttributeType {
        match self {
            AttributeValue::UInt64(_) => AttributeType::UInt64,
            AttributeValue::Int64(_) => AttributeType::Int64,
            AttributeValue::Float64(_) => AttributeType::Float64,
            AttributeValue::String(_) => AttributeType::String,
        }
    }

    /// Converts the value to `target` when that is lossless for integers.
    ///
    /// Integers widen to `Float64`; `UInt64` and `Int64` convert into each other
    /// only when the value fits. Strings never convert to or from numbers.
    pub fn coerce(self, target: AttributeType) -> Option<AttributeValue> {
        if self.attribute_type() == target {
            return Some(self);
        }

        match (self, target) {
            (AttributeValue::UInt64(v), AttributeType::Int64) => {
                i64::try_from(v).ok().map(AttributeValue::Int64)
            }
            (AttributeValue::UInt64(v), AttributeType::Float64) => Some(AttributeValue::Float64(v as f64)),
            (AttributeValue::Int64(v), AttributeType::UInt64) => {
                u64::try_from(v).ok().map(AttributeValue::UInt64)
            }
            (AttributeValue::Int64(v), AttributeType::Float64) => Some(AttributeValue::Float64(v as f64)),
            _ => None,
        }
    }

    /// Returns the inner value if this is a `UInt64`.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            AttributeValue::UInt64(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the inner value if this is an `Int64`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttributeValue::Int64(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the inner value if this is a `Float64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Float64(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the inner string if this is a `String`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(v) => Some(v),
            _ => None,
        }
    }
}

impl From<u64> for AttributeValue {
    fn from(v: u64) -> Self {
        AttributeValue::UInt64(v)
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        AttributeValue::Int64(v)
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        AttributeValue::Float64(v)
    }
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        AttributeValue::String(v.to_owned())
    }
}

impl From<String> for AttributeValue {
    fn from(v: String) -> Self {
        AttributeValue::String(v)
    }
}

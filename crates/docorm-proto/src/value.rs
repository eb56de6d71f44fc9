//! Bound values carried by query descriptors.

use std::collections::BTreeMap;

use bson::Bson;
use serde::{Deserialize, Serialize};

/// A scalar value bound into a query by the ORM.
///
/// Scalars are encoded into document primitives by the adapter's value coercion;
/// compound shapes (arrays, maps) are expressed through [`QueryValue`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// 32-bit signed integer.
    Int32(i32),
    /// 64-bit signed integer.
    Int64(i64),
    /// 64-bit floating point.
    Float64(f64),
    /// UTF-8 string.
    String(String),
    /// Binary data.
    Bytes(Vec<u8>),
    /// Timestamp as milliseconds since Unix epoch.
    DateTime(i64),
    /// UUID as 16 bytes.
    Uuid([u8; 16]),
    /// Document-store object identifier as 12 bytes.
    ObjectId([u8; 12]),
}

impl Value {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Try to get as bool.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get as i64.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int64(i) => Some(*i),
            Value::Int32(i) => Some(*i as i64),
            _ => None,
        }
    }

    /// Try to get as f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float64(f) => Some(*f),
            _ => None,
        }
    }

    /// Try to get as string reference.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<[u8; 16]> for Value {
    fn from(v: [u8; 16]) -> Self {
        Value::Uuid(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Value::Null,
        }
    }
}

/// A value as it appears in a query descriptor: filter operands and input rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QueryValue {
    /// A scalar bound by the ORM.
    Bind(Value),
    /// An ordered list of values.
    Array(Vec<QueryValue>),
    /// A nested map of values.
    Dictionary(BTreeMap<String, QueryValue>),
    /// An explicit null.
    Null,
    /// A case of a string-backed enumeration.
    EnumCase(String),
    /// "Use the database default" marker. Document stores have no column defaults.
    Default,
    /// A driver-specific value.
    Custom(CustomValue),
}

/// Driver-specific values a query may carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CustomValue {
    /// A document primitive built ahead of time; passed through untouched.
    Primitive(Bson),
    /// A value meant for some other backend, described by name.
    Opaque(String),
}

impl QueryValue {
    /// Bind a scalar.
    pub fn bind(value: impl Into<Value>) -> Self {
        QueryValue::Bind(value.into())
    }

    /// Build an array of bound scalars.
    pub fn array<T: Into<Value>>(values: impl IntoIterator<Item = T>) -> Self {
        QueryValue::Array(values.into_iter().map(QueryValue::bind).collect())
    }
}

impl From<Value> for QueryValue {
    fn from(v: Value) -> Self {
        QueryValue::Bind(v)
    }
}

//! Coercion of bound query values into document primitives.

use bson::spec::BinarySubtype;
use bson::{Binary, Bson, Document};
use docorm_proto::{CustomValue, QueryValue, Value};

use crate::error::Error;

/// Encode a bound scalar as a document primitive.
pub fn encode_primitive(value: &Value) -> Bson {
    match value {
        Value::Null => Bson::Null,
        Value::Bool(b) => Bson::Boolean(*b),
        Value::Int32(i) => Bson::Int32(*i),
        Value::Int64(i) => Bson::Int64(*i),
        Value::Float64(f) => Bson::Double(*f),
        Value::String(s) => Bson::String(s.clone()),
        Value::Bytes(bytes) => Bson::Binary(Binary {
            subtype: BinarySubtype::Generic,
            bytes: bytes.clone(),
        }),
        Value::DateTime(millis) => Bson::DateTime(bson::DateTime::from_millis(*millis)),
        Value::Uuid(bytes) => Bson::Binary(Binary {
            subtype: BinarySubtype::Uuid,
            bytes: bytes.to_vec(),
        }),
        Value::ObjectId(bytes) => Bson::ObjectId(bson::oid::ObjectId::from_bytes(*bytes)),
    }
}

/// Decode a document primitive back into a bound scalar.
///
/// Returns `None` for primitives that have no scalar counterpart (arrays, documents,
/// regular expressions, ...).
pub fn decode_primitive(primitive: &Bson) -> Option<Value> {
    match primitive {
        Bson::Null => Some(Value::Null),
        Bson::Boolean(b) => Some(Value::Bool(*b)),
        Bson::Int32(i) => Some(Value::Int32(*i)),
        Bson::Int64(i) => Some(Value::Int64(*i)),
        Bson::Double(f) => Some(Value::Float64(*f)),
        Bson::String(s) => Some(Value::String(s.clone())),
        Bson::DateTime(dt) => Some(Value::DateTime(dt.timestamp_millis())),
        Bson::ObjectId(oid) => Some(Value::ObjectId(oid.bytes())),
        Bson::Binary(binary) => match binary.subtype {
            BinarySubtype::Uuid => binary.bytes.as_slice().try_into().ok().map(Value::Uuid),
            _ => Some(Value::Bytes(binary.bytes.clone())),
        },
        _ => None,
    }
}

/// Convert a query value into a document primitive.
pub fn to_primitive(value: &QueryValue) -> Result<Bson, Error> {
    match value {
        QueryValue::Array(values) => Ok(Bson::Array(
            values.iter().map(to_primitive).collect::<Result<Vec<_>, _>>()?,
        )),
        QueryValue::Bind(value) => Ok(encode_primitive(value)),
        QueryValue::Dictionary(entries) => {
            let mut document = Document::new();
            for (key, value) in entries {
                document.insert(key.clone(), to_primitive(value)?);
            }
            Ok(Bson::Document(document))
        }
        QueryValue::Null => Ok(Bson::Null),
        QueryValue::Default => Err(Error::UnsupportedDefaultValue),
        QueryValue::Custom(CustomValue::Primitive(primitive)) => Ok(primitive.clone()),
        QueryValue::EnumCase(case) => Ok(Bson::String(case.clone())),
        QueryValue::Custom(CustomValue::Opaque(_)) => Err(Error::UnsupportedCustomValue),
    }
}

/// Convert a document primitive back into a query value.
pub fn from_primitive(primitive: &Bson) -> Option<QueryValue> {
    match primitive {
        Bson::Null => Some(QueryValue::Null),
        Bson::Array(items) => items
            .iter()
            .map(from_primitive)
            .collect::<Option<Vec<_>>>()
            .map(QueryValue::Array),
        Bson::Document(document) => document
            .iter()
            .map(|(key, value)| from_primitive(value).map(|value| (key.clone(), value)))
            .collect::<Option<_>>()
            .map(QueryValue::Dictionary),
        other => decode_primitive(other).map(QueryValue::Bind),
    }
}

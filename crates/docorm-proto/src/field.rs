//! Field keys and field paths.

use serde::{Deserialize, Serialize};

/// A single key segment as declared by a model.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldKey {
    /// The model's identity field.
    Id,
    /// A named field.
    Name(String),
    /// The synthetic key under which aggregate results are reported.
    Aggregate,
    /// A key formed by concatenating a prefix and another key (nested field groups).
    Prefix(Box<FieldKey>, Box<FieldKey>),
}

impl FieldKey {
    /// Create a named key.
    pub fn name(name: impl Into<String>) -> Self {
        FieldKey::Name(name.into())
    }

    /// Create a prefixed key.
    pub fn prefixed(prefix: FieldKey, key: FieldKey) -> Self {
        FieldKey::Prefix(Box::new(prefix), Box::new(key))
    }
}

impl From<&str> for FieldKey {
    fn from(name: &str) -> Self {
        FieldKey::Name(name.to_string())
    }
}

impl From<String> for FieldKey {
    fn from(name: String) -> Self {
        FieldKey::Name(name)
    }
}

/// A reference to a field of some collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Field {
    /// Key path into a document of `schema`.
    Path {
        /// Ordered key segments; more than one segment addresses a nested document.
        path: Vec<FieldKey>,
        /// Owning collection (or join alias).
        schema: String,
    },
    /// Key path qualified by a database namespace.
    Extended {
        path: Vec<FieldKey>,
        schema: String,
        /// Database namespace. Only `None` can be addressed after a join.
        space: Option<String>,
    },
    /// A driver-specific field expression.
    Custom(String),
}

impl Field {
    /// Create a single-key field path.
    pub fn path(key: impl Into<FieldKey>, schema: impl Into<String>) -> Self {
        Field::Path {
            path: vec![key.into()],
            schema: schema.into(),
        }
    }

    /// Create a path of several keys into a nested document.
    pub fn nested(path: Vec<FieldKey>, schema: impl Into<String>) -> Self {
        Field::Path {
            path,
            schema: schema.into(),
        }
    }

    /// The identity field of `schema`.
    pub fn id(schema: impl Into<String>) -> Self {
        Field::Path {
            path: vec![FieldKey::Id],
            schema: schema.into(),
        }
    }

    /// Owning schema, when the field names one.
    pub fn schema(&self) -> Option<&str> {
        match self {
            Field::Path { schema, .. } | Field::Extended { schema, .. } => Some(schema),
            Field::Custom(_) => None,
        }
    }
}

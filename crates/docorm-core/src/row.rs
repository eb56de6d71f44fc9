//! Result rows handed to the ORM.

use std::sync::Arc;

use bson::{Bson, Document};
use docorm_proto::{Field, FieldKey};
use serde::de::DeserializeOwned;

use crate::compile::{resolve_path, AliasTable};
use crate::error::Error;
use crate::store::eval::lookup;

/// One row of a query result.
///
/// Field lookups go through the owning schema: the row's narrowed schema when set, else
/// the schema named by the field. Absent fields read as null.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultRow {
    /// A document read from one collection, nested under the collection name.
    Document {
        document: Document,
        schema: Option<String>,
    },
    /// A document produced by a join pipeline, read through the pipeline's alias table.
    Joined {
        document: Document,
        aliases: Arc<AliasTable>,
        schema: Option<String>,
    },
    /// The single value of an aggregate or a write acknowledgement.
    Aggregate(Bson),
}

impl ResultRow {
    /// Wrap a plain collection document under its collection name.
    pub fn document(schema: &str, document: Document) -> Self {
        let mut wrapped = Document::new();
        wrapped.insert(schema, document);
        ResultRow::Document {
            document: wrapped,
            schema: None,
        }
    }

    pub fn joined(document: Document, aliases: Arc<AliasTable>) -> Self {
        ResultRow::Joined {
            document,
            aliases,
            schema: None,
        }
    }

    pub fn aggregate(value: impl Into<Bson>) -> Self {
        ResultRow::Aggregate(value.into())
    }

    /// Read subsequent fields through `schema` rather than each field's own schema.
    pub fn narrow_to_schema(self, schema: impl Into<String>) -> Self {
        let narrowed = Some(schema.into());
        match self {
            ResultRow::Document { document, .. } => ResultRow::Document {
                document,
                schema: narrowed,
            },
            ResultRow::Joined {
                document, aliases, ..
            } => ResultRow::Joined {
                document,
                aliases,
                schema: narrowed,
            },
            aggregate @ ResultRow::Aggregate(_) => aggregate,
        }
    }

    /// Whether the row carries a value for `field`.
    pub fn contains(&self, field: &Field) -> bool {
        match self {
            ResultRow::Aggregate(_) => is_aggregate_marker(field),
            _ => matches!(self.locate(field), Ok(Some(_))),
        }
    }

    /// Raw value of `field`, null when absent. Aggregate rows return their value for any field.
    pub fn value(&self, field: &Field) -> Result<Bson, Error> {
        match self {
            ResultRow::Aggregate(value) => Ok(value.clone()),
            _ => Ok(self.locate(field)?.unwrap_or(Bson::Null)),
        }
    }

    /// Decode `field` into `T`.
    pub fn decode<T: DeserializeOwned>(&self, field: &Field) -> Result<T, Error> {
        Ok(bson::from_bson(self.value(field)?)?)
    }

    fn locate(&self, field: &Field) -> Result<Option<Bson>, Error> {
        let path = resolve_path(field)?;
        match self {
            ResultRow::Document { document, schema } => {
                let schema = owning_schema(schema, field)?;
                Ok(nested(document, schema, &path))
            }
            ResultRow::Joined {
                document,
                aliases,
                schema,
            } => {
                let schema = owning_schema(schema, field)?;
                let key = aliases
                    .get(schema)
                    .map_or(schema, |joined| joined.key.as_str());
                Ok(nested(document, key, &path))
            }
            ResultRow::Aggregate(value) => Ok(Some(value.clone())),
        }
    }
}

fn owning_schema<'a>(narrowed: &'a Option<String>, field: &'a Field) -> Result<&'a str, Error> {
    narrowed
        .as_deref()
        .or_else(|| field.schema())
        .ok_or(Error::UnsupportedField)
}

/// Value at `path` inside the top-level `key`. A lookup array reads its first match.
fn nested(document: &Document, key: &str, path: &str) -> Option<Bson> {
    match document.get(key)? {
        Bson::Document(inner) => lookup(inner, path),
        Bson::Array(matches) => match matches.first()? {
            Bson::Document(first) => lookup(first, path),
            _ => None,
        },
        _ => None,
    }
}

fn is_aggregate_marker(field: &Field) -> bool {
    match field {
        Field::Path { path, .. } | Field::Extended { path, .. } => {
            path.as_slice() == [FieldKey::Aggregate]
        }
        Field::Custom(_) => false,
    }
}

//! Translation of query descriptors into document-store artifacts.
//!
//! Everything in this module is synchronous and side-effect free: a query that cannot be
//! translated fails here, before any command is sent to the store.

pub mod field;
pub mod filter;
pub mod pipeline;
pub mod sort;
pub mod value;

use bson::Document;
use docorm_proto::{Field, Limit, QueryValue};

use crate::error::Error;

pub use field::{resolve, resolve_key, resolve_path, resolve_projected_path, ID_KEY};
pub use filter::{compile_filter, compile_filters, filter_operator};
pub use pipeline::{compile_pipeline, AliasTable, JoinPipeline, JoinedSchema};
pub use sort::{compile_sorts, SortOrder, SortSpec};
pub use value::{decode_primitive, encode_primitive, from_primitive, to_primitive};

/// Read the first limit (or offset) of a query.
pub fn limit_count(limits: &[Limit]) -> Result<Option<u64>, Error> {
    match limits.first() {
        Some(Limit::Count(count)) => Ok(Some(*count)),
        Some(Limit::Custom(_)) => Err(Error::UnsupportedCustomLimit),
        None => Ok(None),
    }
}

/// Build one document per input row, keyed by the query's fields.
///
/// The identity key, when present, is always the first key of the document.
pub fn compile_value_documents(
    fields: &[Field],
    input: &[Vec<QueryValue>],
) -> Result<Vec<Document>, Error> {
    let keys = fields.iter().map(resolve_path).collect::<Result<Vec<_>, _>>()?;

    input
        .iter()
        .map(|row| {
            if row.len() != keys.len() {
                return Err(Error::RowShapeMismatch {
                    expected: keys.len(),
                    actual: row.len(),
                });
            }

            let mut document = Document::new();
            if let Some(index) = keys.iter().position(|key| key == ID_KEY) {
                document.insert(ID_KEY, to_primitive(&row[index])?);
            }
            for (key, value) in keys.iter().zip(row) {
                if key != ID_KEY {
                    document.insert(key.clone(), to_primitive(value)?);
                }
            }
            Ok(document)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use bson::doc;
    use docorm_proto::Field;

    use super::*;

    #[test]
    fn test_limit_count() {
        assert_eq!(limit_count(&[]).unwrap(), None);
        assert_eq!(limit_count(&[Limit::Count(3), Limit::Count(9)]).unwrap(), Some(3));
        assert!(matches!(
            limit_count(&[Limit::Custom("TOP".into())]),
            Err(Error::UnsupportedCustomLimit)
        ));
    }

    #[test]
    fn test_identity_key_first() {
        let fields = vec![
            Field::path("name", "users"),
            Field::path("age", "users"),
            Field::id("users"),
        ];
        let input = vec![vec![
            QueryValue::bind("alice"),
            QueryValue::bind(30),
            QueryValue::bind(1),
        ]];

        let documents = compile_value_documents(&fields, &input).unwrap();
        assert_eq!(documents, vec![doc! { "_id": 1, "name": "alice", "age": 30 }]);
        let keys: Vec<&str> = documents[0].keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["_id", "name", "age"]);
    }

    #[test]
    fn test_row_shape_mismatch() {
        let fields = vec![Field::path("name", "users")];
        let input = vec![vec![QueryValue::bind("alice"), QueryValue::bind(30)]];
        assert!(matches!(
            compile_value_documents(&fields, &input),
            Err(Error::RowShapeMismatch {
                expected: 1,
                actual: 2
            })
        ));
    }
}

//! Field key to document path resolution.

use docorm_proto::{Field, FieldKey};

use crate::error::Error;

/// Key of the identity field in every document.
pub const ID_KEY: &str = "_id";

/// Resolve a single key segment to its document key.
pub fn resolve_key(key: &FieldKey) -> Result<String, Error> {
    match key {
        FieldKey::Id => Ok(ID_KEY.to_string()),
        FieldKey::Name(name) => Ok(name.clone()),
        FieldKey::Prefix(prefix, key) => Ok(resolve_key(prefix)? + &resolve_key(key)?),
        FieldKey::Aggregate => Err(Error::UnsupportedField),
    }
}

fn join_keys(path: &[FieldKey]) -> Result<String, Error> {
    let keys = path.iter().map(resolve_key).collect::<Result<Vec<_>, _>>()?;
    Ok(keys.join("."))
}

/// Dotted path of `field` inside a document of its own collection.
pub fn resolve_path(field: &Field) -> Result<String, Error> {
    match field {
        Field::Path { path, .. } | Field::Extended { path, .. } => join_keys(path),
        Field::Custom(_) => Err(Error::UnsupportedField),
    }
}

/// Path of `field` in a root-wrapped document, qualified by its owning schema.
///
/// Used once several collections share a result document (joins, aggregation pipelines).
pub fn resolve_projected_path(field: &Field) -> Result<String, Error> {
    match field {
        Field::Path { path, schema }
        | Field::Extended {
            path,
            schema,
            space: None,
        } => Ok(format!("{}.{}", schema, join_keys(path)?)),
        Field::Extended { .. } | Field::Custom(_) => Err(Error::UnsupportedField),
    }
}

/// Resolve `field` plainly, or qualified when compiling for an aggregation pipeline.
pub fn resolve(field: &Field, aggregate: bool) -> Result<String, Error> {
    if aggregate {
        resolve_projected_path(field)
    } else {
        resolve_path(field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_key() {
        assert_eq!(resolve_key(&FieldKey::Id).unwrap(), "_id");
        assert_eq!(resolve_key(&FieldKey::name("name")).unwrap(), "name");
        assert_eq!(
            resolve_key(&FieldKey::prefixed(
                FieldKey::name("address_"),
                FieldKey::name("city")
            ))
            .unwrap(),
            "address_city"
        );
        assert!(matches!(
            resolve_key(&FieldKey::Aggregate),
            Err(Error::UnsupportedField)
        ));
    }

    #[test]
    fn test_resolve_nested_path() {
        let field = Field::nested(
            vec![FieldKey::name("address"), FieldKey::name("city")],
            "users",
        );
        assert_eq!(resolve_path(&field).unwrap(), "address.city");
        assert_eq!(resolve_projected_path(&field).unwrap(), "users.address.city");
    }

    #[test]
    fn test_resolve_projected_id() {
        assert_eq!(resolve_projected_path(&Field::id("users")).unwrap(), "users._id");
        assert_eq!(resolve(&Field::id("users"), false).unwrap(), "_id");
    }

    #[test]
    fn test_namespaced_field_is_not_projectable() {
        let field = Field::Extended {
            path: vec![FieldKey::name("name")],
            schema: "users".into(),
            space: Some("archive".into()),
        };
        assert_eq!(resolve_path(&field).unwrap(), "name");
        assert!(matches!(
            resolve_projected_path(&field),
            Err(Error::UnsupportedField)
        ));
    }

    #[test]
    fn test_custom_field_rejected() {
        let field = Field::Custom("$where".into());
        assert!(matches!(resolve_path(&field), Err(Error::UnsupportedField)));
        assert!(matches!(
            resolve_projected_path(&field),
            Err(Error::UnsupportedField)
        ));
    }
}

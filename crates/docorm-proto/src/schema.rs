//! Schema operations.
//!
//! Document collections have no declared columns, so of a schema migration only the
//! constraints (unique indexes) and collection drops have an effect.

use serde::{Deserialize, Serialize};

use crate::field::FieldKey;

/// What a schema operation does to its collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchemaAction {
    Create,
    Update,
    Delete,
}

/// A field named by a constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldName {
    Key(FieldKey),
    Custom(String),
}

impl From<&str> for FieldName {
    fn from(name: &str) -> Self {
        FieldName::Key(FieldKey::name(name))
    }
}

/// Kind of constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConstraintAlgorithm {
    Unique(Vec<FieldName>),
    CompositeIdentifier(Vec<FieldName>),
    ForeignKey {
        fields: Vec<FieldName>,
        foreign_schema: String,
        foreign_fields: Vec<FieldName>,
    },
    Custom(String),
}

/// A constraint to create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchemaConstraint {
    Constraint {
        algorithm: ConstraintAlgorithm,
        name: Option<String>,
    },
    Custom(String),
}

impl SchemaConstraint {
    /// Unique constraint over `fields`.
    pub fn unique(fields: Vec<FieldName>) -> Self {
        SchemaConstraint::Constraint {
            algorithm: ConstraintAlgorithm::Unique(fields),
            name: None,
        }
    }

    /// Give the constraint a name.
    pub fn named(self, name: impl Into<String>) -> Self {
        match self {
            SchemaConstraint::Constraint { algorithm, .. } => SchemaConstraint::Constraint {
                algorithm,
                name: Some(name.into()),
            },
            custom @ SchemaConstraint::Custom(_) => custom,
        }
    }
}

/// A schema operation against one collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSchema {
    pub action: SchemaAction,
    pub schema: String,
    pub create_constraints: Vec<SchemaConstraint>,
}

impl DatabaseSchema {
    /// Create a schema operation.
    pub fn new(action: SchemaAction, schema: impl Into<String>) -> Self {
        Self {
            action,
            schema: schema.into(),
            create_constraints: vec![],
        }
    }

    /// Add a constraint to create.
    pub fn with_constraint(mut self, constraint: SchemaConstraint) -> Self {
        self.create_constraints.push(constraint);
        self
    }
}

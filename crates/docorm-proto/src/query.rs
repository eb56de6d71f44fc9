//! Query descriptor types.
//!
//! A [`DatabaseQuery`] is what the ORM hands to a driver: the action to run against one
//! collection plus everything needed to select, order, join and shape the documents.

use bson::Document;
use serde::{Deserialize, Serialize};

use crate::field::Field;
use crate::value::{QueryValue, Value};

/// Comparison method of a filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterMethod {
    /// `==`, or `!=` when inverted.
    Equality { inverse: bool },
    /// `>` / `>=` / `<` / `<=`: `inverse` flips the direction, `equality` admits equal values.
    Order { inverse: bool, equality: bool },
    /// Membership in a set, or exclusion when inverted.
    Subset { inverse: bool },
    /// String containment at the given location.
    Contains {
        inverse: bool,
        location: ContainsLocation,
    },
    /// A driver-specific operator.
    Custom(String),
}

impl FilterMethod {
    pub const EQUAL: FilterMethod = FilterMethod::Equality { inverse: false };
    pub const NOT_EQUAL: FilterMethod = FilterMethod::Equality { inverse: true };
    pub const GREATER_THAN: FilterMethod = FilterMethod::Order {
        inverse: false,
        equality: false,
    };
    pub const GREATER_THAN_OR_EQUAL: FilterMethod = FilterMethod::Order {
        inverse: false,
        equality: true,
    };
    pub const LESS_THAN: FilterMethod = FilterMethod::Order {
        inverse: true,
        equality: false,
    };
    pub const LESS_THAN_OR_EQUAL: FilterMethod = FilterMethod::Order {
        inverse: true,
        equality: true,
    };
}

/// Where a substring has to occur for a contains filter to match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContainsLocation {
    Anywhere,
    Prefix,
    Suffix,
}

/// How the members of a filter group combine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupRelation {
    And,
    Or,
    Custom(String),
}

/// A filter that was not built from the ORM's generic vocabulary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CustomFilter {
    /// A ready-made query document, passed through verbatim.
    Document(Document),
    /// A filter meant for some other backend.
    Opaque(String),
}

/// Predicate tree produced by the ORM's query builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Filter {
    /// Compare a field against a bound value.
    Value {
        field: Field,
        method: FilterMethod,
        value: QueryValue,
    },
    /// Compare two fields of the same document.
    Field {
        lhs: Field,
        method: FilterMethod,
        rhs: Field,
    },
    /// Combine sub-filters.
    Group {
        filters: Vec<Filter>,
        relation: GroupRelation,
    },
    /// Driver-specific filter.
    Custom(CustomFilter),
}

impl Filter {
    /// Create a value comparison.
    pub fn value(field: Field, method: FilterMethod, value: impl Into<QueryValue>) -> Self {
        Filter::Value {
            field,
            method,
            value: value.into(),
        }
    }

    /// Field equals value.
    pub fn eq(field: Field, value: impl Into<Value>) -> Self {
        Self::value(field, FilterMethod::EQUAL, QueryValue::bind(value))
    }

    /// Field not equal to value.
    pub fn ne(field: Field, value: impl Into<Value>) -> Self {
        Self::value(field, FilterMethod::NOT_EQUAL, QueryValue::bind(value))
    }

    /// Field greater than value.
    pub fn gt(field: Field, value: impl Into<Value>) -> Self {
        Self::value(field, FilterMethod::GREATER_THAN, QueryValue::bind(value))
    }

    /// Field greater than or equal to value.
    pub fn gte(field: Field, value: impl Into<Value>) -> Self {
        Self::value(field, FilterMethod::GREATER_THAN_OR_EQUAL, QueryValue::bind(value))
    }

    /// Field less than value.
    pub fn lt(field: Field, value: impl Into<Value>) -> Self {
        Self::value(field, FilterMethod::LESS_THAN, QueryValue::bind(value))
    }

    /// Field less than or equal to value.
    pub fn lte(field: Field, value: impl Into<Value>) -> Self {
        Self::value(field, FilterMethod::LESS_THAN_OR_EQUAL, QueryValue::bind(value))
    }

    /// Field is one of the values.
    pub fn in_values<T: Into<Value>>(field: Field, values: impl IntoIterator<Item = T>) -> Self {
        Self::value(field, FilterMethod::Subset { inverse: false }, QueryValue::array(values))
    }

    /// Field is none of the values.
    pub fn not_in_values<T: Into<Value>>(
        field: Field,
        values: impl IntoIterator<Item = T>,
    ) -> Self {
        Self::value(field, FilterMethod::Subset { inverse: true }, QueryValue::array(values))
    }

    /// String field contains `needle` at `location`.
    pub fn contains(field: Field, location: ContainsLocation, needle: impl Into<String>) -> Self {
        Self::value(
            field,
            FilterMethod::Contains {
                inverse: false,
                location,
            },
            QueryValue::Bind(Value::String(needle.into())),
        )
    }

    /// Compare two fields.
    pub fn fields(lhs: Field, method: FilterMethod, rhs: Field) -> Self {
        Filter::Field { lhs, method, rhs }
    }

    /// All filters must match.
    pub fn and(filters: Vec<Filter>) -> Self {
        Filter::Group {
            filters,
            relation: GroupRelation::And,
        }
    }

    /// At least one filter must match.
    pub fn or(filters: Vec<Filter>) -> Self {
        Filter::Group {
            filters,
            relation: GroupRelation::Or,
        }
    }

    /// Pass a query document through as-is.
    pub fn raw(document: Document) -> Self {
        Filter::Custom(CustomFilter::Document(document))
    }
}

/// Sort direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SortDirection {
    Ascending,
    Descending,
    /// A driver-specific direction. Only native sort orders (`1` / `-1`) are understood.
    Custom(bson::Bson),
}

/// One sort key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Sort {
    Sort { field: Field, direction: SortDirection },
    Custom(String),
}

impl Sort {
    /// Ascending order on `field`.
    pub fn ascending(field: Field) -> Self {
        Sort::Sort {
            field,
            direction: SortDirection::Ascending,
        }
    }

    /// Descending order on `field`.
    pub fn descending(field: Field) -> Self {
        Sort::Sort {
            field,
            direction: SortDirection::Descending,
        }
    }
}

/// Join flavour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinMethod {
    Inner,
    Left,
    Custom(String),
}

/// A join against a foreign collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Join {
    /// Single equality join: `foreign == local`.
    Join {
        schema: String,
        alias: Option<String>,
        method: JoinMethod,
        foreign: Field,
        local: Field,
    },
    /// Join on arbitrary conditions. Only a single field-to-field equality is supported.
    Advanced {
        schema: String,
        alias: Option<String>,
        method: JoinMethod,
        conditions: Vec<Filter>,
    },
    Custom(String),
}

impl Join {
    /// Inner equality join.
    pub fn inner(schema: impl Into<String>, foreign: Field, local: Field) -> Self {
        Join::Join {
            schema: schema.into(),
            alias: None,
            method: JoinMethod::Inner,
            foreign,
            local,
        }
    }

    /// Left equality join.
    pub fn left(schema: impl Into<String>, foreign: Field, local: Field) -> Self {
        Join::Join {
            schema: schema.into(),
            alias: None,
            method: JoinMethod::Left,
            foreign,
            local,
        }
    }

    /// Set the alias under which the joined documents appear.
    pub fn with_alias(self, name: impl Into<String>) -> Self {
        match self {
            Join::Join {
                schema,
                method,
                foreign,
                local,
                ..
            } => Join::Join {
                schema,
                alias: Some(name.into()),
                method,
                foreign,
                local,
            },
            Join::Advanced {
                schema,
                method,
                conditions,
                ..
            } => Join::Advanced {
                schema,
                alias: Some(name.into()),
                method,
                conditions,
            },
            custom @ Join::Custom(_) => custom,
        }
    }
}

/// Row limit or offset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Limit {
    Count(u64),
    Custom(String),
}

/// Aggregate function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregateMethod {
    Count,
    Sum,
    Average,
    Minimum,
    Maximum,
    Custom(String),
}

/// Aggregate requested by an aggregate action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Aggregate {
    Field { field: Field, method: AggregateMethod },
    Custom(String),
}

impl Aggregate {
    /// Aggregate `method` over `field`.
    pub fn field(field: Field, method: AggregateMethod) -> Self {
        Aggregate::Field { field, method }
    }
}

/// What a query does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryAction {
    Create,
    Read,
    Update,
    Delete,
    Aggregate(Aggregate),
    Custom(String),
}

/// Complete description of one query against one collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseQuery {
    /// Target collection.
    pub schema: String,
    pub action: QueryAction,
    /// Projected fields; for create/update, the keys the input rows are aligned to.
    pub fields: Vec<Field>,
    /// Top-level filters, implicitly AND-combined.
    pub filters: Vec<Filter>,
    /// Input rows for create/update, one value per entry of `fields`.
    pub input: Vec<Vec<QueryValue>>,
    pub joins: Vec<Join>,
    pub sorts: Vec<Sort>,
    /// Only the first entry is honoured.
    pub limits: Vec<Limit>,
    /// Only the first entry is honoured.
    pub offsets: Vec<Limit>,
}

impl DatabaseQuery {
    /// Create a query of `action` against `schema`.
    pub fn new(schema: impl Into<String>, action: QueryAction) -> Self {
        Self {
            schema: schema.into(),
            action,
            fields: vec![],
            filters: vec![],
            input: vec![],
            joins: vec![],
            sorts: vec![],
            limits: vec![],
            offsets: vec![],
        }
    }

    /// Create a read query.
    pub fn read(schema: impl Into<String>) -> Self {
        Self::new(schema, QueryAction::Read)
    }

    /// Create an insert query.
    pub fn create(schema: impl Into<String>) -> Self {
        Self::new(schema, QueryAction::Create)
    }

    /// Create an update query.
    pub fn update(schema: impl Into<String>) -> Self {
        Self::new(schema, QueryAction::Update)
    }

    /// Create a delete query.
    pub fn delete(schema: impl Into<String>) -> Self {
        Self::new(schema, QueryAction::Delete)
    }

    /// Create an aggregate query.
    pub fn aggregate(schema: impl Into<String>, aggregate: Aggregate) -> Self {
        Self::new(schema, QueryAction::Aggregate(aggregate))
    }

    /// Add a projected field.
    pub fn with_field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Set the projected fields.
    pub fn with_fields(mut self, fields: Vec<Field>) -> Self {
        self.fields = fields;
        self
    }

    /// Add a filter.
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Add an input row.
    pub fn with_input(mut self, row: Vec<QueryValue>) -> Self {
        self.input.push(row);
        self
    }

    /// Add a join.
    pub fn with_join(mut self, join: Join) -> Self {
        self.joins.push(join);
        self
    }

    /// Add a sort key.
    pub fn with_sort(mut self, sort: Sort) -> Self {
        self.sorts.push(sort);
        self
    }

    /// Limit the number of rows.
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limits.push(Limit::Count(limit));
        self
    }

    /// Skip rows.
    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offsets.push(Limit::Count(offset));
        self
    }
}

//! docorm query descriptor types.
//!
//! This crate defines the store-independent description of a query as produced by an
//! ORM's query builder: which collection is addressed, which action runs, and the
//! filters, sorts, joins, limits and input rows that go with it. The compilers in
//! `docorm-core` translate these descriptors into document-store commands.
//!
//! # Modules
//!
//! - [`value`] - Bound values and scalar primitives
//! - [`field`] - Field keys and field paths
//! - [`query`] - Filters, sorts, joins, aggregates and the query descriptor
//! - [`schema`] - Schema operations (index constraints, collection drops)
//!
//! # Example
//!
//! ```
//! use docorm_proto::{DatabaseQuery, Field, Filter, Sort};
//!
//! let query = DatabaseQuery::read("users")
//!     .with_filter(Filter::gte(Field::path("age", "users"), 18))
//!     .with_filter(Filter::eq(Field::path("active", "users"), true))
//!     .with_sort(Sort::ascending(Field::path("name", "users")))
//!     .with_limit(10)
//!     .with_offset(5);
//!
//! assert_eq!(query.filters.len(), 2);
//! ```

pub mod field;
pub mod query;
pub mod schema;
pub mod value;

pub use field::{Field, FieldKey};
pub use query::{
    Aggregate, AggregateMethod, ContainsLocation, CustomFilter, DatabaseQuery, Filter,
    FilterMethod, GroupRelation, Join, JoinMethod, Limit, QueryAction, Sort, SortDirection,
};
pub use schema::{ConstraintAlgorithm, DatabaseSchema, FieldName, SchemaAction, SchemaConstraint};
pub use value::{CustomValue, QueryValue, Value};

/// Re-export of the document model used by custom passthrough values.
pub use bson;

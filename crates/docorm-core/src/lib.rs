//! docorm core - query compilation and execution against document stores.
//!
//! Translates ORM query descriptors ([`docorm_proto`]) into document-store commands:
//! query documents for filters, sort documents, aggregation pipelines emulating joins,
//! and the write, count and index commands. The compiled commands run against any
//! [`DocumentStore`]; results come back as [`ResultRow`]s.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use docorm_core::{DocumentDatabase, MemoryStore};
//! use docorm_core::proto::{DatabaseQuery, Field, Filter, QueryValue};
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let database = DocumentDatabase::new(Arc::new(MemoryStore::new()));
//!
//! let create = DatabaseQuery::create("users")
//!     .with_field(Field::path("name", "users"))
//!     .with_input(vec![QueryValue::bind("alice")]);
//! database.query(&create).await.unwrap();
//!
//! let read = DatabaseQuery::read("users")
//!     .with_filter(Filter::eq(Field::path("name", "users"), "alice"));
//! let rows = database.query(&read).await.unwrap();
//! let name: String = rows[0].decode(&Field::path("name", "users")).unwrap();
//! assert_eq!(name, "alice");
//! # });
//! ```

pub mod compile;
pub mod database;
pub mod error;
pub mod executor;
pub mod row;
pub mod store;

pub use compile::{AliasTable, JoinPipeline, JoinedSchema, SortOrder, SortSpec};
pub use database::{require_store, Database, DocumentDatabase, TransactionState};
pub use error::Error;
pub use executor::{
    compile_query, compile_schema, CompiledQuery, Executor, SchemaCommand, DEFAULT_INDEX_NAME,
};
pub use row::ResultRow;
pub use store::{
    AggregateCommand, CountCommand, CreateIndexes, DeleteCommand, DeleteLimit, DeleteReply,
    DocumentStore, FindCommand, IndexModel, InsertCommand, InsertReply, MemoryStore,
    MemoryStoreError, StoreOperation, StoreTransaction, TransactionControl, UpdateCommand,
    UpdateReply, UpdateStatement,
};

/// Re-export protocol types.
pub use docorm_proto as proto;

//! The document-store client seam.
//!
//! [`DocumentStore`] is everything the executor needs from a database client: cursors
//! for find and aggregate, the write commands, index creation, collection drops and
//! session-bound transactions. Commands are plain data so that every backend (and
//! every test) sees exactly what the compiler produced.

pub(crate) mod eval;
mod memory;

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use bson::{doc, Document};

use crate::error::Error;

pub use memory::{MemoryStore, MemoryStoreError, StoreOperation};

/// Find documents in one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct FindCommand {
    pub collection: String,
    pub filter: Document,
    pub sort: Option<Document>,
    pub skip: Option<u64>,
    pub limit: Option<u64>,
}

impl FindCommand {
    /// Find everything matching `filter`.
    pub fn new(collection: impl Into<String>, filter: Document) -> Self {
        Self {
            collection: collection.into(),
            filter,
            sort: None,
            skip: None,
            limit: None,
        }
    }
}

/// Run an aggregation pipeline over one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateCommand {
    pub collection: String,
    pub pipeline: Vec<Document>,
}

/// Insert documents in bulk.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertCommand {
    pub collection: String,
    pub documents: Vec<Document>,
}

/// One statement of an update command.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStatement {
    pub filter: Document,
    pub update: Document,
    /// Update every matching document rather than the first one.
    pub multi: bool,
}

/// Update documents, one or more statements per round trip.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateCommand {
    pub collection: String,
    pub updates: Vec<UpdateStatement>,
}

impl UpdateCommand {
    /// Command document as sent to the server.
    pub fn to_command(&self) -> Document {
        let updates: Vec<Document> = self
            .updates
            .iter()
            .map(|statement| {
                doc! {
                    "q": statement.filter.clone(),
                    "u": statement.update.clone(),
                    "multi": statement.multi,
                }
            })
            .collect();
        doc! { "update": self.collection.clone(), "updates": updates }
    }
}

/// How many matching documents a delete removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteLimit {
    One,
    All,
}

/// Delete documents matching a filter.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteCommand {
    pub collection: String,
    pub filter: Document,
    pub limit: DeleteLimit,
}

impl DeleteCommand {
    /// Command document as sent to the server.
    pub fn to_command(&self) -> Document {
        let limit = match self.limit {
            DeleteLimit::One => 1,
            DeleteLimit::All => 0,
        };
        doc! {
            "delete": self.collection.clone(),
            "deletes": [{ "q": self.filter.clone(), "limit": limit }],
        }
    }
}

/// Count documents matching a filter on the server.
#[derive(Debug, Clone, PartialEq)]
pub struct CountCommand {
    pub collection: String,
    pub filter: Document,
}

impl CountCommand {
    /// Command document as sent to the server.
    pub fn to_command(&self) -> Document {
        doc! { "count": self.collection.clone(), "query": self.filter.clone() }
    }
}

/// Index definition.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexModel {
    pub name: String,
    /// Ordered `{key: 1 | -1}` document.
    pub keys: Document,
    pub unique: bool,
}

/// Create indexes on one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateIndexes {
    pub collection: String,
    pub indexes: Vec<IndexModel>,
}

impl CreateIndexes {
    /// Command document as sent to the server.
    pub fn to_command(&self) -> Document {
        let indexes: Vec<Document> = self
            .indexes
            .iter()
            .map(|index| {
                doc! {
                    "key": index.keys.clone(),
                    "name": index.name.clone(),
                    "unique": index.unique,
                }
            })
            .collect();
        doc! { "createIndexes": self.collection.clone(), "indexes": indexes }
    }
}

/// Acknowledgement of a bulk insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertReply {
    pub inserted: usize,
}

/// Acknowledgement of an update command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateReply {
    pub matched: u64,
    pub modified: u64,
}

/// Acknowledgement of a delete command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteReply {
    pub deleted: u64,
}

/// Database client used by the executor.
///
/// Streaming operations hand documents to `on_document` one at a time, in the order the
/// store produces them. An error may follow documents that were already delivered.
#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    /// Concrete store, for capabilities that only one backend offers.
    fn as_any(&self) -> &dyn Any;

    async fn find(
        &self,
        command: FindCommand,
        on_document: &mut (dyn FnMut(Document) + Send),
    ) -> Result<(), Error>;

    async fn aggregate(
        &self,
        command: AggregateCommand,
        on_document: &mut (dyn FnMut(Document) + Send),
    ) -> Result<(), Error>;

    async fn insert_many(&self, command: InsertCommand) -> Result<InsertReply, Error>;

    async fn update(&self, command: UpdateCommand) -> Result<UpdateReply, Error>;

    async fn delete(&self, command: DeleteCommand) -> Result<DeleteReply, Error>;

    async fn count(&self, command: CountCommand) -> Result<u64, Error>;

    async fn create_indexes(&self, command: CreateIndexes) -> Result<(), Error>;

    async fn drop_collection(&self, collection: &str) -> Result<(), Error>;

    /// Open a session with a multi-statement transaction in manual-commit mode.
    async fn start_transaction(&self) -> Result<StoreTransaction, Error>;
}

/// Commit and abort of a session-bound transaction.
#[async_trait]
pub trait TransactionControl: Send + Sync {
    async fn commit(&self) -> Result<(), Error>;

    async fn abort(&self) -> Result<(), Error>;
}

/// A started transaction: a store pinned to the session, and the session's controls.
pub struct StoreTransaction {
    pub store: Arc<dyn DocumentStore>,
    pub control: Box<dyn TransactionControl>,
}

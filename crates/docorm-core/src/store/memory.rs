//! In-memory document store.
//!
//! Evaluates compiled commands the way the document database would, for the operators
//! and stages the compilers emit. Every command is appended to an operation journal so
//! callers can inspect exactly what was submitted.
//!
//! Transactions work on a snapshot of all collections taken at start. Writes inside the
//! transaction only touch the snapshot; commit installs it wholesale, abort discards it.
//! There is no write-conflict detection between concurrent transactions.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bson::oid::ObjectId;
use bson::{Bson, Document};
use parking_lot::{Mutex, RwLock};
use thiserror::Error;

use super::eval::{
    lookup, matches, remove_path, run_pipeline, set_path, sort_documents, values_equal,
};
use super::{
    AggregateCommand, CountCommand, CreateIndexes, DeleteCommand, DeleteLimit, DeleteReply,
    DocumentStore, FindCommand, IndexModel, InsertCommand, InsertReply, StoreTransaction,
    TransactionControl, UpdateCommand, UpdateReply,
};
use crate::compile::ID_KEY;
use crate::error::Error;

/// Name of the implicit unique index on the identity key.
const ID_INDEX: &str = "_id_";

/// Failures raised by the in-memory store. Surfaced through [`Error::Client`].
#[derive(Debug, Error)]
pub enum MemoryStoreError {
    #[error("unknown operator: {0}")]
    UnknownOperator(String),

    #[error("invalid operand for {operator}")]
    InvalidOperand { operator: String },

    #[error("unsupported pipeline stage: {0}")]
    UnsupportedStage(String),

    #[error("invalid regular expression: {0}")]
    InvalidRegex(#[from] regex::Error),

    /// A write would duplicate a key of a unique index.
    #[error("duplicate key in {collection} index {index}: {key}")]
    DuplicateKey {
        collection: String,
        index: String,
        key: String,
    },

    /// An index with this name exists with a different definition.
    #[error("index {name} already exists with different options")]
    IndexConflict { name: String },

    #[error("transaction already in progress")]
    TransactionInProgress,

    #[error("transaction already committed or aborted")]
    TransactionFinished,
}

impl From<MemoryStoreError> for Error {
    fn from(error: MemoryStoreError) -> Self {
        Error::client(error)
    }
}

/// A command received by a [`MemoryStore`].
#[derive(Debug, Clone, PartialEq)]
pub enum StoreOperation {
    Find(FindCommand),
    Aggregate(AggregateCommand),
    Insert(InsertCommand),
    Update(UpdateCommand),
    Delete(DeleteCommand),
    Count(CountCommand),
    CreateIndexes(CreateIndexes),
    DropCollection(String),
    StartTransaction,
    CommitTransaction,
    AbortTransaction,
}

#[derive(Debug, Clone, Default)]
struct Collection {
    documents: Vec<Document>,
    indexes: Vec<IndexModel>,
}

impl Collection {
    fn index_key(index: &IndexModel, document: &Document) -> Vec<Bson> {
        index
            .keys
            .keys()
            .map(|key| lookup(document, key).unwrap_or(Bson::Null))
            .collect()
    }

    /// Check `document` against every unique index, ignoring the document at `skip`.
    fn check_unique(
        &self,
        name: &str,
        document: &Document,
        skip: Option<usize>,
    ) -> Result<(), MemoryStoreError> {
        if let Some(id) = document.get(ID_KEY) {
            let duplicate = self.documents.iter().enumerate().any(|(position, other)| {
                Some(position) != skip && other.get(ID_KEY).map_or(false, |o| values_equal(o, id))
            });
            if duplicate {
                return Err(MemoryStoreError::DuplicateKey {
                    collection: name.to_string(),
                    index: ID_INDEX.to_string(),
                    key: id.to_string(),
                });
            }
        }

        for index in self.indexes.iter().filter(|index| index.unique) {
            let key = Self::index_key(index, document);
            let duplicate = self.documents.iter().enumerate().any(|(position, other)| {
                Some(position) != skip
                    && Self::index_key(index, other)
                        .iter()
                        .zip(&key)
                        .all(|(a, b)| values_equal(a, b))
            });
            if duplicate {
                return Err(MemoryStoreError::DuplicateKey {
                    collection: name.to_string(),
                    index: index.name.clone(),
                    key: Bson::Array(key).to_string(),
                });
            }
        }
        Ok(())
    }
}

type Collections = HashMap<String, Collection>;

#[derive(Default)]
struct Shared {
    collections: RwLock<Collections>,
    journal: Mutex<Vec<StoreOperation>>,
}

/// Working copy of a transaction; `None` once committed or aborted.
type Snapshot = Arc<Mutex<Option<Collections>>>;

/// A [`DocumentStore`] kept entirely in memory.
#[derive(Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
    snapshot: Option<Snapshot>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every command received so far, including those of transaction-bound handles.
    pub fn operations(&self) -> Vec<StoreOperation> {
        self.shared.journal.lock().clone()
    }

    /// Committed documents of a collection, in insertion order.
    pub fn documents(&self, collection: &str) -> Vec<Document> {
        self.shared
            .collections
            .read()
            .get(collection)
            .map(|collection| collection.documents.clone())
            .unwrap_or_default()
    }

    /// Committed indexes of a collection.
    pub fn indexes(&self, collection: &str) -> Vec<IndexModel> {
        self.shared
            .collections
            .read()
            .get(collection)
            .map(|collection| collection.indexes.clone())
            .unwrap_or_default()
    }

    fn record(&self, operation: StoreOperation) {
        self.shared.journal.lock().push(operation);
    }

    /// Run `f` against the collections visible to this handle.
    fn with_collections<R>(
        &self,
        f: impl FnOnce(&mut Collections) -> Result<R, MemoryStoreError>,
    ) -> Result<R, Error> {
        let result = match &self.snapshot {
            None => f(&mut self.shared.collections.write()),
            Some(snapshot) => match snapshot.lock().as_mut() {
                Some(collections) => f(collections),
                None => Err(MemoryStoreError::TransactionFinished),
            },
        };
        Ok(result?)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn as_any(&self) -> &dyn Any {
        self
    }

    async fn find(
        &self,
        command: FindCommand,
        on_document: &mut (dyn FnMut(Document) + Send),
    ) -> Result<(), Error> {
        self.record(StoreOperation::Find(command.clone()));

        let documents = self.with_collections(|collections| {
            let mut found = Vec::new();
            if let Some(collection) = collections.get(&command.collection) {
                for document in &collection.documents {
                    if matches(&command.filter, document)? {
                        found.push(document.clone());
                    }
                }
            }
            if let Some(sort) = &command.sort {
                sort_documents(&mut found, sort)?;
            }
            let skip = command.skip.unwrap_or(0) as usize;
            let limit = command.limit.map_or(usize::MAX, |limit| limit as usize);
            Ok(found.into_iter().skip(skip).take(limit).collect::<Vec<_>>())
        })?;

        for document in documents {
            on_document(document);
        }
        Ok(())
    }

    async fn aggregate(
        &self,
        command: AggregateCommand,
        on_document: &mut (dyn FnMut(Document) + Send),
    ) -> Result<(), Error> {
        self.record(StoreOperation::Aggregate(command.clone()));

        let documents = self.with_collections(|collections| {
            let source = collections
                .get(&command.collection)
                .map(|collection| collection.documents.clone())
                .unwrap_or_default();
            run_pipeline(source, &command.pipeline, |name| {
                collections
                    .get(name)
                    .map(|collection| collection.documents.clone())
                    .unwrap_or_default()
            })
        })?;

        for document in documents {
            on_document(document);
        }
        Ok(())
    }

    async fn insert_many(&self, command: InsertCommand) -> Result<InsertReply, Error> {
        self.record(StoreOperation::Insert(command.clone()));

        self.with_collections(|collections| {
            let collection = collections.entry(command.collection.clone()).or_default();
            let mut inserted = 0;
            for document in command.documents {
                let document = if document.contains_key(ID_KEY) {
                    document
                } else {
                    let mut identified = Document::new();
                    identified.insert(ID_KEY, ObjectId::new());
                    for (key, value) in document {
                        identified.insert(key, value);
                    }
                    identified
                };
                collection.check_unique(&command.collection, &document, None)?;
                collection.documents.push(document);
                inserted += 1;
            }
            Ok(InsertReply { inserted })
        })
    }

    async fn update(&self, command: UpdateCommand) -> Result<UpdateReply, Error> {
        self.record(StoreOperation::Update(command.clone()));

        self.with_collections(|collections| {
            let mut reply = UpdateReply {
                matched: 0,
                modified: 0,
            };
            let Some(collection) = collections.get_mut(&command.collection) else {
                return Ok(reply);
            };

            for statement in &command.updates {
                let mut targets = Vec::new();
                for (position, document) in collection.documents.iter().enumerate() {
                    if matches(&statement.filter, document)? {
                        targets.push(position);
                        if !statement.multi {
                            break;
                        }
                    }
                }

                for position in targets {
                    let current = &collection.documents[position];
                    let updated = apply_update(current, &statement.update)?;
                    reply.matched += 1;
                    if &updated != current {
                        collection.check_unique(&command.collection, &updated, Some(position))?;
                        collection.documents[position] = updated;
                        reply.modified += 1;
                    }
                }
            }
            Ok(reply)
        })
    }

    async fn delete(&self, command: DeleteCommand) -> Result<DeleteReply, Error> {
        self.record(StoreOperation::Delete(command.clone()));

        self.with_collections(|collections| {
            let Some(collection) = collections.get_mut(&command.collection) else {
                return Ok(DeleteReply { deleted: 0 });
            };

            let mut doomed = Vec::new();
            for (position, document) in collection.documents.iter().enumerate() {
                if matches(&command.filter, document)? {
                    doomed.push(position);
                    if command.limit == DeleteLimit::One {
                        break;
                    }
                }
            }

            let mut position = 0;
            collection.documents.retain(|_| {
                let keep = !doomed.contains(&position);
                position += 1;
                keep
            });
            let deleted = doomed.len() as u64;
            Ok(DeleteReply { deleted })
        })
    }

    async fn count(&self, command: CountCommand) -> Result<u64, Error> {
        self.record(StoreOperation::Count(command.clone()));

        self.with_collections(|collections| {
            let mut count = 0;
            if let Some(collection) = collections.get(&command.collection) {
                for document in &collection.documents {
                    if matches(&command.filter, document)? {
                        count += 1;
                    }
                }
            }
            Ok(count)
        })
    }

    async fn create_indexes(&self, command: CreateIndexes) -> Result<(), Error> {
        self.record(StoreOperation::CreateIndexes(command.clone()));

        self.with_collections(|collections| {
            let collection = collections.entry(command.collection.clone()).or_default();
            for index in command.indexes {
                if let Some(existing) = collection.indexes.iter().find(|e| e.name == index.name) {
                    if existing.keys == index.keys && existing.unique == index.unique {
                        continue;
                    }
                    return Err(MemoryStoreError::IndexConflict { name: index.name });
                }

                let mut candidate = Collection {
                    documents: Vec::new(),
                    indexes: vec![index.clone()],
                };
                for document in &collection.documents {
                    candidate.check_unique(&command.collection, document, None)?;
                    candidate.documents.push(document.clone());
                }
                collection.indexes.push(index);
            }
            Ok(())
        })
    }

    async fn drop_collection(&self, collection: &str) -> Result<(), Error> {
        self.record(StoreOperation::DropCollection(collection.to_string()));

        self.with_collections(|collections| {
            collections.remove(collection);
            Ok(())
        })
    }

    async fn start_transaction(&self) -> Result<StoreTransaction, Error> {
        if self.snapshot.is_some() {
            return Err(MemoryStoreError::TransactionInProgress.into());
        }
        self.record(StoreOperation::StartTransaction);

        let snapshot: Snapshot = Arc::new(Mutex::new(Some(
            self.shared.collections.read().clone(),
        )));
        let store = MemoryStore {
            shared: self.shared.clone(),
            snapshot: Some(snapshot.clone()),
        };
        Ok(StoreTransaction {
            store: Arc::new(store),
            control: Box::new(MemoryTransaction {
                shared: self.shared.clone(),
                snapshot,
            }),
        })
    }
}

/// Apply an update document: `$set`/`$unset` operators, or a whole-document replacement.
fn apply_update(document: &Document, update: &Document) -> Result<Document, MemoryStoreError> {
    let is_operator = update.keys().next().map_or(false, |key| key.starts_with('$'));
    if !is_operator {
        let mut replaced = Document::new();
        if let Some(id) = document.get(ID_KEY) {
            replaced.insert(ID_KEY, id.clone());
        }
        for (key, value) in update {
            if key != ID_KEY {
                replaced.insert(key.clone(), value.clone());
            }
        }
        return Ok(replaced);
    }

    let mut updated = document.clone();
    for (operator, fields) in update {
        let fields = fields
            .as_document()
            .ok_or_else(|| MemoryStoreError::InvalidOperand {
                operator: operator.clone(),
            })?;
        match operator.as_str() {
            "$set" => {
                for (path, value) in fields {
                    set_path(&mut updated, path, value.clone());
                }
            }
            "$unset" => {
                for path in fields.keys() {
                    remove_path(&mut updated, path);
                }
            }
            other => return Err(MemoryStoreError::UnknownOperator(other.to_string())),
        }
    }
    Ok(updated)
}

struct MemoryTransaction {
    shared: Arc<Shared>,
    snapshot: Snapshot,
}

#[async_trait]
impl TransactionControl for MemoryTransaction {
    async fn commit(&self) -> Result<(), Error> {
        self.shared.journal.lock().push(StoreOperation::CommitTransaction);
        let committed = self
            .snapshot
            .lock()
            .take()
            .ok_or(MemoryStoreError::TransactionFinished)?;
        *self.shared.collections.write() = committed;
        Ok(())
    }

    async fn abort(&self) -> Result<(), Error> {
        self.shared.journal.lock().push(StoreOperation::AbortTransaction);
        self.snapshot
            .lock()
            .take()
            .ok_or(MemoryStoreError::TransactionFinished)?;
        Ok(())
    }
}

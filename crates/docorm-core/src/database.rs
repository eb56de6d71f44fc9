//! Database handles and transactions.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use docorm_proto::{DatabaseQuery, DatabaseSchema};
use tracing::warn;

use crate::error::Error;
use crate::executor::Executor;
use crate::row::ResultRow;
use crate::store::DocumentStore;

/// Whether a handle runs inside a store transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    NotInTransaction,
    InTransaction,
}

/// The database surface the ORM talks to.
#[async_trait]
pub trait Database: Send + Sync {
    /// Execute a query, handing each result row to `on_row`.
    async fn execute(
        &self,
        query: &DatabaseQuery,
        on_row: &mut (dyn FnMut(ResultRow) + Send),
    ) -> Result<(), Error>;

    /// Execute a schema operation.
    async fn execute_schema(&self, schema: &DatabaseSchema) -> Result<(), Error>;

    /// The store this handle runs against.
    fn store(&self) -> &dyn DocumentStore;

    fn in_transaction(&self) -> bool;
}

/// Borrow the concrete store behind `database`.
///
/// Fails with [`Error::NotMongoTarget`] when the handle is backed by another store type.
pub fn require_store<S: DocumentStore>(database: &dyn Database) -> Result<&S, Error> {
    database
        .store()
        .as_any()
        .downcast_ref::<S>()
        .ok_or(Error::NotMongoTarget)
}

/// A [`Database`] over any [`DocumentStore`].
#[derive(Clone)]
pub struct DocumentDatabase {
    store: Arc<dyn DocumentStore>,
    state: TransactionState,
}

impl DocumentDatabase {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            state: TransactionState::NotInTransaction,
        }
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Execute a query and collect its rows.
    pub async fn query(&self, query: &DatabaseQuery) -> Result<Vec<ResultRow>, Error> {
        let mut rows = Vec::new();
        Executor::new(self.store.as_ref())
            .execute(query, &mut |row: ResultRow| rows.push(row))
            .await?;
        Ok(rows)
    }

    /// Run `body` inside a store transaction.
    ///
    /// The body receives a handle bound to the transaction's session. Its value is returned
    /// once the transaction commits. When the body fails, the transaction is aborted and the
    /// body's error is returned; a failed abort is only logged. When the commit itself fails,
    /// an abort is attempted and the commit error is returned.
    ///
    /// Inside a transaction, `body` runs on the current handle; transactions do not nest.
    pub async fn transaction<F, Fut, T>(&self, body: F) -> Result<T, Error>
    where
        F: FnOnce(DocumentDatabase) -> Fut + Send,
        Fut: Future<Output = Result<T, Error>> + Send,
        T: Send,
    {
        if self.state == TransactionState::InTransaction {
            return body(self.clone()).await;
        }

        let transaction = self.store.start_transaction().await?;
        let handle = DocumentDatabase {
            store: transaction.store,
            state: TransactionState::InTransaction,
        };

        match body(handle).await {
            Ok(value) => match transaction.control.commit().await {
                Ok(()) => Ok(value),
                Err(error) => {
                    if let Err(abort) = transaction.control.abort().await {
                        warn!(error = %abort, "failed to abort transaction after commit failure");
                    }
                    Err(error)
                }
            },
            Err(error) => {
                if let Err(abort) = transaction.control.abort().await {
                    warn!(error = %abort, "failed to abort transaction");
                }
                Err(error)
            }
        }
    }

    /// Run `body` against this handle. There is no separate connection checkout.
    pub async fn with_connection<F, Fut, T>(&self, body: F) -> Result<T, Error>
    where
        F: FnOnce(DocumentDatabase) -> Fut + Send,
        Fut: Future<Output = Result<T, Error>> + Send,
    {
        body(self.clone()).await
    }
}

#[async_trait]
impl Database for DocumentDatabase {
    async fn execute(
        &self,
        query: &DatabaseQuery,
        on_row: &mut (dyn FnMut(ResultRow) + Send),
    ) -> Result<(), Error> {
        Executor::new(self.store.as_ref()).execute(query, on_row).await
    }

    async fn execute_schema(&self, schema: &DatabaseSchema) -> Result<(), Error> {
        Executor::new(self.store.as_ref())
            .execute_schema(schema)
            .await
    }

    fn store(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }

    fn in_transaction(&self) -> bool {
        self.state == TransactionState::InTransaction
    }
}

#[cfg(test)]
mod tests {
    use std::any::Any;

    use bson::Document;
    use docorm_proto::{Field, FieldKey, QueryValue};

    use super::*;
    use crate::store::{
        AggregateCommand, CountCommand, CreateIndexes, DeleteCommand, DeleteReply, FindCommand,
        InsertCommand, InsertReply, MemoryStore, StoreOperation, StoreTransaction,
        TransactionControl, UpdateCommand, UpdateReply,
    };

    fn setup() -> (MemoryStore, DocumentDatabase) {
        let store = MemoryStore::new();
        let database = DocumentDatabase::new(Arc::new(store.clone()));
        (store, database)
    }

    fn insert(name: &str) -> DatabaseQuery {
        DatabaseQuery::create("users")
            .with_field(Field::path("name", "users"))
            .with_input(vec![QueryValue::bind(name)])
    }

    #[tokio::test]
    async fn test_commit_returns_body_value() {
        let (store, database) = setup();

        let value = database
            .transaction(|tx| async move {
                assert!(tx.in_transaction());
                tx.query(&insert("alice")).await?;
                Ok(42)
            })
            .await
            .unwrap();

        assert_eq!(value, 42);
        assert_eq!(store.documents("users").len(), 1);
        assert!(store.operations().contains(&StoreOperation::CommitTransaction));
    }

    #[tokio::test]
    async fn test_body_error_aborts() {
        let (store, database) = setup();

        let result: Result<(), Error> = database
            .transaction(|tx| async move {
                tx.query(&insert("alice")).await?;
                Err(Error::UnsupportedJoin)
            })
            .await;

        assert!(matches!(result, Err(Error::UnsupportedJoin)));
        assert!(store.documents("users").is_empty());
        let operations = store.operations();
        assert!(operations.contains(&StoreOperation::AbortTransaction));
        assert!(!operations.contains(&StoreOperation::CommitTransaction));
    }

    #[tokio::test]
    async fn test_nested_transaction_flattens() {
        let (store, database) = setup();

        database
            .transaction(|outer| async move {
                outer
                    .transaction(|inner| async move {
                        assert_eq!(inner.state(), TransactionState::InTransaction);
                        inner.query(&insert("alice")).await?;
                        Ok(())
                    })
                    .await
            })
            .await
            .unwrap();

        let starts = store
            .operations()
            .iter()
            .filter(|operation| **operation == StoreOperation::StartTransaction)
            .count();
        assert_eq!(starts, 1);
        assert_eq!(store.documents("users").len(), 1);
    }

    #[tokio::test]
    async fn test_with_connection_uses_same_handle() {
        let (store, database) = setup();

        let rows = database
            .with_connection(|connection| async move {
                assert!(!connection.in_transaction());
                connection.query(&insert("alice")).await
            })
            .await
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(
            rows[0]
                .decode::<i64>(&Field::path(FieldKey::Aggregate, "users"))
                .unwrap(),
            1
        );
        assert_eq!(store.documents("users").len(), 1);
    }

    #[tokio::test]
    async fn test_require_store() {
        let (_, database) = setup();
        assert!(require_store::<MemoryStore>(&database).is_ok());
    }

    /// Transaction controls that fail on demand, delegating otherwise.
    struct FlakyControl {
        inner: Box<dyn TransactionControl>,
        fail_commit: bool,
        fail_abort: bool,
    }

    #[async_trait]
    impl TransactionControl for FlakyControl {
        async fn commit(&self) -> Result<(), Error> {
            if self.fail_commit {
                return Err(Error::NoTargetDatabaseSpecified);
            }
            self.inner.commit().await
        }

        async fn abort(&self) -> Result<(), Error> {
            self.inner.abort().await?;
            if self.fail_abort {
                return Err(Error::MissingHosts);
            }
            Ok(())
        }
    }

    /// Memory store whose transactions fail to commit or abort.
    struct FlakyStore {
        inner: MemoryStore,
        fail_commit: bool,
        fail_abort: bool,
    }

    #[async_trait]
    impl DocumentStore for FlakyStore {
        fn as_any(&self) -> &dyn Any {
            self
        }

        async fn find(
            &self,
            command: FindCommand,
            on_document: &mut (dyn FnMut(Document) + Send),
        ) -> Result<(), Error> {
            self.inner.find(command, on_document).await
        }

        async fn aggregate(
            &self,
            command: AggregateCommand,
            on_document: &mut (dyn FnMut(Document) + Send),
        ) -> Result<(), Error> {
            self.inner.aggregate(command, on_document).await
        }

        async fn insert_many(&self, command: InsertCommand) -> Result<InsertReply, Error> {
            self.inner.insert_many(command).await
        }

        async fn update(&self, command: UpdateCommand) -> Result<UpdateReply, Error> {
            self.inner.update(command).await
        }

        async fn delete(&self, command: DeleteCommand) -> Result<DeleteReply, Error> {
            self.inner.delete(command).await
        }

        async fn count(&self, command: CountCommand) -> Result<u64, Error> {
            self.inner.count(command).await
        }

        async fn create_indexes(&self, command: CreateIndexes) -> Result<(), Error> {
            self.inner.create_indexes(command).await
        }

        async fn drop_collection(&self, collection: &str) -> Result<(), Error> {
            self.inner.drop_collection(collection).await
        }

        async fn start_transaction(&self) -> Result<StoreTransaction, Error> {
            let transaction = self.inner.start_transaction().await?;
            Ok(StoreTransaction {
                store: transaction.store,
                control: Box::new(FlakyControl {
                    inner: transaction.control,
                    fail_commit: self.fail_commit,
                    fail_abort: self.fail_abort,
                }),
            })
        }
    }

    fn flaky(fail_commit: bool, fail_abort: bool) -> (MemoryStore, DocumentDatabase) {
        let store = MemoryStore::new();
        let database = DocumentDatabase::new(Arc::new(FlakyStore {
            inner: store.clone(),
            fail_commit,
            fail_abort,
        }));
        (store, database)
    }

    #[tokio::test]
    async fn test_failed_abort_keeps_body_error() {
        let (store, database) = flaky(false, true);

        let result: Result<(), Error> = database
            .transaction(|tx| async move {
                tx.query(&insert("alice")).await?;
                Err(Error::UnsupportedJoin)
            })
            .await;

        assert!(matches!(result, Err(Error::UnsupportedJoin)));
        assert!(store.documents("users").is_empty());
        assert_eq!(
            store.operations().last(),
            Some(&StoreOperation::AbortTransaction)
        );
    }

    #[tokio::test]
    async fn test_failed_commit_returns_commit_error() {
        let (store, database) = flaky(true, false);

        let result = database
            .transaction(|tx| async move {
                tx.query(&insert("alice")).await?;
                Ok(7)
            })
            .await;

        assert!(matches!(result, Err(Error::NoTargetDatabaseSpecified)));
        assert!(store.documents("users").is_empty());
        let operations = store.operations();
        assert!(operations.contains(&StoreOperation::AbortTransaction));
        assert!(!operations.contains(&StoreOperation::CommitTransaction));
    }

    #[tokio::test]
    async fn test_failed_commit_and_abort_returns_commit_error() {
        let (_, database) = flaky(true, true);

        let result = database
            .transaction(|tx| async move {
                tx.query(&insert("alice")).await?;
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(Error::NoTargetDatabaseSpecified)));
    }
}

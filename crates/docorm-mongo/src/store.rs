//! Document store backed by a MongoDB deployment.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use bson::{Bson, Document};
use docorm_core::{
    AggregateCommand, CountCommand, CreateIndexes, DeleteCommand, DeleteReply, DocumentStore,
    Error, FindCommand, InsertCommand, InsertReply, StoreTransaction, TransactionControl,
    UpdateCommand, UpdateReply,
};
use futures::TryStreamExt;
use mongodb::options::FindOptions;
use mongodb::{Client, ClientSession, Collection, Database};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::ConnectionSettings;
use crate::error::ReplyError;

/// A [`DocumentStore`] over one database of a MongoDB deployment.
///
/// A store returned by [`DocumentStore::start_transaction`] is pinned to the transaction's
/// session; every command it sends runs inside that transaction.
#[derive(Clone)]
pub struct MongoStore {
    client: Client,
    database: Database,
    session: Option<Arc<Mutex<ClientSession>>>,
}

impl MongoStore {
    /// Connect with the given settings.
    ///
    /// Fails with [`Error::MissingHosts`] or [`Error::NoTargetDatabaseSpecified`] before any
    /// client is built.
    pub async fn connect(settings: ConnectionSettings) -> Result<Self, Error> {
        let database = settings.validate()?.to_string();
        let client = Client::with_options(settings.client_options()).map_err(Error::client)?;
        info!(database = %database, hosts = settings.hosts.len(), "mongodb client ready");
        Ok(Self::from_client(client, &database))
    }

    /// Connect with a connection string naming the target database.
    pub async fn connect_to(connection_string: &str) -> Result<Self, Error> {
        Self::connect(ConnectionSettings::parse(connection_string).await?).await
    }

    /// Use an existing client.
    pub fn from_client(client: Client, database: &str) -> Self {
        let database = client.database(database);
        Self {
            client,
            database,
            session: None,
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// The database all collections live in.
    pub fn database(&self) -> &Database {
        &self.database
    }

    /// Whether commands run inside a transaction session.
    pub fn in_session(&self) -> bool {
        self.session.is_some()
    }

    fn collection(&self, name: &str) -> Collection<Document> {
        self.database.collection(name)
    }

    /// Run a write or admin command, surfacing errors reported in the reply body.
    async fn run_command(&self, command: Document) -> Result<Document, Error> {
        let reply = match &self.session {
            Some(session) => {
                let mut session = session.lock().await;
                self.database
                    .run_command(command)
                    .session(&mut *session)
                    .await
            }
            None => self.database.run_command(command).await,
        }
        .map_err(Error::client)?;

        check_reply(&reply)?;
        Ok(reply)
    }
}

fn check_reply(reply: &Document) -> Result<(), ReplyError> {
    if let Ok(errors) = reply.get_array("writeErrors") {
        if let Some(Bson::Document(error)) = errors.first() {
            return Err(ReplyError::Write {
                code: error.get_i32("code").unwrap_or_default(),
                message: error.get_str("errmsg").unwrap_or_default().to_string(),
            });
        }
    }
    if let Ok(error) = reply.get_document("writeConcernError") {
        return Err(ReplyError::WriteConcern {
            code: error.get_i32("code").unwrap_or_default(),
            message: error.get_str("errmsg").unwrap_or_default().to_string(),
        });
    }
    Ok(())
}

fn reply_count(reply: &Document, key: &'static str) -> Result<u64, ReplyError> {
    match reply.get(key) {
        Some(Bson::Int32(n)) => Ok(*n as u64),
        Some(Bson::Int64(n)) => Ok(*n as u64),
        Some(Bson::Double(n)) => Ok(*n as u64),
        _ => Err(ReplyError::MissingField(key)),
    }
}

fn find_options(command: &FindCommand) -> FindOptions {
    let mut options = FindOptions::default();
    options.sort = command.sort.clone();
    options.skip = command.skip;
    options.limit = command
        .limit
        .map(|limit| i64::try_from(limit).unwrap_or(i64::MAX));
    options
}

#[async_trait]
impl DocumentStore for MongoStore {
    fn as_any(&self) -> &dyn Any {
        self
    }

    async fn find(
        &self,
        command: FindCommand,
        on_document: &mut (dyn FnMut(Document) + Send),
    ) -> Result<(), Error> {
        let options = find_options(&command);
        let collection = self.collection(&command.collection);
        let find = collection.find(command.filter);

        match &self.session {
            Some(session) => {
                let mut session = session.lock().await;
                let mut cursor = find
                    .with_options(options)
                    .session(&mut *session)
                    .await
                    .map_err(Error::client)?;
                while let Some(document) = cursor.next(&mut *session).await {
                    on_document(document.map_err(Error::client)?);
                }
            }
            None => {
                let mut cursor = find.with_options(options).await.map_err(Error::client)?;
                while let Some(document) = cursor.try_next().await.map_err(Error::client)? {
                    on_document(document);
                }
            }
        }
        Ok(())
    }

    async fn aggregate(
        &self,
        command: AggregateCommand,
        on_document: &mut (dyn FnMut(Document) + Send),
    ) -> Result<(), Error> {
        let collection = self.collection(&command.collection);
        let aggregate = collection.aggregate(command.pipeline);

        match &self.session {
            Some(session) => {
                let mut session = session.lock().await;
                let mut cursor = aggregate
                    .session(&mut *session)
                    .await
                    .map_err(Error::client)?;
                while let Some(document) = cursor.next(&mut *session).await {
                    on_document(document.map_err(Error::client)?);
                }
            }
            None => {
                let mut cursor = aggregate.await.map_err(Error::client)?;
                while let Some(document) = cursor.try_next().await.map_err(Error::client)? {
                    on_document(document);
                }
            }
        }
        Ok(())
    }

    async fn insert_many(&self, command: InsertCommand) -> Result<InsertReply, Error> {
        // The server rejects an empty batch.
        if command.documents.is_empty() {
            return Ok(InsertReply { inserted: 0 });
        }

        let collection = self.collection(&command.collection);
        let insert = collection.insert_many(command.documents);
        let result = match &self.session {
            Some(session) => {
                let mut session = session.lock().await;
                insert.session(&mut *session).await
            }
            None => insert.await,
        }
        .map_err(Error::client)?;

        Ok(InsertReply {
            inserted: result.inserted_ids.len(),
        })
    }

    async fn update(&self, command: UpdateCommand) -> Result<UpdateReply, Error> {
        let reply = self.run_command(command.to_command()).await?;
        Ok(UpdateReply {
            matched: reply_count(&reply, "n")?,
            modified: reply_count(&reply, "nModified")?,
        })
    }

    async fn delete(&self, command: DeleteCommand) -> Result<DeleteReply, Error> {
        let reply = self.run_command(command.to_command()).await?;
        Ok(DeleteReply {
            deleted: reply_count(&reply, "n")?,
        })
    }

    /// Counts with an aggregation, which unlike the `count` command may run inside a
    /// transaction.
    async fn count(&self, command: CountCommand) -> Result<u64, Error> {
        let collection = self.collection(&command.collection);
        let count = collection.count_documents(command.filter);
        match &self.session {
            Some(session) => {
                let mut session = session.lock().await;
                count.session(&mut *session).await
            }
            None => count.await,
        }
        .map_err(Error::client)
    }

    async fn create_indexes(&self, command: CreateIndexes) -> Result<(), Error> {
        self.run_command(command.to_command()).await?;
        Ok(())
    }

    async fn drop_collection(&self, collection: &str) -> Result<(), Error> {
        let collection = self.collection(collection);
        let drop = collection.drop();
        match &self.session {
            Some(session) => {
                let mut session = session.lock().await;
                drop.session(&mut *session).await
            }
            None => drop.await,
        }
        .map_err(Error::client)
    }

    async fn start_transaction(&self) -> Result<StoreTransaction, Error> {
        let mut session = self.client.start_session().await.map_err(Error::client)?;
        session.start_transaction().await.map_err(Error::client)?;
        debug!(database = %self.database.name(), "transaction started");

        let session = Arc::new(Mutex::new(session));
        Ok(StoreTransaction {
            store: Arc::new(MongoStore {
                client: self.client.clone(),
                database: self.database.clone(),
                session: Some(session.clone()),
            }),
            control: Box::new(MongoTransaction { session }),
        })
    }
}

struct MongoTransaction {
    session: Arc<Mutex<ClientSession>>,
}

#[async_trait]
impl TransactionControl for MongoTransaction {
    async fn commit(&self) -> Result<(), Error> {
        debug!("committing transaction");
        self.session
            .lock()
            .await
            .commit_transaction()
            .await
            .map_err(Error::client)
    }

    async fn abort(&self) -> Result<(), Error> {
        debug!("aborting transaction");
        self.session
            .lock()
            .await
            .abort_transaction()
            .await
            .map_err(Error::client)
    }
}

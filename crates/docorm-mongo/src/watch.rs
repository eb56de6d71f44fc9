//! Change streams.

use bson::Document;
use docorm_core::{require_store, Database, Error};
use mongodb::change_stream::event::ChangeStreamEvent;
use mongodb::change_stream::ChangeStream;
use tracing::debug;

use crate::store::MongoStore;

/// Open a change stream on `collection`.
///
/// Only handles backed by a [`MongoStore`] can watch; any other fails with
/// [`Error::NotMongoTarget`].
pub async fn watch(
    database: &dyn Database,
    collection: &str,
) -> Result<ChangeStream<ChangeStreamEvent<Document>>, Error> {
    let store = require_store::<MongoStore>(database)?;
    debug!(collection, "opening change stream");
    store
        .database()
        .collection::<Document>(collection)
        .watch()
        .await
        .map_err(Error::client)
}

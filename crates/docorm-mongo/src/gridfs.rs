//! Blob storage in the database's default GridFS bucket.
//!
//! Like change streams, these need a handle backed by a [`MongoStore`] and fail with
//! [`Error::NotMongoTarget`] otherwise. GridFS does not take part in transactions, so a
//! transaction-bound handle reads and writes outside its session.

use bson::{doc, Bson, Document};
use docorm_core::{require_store, Database, Error};
use futures::{AsyncReadExt, AsyncWriteExt};
use mongodb::gridfs::{FilesCollectionDocument, GridFsBucket};
use mongodb::options::GridFsUploadOptions;
use tracing::debug;

use crate::store::MongoStore;

fn bucket(database: &dyn Database) -> Result<GridFsBucket, Error> {
    let store = require_store::<MongoStore>(database)?;
    Ok(store.database().gridfs_bucket(None))
}

/// Look up the file stored under `id`.
pub async fn find_file(
    database: &dyn Database,
    id: impl Into<Bson>,
) -> Result<Option<FilesCollectionDocument>, Error> {
    let bucket = bucket(database)?;
    bucket
        .find_one(doc! { "_id": id.into() })
        .await
        .map_err(Error::client)
}

/// Read the whole content of the file stored under `id`, `None` when there is no such file.
pub async fn read_file(
    database: &dyn Database,
    id: impl Into<Bson>,
) -> Result<Option<Vec<u8>>, Error> {
    let bucket = bucket(database)?;
    let id = id.into();
    let Some(file) = bucket
        .find_one(doc! { "_id": id.clone() })
        .await
        .map_err(Error::client)?
    else {
        return Ok(None);
    };

    let mut stream = bucket
        .open_download_stream(id)
        .await
        .map_err(Error::client)?;
    let mut content = Vec::with_capacity(usize::try_from(file.length).unwrap_or_default());
    stream
        .read_to_end(&mut content)
        .await
        .map_err(Error::client)?;
    Ok(Some(content))
}

/// Store `content` as a new file and return the generated file id.
pub async fn upload_file(
    database: &dyn Database,
    content: &[u8],
    filename: Option<&str>,
    metadata: Option<Document>,
) -> Result<Bson, Error> {
    let bucket = bucket(database)?;
    let mut options = GridFsUploadOptions::default();
    options.metadata = metadata;

    let mut stream = bucket
        .open_upload_stream(filename.unwrap_or_default())
        .with_options(options)
        .await
        .map_err(Error::client)?;
    stream.write_all(content).await.map_err(Error::client)?;
    stream.close().await.map_err(Error::client)?;

    let id = stream.id().clone();
    debug!(id = %id, bytes = content.len(), "uploaded file");
    Ok(id)
}

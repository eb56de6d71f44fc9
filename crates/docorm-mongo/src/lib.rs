//! docorm MongoDB backend.
//!
//! [`MongoStore`] implements [`docorm_core::DocumentStore`] with the official `mongodb`
//! driver, so a [`docorm_core::DocumentDatabase`] built on it runs compiled queries against
//! a live deployment. [`watch`] and the [`gridfs`] functions expose change streams and blob
//! storage for handles backed by a [`MongoStore`].
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use docorm_core::proto::{DatabaseQuery, Field, Filter};
//! use docorm_core::DocumentDatabase;
//! use docorm_mongo::{ConnectionSettings, MongoStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = ConnectionSettings::parse("mongodb://localhost:27017/shop").await?;
//!     let database = DocumentDatabase::new(Arc::new(MongoStore::connect(settings).await?));
//!
//!     let query = DatabaseQuery::read("users")
//!         .with_filter(Filter::gte(Field::path("age", "users"), 18));
//!     for row in database.query(&query).await? {
//!         let name: String = row.decode(&Field::path("name", "users"))?;
//!         println!("{}", name);
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod gridfs;
pub mod store;
pub mod watch;

pub use config::{ConnectionSettings, DEFAULT_HOST, DEFAULT_PORT};
pub use error::ReplyError;
pub use gridfs::{find_file, read_file, upload_file};
pub use store::MongoStore;
pub use watch::watch;

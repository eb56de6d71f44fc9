//! Core error types.

use thiserror::Error;

/// Errors raised while compiling or executing queries.
///
/// Variants named `Unsupported*`, `InvalidIndexKey` and `RowShapeMismatch` are raised while
/// translating a query, before any command reaches the store.
#[derive(Debug, Error)]
pub enum Error {
    /// Field cannot be addressed in this context.
    #[error("unsupported field")]
    UnsupportedField,

    /// Filter method cannot be expressed for this filter kind.
    #[error("unsupported filter")]
    UnsupportedFilter,

    /// Filter value does not fit the filter method.
    #[error("unsupported filter value")]
    UnsupportedFilterValue,

    #[error("unsupported custom filter")]
    UnsupportedCustomFilter,

    #[error("unsupported custom value")]
    UnsupportedCustomValue,

    #[error("unsupported custom sort")]
    UnsupportedCustomSort,

    #[error("unsupported custom limit")]
    UnsupportedCustomLimit,

    #[error("unsupported custom aggregate")]
    UnsupportedCustomAggregate,

    #[error("unsupported custom action")]
    UnsupportedCustomAction,

    /// Join kind or join condition cannot be emulated.
    #[error("unsupported join")]
    UnsupportedJoin,

    /// Document stores have no column defaults.
    #[error("unsupported default value")]
    UnsupportedDefaultValue,

    /// Index field is not a plain key.
    #[error("invalid index key")]
    InvalidIndexKey,

    /// Input row length differs from the field list.
    #[error("input row has {actual} values for {expected} fields")]
    RowShapeMismatch { expected: usize, actual: usize },

    /// The store acknowledged fewer inserts than were submitted.
    #[error("insert failed: {acknowledged} of {expected} documents acknowledged")]
    InsertFailed { expected: usize, acknowledged: usize },

    #[error("no hosts specified")]
    MissingHosts,

    #[error("no target database specified")]
    NoTargetDatabaseSpecified,

    /// A document-store capability was requested from a handle that is not backed by one.
    #[error("database handle is not backed by a document store")]
    NotMongoTarget,

    /// Encoding a value into a document primitive failed.
    #[error("encode error: {0}")]
    Encode(#[from] bson::ser::Error),

    /// Decoding a result field failed.
    #[error("decode error: {0}")]
    Decode(#[from] bson::de::Error),

    /// Error reported by the document-store client.
    #[error("client error: {0}")]
    Client(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Wrap an error reported by the document-store client.
    pub fn client(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        Error::Client(Box::new(error))
    }

    /// Errors are not classified as syntax errors.
    pub fn is_syntax_error(&self) -> bool {
        false
    }

    /// Errors are not classified as constraint failures.
    pub fn is_constraint_failure(&self) -> bool {
        false
    }

    /// Errors are not classified as closed connections.
    pub fn is_connection_closed(&self) -> bool {
        false
    }
}

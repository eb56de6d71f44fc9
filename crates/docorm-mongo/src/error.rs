//! Failures reported inside otherwise successful command replies.

use thiserror::Error;

/// A command reply that signals failure in its body.
#[derive(Debug, Error)]
pub enum ReplyError {
    /// The server rejected one of the writes.
    #[error("write error {code}: {message}")]
    Write { code: i32, message: String },

    /// The server could not apply the write concern.
    #[error("write concern error {code}: {message}")]
    WriteConcern { code: i32, message: String },

    /// A reply field the command always returns was missing.
    #[error("reply is missing {0}")]
    MissingField(&'static str),
}

impl From<ReplyError> for docorm_core::Error {
    fn from(error: ReplyError) -> Self {
        docorm_core::Error::client(error)
    }
}

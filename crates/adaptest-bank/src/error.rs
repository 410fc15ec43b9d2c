//! Storage error types.

use adaptest_core::CatError;
use thiserror::Error;

/// Errors raised by the in-memory collaborators.
#[derive(Debug, Error)]
pub enum BankError {
    /// A session with this id already exists.
    #[error("session already exists: {0}")]
    DuplicateSession(String),

    /// A commit targeted a session that was never created.
    #[error("cannot commit unknown session: {0}")]
    MissingSession(String),

    /// The store refuses writes.
    #[error("store is read-only")]
    ReadOnly,
}

impl From<BankError> for CatError {
    fn from(err: BankError) -> Self {
        match err {
            BankError::MissingSession(id) => CatError::SessionNotFound(id),
            other => CatError::Store(other.to_string()),
        }
    }
}

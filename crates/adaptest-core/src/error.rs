//! Engine error types.
//!
//! Input and state errors are raised before any session mutation so the
//! orchestrator can translate them into caller-facing responses. Item
//! exhaustion and numeric degeneracy are not errors and never appear here.

use thiserror::Error;

/// Errors raised by the CAT engine and the session orchestrator.
#[derive(Debug, Error)]
pub enum CatError {
    /// A submitted answer was not 0 or 1.
    #[error("answer must be 0 or 1, got {0}")]
    InvalidAnswer(u8),

    /// The referenced item does not exist in the item bank.
    #[error("unknown item: {0}")]
    UnknownItem(String),

    /// The answered item is not the one the session is waiting for.
    #[error("item mismatch: session expects {expected}, got {actual}")]
    ItemMismatch { expected: String, actual: String },

    /// Item parameters are outside the 3PL domain.
    #[error("invalid parameters for item {item_id}: {reason}")]
    InvalidParameters { item_id: String, reason: String },

    /// The engine configuration is inconsistent.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// No session exists with this identifier.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// The session already reached its terminal state.
    #[error("session {0} is already completed")]
    SessionCompleted(String),

    /// The estimation engine cannot serve requests right now.
    #[error("engine unavailable: {0}")]
    EngineUnavailable(String),

    /// A storage collaborator failed.
    #[error("store error: {0}")]
    Store(String),
}

/// Coarse classification of a [`CatError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed caller input, rejected before mutation.
    Input,
    /// Operation on a terminal or missing session.
    State,
    /// The engine could not run; a fallback engine may be tried.
    Engine,
    /// Persistence collaborator failure.
    Store,
}

impl CatError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CatError::InvalidAnswer(_)
            | CatError::UnknownItem(_)
            | CatError::ItemMismatch { .. }
            | CatError::InvalidParameters { .. }
            | CatError::InvalidConfig(_) => ErrorKind::Input,
            CatError::SessionNotFound(_) | CatError::SessionCompleted(_) => ErrorKind::State,
            CatError::EngineUnavailable(_) => ErrorKind::Engine,
            CatError::Store(_) => ErrorKind::Store,
        }
    }

    /// Returns `true` if a fallback engine may retry the failed operation.
    pub fn is_recoverable(&self) -> bool {
        self.kind() == ErrorKind::Engine
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert_eq!(CatError::InvalidAnswer(2).kind(), ErrorKind::Input);
        assert_eq!(
            CatError::SessionCompleted("CAT_1".into()).kind(),
            ErrorKind::State
        );
        assert_eq!(
            CatError::SessionNotFound("CAT_1".into()).kind(),
            ErrorKind::State
        );
        assert!(CatError::EngineUnavailable("down".into()).is_recoverable());
        assert!(!CatError::UnknownItem("x".into()).is_recoverable());
    }

    #[test]
    fn messages() {
        let err = CatError::ItemMismatch {
            expected: "I01".into(),
            actual: "I02".into(),
        };
        assert_eq!(err.to_string(), "item mismatch: session expects I01, got I02");
        assert_eq!(
            CatError::InvalidAnswer(3).to_string(),
            "answer must be 0 or 1, got 3"
        );
    }
}

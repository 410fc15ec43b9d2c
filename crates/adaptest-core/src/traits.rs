//! Collaborator traits for item lookup and session persistence.
//!
//! Implemented by the `adaptest-bank` crate. The orchestrator only ever talks
//! to storage through these.

use std::sync::Arc;

use async_trait::async_trait;

use crate::bank::ItemBank;
use crate::error::CatError;
use crate::model::{Item, Response, SessionRecord};

// ---------------------------------------------------------------------------
// Item repository
// ---------------------------------------------------------------------------

/// Read-only access to calibrated items.
#[async_trait]
pub trait ItemRepository: Send + Sync {
    /// Look up a single item. `Ok(None)` if no such item exists.
    async fn item(&self, id: &str) -> Result<Option<Item>, CatError>;

    /// The full bank, used for selection.
    async fn bank(&self) -> Result<Arc<ItemBank>, CatError>;
}

// ---------------------------------------------------------------------------
// Session store
// ---------------------------------------------------------------------------

/// Persistence for session state and response history.
///
/// `commit` replaces the whole record in one step. A failed commit must leave
/// the previously stored record untouched.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persist a new session. Fails if the id is already taken.
    async fn create(&self, record: SessionRecord) -> Result<(), CatError>;

    /// Load a session. `Ok(None)` if it does not exist.
    async fn load(&self, session_id: &str) -> Result<Option<SessionRecord>, CatError>;

    /// Atomically replace an existing session record.
    async fn commit(&self, record: SessionRecord) -> Result<(), CatError>;

    /// Responses of a session ordered by administration order.
    async fn responses(&self, session_id: &str) -> Result<Vec<Response>, CatError>;
}

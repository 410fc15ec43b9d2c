//! In-memory item repository and session store.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

use adaptest_core::bank::ItemBank;
use adaptest_core::model::{Item, Response, SessionRecord};
use adaptest_core::parser::load_item_bank;
use adaptest_core::traits::{ItemRepository, SessionStore};
use adaptest_core::CatError;

use crate::error::BankError;

/// Serves items from a bank loaded once at startup.
#[derive(Debug, Clone)]
pub struct MemoryItemRepository {
    bank: Arc<ItemBank>,
}

impl MemoryItemRepository {
    pub fn new(bank: ItemBank) -> Self {
        Self {
            bank: Arc::new(bank),
        }
    }

    /// Load a bank file or directory.
    pub fn from_path(path: &Path) -> Result<Self> {
        Ok(Self::new(load_item_bank(path)?))
    }

    pub fn len(&self) -> usize {
        self.bank.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bank.is_empty()
    }
}

#[async_trait]
impl ItemRepository for MemoryItemRepository {
    async fn item(&self, id: &str) -> Result<Option<Item>, CatError> {
        Ok(self.bank.get(id).cloned())
    }

    async fn bank(&self) -> Result<Arc<ItemBank>, CatError> {
        Ok(Arc::clone(&self.bank))
    }
}

/// Session records kept in a map behind an async lock.
///
/// A commit swaps the whole record under the write lock, so readers see
/// either the previous record or the new one.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, SessionRecord>>,
    read_only: AtomicBool,
    commits: AtomicU32,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse all writes while set. Used to exercise failure paths.
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }

    /// Number of successful commits.
    pub fn commit_count(&self) -> u32 {
        self.commits.load(Ordering::Relaxed)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// All session ids, sorted.
    pub async fn session_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    fn check_writable(&self) -> Result<(), BankError> {
        if self.read_only.load(Ordering::SeqCst) {
            Err(BankError::ReadOnly)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, record: SessionRecord) -> Result<(), CatError> {
        self.check_writable()?;
        let mut sessions = self.sessions.write().await;
        let id = record.state.session_id.clone();
        if sessions.contains_key(&id) {
            return Err(BankError::DuplicateSession(id).into());
        }
        sessions.insert(id, record);
        Ok(())
    }

    async fn load(&self, session_id: &str) -> Result<Option<SessionRecord>, CatError> {
        Ok(self.sessions.read().await.get(session_id).cloned())
    }

    async fn commit(&self, record: SessionRecord) -> Result<(), CatError> {
        self.check_writable()?;
        let mut sessions = self.sessions.write().await;
        let Some(slot) = sessions.get_mut(&record.state.session_id) else {
            return Err(BankError::MissingSession(record.state.session_id).into());
        };
        *slot = record;
        self.commits.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn responses(&self, session_id: &str) -> Result<Vec<Response>, CatError> {
        let sessions = self.sessions.read().await;
        let mut responses = sessions
            .get(session_id)
            .map(|r| r.responses.clone())
            .unwrap_or_default();
        responses.sort_by_key(|r| r.order);
        Ok(responses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adaptest_core::model::{ItemParams, SessionState};

    fn bank() -> ItemBank {
        ItemBank::new(vec![
            Item::new("B", ItemParams::new(1.0, 0.5, 0.2)),
            Item::new("A", ItemParams::new(1.3, -0.5, 0.2)),
        ])
        .unwrap()
    }

    #[tokio::test]
    async fn repository_lookup() {
        let repo = MemoryItemRepository::new(bank());
        assert_eq!(repo.len(), 2);
        assert_eq!(repo.item("A").await.unwrap().unwrap().params.b, -0.5);
        assert!(repo.item("Z").await.unwrap().is_none());
        assert_eq!(repo.bank().await.unwrap().items()[0].id, "A");
    }

    #[tokio::test]
    async fn repository_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bank.toml");
        std::fs::write(
            &path,
            "[[items]]\nid = \"T1\"\na = 1.0\nb = 0.0\ng = 0.2\n",
        )
        .unwrap();
        let repo = MemoryItemRepository::from_path(&path).unwrap();
        assert_eq!(repo.len(), 1);
    }

    #[tokio::test]
    async fn create_load_commit() {
        let store = MemorySessionStore::new();
        let record = SessionRecord::new(SessionState::new("CAT_a"));
        store.create(record.clone()).await.unwrap();
        assert!(store.create(record.clone()).await.is_err());

        let mut updated = store.load("CAT_a").await.unwrap().unwrap();
        updated.state.theta = 0.7;
        store.commit(updated).await.unwrap();
        assert_eq!(store.load("CAT_a").await.unwrap().unwrap().state.theta, 0.7);
        assert_eq!(store.commit_count(), 1);
        assert_eq!(store.session_ids().await, vec!["CAT_a"]);
    }

    #[tokio::test]
    async fn commit_requires_existing_session() {
        let store = MemorySessionStore::new();
        let err = store
            .commit(SessionRecord::new(SessionState::new("CAT_ghost")))
            .await
            .unwrap_err();
        assert!(matches!(err, CatError::SessionNotFound(_)));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn read_only_rejects_writes() {
        let store = MemorySessionStore::new();
        store.set_read_only(true);
        let err = store
            .create(SessionRecord::new(SessionState::new("CAT_b")))
            .await
            .unwrap_err();
        assert!(matches!(err, CatError::Store(_)));
        store.set_read_only(false);
        assert!(store
            .create(SessionRecord::new(SessionState::new("CAT_b")))
            .await
            .is_ok());
    }
}

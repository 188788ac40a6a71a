// file: storage/cloud.rs
// desc: per-user history in a remote document store, local fallback for anonymous use

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;

use super::local::{KeyValueStore, LocalHistory};
use crate::error::StorageError;
use crate::history::{HistoryItem, sort_newest_first};

/// Remote collection of history documents, one document per character under
/// `users/{user_id}/history`.
#[async_trait(?Send)]
pub trait DocumentStore {
    /// All documents, newest first.
    async fn list(&self, user_id: &str) -> Result<Vec<HistoryItem>, StorageError>;

    /// Create or overwrite the document for `item.character`.
    async fn put(&self, user_id: &str, item: &HistoryItem) -> Result<(), StorageError>;

    /// Write several documents in one batch.
    async fn put_all(&self, user_id: &str, items: &[HistoryItem]) -> Result<(), StorageError>;

    async fn delete(&self, user_id: &str, character: char) -> Result<(), StorageError>;

    async fn delete_all(&self, user_id: &str) -> Result<(), StorageError>;
}

#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    users: RefCell<HashMap<String, BTreeMap<char, HistoryItem>>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait(?Send)]
impl DocumentStore for MemoryDocumentStore {
    async fn list(&self, user_id: &str) -> Result<Vec<HistoryItem>, StorageError> {
        let mut items: Vec<_> = self
            .users
            .borrow()
            .get(user_id)
            .map(|docs| docs.values().cloned().collect())
            .unwrap_or_default();
        sort_newest_first(&mut items);
        Ok(items)
    }

    async fn put(&self, user_id: &str, item: &HistoryItem) -> Result<(), StorageError> {
        self.put_all(user_id, std::slice::from_ref(item)).await
    }

    async fn put_all(&self, user_id: &str, items: &[HistoryItem]) -> Result<(), StorageError> {
        let mut users = self.users.borrow_mut();
        let docs = users.entry(user_id.to_string()).or_default();
        for item in items {
            docs.insert(item.character, item.clone());
        }
        Ok(())
    }

    async fn delete(&self, user_id: &str, character: char) -> Result<(), StorageError> {
        if let Some(docs) = self.users.borrow_mut().get_mut(user_id) {
            docs.remove(&character);
        }
        Ok(())
    }

    async fn delete_all(&self, user_id: &str) -> Result<(), StorageError> {
        self.users.borrow_mut().remove(user_id);
        Ok(())
    }
}

/// Signed-in users read and write the remote store; anonymous calls, or any
/// call while the remote is not configured, go to the local history.
pub struct CloudHistory<S, D> {
    local: LocalHistory<S>,
    remote: Option<D>,
    limit: Option<usize>,
    // last list read from the remote, tagged with its owner
    last_known: RefCell<Option<(String, Vec<HistoryItem>)>>,
}

impl<S: KeyValueStore, D: DocumentStore> CloudHistory<S, D> {
    pub fn new(local: LocalHistory<S>, remote: Option<D>, limit: Option<usize>) -> Self {
        Self {
            local,
            remote,
            limit,
            last_known: RefCell::new(None),
        }
    }

    pub fn local(&self) -> &LocalHistory<S> {
        &self.local
    }

    fn remote_for<'a>(&'a self, user_id: Option<&'a str>) -> Option<(&'a D, &'a str)> {
        Some((self.remote.as_ref()?, user_id?))
    }

    fn remember(&self, user_id: &str, items: &[HistoryItem]) {
        *self.last_known.borrow_mut() = Some((user_id.to_string(), items.to_vec()));
    }

    /// Last list read for `user_id`; empty when nothing was read for that user.
    fn last_known_for(&self, user_id: &str) -> Vec<HistoryItem> {
        match &*self.last_known.borrow() {
            Some((owner, items)) if owner == user_id => items.clone(),
            _ => Vec::new(),
        }
    }

    /// Drop the cached remote list, e.g. when the user signs out.
    pub fn forget_last_known(&self) {
        self.last_known.borrow_mut().take();
    }

    async fn list(&self, remote: &D, user_id: &str) -> Vec<HistoryItem> {
        match remote.list(user_id).await {
            Ok(items) => {
                self.remember(user_id, &items);
                items
            }
            Err(e) => {
                log::error!("Failed to get history from remote store: {e}");
                self.last_known_for(user_id)
            }
        }
    }

    pub async fn get_history(&self, user_id: Option<&str>) -> Vec<HistoryItem> {
        match self.remote_for(user_id) {
            Some((remote, user_id)) => self.list(remote, user_id).await,
            None => self.local.get_history(),
        }
    }

    pub async fn add(&self, user_id: Option<&str>, item: HistoryItem) -> Vec<HistoryItem> {
        let Some((remote, user_id)) = self.remote_for(user_id) else {
            return self.local.add(item);
        };

        if let Err(e) = remote.put(user_id, &item).await {
            log::error!("Failed to add to remote store: {e}");
            return self.list(remote, user_id).await;
        }

        let history = self.list(remote, user_id).await;
        match self.limit {
            Some(limit) if history.len() > limit => self.trim(remote, user_id, history, limit).await,
            _ => history,
        }
    }

    async fn trim(&self, remote: &D, user_id: &str, mut history: Vec<HistoryItem>, limit: usize) -> Vec<HistoryItem> {
        for stale in history.split_off(limit) {
            if let Err(e) = remote.delete(user_id, stale.character).await {
                log::warn!("Failed to trim remote history: {e}");
            }
        }
        self.remember(user_id, &history);
        history
    }

    pub async fn remove(&self, user_id: Option<&str>, character: char) -> Vec<HistoryItem> {
        let Some((remote, user_id)) = self.remote_for(user_id) else {
            return self.local.remove(character);
        };

        if let Err(e) = remote.delete(user_id, character).await {
            log::error!("Failed to remove from remote store: {e}");
        }
        self.list(remote, user_id).await
    }

    pub async fn clear(&self, user_id: Option<&str>) -> Vec<HistoryItem> {
        let Some((remote, user_id)) = self.remote_for(user_id) else {
            return self.local.clear();
        };

        match remote.delete_all(user_id).await {
            Ok(()) => {
                self.remember(user_id, &[]);
                Vec::new()
            }
            Err(e) => {
                log::error!("Failed to clear remote history: {e}");
                self.list(remote, user_id).await
            }
        }
    }

    /// Move device history into the user's remote collection.
    ///
    /// Characters already stored remotely keep their remote entry. Local data
    /// is cleared only after the batch write succeeds, so a failed run can be
    /// repeated; a repeated successful run finds nothing left to move.
    pub async fn reconcile(&self, user_id: &str) -> Result<usize, StorageError> {
        let Some(remote) = self.remote.as_ref() else {
            return Ok(0);
        };

        let local = self.local.get_history();
        if local.is_empty() {
            return Ok(0);
        }

        let existing: HashSet<char> = remote
            .list(user_id)
            .await?
            .into_iter()
            .map(|item| item.character)
            .collect();
        let to_migrate: Vec<HistoryItem> = local
            .into_iter()
            .filter(|item| !existing.contains(&item.character))
            .collect();

        if !to_migrate.is_empty() {
            remote.put_all(user_id, &to_migrate).await?;
            log::info!("Migrated {} items to cloud storage", to_migrate.len());
        }
        self.local.clear();
        Ok(to_migrate.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::local::MemoryStore;
    use std::cell::Cell;

    /// Remote that fails every call while `down` is set.
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryDocumentStore,
        down: Cell<bool>,
    }

    impl FlakyStore {
        fn check(&self) -> Result<(), StorageError> {
            if self.down.get() {
                Err(StorageError::Status {
                    status: 503,
                    body: "unavailable".into(),
                })
            } else {
                Ok(())
            }
        }
    }

    #[async_trait(?Send)]
    impl DocumentStore for FlakyStore {
        async fn list(&self, user_id: &str) -> Result<Vec<HistoryItem>, StorageError> {
            self.check()?;
            self.inner.list(user_id).await
        }

        async fn put(&self, user_id: &str, item: &HistoryItem) -> Result<(), StorageError> {
            self.check()?;
            self.inner.put(user_id, item).await
        }

        async fn put_all(&self, user_id: &str, items: &[HistoryItem]) -> Result<(), StorageError> {
            self.check()?;
            self.inner.put_all(user_id, items).await
        }

        async fn delete(&self, user_id: &str, character: char) -> Result<(), StorageError> {
            self.check()?;
            self.inner.delete(user_id, character).await
        }

        async fn delete_all(&self, user_id: &str) -> Result<(), StorageError> {
            self.check()?;
            self.inner.delete_all(user_id).await
        }
    }

    fn item(c: char, at: i64) -> HistoryItem {
        HistoryItem::new(c, "", at)
    }

    fn cloud<D: DocumentStore>(remote: Option<D>) -> CloudHistory<MemoryStore, D> {
        CloudHistory::new(LocalHistory::new(MemoryStore::new(), Some(100)), remote, None)
    }

    #[tokio::test]
    async fn anonymous_calls_use_local_history() {
        let history = cloud(Some(MemoryDocumentStore::new()));
        history.add(None, item('一', 1)).await;

        assert_eq!(history.get_history(None).await, vec![item('一', 1)]);
        assert!(history.get_history(Some("u1")).await.is_empty());
    }

    #[tokio::test]
    async fn unconfigured_remote_falls_back_to_local() {
        let history = cloud::<MemoryDocumentStore>(None);
        history.add(Some("u1"), item('一', 1)).await;
        assert_eq!(history.local().get_history(), vec![item('一', 1)]);
        assert_eq!(history.reconcile("u1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn signed_in_add_moves_character_to_front() {
        let history = cloud(Some(MemoryDocumentStore::new()));
        history.add(Some("u1"), item('一', 1)).await;
        history.add(Some("u1"), item('二', 2)).await;
        let items = history.add(Some("u1"), item('一', 3)).await;

        assert_eq!(items, vec![item('一', 3), item('二', 2)]);
        assert!(history.local().get_history().is_empty());
    }

    #[tokio::test]
    async fn remote_failures_return_last_known_list() {
        let history = cloud(Some(FlakyStore::default()));
        history.add(Some("u1"), item('一', 1)).await;

        history.remote.as_ref().unwrap().down.set(true);
        assert_eq!(history.get_history(Some("u1")).await, vec![item('一', 1)]);
        assert_eq!(history.add(Some("u1"), item('二', 2)).await, vec![item('一', 1)]);
        assert_eq!(history.clear(Some("u1")).await, vec![item('一', 1)]);
    }

    #[tokio::test]
    async fn last_known_list_stays_with_its_user() {
        let history = cloud(Some(FlakyStore::default()));
        history.add(Some("alice"), item('秘', 1)).await;

        history.remote.as_ref().unwrap().down.set(true);
        assert!(history.get_history(Some("bob")).await.is_empty());
        assert_eq!(history.get_history(Some("alice")).await, vec![item('秘', 1)]);

        history.forget_last_known();
        assert!(history.get_history(Some("alice")).await.is_empty());
    }

    #[tokio::test]
    async fn remove_and_clear_remote() {
        let history = cloud(Some(MemoryDocumentStore::new()));
        history.add(Some("u1"), item('一', 1)).await;
        history.add(Some("u1"), item('二', 2)).await;

        assert_eq!(history.remove(Some("u1"), '二').await, vec![item('一', 1)]);
        assert!(history.clear(Some("u1")).await.is_empty());
        assert!(history.get_history(Some("u1")).await.is_empty());
    }

    #[tokio::test]
    async fn authenticated_limit_trims_oldest() {
        let history = CloudHistory::new(
            LocalHistory::new(MemoryStore::new(), None),
            Some(MemoryDocumentStore::new()),
            Some(2),
        );
        for (i, c) in "一二三".chars().enumerate() {
            history.add(Some("u1"), item(c, i as i64)).await;
        }
        let chars: String = history
            .get_history(Some("u1"))
            .await
            .iter()
            .map(|h| h.character)
            .collect();
        assert_eq!(chars, "三二");
    }

    #[tokio::test]
    async fn reconcile_prefers_remote_entries_and_clears_local() {
        let history = cloud(Some(MemoryDocumentStore::new()));
        history.add(Some("u1"), item('一', 50)).await;
        history.add(None, item('一', 10)).await;
        history.add(None, item('二', 20)).await;

        assert_eq!(history.reconcile("u1").await.unwrap(), 1);
        assert!(history.local().get_history().is_empty());
        assert_eq!(
            history.get_history(Some("u1")).await,
            vec![item('一', 50), item('二', 20)]
        );

        // running again is a no-op
        assert_eq!(history.reconcile("u1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn failed_reconcile_keeps_local_for_retry() {
        let history = cloud(Some(FlakyStore::default()));
        history.add(None, item('山', 1)).await;

        history.remote.as_ref().unwrap().down.set(true);
        assert!(history.reconcile("u1").await.is_err());
        assert_eq!(history.local().get_history(), vec![item('山', 1)]);

        history.remote.as_ref().unwrap().down.set(false);
        assert_eq!(history.reconcile("u1").await.unwrap(), 1);
        assert!(history.local().get_history().is_empty());
    }
}

// file: storage/mod.rs
// desc: history storage providers behind one interface

pub mod cloud;
pub mod firestore;
pub mod local;

pub use cloud::{CloudHistory, DocumentStore, MemoryDocumentStore};
pub use firestore::FirestoreStore;
pub use local::{BrowserStore, KeyValueStore, LocalHistory, MemoryStore};

use crate::config::HistoryLimits;
use crate::error::StorageError;
use crate::history::HistoryItem;

/// Storage provider picked from `AppConfig::storage`.
///
/// Every operation returns the updated list. Backend failures are logged and
/// degrade to the last known (or empty) list instead of failing the caller.
pub enum HistoryStore<S, D> {
    Local(LocalHistory<S>),
    Cloud(CloudHistory<S, D>),
}

impl<S: KeyValueStore, D: DocumentStore> HistoryStore<S, D> {
    pub fn local(store: S, limits: HistoryLimits) -> Self {
        HistoryStore::Local(LocalHistory::new(store, limits.anonymous))
    }

    /// `remote` is `None` when the cloud backend is not configured; all calls
    /// then stay on the device.
    pub fn cloud(store: S, remote: Option<D>, limits: HistoryLimits) -> Self {
        HistoryStore::Cloud(CloudHistory::new(
            LocalHistory::new(store, limits.anonymous),
            remote,
            limits.authenticated,
        ))
    }

    pub async fn get_history(&self, user_id: Option<&str>) -> Vec<HistoryItem> {
        match self {
            HistoryStore::Local(local) => local.get_history(),
            HistoryStore::Cloud(cloud) => cloud.get_history(user_id).await,
        }
    }

    /// Saving a character already in the list moves it to the front.
    pub async fn add_to_history(&self, user_id: Option<&str>, item: HistoryItem) -> Vec<HistoryItem> {
        match self {
            HistoryStore::Local(local) => local.add(item),
            HistoryStore::Cloud(cloud) => cloud.add(user_id, item).await,
        }
    }

    pub async fn remove_from_history(&self, user_id: Option<&str>, character: char) -> Vec<HistoryItem> {
        match self {
            HistoryStore::Local(local) => local.remove(character),
            HistoryStore::Cloud(cloud) => cloud.remove(user_id, character).await,
        }
    }

    pub async fn clear_history(&self, user_id: Option<&str>) -> Vec<HistoryItem> {
        match self {
            HistoryStore::Local(local) => local.clear(),
            HistoryStore::Cloud(cloud) => cloud.clear(user_id).await,
        }
    }

    /// Forget any remote list cached for the previous user.
    pub fn forget_cached(&self) {
        if let HistoryStore::Cloud(cloud) = self {
            cloud.forget_last_known();
        }
    }

    /// Merge device history into the signed-in user's collection. Returns the
    /// number of entries moved; the local provider has nothing to move.
    pub async fn reconcile(&self, user_id: &str) -> Result<usize, StorageError> {
        match self {
            HistoryStore::Local(_) => Ok(0),
            HistoryStore::Cloud(cloud) => cloud.reconcile(user_id).await,
        }
    }
}

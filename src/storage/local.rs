// file: storage/local.rs
// desc: history kept as one JSON array in a key-value store (browser localStorage)

use std::cell::RefCell;
use std::collections::HashMap;

use wasm_bindgen::JsValue;

use crate::error::StorageError;
use crate::history::{HistoryItem, upsert_front, without};

pub const STORAGE_KEY: &str = "kanji-history";

pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// In-process store, used off the browser and in tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RefCell<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries.borrow_mut().remove(key);
        Ok(())
    }
}

/// `window.localStorage`. When the page has no storage (private mode, no
/// window) every call fails with `Unavailable` and the history reads empty.
pub struct BrowserStore {
    storage: Option<web_sys::Storage>,
}

impl BrowserStore {
    pub fn open() -> Self {
        let storage = web_sys::window().and_then(|w| w.local_storage().ok().flatten());
        if storage.is_none() {
            log::warn!("localStorage unavailable, history will not persist");
        }
        Self { storage }
    }

    fn storage(&self) -> Result<&web_sys::Storage, StorageError> {
        self.storage.as_ref().ok_or(StorageError::Unavailable)
    }
}

fn js_error(e: JsValue) -> StorageError {
    StorageError::Backend(format!("{e:?}"))
}

impl KeyValueStore for BrowserStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.storage()?.get_item(key).map_err(js_error)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.storage()?.set_item(key, value).map_err(js_error)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.storage()?.remove_item(key).map_err(js_error)
    }
}

/// Anonymous history on the device.
pub struct LocalHistory<S> {
    store: S,
    limit: Option<usize>,
}

impl<S: KeyValueStore> LocalHistory<S> {
    pub fn new(store: S, limit: Option<usize>) -> Self {
        Self { store, limit }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn read(&self) -> Result<Vec<HistoryItem>, StorageError> {
        match self.store.get(STORAGE_KEY)? {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(Vec::new()),
        }
    }

    fn write(&self, history: &[HistoryItem]) -> Result<(), StorageError> {
        self.store.set(STORAGE_KEY, &serde_json::to_string(history)?)
    }

    /// Stored history, newest first. Missing or unreadable data reads as empty.
    pub fn get_history(&self) -> Vec<HistoryItem> {
        self.read().unwrap_or_else(|e| {
            log::warn!("Failed to read local history: {e}");
            Vec::new()
        })
    }

    pub fn add(&self, item: HistoryItem) -> Vec<HistoryItem> {
        let updated = upsert_front(self.get_history(), item, self.limit);
        match self.write(&updated) {
            Ok(()) => updated,
            Err(e) => {
                log::error!("Failed to save to local history: {e}");
                self.get_history()
            }
        }
    }

    pub fn remove(&self, character: char) -> Vec<HistoryItem> {
        let updated = without(self.get_history(), character);
        match self.write(&updated) {
            Ok(()) => updated,
            Err(e) => {
                log::error!("Failed to remove from local history: {e}");
                self.get_history()
            }
        }
    }

    pub fn clear(&self) -> Vec<HistoryItem> {
        if let Err(e) = self.store.remove(STORAGE_KEY) {
            log::error!("Failed to clear local history: {e}");
        }
        Vec::new()
    }
}

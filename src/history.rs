// file: history.rs
// desc: saved-character history entries and list operations shared by every store

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryItem {
    pub character: char,
    /// Readings as shown to the user when the character was saved
    #[serde(default)]
    pub readings: String,
    /// Milliseconds since the Unix epoch
    pub saved_at: i64,
}

impl HistoryItem {
    pub fn new(character: char, readings: impl Into<String>, saved_at: i64) -> Self {
        Self {
            character,
            readings: readings.into(),
            saved_at,
        }
    }

    /// Stamp with the current wall clock.
    pub fn now(character: char, readings: impl Into<String>) -> Self {
        Self::new(character, readings, now_millis())
    }
}

#[cfg(target_arch = "wasm32")]
pub(crate) fn now_millis() -> i64 {
    js_sys::Date::now() as i64
}

#[cfg(not(target_arch = "wasm32"))]
pub(crate) fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};

    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as i64)
}

/// Put `item` first, dropping any older entry for the same character, then
/// keep at most `limit` entries (oldest dropped).
pub fn upsert_front(history: Vec<HistoryItem>, item: HistoryItem, limit: Option<usize>) -> Vec<HistoryItem> {
    let mut updated = Vec::with_capacity(history.len() + 1);
    let character = item.character;
    updated.push(item);
    updated.extend(history.into_iter().filter(|h| h.character != character));

    if let Some(limit) = limit {
        updated.truncate(limit);
    }
    updated
}

pub fn without(history: Vec<HistoryItem>, character: char) -> Vec<HistoryItem> {
    history
        .into_iter()
        .filter(|h| h.character != character)
        .collect()
}

/// Newest first.
pub fn sort_newest_first(history: &mut [HistoryItem]) {
    history.sort_by(|a, b| b.saved_at.cmp(&a.saved_at));
}

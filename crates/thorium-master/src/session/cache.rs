//! In-process hash-of-fields cache with per-key expiry.
//!
//! Keys hold a small map of string fields. A key past its deadline reads as
//! absent and is dropped by the next write that touches it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;

#[derive(Debug, Default)]
struct Entry {
    fields: HashMap<String, String>,
    deadline: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.deadline.is_none_or(|deadline| deadline > now)
    }
}

/// Thread-safe cache shared by every request handler.
#[derive(Debug, Clone, Default)]
pub struct SessionCache {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

impl SessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read one field of a live key.
    pub async fn hget(&self, key: &str, field: &str) -> Option<String> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|entry| entry.is_live(Instant::now()))
            .and_then(|entry| entry.fields.get(field).cloned())
    }

    /// Write one field, creating the key without a deadline if absent.
    pub async fn hset(&self, key: &str, field: &str, value: impl Into<String>) {
        let mut entries = self.entries.write().await;
        let entry = live_entry(&mut entries, key);
        entry.fields.insert(field.to_owned(), value.into());
    }

    /// Write one field only if it is not already set on a live key.
    ///
    /// Returns `true` when the write happened. Check and write happen under
    /// one lock, so of two concurrent callers exactly one wins.
    pub async fn hset_if_absent(&self, key: &str, field: &str, value: impl Into<String>) -> bool {
        let mut entries = self.entries.write().await;
        let entry = live_entry(&mut entries, key);
        if entry.fields.contains_key(field) {
            return false;
        }
        entry.fields.insert(field.to_owned(), value.into());
        true
    }

    /// Write several fields on a key that is already live.
    ///
    /// Returns `false` and writes nothing if the key is absent or expired.
    pub async fn hset_existing(&self, key: &str, fields: &[(&str, String)]) -> bool {
        let mut entries = self.entries.write().await;
        let now = Instant::now();
        match entries.get_mut(key) {
            Some(entry) if entry.is_live(now) => {
                for (field, value) in fields {
                    entry.fields.insert((*field).to_owned(), value.clone());
                }
                true
            }
            _ => false,
        }
    }

    /// Set the key to expire `ttl` from now. Returns `false` if absent.
    pub async fn expire(&self, key: &str, ttl: Duration) -> bool {
        let mut entries = self.entries.write().await;
        let now = Instant::now();
        match entries.get_mut(key) {
            Some(entry) if entry.is_live(now) => {
                entry.deadline = Some(now + ttl);
                true
            }
            _ => false,
        }
    }

    /// Remove a key. Returns `true` if a live key was removed.
    pub async fn del(&self, key: &str) -> bool {
        let removed = self.entries.write().await.remove(key);
        removed.is_some_and(|entry| entry.is_live(Instant::now()))
    }

    /// Drop every expired key.
    pub async fn purge_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        let now = Instant::now();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        before - entries.len()
    }
}

fn live_entry<'a>(entries: &'a mut HashMap<String, Entry>, key: &str) -> &'a mut Entry {
    let now = Instant::now();
    if entries.get(key).is_some_and(|entry| !entry.is_live(now)) {
        entries.remove(key);
    }
    entries.entry(key.to_owned()).or_default()
}

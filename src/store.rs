//! # In-Memory Reference Stores
//!
//! A single-use [`NonceService`], a concurrent [`MapStore`], and an
//! in-memory [`StateStore`](crate::provider::StateStore) implementation.
//! Writes are serialized per store; readers observe a consistent snapshot
//! per key. Suitable for tests and single-process deployments; persistence
//! is the application's concern.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::{Mutex, RwLock};

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::core::generate;
use crate::provider::StateStore;

/// Issues single-use nonces and verifies them at most once.
#[derive(Debug, Default)]
pub struct NonceService {
    issued: Mutex<HashSet<String>>,
}

impl NonceService {
    /// Create an empty service.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue and record a fresh nonce.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn create(&self) -> String {
        let nonce = generate::nonce();
        self.issued.lock().expect("lock poisoned").insert(nonce.clone());
        nonce
    }

    /// Record an externally produced nonce.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn record(&self, nonce: impl Into<String>) {
        self.issued.lock().expect("lock poisoned").insert(nonce.into());
    }

    /// Return whether the nonce was outstanding, removing it. A second call
    /// with the same nonce returns `false`.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn verify_and_remove(&self, nonce: &str) -> bool {
        self.issued.lock().expect("lock poisoned").remove(nonce)
    }
}

/// A concurrent map with no ordering guarantees.
#[derive(Debug)]
pub struct MapStore<K, V> {
    entries: RwLock<HashMap<K, V>>,
}

impl<K, V> Default for MapStore<K, V> {
    fn default() -> Self {
        Self { entries: RwLock::new(HashMap::new()) }
    }
}

impl<K: Eq + Hash + Clone, V: Clone> MapStore<K, V> {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a value.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn put(&self, key: K, value: V) {
        self.entries.write().expect("lock poisoned").insert(key, value);
    }

    /// Fetch a value.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn get(&self, key: &K) -> Option<V> {
        self.entries.read().expect("lock poisoned").get(key).cloned()
    }

    /// Remove a value, returning it.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn remove(&self, key: &K) -> Option<V> {
        self.entries.write().expect("lock poisoned").remove(key)
    }
}

/// In-memory [`StateStore`] with expiry-on-read eviction.
#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    entries: RwLock<HashMap<String, (Value, DateTime<Utc>)>>,
}

impl InMemoryStateStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for InMemoryStateStore {
    async fn put(
        &self, key: &str, state: impl Serialize + Send, expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let value = serde_json::to_value(state)?;
        self.entries
            .write()
            .map_err(|_| anyhow!("lock poisoned"))?
            .insert(key.to_string(), (value, expires_at));
        Ok(())
    }

    async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let expired = {
            let entries = self.entries.read().map_err(|_| anyhow!("lock poisoned"))?;
            match entries.get(key) {
                None => return Ok(None),
                Some((value, expires_at)) => {
                    if *expires_at < Utc::now() {
                        true
                    } else {
                        return Ok(Some(serde_json::from_value(value.clone())?));
                    }
                }
            }
        };
        if expired {
            self.entries.write().map_err(|_| anyhow!("lock poisoned"))?.remove(key);
        }
        Ok(None)
    }

    async fn purge(&self, key: &str) -> Result<()> {
        self.entries.write().map_err(|_| anyhow!("lock poisoned"))?.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn nonce_is_single_use() {
        let service = NonceService::new();
        let nonce = service.create();

        assert!(service.verify_and_remove(&nonce));
        assert!(!service.verify_and_remove(&nonce));
        assert!(!service.verify_and_remove("never-issued"));
    }

    #[test]
    fn map_store_basics() {
        let store: MapStore<String, u32> = MapStore::new();
        store.put("a".to_string(), 1);
        assert_eq!(store.get(&"a".to_string()), Some(1));
        assert_eq!(store.remove(&"a".to_string()), Some(1));
        assert_eq!(store.get(&"a".to_string()), None);
    }

    #[tokio::test]
    async fn state_expires() {
        let store = InMemoryStateStore::new();
        store.put("s1", "live", Utc::now() + Duration::minutes(5)).await.unwrap();
        store.put("s2", "dead", Utc::now() - Duration::seconds(1)).await.unwrap();

        assert_eq!(store.get::<String>("s1").await.unwrap().as_deref(), Some("live"));
        assert_eq!(store.get::<String>("s2").await.unwrap(), None);
    }
}

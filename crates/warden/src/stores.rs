//! The supervisor's in-memory stores.
//!
//! Each store is a map behind its own reader-writer lock. Guards never
//! escape a method, so every exit path releases the lock.

use std::collections::HashMap;
use std::hash::Hash;

use tokio::sync::RwLock;
use uuid::Uuid;
use warden_core::{BearerToken, Credential, KeyExchange};

/// A map behind a reader-writer lock.
#[derive(Debug)]
pub struct LockedStore<K, V> {
    entries: RwLock<HashMap<K, V>>,
}

impl<K, V> Default for LockedStore<K, V> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash, V> LockedStore<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look at an entry under the read lock.
    pub async fn read<R>(&self, key: &K, f: impl FnOnce(&V) -> R) -> Option<R> {
        let entries = self.entries.read().await;
        entries.get(key).map(f)
    }

    /// Insert an entry, returning the one it replaced.
    pub async fn insert(&self, key: K, value: V) -> Option<V> {
        let mut entries = self.entries.write().await;
        entries.insert(key, value)
    }

    /// Remove and return an entry. Lookup and removal happen under one
    /// write lock, so only one caller can ever take a given entry.
    pub async fn remove(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.write().await;
        entries.remove(key)
    }

    /// Keep only entries matching `keep`; returns how many were dropped.
    pub async fn retain(&self, mut keep: impl FnMut(&K, &V) -> bool) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|k, v| keep(k, v));
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Insert many entries under a single write lock.
    pub async fn extend(&self, items: impl IntoIterator<Item = (K, V)>) {
        let mut entries = self.entries.write().await;
        entries.extend(items);
    }
}

/// In-flight key exchanges by request id.
pub type KexStore = LockedStore<Uuid, KeyExchange>;

/// Live bearer tokens by token value.
pub type TokenStore = LockedStore<String, BearerToken>;

/// Credentials by user name.
pub type CredentialStore = LockedStore<String, Credential>;

impl KexStore {
    /// Drop every expired exchange.
    pub async fn sweep_expired(&self) -> usize {
        self.retain(|_, kex| !kex.is_expired()).await
    }
}

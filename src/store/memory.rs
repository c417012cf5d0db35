//! In-process cache storage.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{CacheStorage, CacheStore};
use crate::error::Result;
use crate::request::CachedResponse;

type Entries = Arc<RwLock<HashMap<String, CachedResponse>>>;

/// Cache storage held entirely in memory.
///
/// Cloning shares the same underlying stores.
#[derive(Debug, Clone, Default)]
pub struct MemoryCacheStorage {
    caches: Arc<RwLock<HashMap<String, Entries>>>,
}

impl MemoryCacheStorage {
    /// Creates empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the names of all existing stores, sorted.
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.caches.read().await.keys().cloned().collect();
        names.sort();
        names
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    type Store = MemoryCache;

    async fn open(&self, name: &str) -> Result<MemoryCache> {
        let mut caches = self.caches.write().await;
        let entries = caches.entry(name.to_string()).or_default();
        Ok(MemoryCache {
            name: name.to_string(),
            entries: Arc::clone(entries),
        })
    }

    async fn has(&self, name: &str) -> Result<bool> {
        Ok(self.caches.read().await.contains_key(name))
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        Ok(self.caches.write().await.remove(name).is_some())
    }
}

/// Handle to one in-memory store.
///
/// Deleting the store from its [`MemoryCacheStorage`] detaches this handle:
/// it keeps working on entries no longer reachable by name.
#[derive(Debug, Clone)]
pub struct MemoryCache {
    name: String,
    entries: Entries,
}

#[async_trait]
impl CacheStore for MemoryCache {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &str) -> Result<Option<CachedResponse>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, response: CachedResponse) -> Result<()> {
        self.entries.write().await.insert(key.to_string(), response);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.entries.write().await.remove(key).is_some())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self.entries.read().await.keys().cloned().collect())
    }
}

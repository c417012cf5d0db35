//! Named blob stores, abstracted for testability.
//!
//! A [`CacheStorage`] hands out independently named [`CacheStore`]s, each a
//! key → [`CachedResponse`] map. Implementations must create a store on first
//! open. A handle obtained before its store was deleted may keep working on
//! a detached copy or fail; callers re-open after deleting.

mod disk;
mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::request::CachedResponse;

pub use disk::{DiskCache, DiskCacheStorage};
pub use memory::{MemoryCache, MemoryCacheStorage};

/// Collection of named cache stores.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Handle type returned by [`open`](Self::open).
    type Store: CacheStore;

    /// Opens the named store, creating it empty if absent.
    async fn open(&self, name: &str) -> Result<Self::Store>;

    /// Returns true if the named store exists.
    async fn has(&self, name: &str) -> Result<bool>;

    /// Deletes the named store and all its entries. Returns false if it did
    /// not exist.
    async fn delete(&self, name: &str) -> Result<bool>;
}

/// A single named store of cached responses.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Name the store was opened under.
    fn name(&self) -> &str;

    /// Looks up an entry by key.
    async fn get(&self, key: &str) -> Result<Option<CachedResponse>>;

    /// Inserts or replaces an entry.
    async fn put(&self, key: &str, response: CachedResponse) -> Result<()>;

    /// Removes an entry. Returns false if it was not present.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Lists every key in the store.
    async fn keys(&self) -> Result<Vec<String>>;
}

/// Copies every entry of `from` into `to`, overwriting existing keys.
///
/// Returns the number of entries copied.
///
/// # Errors
///
/// Returns the first store error encountered.
pub async fn copy_entries<A, B>(from: &A, to: &B) -> Result<usize>
where
    A: CacheStore + ?Sized,
    B: CacheStore + ?Sized,
{
    let mut copied = 0;
    for key in from.keys().await? {
        if let Some(response) = from.get(&key).await? {
            to.put(&key, response).await?;
            copied += 1;
        }
    }
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn copy_overwrites_and_counts() {
        let storage = MemoryCacheStorage::new();
        let staging = storage.open("staging").await.unwrap();
        let content = storage.open("content").await.unwrap();

        staging
            .put("https://app.test/a", CachedResponse::new("https://app.test/a", 200, "new"))
            .await
            .unwrap();
        staging
            .put("https://app.test/b", CachedResponse::new("https://app.test/b", 200, "b"))
            .await
            .unwrap();
        content
            .put("https://app.test/a", CachedResponse::new("https://app.test/a", 200, "old"))
            .await
            .unwrap();

        assert_eq!(copy_entries(&staging, &content).await.unwrap(), 2);

        let a = content.get("https://app.test/a").await.unwrap().unwrap();
        assert_eq!(a.body, "new");
        assert_eq!(content.keys().await.unwrap().len(), 2);
    }
}

//! Test doubles shared by the unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{Error, Result};
use crate::fetch::Fetcher;
use crate::manifest::Manifest;
use crate::origin::ServingOrigin;
use crate::request::{CacheMode, CachedResponse, Request};
use crate::store::{CacheStorage, CacheStore, MemoryCache, MemoryCacheStorage};

pub const ORIGIN: &str = "https://app.test";

pub fn origin() -> ServingOrigin {
    ServingOrigin::parse(ORIGIN).unwrap()
}

/// Absolute URL for a manifest path.
pub fn url(path: &str) -> String {
    origin().url_for(path).unwrap().to_string()
}

pub fn manifest(resources: &[(&str, &str)], core: &[&str]) -> Manifest {
    Manifest::new(
        resources
            .iter()
            .map(|(p, h)| ((*p).to_string(), (*h).to_string()))
            .collect(),
        core.iter().map(|p| (*p).to_string()).collect(),
    )
    .unwrap()
}

#[derive(Clone)]
enum Reply {
    Status(u16, Bytes),
    Fail,
}

/// Scripted fetcher. Unscripted URLs answer 404.
#[derive(Default)]
pub struct MockFetcher {
    replies: Mutex<HashMap<String, Reply>>,
    offline: AtomicBool,
    calls: Mutex<Vec<(String, CacheMode)>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves `body` with status 200 for the manifest path.
    pub fn serve(&self, path: &str, body: &str) -> &Self {
        self.serve_status(path, 200, body)
    }

    pub fn serve_status(&self, path: &str, status: u16, body: &str) -> &Self {
        self.replies
            .lock()
            .unwrap()
            .insert(url(path), Reply::Status(status, Bytes::copy_from_slice(body.as_bytes())));
        self
    }

    /// Makes fetches of the manifest path fail at the transport level.
    pub fn fail(&self, path: &str) -> &Self {
        self.replies.lock().unwrap().insert(url(path), Reply::Fail);
        self
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_for(&self, path: &str) -> usize {
        let target = url(path);
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(u, _)| *u == target)
            .count()
    }

    pub fn modes(&self) -> Vec<CacheMode> {
        self.calls.lock().unwrap().iter().map(|(_, m)| *m).collect()
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, request: &Request) -> Result<CachedResponse> {
        let key = request.cache_key();
        self.calls
            .lock()
            .unwrap()
            .push((key.clone(), request.cache_mode()));
        // Let concurrent callers interleave like a real network would.
        tokio::task::yield_now().await;
        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::network(key, "offline"));
        }
        let reply = self.replies.lock().unwrap().get(&key).cloned();
        match reply {
            Some(Reply::Status(status, body)) => Ok(CachedResponse {
                url: key,
                status,
                headers: std::collections::BTreeMap::new(),
                body,
            }),
            Some(Reply::Fail) => Err(Error::network(key, "connection reset")),
            None => Ok(CachedResponse::new(key, 404, "not found")),
        }
    }
}

/// Memory storage that counts opens and can be told to fail writes or
/// store deletions.
#[derive(Clone, Default)]
pub struct ProbeStorage {
    inner: MemoryCacheStorage,
    opens: Arc<AtomicUsize>,
    failing_puts: Arc<Mutex<HashSet<String>>>,
    failing_deletes: Arc<Mutex<HashSet<String>>>,
}

impl ProbeStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Every put into the named store fails from now on.
    pub fn fail_puts_to(&self, name: &str) {
        self.failing_puts.lock().unwrap().insert(name.to_string());
    }

    /// Deleting the named store fails from now on.
    pub fn fail_deletes_of(&self, name: &str) {
        self.failing_deletes.lock().unwrap().insert(name.to_string());
    }

    pub async fn names(&self) -> Vec<String> {
        self.inner.names().await
    }

    /// Reads a store without counting the open.
    pub async fn peek(&self, name: &str) -> MemoryCache {
        self.inner.open(name).await.unwrap()
    }

    /// Sorted manifest paths currently in the named store.
    pub async fn paths_in(&self, name: &str) -> Vec<String> {
        let origin = origin();
        let mut paths: Vec<_> = self
            .peek(name)
            .await
            .keys()
            .await
            .unwrap()
            .iter()
            .filter_map(|k| origin.key_path(k))
            .collect();
        paths.sort();
        paths
    }
}

#[async_trait]
impl CacheStorage for ProbeStorage {
    type Store = ProbeCache;

    async fn open(&self, name: &str) -> Result<ProbeCache> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(ProbeCache {
            inner: self.inner.open(name).await?,
            failing_puts: Arc::clone(&self.failing_puts),
        })
    }

    async fn has(&self, name: &str) -> Result<bool> {
        self.inner.has(name).await
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        let failing = self.failing_deletes.lock().unwrap().contains(name);
        if failing {
            return Err(Error::store(name, "store is locked"));
        }
        self.inner.delete(name).await
    }
}

pub struct ProbeCache {
    inner: MemoryCache,
    failing_puts: Arc<Mutex<HashSet<String>>>,
}

#[async_trait]
impl CacheStore for ProbeCache {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn get(&self, key: &str) -> Result<Option<CachedResponse>> {
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, response: CachedResponse) -> Result<()> {
        let failing = self.failing_puts.lock().unwrap().contains(self.inner.name());
        if failing {
            return Err(Error::store(self.inner.name(), "quota exceeded"));
        }
        self.inner.put(key, response).await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.inner.delete(key).await
    }

    async fn keys(&self) -> Result<Vec<String>> {
        self.inner.keys().await
    }
}

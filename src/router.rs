//! Per-request routing between the content store and the network.

use std::sync::Arc;

use crate::config::CacheConfig;
use crate::error::Result;
use crate::fetch::Fetcher;
use crate::manifest::Manifest;
use crate::origin::{ROOT_PATH, ServingOrigin};
use crate::request::{CachedResponse, Request};
use crate::store::{CacheStorage, CacheStore};

/// What the host should do with an intercepted request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routed {
    /// Not ours: let the host perform its default network behavior.
    Passthrough,
    /// Answer the request with this response.
    Response(CachedResponse),
}

impl Routed {
    /// Returns the response, if the request was handled.
    #[must_use]
    pub fn into_response(self) -> Option<CachedResponse> {
        match self {
            Self::Passthrough => None,
            Self::Response(response) => Some(response),
        }
    }
}

/// Decides per request between passthrough, cache-first and online-first.
pub struct Router<S: CacheStorage, F: Fetcher> {
    storage: Arc<S>,
    fetcher: Arc<F>,
    manifest: Arc<Manifest>,
    origin: ServingOrigin,
    config: CacheConfig,
}

impl<S: CacheStorage, F: Fetcher> Router<S, F> {
    /// Creates a router over the content store named in `config`.
    #[must_use]
    pub const fn new(
        storage: Arc<S>,
        fetcher: Arc<F>,
        manifest: Arc<Manifest>,
        origin: ServingOrigin,
        config: CacheConfig,
    ) -> Self {
        Self {
            storage,
            fetcher,
            manifest,
            origin,
            config,
        }
    }

    /// Returns the manifest path this router would serve `request` as, or
    /// `None` if the request is not intercepted.
    #[must_use]
    pub fn route_path(&self, request: &Request) -> Option<String> {
        if !request.is_get() {
            return None;
        }
        self.origin
            .request_path(request.url())
            .filter(|path| self.manifest.contains(path))
    }

    /// Routes one request.
    ///
    /// # Errors
    ///
    /// Propagates the network failure of an uncached resource, the network
    /// failure of the root document when no cached copy exists, and store
    /// errors on the read path.
    pub async fn route(&self, request: &Request) -> Result<Routed> {
        let Some(path) = self.route_path(request) else {
            return Ok(Routed::Passthrough);
        };
        let response = if path == ROOT_PATH {
            self.online_first(request).await?
        } else {
            self.cache_first(request).await?
        };
        Ok(Routed::Response(response))
    }

    /// Serves from the content store, fetching and storing on a miss.
    async fn cache_first(&self, request: &Request) -> Result<CachedResponse> {
        let content = self.storage.open(&self.config.names.content).await?;
        let key = request.cache_key();
        if let Some(cached) = content.get(&key).await? {
            return Ok(cached);
        }

        let response = self.fetcher.fetch(request).await?;
        if response.is_ok() {
            self.store(&content, &key, &response).await;
        }
        Ok(response)
    }

    /// Prefers the network; falls back to the cached copy on transport failure.
    async fn online_first(&self, request: &Request) -> Result<CachedResponse> {
        let key = request.cache_key();
        match self.fetcher.fetch(request).await {
            Ok(response) => {
                let content = self.storage.open(&self.config.names.content).await?;
                self.store(&content, &key, &response).await;
                Ok(response)
            }
            Err(network_error) => {
                log::debug!("Root document fetch failed, trying cache: {network_error}");
                let content = self.storage.open(&self.config.names.content).await?;
                content.get(&key).await?.ok_or(network_error)
            }
        }
    }

    /// Best-effort write; the live response is returned either way.
    async fn store(&self, content: &S::Store, key: &str, response: &CachedResponse) {
        if let Err(e) = content.put(key, response.clone()).await {
            log::warn!("Could not cache {key}: {e}");
        }
    }
}

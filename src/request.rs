//! Request and response blobs exchanged with stores and fetchers.

use std::collections::BTreeMap;

use bytes::Bytes;
use reqwest::Method;
use url::Url;

use crate::error::{Error, Result};

/// How a fetch should interact with intermediate HTTP caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    /// Let the transport use its normal caching rules.
    #[default]
    Default,
    /// Revalidate with the origin, bypassing any intermediate cache.
    Reload,
}

/// An outgoing resource request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    url: Url,
    method: Method,
    cache_mode: CacheMode,
}

impl Request {
    /// Creates a GET request for the given absolute URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] if `url` is not an absolute URL.
    pub fn get(url: &str) -> Result<Self> {
        let url = Url::parse(url).map_err(|e| Error::InvalidUrl(format!("{url}: {e}")))?;
        Ok(Self::from_url(url))
    }

    /// Creates a GET request from an already parsed URL.
    #[must_use]
    pub const fn from_url(url: Url) -> Self {
        Self {
            url,
            method: Method::GET,
            cache_mode: CacheMode::Default,
        }
    }

    /// Sets the request method.
    #[must_use]
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Sets the cache mode.
    #[must_use]
    pub const fn with_cache_mode(mut self, mode: CacheMode) -> Self {
        self.cache_mode = mode;
        self
    }

    /// Returns the request URL.
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// Returns the request method.
    #[must_use]
    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the cache mode.
    #[must_use]
    pub const fn cache_mode(&self) -> CacheMode {
        self.cache_mode
    }

    /// Returns true for GET requests, the only ones that are ever cached.
    #[must_use]
    pub fn is_get(&self) -> bool {
        self.method == Method::GET
    }

    /// The key this request is stored under: its URL without the fragment.
    #[must_use]
    pub fn cache_key(&self) -> String {
        let mut url = self.url.clone();
        url.set_fragment(None);
        url.into()
    }
}

/// A response as held by a cache store: status, headers and body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    /// URL the response was fetched from.
    pub url: String,
    /// HTTP status code.
    pub status: u16,
    /// Response headers, lower-cased names.
    pub headers: BTreeMap<String, String>,
    /// Response body.
    pub body: Bytes,
}

impl CachedResponse {
    /// Creates a response with no headers.
    pub fn new(url: impl Into<String>, status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            url: url.into(),
            status,
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Returns true for a 2xx status.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

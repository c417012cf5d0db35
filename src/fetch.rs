//! Network access, abstracted for testability.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CACHE_CONTROL, HeaderValue, PRAGMA};

use crate::error::Result;
use crate::request::{CacheMode, CachedResponse, Request};

/// Abstraction over the network transport.
///
/// A resolved fetch returns the response whatever its status; only
/// transport-level failures are errors.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Performs the request.
    async fn fetch(&self, request: &Request) -> Result<CachedResponse>;
}

/// Default fetcher backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Creates a fetcher with a pooled client.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialized.
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .tcp_keepalive(Duration::from_secs(30))
            .build()?;
        Ok(Self { client })
    }

    /// Wraps an existing client.
    #[must_use]
    pub const fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &Request) -> Result<CachedResponse> {
        let mut builder = self
            .client
            .request(request.method().clone(), request.url().clone());
        if request.cache_mode() == CacheMode::Reload {
            builder = builder
                .header(CACHE_CONTROL, HeaderValue::from_static("no-cache"))
                .header(PRAGMA, HeaderValue::from_static("no-cache"));
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let url = response.url().to_string();
        let headers: BTreeMap<_, _> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await?;

        log::debug!("Fetched {url}: {status} ({} bytes)", body.len());
        Ok(CachedResponse {
            url,
            status,
            headers,
            body,
        })
    }
}

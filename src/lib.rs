//! shell-cache - An offline asset cache for single-page web applications.
//!
//! The cache sits between an application and its origin server. At install
//! it stages the core shell; at activation it reconciles its stores against
//! the build's asset manifest so only changed files are refetched; at
//! runtime it answers requests cache-first, except the root document which
//! prefers the network. On request it downloads everything the manifest
//! lists for offline use.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use shell_cache::{
//!     CacheConfig, Command, DiskCacheStorage, HttpFetcher, Manifest, Request, ServingOrigin,
//!     ShellWorker,
//! };
//!
//! # async fn example() -> shell_cache::Result<()> {
//! let manifest = Manifest::load(Path::new("build/asset-manifest.json"))?;
//! let (worker, _events) = ShellWorker::new(
//!     Arc::new(DiskCacheStorage::new("/var/lib/shell-cache")),
//!     Arc::new(HttpFetcher::new()?),
//!     Arc::new(manifest),
//!     ServingOrigin::parse("https://app.example.com")?,
//!     CacheConfig::default(),
//! );
//!
//! worker.on_install().await?;
//! worker.on_activate().await?;
//!
//! let routed = worker
//!     .on_fetch(&Request::get("https://app.example.com/main.dart.js")?)
//!     .await?;
//! println!("served from cache or network: {}", routed.into_response().is_some());
//!
//! worker.on_message(Command::DownloadOffline).await?;
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod config;
pub mod download;
pub mod error;
pub mod fetch;
pub mod lifecycle;
pub mod manifest;
pub mod origin;
pub mod reconcile;
pub mod request;
pub mod router;
pub mod stats;
pub mod store;
pub mod worker;

#[cfg(feature = "cli")]
pub mod cli;

#[cfg(test)]
mod testing;

// Re-export main types for convenience
pub use config::{AppConfig, CacheConfig, CacheNames};
pub use download::{DownloadProgress, NoProgress, OfflineDownloader};
pub use error::{Error, Result};
pub use fetch::{Fetcher, HttpFetcher};
pub use lifecycle::{CacheState, Command, WorkerEvent, WorkerPhase};
pub use manifest::{Manifest, ResourceHashes};
pub use origin::ServingOrigin;
pub use reconcile::Reconciler;
pub use request::{CacheMode, CachedResponse, Request};
pub use router::{Routed, Router};
pub use stats::{ActivationMode, ActivationReport, DownloadReport, FailedResource};
pub use store::{
    CacheStorage, CacheStore, DiskCache, DiskCacheStorage, MemoryCache, MemoryCacheStorage,
};
pub use worker::{ActivationOutcome, MessageOutcome, ShellWorker};

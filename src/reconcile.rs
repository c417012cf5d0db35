//! Install-time staging and activation-time reconciliation of the stores.
//!
//! Three stores are involved. Staging holds the core shell fetched at
//! install. Content is the long-lived store requests are served from.
//! The manifest store holds the manifest of the version that last activated
//! successfully. Activation diffs that record against the current manifest
//! so unchanged content survives an upgrade, then promotes staging into
//! content.
//!
//! Activation is all-or-nothing for the content store: any failure deletes
//! all three stores and leaves the [`CacheState`] at `Failed`, so the next
//! activation starts from scratch.

use std::sync::Arc;

use futures::{StreamExt, TryStreamExt, stream};
use tokio::sync::Mutex;

use crate::config::CacheConfig;
use crate::error::{Error, Result};
use crate::fetch::Fetcher;
use crate::lifecycle::CacheState;
use crate::manifest::{Manifest, ResourceHashes, parse_record};
use crate::origin::ServingOrigin;
use crate::request::{CacheMode, CachedResponse, Request};
use crate::stats::{ActivationMode, ActivationReport};
use crate::store::{CacheStorage, CacheStore, copy_entries};

/// Owns the staging/content/manifest store lifecycle.
pub struct Reconciler<S: CacheStorage, F: Fetcher> {
    storage: Arc<S>,
    fetcher: Arc<F>,
    manifest: Arc<Manifest>,
    origin: ServingOrigin,
    config: CacheConfig,
    state: Mutex<CacheState>,
}

impl<S: CacheStorage, F: Fetcher> Reconciler<S, F> {
    /// Creates a reconciler in the `ColdStart` state.
    #[must_use]
    pub fn new(
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
            state: Mutex::new(CacheState::ColdStart),
        }
    }

    /// Current cache state.
    pub async fn state(&self) -> CacheState {
        *self.state.lock().await
    }

    /// Fetches every core shell path into the staging store.
    ///
    /// Nothing is stored unless every fetch resolves with an ok status.
    /// Returns the number of staged entries.
    ///
    /// # Errors
    ///
    /// Returns the first transport failure, [`Error::BadStatus`] for a
    /// non-ok response, or a store error.
    pub async fn stage_core_shell(&self) -> Result<usize> {
        let mode = if self.config.reload_core_on_install {
            CacheMode::Reload
        } else {
            CacheMode::Default
        };
        let requests = self
            .manifest
            .core()
            .iter()
            .map(|path| Ok(Request::from_url(self.origin.url_for(path)?).with_cache_mode(mode)))
            .collect::<Result<Vec<_>>>()?;

        let fetcher = &self.fetcher;
        let entries: Vec<(String, CachedResponse)> = stream::iter(requests)
            .map(|request| async move {
                let response = fetcher.fetch(&request).await?;
                if !response.is_ok() {
                    return Err(Error::BadStatus {
                        url: request.cache_key(),
                        status: response.status,
                    });
                }
                Ok((request.cache_key(), response))
            })
            .buffered(self.config.fetch_concurrency())
            .try_collect()
            .await?;

        let staging = self.storage.open(&self.config.names.staging).await?;
        for (key, response) in &entries {
            staging.put(key, response.clone()).await?;
        }
        log::info!("Staged {} core shell file(s)", entries.len());
        Ok(entries.len())
    }

    /// Reconciles the stores for this version.
    ///
    /// On failure every store has already been deleted when this returns.
    ///
    /// # Errors
    ///
    /// Returns [`Error::State`] if another activation is running, otherwise
    /// the failure that caused the teardown.
    pub async fn activate(&self) -> Result<ActivationReport> {
        self.state.lock().await.begin_reconcile()?;

        let result = self.reconcile().await;
        if let Err(e) = &result {
            log::error!("Failed to reconcile caches: {e}");
            self.teardown().await;
        }

        self.state.lock().await.finish_reconcile(result.is_ok())?;
        result
    }

    async fn reconcile(&self) -> Result<ActivationReport> {
        let names = &self.config.names;
        let mut content = self.storage.open(&names.content).await?;
        let staging = self.storage.open(&names.staging).await?;
        let records = self.storage.open(&names.manifest).await?;

        let report = match self.read_record(&records).await? {
            None => {
                log::info!("No manifest record found, rebuilding content store");
                self.storage.delete(&names.content).await?;
                content = self.storage.open(&names.content).await?;
                ActivationReport::fresh(copy_entries(&staging, &content).await?)
            }
            Some(previous) => {
                let (evicted, retained) = self.evict_stale(&content, &previous).await?;
                // Staged core files overwrite anything that survived.
                let promoted = copy_entries(&staging, &content).await?;
                ActivationReport {
                    mode: ActivationMode::Incremental,
                    evicted,
                    retained,
                    promoted,
                }
            }
        };

        self.storage.delete(&names.staging).await?;
        self.write_record(&records).await?;

        log::info!(
            "Caches reconciled ({:?}): {} promoted, {} retained, {} evicted",
            report.mode,
            report.promoted,
            report.retained,
            report.evicted.len()
        );
        Ok(report)
    }

    /// Deletes content entries that are gone from the manifest or whose hash
    /// changed since `previous`. Returns the evicted paths and the number of
    /// entries kept.
    async fn evict_stale(
        &self,
        content: &S::Store,
        previous: &ResourceHashes,
    ) -> Result<(Vec<String>, usize)> {
        let mut evicted = Vec::new();
        let mut retained = 0;
        for key in content.keys().await? {
            let path = self.origin.key_path(&key);
            let unchanged = path
                .as_deref()
                .is_some_and(|p| self.manifest.is_unchanged(p, previous));
            if unchanged {
                retained += 1;
            } else {
                content.delete(&key).await?;
                log::debug!("Evicted {key}");
                evicted.push(path.unwrap_or(key));
            }
        }
        evicted.sort();
        Ok((evicted, retained))
    }

    async fn read_record(&self, records: &S::Store) -> Result<Option<ResourceHashes>> {
        records
            .get(&self.config.names.record_key)
            .await?
            .map(|record| parse_record(&record.body))
            .transpose()
    }

    async fn write_record(&self, records: &S::Store) -> Result<()> {
        let record = CachedResponse::new(
            self.config.names.record_key.clone(),
            200,
            self.manifest.to_record_json()?,
        )
        .with_header("content-type", "application/json");
        records.put(&self.config.names.record_key, record).await
    }

    /// Deletes every store. Failures are logged and do not stop the rest.
    ///
    /// A concurrent router read may still hit a store being deleted here; the
    /// next activation repairs whatever it leaves behind.
    async fn teardown(&self) {
        let names = &self.config.names;
        for name in [&names.content, &names.staging, &names.manifest] {
            if let Err(e) = self.storage.delete(name).await {
                log::warn!("Could not delete cache store '{name}': {e}");
            }
        }
    }
}

//! Filling the content store with every manifest resource for offline use.

use std::collections::HashSet;
use std::sync::Arc;

use futures::{StreamExt, stream};

use crate::config::CacheConfig;
use crate::error::{Error, Result};
use crate::fetch::Fetcher;
use crate::manifest::Manifest;
use crate::origin::ServingOrigin;
use crate::request::Request;
use crate::stats::{DownloadReport, DownloadReportBuilder};
use crate::store::{CacheStorage, CacheStore};

/// Trait for receiving offline download progress updates.
///
/// All methods have default no-op implementations for convenience.
pub trait DownloadProgress: Send + Sync {
    /// Called once with the number of resources about to be fetched.
    fn on_start(&self, _missing: usize) {}

    /// Called when a resource has been fetched and stored.
    fn on_resource_complete(&self, _path: &str, _bytes: u64) {}

    /// Called when a resource could not be fetched or stored.
    fn on_error(&self, _path: &str, _error: &str) {}
}

/// A null progress implementation that ignores all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl DownloadProgress for NoProgress {}

/// Fetches manifest resources that the content store does not hold yet.
pub struct OfflineDownloader<S: CacheStorage, F: Fetcher> {
    storage: Arc<S>,
    fetcher: Arc<F>,
    manifest: Arc<Manifest>,
    origin: ServingOrigin,
    config: CacheConfig,
}

impl<S: CacheStorage, F: Fetcher> OfflineDownloader<S, F> {
    /// Creates a downloader over the content store named in `config`.
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

    /// Manifest paths with no entry in `content`, sorted.
    async fn missing_in(&self, content: &S::Store) -> Result<(Vec<String>, usize)> {
        let present: HashSet<String> = content
            .keys()
            .await?
            .iter()
            .filter_map(|key| self.origin.key_path(key))
            .collect();
        let missing: Vec<String> = self
            .manifest
            .paths()
            .filter(|path| !present.contains(*path))
            .map(str::to_string)
            .collect();
        let already_cached = self.manifest.len() - missing.len();
        Ok((missing, already_cached))
    }

    /// Lists manifest paths the content store does not hold, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the content store cannot be read.
    pub async fn missing_paths(&self) -> Result<Vec<String>> {
        let content = self.storage.open(&self.config.names.content).await?;
        Ok(self.missing_in(&content).await?.0)
    }

    /// Fetches and stores one resource, returning the stored byte count.
    async fn fetch_one(&self, content: &S::Store, path: &str) -> Result<u64> {
        let request = Request::from_url(self.origin.url_for(path)?);
        let response = self.fetcher.fetch(&request).await?;
        if !response.is_ok() {
            return Err(Error::BadStatus {
                url: request.cache_key(),
                status: response.status,
            });
        }
        let bytes = response.body.len() as u64;
        content.put(&request.cache_key(), response).await?;
        Ok(bytes)
    }

    /// Downloads every missing resource into the content store.
    ///
    /// Each resource is stored as soon as it arrives. Failures do not abort
    /// the rest; they are logged and listed in the report.
    ///
    /// # Errors
    ///
    /// Returns an error only if the content store cannot be opened or listed.
    pub async fn download_offline(
        &self,
        progress: &Arc<dyn DownloadProgress>,
    ) -> Result<DownloadReport> {
        let mut builder = DownloadReportBuilder::new();
        let content = self.storage.open(&self.config.names.content).await?;
        let (missing, already_cached) = self.missing_in(&content).await?;
        builder.set_already_cached(already_cached);
        progress.on_start(missing.len());

        if missing.is_empty() {
            log::info!("All {} resource(s) already cached", self.manifest.len());
            return Ok(builder.build());
        }
        log::info!("Downloading {} resource(s) for offline use", missing.len());

        let content = &content;
        let results: Vec<_> = stream::iter(missing)
            .map(|path| async move {
                let result = self.fetch_one(content, &path).await;
                match &result {
                    Ok(bytes) => progress.on_resource_complete(&path, *bytes),
                    Err(e) => {
                        log::error!("Offline download of {path} failed: {e}");
                        progress.on_error(&path, &e.to_string());
                    }
                }
                (path, result)
            })
            .buffer_unordered(self.config.fetch_concurrency())
            .collect()
            .await;

        for (path, result) in results {
            match result {
                Ok(bytes) => builder.add_fetched(path, bytes),
                Err(e) => builder.add_failed(path, e.to_string()),
            }
        }

        Ok(builder.build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::request::CachedResponse;
    use crate::testing::{MockFetcher, ProbeStorage, manifest, origin, url};

    const CONTENT: &str = "app-cache";

    #[test]
    fn no_progress_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<NoProgress>();
    }

    #[derive(Default)]
    struct RecordingProgress {
        started: Mutex<Option<usize>>,
        completed: Mutex<Vec<String>>,
        errors: Mutex<Vec<String>>,
    }

    impl DownloadProgress for RecordingProgress {
        fn on_start(&self, missing: usize) {
            *self.started.lock().unwrap() = Some(missing);
        }

        fn on_resource_complete(&self, path: &str, _bytes: u64) {
            self.completed.lock().unwrap().push(path.to_string());
        }

        fn on_error(&self, path: &str, _error: &str) {
            self.errors.lock().unwrap().push(path.to_string());
        }
    }

    fn downloader(
        storage: &ProbeStorage,
        fetcher: &Arc<MockFetcher>,
    ) -> OfflineDownloader<ProbeStorage, MockFetcher> {
        downloader_with(storage, fetcher, CacheConfig::default())
    }

    fn downloader_with(
        storage: &ProbeStorage,
        fetcher: &Arc<MockFetcher>,
        config: CacheConfig,
    ) -> OfflineDownloader<ProbeStorage, MockFetcher> {
        OfflineDownloader::new(
            Arc::new(storage.clone()),
            Arc::clone(fetcher),
            Arc::new(manifest(
                &[("/", "h0"), ("index.html", "h0"), ("main.dart.js", "h1"), ("assets/logo.png", "h2")],
                &["index.html"],
            )),
            origin(),
            config,
        )
    }

    async fn seed(storage: &ProbeStorage, key: &str) {
        storage
            .peek(CONTENT)
            .await
            .put(key, CachedResponse::new(key, 200, "cached"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn missing_paths_normalizes_stored_keys() {
        let storage = ProbeStorage::new();
        let fetcher = Arc::new(MockFetcher::new());
        seed(&storage, &url("index.html")).await;
        seed(&storage, &format!("{}?v=123", url("main.dart.js"))).await;
        seed(&storage, "https://cdn.test/assets/logo.png").await;

        let missing = downloader(&storage, &fetcher).missing_paths().await.unwrap();
        assert_eq!(missing, ["/", "assets/logo.png"]);
    }

    #[tokio::test]
    async fn downloads_exactly_the_missing_set() {
        let storage = ProbeStorage::new();
        let fetcher = Arc::new(MockFetcher::new());
        fetcher
            .serve("/", "<html>")
            .serve("main.dart.js", "main()")
            .serve("assets/logo.png", "png");
        seed(&storage, &url("index.html")).await;

        let progress = Arc::new(RecordingProgress::default());
        let observer: Arc<dyn DownloadProgress> = progress.clone();
        let report = downloader(&storage, &fetcher)
            .download_offline(&observer)
            .await
            .unwrap();

        assert!(report.is_complete());
        assert_eq!(report.fetched, ["/", "assets/logo.png", "main.dart.js"]);
        assert_eq!(report.already_cached, 1);
        assert_eq!(report.total_bytes, 6 + 6 + 3);
        assert_eq!(fetcher.calls_for("index.html"), 0);
        assert_eq!(*progress.started.lock().unwrap(), Some(3));
        assert_eq!(progress.completed.lock().unwrap().len(), 3);
        assert_eq!(
            storage.paths_in(CONTENT).await,
            ["/", "assets/logo.png", "index.html", "main.dart.js"]
        );
    }

    #[tokio::test]
    async fn failures_are_reported_and_successes_kept() {
        let storage = ProbeStorage::new();
        let fetcher = Arc::new(MockFetcher::new());
        fetcher
            .serve("/", "<html>")
            .serve("index.html", "<html>")
            .fail("main.dart.js")
            .serve_status("assets/logo.png", 404, "missing");

        let progress = Arc::new(RecordingProgress::default());
        let observer: Arc<dyn DownloadProgress> = progress.clone();
        let report = downloader(&storage, &fetcher)
            .download_offline(&observer)
            .await
            .unwrap();

        assert!(!report.is_complete());
        assert_eq!(report.fetched, ["/", "index.html"]);
        let failed: Vec<_> = report.failed.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(failed, ["assets/logo.png", "main.dart.js"]);
        assert!(report.failed[0].error.contains("404"));
        assert_eq!(progress.errors.lock().unwrap().len(), 2);
        assert_eq!(storage.paths_in(CONTENT).await, ["/", "index.html"]);
    }

    /// Records how many fetches had been issued at each completion.
    struct FetchCountProgress {
        fetcher: Arc<MockFetcher>,
        seen: Mutex<Vec<usize>>,
    }

    impl DownloadProgress for FetchCountProgress {
        fn on_resource_complete(&self, _path: &str, _bytes: u64) {
            self.seen.lock().unwrap().push(self.fetcher.calls());
        }

        fn on_error(&self, _path: &str, _error: &str) {
            self.seen.lock().unwrap().push(self.fetcher.calls());
        }
    }

    #[tokio::test]
    async fn progress_is_reported_as_each_resource_finishes() {
        let storage = ProbeStorage::new();
        let fetcher = Arc::new(MockFetcher::new());
        fetcher
            .serve("/", "a")
            .serve("main.dart.js", "c")
            .fail("assets/logo.png");
        seed(&storage, &url("index.html")).await;

        let progress = Arc::new(FetchCountProgress {
            fetcher: Arc::clone(&fetcher),
            seen: Mutex::new(Vec::new()),
        });
        let observer: Arc<dyn DownloadProgress> = progress.clone();
        let config = CacheConfig::default().with_concurrent_fetches(1);
        downloader_with(&storage, &fetcher, config)
            .download_offline(&observer)
            .await
            .unwrap();

        assert_eq!(*progress.seen.lock().unwrap(), [1, 2, 3]);
    }

    #[tokio::test]
    async fn nothing_missing_means_no_fetches() {
        let storage = ProbeStorage::new();
        let fetcher = Arc::new(MockFetcher::new());
        for path in ["/", "index.html", "main.dart.js", "assets/logo.png"] {
            seed(&storage, &url(path)).await;
        }

        let observer: Arc<dyn DownloadProgress> = Arc::new(NoProgress);
        let report = downloader(&storage, &fetcher)
            .download_offline(&observer)
            .await
            .unwrap();

        assert!(report.fetched.is_empty());
        assert_eq!(report.already_cached, 4);
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn second_run_after_success_is_a_no_op() {
        let storage = ProbeStorage::new();
        let fetcher = Arc::new(MockFetcher::new());
        fetcher
            .serve("/", "a")
            .serve("index.html", "b")
            .serve("main.dart.js", "c")
            .serve("assets/logo.png", "d");
        let dl = downloader(&storage, &fetcher);
        let observer: Arc<dyn DownloadProgress> = Arc::new(NoProgress);

        dl.download_offline(&observer).await.unwrap();
        assert!(dl.missing_paths().await.unwrap().is_empty());
        let calls = fetcher.calls();
        dl.download_offline(&observer).await.unwrap();
        assert_eq!(fetcher.calls(), calls);
    }
}

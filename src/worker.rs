//! The lifecycle hooks a host dispatches to: install, activate, fetch and
//! message.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};

use crate::config::CacheConfig;
use crate::download::{DownloadProgress, NoProgress, OfflineDownloader};
use crate::error::{Error, Result};
use crate::fetch::Fetcher;
use crate::lifecycle::{CacheState, Command, WorkerEvent, WorkerPhase};
use crate::manifest::Manifest;
use crate::origin::ServingOrigin;
use crate::reconcile::Reconciler;
use crate::request::Request;
use crate::router::{Routed, Router};
use crate::stats::{ActivationReport, DownloadReport};
use crate::store::CacheStorage;

/// Result of an activation the host allowed to run.
#[derive(Debug)]
pub enum ActivationOutcome {
    /// The stores now match the current manifest.
    Reconciled(ActivationReport),
    /// Reconciliation failed and every store was deleted. The worker is
    /// still active, just without cached content.
    Wiped(Error),
}

/// Result of handling an inbound command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    /// The host was asked to activate this version immediately.
    SkipWaiting,
    /// An offline download ran.
    Downloaded(DownloadReport),
}

/// One version of the caching worker.
///
/// Built around one immutable [`Manifest`]; a new deployment constructs a
/// new worker with the new manifest over the same storage.
pub struct ShellWorker<S: CacheStorage, F: Fetcher> {
    reconciler: Reconciler<S, F>,
    router: Router<S, F>,
    downloader: OfflineDownloader<S, F>,
    phase: Mutex<WorkerPhase>,
    events: mpsc::UnboundedSender<WorkerEvent>,
    progress: Arc<dyn DownloadProgress>,
}

impl<S: CacheStorage, F: Fetcher> ShellWorker<S, F> {
    /// Creates a worker and the channel its host events are delivered on.
    #[must_use]
    pub fn new(
        storage: Arc<S>,
        fetcher: Arc<F>,
        manifest: Arc<Manifest>,
        origin: ServingOrigin,
        config: CacheConfig,
    ) -> (Self, mpsc::UnboundedReceiver<WorkerEvent>) {
        let (events, event_rx) = mpsc::unbounded_channel();
        let worker = Self {
            reconciler: Reconciler::new(
                Arc::clone(&storage),
                Arc::clone(&fetcher),
                Arc::clone(&manifest),
                origin.clone(),
                config.clone(),
            ),
            router: Router::new(
                Arc::clone(&storage),
                Arc::clone(&fetcher),
                Arc::clone(&manifest),
                origin.clone(),
                config.clone(),
            ),
            downloader: OfflineDownloader::new(storage, fetcher, manifest, origin, config),
            phase: Mutex::new(WorkerPhase::Parsed),
            events,
            progress: Arc::new(NoProgress),
        };
        (worker, event_rx)
    }

    /// Sets the observer for offline downloads triggered by messages.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn DownloadProgress>) -> Self {
        self.progress = progress;
        self
    }

    /// Current lifecycle phase.
    pub async fn phase(&self) -> WorkerPhase {
        *self.phase.lock().await
    }

    /// Current cache state.
    pub async fn cache_state(&self) -> CacheState {
        self.reconciler.state().await
    }

    /// The request router.
    #[must_use]
    pub const fn router(&self) -> &Router<S, F> {
        &self.router
    }

    /// The offline downloader.
    #[must_use]
    pub const fn downloader(&self) -> &OfflineDownloader<S, F> {
        &self.downloader
    }

    fn emit(&self, event: WorkerEvent) {
        // A host that dropped the receiver does not want events.
        let _ = self.events.send(event);
    }

    async fn set_phase(&self, phase: WorkerPhase) {
        *self.phase.lock().await = phase;
        self.emit(WorkerEvent::PhaseChanged(phase));
    }

    /// Moves to `next` if `allowed` accepts the current phase, checking and
    /// setting under one lock. Returns the phase that was left.
    async fn enter(
        &self,
        next: WorkerPhase,
        allowed: fn(WorkerPhase) -> bool,
        action: &str,
    ) -> Result<WorkerPhase> {
        let mut phase = self.phase.lock().await;
        let previous = *phase;
        if !allowed(previous) {
            return Err(Error::State(format!("cannot {action} from {previous:?}")));
        }
        *phase = next;
        self.emit(WorkerEvent::PhaseChanged(next));
        Ok(previous)
    }

    /// Install hook: asks to skip waiting and stages the core shell.
    ///
    /// On failure the worker becomes [`WorkerPhase::Redundant`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::State`] unless the worker is freshly parsed, or the
    /// staging failure.
    pub async fn on_install(&self) -> Result<usize> {
        self.enter(
            WorkerPhase::Installing,
            |phase| phase == WorkerPhase::Parsed,
            "install",
        )
        .await?;
        self.emit(WorkerEvent::SkipWaiting);

        match self.reconciler.stage_core_shell().await {
            Ok(staged) => {
                self.set_phase(WorkerPhase::Installed).await;
                Ok(staged)
            }
            Err(e) => {
                log::error!("Install failed: {e}");
                self.set_phase(WorkerPhase::Redundant).await;
                Err(e)
            }
        }
    }

    /// Activate hook: reconciles the stores and claims clients.
    ///
    /// A reconciliation failure is not an error for the host: the stores are
    /// wiped, the worker still activates, and [`ActivationOutcome::Wiped`]
    /// reports why.
    ///
    /// # Errors
    ///
    /// Returns [`Error::State`] if the worker is not installed or another
    /// activation is running.
    pub async fn on_activate(&self) -> Result<ActivationOutcome> {
        let previous = self
            .enter(
                WorkerPhase::Activating,
                |phase| matches!(phase, WorkerPhase::Installed | WorkerPhase::Activated),
                "activate",
            )
            .await?;

        let outcome = match self.reconciler.activate().await {
            Ok(report) => {
                self.emit(WorkerEvent::ClientsClaimed);
                ActivationOutcome::Reconciled(report)
            }
            Err(e @ Error::State(_)) => {
                // Only this worker moves into Activating, so nothing else
                // can own the phase here.
                self.set_phase(previous).await;
                return Err(e);
            }
            Err(e) => {
                self.emit(WorkerEvent::CachesWiped {
                    reason: e.to_string(),
                });
                ActivationOutcome::Wiped(e)
            }
        };
        self.set_phase(WorkerPhase::Activated).await;
        Ok(outcome)
    }

    /// Fetch hook. Until this worker has activated every request passes
    /// through; hosts whose activation happened in an earlier process route
    /// through [`router`](Self::router) directly.
    ///
    /// # Errors
    ///
    /// See [`Router::route`].
    pub async fn on_fetch(&self, request: &Request) -> Result<Routed> {
        if self.phase().await != WorkerPhase::Activated {
            return Ok(Routed::Passthrough);
        }
        self.router.route(request).await
    }

    /// Message hook for a decoded command.
    ///
    /// # Errors
    ///
    /// Returns an error if an offline download cannot read the content store.
    pub async fn on_message(&self, command: Command) -> Result<MessageOutcome> {
        match command {
            Command::SkipWaiting => {
                self.emit(WorkerEvent::SkipWaiting);
                Ok(MessageOutcome::SkipWaiting)
            }
            Command::DownloadOffline => {
                let report = self.downloader.download_offline(&self.progress).await?;
                self.emit(WorkerEvent::OfflineDownloadFinished {
                    fetched: report.fetched.len(),
                    failed: report.failed.len(),
                });
                Ok(MessageOutcome::Downloaded(report))
            }
        }
    }

    /// Message hook for raw wire data such as `"downloadOffline"`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownCommand`] for unrecognized data, otherwise as
    /// [`on_message`](Self::on_message).
    pub async fn on_raw_message(&self, data: &str) -> Result<MessageOutcome> {
        self.on_message(data.parse()?).await
    }
}

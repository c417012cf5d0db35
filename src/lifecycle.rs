//! Lifecycle states, host-facing events and inbound commands.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// State of the cache stores as seen by the reconciler.
///
/// Transitions:
///
/// ```text
/// ColdStart ─┐
/// Steady  ───┼─> Reconciling ──> Steady
/// Failed  ───┘               └─> Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CacheState {
    /// No activation has run in this worker.
    #[default]
    ColdStart,
    /// An activation is migrating the stores.
    Reconciling,
    /// The content store matches the current manifest.
    Steady,
    /// The last activation failed and every store was wiped.
    Failed,
}

impl CacheState {
    /// Moves into `Reconciling`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::State`] if a reconciliation is already running.
    pub fn begin_reconcile(&mut self) -> Result<()> {
        match self {
            Self::ColdStart | Self::Steady | Self::Failed => {
                *self = Self::Reconciling;
                Ok(())
            }
            Self::Reconciling => Err(Error::State(
                "reconciliation already in progress".to_string(),
            )),
        }
    }

    /// Leaves `Reconciling` for `Steady` or `Failed`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::State`] if no reconciliation is running.
    pub fn finish_reconcile(&mut self, succeeded: bool) -> Result<()> {
        if *self != Self::Reconciling {
            return Err(Error::State(format!(
                "cannot finish reconciliation from {self:?}"
            )));
        }
        *self = if succeeded { Self::Steady } else { Self::Failed };
        Ok(())
    }
}

/// Lifecycle phase of the worker version itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WorkerPhase {
    /// Created, install not yet run.
    #[default]
    Parsed,
    /// Install (core shell staging) in progress.
    Installing,
    /// Installed, waiting to activate.
    Installed,
    /// Activation in progress.
    Activating,
    /// Active and controlling pages.
    Activated,
    /// Install failed; this version will never activate.
    Redundant,
}

/// Notifications for the host that dispatches lifecycle events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    /// Activate this version immediately instead of waiting.
    SkipWaiting,
    /// Take control of all open pages.
    ClientsClaimed,
    /// The worker moved to a new phase.
    PhaseChanged(WorkerPhase),
    /// Activation failed and all stores were deleted.
    CachesWiped {
        /// Why activation failed.
        reason: String,
    },
    /// An offline download finished.
    OfflineDownloadFinished {
        /// Number of resources fetched and stored.
        fetched: usize,
        /// Number of resources that could not be fetched.
        failed: usize,
    },
}

/// Inbound command from a controlled page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Command {
    /// Activate a waiting worker immediately.
    SkipWaiting,
    /// Fill every manifest resource missing from the content store.
    DownloadOffline,
}

impl Command {
    /// Wire name of the command.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SkipWaiting => "skipWaiting",
            Self::DownloadOffline => "downloadOffline",
        }
    }
}

impl FromStr for Command {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "skipWaiting" => Ok(Self::SkipWaiting),
            "downloadOffline" => Ok(Self::DownloadOffline),
            other => Err(Error::UnknownCommand(other.to_string())),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

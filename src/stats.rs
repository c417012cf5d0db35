//! Reports produced by activation and offline download.

use std::time::{Duration, Instant};

/// How an activation reconciled the content store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationMode {
    /// No manifest record existed; the content store was rebuilt from staging.
    Fresh,
    /// The previous record was diffed and unchanged entries were kept.
    Incremental,
}

/// Outcome of a successful activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationReport {
    /// Which reconciliation path ran.
    pub mode: ActivationMode,
    /// Manifest paths of content entries that were evicted, sorted.
    pub evicted: Vec<String>,
    /// Number of content entries kept because their hash was unchanged.
    pub retained: usize,
    /// Number of staged entries copied into the content store.
    pub promoted: usize,
}

impl ActivationReport {
    /// Report for a fresh rebuild.
    #[must_use]
    pub const fn fresh(promoted: usize) -> Self {
        Self {
            mode: ActivationMode::Fresh,
            evicted: Vec::new(),
            retained: 0,
            promoted,
        }
    }
}

/// A resource the offline downloader could not store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedResource {
    /// Manifest path.
    pub path: String,
    /// Why it failed.
    pub error: String,
}

/// Outcome of an offline download.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadReport {
    /// Paths fetched and stored, sorted.
    pub fetched: Vec<String>,
    /// Resources that could not be fetched or stored, sorted by path.
    pub failed: Vec<FailedResource>,
    /// Paths that were already present.
    pub already_cached: usize,
    /// Total bytes stored.
    pub total_bytes: u64,
    /// Wall time for the whole download.
    pub elapsed: Duration,
}

impl DownloadReport {
    /// True if every missing resource was stored.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Returns the average throughput in bytes per second.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn average_speed(&self) -> u64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            (self.total_bytes as f64 / secs) as u64
        } else {
            0
        }
    }
}

/// Builder for accumulating a [`DownloadReport`] while fetches complete.
pub struct DownloadReportBuilder {
    report: DownloadReport,
    start_time: Instant,
}

impl Default for DownloadReportBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DownloadReportBuilder {
    /// Starts timing a new download.
    #[must_use]
    pub fn new() -> Self {
        Self {
            report: DownloadReport::default(),
            start_time: Instant::now(),
        }
    }

    /// Sets the number of resources already present.
    pub const fn set_already_cached(&mut self, count: usize) {
        self.report.already_cached = count;
    }

    /// Records a stored resource.
    pub fn add_fetched(&mut self, path: String, bytes: u64) {
        self.report.fetched.push(path);
        self.report.total_bytes += bytes;
    }

    /// Records a failed resource.
    pub fn add_failed(&mut self, path: String, error: String) {
        self.report.failed.push(FailedResource { path, error });
    }

    /// Builds the final report.
    #[must_use]
    pub fn build(mut self) -> DownloadReport {
        self.report.fetched.sort();
        self.report.failed.sort_by(|a, b| a.path.cmp(&b.path));
        self.report.elapsed = self.start_time.elapsed();
        self.report
    }
}

//! Progress bar and summary reporting for CLI commands.

use console::style;
use indicatif::{HumanBytes, HumanDuration, ProgressBar, ProgressStyle};

use crate::{ActivationMode, ActivationReport, DownloadProgress, DownloadReport};

const SEPARATOR: &str = "────────────────────────────────────────────────────────────";

/// Progress bar over the resources of one offline download.
pub struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    pub fn new() -> Self {
        let bar = ProgressBar::hidden();
        if let Ok(template) = ProgressStyle::with_template(
            "{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg}",
        ) {
            bar.set_style(template.progress_chars("━━╌"));
        }
        Self { bar }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl DownloadProgress for BarProgress {
    fn on_start(&self, missing: usize) {
        if missing > 0 {
            self.bar.set_length(missing as u64);
            self.bar.set_draw_target(indicatif::ProgressDrawTarget::stderr());
        }
    }

    fn on_resource_complete(&self, path: &str, _bytes: u64) {
        self.bar.set_message(path.to_string());
        self.bar.inc(1);
    }

    fn on_error(&self, path: &str, error: &str) {
        self.bar
            .println(format!("  {} {path}: {error}", style("failed").red()));
        self.bar.inc(1);
    }
}

/// Prints what an activation did to the content store.
pub fn print_activation(report: &ActivationReport) {
    let mode = match report.mode {
        ActivationMode::Fresh => "fresh",
        ActivationMode::Incremental => "incremental",
    };
    println!("\n{SEPARATOR}");
    println!("Activation ({})", style(mode).bold());
    println!("{SEPARATOR}");
    println!("  Promoted from staging:  {}", report.promoted);
    println!("  Retained:               {}", report.retained);
    println!("  Evicted:                {}", report.evicted.len());
    for path in &report.evicted {
        println!("    {}", style(path).dim());
    }
    println!("{SEPARATOR}");
}

/// Prints a summary of an offline download.
pub fn print_summary(report: &DownloadReport) {
    println!("\n{SEPARATOR}");
    println!("Offline Download Summary");
    println!("{SEPARATOR}");

    if report.fetched.is_empty() && report.failed.is_empty() {
        println!("  All {} resource(s) already cached", report.already_cached);
    } else {
        println!("  Resources fetched:  {}", report.fetched.len());
        println!("  Already cached:     {}", report.already_cached);
        println!("  Total size:         {}", HumanBytes(report.total_bytes));
        println!("  Total time:         {}", HumanDuration(report.elapsed));
        println!(
            "  Average speed:      {}/s",
            HumanBytes(report.average_speed())
        );
    }

    if !report.failed.is_empty() {
        println!(
            "  {}",
            style(format!("{} resource(s) failed:", report.failed.len())).red()
        );
        for failure in &report.failed {
            println!("    {} ({})", failure.path, style(&failure.error).dim());
        }
    }

    println!("{SEPARATOR}");
}

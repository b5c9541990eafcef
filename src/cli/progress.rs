//! Progress bar and summary reporting for CLI commands.

use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::{ActivationReport, CacheObserver, InstallReport, Request, format_bytes, format_duration};

const SEPARATOR: &str = "────────────────────────────────────────────────────────────";

/// Progress bar advancing once per pre-cached manifest entry.
pub struct InstallProgress {
    bar: ProgressBar,
}

impl InstallProgress {
    pub fn new() -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} - {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("━━╌"),
        );
        Self { bar }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl CacheObserver for InstallProgress {
    fn on_install_start(&self, generation: &str, entries: usize) {
        self.bar.set_length(entries as u64);
        self.bar.set_message(format!("caching into {generation}"));
    }

    fn on_entry_fetched(&self, url: &str, _bytes: u64) {
        self.bar.inc(1);
        self.bar.set_message(url.to_string());
    }
}

/// Prints one line per generation handled during activation.
pub struct ActivationLog;

impl CacheObserver for ActivationLog {
    fn on_generation_deleted(&self, name: &str) {
        println!("  {} {name}", style("deleted").red());
    }

    fn on_delete_failed(&self, name: &str, error: &str) {
        println!("  {} {name}: {error}", style("failed").yellow());
    }
}

/// Prints the outcome of an install.
pub fn print_install_summary(report: &InstallReport) {
    println!("\n{SEPARATOR}");
    println!("{} {}", style("✓").green(), style("Install complete").bold());
    println!("{SEPARATOR}");
    println!("  Generation:        {}", report.generation);
    println!("  Entries cached:    {}", report.entries);
    println!("  Total size:        {}", format_bytes(report.total_bytes));
    println!("  Total time:        {}", format_duration(report.elapsed));
    println!("{SEPARATOR}");
}

/// Prints the outcome of an activation.
pub fn print_activation_summary(current: &str, report: &ActivationReport) {
    println!("\n{SEPARATOR}");
    println!("Activated {}", style(current).bold());
    if report.deleted.is_empty() && report.failed.is_empty() {
        println!("  No old caches to delete");
    } else {
        println!("  {} old cache(s) deleted", report.deleted.len());
        if !report.is_clean() {
            println!(
                "  {} old cache(s) could not be deleted",
                style(report.failed.len()).yellow()
            );
        }
    }
    println!("{SEPARATOR}");
}

/// Prints every generation and the entries of the current one.
pub fn print_listing(current: &str, generations: &[String], entries: &[Request]) {
    if generations.is_empty() {
        println!("No caches found.");
        return;
    }

    println!("\n{SEPARATOR}");
    println!("Caches:");
    println!("{SEPARATOR}");
    for name in generations {
        if name == current {
            println!("  {} {}", style(name).green(), style("(current)").dim());
        } else {
            println!("  {name} {}", style("(stale)").yellow());
        }
    }
    println!("{SEPARATOR}");
    println!("Entries in {current}:");
    for request in entries {
        println!("  {}", request.url());
    }
    println!("  {} entr(ies)", entries.len());
    println!("{SEPARATOR}\n");
}

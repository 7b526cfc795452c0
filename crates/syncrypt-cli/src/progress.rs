use indicatif::{ProgressBar, ProgressStyle};
use std::cell::RefCell;
use std::time::Duration;
use syncrypt_core::ProgressReporter;

const TICK_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// CLI progress reporter using indicatif progress bars.
///
/// - Scan phase: spinner (total unknown until the walk finishes)
/// - Sync phase: progress bar over the scanned files
pub struct CliReporter {
    bar: RefCell<Option<ProgressBar>>,
}

impl CliReporter {
    pub fn new() -> Self {
        Self {
            bar: RefCell::new(None),
        }
    }

    fn set_bar(&self, pb: ProgressBar) {
        if let Some(old) = self.bar.replace(Some(pb)) {
            old.finish_and_clear();
        }
    }

    fn finish_bar(&self) {
        if let Some(pb) = self.bar.take() {
            pb.finish_and_clear();
        }
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars(TICK_CHARS)
    }

    fn bar_style() -> ProgressStyle {
        ProgressStyle::with_template(
            "  {spinner:.cyan} Syncing [{bar:30.cyan/dim}] {pos}/{len} files ({eta} remaining)",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("━╸─")
        .tick_chars(TICK_CHARS)
    }
}

impl ProgressReporter for CliReporter {
    fn on_scan_start(&self) {
        let pb = ProgressBar::new_spinner();
        pb.set_style(Self::spinner_style());
        pb.set_message("Scanning files...");
        pb.enable_steady_tick(Duration::from_millis(80));
        self.set_bar(pb);
    }

    fn on_scan_complete(&self, files: usize, dirs: usize, duration_secs: f64) {
        self.finish_bar();
        eprintln!(
            "  \x1b[32m✓\x1b[0m Scan complete: {} files, {} directories in {:.2}s",
            files, dirs, duration_secs
        );
    }

    fn on_sync_start(&self, total_files: usize) {
        let pb = ProgressBar::new(total_files as u64);
        pb.set_style(Self::bar_style());
        pb.enable_steady_tick(Duration::from_millis(80));
        self.set_bar(pb);
    }

    fn on_file_synced(&self, index: usize, _total_files: usize, _path: &str) {
        if let Some(pb) = self.bar.borrow().as_ref() {
            pb.set_position(index as u64);
        }
    }

    fn on_sync_complete(&self, duration_secs: f64) {
        self.finish_bar();
        eprintln!(
            "  \x1b[32m✓\x1b[0m Sync complete in {:.2}s",
            duration_secs
        );
    }

    fn on_deletions_detected(&self, flagged: usize) {
        if flagged > 0 {
            eprintln!(
                "  \x1b[33m!\x1b[0m {} files no longer in the source, pending deletion",
                flagged
            );
        }
    }
}

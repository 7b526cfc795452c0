/// Trait for reporting pass progress.
///
/// The CLI implements it with indicatif; tests and quiet runs use [`SilentReporter`].
/// All methods have default no-op implementations.
pub trait ProgressReporter {
    fn on_scan_start(&self) {}
    fn on_scan_complete(&self, _files: usize, _dirs: usize, _duration_secs: f64) {}
    fn on_sync_start(&self, _total_files: usize) {}
    fn on_file_synced(&self, _index: usize, _total_files: usize, _path: &str) {}
    fn on_sync_complete(&self, _duration_secs: f64) {}
    fn on_deletions_detected(&self, _flagged: usize) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}

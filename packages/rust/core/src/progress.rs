//! Progress reporting for pipeline phases.

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase step.
    fn phase(&self, name: &str);
    /// Called before each paper is processed during ingestion.
    fn paper_processed(&self, title: &str, current: usize, total: usize);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn paper_processed(&self, _title: &str, _current: usize, _total: usize) {}
}

//! In-memory counters for a copy run.
//!
//! Plain atomics, one instance per manager. A snapshot summary is logged when
//! the run stops.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct CopyMetrics {
    pub scans: AtomicU64,
    pub scan_errors: AtomicU64,
    pub files_discovered: AtomicU64,

    pub jobs_started: AtomicU64,
    pub jobs_succeeded: AtomicU64,
    pub jobs_failed: AtomicU64,
    pub jobs_cancelled: AtomicU64,

    /// Copy scripts the manager is currently waiting on.
    ///
    /// Shutdown stops the wait without killing the child, so a script still
    /// running after cancellation is no longer counted here.
    pub scripts_running: AtomicU64,
    /// Highest value `scripts_running` has reached.
    pub peak_scripts_running: AtomicU64,
}

impl CopyMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_scan(&self, files: usize) {
        self.scans.fetch_add(1, Ordering::Relaxed);
        self.files_discovered.fetch_add(files as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_scan_errors(&self) {
        self.scan_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_jobs_started(&self) {
        self.jobs_started.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_jobs_succeeded(&self) {
        self.jobs_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_jobs_failed(&self) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_jobs_cancelled(&self) {
        self.jobs_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a script as running until the returned guard is dropped.
    pub fn script_running(&self) -> ScriptRunGuard<'_> {
        let now = self.scripts_running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_scripts_running.fetch_max(now, Ordering::SeqCst);
        ScriptRunGuard { metrics: self }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            scans: self.scans.load(Ordering::Relaxed),
            scan_errors: self.scan_errors.load(Ordering::Relaxed),
            files_discovered: self.files_discovered.load(Ordering::Relaxed),
            jobs_started: self.jobs_started.load(Ordering::Relaxed),
            jobs_succeeded: self.jobs_succeeded.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
            jobs_cancelled: self.jobs_cancelled.load(Ordering::Relaxed),
            scripts_running: self.scripts_running.load(Ordering::SeqCst),
            peak_scripts_running: self.peak_scripts_running.load(Ordering::SeqCst),
        }
    }

    /// Format as Prometheus exposition format
    pub fn prometheus_format(&self) -> String {
        let s = self.snapshot();
        format!(
            r#"# HELP carcopy_scans_total Total directory scans
# TYPE carcopy_scans_total counter
carcopy_scans_total {}

# HELP carcopy_scan_errors_total Scans that failed to read a directory
# TYPE carcopy_scan_errors_total counter
carcopy_scan_errors_total {}

# HELP carcopy_jobs_started_total Copy jobs started
# TYPE carcopy_jobs_started_total counter
carcopy_jobs_started_total {}

# HELP carcopy_jobs_succeeded_total Copy jobs whose CAR file was removed
# TYPE carcopy_jobs_succeeded_total counter
carcopy_jobs_succeeded_total {}

# HELP carcopy_jobs_failed_total Copy jobs that failed and await rediscovery
# TYPE carcopy_jobs_failed_total counter
carcopy_jobs_failed_total {}

# HELP carcopy_scripts_running Copy scripts currently awaited by the manager
# TYPE carcopy_scripts_running gauge
carcopy_scripts_running {}
"#,
            s.scans,
            s.scan_errors,
            s.jobs_started,
            s.jobs_succeeded,
            s.jobs_failed,
            s.scripts_running,
        )
    }
}

pub struct ScriptRunGuard<'a> {
    metrics: &'a CopyMetrics,
}

impl Drop for ScriptRunGuard<'_> {
    fn drop(&mut self) {
        self.metrics.scripts_running.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Immutable snapshot of metrics for reading
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub scans: u64,
    pub scan_errors: u64,
    pub files_discovered: u64,
    pub jobs_started: u64,
    pub jobs_succeeded: u64,
    pub jobs_failed: u64,
    pub jobs_cancelled: u64,
    pub scripts_running: u64,
    pub peak_scripts_running: u64,
}

impl MetricsSnapshot {
    pub fn summary(&self) -> String {
        format!(
            "Scans: {} ({} failed) | Jobs: {} started, {} succeeded, {} failed, {} cancelled | \
             Peak scripts: {}",
            self.scans,
            self.scan_errors,
            self.jobs_started,
            self.jobs_succeeded,
            self.jobs_failed,
            self.jobs_cancelled,
            self.peak_scripts_running,
        )
    }
}

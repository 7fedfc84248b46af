//! Copy job manager
//!
//! One control loop scans the root directory and admits new CAR files; each
//! admitted file becomes a task in a [`JoinSet`] that runs the copy script
//! and then waits for the script to remove the file.
//!
//! Design principles:
//! - Admission (slot + registration) happens in the loop, so a content ID is
//!   never dispatched twice and running jobs never exceed `parallel`
//! - Tasks own their [`JobSlot`]; deregistration cannot be skipped
//! - Every wait observes the shared [`ShutdownToken`]
//! - Job failures are logged and swallowed; the file is simply rediscovered

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use crate::cancel::ShutdownToken;
use crate::config::CopyConfig;
use crate::error::{CopyError, Result};
use crate::metrics::{CopyMetrics, MetricsSnapshot};
use crate::scanner::{scan_car_files, CarFileInfo};
use crate::script::run_copy_script;
use crate::tracker::{Admission, JobSlot, JobTracker};

#[derive(Debug)]
pub struct CopyManager {
    config: CopyConfig,
    tracker: JobTracker,
    metrics: Arc<CopyMetrics>,
}

/// What a job task needs, cloned out of the manager for the spawned task.
#[derive(Clone)]
struct JobContext {
    copy_script: PathBuf,
    removal_poll_interval: Duration,
    metrics: Arc<CopyMetrics>,
}

impl CopyManager {
    /// Validate `config` and build an idle manager.
    pub fn new(config: CopyConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            tracker: JobTracker::new(config.parallel),
            config,
            metrics: Arc::new(CopyMetrics::new()),
        })
    }

    pub fn running_jobs(&self) -> Vec<CarFileInfo> {
        self.tracker.snapshot()
    }

    pub fn running_job_count(&self) -> usize {
        self.tracker.count()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Scan and dispatch until `shutdown` fires or a scan fails.
    ///
    /// Always ends with an error: the cancellation cause, or the fatal scan
    /// error. Outstanding job tasks are drained before returning.
    pub async fn run(&self, shutdown: &ShutdownToken) -> CopyError {
        info!(
            root_car_dir = %self.config.root_car_dir.display(),
            copy_script = %self.config.copy_script.display(),
            parallel = self.config.parallel,
            "Starting copy manager"
        );

        let mut tasks = JoinSet::new();
        let err = self.scan_loop(shutdown, &mut tasks).await;

        if !err.is_cancelled() {
            // Nothing else will cancel the jobs; stop waiting on them here.
            tasks.abort_all();
        }
        if !tasks.is_empty() {
            info!(outstanding = tasks.len(), "Waiting for job tasks to stop");
        }
        while let Some(joined) = tasks.join_next().await {
            log_task_exit(joined);
        }

        info!(summary = %self.metrics.snapshot().summary(), "Copy manager stopped");
        debug!("Final metrics:\n{}", self.metrics.prometheus_format());
        err
    }

    async fn scan_loop(&self, shutdown: &ShutdownToken, tasks: &mut JoinSet<()>) -> CopyError {
        let jobs = JobContext {
            copy_script: self.config.copy_script.clone(),
            removal_poll_interval: self.config.removal_poll_interval,
            metrics: Arc::clone(&self.metrics),
        };

        loop {
            if shutdown.is_cancelled() {
                let err = shutdown.cancelled_error();
                warn!(error = %err, "Stopping scan loop");
                return err;
            }

            while let Some(joined) = tasks.try_join_next() {
                log_task_exit(joined);
            }

            let running = self.tracker.count();
            info!(running_job_count = running, "Running jobs");
            if self.tracker.is_saturated() {
                info!(
                    running_job_count = running,
                    max_parallel = self.config.parallel,
                    "Running job count at limit, waiting"
                );
                if let Err(err) = shutdown.sleep(self.config.saturated_wait).await {
                    return err;
                }
                continue;
            }

            let car_files = match self.scan().await {
                Ok(files) => files,
                Err(err) => {
                    self.metrics.inc_scan_errors();
                    error!(error = %err, "Scan failed");
                    return err;
                }
            };
            let file_count = car_files.len();
            self.metrics.record_scan(file_count);

            let new_jobs = self.tracker.filter_untracked(car_files);
            let mut launched = 0;
            for car_file in new_jobs {
                let slot = match self.tracker.try_admit(car_file) {
                    Admission::Admitted(slot) => slot,
                    Admission::AlreadyRunning => continue,
                    Admission::Saturated => {
                        debug!("No free slot, deferring remaining files to the next scan");
                        break;
                    }
                };

                info!(car_file = %slot.car_file().path.display(), "Adding new job");
                let jobs = jobs.clone();
                let shutdown = shutdown.clone();
                tasks.spawn(async move { jobs.run_job(slot, shutdown).await });
                launched += 1;
            }
            info!(file_count, launched, parallel = self.config.parallel, "Scan pass complete");

            if let Err(err) = shutdown.sleep(self.config.rescan_interval).await {
                return err;
            }
        }
    }

    async fn scan(&self) -> Result<Vec<CarFileInfo>> {
        let root = self.config.root_car_dir.clone();
        Ok(tokio::task::spawn_blocking(move || scan_car_files(&root)).await??)
    }
}

impl JobContext {
    /// Task body: process the job, then record and log its outcome.
    ///
    /// `slot` is dropped last, so the outcome is recorded before the job is
    /// deregistered.
    async fn run_job(&self, slot: JobSlot, shutdown: ShutdownToken) {
        let path = slot.car_file().path.clone();
        match self.process_job(&slot, &shutdown).await {
            Ok(()) => self.metrics.inc_jobs_succeeded(),
            Err(err) if err.is_cancelled() => {
                self.metrics.inc_jobs_cancelled();
                warn!(car_file = %path.display(), error = %err, "Job stopped by shutdown");
            }
            Err(err) => {
                self.metrics.inc_jobs_failed();
                error!(car_file = %path.display(), error = %err, "Job failed, will retry on a later scan");
            }
        }
    }

    /// Copy one CAR file: run the script, then wait for the file to go away.
    async fn process_job(&self, slot: &JobSlot, shutdown: &ShutdownToken) -> Result<()> {
        if shutdown.is_cancelled() {
            return Err(shutdown.cancelled_error());
        }
        let car_file = slot.car_file();
        info!(car_file = %car_file.path.display(), content_id = %car_file.content_id, "Processing job");
        self.metrics.inc_jobs_started();

        {
            let _running = self.metrics.script_running();
            info!(
                copy_script = %self.copy_script.display(),
                car_file = %car_file.path.display(),
                "Running copy script"
            );
            run_copy_script(&self.copy_script, &car_file.path, shutdown).await?;
            info!(car_file = %car_file.path.display(), "Copy script finished");
        }

        info!(car_file = %car_file.path.display(), "Waiting for CAR file removal");
        wait_car_file_removed(&car_file.path, self.removal_poll_interval, shutdown).await?;
        info!(car_file = %car_file.path.display(), "CAR file removed, job done");
        Ok(())
    }
}

/// Poll until `path` no longer exists or shutdown is requested.
///
/// Stat errors other than not-found are logged and retried.
pub async fn wait_car_file_removed(
    path: &Path,
    interval: Duration,
    shutdown: &ShutdownToken,
) -> Result<()> {
    loop {
        if shutdown.is_cancelled() {
            return Err(shutdown.cancelled_error());
        }
        match tokio::fs::metadata(path).await {
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(err) => debug!(car_file = %path.display(), error = %err, "Stat failed, retrying"),
            Ok(_) => {}
        }
        shutdown.sleep(interval).await?;
    }
}

fn log_task_exit(joined: std::result::Result<(), JoinError>) {
    match joined {
        Ok(()) => {}
        Err(err) if err.is_panic() => error!(error = %err, "Job task panicked"),
        Err(err) => debug!(error = %err, "Job task aborted"),
    }
}

//! Run configuration for the copy manager.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{CopyError, Result};

pub const DEFAULT_PARALLEL: usize = 16;
/// Pause before re-checking when every slot is busy.
pub const DEFAULT_SATURATED_WAIT: Duration = Duration::from_secs(20);
/// Interval between existence checks while waiting for the script's cleanup.
pub const DEFAULT_REMOVAL_POLL_INTERVAL: Duration = Duration::from_secs(10);
/// Pause between scan passes when slots are still free.
pub const DEFAULT_RESCAN_INTERVAL: Duration = Duration::from_secs(10);

/// Copy manager configuration (plain data, fixed for the run's lifetime).
#[derive(Debug, Clone)]
pub struct CopyConfig {
    /// Directory holding the batch subdirectories.
    pub root_car_dir: PathBuf,
    /// Script invoked as `<copy_script> <car file path>`.
    pub copy_script: PathBuf,
    /// Maximum number of copy scripts running at once.
    pub parallel: usize,
    pub saturated_wait: Duration,
    pub removal_poll_interval: Duration,
    pub rescan_interval: Duration,
}

impl CopyConfig {
    pub fn new(root_car_dir: impl Into<PathBuf>, copy_script: impl Into<PathBuf>) -> Self {
        Self {
            root_car_dir: root_car_dir.into(),
            copy_script: copy_script.into(),
            parallel: DEFAULT_PARALLEL,
            saturated_wait: DEFAULT_SATURATED_WAIT,
            removal_poll_interval: DEFAULT_REMOVAL_POLL_INTERVAL,
            rescan_interval: DEFAULT_RESCAN_INTERVAL,
        }
    }

    pub fn with_parallel(mut self, parallel: usize) -> Self {
        self.parallel = parallel;
        self
    }

    /// Shrink every wait, for tests and local experiments.
    pub fn with_intervals(
        mut self,
        saturated_wait: Duration,
        removal_poll_interval: Duration,
        rescan_interval: Duration,
    ) -> Self {
        self.saturated_wait = saturated_wait;
        self.removal_poll_interval = removal_poll_interval;
        self.rescan_interval = rescan_interval;
        self
    }

    /// Startup checks. Any failure here is fatal for the run.
    pub fn validate(&self) -> Result<()> {
        let root = metadata(&self.root_car_dir, "root car dir")?;
        if !root.is_dir() {
            return Err(CopyError::Config(format!(
                "root car dir is not a directory: {}",
                self.root_car_dir.display()
            )));
        }

        let script = metadata(&self.copy_script, "copy script")?;
        if script.is_dir() {
            return Err(CopyError::Config(format!(
                "copy script is a directory: {}",
                self.copy_script.display()
            )));
        }

        if self.parallel == 0 {
            return Err(CopyError::Config("parallel must be at least 1".to_string()));
        }
        Ok(())
    }
}

fn metadata(path: &Path, what: &str) -> Result<std::fs::Metadata> {
    std::fs::metadata(path)
        .map_err(|e| CopyError::Config(format!("{} {}: {}", what, path.display(), e)))
}

//! `carcopy run`

use anyhow::{Context, Result};
use carcopy_worker::config::{
    DEFAULT_PARALLEL, DEFAULT_REMOVAL_POLL_INTERVAL, DEFAULT_RESCAN_INTERVAL,
    DEFAULT_SATURATED_WAIT,
};
use carcopy_worker::{CopyConfig, CopyManager, ShutdownToken};
use clap::Args;
use std::path::PathBuf;
use std::time::Duration;

use super::signals::install_shutdown_handler;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Root directory holding the batch subdirectories
    #[arg(long, env = "CARCOPY_ROOT_CAR_DIR")]
    pub root_car_dir: PathBuf,

    /// Script invoked as `<copy-script> <car file>`
    #[arg(long, env = "CARCOPY_COPY_SCRIPT")]
    pub copy_script: PathBuf,

    /// Maximum number of copy scripts running at once
    #[arg(long, default_value_t = DEFAULT_PARALLEL)]
    pub parallel: usize,

    /// Seconds between checks that a copied file was removed
    #[arg(long, default_value_t = DEFAULT_REMOVAL_POLL_INTERVAL.as_secs())]
    pub removal_poll_secs: u64,

    /// Seconds to wait before re-checking when every slot is busy
    #[arg(long, default_value_t = DEFAULT_SATURATED_WAIT.as_secs())]
    pub saturated_wait_secs: u64,

    /// Seconds between scans while slots are free
    #[arg(long, default_value_t = DEFAULT_RESCAN_INTERVAL.as_secs())]
    pub rescan_secs: u64,
}

impl RunArgs {
    fn to_config(&self) -> CopyConfig {
        CopyConfig::new(&self.root_car_dir, &self.copy_script)
            .with_parallel(self.parallel)
            .with_intervals(
                Duration::from_secs(self.saturated_wait_secs),
                Duration::from_secs(self.removal_poll_secs),
                Duration::from_secs(self.rescan_secs),
            )
    }
}

/// Runs until a signal arrives or a scan fails; both end as an error.
pub fn run(args: RunArgs) -> Result<()> {
    let manager = CopyManager::new(args.to_config()).context("Invalid run configuration")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    let shutdown = ShutdownToken::new();
    install_shutdown_handler(&shutdown)?;

    let err = runtime.block_on(manager.run(&shutdown));
    Err(anyhow::Error::new(err).context("Copy run stopped"))
}

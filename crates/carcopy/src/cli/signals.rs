//! SIGINT/SIGTERM handling: the first signal cancels the run.

use anyhow::{Context, Result};
use carcopy_worker::{ShutdownCause, ShutdownToken};
use tracing::warn;

/// Install handlers that cancel `shutdown` with the received signal as cause.
#[cfg(unix)]
pub fn install_shutdown_handler(shutdown: &ShutdownToken) -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals =
        Signals::new([SIGINT, SIGTERM]).context("Failed to install signal handlers")?;
    let shutdown = shutdown.clone();
    std::thread::Builder::new()
        .name("carcopy-signals".to_string())
        .spawn(move || {
            if let Some(sig) = signals.forever().next() {
                let name = signal_hook::low_level::signal_name(sig)
                    .map(str::to_string)
                    .unwrap_or_else(|| sig.to_string());
                warn!(signal = %name, "Received shutdown signal");
                shutdown.cancel(ShutdownCause::Signal(name));
            }
        })
        .context("Failed to spawn signal thread")?;
    Ok(())
}

#[cfg(windows)]
pub fn install_shutdown_handler(shutdown: &ShutdownToken) -> Result<()> {
    let shutdown = shutdown.clone();
    ctrlc::set_handler(move || {
        warn!(signal = "CTRL_C", "Received shutdown signal");
        shutdown.cancel(ShutdownCause::Signal("CTRL_C".to_string()));
    })
    .context("Failed to set Ctrl+C handler")
}

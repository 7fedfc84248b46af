//! External copy script invocation.

use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::cancel::ShutdownToken;
use crate::error::{truncate_stderr, CopyError, Result};

/// Log level pinned for the script's own Rust tooling.
const CHILD_RUST_LOG: &str = "error";

/// Run `<script> <car_path>` and wait for it to exit.
///
/// Stderr is captured for the error message. Cancellation stops the wait but
/// leaves the child running; the script owns the transfer and its cleanup.
pub async fn run_copy_script(
    script: &Path,
    car_path: &Path,
    shutdown: &ShutdownToken,
) -> Result<()> {
    let script_err = |source| CopyError::Script {
        script: script.to_path_buf(),
        path: car_path.to_path_buf(),
        source,
    };

    let child = Command::new(script)
        .arg(car_path)
        .env("RUST_LOG", CHILD_RUST_LOG)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(false)
        .spawn()
        .map_err(script_err)?;
    let pid = child.id();

    let output = tokio::select! {
        biased;
        _ = shutdown.cancelled() => {
            warn!(pid = ?pid, car_file = %car_path.display(), "Shutdown while copy script running, leaving it to finish");
            return Err(shutdown.cancelled_error());
        }
        output = child.wait_with_output() => output.map_err(script_err)?,
    };

    let stderr = String::from_utf8_lossy(&output.stderr);
    if !output.status.success() {
        return Err(CopyError::ScriptFailed {
            script: script.to_path_buf(),
            path: car_path.to_path_buf(),
            code: output.status.code(),
            stderr: truncate_stderr(&stderr),
        });
    }
    if !stderr.trim().is_empty() {
        debug!(car_file = %car_path.display(), stderr = %truncate_stderr(&stderr), "Copy script wrote to stderr");
    }
    Ok(())
}

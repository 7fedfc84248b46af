//! Error types for the copy worker

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::cancel::ShutdownCause;

/// Longest stderr excerpt kept in a [`CopyError::ScriptFailed`].
const MAX_STDERR_LEN: usize = 500;

/// Copy worker error type.
///
/// `Config`, `ReadDir` and `Cancelled` end the whole run. Script errors only
/// fail a single job, which is rediscovered on a later scan.
#[derive(Error, Debug)]
pub enum CopyError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Error reading directory {}: {source}", path.display())]
    ReadDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to run {} {}: {source}", script.display(), path.display())]
    Script {
        script: PathBuf,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{} {} {} (stderr: {stderr})", script.display(), path.display(), describe_exit(code))]
    ScriptFailed {
        script: PathBuf,
        path: PathBuf,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Cancelled: {0}")]
    Cancelled(ShutdownCause),

    #[error("Task join error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

impl CopyError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CopyError::Cancelled(_))
    }
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exited with code {}", code),
        None => "terminated by signal".to_string(),
    }
}

/// Trim and truncate captured stderr for inclusion in an error message.
pub(crate) fn truncate_stderr(stderr: &str) -> String {
    let stderr = stderr.trim();
    if stderr.len() <= MAX_STDERR_LEN {
        return stderr.to_string();
    }
    let mut end = MAX_STDERR_LEN;
    while !stderr.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... (truncated)", &stderr[..end])
}

/// Result type alias
pub type Result<T> = std::result::Result<T, CopyError>;

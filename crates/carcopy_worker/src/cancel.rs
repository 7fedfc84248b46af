use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::CopyError;

/// Why the run is shutting down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownCause {
    /// An OS signal such as SIGTERM or SIGINT.
    Signal(String),
    /// Programmatic request (tests, embedding code).
    Requested(String),
}

impl fmt::Display for ShutdownCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownCause::Signal(sig) => write!(f, "received signal {}", sig),
            ShutdownCause::Requested(reason) => write!(f, "shutdown requested: {}", reason),
        }
    }
}

/// Token for cooperative cancellation of the scan loop and all job tasks.
///
/// Clone is cheap and shares state. The first recorded cause wins.
#[derive(Debug, Clone, Default)]
pub struct ShutdownToken {
    token: CancellationToken,
    cause: Arc<OnceLock<ShutdownCause>>,
}

impl ShutdownToken {
    /// Create a new token (not cancelled).
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self, cause: ShutdownCause) {
        let _ = self.cause.set(cause);
        self.token.cancel();
    }

    /// Check if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn cause(&self) -> Option<ShutdownCause> {
        self.cause.get().cloned()
    }

    /// Resolves once cancellation has been requested.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// The terminal error reported by anything stopped by this token.
    pub fn cancelled_error(&self) -> CopyError {
        CopyError::Cancelled(
            self.cause()
                .unwrap_or_else(|| ShutdownCause::Requested("cancelled".to_string())),
        )
    }

    /// Sleep for `duration`, returning early with [`CopyError::Cancelled`].
    pub async fn sleep(&self, duration: Duration) -> Result<(), CopyError> {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(self.cancelled_error()),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}

//! CAR copy worker.
//!
//! Discovers CAR files under a root directory of batch folders, hands each one
//! to an external copy script and tracks it until the script has removed the
//! local file.

pub mod cancel;
pub mod config;
pub mod error;
pub mod manager;
pub mod metrics;
pub mod scanner;
pub mod script;
pub mod tracker;

pub use cancel::{ShutdownCause, ShutdownToken};
pub use config::CopyConfig;
pub use error::{CopyError, Result};
pub use manager::{wait_car_file_removed, CopyManager};
pub use metrics::{CopyMetrics, MetricsSnapshot};
pub use scanner::{scan_car_files, CarFileInfo, CAR_EXTENSION};
pub use tracker::{Admission, JobSlot, JobTracker};

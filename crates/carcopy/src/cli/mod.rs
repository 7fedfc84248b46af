//! Command implementations for the carcopy binary.

pub mod output;
pub mod run;
pub mod scan;
pub mod signals;
pub mod version;

//! # Syncline Engine
//!
//! Engine-side housekeeping that runs next to the split enumerators: the
//! job-history view and the scheduled cleanup of per-job log files.

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Engine error types
pub mod error;

/// Job status lookup
pub mod job_history;

/// Scheduled log file cleanup
pub mod log_retention;

pub use error::EngineError;
pub use job_history::{InMemoryJobHistory, JobHistory, JobStatus};
pub use log_retention::{
    parse_cron, CleanReport, LogCleaner, LogRetentionConfig, LogRetentionService,
};

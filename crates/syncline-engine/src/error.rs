//! Engine housekeeping errors.

use std::path::PathBuf;

use syncline_connectors::error_codes;
use syncline_connectors::ConfigError;

/// Errors from engine housekeeping services.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The cron expression is not a valid 5-field UNIX expression.
    #[error("[SYN-7001] invalid cron expression '{expression}': {reason}")]
    InvalidCron {
        /// The rejected expression.
        expression: String,
        /// Parser message.
        reason: String,
    },

    /// The log directory is missing or not a directory.
    #[error("[SYN-7002] invalid log directory: {}", .0.display())]
    InvalidDirectory(PathBuf),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The schedule cannot produce a next fire time.
    #[error("[SYN-7004] schedule error: {0}")]
    Schedule(String),

    /// Invalid or missing configuration property.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl EngineError {
    /// Returns the stable error code, if the error carries one.
    #[must_use]
    pub fn code(&self) -> Option<&'static str> {
        match self {
            Self::InvalidCron { .. } => Some(error_codes::INVALID_CRON),
            Self::InvalidDirectory(_) => Some(error_codes::INVALID_LOG_DIR),
            Self::Schedule(_) => Some(error_codes::SCHEDULE_EXHAUSTED),
            Self::Config(ConfigError::Missing(_)) => Some(error_codes::MISSING_CONFIG),
            Self::Config(ConfigError::Invalid(_)) => Some(error_codes::INVALID_CONFIG),
            Self::Io(_) => None,
        }
    }
}

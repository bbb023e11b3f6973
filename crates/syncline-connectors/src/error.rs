//! Error types for the connector layer.
//!
//! Messages carry the stable codes registered in [`crate::error_codes`].

use crate::error_codes;
use crate::split::{SubtaskId, TablePath};

/// Errors from parsing connector properties.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A required key is absent.
    #[error("[SYN-0002] missing required config key '{0}'")]
    Missing(String),

    /// A key is present but its value cannot be used.
    #[error("[SYN-0001] invalid config: {0}")]
    Invalid(String),
}

/// Errors raised by a [`DiscoveryAdapter`](crate::discovery::DiscoveryAdapter)
/// or [`TableCatalog`](crate::catalog::TableCatalog).
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    /// The source could not be reached; the call may succeed later.
    #[error("transient discovery failure for {table}: {reason}")]
    Transient {
        /// Table being expanded (or `*` for catalog calls).
        table: String,
        /// Source-provided reason.
        reason: String,
    },

    /// The source rejected the request; retrying will not help.
    #[error("discovery failed for {table}: {reason}")]
    Permanent {
        /// Table being expanded (or `*` for catalog calls).
        table: String,
        /// Source-provided reason.
        reason: String,
    },

    /// The table no longer exists upstream.
    #[error("table {0} not found")]
    TableNotFound(String),

    /// An I/O error occurred talking to the source.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DiscoveryError {
    /// Returns true if this error indicates a transient failure that may succeed on retry.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. } | Self::Io(_))
    }
}

/// Errors from encoding, decoding, or persisting enumerator state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// JSON serialization/deserialization error.
    #[error("[SYN-4001] state serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The encoded bytes failed validation.
    #[error("[SYN-4002] state corruption: {0}")]
    Corruption(String),

    /// The encoded bytes use a format version this build cannot read.
    #[error("[SYN-4003] unsupported state format version {0}")]
    UnsupportedVersion(u16),

    /// I/O error while persisting or loading state.
    #[error("state I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors returned by the split enumerator.
#[derive(Debug, thiserror::Error)]
pub enum EnumeratorError {
    /// Called before [`SplitEnumerator::open`](crate::enumerator::SplitEnumerator::open).
    #[error("[SYN-0003] split enumerator not opened")]
    NotOpened,

    /// Called after the enumerator was closed.
    #[error("[SYN-0004] split enumerator closed")]
    Closed,

    /// The reader never called `register_reader`.
    #[error("[SYN-2001] reader {0} is not registered")]
    UnregisteredReader(SubtaskId),

    /// The subtask id is outside `0..parallelism`.
    #[error("[SYN-2002] subtask {subtask} outside parallelism {parallelism}")]
    InvalidSubtask {
        /// The rejected id.
        subtask: SubtaskId,
        /// Job parallelism.
        parallelism: u32,
    },

    /// A snapshot was requested for an older checkpoint than a previous one.
    #[error("[SYN-6001] checkpoint {requested} requested after checkpoint {last}")]
    CheckpointRegression {
        /// The requested checkpoint id.
        requested: u64,
        /// The newest checkpoint id already snapshotted.
        last: u64,
    },

    /// Expanding a table failed after all retries.
    #[error("[SYN-5002] expanding {table} failed after {attempts} attempt(s): {source}")]
    Discovery {
        /// The table that could not be expanded (re-queued).
        table: TablePath,
        /// Number of attempts made.
        attempts: u32,
        /// The last adapter error.
        #[source]
        source: DiscoveryError,
    },

    /// The coordinator hit a fatal error earlier and refuses further work.
    #[error("[SYN-8002] split enumerator failed: {0}")]
    Failed(String),

    /// State could not be encoded, decoded, or persisted.
    #[error(transparent)]
    State(#[from] StateError),

    /// Invalid enumerator configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The coordinator task is gone.
    #[error("[SYN-8001] split enumerator task stopped: {0}")]
    ChannelClosed(String),
}

impl EnumeratorError {
    /// Returns the stable error code for this error.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotOpened => error_codes::NOT_OPENED,
            Self::Closed => error_codes::CLOSED,
            Self::UnregisteredReader(_) => error_codes::UNREGISTERED_READER,
            Self::InvalidSubtask { .. } => error_codes::INVALID_SUBTASK,
            Self::CheckpointRegression { .. } => error_codes::CHECKPOINT_REGRESSION,
            Self::Discovery { .. } => error_codes::DISCOVERY_EXHAUSTED,
            Self::Failed(_) => error_codes::COORDINATOR_FAILED,
            Self::State(StateError::Corruption(_)) => error_codes::STATE_CORRUPTION,
            Self::State(StateError::UnsupportedVersion(_)) => error_codes::STATE_VERSION,
            Self::State(_) => error_codes::STATE_SERIALIZATION,
            Self::Config(ConfigError::Missing(_)) => error_codes::MISSING_CONFIG,
            Self::Config(ConfigError::Invalid(_)) => error_codes::INVALID_CONFIG,
            Self::ChannelClosed(_) => error_codes::COORDINATOR_GONE,
        }
    }

    /// Returns true if the job attempt must be aborted.
    ///
    /// Protocol violations are rejected calls; everything that could lose
    /// or duplicate a split is fatal.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Discovery { .. } | Self::Failed(_) | Self::State(_) | Self::ChannelClosed(_)
        )
    }
}

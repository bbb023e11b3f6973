//! Syncline structured error code registry.
//!
//! Every error raised by the connector layer carries a stable `SYN-NNNN`
//! code that is:
//! - Present in the error message (grep-able in logs)
//! - Present in the source code (grep-able in code)
//! - Stable across versions (codes are never reused)
//!
//! # Code Ranges
//!
//! | Range | Category |
//! |-------|----------|
//! | `SYN-0xxx` | General / configuration |
//! | `SYN-2xxx` | Reader protocol |
//! | `SYN-4xxx` | Serialization / state |
//! | `SYN-5xxx` | Discovery / I/O |
//! | `SYN-6xxx` | Checkpoint / recovery |
//! | `SYN-7xxx` | Engine housekeeping |
//! | `SYN-8xxx` | Internal / should-not-happen |

// ── General / Configuration (SYN-0xxx) ──

/// Invalid configuration value.
pub const INVALID_CONFIG: &str = "SYN-0001";
/// Missing required configuration key.
pub const MISSING_CONFIG: &str = "SYN-0002";
/// Operation invoked before `open()`.
pub const NOT_OPENED: &str = "SYN-0003";
/// Operation invoked after `close()`.
pub const CLOSED: &str = "SYN-0004";

// ── Reader protocol (SYN-2xxx) ──

/// Split request or return from a reader that never registered.
pub const UNREGISTERED_READER: &str = "SYN-2001";
/// Subtask id outside the job's parallelism.
pub const INVALID_SUBTASK: &str = "SYN-2002";

// ── Serialization / State (SYN-4xxx) ──

/// Enumerator state could not be serialized or deserialized.
pub const STATE_SERIALIZATION: &str = "SYN-4001";
/// Enumerator state failed an integrity check.
pub const STATE_CORRUPTION: &str = "SYN-4002";
/// Enumerator state was written by an unknown format version.
pub const STATE_VERSION: &str = "SYN-4003";

// ── Discovery / I/O (SYN-5xxx) ──

/// Discovery adapter failed transiently; the call is being retried.
pub const DISCOVERY_RETRY: &str = "SYN-5001";
/// Discovery adapter failed after exhausting retries.
pub const DISCOVERY_EXHAUSTED: &str = "SYN-5002";
/// Catalog listing failed during incremental discovery.
pub const CATALOG_LIST_FAILED: &str = "SYN-5003";
/// Releasing discovery resources failed during close.
pub const RESOURCE_RELEASE: &str = "SYN-5004";

// ── Checkpoint / recovery (SYN-6xxx) ──

/// Snapshot requested with a checkpoint id older than a previous one.
pub const CHECKPOINT_REGRESSION: &str = "SYN-6001";
/// Persisted snapshot skipped during recovery.
pub const SNAPSHOT_SKIPPED: &str = "SYN-6002";

// ── Engine housekeeping (SYN-7xxx) ──

/// Log retention cron expression could not be parsed.
pub const INVALID_CRON: &str = "SYN-7001";
/// Log directory is missing or not a directory.
pub const INVALID_LOG_DIR: &str = "SYN-7002";
/// A log file could not be deleted.
pub const LOG_DELETE_FAILED: &str = "SYN-7003";
/// Cron schedule has no future fire time.
pub const SCHEDULE_EXHAUSTED: &str = "SYN-7004";

// ── Internal (SYN-8xxx) ──

/// Coordinator task stopped unexpectedly.
pub const COORDINATOR_GONE: &str = "SYN-8001";
/// Coordinator already failed and refuses further work.
pub const COORDINATOR_FAILED: &str = "SYN-8002";

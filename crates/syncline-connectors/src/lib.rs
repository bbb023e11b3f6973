//! # Syncline Connectors
//!
//! Split enumeration for Syncline source connectors: discovering units of
//! work from a data source, assigning them to parallel readers, and
//! capturing that assignment in checkpoints.
//!
//! ## Module Overview
//!
//! - [`split`]: split descriptors and the identities they are keyed by
//! - [`catalog`]: tables a source job reads
//! - [`discovery`]: source-specific table-to-split expansion with retry
//! - [`enumerator`]: the coordinator that owns pending work and serves readers
//! - [`state`]: checkpoint state and its framed encoding
//! - [`store`]: on-disk snapshot storage
//! - [`config`]: connector properties and typed enumerator settings

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Connector properties and enumerator settings
pub mod config;

/// Table catalog collaborator
pub mod catalog;

/// Discovery adapters and retrying expansion
pub mod discovery;

/// Split enumerator coordinator
pub mod enumerator;

/// Error types
pub mod error;

/// Structured `SYN-NNNN` error codes
pub mod error_codes;

/// Split descriptors and identifiers
pub mod split;

/// Enumerator checkpoint state and codec
pub mod state;

/// Snapshot persistence
pub mod store;

/// Test doubles for the enumerator's collaborators
pub mod testing;

pub use catalog::{CatalogTable, StaticCatalog, TableCatalog};
pub use config::{AssignmentStrategy, ConnectorConfig, EnumeratorConfig};
pub use discovery::{DiscoveryAdapter, RangeSplitAdapter, SingleSplitAdapter};
pub use enumerator::{
    EnumeratorContext, EnumeratorHandle, EnumeratorPhase, SplitEnumerator, SplitRequestOutcome,
};
pub use error::{ConfigError, DiscoveryError, EnumeratorError, StateError};
pub use split::{SplitCursor, SplitDescriptor, SplitId, SubtaskId, TablePath};
pub use state::{EnumeratorState, StateCodec};
pub use store::{EnumeratorStateStore, FileStateStore};

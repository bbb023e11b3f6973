//! Discovery adapters: turning a table into concrete split descriptors.
//!
//! A [`DiscoveryAdapter`] is supplied per data source. Two generic
//! implementations cover the common shapes:
//! - [`SingleSplitAdapter`] — one split covering the whole table
//! - [`RangeSplitAdapter`] — fixed-size row ranges from the catalog's row estimate
//!
//! [`expand_with_retry`] wraps an adapter call in bounded exponential
//! backoff; the enumerator uses it for every table it expands.

use async_trait::async_trait;
use tracing::warn;

use crate::catalog::CatalogTable;
use crate::config::{ConnectorConfig, EnumeratorConfig};
use crate::error::{ConfigError, DiscoveryError, EnumeratorError};
use crate::split::{SplitCursor, SplitDescriptor};

/// Source-specific split generation.
#[async_trait]
pub trait DiscoveryAdapter: Send + Sync {
    /// Expands one table into zero or more splits.
    ///
    /// Split ids must be unique within the job and stable across calls
    /// for the same table, so that a re-expanded table after recovery
    /// produces the same identities.
    async fn expand(&self, table: &CatalogTable) -> Result<Vec<SplitDescriptor>, DiscoveryError>;

    /// Called once a checkpoint is durably committed.
    ///
    /// Sources with server-side cursors can release or advance them here.
    async fn notify_checkpoint_complete(&self, _checkpoint_id: u64) -> Result<(), DiscoveryError> {
        Ok(())
    }

    /// Releases client resources. Called once when the enumerator closes.
    async fn close(&self) -> Result<(), DiscoveryError> {
        Ok(())
    }
}

/// One [`SplitCursor::Full`] split per table, keyed by the table path.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleSplitAdapter;

#[async_trait]
impl DiscoveryAdapter for SingleSplitAdapter {
    async fn expand(&self, table: &CatalogTable) -> Result<Vec<SplitDescriptor>, DiscoveryError> {
        Ok(vec![SplitDescriptor::new(
            table.path.to_string(),
            table.path.clone(),
            SplitCursor::Full,
        )])
    }
}

/// Splits a table into `[start, end)` ranges of at most `split_size` rows.
///
/// Tables without a row estimate become a single `Full` split; tables
/// estimated at zero rows produce no splits.
#[derive(Debug, Clone, Copy)]
pub struct RangeSplitAdapter {
    split_size: u64,
}

impl RangeSplitAdapter {
    /// Default number of rows per split.
    pub const DEFAULT_SPLIT_SIZE: u64 = 10_000;

    /// Creates an adapter producing ranges of `split_size` rows.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if `split_size` is zero.
    pub fn new(split_size: u64) -> Result<Self, ConfigError> {
        if split_size == 0 {
            return Err(ConfigError::Invalid("split.size must be positive".into()));
        }
        Ok(Self { split_size })
    }

    /// Parses `split.size` from connector properties.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` on an unparsable or zero value.
    pub fn from_config(config: &ConnectorConfig) -> Result<Self, ConfigError> {
        let size = config
            .get_parsed("split.size")?
            .unwrap_or(Self::DEFAULT_SPLIT_SIZE);
        Self::new(size)
    }

    /// Rows per split.
    #[must_use]
    pub fn split_size(&self) -> u64 {
        self.split_size
    }
}

#[async_trait]
impl DiscoveryAdapter for RangeSplitAdapter {
    async fn expand(&self, table: &CatalogTable) -> Result<Vec<SplitDescriptor>, DiscoveryError> {
        let Some(rows) = table.estimated_rows else {
            return Ok(vec![SplitDescriptor::new(
                table.path.to_string(),
                table.path.clone(),
                SplitCursor::Full,
            )]);
        };

        let mut splits = Vec::new();
        let mut start = 0u64;
        let mut index = 0u64;
        while start < rows {
            let end = start.saturating_add(self.split_size).min(rows);
            splits.push(SplitDescriptor::new(
                format!("{}#{index}", table.path),
                table.path.clone(),
                SplitCursor::Range { start, end },
            ));
            start = end;
            index += 1;
        }
        Ok(splits)
    }
}

/// Expands `table`, retrying transient failures with exponential backoff.
///
/// At most `config.max_discovery_retries` retries follow the first attempt.
/// Permanent errors stop immediately.
///
/// # Errors
///
/// Returns `EnumeratorError::Discovery` with the last adapter error once
/// retries are exhausted or the error is permanent.
pub async fn expand_with_retry(
    adapter: &dyn DiscoveryAdapter,
    table: &CatalogTable,
    config: &EnumeratorConfig,
) -> Result<Vec<SplitDescriptor>, EnumeratorError> {
    let max_retries = config.max_discovery_retries;
    let mut attempts = 0u32;

    let op = || {
        attempts += 1;
        let attempt = attempts;
        async move {
            adapter.expand(table).await.map_err(|e| {
                if e.is_transient() && attempt <= max_retries {
                    warn!(
                        table = %table.path,
                        attempt,
                        max_retries,
                        error = %e,
                        "[SYN-5001] table expansion failed, retrying"
                    );
                    backoff::Error::transient(e)
                } else {
                    backoff::Error::permanent(e)
                }
            })
        }
    };

    let backoff = backoff::ExponentialBackoffBuilder::new()
        .with_initial_interval(config.initial_retry_delay)
        .with_max_interval(config.max_retry_delay)
        .with_max_elapsed_time(None)
        .build();

    let result = backoff::future::retry(backoff, op).await;
    result.map_err(|source| EnumeratorError::Discovery {
        table: table.path.clone(),
        attempts,
        source,
    })
}

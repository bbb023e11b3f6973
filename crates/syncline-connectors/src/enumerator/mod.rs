//! Split enumerator: discovers splits and assigns them to parallel readers.
//!
//! ## Lifecycle
//!
//! ```text
//! Created ──open()──▶ Opened ──▶ Running ⇄ Idle ──close()──▶ Closed
//!                                    │
//!                                    └──fatal──▶ Failed ──close()──▶ Closed
//! ```
//!
//! [`SplitEnumerator::open`] spawns the coordinator task; every reader-facing
//! call afterwards is a message to that task (see [`EnumeratorHandle`]).
//! [`SplitEnumerator::run`] is optional and only does work when an
//! incremental [`TableCatalog`] and a discovery interval are configured.
//!
//! ## Guarantees
//!
//! - A split is pending for at most one reader and is removed from the
//!   registry in the same step that hands it to the reader.
//! - `snapshot_state` never observes a table that was popped for expansion
//!   without its splits: in-flight tables are reported as pending.
//! - Returned splits (`add_splits_back`) are re-queued at most once.

mod queue;
mod registry;
mod task;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::catalog::{CatalogTable, TableCatalog};
use crate::config::EnumeratorConfig;
use crate::discovery::DiscoveryAdapter;
use crate::error::{ConfigError, EnumeratorError};
use crate::split::{SplitDescriptor, SubtaskId};
use crate::state::EnumeratorState;

pub use task::EnumeratorHandle;
use task::{EnumeratorTask, TaskParts};

/// Lifecycle phase of a split enumerator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumeratorPhase {
    /// Constructed, coordinator not started.
    Created,
    /// Coordinator started; no request handled yet.
    Opened,
    /// Expansions in flight or readers waiting for work.
    Running,
    /// Nothing in flight.
    Idle,
    /// A fatal error occurred; only `close()` is meaningful.
    Failed,
    /// Closed; nothing leaves this phase.
    Closed,
}

impl EnumeratorPhase {
    const ALL: [Self; 6] = [
        Self::Created,
        Self::Opened,
        Self::Running,
        Self::Idle,
        Self::Failed,
        Self::Closed,
    ];

    /// Lowercase name, as shown in logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Opened => "opened",
            Self::Running => "running",
            Self::Idle => "idle",
            Self::Failed => "failed",
            Self::Closed => "closed",
        }
    }

    /// Whether the phase is final.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl fmt::Display for EnumeratorPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EnumeratorPhase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|phase| phase.as_str() == normalized)
            .ok_or_else(|| format!("unknown enumerator phase: '{s}'"))
    }
}

/// Result of [`SplitEnumerator::handle_split_request`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitRequestOutcome {
    /// This many splits were handed to the reader via
    /// [`EnumeratorContext::assign_splits`].
    Assigned(usize),
    /// Nothing pending yet; a table expansion will deliver splits later.
    Awaiting,
    /// The reader was sent [`EnumeratorContext::signal_no_more_splits`].
    NoMoreSplits,
}

/// The engine side of the enumerator: how splits reach readers.
///
/// Calls are made from the coordinator task and must not block for long.
pub trait EnumeratorContext: Send + Sync {
    /// Number of parallel readers; valid subtask ids are `0..parallelism`.
    fn parallelism(&self) -> u32;

    /// Delivers splits to a reader.
    fn assign_splits(&self, subtask: SubtaskId, splits: Vec<SplitDescriptor>);

    /// Tells a reader that no further splits will arrive.
    fn signal_no_more_splits(&self, subtask: SubtaskId);

    /// Aborts the job attempt after a fatal enumerator error.
    fn fail_job(&self, error: &EnumeratorError);
}

enum Lifecycle {
    Created {
        tables: Vec<CatalogTable>,
        restored: Option<EnumeratorState>,
        phase_tx: watch::Sender<EnumeratorPhase>,
    },
    Opened {
        handle: EnumeratorHandle,
        task: JoinHandle<()>,
    },
    Closed,
}

/// Coordinator-side split enumerator for one source of one job attempt.
pub struct SplitEnumerator {
    config: EnumeratorConfig,
    context: Arc<dyn EnumeratorContext>,
    adapter: Arc<dyn DiscoveryAdapter>,
    catalog: Option<Arc<dyn TableCatalog>>,
    cancel: CancellationToken,
    phase_rx: watch::Receiver<EnumeratorPhase>,
    lifecycle: Mutex<Lifecycle>,
}

impl SplitEnumerator {
    /// Creates an enumerator over the job's `tables`.
    ///
    /// With `restored = None` every table is queued for expansion. With a
    /// prior state, the queue and registry are rebuilt from it instead.
    ///
    /// # Errors
    ///
    /// Returns `EnumeratorError::Config` if `config` is invalid.
    pub fn new(
        config: EnumeratorConfig,
        context: Arc<dyn EnumeratorContext>,
        adapter: Arc<dyn DiscoveryAdapter>,
        tables: Vec<CatalogTable>,
        restored: Option<EnumeratorState>,
    ) -> Result<Self, EnumeratorError> {
        config.validate()?;
        let (phase_tx, phase_rx) = watch::channel(EnumeratorPhase::Created);
        Ok(Self {
            config,
            context,
            adapter,
            catalog: None,
            cancel: CancellationToken::new(),
            phase_rx,
            lifecycle: Mutex::new(Lifecycle::Created {
                tables,
                restored,
                phase_tx,
            }),
        })
    }

    /// Attaches a catalog polled by [`run`](Self::run) for new tables.
    #[must_use]
    pub fn with_catalog(mut self, catalog: Arc<dyn TableCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    fn unbounded(&self) -> bool {
        self.config.discovery_interval.is_some()
            && self
                .catalog
                .as_ref()
                .is_some_and(|c| c.supports_incremental_discovery())
    }

    /// Starts the coordinator task. Idempotent.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// - `Closed` if the enumerator was already closed
    /// - `Config` if the context reports zero parallelism
    pub fn open(&self) -> Result<(), EnumeratorError> {
        let mut lifecycle = self.lifecycle.lock();
        let (tables, restored, phase_tx) =
            match std::mem::replace(&mut *lifecycle, Lifecycle::Closed) {
                Lifecycle::Created {
                    tables,
                    restored,
                    phase_tx,
                } => (tables, restored, phase_tx),
                opened @ Lifecycle::Opened { .. } => {
                    *lifecycle = opened;
                    return Ok(());
                }
                Lifecycle::Closed => return Err(EnumeratorError::Closed),
            };

        let parallelism = self.context.parallelism();
        if parallelism == 0 {
            *lifecycle = Lifecycle::Created {
                tables,
                restored,
                phase_tx,
            };
            return Err(ConfigError::Invalid("parallelism must be at least 1".into()).into());
        }

        info!(
            tables = tables.len(),
            restored = restored.is_some(),
            parallelism,
            unbounded = self.unbounded(),
            "opening split enumerator"
        );

        phase_tx.send_replace(EnumeratorPhase::Opened);
        let (tx, rx) = mpsc::channel(self.config.channel_capacity);
        let handle = EnumeratorHandle::new(tx, Arc::clone(&self.adapter), self.phase_rx.clone());
        let task = EnumeratorTask::new(TaskParts {
            config: self.config.clone(),
            parallelism,
            adapter: Arc::clone(&self.adapter),
            context: Arc::clone(&self.context),
            tables,
            restored,
            unbounded: self.unbounded(),
            phase_tx,
        });
        let task = tokio::spawn(task.run(rx));

        *lifecycle = Lifecycle::Opened { handle, task };
        Ok(())
    }

    /// Polls the catalog for new tables until [`close`](Self::close).
    ///
    /// Returns immediately unless an incremental catalog and a discovery
    /// interval are configured. Catalog errors are logged and retried on
    /// the next tick.
    ///
    /// # Errors
    ///
    /// `NotOpened` before `open()`; `Failed` once the coordinator failed.
    pub async fn run(&self) -> Result<(), EnumeratorError> {
        let handle = self.handle()?;
        let (Some(catalog), Some(interval)) = (self.catalog.clone(), self.config.discovery_interval)
        else {
            return Ok(());
        };
        if !catalog.supports_incremental_discovery() {
            return Ok(());
        }

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = self.cancel.cancelled() => return Ok(()),
                _ = ticker.tick() => {}
            }

            let listed = tokio::select! {
                () = self.cancel.cancelled() => return Ok(()),
                listed = catalog.list_tables() => listed,
            };
            match listed {
                Ok(tables) => match handle.publish_tables(tables).await {
                    Ok(0) => {}
                    Ok(added) => debug!(added, "catalog poll queued new tables"),
                    Err(_) if self.cancel.is_cancelled() => return Ok(()),
                    Err(e) => return Err(e),
                },
                Err(e) => warn!(error = %e, "[SYN-5003] catalog listing failed, retrying next interval"),
            }
        }
    }

    /// A cloneable handle for reader-facing RPC threads.
    ///
    /// # Errors
    ///
    /// `NotOpened` before `open()`; `Closed` after `close()`.
    pub fn handle(&self) -> Result<EnumeratorHandle, EnumeratorError> {
        match &*self.lifecycle.lock() {
            Lifecycle::Created { .. } => Err(EnumeratorError::NotOpened),
            Lifecycle::Opened { handle, .. } => Ok(handle.clone()),
            Lifecycle::Closed => Err(EnumeratorError::Closed),
        }
    }

    /// See [`EnumeratorHandle::register_reader`].
    ///
    /// # Errors
    ///
    /// As for the handle method, plus `NotOpened` / `Closed`.
    pub async fn register_reader(&self, subtask: SubtaskId) -> Result<(), EnumeratorError> {
        self.handle()?.register_reader(subtask).await
    }

    /// See [`EnumeratorHandle::handle_split_request`].
    ///
    /// # Errors
    ///
    /// As for the handle method, plus `NotOpened` / `Closed`.
    pub async fn handle_split_request(
        &self,
        subtask: SubtaskId,
    ) -> Result<SplitRequestOutcome, EnumeratorError> {
        self.handle()?.handle_split_request(subtask).await
    }

    /// See [`EnumeratorHandle::add_splits_back`].
    ///
    /// # Errors
    ///
    /// As for the handle method, plus `NotOpened` / `Closed`.
    pub async fn add_splits_back(
        &self,
        splits: Vec<SplitDescriptor>,
        subtask: SubtaskId,
    ) -> Result<usize, EnumeratorError> {
        self.handle()?.add_splits_back(splits, subtask).await
    }

    /// See [`EnumeratorHandle::current_unassigned_split_size`].
    ///
    /// # Errors
    ///
    /// As for the handle method, plus `NotOpened` / `Closed`.
    pub async fn current_unassigned_split_size(&self) -> Result<usize, EnumeratorError> {
        self.handle()?.current_unassigned_split_size().await
    }

    /// See [`EnumeratorHandle::snapshot_state`].
    ///
    /// # Errors
    ///
    /// As for the handle method, plus `NotOpened` / `Closed`.
    pub async fn snapshot_state(
        &self,
        checkpoint_id: u64,
    ) -> Result<EnumeratorState, EnumeratorError> {
        self.handle()?.snapshot_state(checkpoint_id).await
    }

    /// See [`EnumeratorHandle::notify_checkpoint_complete`].
    ///
    /// # Errors
    ///
    /// As for the handle method, plus `NotOpened` / `Closed`.
    pub async fn notify_checkpoint_complete(
        &self,
        checkpoint_id: u64,
    ) -> Result<(), EnumeratorError> {
        self.handle()?
            .notify_checkpoint_complete(checkpoint_id)
            .await
    }

    /// Current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> EnumeratorPhase {
        *self.phase_rx.borrow()
    }

    /// Receiver notified on every phase change.
    #[must_use]
    pub fn phase_watch(&self) -> watch::Receiver<EnumeratorPhase> {
        self.phase_rx.clone()
    }

    /// Stops `run()`, shuts down the coordinator, and releases adapter
    /// resources. Safe to call more than once; errors are logged.
    pub async fn close(&self) {
        self.cancel.cancel();
        let previous = {
            let mut lifecycle = self.lifecycle.lock();
            std::mem::replace(&mut *lifecycle, Lifecycle::Closed)
        };

        match previous {
            Lifecycle::Closed => return,
            Lifecycle::Created { phase_tx, .. } => {
                if let Err(e) = self.adapter.close().await {
                    warn!(error = %e, "[SYN-5004] failed to release discovery adapter resources");
                }
                phase_tx.send_replace(EnumeratorPhase::Closed);
            }
            Lifecycle::Opened { handle, mut task } => {
                handle.shutdown().await;
                match tokio::time::timeout(self.config.close_timeout, &mut task).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => warn!(error = %e, "split enumerator task ended abnormally"),
                    Err(_) => {
                        warn!(
                            timeout = ?self.config.close_timeout,
                            "split enumerator task did not stop in time, aborting"
                        );
                        task.abort();
                    }
                }
            }
        }
        info!("split enumerator closed");
    }
}

impl fmt::Debug for SplitEnumerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SplitEnumerator")
            .field("phase", &self.phase())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Drop for SplitEnumerator {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Lifecycle::Opened { task, .. } = &*self.lifecycle.get_mut() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::discovery::SingleSplitAdapter;
    use crate::split::TablePath;
    use crate::testing::{ContextEvent, RecordingContext, ScriptedAdapter};

    fn tables(names: &[&str]) -> Vec<CatalogTable> {
        names
            .iter()
            .map(|n| CatalogTable::new(TablePath::new("db", *n)))
            .collect()
    }

    fn enumerator(
        context: &Arc<RecordingContext>,
        adapter: Arc<dyn DiscoveryAdapter>,
        names: &[&str],
    ) -> SplitEnumerator {
        SplitEnumerator::new(
            EnumeratorConfig::default(),
            Arc::clone(context) as Arc<dyn EnumeratorContext>,
            adapter,
            tables(names),
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_phase_display_and_parse() {
        assert_eq!(EnumeratorPhase::Running.to_string(), "running");
        assert_eq!("IDLE".parse::<EnumeratorPhase>().unwrap(), EnumeratorPhase::Idle);
        assert!("paused".parse::<EnumeratorPhase>().is_err());
        assert!(EnumeratorPhase::Closed.is_terminal());
        assert!(!EnumeratorPhase::Failed.is_terminal());
    }

    #[tokio::test]
    async fn test_calls_before_open_are_rejected() {
        let context = Arc::new(RecordingContext::new(2));
        let e = enumerator(&context, Arc::new(SingleSplitAdapter), &["a"]);
        assert_eq!(e.phase(), EnumeratorPhase::Created);
        assert!(matches!(
            e.register_reader(SubtaskId(0)).await,
            Err(EnumeratorError::NotOpened)
        ));
    }

    #[tokio::test]
    async fn test_open_is_idempotent_and_close_is_final() {
        let context = Arc::new(RecordingContext::new(1));
        let adapter = Arc::new(ScriptedAdapter::new());
        let e = enumerator(&context, adapter.clone(), &["a"]);

        e.open().unwrap();
        e.open().unwrap();
        assert_eq!(e.phase(), EnumeratorPhase::Opened);

        e.close().await;
        e.close().await;
        assert_eq!(e.phase(), EnumeratorPhase::Closed);
        assert_eq!(adapter.close_count(), 1);
        assert!(matches!(e.open(), Err(EnumeratorError::Closed)));
        assert!(matches!(
            e.handle_split_request(SubtaskId(0)).await,
            Err(EnumeratorError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_zero_parallelism_rejected_on_open() {
        let context = Arc::new(RecordingContext::new(0));
        let e = enumerator(&context, Arc::new(SingleSplitAdapter), &["a"]);
        assert!(matches!(e.open(), Err(EnumeratorError::Config(_))));
        assert_eq!(e.phase(), EnumeratorPhase::Created);
    }

    #[tokio::test]
    async fn test_register_rejects_out_of_range_subtask() {
        let context = Arc::new(RecordingContext::new(2));
        let e = enumerator(&context, Arc::new(SingleSplitAdapter), &["a"]);
        e.open().unwrap();

        let err = e.register_reader(SubtaskId(2)).await.unwrap_err();
        assert!(matches!(
            err,
            EnumeratorError::InvalidSubtask { parallelism: 2, .. }
        ));
        assert!(!err.is_fatal());

        e.register_reader(SubtaskId(1)).await.unwrap();
        e.register_reader(SubtaskId(1)).await.unwrap();
        e.close().await;
    }

    #[tokio::test]
    async fn test_request_expands_and_delivers() {
        let context = Arc::new(RecordingContext::new(1));
        let e = enumerator(&context, Arc::new(SingleSplitAdapter), &["a"]);
        e.open().unwrap();
        e.register_reader(SubtaskId(0)).await.unwrap();

        assert_eq!(
            e.handle_split_request(SubtaskId(0)).await.unwrap(),
            SplitRequestOutcome::Awaiting
        );
        let event = context.next_event(Duration::from_secs(5)).await.unwrap();
        assert_eq!(
            event,
            ContextEvent::Assigned(SubtaskId(0), vec!["db.a".into()])
        );

        assert_eq!(
            e.handle_split_request(SubtaskId(0)).await.unwrap(),
            SplitRequestOutcome::NoMoreSplits
        );
        assert_eq!(e.current_unassigned_split_size().await.unwrap(), 0);
        e.close().await;
    }

    #[tokio::test]
    async fn test_unregistered_reader_is_rejected() {
        let context = Arc::new(RecordingContext::new(2));
        let e = enumerator(&context, Arc::new(SingleSplitAdapter), &["a"]);
        e.open().unwrap();
        assert!(matches!(
            e.handle_split_request(SubtaskId(1)).await,
            Err(EnumeratorError::UnregisteredReader(SubtaskId(1)))
        ));
        e.close().await;
    }

    #[tokio::test]
    async fn test_snapshot_rejects_regression() {
        let context = Arc::new(RecordingContext::new(1));
        let e = enumerator(&context, Arc::new(SingleSplitAdapter), &["a", "b"]);
        e.open().unwrap();

        let state = e.snapshot_state(5).await.unwrap();
        assert_eq!(
            state.pending_tables,
            vec![TablePath::new("db", "a"), TablePath::new("db", "b")]
        );
        e.snapshot_state(5).await.unwrap();
        assert!(matches!(
            e.snapshot_state(4).await,
            Err(EnumeratorError::CheckpointRegression { requested: 4, last: 5 })
        ));
        e.close().await;
    }

    #[tokio::test]
    async fn test_checkpoint_complete_forwards_once_per_id() {
        let context = Arc::new(RecordingContext::new(1));
        let adapter = Arc::new(ScriptedAdapter::new());
        let e = enumerator(&context, adapter.clone(), &["a"]);
        e.open().unwrap();

        e.notify_checkpoint_complete(3).await.unwrap();
        e.notify_checkpoint_complete(3).await.unwrap();
        e.notify_checkpoint_complete(2).await.unwrap();
        e.notify_checkpoint_complete(4).await.unwrap();
        assert_eq!(adapter.completed_checkpoints(), vec![3, 4]);
        e.close().await;
    }

    #[tokio::test]
    async fn test_run_returns_immediately_without_incremental_catalog() {
        let context = Arc::new(RecordingContext::new(1));
        let e = enumerator(&context, Arc::new(SingleSplitAdapter), &["a"]);
        assert!(matches!(e.run().await, Err(EnumeratorError::NotOpened)));
        e.open().unwrap();
        e.run().await.unwrap();
        e.close().await;
    }
}

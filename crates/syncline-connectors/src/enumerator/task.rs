//! Coordinator task that owns the discovery queue and the pending registry.
//!
//! Every RPC entry point becomes an [`EnumeratorCommand`] processed
//! sequentially by one tokio task, so registry and queue are never touched
//! concurrently. Table expansions run on a [`JoinSet`] polled by the same
//! loop; their results are applied as one step, which keeps snapshots free
//! of torn "table popped, splits not published" states.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use super::queue::TableDiscoveryQueue;
use super::registry::{split_hash, PendingSplitRegistry};
use super::{EnumeratorContext, EnumeratorPhase, SplitRequestOutcome};
use crate::catalog::CatalogTable;
use crate::config::{AssignmentStrategy, EnumeratorConfig};
use crate::discovery::{expand_with_retry, DiscoveryAdapter};
use crate::error::EnumeratorError;
use crate::split::{SplitDescriptor, SplitId, SubtaskId, TablePath};
use crate::state::EnumeratorState;

type Ack<T> = oneshot::Sender<Result<T, EnumeratorError>>;

type ExpansionResult = (TablePath, Result<Vec<SplitDescriptor>, EnumeratorError>);

/// Reader a split was handed to, and the last snapshot taken before that.
#[derive(Debug, Clone, Copy)]
struct Ownership {
    subtask: SubtaskId,
    after_snapshot: Option<u64>,
}

fn failed<T>(reason: &str) -> Result<T, EnumeratorError> {
    Err(EnumeratorError::Failed(reason.to_string()))
}

/// Stable choice of a surviving reader for `id`.
fn pick_survivor(survivors: &[SubtaskId], id: &SplitId) -> Option<SubtaskId> {
    if survivors.is_empty() {
        return None;
    }
    let slot = split_hash(id) % survivors.len() as u64;
    survivors.get(usize::try_from(slot).unwrap_or(0)).copied()
}

/// Commands processed by the coordinator task.
pub(crate) enum EnumeratorCommand {
    RegisterReader {
        subtask: SubtaskId,
        ack: Ack<()>,
    },
    SplitRequest {
        subtask: SubtaskId,
        ack: Ack<SplitRequestOutcome>,
    },
    AddSplitsBack {
        splits: Vec<SplitDescriptor>,
        subtask: SubtaskId,
        ack: Ack<usize>,
    },
    UnassignedSplitSize {
        ack: Ack<usize>,
    },
    Snapshot {
        checkpoint_id: u64,
        ack: Ack<EnumeratorState>,
    },
    /// Acked with whether the id is new and should reach the adapter.
    CheckpointComplete {
        checkpoint_id: u64,
        ack: Ack<bool>,
    },
    /// Tables listed by the catalog; unknown ones are queued together.
    PublishTables {
        tables: Vec<CatalogTable>,
        ack: Ack<usize>,
    },
    Close {
        ack: oneshot::Sender<()>,
    },
}

/// Cloneable handle to a running split enumerator.
///
/// This is what reader-facing RPC threads hold. All calls are answered by
/// the coordinator task; none of them waits on table discovery.
#[derive(Clone)]
pub struct EnumeratorHandle {
    tx: mpsc::Sender<EnumeratorCommand>,
    adapter: Arc<dyn DiscoveryAdapter>,
    phase: watch::Receiver<EnumeratorPhase>,
}

impl EnumeratorHandle {
    pub(crate) fn new(
        tx: mpsc::Sender<EnumeratorCommand>,
        adapter: Arc<dyn DiscoveryAdapter>,
        phase: watch::Receiver<EnumeratorPhase>,
    ) -> Self {
        Self { tx, adapter, phase }
    }

    fn stopped(&self) -> EnumeratorError {
        if *self.phase.borrow() == EnumeratorPhase::Closed {
            EnumeratorError::Closed
        } else {
            EnumeratorError::ChannelClosed("coordinator task exited".into())
        }
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(Ack<T>) -> EnumeratorCommand,
    ) -> Result<T, EnumeratorError> {
        let (ack, rx) = oneshot::channel();
        self.tx.send(make(ack)).await.map_err(|_| self.stopped())?;
        rx.await.map_err(|_| self.stopped())?
    }

    /// Registers a reader. Idempotent; re-arms a reader previously told
    /// there are no more splits.
    ///
    /// # Errors
    ///
    /// `InvalidSubtask` if `subtask` is outside `0..parallelism`.
    pub async fn register_reader(&self, subtask: SubtaskId) -> Result<(), EnumeratorError> {
        self.request(|ack| EnumeratorCommand::RegisterReader { subtask, ack })
            .await
    }

    /// Handles a reader's request for work.
    ///
    /// # Errors
    ///
    /// `UnregisteredReader` if the reader never registered.
    pub async fn handle_split_request(
        &self,
        subtask: SubtaskId,
    ) -> Result<SplitRequestOutcome, EnumeratorError> {
        self.request(|ack| EnumeratorCommand::SplitRequest { subtask, ack })
            .await
    }

    /// Returns splits owned by a failed reader. Returns how many were
    /// actually re-queued; repeated returns of the same split are ignored.
    ///
    /// # Errors
    ///
    /// `InvalidSubtask` if `subtask` is outside `0..parallelism`.
    pub async fn add_splits_back(
        &self,
        splits: Vec<SplitDescriptor>,
        subtask: SubtaskId,
    ) -> Result<usize, EnumeratorError> {
        self.request(|ack| EnumeratorCommand::AddSplitsBack {
            splits,
            subtask,
            ack,
        })
        .await
    }

    /// Pending splits plus tables not yet expanded.
    ///
    /// # Errors
    ///
    /// Fails only if the enumerator failed or stopped.
    pub async fn current_unassigned_split_size(&self) -> Result<usize, EnumeratorError> {
        self.request(|ack| EnumeratorCommand::UnassignedSplitSize { ack })
            .await
    }

    /// Captures a consistent snapshot for `checkpoint_id`.
    ///
    /// # Errors
    ///
    /// `CheckpointRegression` if `checkpoint_id` is older than the last
    /// snapshot; `Failed` after a fatal error.
    pub async fn snapshot_state(
        &self,
        checkpoint_id: u64,
    ) -> Result<EnumeratorState, EnumeratorError> {
        self.request(|ack| EnumeratorCommand::Snapshot { checkpoint_id, ack })
            .await
    }

    /// Records a completed checkpoint and forwards it to the discovery
    /// adapter. Stale ids are ignored; adapter errors are logged.
    ///
    /// # Errors
    ///
    /// Fails only if the enumerator failed or stopped.
    pub async fn notify_checkpoint_complete(
        &self,
        checkpoint_id: u64,
    ) -> Result<(), EnumeratorError> {
        let forward = self
            .request(|ack| EnumeratorCommand::CheckpointComplete { checkpoint_id, ack })
            .await?;
        if forward {
            if let Err(e) = self.adapter.notify_checkpoint_complete(checkpoint_id).await {
                warn!(
                    checkpoint_id,
                    error = %e,
                    "discovery adapter rejected checkpoint notification"
                );
            }
        }
        Ok(())
    }

    /// Current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> EnumeratorPhase {
        *self.phase.borrow()
    }

    pub(crate) async fn publish_tables(
        &self,
        tables: Vec<CatalogTable>,
    ) -> Result<usize, EnumeratorError> {
        self.request(|ack| EnumeratorCommand::PublishTables { tables, ack })
            .await
    }

    /// Asks the task to stop and waits for its acknowledgment.
    pub(crate) async fn shutdown(&self) {
        let (ack, rx) = oneshot::channel();
        if self.tx.send(EnumeratorCommand::Close { ack }).await.is_ok() {
            let _ = rx.await;
        }
    }
}

/// Inputs for building the coordinator task.
pub(crate) struct TaskParts {
    pub config: EnumeratorConfig,
    pub parallelism: u32,
    pub adapter: Arc<dyn DiscoveryAdapter>,
    pub context: Arc<dyn EnumeratorContext>,
    pub tables: Vec<CatalogTable>,
    pub restored: Option<EnumeratorState>,
    pub unbounded: bool,
    pub phase_tx: watch::Sender<EnumeratorPhase>,
}

pub(crate) struct EnumeratorTask {
    config: EnumeratorConfig,
    parallelism: u32,
    adapter: Arc<dyn DiscoveryAdapter>,
    context: Arc<dyn EnumeratorContext>,
    /// Catalog metadata for expansion; tables only known from a restored
    /// snapshot are expanded from their path alone.
    tables: HashMap<TablePath, CatalogTable>,
    queue: TableDiscoveryQueue,
    registry: PendingSplitRegistry,
    registered: BTreeSet<SubtaskId>,
    /// Readers waiting for an expansion, in request order.
    awaiting: Vec<SubtaskId>,
    /// Readers told there are no more splits.
    finished: BTreeSet<SubtaskId>,
    /// Readers that returned their splits; nothing is delivered to them
    /// until they register or request again.
    detached: BTreeSet<SubtaskId>,
    /// Splits delivered since the last completed checkpoint.
    owners: HashMap<SplitId, Ownership>,
    expansions: JoinSet<ExpansionResult>,
    /// In-flight table → reader whose request triggered it.
    requesters: HashMap<TablePath, SubtaskId>,
    last_snapshot: Option<u64>,
    last_completed: Option<u64>,
    failure: Option<String>,
    /// Incremental discovery may still add tables.
    unbounded: bool,
    phase_tx: watch::Sender<EnumeratorPhase>,
}

impl EnumeratorTask {
    pub(crate) fn new(parts: TaskParts) -> Self {
        let TaskParts {
            config,
            parallelism,
            adapter,
            context,
            tables,
            restored,
            unbounded,
            phase_tx,
        } = parts;

        let known: Vec<TablePath> = tables.iter().map(|t| t.path.clone()).collect();
        let (queue, registry) = match restored {
            Some(state) => (
                TableDiscoveryQueue::new(known, state.pending_tables),
                PendingSplitRegistry::from_snapshot(state.pending_splits, parallelism),
            ),
            None => (
                TableDiscoveryQueue::new(known.clone(), known),
                PendingSplitRegistry::default(),
            ),
        };

        Self {
            config,
            parallelism,
            adapter,
            context,
            tables: tables.into_iter().map(|t| (t.path.clone(), t)).collect(),
            queue,
            registry,
            registered: BTreeSet::new(),
            awaiting: Vec::new(),
            finished: BTreeSet::new(),
            detached: BTreeSet::new(),
            owners: HashMap::new(),
            expansions: JoinSet::new(),
            requesters: HashMap::new(),
            last_snapshot: None,
            last_completed: None,
            failure: None,
            unbounded,
            phase_tx,
        }
    }

    pub(crate) async fn run(mut self, mut rx: mpsc::Receiver<EnumeratorCommand>) {
        loop {
            tokio::select! {
                biased;
                cmd = rx.recv() => match cmd {
                    Some(EnumeratorCommand::Close { ack }) => {
                        self.shutdown().await;
                        let _ = ack.send(());
                        return;
                    }
                    Some(cmd) => self.handle_command(cmd),
                    None => {
                        self.shutdown().await;
                        return;
                    }
                },
                Some(joined) = self.expansions.join_next(), if !self.expansions.is_empty() => {
                    self.on_expansion(joined);
                }
            }
            self.update_phase();
        }
    }

    fn handle_command(&mut self, cmd: EnumeratorCommand) {
        if let Some(reason) = &self.failure {
            match cmd {
                EnumeratorCommand::RegisterReader { ack, .. } => {
                    let _ = ack.send(failed(reason));
                }
                EnumeratorCommand::SplitRequest { ack, .. } => {
                    let _ = ack.send(failed(reason));
                }
                EnumeratorCommand::AddSplitsBack { ack, .. }
                | EnumeratorCommand::UnassignedSplitSize { ack }
                | EnumeratorCommand::PublishTables { ack, .. } => {
                    let _ = ack.send(failed(reason));
                }
                EnumeratorCommand::Snapshot { ack, .. } => {
                    let _ = ack.send(failed(reason));
                }
                EnumeratorCommand::CheckpointComplete { ack, .. } => {
                    let _ = ack.send(failed(reason));
                }
                EnumeratorCommand::Close { ack } => {
                    let _ = ack.send(());
                }
            }
            return;
        }

        match cmd {
            EnumeratorCommand::RegisterReader { subtask, ack } => {
                let _ = ack.send(self.register_reader(subtask));
            }
            EnumeratorCommand::SplitRequest { subtask, ack } => {
                let _ = ack.send(self.split_request(subtask));
            }
            EnumeratorCommand::AddSplitsBack {
                splits,
                subtask,
                ack,
            } => {
                let _ = ack.send(self.add_splits_back(splits, subtask));
            }
            EnumeratorCommand::UnassignedSplitSize { ack } => {
                let _ = ack.send(Ok(self.registry.split_count() + self.queue.len()));
            }
            EnumeratorCommand::Snapshot { checkpoint_id, ack } => {
                let _ = ack.send(self.snapshot(checkpoint_id));
            }
            EnumeratorCommand::CheckpointComplete { checkpoint_id, ack } => {
                let _ = ack.send(Ok(self.checkpoint_complete(checkpoint_id)));
            }
            EnumeratorCommand::PublishTables { tables, ack } => {
                let _ = ack.send(Ok(self.publish_tables(tables)));
            }
            // Handled by the run loop.
            EnumeratorCommand::Close { ack } => {
                let _ = ack.send(());
            }
        }
    }

    fn check_subtask(&self, subtask: SubtaskId) -> Result<(), EnumeratorError> {
        if subtask.0 >= self.parallelism {
            return Err(EnumeratorError::InvalidSubtask {
                subtask,
                parallelism: self.parallelism,
            });
        }
        Ok(())
    }

    fn register_reader(&mut self, subtask: SubtaskId) -> Result<(), EnumeratorError> {
        self.check_subtask(subtask)?;
        self.registry.ensure_reader(subtask);
        if self.registered.insert(subtask) {
            info!(subtask = %subtask, "reader registered");
        }
        if self.finished.remove(&subtask) {
            debug!(subtask = %subtask, "reader re-registered after no-more-splits, re-armed");
        }
        if self.detached.remove(&subtask) {
            debug!(subtask = %subtask, "reader re-registered after failure");
        }
        Ok(())
    }

    fn split_request(&mut self, subtask: SubtaskId) -> Result<SplitRequestOutcome, EnumeratorError> {
        if !self.registered.contains(&subtask) {
            return Err(EnumeratorError::UnregisteredReader(subtask));
        }
        // A request proves the reader is back.
        self.detached.remove(&subtask);

        if self.registry.has_pending(subtask) {
            let splits = self.registry.take(subtask);
            let count = splits.len();
            self.awaiting.retain(|s| *s != subtask);
            self.deliver(subtask, splits);
            return Ok(SplitRequestOutcome::Assigned(count));
        }

        if !self.queue.is_drained() || self.unbounded {
            if !self.awaiting.contains(&subtask) {
                self.awaiting.push(subtask);
            }
            self.schedule_expansions();
            return Ok(SplitRequestOutcome::Awaiting);
        }

        self.awaiting.retain(|s| *s != subtask);
        self.signal_finished(subtask);
        Ok(SplitRequestOutcome::NoMoreSplits)
    }

    fn add_splits_back(
        &mut self,
        splits: Vec<SplitDescriptor>,
        subtask: SubtaskId,
    ) -> Result<usize, EnumeratorError> {
        self.check_subtask(subtask)?;
        self.detach(subtask);
        let survivors = self.survivors();

        let mut seen = HashSet::new();
        let mut requeued = 0;
        for split in splits {
            let id = split.split_id().clone();
            if !seen.insert(id.clone()) || self.registry.contains(&id) {
                debug!(split = %id, "returned split already pending, ignoring");
                continue;
            }
            if let Some(owner) = self.owners.get(&id) {
                if owner.subtask != subtask {
                    debug!(split = %id, owner = %owner.subtask, "returned split owned by another reader, ignoring");
                    continue;
                }
            }

            let target = pick_survivor(&survivors, &id).unwrap_or(subtask);
            self.owners.remove(&id);
            self.registry.push(target, split);
            requeued += 1;
        }

        if requeued > 0 {
            info!(subtask = %subtask, requeued, "splits returned by failed reader");
            self.deliver_awaiting();
        }
        Ok(requeued)
    }

    /// Stops delivering to a failed reader: drops its wait, and moves its
    /// in-flight expansions and undelivered splits to survivors.
    fn detach(&mut self, subtask: SubtaskId) {
        self.detached.insert(subtask);
        self.awaiting.retain(|s| *s != subtask);
        let survivors = self.survivors();

        let orphaned: Vec<TablePath> = self
            .requesters
            .iter()
            .filter(|(_, requester)| **requester == subtask)
            .map(|(table, _)| table.clone())
            .collect();
        for table in orphaned {
            match survivors.first() {
                Some(survivor) => {
                    debug!(table = %table, from = %subtask, to = %survivor, "expansion re-targeted");
                    self.requesters.insert(table, *survivor);
                }
                None => {
                    self.requesters.remove(&table);
                }
            }
        }

        if survivors.is_empty() || !self.registry.has_pending(subtask) {
            return;
        }
        let pending = self.registry.take(subtask);
        debug!(subtask = %subtask, count = pending.len(), "moving undelivered splits to survivors");
        for split in pending {
            let target = pick_survivor(&survivors, split.split_id()).unwrap_or(subtask);
            self.registry.push(target, split);
        }
    }

    /// Registered readers that can still receive work.
    fn survivors(&self) -> Vec<SubtaskId> {
        self.registered
            .iter()
            .copied()
            .filter(|s| self.is_live(*s))
            .collect()
    }

    fn is_live(&self, subtask: SubtaskId) -> bool {
        !self.finished.contains(&subtask) && !self.detached.contains(&subtask)
    }

    fn snapshot(&mut self, checkpoint_id: u64) -> Result<EnumeratorState, EnumeratorError> {
        if let Some(last) = self.last_snapshot {
            if checkpoint_id < last {
                return Err(EnumeratorError::CheckpointRegression {
                    requested: checkpoint_id,
                    last,
                });
            }
        }
        self.last_snapshot = Some(checkpoint_id);

        let state = EnumeratorState {
            pending_tables: self.queue.pending_tables(),
            pending_splits: self.registry.snapshot(),
        };
        debug!(
            checkpoint_id,
            pending_tables = state.pending_tables.len(),
            pending_splits = state.split_count(),
            "enumerator state snapshotted"
        );
        Ok(state)
    }

    fn checkpoint_complete(&mut self, checkpoint_id: u64) -> bool {
        if self.last_completed.is_some_and(|last| checkpoint_id <= last) {
            debug!(checkpoint_id, last = ?self.last_completed, "stale checkpoint completion ignored");
            return false;
        }
        self.last_completed = Some(checkpoint_id);
        // Splits delivered before this checkpoint's snapshot are in the
        // readers' state now; a failover restores them from there.
        let before = self.owners.len();
        self.owners
            .retain(|_, owner| owner.after_snapshot.is_some_and(|s| s >= checkpoint_id));
        if before > self.owners.len() {
            debug!(checkpoint_id, released = before - self.owners.len(), "split ownership released");
        }
        true
    }

    fn publish_tables(&mut self, tables: Vec<CatalogTable>) -> usize {
        let mut added = 0;
        for table in tables {
            if self.queue.enqueue(table.path.clone()) {
                info!(table = %table.path, "new table discovered");
                self.tables.insert(table.path.clone(), table);
                added += 1;
            }
        }
        if added > 0 {
            self.schedule_expansions();
        }
        added
    }

    /// Starts expansions while capacity remains and some awaiting reader has
    /// none in flight on its behalf.
    fn schedule_expansions(&mut self) {
        while self.expansions.len() < self.config.max_concurrent_expansions {
            let busy: HashSet<SubtaskId> = self.requesters.values().copied().collect();
            let Some(requester) = self.awaiting.iter().copied().find(|s| !busy.contains(s)) else {
                break;
            };
            let Some(path) = self.queue.pop_for_expansion() else {
                break;
            };

            let table = self
                .tables
                .get(&path)
                .cloned()
                .unwrap_or_else(|| CatalogTable::new(path.clone()));
            let adapter = Arc::clone(&self.adapter);
            let config = self.config.clone();
            debug!(
                table = %path,
                requester = %requester,
                queued = self.queue.queued_len(),
                in_flight = self.queue.in_flight_len(),
                "expanding table"
            );

            self.requesters.insert(path.clone(), requester);
            self.expansions.spawn(async move {
                let result = expand_with_retry(adapter.as_ref(), &table, &config).await;
                (path, result)
            });
        }
    }

    fn on_expansion(&mut self, joined: Result<ExpansionResult, JoinError>) {
        if self.failure.is_some() {
            return;
        }
        let (table, result) = match joined {
            Ok(done) => done,
            Err(e) => {
                // The table stays in flight and is reported as pending.
                self.fail(EnumeratorError::Failed(format!("expansion task aborted: {e}")));
                return;
            }
        };
        let requester = self.requesters.remove(&table);

        let splits = match result {
            Ok(splits) => splits,
            Err(e) => {
                self.queue.requeue_front(table);
                self.fail(e);
                return;
            }
        };
        self.queue.complete(&table);

        let fresh: Vec<SplitDescriptor> = splits
            .into_iter()
            .filter(|s| {
                let known =
                    self.registry.contains(s.split_id()) || self.owners.contains_key(s.split_id());
                if known {
                    warn!(split = %s.split_id(), table = %table, "duplicate split id from expansion, dropped");
                }
                !known
            })
            .collect();
        debug!(table = %table, splits = fresh.len(), "table expanded");

        let targets = self.expansion_targets(requester);
        for (i, split) in fresh.into_iter().enumerate() {
            self.registry.push(targets[i % targets.len()], split);
        }

        self.deliver_awaiting();
        self.schedule_expansions();
        self.resolve_drained();
    }

    /// Readers whose registry entries receive an expansion's splits. Splits
    /// only land on a failed reader when no live reader is left, and then
    /// stay pending until it comes back.
    fn expansion_targets(&self, requester: Option<SubtaskId>) -> Vec<SubtaskId> {
        let mut targets: Vec<SubtaskId> = match self.config.assignment {
            AssignmentStrategy::Balanced if !self.awaiting.is_empty() => self.awaiting.clone(),
            AssignmentStrategy::Requester | AssignmentStrategy::Balanced => {
                requester.into_iter().collect()
            }
        };
        targets.retain(|s| self.is_live(*s));
        if targets.is_empty() {
            targets = self.survivors();
        }
        if targets.is_empty() {
            targets.push(
                requester
                    .or_else(|| self.registered.first().copied())
                    .unwrap_or(SubtaskId(0)),
            );
        }
        targets
    }

    fn deliver(&mut self, subtask: SubtaskId, splits: Vec<SplitDescriptor>) {
        let owner = Ownership {
            subtask,
            after_snapshot: self.last_snapshot,
        };
        for split in &splits {
            self.owners.insert(split.split_id().clone(), owner);
        }
        debug!(subtask = %subtask, count = splits.len(), "assigning splits");
        self.context.assign_splits(subtask, splits);
    }

    fn deliver_awaiting(&mut self) {
        let ready: Vec<SubtaskId> = self
            .awaiting
            .iter()
            .copied()
            .filter(|s| self.registry.has_pending(*s))
            .collect();
        for subtask in ready {
            self.awaiting.retain(|s| *s != subtask);
            let splits = self.registry.take(subtask);
            self.deliver(subtask, splits);
        }
    }

    /// Ends the wait of readers that can no longer receive work.
    fn resolve_drained(&mut self) {
        if self.unbounded || !self.queue.is_drained() || !self.expansions.is_empty() {
            return;
        }
        for subtask in std::mem::take(&mut self.awaiting) {
            self.signal_finished(subtask);
        }
    }

    fn signal_finished(&mut self, subtask: SubtaskId) {
        self.finished.insert(subtask);
        info!(subtask = %subtask, "no more splits for reader");
        self.context.signal_no_more_splits(subtask);
    }

    fn fail(&mut self, err: EnumeratorError) {
        error!(error = %err, "split enumerator failed");
        self.failure = Some(err.to_string());
        self.expansions.abort_all();
        self.requesters.clear();
        self.context.fail_job(&err);
    }

    fn update_phase(&self) {
        let next = if self.failure.is_some() {
            EnumeratorPhase::Failed
        } else if !self.expansions.is_empty() || !self.awaiting.is_empty() {
            EnumeratorPhase::Running
        } else {
            EnumeratorPhase::Idle
        };
        self.phase_tx.send_if_modified(|phase| {
            if *phase == next {
                return false;
            }
            *phase = next;
            true
        });
    }

    async fn shutdown(&mut self) {
        // Late results are discarded.
        self.expansions.abort_all();
        if let Err(e) = self.adapter.close().await {
            warn!(error = %e, "[SYN-5004] failed to release discovery adapter resources");
        }
        self.phase_tx.send_replace(EnumeratorPhase::Closed);
        debug!("split enumerator task stopped");
    }
}

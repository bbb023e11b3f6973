//! Test doubles for the enumerator's collaborators.
//!
//! [`RecordingContext`] stands in for the engine: it records every
//! assignment, end-of-input signal, and job failure, and lets tests await
//! them. [`ScriptedAdapter`] is a discovery adapter whose per-table output,
//! failures, and timing are set up front.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};

use crate::catalog::CatalogTable;
use crate::discovery::DiscoveryAdapter;
use crate::enumerator::EnumeratorContext;
use crate::error::{DiscoveryError, EnumeratorError};
use crate::split::{SplitCursor, SplitDescriptor, SplitId, SubtaskId, TablePath};

/// Something the enumerator told the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextEvent {
    /// Splits (by id) handed to a reader.
    Assigned(SubtaskId, Vec<SplitId>),
    /// A reader was told no more splits will come.
    NoMoreSplits(SubtaskId),
    /// The job was failed with this message.
    JobFailed(String),
}

/// [`EnumeratorContext`] that records what it is told.
pub struct RecordingContext {
    parallelism: u32,
    events: Mutex<Vec<ContextEvent>>,
    assigned: Mutex<BTreeMap<SubtaskId, Vec<SplitDescriptor>>>,
    tx: mpsc::UnboundedSender<ContextEvent>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<ContextEvent>>,
}

impl RecordingContext {
    /// Creates a context reporting `parallelism` readers.
    #[must_use]
    pub fn new(parallelism: u32) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            parallelism,
            events: Mutex::new(Vec::new()),
            assigned: Mutex::new(BTreeMap::new()),
            tx,
            rx: tokio::sync::Mutex::new(rx),
        }
    }

    fn record(&self, event: ContextEvent) {
        self.events.lock().push(event.clone());
        let _ = self.tx.send(event);
    }

    /// All events so far, in order.
    #[must_use]
    pub fn events(&self) -> Vec<ContextEvent> {
        self.events.lock().clone()
    }

    /// Every split delivered to `subtask`, in delivery order.
    #[must_use]
    pub fn assigned_to(&self, subtask: SubtaskId) -> Vec<SplitDescriptor> {
        self.assigned
            .lock()
            .get(&subtask)
            .cloned()
            .unwrap_or_default()
    }

    /// Ids of every split delivered to any reader, with repetitions.
    #[must_use]
    pub fn assigned_ids(&self) -> Vec<SplitId> {
        self.assigned
            .lock()
            .values()
            .flatten()
            .map(|s| s.split_id().clone())
            .collect()
    }

    /// Readers told there are no more splits.
    #[must_use]
    pub fn finished_readers(&self) -> Vec<SubtaskId> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                ContextEvent::NoMoreSplits(s) => Some(*s),
                _ => None,
            })
            .collect()
    }

    /// Messages of job failures.
    #[must_use]
    pub fn failures(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                ContextEvent::JobFailed(msg) => Some(msg.clone()),
                _ => None,
            })
            .collect()
    }

    /// Waits for the next event not yet returned by this method.
    pub async fn next_event(&self, timeout: Duration) -> Option<ContextEvent> {
        let mut rx = self.rx.lock().await;
        tokio::time::timeout(timeout, rx.recv()).await.ok().flatten()
    }

    /// Waits until an event matching `pred` arrives, skipping others.
    pub async fn wait_for(
        &self,
        timeout: Duration,
        pred: impl Fn(&ContextEvent) -> bool,
    ) -> Option<ContextEvent> {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut rx = self.rx.lock().await;
        loop {
            let event = tokio::time::timeout_at(deadline, rx.recv())
                .await
                .ok()
                .flatten()?;
            if pred(&event) {
                return Some(event);
            }
        }
    }
}

impl EnumeratorContext for RecordingContext {
    fn parallelism(&self) -> u32 {
        self.parallelism
    }

    fn assign_splits(&self, subtask: SubtaskId, splits: Vec<SplitDescriptor>) {
        let ids = splits.iter().map(|s| s.split_id().clone()).collect();
        self.assigned
            .lock()
            .entry(subtask)
            .or_default()
            .extend(splits);
        self.record(ContextEvent::Assigned(subtask, ids));
    }

    fn signal_no_more_splits(&self, subtask: SubtaskId) {
        self.record(ContextEvent::NoMoreSplits(subtask));
    }

    fn fail_job(&self, error: &EnumeratorError) {
        self.record(ContextEvent::JobFailed(error.to_string()));
    }
}

#[derive(Debug, Clone, Copy)]
enum ScriptedFailure {
    Transient(u32),
    Permanent,
}

/// [`DiscoveryAdapter`] with scripted per-table behavior.
///
/// Unscripted tables expand to one `Full` split named after the table.
#[derive(Default)]
pub struct ScriptedAdapter {
    splits: Mutex<HashMap<TablePath, Vec<SplitDescriptor>>>,
    failures: Mutex<HashMap<TablePath, ScriptedFailure>>,
    gates: Mutex<HashMap<TablePath, Arc<Notify>>>,
    calls: Mutex<HashMap<TablePath, u32>>,
    completed: Mutex<Vec<u64>>,
    closes: AtomicUsize,
    fail_close: bool,
}

impl ScriptedAdapter {
    /// Creates an adapter with no scripted behavior.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts `table` to expand to `Full` splits with the given ids.
    #[must_use]
    pub fn with_splits(self, table: TablePath, ids: &[&str]) -> Self {
        let splits = ids
            .iter()
            .map(|id| SplitDescriptor::new(*id, table.clone(), SplitCursor::Full))
            .collect();
        self.splits.lock().insert(table, splits);
        self
    }

    /// Makes `close()` return an error.
    #[must_use]
    pub fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    /// Fails the next `times` expansions of `table` transiently.
    pub fn fail_transient(&self, table: TablePath, times: u32) {
        self.failures
            .lock()
            .insert(table, ScriptedFailure::Transient(times));
    }

    /// Fails every expansion of `table` permanently.
    pub fn fail_permanent(&self, table: TablePath) {
        self.failures.lock().insert(table, ScriptedFailure::Permanent);
    }

    /// Removes any scripted failure for `table`.
    pub fn clear_failure(&self, table: &TablePath) {
        self.failures.lock().remove(table);
    }

    /// Makes expansions of `table` wait until [`release`](Self::release).
    pub fn hold(&self, table: TablePath) {
        self.gates.lock().insert(table, Arc::new(Notify::new()));
    }

    /// Lets one held expansion of `table` proceed.
    pub fn release(&self, table: &TablePath) {
        if let Some(gate) = self.gates.lock().remove(table) {
            gate.notify_one();
        }
    }

    /// Number of `expand` calls made for `table`.
    #[must_use]
    pub fn expand_calls(&self, table: &TablePath) -> u32 {
        self.calls.lock().get(table).copied().unwrap_or(0)
    }

    /// Checkpoint ids forwarded by `notify_checkpoint_complete`.
    #[must_use]
    pub fn completed_checkpoints(&self) -> Vec<u64> {
        self.completed.lock().clone()
    }

    /// Number of `close()` calls.
    #[must_use]
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DiscoveryAdapter for ScriptedAdapter {
    async fn expand(&self, table: &CatalogTable) -> Result<Vec<SplitDescriptor>, DiscoveryError> {
        *self.calls.lock().entry(table.path.clone()).or_default() += 1;

        let gate = self.gates.lock().get(&table.path).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let failure = {
            let mut failures = self.failures.lock();
            match failures.get_mut(&table.path) {
                Some(ScriptedFailure::Permanent) => Some(ScriptedFailure::Permanent),
                Some(ScriptedFailure::Transient(0)) | None => None,
                Some(ScriptedFailure::Transient(n)) => {
                    *n -= 1;
                    Some(ScriptedFailure::Transient(*n))
                }
            }
        };
        match failure {
            Some(ScriptedFailure::Permanent) => {
                return Err(DiscoveryError::Permanent {
                    table: table.path.to_string(),
                    reason: "scripted permanent failure".into(),
                })
            }
            Some(ScriptedFailure::Transient(_)) => {
                return Err(DiscoveryError::Transient {
                    table: table.path.to_string(),
                    reason: "scripted transient failure".into(),
                })
            }
            None => {}
        }

        let scripted = self.splits.lock().get(&table.path).cloned();
        Ok(scripted.unwrap_or_else(|| {
            vec![SplitDescriptor::new(
                table.path.to_string(),
                table.path.clone(),
                SplitCursor::Full,
            )]
        }))
    }

    async fn notify_checkpoint_complete(&self, checkpoint_id: u64) -> Result<(), DiscoveryError> {
        self.completed.lock().push(checkpoint_id);
        Ok(())
    }

    async fn close(&self) -> Result<(), DiscoveryError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        if self.fail_close {
            return Err(DiscoveryError::Permanent {
                table: "*".into(),
                reason: "scripted close failure".into(),
            });
        }
        Ok(())
    }
}

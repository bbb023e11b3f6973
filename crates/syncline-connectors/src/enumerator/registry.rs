//! Splits earmarked per reader but not yet delivered.

use std::collections::{BTreeMap, HashMap};

use crate::split::{SplitDescriptor, SplitId, SubtaskId};

/// Reader id → ordered splits awaiting delivery to that reader.
///
/// A split id is pending for at most one reader at a time.
#[derive(Debug, Default)]
pub(crate) struct PendingSplitRegistry {
    pending: BTreeMap<SubtaskId, Vec<SplitDescriptor>>,
    index: HashMap<SplitId, SubtaskId>,
}

impl PendingSplitRegistry {
    /// Rebuilds the registry from a snapshot.
    ///
    /// Entries for subtasks at or beyond `parallelism` (the job was
    /// rescaled) are folded onto `id % parallelism`. A split listed twice
    /// keeps its first occurrence.
    pub fn from_snapshot(
        snapshot: BTreeMap<SubtaskId, Vec<SplitDescriptor>>,
        parallelism: u32,
    ) -> Self {
        let parallelism = parallelism.max(1);
        let mut registry = Self::default();
        for (subtask, splits) in snapshot {
            let owner = SubtaskId(subtask.0 % parallelism);
            registry.ensure_reader(owner);
            for split in splits {
                registry.push(owner, split);
            }
        }
        registry
    }

    /// Creates an empty entry for `subtask`. Returns `true` if it was absent.
    pub fn ensure_reader(&mut self, subtask: SubtaskId) -> bool {
        if self.pending.contains_key(&subtask) {
            return false;
        }
        self.pending.insert(subtask, Vec::new());
        true
    }

    /// Appends a split for `subtask`. Returns `false` if the split is
    /// already pending for any reader.
    pub fn push(&mut self, subtask: SubtaskId, split: SplitDescriptor) -> bool {
        if self.index.contains_key(split.split_id()) {
            return false;
        }
        self.index.insert(split.split_id().clone(), subtask);
        self.pending.entry(subtask).or_default().push(split);
        true
    }

    /// Removes and returns everything pending for `subtask`, keeping its
    /// (now empty) entry.
    pub fn take(&mut self, subtask: SubtaskId) -> Vec<SplitDescriptor> {
        let splits = self
            .pending
            .get_mut(&subtask)
            .map(std::mem::take)
            .unwrap_or_default();
        for split in &splits {
            self.index.remove(split.split_id());
        }
        splits
    }

    pub fn contains(&self, split_id: &SplitId) -> bool {
        self.index.contains_key(split_id)
    }

    pub fn has_pending(&self, subtask: SubtaskId) -> bool {
        self.pending.get(&subtask).is_some_and(|s| !s.is_empty())
    }

    /// Total pending splits across all readers.
    pub fn split_count(&self) -> usize {
        self.index.len()
    }

    /// Full copy of the mapping, including empty entries.
    pub fn snapshot(&self) -> BTreeMap<SubtaskId, Vec<SplitDescriptor>> {
        self.pending.clone()
    }
}

/// Deterministic 64-bit FNV-1a hash of a split id.
///
/// Used to spread returned splits over surviving readers; stable across
/// processes so replays pick the same reader for the same reader set.
pub(crate) fn split_hash(split_id: &SplitId) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for &byte in split_id.as_str().as_bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}

//! Backlog of tables not yet expanded into splits.

use std::collections::{HashSet, VecDeque};

use crate::split::TablePath;

/// FIFO of table identities awaiting expansion, without duplicates.
///
/// Tables popped for expansion stay *in flight* until their splits are
/// published; in-flight tables still count as pending for snapshots so a
/// checkpoint taken mid-expansion re-expands them on recovery.
#[derive(Debug, Default)]
pub(crate) struct TableDiscoveryQueue {
    queued: VecDeque<TablePath>,
    in_flight: Vec<TablePath>,
    /// Every table ever admitted: queued, in flight, or already expanded.
    known: HashSet<TablePath>,
}

impl TableDiscoveryQueue {
    /// Builds a queue over `pending`, remembering `known` as already seen.
    pub fn new(
        known: impl IntoIterator<Item = TablePath>,
        pending: impl IntoIterator<Item = TablePath>,
    ) -> Self {
        let mut queue = Self {
            known: known.into_iter().collect(),
            ..Self::default()
        };
        let mut seen = HashSet::new();
        for table in pending {
            if seen.insert(table.clone()) {
                queue.known.insert(table.clone());
                queue.queued.push_back(table);
            }
        }
        queue
    }

    /// Appends a table never seen before. Returns `false` for known tables.
    pub fn enqueue(&mut self, table: TablePath) -> bool {
        if !self.known.insert(table.clone()) {
            return false;
        }
        self.queued.push_back(table);
        true
    }

    /// Pops the oldest queued table and marks it in flight.
    pub fn pop_for_expansion(&mut self) -> Option<TablePath> {
        let table = self.queued.pop_front()?;
        self.in_flight.push(table.clone());
        Some(table)
    }

    /// Marks an in-flight table as expanded.
    pub fn complete(&mut self, table: &TablePath) {
        self.in_flight.retain(|t| t != table);
    }

    /// Returns an in-flight table to the head of the queue.
    pub fn requeue_front(&mut self, table: TablePath) {
        self.in_flight.retain(|t| t != &table);
        if !self.queued.contains(&table) {
            self.queued.push_front(table);
        }
    }

    /// In-flight tables (oldest first) followed by queued tables.
    pub fn pending_tables(&self) -> Vec<TablePath> {
        self.in_flight
            .iter()
            .chain(self.queued.iter())
            .cloned()
            .collect()
    }

    /// Tables queued or in flight.
    pub fn len(&self) -> usize {
        self.queued.len() + self.in_flight.len()
    }

    /// Whether every admitted table has been expanded.
    pub fn is_drained(&self) -> bool {
        self.len() == 0
    }

    /// Tables waiting to be popped.
    pub fn queued_len(&self) -> usize {
        self.queued.len()
    }

    /// Tables being expanded.
    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(name: &str) -> TablePath {
        TablePath::new("db", name)
    }

    #[test]
    fn test_fresh_queue_fifo() {
        let tables = vec![t("a"), t("b"), t("c")];
        let mut queue = TableDiscoveryQueue::new(tables.clone(), tables);
        assert_eq!(queue.pop_for_expansion(), Some(t("a")));
        assert_eq!(queue.pop_for_expansion(), Some(t("b")));
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.in_flight_len(), 2);
        assert_eq!(queue.pending_tables(), vec![t("a"), t("b"), t("c")]);
    }

    #[test]
    fn test_restored_queue_dedupes_and_remembers_expanded() {
        // a was expanded before the checkpoint; b is pending twice.
        let mut queue = TableDiscoveryQueue::new(vec![t("a"), t("b")], vec![t("b"), t("b")]);
        assert_eq!(queue.queued_len(), 1);
        assert!(!queue.enqueue(t("a")));
        assert!(!queue.enqueue(t("b")));
        assert!(queue.enqueue(t("c")));
        assert_eq!(queue.pending_tables(), vec![t("b"), t("c")]);
    }

    #[test]
    fn test_complete_and_requeue() {
        let mut queue = TableDiscoveryQueue::new(vec![t("a"), t("b")], vec![t("a"), t("b")]);
        let a = queue.pop_for_expansion().unwrap();
        let b = queue.pop_for_expansion().unwrap();
        queue.complete(&a);
        queue.requeue_front(b);
        assert_eq!(queue.in_flight_len(), 0);
        assert_eq!(queue.pending_tables(), vec![t("b")]);

        queue.pop_for_expansion();
        queue.complete(&t("b"));
        assert!(queue.is_drained());
    }
}

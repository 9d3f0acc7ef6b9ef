//! In-flight work tracking
//!
//! The table is the only shared mutable state of the work layer. It is owned
//! by the dispatcher and only ever touched from the event-loop thread, so no
//! locking is needed. A hash present in the table has a live cancellation
//! handle; a hash absent means no live dispatch exists and any late outcome
//! for it must be discarded.

use std::collections::HashMap;
use std::time::Instant;

use crate::types::CancelHandle;

/// One registered work item
#[derive(Debug)]
pub struct InFlightWork {
    /// Fires the cancellation of the paired gateway exchange
    pub cancel: CancelHandle,

    /// When the assignment arrived
    pub received_at: Instant,
}

impl InFlightWork {
    fn new(cancel: CancelHandle) -> Self {
        Self {
            cancel,
            received_at: Instant::now(),
        }
    }
}

/// Table of in-flight work items, keyed by hash
#[derive(Debug, Default)]
pub struct WorkTable {
    items: HashMap<String, InFlightWork>,
}

impl WorkTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a work item. If the hash was already in flight, the old
    /// entry is returned: the caller decides what to do with the orphaned
    /// exchange.
    pub fn insert(&mut self, hash: String, cancel: CancelHandle) -> Option<InFlightWork> {
        self.items.insert(hash, InFlightWork::new(cancel))
    }

    /// Remove and return an entry. Each hash is removed exactly once; a
    /// second take for the same hash returns None.
    pub fn take(&mut self, hash: &str) -> Option<InFlightWork> {
        self.items.remove(hash)
    }

    /// Check whether a hash is in flight
    pub fn contains(&self, hash: &str) -> bool {
        self.items.contains_key(hash)
    }

    /// Number of in-flight items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Hashes currently in flight
    pub fn active_hashes(&self) -> Vec<String> {
        self.items.keys().cloned().collect()
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::cancellation;

    #[test]
    fn test_insert_and_take() {
        let mut table = WorkTable::new();
        let (handle, _signal) = cancellation();

        assert!(table.insert("H1".to_string(), handle).is_none());
        assert!(table.contains("H1"));
        assert_eq!(table.len(), 1);

        assert!(table.take("H1").is_some());
        assert!(!table.contains("H1"));
        assert!(table.is_empty());
    }

    #[test]
    fn test_take_is_exactly_once() {
        let mut table = WorkTable::new();
        let (handle, _signal) = cancellation();
        table.insert("H1".to_string(), handle);

        assert!(table.take("H1").is_some());
        assert!(table.take("H1").is_none());
    }

    #[test]
    fn test_take_unknown_is_none() {
        let mut table = WorkTable::new();
        assert!(table.take("missing").is_none());
    }

    #[test]
    fn test_duplicate_insert_returns_replaced() {
        let mut table = WorkTable::new();
        let (first, _first_signal) = cancellation();
        let (second, _second_signal) = cancellation();

        assert!(table.insert("H1".to_string(), first).is_none());
        let replaced = table.insert("H1".to_string(), second);
        assert!(replaced.is_some());
        assert_eq!(table.len(), 1);
    }

    #[tokio::test]
    async fn test_taken_handle_cancels_exchange() {
        let mut table = WorkTable::new();
        let (handle, signal) = cancellation();
        table.insert("H1".to_string(), handle);

        let entry = table.take("H1").unwrap();
        entry.cancel.cancel();
        // The paired signal resolves
        signal.cancelled().await;
    }

    #[test]
    fn test_active_hashes() {
        let mut table = WorkTable::new();
        let (h1, _s1) = cancellation();
        let (h2, _s2) = cancellation();
        table.insert("H1".to_string(), h1);
        table.insert("H2".to_string(), h2);

        let mut hashes = table.active_hashes();
        hashes.sort();
        assert_eq!(hashes, vec!["H1", "H2"]);
    }
}

//! Ordered pending-action storage with at-most-one-pending-per-key
//! semantics.

use indexmap::IndexMap;
use parking_lot::Mutex;

use fathom_client::IndexAction;

/// A pending action plus its retry bookkeeping.
#[derive(Debug, Clone)]
pub struct QueuedAction {
    pub action: IndexAction,

    /// Send attempts that failed so far, whatever the failure cause.
    pub failed_attempts: u32,
}

impl QueuedAction {
    fn new(action: IndexAction) -> Self {
        Self {
            action,
            failed_attempts: 0,
        }
    }
}

/// FIFO queue of pending actions, deduplicated by document key.
///
/// Entries keep insertion order. Enqueueing a key that is already pending
/// replaces the entry in place (last write wins), so at most one action per
/// key is ever handed out.
///
/// One lock guards all operations; none of them block on anything but the
/// lock, so it is safe to call from any number of tasks.
#[derive(Debug, Default)]
pub struct ActionQueue {
    entries: Mutex<IndexMap<String, QueuedAction>>,
}

impl ActionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `action` under `key`.
    ///
    /// If an action for `key` is already pending it is replaced, keeping its
    /// queue position, and returned; the attempt counter starts over for the
    /// new action.
    pub fn enqueue(&self, key: String, action: IndexAction) -> Option<IndexAction> {
        self.entries
            .lock()
            .insert(key, QueuedAction::new(action))
            .map(|replaced| replaced.action)
    }

    /// Atomically removes and returns up to `max` entries from the head,
    /// oldest first.
    pub fn dequeue_batch(&self, max: usize) -> Vec<(String, QueuedAction)> {
        let mut entries = self.entries.lock();
        let count = max.min(entries.len());
        entries.drain(..count).collect()
    }

    /// Reinserts `requeued` at the head, preserving its relative order, so
    /// retried actions go out before anything enqueued later.
    ///
    /// A key that re-entered the queue while these entries were in flight
    /// already has a newer pending action; the stale entry is not reinserted
    /// and its action is returned so the caller can report the removal.
    pub fn requeue_front(&self, requeued: Vec<(String, QueuedAction)>) -> Vec<IndexAction> {
        let mut entries = self.entries.lock();

        let mut superseded = Vec::new();
        let mut merged = IndexMap::with_capacity(requeued.len() + entries.len());
        for (key, queued) in requeued {
            if entries.contains_key(&key) {
                superseded.push(queued.action);
            } else {
                merged.insert(key, queued);
            }
        }
        merged.extend(entries.drain(..));
        *entries = merged;

        superseded
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

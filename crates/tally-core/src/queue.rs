//! Backlog of pending recounts, drained in time-boxed batches.
//!
//! Items are keyed by [`NodeId`], so a file renamed while its recount is
//! pending is still found. A file already waiting is not queued twice.
//! Items leave the queue in the order they entered it.

use std::collections::{HashSet, VecDeque};

use serde::Serialize;

use crate::node::NodeId;

#[derive(Debug, Default)]
pub struct UpdateQueue {
    items: VecDeque<NodeId>,
    pending: HashSet<NodeId>,
}

/// Outcome of one time-boxed drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub remaining: usize,
    /// True when the budget ran out before the queue emptied.
    pub deferred: bool,
}

impl UpdateQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a recount. Returns false if the file was already waiting.
    pub fn push(&mut self, id: NodeId) -> bool {
        if !self.pending.insert(id) {
            return false;
        }
        self.items.push_back(id);
        true
    }

    /// Take the oldest pending item.
    pub fn pop(&mut self) -> Option<NodeId> {
        let id = self.items.pop_front()?;
        self.pending.remove(&id);
        Some(id)
    }

    /// Drop a pending item, e.g. after its file was deleted.
    pub fn remove(&mut self, id: NodeId) -> bool {
        if !self.pending.remove(&id) {
            return false;
        }
        self.items.retain(|i| *i != id);
        true
    }

    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        self.pending.contains(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

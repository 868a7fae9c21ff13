//! Timer Queue
//!
//! Virtual-clock scheduling of deferred work:
//! - `schedule_after` returns a handle that cancels exactly one task
//! - Tasks fire in due-time order, ties broken by scheduling order
//! - Time only moves when the owner pops due tasks
//!
//! The queue never runs callbacks itself. The owner pops one due task at a
//! time and handles it to completion, which keeps every handler free of
//! reentrancy.

use std::collections::{BTreeMap, HashMap};

/// Timer handle
pub type TimerId = u64;

/// Ordered, cancellable collection of deferred tasks
#[derive(Debug)]
pub struct TimerQueue<T> {
    /// Current virtual time (ms)
    now_ms: u64,
    /// Next handle to hand out
    next_id: TimerId,
    /// Pending tasks keyed by (due time, handle)
    pending: BTreeMap<(u64, TimerId), T>,
    /// Handle → due time, for cancellation
    due_by_id: HashMap<TimerId, u64>,
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TimerQueue<T> {
    pub fn new() -> Self {
        Self {
            now_ms: 0,
            next_id: 1,
            pending: BTreeMap::new(),
            due_by_id: HashMap::new(),
        }
    }

    /// Current virtual time (ms)
    #[inline]
    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    /// Schedule `task` to fire `delay_ms` from now
    pub fn schedule_after(&mut self, delay_ms: u64, task: T) -> TimerId {
        let id = self.next_id;
        self.next_id += 1;

        let due = self.now_ms.saturating_add(delay_ms);
        self.pending.insert((due, id), task);
        self.due_by_id.insert(id, due);
        id
    }

    /// Cancel a pending task. Returns false if it already fired or was cancelled.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        match self.due_by_id.remove(&id) {
            Some(due) => self.pending.remove(&(due, id)).is_some(),
            None => false,
        }
    }

    /// Cancel every handle in `ids`, returning how many were still pending
    pub fn cancel_all<I>(&mut self, ids: I) -> usize
    where
        I: IntoIterator<Item = TimerId>,
    {
        ids.into_iter().filter(|id| self.cancel(*id)).count()
    }

    /// Whether a handle is still waiting to fire
    pub fn is_pending(&self, id: TimerId) -> bool {
        self.due_by_id.contains_key(&id)
    }

    /// Number of pending tasks
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Check if nothing is scheduled
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Due time of the earliest pending task
    pub fn next_due_ms(&self) -> Option<u64> {
        self.pending.keys().next().map(|(due, _)| *due)
    }

    /// Pop the earliest task due at or before `until_ms`, moving the clock to
    /// its due time.
    pub fn pop_due(&mut self, until_ms: u64) -> Option<(TimerId, T)> {
        let (&(due, id), _) = self.pending.iter().next()?;
        if due > until_ms {
            return None;
        }

        let task = self.pending.remove(&(due, id))?;
        self.due_by_id.remove(&id);
        self.now_ms = self.now_ms.max(due);
        Some((id, task))
    }

    /// Move the clock forward without firing anything
    pub fn advance_to(&mut self, ms: u64) {
        self.now_ms = self.now_ms.max(ms);
    }
}

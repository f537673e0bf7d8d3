//! # Software Timer Queue
//!
//! Ordered set of pending timers, keyed by deadline.
//!
//! ## Philosophy
//!
//! - **One queue, one owner**: The kernel owns exactly one queue; a timer
//!   lives in it from arming until it fires or is cancelled
//! - **Deterministic order**: Timers fire in deadline order, and timers with
//!   the same deadline fire in the order they were armed
//! - **Idempotent removal**: Cancelling a timer that already fired, or was
//!   already cancelled, is a harmless no-op
//!
//! The queue is generic over the callback payload so it can be tested on its
//! own; the kernel instantiates it with [`crate::TimerAction`].

use kernel_api::{Tick, TimerHandle};
use std::collections::{BTreeMap, HashMap};

/// A timer that has fired
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expired<C> {
    pub handle: TimerHandle,
    pub deadline: Tick,
    pub callback: C,
}

/// Deadline-ordered timer queue
#[derive(Debug)]
pub struct TimerQueue<C> {
    /// Armed timers ordered by (deadline, arming sequence)
    armed: BTreeMap<(Tick, u64), C>,
    /// Handle to deadline, for cancellation
    index: HashMap<u64, Tick>,
    next_id: u64,
}

impl<C> TimerQueue<C> {
    /// Creates an empty queue
    pub fn new() -> Self {
        Self {
            armed: BTreeMap::new(),
            index: HashMap::new(),
            next_id: 0,
        }
    }

    /// Arms a timer; returns its handle
    ///
    /// Handles come from a monotonic counter and are never reused.
    pub fn arm(&mut self, deadline: Tick, callback: C) -> TimerHandle {
        let id = self.next_id;
        self.next_id += 1;

        let previous = self.armed.insert((deadline, id), callback);
        assert!(previous.is_none(), "timer #{} queued twice", id);
        self.index.insert(id, deadline);

        TimerHandle(id)
    }

    /// Cancels a timer
    ///
    /// Returns `true` if the timer was still armed.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        match self.index.remove(&handle.0) {
            Some(deadline) => {
                let removed = self.armed.remove(&(deadline, handle.0));
                assert!(
                    removed.is_some(),
                    "timer index out of sync for {}",
                    handle
                );
                true
            }
            None => false,
        }
    }

    /// Removes and returns every timer due at or before `now`, in firing order
    pub fn expire(&mut self, now: Tick) -> Vec<Expired<C>> {
        let mut fired = Vec::new();
        while let Some(entry) = self.armed.first_entry() {
            if entry.key().0 > now {
                break;
            }
            let ((deadline, id), callback) = entry.remove_entry();
            self.index.remove(&id);
            fired.push(Expired {
                handle: TimerHandle(id),
                deadline,
                callback,
            });
        }
        fired
    }

    /// Earliest pending deadline
    pub fn next_deadline(&self) -> Option<Tick> {
        self.armed.keys().next().map(|(deadline, _)| *deadline)
    }

    /// Deadline of an armed timer
    pub fn deadline_of(&self, handle: TimerHandle) -> Option<Tick> {
        self.index.get(&handle.0).copied()
    }

    /// Callback of an armed timer
    pub fn get(&self, handle: TimerHandle) -> Option<&C> {
        let deadline = self.index.get(&handle.0)?;
        self.armed.get(&(*deadline, handle.0))
    }

    /// Checks whether a timer is still armed
    pub fn is_armed(&self, handle: TimerHandle) -> bool {
        self.index.contains_key(&handle.0)
    }

    /// Number of armed timers
    pub fn len(&self) -> usize {
        self.armed.len()
    }

    /// True if no timer is armed
    pub fn is_empty(&self) -> bool {
        self.armed.is_empty()
    }
}

impl<C> Default for TimerQueue<C> {
    fn default() -> Self {
        Self::new()
    }
}

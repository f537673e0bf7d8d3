//! Bounded asynchronous send ring.
//!
//! Each process owns one ring holding the messages it sent asynchronously
//! that could not be delivered yet. Order is FIFO per destination.

use core_types::Endpoint;
use ipc::Message;
use std::collections::VecDeque;

/// Queue error types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    Full,
}

/// One undelivered asynchronous message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsyncEntry {
    pub dst: Endpoint,
    pub msg: Message,
}

/// Bounded FIFO ring of undelivered messages.
#[derive(Debug, Clone)]
pub struct AsyncRing {
    capacity: usize,
    entries: VecDeque<AsyncEntry>,
}

impl AsyncRing {
    /// Creates a ring with the specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    /// Returns the configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of queued messages.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether the ring is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Appends a message for `dst`.
    pub fn push(&mut self, dst: Endpoint, msg: Message) -> Result<(), QueueError> {
        if self.entries.len() >= self.capacity {
            return Err(QueueError::Full);
        }
        self.entries.push_back(AsyncEntry { dst, msg });
        Ok(())
    }

    /// Returns whether any message for `dst` is queued.
    pub fn has_entry_for(&self, dst: Endpoint) -> bool {
        self.entries.iter().any(|e| e.dst == dst)
    }

    /// Removes the oldest message for `dst`.
    pub fn take_first_for(&mut self, dst: Endpoint) -> Option<Message> {
        let index = self.entries.iter().position(|e| e.dst == dst)?;
        self.entries.remove(index).map(|e| e.msg)
    }

    /// Distinct destinations, in order of their oldest entry.
    pub fn targets(&self) -> Vec<Endpoint> {
        let mut targets: Vec<Endpoint> = Vec::new();
        for entry in &self.entries {
            if !targets.contains(&entry.dst) {
                targets.push(entry.dst);
            }
        }
        targets
    }

    /// Drops every message for `dst`; returns how many were dropped.
    pub fn discard_for(&mut self, dst: Endpoint) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| e.dst != dst);
        before - self.entries.len()
    }

    /// Drops everything.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

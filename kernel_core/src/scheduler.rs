//! Multi-level Priority Scheduler
//!
//! ## Philosophy
//!
//! - **Mechanism, not policy**: Fixed priority levels, FIFO inside each
//!   level. Demotion and quanta are decided by the kernel around it.
//! - **Determinism first**: Same inputs + same ticks => same schedule.
//! - **No hidden yields**: Every preemption is explicit and audited.
//!
//! ## Design
//!
//! - **One FIFO per level**: Level 0 is the most urgent.
//! - **Dispatch**: The head of the highest non-empty queue runs next.
//! - **Running is off-queue**: The running process is not in any queue; it
//!   goes back to the head (preempted) or tail (quantum used up) when it
//!   stops running.
//!
//! The scheduler only holds endpoints. Priorities are passed in by the
//! kernel, which owns the process table.

use core_types::{Endpoint, Priority};
use kernel_api::Tick;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Scheduling event for audit trail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScheduleEvent {
    /// Process was selected to run
    Selected {
        endpoint: Endpoint,
        priority: Priority,
        timestamp: Tick,
    },
    /// Process stopped running but stays runnable
    Preempted {
        endpoint: Endpoint,
        reason: PreemptionReason,
        timestamp: Tick,
    },
    /// Process left the scheduler (blocked, stopped or dead)
    Descheduled { endpoint: Endpoint, timestamp: Tick },
}

/// Reason for preemption
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PreemptionReason {
    /// Time quantum expired
    QuantumExpired,
    /// A more urgent process became runnable
    HigherPriority,
}

/// Priority scheduler
#[derive(Debug)]
pub struct Scheduler {
    queues: Vec<VecDeque<Endpoint>>,
    current: Option<Endpoint>,
    /// Audit log for scheduling events
    audit_log: Vec<ScheduleEvent>,
}

impl Scheduler {
    /// Creates a scheduler with `queue_count` priority levels
    pub fn new(queue_count: usize) -> Self {
        Self {
            queues: (0..queue_count).map(|_| VecDeque::new()).collect(),
            current: None,
            audit_log: Vec::new(),
        }
    }

    /// Number of priority levels
    pub fn queue_count(&self) -> usize {
        self.queues.len()
    }

    /// Appends a runnable process to the tail of its level
    pub fn enqueue(&mut self, endpoint: Endpoint, priority: Priority) {
        self.check_insert(endpoint, priority);
        self.queues[priority.level()].push_back(endpoint);
    }

    /// Puts a runnable process at the head of its level
    pub fn enqueue_front(&mut self, endpoint: Endpoint, priority: Priority) {
        self.check_insert(endpoint, priority);
        self.queues[priority.level()].push_front(endpoint);
    }

    /// Removes a process from the scheduler, running or queued
    ///
    /// Returns true if it was known to the scheduler.
    pub fn remove(&mut self, endpoint: Endpoint, now: Tick) -> bool {
        let found = if self.current == Some(endpoint) {
            self.current = None;
            true
        } else {
            self.queues.iter_mut().any(|queue| {
                match queue.iter().position(|ep| *ep == endpoint) {
                    Some(index) => {
                        queue.remove(index);
                        true
                    }
                    None => false,
                }
            })
        };

        if found {
            self.audit_log.push(ScheduleEvent::Descheduled {
                endpoint,
                timestamp: now,
            });
        }
        found
    }

    /// Selects the head of the highest non-empty queue as the running process
    ///
    /// # Panics
    ///
    /// Panics if a process is already running.
    pub fn select_next(&mut self, priority_of: impl Fn(Endpoint) -> Priority, now: Tick) -> Option<Endpoint> {
        assert!(
            self.current.is_none(),
            "dispatch while {:?} is running",
            self.current
        );
        let endpoint = self.queues.iter_mut().find_map(|queue| queue.pop_front())?;
        self.current = Some(endpoint);
        self.audit_log.push(ScheduleEvent::Selected {
            endpoint,
            priority: priority_of(endpoint),
            timestamp: now,
        });
        Some(endpoint)
    }

    /// Stops the running process and requeues it at `priority`
    ///
    /// A process preempted by a more urgent one goes to the head of its
    /// queue; one whose quantum ran out goes to the tail.
    pub fn preempt_current(
        &mut self,
        priority: Priority,
        reason: PreemptionReason,
        now: Tick,
    ) -> Option<Endpoint> {
        let endpoint = self.current.take()?;
        match reason {
            PreemptionReason::HigherPriority => self.enqueue_front(endpoint, priority),
            PreemptionReason::QuantumExpired => self.enqueue(endpoint, priority),
        }
        self.audit_log.push(ScheduleEvent::Preempted {
            endpoint,
            reason,
            timestamp: now,
        });
        Some(endpoint)
    }

    /// Returns the running process
    pub fn current(&self) -> Option<Endpoint> {
        self.current
    }

    /// Most urgent level with a waiting process
    pub fn highest_ready_level(&self) -> Option<usize> {
        self.queues.iter().position(|queue| !queue.is_empty())
    }

    /// Checks whether a process is waiting in some queue
    pub fn is_queued(&self, endpoint: Endpoint) -> bool {
        self.queues.iter().any(|queue| queue.contains(&endpoint))
    }

    /// Snapshot of one level, head first
    pub fn queue(&self, level: usize) -> Vec<Endpoint> {
        self.queues
            .get(level)
            .map(|queue| queue.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Number of processes waiting to run
    pub fn runnable_count(&self) -> usize {
        self.queues.iter().map(VecDeque::len).sum()
    }

    /// Returns true if there are runnable processes waiting
    pub fn has_runnable(&self) -> bool {
        self.highest_ready_level().is_some()
    }

    /// Returns a reference to the audit log
    pub fn audit_log(&self) -> &[ScheduleEvent] {
        &self.audit_log
    }

    /// Clears the audit log
    pub fn clear_audit_log(&mut self) {
        self.audit_log.clear();
    }

    fn check_insert(&self, endpoint: Endpoint, priority: Priority) {
        assert!(
            priority.level() < self.queues.len(),
            "{} has no queue for {}",
            endpoint,
            priority
        );
        assert!(
            self.current != Some(endpoint) && !self.is_queued(endpoint),
            "{} is already scheduled",
            endpoint
        );
    }
}

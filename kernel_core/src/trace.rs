//! Kernel Audit Trail
//!
//! Every state transition the kernel makes is recorded here with the tick at
//! which it happened, and mirrored to the `log` facade at debug level.
//!
//! ## Philosophy
//!
//! - Deterministic: Events are recorded in the order they happen
//! - Queryable: Tests assert on the trail to verify kernel properties
//! - No logger is installed here; the embedding decides where `log` output goes
//!
//! ## Example
//!
//! ```
//! use kernel_core::trace::{KernelEvent, KernelTrace};
//! use kernel_api::Tick;
//! use core_types::well_known::CLOCK;
//!
//! let mut trace = KernelTrace::new();
//! trace.record(Tick::new(3), KernelEvent::Exited { endpoint: CLOCK });
//! assert!(trace.has_event(|e| matches!(e, KernelEvent::Exited { .. })));
//! ```

use core_types::{CopyDirection, Endpoint, GrantId, Priority, RegionId};
use ipc::SourceFilter;
use kernel_api::{KernelError, Tick, TimerHandle};
use serde::{Deserialize, Serialize};

/// How a message reached its receiver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryKind {
    Sync,
    Async,
    Notification,
}

/// Kernel events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KernelEvent {
    Delivered {
        from: Endpoint,
        to: Endpoint,
        kind: DeliveryKind,
    },
    SenderBlocked {
        sender: Endpoint,
        receiver: Endpoint,
    },
    ReceiverBlocked {
        receiver: Endpoint,
        filter: SourceFilter,
    },
    NotificationPending {
        from: Endpoint,
        to: Endpoint,
    },
    AsyncQueued {
        sender: Endpoint,
        receiver: Endpoint,
    },
    DeadlockRefused {
        caller: Endpoint,
        partner: Endpoint,
    },
    PartnerReleased {
        waiter: Endpoint,
        dead: Endpoint,
    },
    QuantumExpired {
        endpoint: Endpoint,
        priority: Priority,
    },
    TimerFired {
        handle: TimerHandle,
    },
    GrantCreated {
        owner: Endpoint,
        grant: GrantId,
        grantee: Endpoint,
    },
    GrantRevoked {
        owner: Endpoint,
        grant: GrantId,
    },
    Copied {
        caller: Endpoint,
        owner: Endpoint,
        grant: GrantId,
        direction: CopyDirection,
        bytes: u64,
    },
    CopyDenied {
        caller: Endpoint,
        owner: Endpoint,
        grant: GrantId,
        error: KernelError,
    },
    Spawned {
        endpoint: Endpoint,
        name: String,
        priority: Priority,
    },
    Killed {
        endpoint: Endpoint,
        by: Endpoint,
    },
    Exited {
        endpoint: Endpoint,
    },
    Cleared {
        endpoint: Endpoint,
    },
    Stopped {
        endpoint: Endpoint,
    },
    Resumed {
        endpoint: Endpoint,
    },
    SignalHeld {
        endpoint: Endpoint,
    },
    SignalReleased {
        endpoint: Endpoint,
    },
    Rescheduled {
        endpoint: Endpoint,
        priority: Priority,
    },
    PrivilegesChanged {
        endpoint: Endpoint,
    },
    RegionMapped {
        endpoint: Endpoint,
        region: RegionId,
        size: u64,
    },
}

/// A single audit event with timestamp
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceRecord {
    pub timestamp: Tick,
    pub event: KernelEvent,
}

/// Audit log for kernel operations
#[derive(Debug, Default)]
pub struct KernelTrace {
    records: Vec<TraceRecord>,
}

impl KernelTrace {
    /// Creates a new empty trace
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    /// Records an event at the specified tick
    pub fn record(&mut self, timestamp: Tick, event: KernelEvent) {
        log::debug!("[{}] {:?}", timestamp, event);
        self.records.push(TraceRecord { timestamp, event });
    }

    /// Returns all records
    pub fn records(&self) -> &[TraceRecord] {
        &self.records
    }

    /// Iterates over events, oldest first
    pub fn events(&self) -> impl Iterator<Item = &KernelEvent> {
        self.records.iter().map(|r| &r.event)
    }

    /// Checks if an event matching the predicate exists
    pub fn has_event<F>(&self, predicate: F) -> bool
    where
        F: Fn(&KernelEvent) -> bool,
    {
        self.events().any(predicate)
    }

    /// Counts events matching the predicate
    pub fn count_events<F>(&self, predicate: F) -> usize
    where
        F: Fn(&KernelEvent) -> bool,
    {
        self.events().filter(|e| predicate(e)).count()
    }

    /// Clears all records
    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Serializes the trail to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.records)
    }
}

//! Privilege map
//!
//! One row per process slot: who it may send to, which kernel calls it may
//! make, and whether it is a system process. `check_send` is consulted on
//! every send-class call and never changes state.

use core_types::{Endpoint, ProcessSlot};
use kernel_api::{CallMask, KernelCallNumber, Privileges, SendTargets};
use std::collections::BTreeSet;

/// Send scope of one process
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendScope {
    All,
    Only(BTreeSet<Endpoint>),
}

/// Privilege row of one process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivilegeRow {
    pub system: bool,
    pub send_to: SendScope,
    pub calls: CallMask,
}

impl PrivilegeRow {
    fn from_privileges(privileges: &Privileges) -> Self {
        let send_to = match &privileges.send_to {
            SendTargets::All => SendScope::All,
            SendTargets::Only(targets) => SendScope::Only(targets.iter().copied().collect()),
            SendTargets::None => SendScope::Only(BTreeSet::new()),
        };
        Self {
            system: privileges.system,
            send_to,
            calls: privileges.calls,
        }
    }

    /// Converts back to the call-level description
    pub fn to_privileges(&self) -> Privileges {
        let send_to = match &self.send_to {
            SendScope::All => SendTargets::All,
            SendScope::Only(set) if set.is_empty() => SendTargets::None,
            SendScope::Only(set) => SendTargets::Only(set.iter().copied().collect()),
        };
        Privileges {
            system: self.system,
            send_to,
            calls: self.calls,
        }
    }
}

/// Per-slot privilege rows
#[derive(Debug)]
pub struct PrivilegeMap {
    rows: Vec<Option<PrivilegeRow>>,
}

impl PrivilegeMap {
    /// Creates an empty map for `slots` processes
    pub fn new(slots: usize) -> Self {
        Self {
            rows: vec![None; slots],
        }
    }

    /// Installs the row for `endpoint`, replacing any previous one
    pub fn set(&mut self, endpoint: Endpoint, privileges: &Privileges) {
        self.rows[endpoint.slot().index()] = Some(PrivilegeRow::from_privileges(privileges));
    }

    /// Returns the row for `slot`
    pub fn row(&self, slot: ProcessSlot) -> Option<&PrivilegeRow> {
        self.rows.get(slot.index()).and_then(|r| r.as_ref())
    }

    /// May `src` target `dst` with a send-class call?
    pub fn check_send(&self, src: Endpoint, dst: Endpoint) -> bool {
        match self.row(src.slot()).map(|r| &r.send_to) {
            Some(SendScope::All) => true,
            Some(SendScope::Only(set)) => set.contains(&dst),
            None => false,
        }
    }

    /// May `caller` invoke `call`?
    ///
    /// System-only calls also need the system flag; a mask bit alone is not
    /// enough.
    pub fn permits_call(&self, caller: Endpoint, call: KernelCallNumber) -> bool {
        self.row(caller.slot())
            .is_some_and(|r| r.calls.permits(call) && (r.system || !call.is_system_only()))
    }

    /// Is `endpoint` a system process?
    pub fn is_system(&self, endpoint: Endpoint) -> bool {
        self.row(endpoint.slot()).is_some_and(|r| r.system)
    }

    /// Call-level description of the row for `endpoint`
    pub fn privileges_of(&self, endpoint: Endpoint) -> Option<Privileges> {
        self.row(endpoint.slot()).map(PrivilegeRow::to_privileges)
    }

    /// Drops the row of a dead process and every reference to it
    pub fn clear_process(&mut self, endpoint: Endpoint) {
        if let Some(row) = self.rows.get_mut(endpoint.slot().index()) {
            *row = None;
        }
        for row in self.rows.iter_mut().flatten() {
            if let SendScope::Only(set) = &mut row.send_to {
                set.remove(&endpoint);
            }
        }
    }
}

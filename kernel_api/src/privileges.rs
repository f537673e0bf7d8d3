//! Privilege descriptors
//!
//! A process's privileges are fixed by its creator and can only ever be
//! narrowed relative to the creator's own.

use crate::syscalls::CallMask;
use core_types::Endpoint;
use serde::{Deserialize, Serialize};

/// Endpoints a process may target with send-class calls
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SendTargets {
    /// Any live process
    All,
    /// Only the listed endpoints
    Only(Vec<Endpoint>),
    /// No process at all
    None,
}

impl SendTargets {
    /// Checks whether `dst` is allowed
    pub fn allows(&self, dst: Endpoint) -> bool {
        match self {
            SendTargets::All => true,
            SendTargets::Only(targets) => targets.contains(&dst),
            SendTargets::None => false,
        }
    }

    /// Checks whether every target in `self` is also in `other`
    pub fn is_subset_of(&self, other: &SendTargets) -> bool {
        match (self, other) {
            (SendTargets::None, _) => true,
            (_, SendTargets::All) => true,
            (SendTargets::All, _) => false,
            (SendTargets::Only(mine), SendTargets::Only(theirs)) => {
                mine.iter().all(|ep| theirs.contains(ep))
            }
            (SendTargets::Only(mine), SendTargets::None) => mine.is_empty(),
        }
    }
}

/// Privileges requested for, or held by, a process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Privileges {
    /// Full kernel-call access
    pub system: bool,
    /// Send-class targets
    pub send_to: SendTargets,
    /// Kernel calls the process may invoke
    pub calls: CallMask,
}

impl Privileges {
    /// System privileges: every call, every target
    pub fn system() -> Self {
        Self {
            system: true,
            send_to: SendTargets::All,
            calls: CallMask::system(),
        }
    }

    /// User privileges with the default call mask
    pub fn user(send_to: SendTargets) -> Self {
        Self {
            system: false,
            send_to,
            calls: CallMask::user_default(),
        }
    }

    /// Replaces the call mask
    pub fn with_calls(mut self, calls: CallMask) -> Self {
        self.calls = calls;
        self
    }

    /// Checks whether these privileges can be handed out by `holder`
    pub fn is_subset_of(&self, holder: &Privileges) -> bool {
        (!self.system || holder.system)
            && self.send_to.is_subset_of(&holder.send_to)
            && holder.calls.contains(self.calls)
    }
}

impl Default for Privileges {
    fn default() -> Self {
        Self::user(SendTargets::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::ProcessSlot;

    fn ep(slot: u32) -> Endpoint {
        Endpoint::new(ProcessSlot(slot), 0)
    }

    #[test]
    fn test_send_targets_allow() {
        assert!(SendTargets::All.allows(ep(3)));
        assert!(!SendTargets::None.allows(ep(3)));
        let only = SendTargets::Only(vec![ep(2), ep(5)]);
        assert!(only.allows(ep(5)));
        assert!(!only.allows(ep(4)));
    }

    #[test]
    fn test_send_targets_subset() {
        let small = SendTargets::Only(vec![ep(2)]);
        let big = SendTargets::Only(vec![ep(2), ep(3)]);
        assert!(small.is_subset_of(&big));
        assert!(!big.is_subset_of(&small));
        assert!(big.is_subset_of(&SendTargets::All));
        assert!(!SendTargets::All.is_subset_of(&big));
        assert!(SendTargets::None.is_subset_of(&small));
        assert!(SendTargets::Only(vec![]).is_subset_of(&SendTargets::None));
    }

    #[test]
    fn test_user_cannot_hand_out_system() {
        let user = Privileges::user(SendTargets::All);
        assert!(!Privileges::system().is_subset_of(&user));
        assert!(user.is_subset_of(&Privileges::system()));
    }

    #[test]
    fn test_call_mask_must_be_narrower() {
        let holder = Privileges::user(SendTargets::All);
        let wider = Privileges::user(SendTargets::All).with_calls(CallMask::system());
        assert!(!wider.is_subset_of(&holder));
    }
}

//! Kernel error types

use core_types::{Endpoint, GrantId, MemRange};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a grant could not be used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GrantDenial {
    /// The grant was revoked, or its id is stale
    Revoked,
    /// The grantor no longer exists
    OwnerDead,
    /// The caller is not the grantee
    NotGrantee,
    /// The grant does not permit the requested direction
    WrongMode,
    /// The requested offset lies outside the granted range
    OutOfRange,
    /// A single-use grant was already consumed
    AlreadyUsed,
    /// An indirect grant chain is longer than allowed
    ChainTooDeep,
}

impl core::fmt::Display for GrantDenial {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let reason = match self {
            GrantDenial::Revoked => "revoked",
            GrantDenial::OwnerDead => "owner dead",
            GrantDenial::NotGrantee => "caller is not the grantee",
            GrantDenial::WrongMode => "access mode not granted",
            GrantDenial::OutOfRange => "offset outside granted range",
            GrantDenial::AlreadyUsed => "single-use grant already used",
            GrantDenial::ChainTooDeep => "indirect chain too deep",
        };
        f.write_str(reason)
    }
}

/// Errors returned by kernel calls
///
/// Every failure is reported synchronously to the caller. Internal invariant
/// violations are not represented here; they halt the kernel.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum KernelError {
    /// Endpoint does not name a live process of matching generation
    #[error("No such target: {0}")]
    NoSuchTarget(Endpoint),

    /// Grant id is outside the owner's table
    #[error("No such grant {grant} owned by {owner}")]
    NoSuchGrant { owner: Endpoint, grant: GrantId },

    /// Privilege map or call mask forbids the operation
    #[error("Not allowed: {0}")]
    NotAllowed(String),

    /// Range is not wholly inside the caller's address space
    #[error("Invalid range: {0}")]
    InvalidRange(MemRange),

    /// Grant exists but may not be used as requested
    #[error("Invalid grant: {0}")]
    InvalidGrant(GrantDenial),

    /// Asynchronous send ring is full
    #[error("Async queue of {sender} is full ({capacity} entries)")]
    QueueFull { sender: Endpoint, capacity: usize },

    /// Blocking would close a cycle of waiting processes
    #[error("Deadlock: {caller} would wait on {partner}")]
    Deadlock { caller: Endpoint, partner: Endpoint },

    /// IPC partner died while the caller was blocked on it
    #[error("IPC partner died: {0}")]
    DeadPartner(Endpoint),

    /// Caller is not a live, runnable process
    #[error("Invalid caller: {0}")]
    InvalidCaller(Endpoint),

    /// Target is in a state that does not permit the operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Argument is malformed
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Resource exhausted
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),
}

impl KernelError {
    /// True for the grant-validation family of errors
    pub fn is_grant_error(&self) -> bool {
        matches!(
            self,
            KernelError::InvalidGrant(_)
                | KernelError::NoSuchGrant { .. }
                | KernelError::InvalidRange(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::{ProcessSlot, RegionId};

    #[test]
    fn test_error_display() {
        let ep = Endpoint::new(ProcessSlot(4), 1);
        assert_eq!(
            KernelError::NoSuchTarget(ep).to_string(),
            "No such target: ep(4:1)"
        );
        assert_eq!(
            KernelError::InvalidGrant(GrantDenial::WrongMode).to_string(),
            "Invalid grant: access mode not granted"
        );
    }

    #[test]
    fn test_grant_error_family() {
        assert!(KernelError::InvalidGrant(GrantDenial::Revoked).is_grant_error());
        assert!(KernelError::InvalidRange(MemRange::new(RegionId(0), 0, 1)).is_grant_error());
        assert!(!KernelError::NotAllowed("x".to_string()).is_grant_error());
    }

    #[test]
    fn test_error_serde() {
        let err = KernelError::QueueFull {
            sender: Endpoint::new(ProcessSlot(2), 0),
            capacity: 16,
        };
        let json = serde_json::to_string(&err).unwrap();
        let back: KernelError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, err);
    }
}

//! Grant (memory capability) types
//!
//! A grant is a process's explicit, revocable permission for one other
//! process to touch a bounded range of its memory.
//!
//! ## Design Principles
//!
//! 1. **Unforgeable**: Grant ids carry a generation, so a revoked id never
//!    resolves again even after its table slot is reused
//! 2. **Bounded**: A grant names a range, and copies are clamped to it
//! 3. **Revocable**: The grantor can withdraw a grant at any time
//!
//! ## Example
//!
//! ```
//! use core_types::{AccessMode, GrantId};
//!
//! let id = GrantId::new(3, 1);
//! assert_eq!(id.index(), 3);
//! assert!(AccessMode::READ_WRITE.contains(AccessMode::READ));
//! ```

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

bitflags! {
    /// Access a grant permits to its grantee.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct AccessMode: u8 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const READ_WRITE = Self::READ.bits() | Self::WRITE.bits();
    }
}

bitflags! {
    /// Validity flags stored with a grant.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct GrantFlags: u8 {
        /// Entry is live
        const VALID = 1 << 0;
        /// Entry has been used by at least one copy
        const USED = 1 << 1;
        /// Entry may be used by exactly one copy
        const SINGLE_USE = 1 << 2;
        /// Entry forwards part of a grant held by its creator
        const INDIRECT = 1 << 3;
    }
}

/// Generation-tagged index into a process's grant table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GrantId {
    index: u32,
    generation: u32,
}

impl GrantId {
    /// Creates a grant id
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Returns the table index
    pub fn index(&self) -> usize {
        self.index as usize
    }

    /// Returns the generation the id was issued with
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for GrantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "grant({}:{})", self.index, self.generation)
    }
}

/// Direction of a safe copy, seen from the granting process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CopyDirection {
    /// Read grantor memory into the caller's buffer (needs `READ`)
    FromGrantor,
    /// Write the caller's buffer into grantor memory (needs `WRITE`)
    ToGrantor,
}

impl CopyDirection {
    /// Access the grant must permit for this direction
    pub fn required_access(&self) -> AccessMode {
        match self {
            CopyDirection::FromGrantor => AccessMode::READ,
            CopyDirection::ToGrantor => AccessMode::WRITE,
        }
    }

    /// Access the caller's own buffer needs for this direction
    pub fn local_access(&self) -> AccessMode {
        match self {
            CopyDirection::FromGrantor => AccessMode::WRITE,
            CopyDirection::ToGrantor => AccessMode::READ,
        }
    }
}

//! Identifiers for kernel-known processes

use serde::{Deserialize, Serialize};
use std::fmt;

const SLOT_BITS: u32 = 32;
const SLOT_MASK: u64 = (1u64 << SLOT_BITS) - 1;

/// Index of a process table slot
///
/// Slots are reused after a process is cleared. A slot on its own is never
/// enough to name a process; use [`Endpoint`] for that.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProcessSlot(pub u32);

impl ProcessSlot {
    /// Returns the slot as a table index
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ProcessSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot{}", self.0)
    }
}

/// Generation-tagged process identifier
///
/// An endpoint packs a slot index (low 32 bits) and the slot's generation
/// (high 32 bits). Every time a slot is reclaimed its generation moves on, so
/// an endpoint captured before the reuse no longer resolves.
///
/// # Example
///
/// ```
/// use core_types::{Endpoint, ProcessSlot};
///
/// let old = Endpoint::new(ProcessSlot(7), 1);
/// let new = Endpoint::new(ProcessSlot(7), 2);
/// assert_eq!(old.slot(), new.slot());
/// assert_ne!(old, new);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Endpoint(u64);

impl Endpoint {
    /// Wildcard source used by receive filters
    pub const ANY: Endpoint = Endpoint(u64::MAX);

    /// Placeholder for "no process"
    pub const NONE: Endpoint = Endpoint(u64::MAX - 1);

    /// Creates an endpoint from a slot and generation
    pub const fn new(slot: ProcessSlot, generation: u32) -> Self {
        Self(((generation as u64) << SLOT_BITS) | slot.0 as u64)
    }

    /// Reconstructs an endpoint from its packed form
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the packed form
    pub const fn raw(&self) -> u64 {
        self.0
    }

    /// Returns the slot this endpoint points at
    pub const fn slot(&self) -> ProcessSlot {
        ProcessSlot((self.0 & SLOT_MASK) as u32)
    }

    /// Returns the generation this endpoint was issued with
    pub const fn generation(&self) -> u32 {
        (self.0 >> SLOT_BITS) as u32
    }

    /// True for the reserved `ANY` and `NONE` values
    pub const fn is_reserved(&self) -> bool {
        self.0 == Self::ANY.0 || self.0 == Self::NONE.0
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::ANY {
            write!(f, "ep(ANY)")
        } else if *self == Self::NONE {
            write!(f, "ep(NONE)")
        } else {
            write!(f, "ep({}:{})", self.slot().0, self.generation())
        }
    }
}

/// Scheduling priority level
///
/// Lower numbers are more urgent: `Priority(0)` is dispatched before
/// `Priority(1)`. The number of levels is a kernel configuration value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Priority(pub u8);

impl Priority {
    /// Most urgent level, reserved for system processes
    pub const HIGHEST: Priority = Priority(0);

    /// Returns the level as a queue index
    pub fn level(&self) -> usize {
        self.0 as usize
    }

    /// True if `self` is dispatched strictly before `other`
    pub fn is_higher_than(&self, other: Priority) -> bool {
        self.0 < other.0
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "prio{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_packing() {
        let ep = Endpoint::new(ProcessSlot(12), 3);
        assert_eq!(ep.slot(), ProcessSlot(12));
        assert_eq!(ep.generation(), 3);
        assert_eq!(Endpoint::from_raw(ep.raw()), ep);
    }

    #[test]
    fn test_generation_distinguishes_reuse() {
        let first = Endpoint::new(ProcessSlot(4), 0);
        let second = Endpoint::new(ProcessSlot(4), 1);
        assert_eq!(first.slot(), second.slot());
        assert_ne!(first, second);
    }

    #[test]
    fn test_reserved_endpoints() {
        assert!(Endpoint::ANY.is_reserved());
        assert!(Endpoint::NONE.is_reserved());
        assert!(!Endpoint::new(ProcessSlot(0), 0).is_reserved());
        assert_ne!(Endpoint::ANY, Endpoint::NONE);
    }

    #[test]
    fn test_endpoint_display() {
        assert_eq!(format!("{}", Endpoint::new(ProcessSlot(5), 2)), "ep(5:2)");
        assert_eq!(format!("{}", Endpoint::ANY), "ep(ANY)");
    }

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::HIGHEST.is_higher_than(Priority(3)));
        assert!(!Priority(3).is_higher_than(Priority(3)));
        assert!(!Priority(7).is_higher_than(Priority(2)));
    }
}

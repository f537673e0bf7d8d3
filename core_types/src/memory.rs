//! # Memory Types
//!
//! Memory in the kernel core is named by region, never by raw address.
//!
//! ## Philosophy
//!
//! - **No raw pointers cross the kernel boundary**
//! - **Every range is validated against the owner's region table**
//! - **Sharing happens only through explicit grants**
//!
//! ## Key Types
//!
//! - [`RegionId`]: Index of a region in a process's region table
//! - [`MemRange`]: A `(region, offset, len)` tuple
//! - [`MemoryPerms`]: Permission flags for memory regions

use crate::capability::AccessMode;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Index of a memory region within one process's region table
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RegionId(pub u32);

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "region:{}", self.0)
    }
}

/// Memory permission flags
///
/// By default, no permissions are granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemoryPerms {
    pub read: bool,
    pub write: bool,
}

impl MemoryPerms {
    /// No permissions
    pub fn none() -> Self {
        Self {
            read: false,
            write: false,
        }
    }

    /// Read-only permission
    pub fn read_only() -> Self {
        Self {
            read: true,
            write: false,
        }
    }

    /// Read and write permissions
    pub fn read_write() -> Self {
        Self {
            read: true,
            write: true,
        }
    }

    /// Check if this has read permission
    pub fn can_read(&self) -> bool {
        self.read
    }

    /// Check if this has write permission
    pub fn can_write(&self) -> bool {
        self.write
    }

    /// Checks whether every access in `mode` is permitted
    pub fn allows(&self, mode: AccessMode) -> bool {
        (!mode.contains(AccessMode::READ) || self.read)
            && (!mode.contains(AccessMode::WRITE) || self.write)
    }
}

impl fmt::Display for MemoryPerms {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}",
            if self.read { "R" } else { "-" },
            if self.write { "W" } else { "-" }
        )
    }
}

/// A contiguous byte range inside one region
///
/// Ranges are only meaningful together with the process that owns the
/// region; the kernel checks them against that process's region table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemRange {
    pub region: RegionId,
    pub offset: u64,
    pub len: u64,
}

impl MemRange {
    /// Creates a range
    pub const fn new(region: RegionId, offset: u64, len: u64) -> Self {
        Self {
            region,
            offset,
            len,
        }
    }

    /// Exclusive end offset, `None` on overflow
    pub fn end(&self) -> Option<u64> {
        self.offset.checked_add(self.len)
    }

    /// True if the range fits inside a region of `region_size` bytes
    pub fn fits_within(&self, region_size: u64) -> bool {
        matches!(self.end(), Some(end) if end <= region_size)
    }

    /// Returns the sub-range starting `offset` bytes in, at most `len` long
    ///
    /// The result is clamped to this range. Returns `None` when `offset`
    /// lies past the end.
    pub fn sub_range(&self, offset: u64, len: u64) -> Option<MemRange> {
        if offset > self.len {
            return None;
        }
        let available = self.len - offset;
        Some(MemRange {
            region: self.region,
            offset: self.offset + offset,
            len: len.min(available),
        })
    }

    /// Returns this range shortened to at most `len` bytes
    pub fn truncated(&self, len: u64) -> MemRange {
        MemRange {
            len: self.len.min(len),
            ..*self
        }
    }
}

impl fmt::Display for MemRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}..+{}]", self.region, self.offset, self.len)
    }
}

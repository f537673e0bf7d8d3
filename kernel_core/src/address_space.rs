//! Address spaces for the simulated kernel
//!
//! Each process owns a table of byte regions. Regions are added by the
//! memory-manager collaborator through `map_region` and released when the
//! process dies. Every range the kernel touches is checked against this
//! table first; there are no raw addresses.

use core_types::{AccessMode, MemRange, MemoryPerms, RegionId};

/// Largest region the simulation will back with memory
pub const MAX_REGION_BYTES: u64 = 16 * 1024 * 1024;

/// One mapped region
#[derive(Debug, Clone)]
pub struct Region {
    pub perms: MemoryPerms,
    bytes: Vec<u8>,
}

impl Region {
    /// Region size in bytes
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Region table of one process
#[derive(Debug, Clone, Default)]
pub struct AddressSpace {
    regions: Vec<Region>,
}

impl AddressSpace {
    /// Creates an empty address space
    pub fn new() -> Self {
        Self {
            regions: Vec::new(),
        }
    }

    /// Maps a zero-filled region
    pub fn map(&mut self, size: u64, perms: MemoryPerms) -> RegionId {
        let id = RegionId(self.regions.len() as u32);
        self.regions.push(Region {
            perms,
            bytes: vec![0; size as usize],
        });
        id
    }

    /// Returns a region
    pub fn region(&self, id: RegionId) -> Option<&Region> {
        self.regions.get(id.0 as usize)
    }

    /// Number of mapped regions
    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    /// Checks that `range` lies inside a mapped region
    pub fn contains(&self, range: MemRange) -> bool {
        self.region(range.region)
            .is_some_and(|r| range.fits_within(r.size()))
    }

    /// Checks that `range` lies inside a region that permits `access`
    pub fn permits(&self, range: MemRange, access: AccessMode) -> bool {
        self.region(range.region)
            .is_some_and(|r| range.fits_within(r.size()) && r.perms.allows(access))
    }

    /// Reads a range without permission checks
    pub fn read(&self, range: MemRange) -> Option<&[u8]> {
        let region = self.region(range.region)?;
        if !range.fits_within(region.size()) {
            return None;
        }
        let start = range.offset as usize;
        Some(&region.bytes[start..start + range.len as usize])
    }

    /// Writes `data` at the start of a range without permission checks
    ///
    /// Returns false if the range is invalid or shorter than `data`.
    pub fn write(&mut self, range: MemRange, data: &[u8]) -> bool {
        let Some(region) = self.regions.get_mut(range.region.0 as usize) else {
            return false;
        };
        if !range.fits_within(region.bytes.len() as u64) || (data.len() as u64) > range.len {
            return false;
        }
        let start = range.offset as usize;
        region.bytes[start..start + data.len()].copy_from_slice(data);
        true
    }

    /// Unmaps everything
    pub fn release(&mut self) {
        self.regions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_and_validate() {
        let mut space = AddressSpace::new();
        let ro = space.map(64, MemoryPerms::read_only());
        let rw = space.map(16, MemoryPerms::read_write());
        assert_eq!(ro, RegionId(0));
        assert_eq!(rw, RegionId(1));

        assert!(space.contains(MemRange::new(ro, 0, 64)));
        assert!(!space.contains(MemRange::new(ro, 1, 64)));
        assert!(!space.contains(MemRange::new(RegionId(7), 0, 1)));

        assert!(space.permits(MemRange::new(ro, 0, 8), AccessMode::READ));
        assert!(!space.permits(MemRange::new(ro, 0, 8), AccessMode::WRITE));
        assert!(space.permits(MemRange::new(rw, 0, 8), AccessMode::READ_WRITE));
    }

    #[test]
    fn test_read_write() {
        let mut space = AddressSpace::new();
        let region = space.map(8, MemoryPerms::read_write());
        assert!(space.write(MemRange::new(region, 2, 4), b"abcd"));
        assert_eq!(space.read(MemRange::new(region, 0, 8)).unwrap(), b"\0\0abcd\0\0");

        assert!(!space.write(MemRange::new(region, 6, 4), b"abcd"));
        assert!(!space.write(MemRange::new(region, 0, 2), b"abc"));
        assert!(space.read(MemRange::new(region, 4, 5)).is_none());
    }

    #[test]
    fn test_release() {
        let mut space = AddressSpace::new();
        let region = space.map(8, MemoryPerms::read_write());
        space.release();
        assert_eq!(space.region_count(), 0);
        assert!(!space.contains(MemRange::new(region, 0, 1)));
    }
}

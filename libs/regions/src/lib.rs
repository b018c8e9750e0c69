//! The mapped-regions table and the permission-check walk.
//!
//! A process only has memory where something explicitly mapped it, and
//! each mapping carries its own read/write/execute bits. This keeps a
//! `base`-sorted, non-overlapping list of such mappings and answers the
//! question every load/store asks before touching a byte: is this whole
//! access inside mapped memory, with the right permissions, all the way
//! through?

use bitflags::bitflags;
use thiserror::Error;

bitflags! {
    /// Permission bits for a mapped region. Bit 0 is read, bit 1 is
    /// write, bit 2 is execute.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct Perms: u8 {
        const READ = 0b001;
        const WRITE = 0b010;
        const EXEC = 0b100;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Region {
    pub base: u64,
    pub length: u64,
    pub perms: Perms,
}

impl Region {
    fn end(&self) -> u64 {
        self.base + self.length
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegionError {
    #[error("region [{base:#x}, {:#x}) overlaps an existing mapping", base + length)]
    Overlap { base: u64, length: u64 },
    #[error("no mapping covers [{base:#x}, {:#x})", base + length)]
    NotMapped { base: u64, length: u64 },
    #[error("access at {addr:#x} requires {requested:?}, mapping only grants {available:?}")]
    PermissionDenied {
        addr: u64,
        requested: Perms,
        available: Perms,
    },
    #[error("access at {addr:#x} falls outside any mapped region")]
    Unmapped { addr: u64 },
}

/// An ordered, non-overlapping table of mapped regions.
#[derive(Clone, Debug, Default)]
pub struct RegionTable {
    regions: Vec<Region>,
}

impl RegionTable {
    pub fn new() -> Self {
        RegionTable {
            regions: Vec::new(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Region> {
        self.regions.iter()
    }

    fn overlaps(&self, base: u64, length: u64) -> bool {
        let end = base + length;
        self.regions
            .iter()
            .any(|r| base < r.end() && r.base < end)
    }

    /// Map `[base, base+length)` with `perms`. Fails if it overlaps an
    /// existing mapping.
    pub fn map(&mut self, base: u64, length: u64, perms: Perms) -> Result<(), RegionError> {
        if length == 0 {
            return Ok(());
        }
        if self.overlaps(base, length) {
            return Err(RegionError::Overlap { base, length });
        }
        let idx = self.regions.partition_point(|r| r.base < base);
        self.regions.insert(idx, Region { base, length, perms });
        log::debug!("regions: mapped [{base:#x}, {:#x}) perms={perms:?}", base + length);
        Ok(())
    }

    /// Unmap exactly `[base, base+length)`. Fails unless that whole range
    /// is covered by a single existing mapping with identical bounds.
    pub fn unmap(&mut self, base: u64, length: u64) -> Result<(), RegionError> {
        if length == 0 {
            return Ok(());
        }
        let pos = self
            .regions
            .iter()
            .position(|r| r.base == base && r.length == length);
        match pos {
            Some(idx) => {
                self.regions.remove(idx);
                log::debug!("regions: unmapped [{base:#x}, {:#x})", base + length);
                Ok(())
            }
            None => Err(RegionError::NotMapped { base, length }),
        }
    }

    /// Permissions in effect at `addr`, or `None` if unmapped.
    pub fn permissions(&self, addr: u64) -> Option<Perms> {
        self.regions
            .iter()
            .find(|r| r.base <= addr && addr < r.end())
            .map(|r| r.perms)
    }

    /// Walk `[addr, addr+length)` and confirm every byte is mapped with at
    /// least `access`. Reports the first offending address, mirroring
    /// the original implementation's linear scan over sorted mappings
    /// rather than a per-byte membership test.
    pub fn check_access(&self, addr: u64, length: u64, access: Perms) -> Result<(), RegionError> {
        if length == 0 {
            return Ok(());
        }
        let want_end = addr + length;
        let mut cursor = addr;

        for r in &self.regions {
            if r.end() <= cursor {
                continue;
            }
            if r.base >= want_end {
                break;
            }
            if r.base > cursor {
                return Err(RegionError::Unmapped { addr: cursor });
            }
            if !r.perms.contains(access) {
                return Err(RegionError::PermissionDenied {
                    addr: cursor,
                    requested: access,
                    available: r.perms,
                });
            }
            cursor = r.end();
            if cursor >= want_end {
                return Ok(());
            }
        }
        Err(RegionError::Unmapped { addr: cursor })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_then_check_access_succeeds_inside_region() {
        let mut t = RegionTable::new();
        t.map(0x1000, 0x1000, Perms::READ | Perms::WRITE).unwrap();
        assert!(t.check_access(0x1000, 0x10, Perms::READ).is_ok());
        assert!(t.check_access(0x1ff0, 0x10, Perms::WRITE).is_ok());
    }

    #[test]
    fn check_access_rejects_wrong_permission() {
        let mut t = RegionTable::new();
        t.map(0x1000, 0x1000, Perms::READ).unwrap();
        let err = t.check_access(0x1000, 4, Perms::WRITE).unwrap_err();
        assert_eq!(
            err,
            RegionError::PermissionDenied {
                addr: 0x1000,
                requested: Perms::WRITE,
                available: Perms::READ,
            }
        );
    }

    #[test]
    fn check_access_rejects_gap_between_regions() {
        let mut t = RegionTable::new();
        t.map(0x1000, 0x10, Perms::READ).unwrap();
        t.map(0x1020, 0x10, Perms::READ).unwrap();
        let err = t.check_access(0x1000, 0x30, Perms::READ).unwrap_err();
        assert_eq!(err, RegionError::Unmapped { addr: 0x1010 });
    }

    #[test]
    fn map_rejects_overlap() {
        let mut t = RegionTable::new();
        t.map(0x1000, 0x1000, Perms::READ).unwrap();
        assert!(matches!(
            t.map(0x1800, 0x100, Perms::READ),
            Err(RegionError::Overlap { .. })
        ));
    }

    #[test]
    fn unmap_requires_exact_bounds() {
        let mut t = RegionTable::new();
        t.map(0x1000, 0x1000, Perms::READ).unwrap();
        assert!(matches!(
            t.unmap(0x1000, 0x800),
            Err(RegionError::NotMapped { .. })
        ));
        assert!(t.unmap(0x1000, 0x1000).is_ok());
        assert_eq!(t.permissions(0x1000), None);
    }
}

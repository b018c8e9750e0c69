//! The plugin's error hierarchy. Component crates (`regions`, `ivtree`,
//! `pitree`) keep their own narrow `thiserror` types; this converts them
//! at the boundary into the four outcomes the engine actually needs to
//! branch on, the same "local error, converted at the edge" shape the
//! teacher uses between `paging::Error` and `mem::space`.

use regions::RegionError;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MemError {
    #[error("segfault: {access:?} access to {addr:#x} (feasible range [{min:#x}, {max:#x}]) is not permitted")]
    SegFault {
        addr: u64,
        access: AccessKind,
        min: u64,
        max: u64,
    },

    #[error("memory limit exceeded: requested size {size:#x} exceeds the configured cap")]
    MemoryLimitExceeded { size: u64 },

    #[error("unsatisfiable: {0}")]
    Unsatisfiable(&'static str),

    #[error("internal invariant violation: {0}")]
    Internal(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessKind {
    Read,
    Write,
    Exec,
}

impl From<RegionError> for MemError {
    fn from(e: RegionError) -> Self {
        log::debug!("memory: region error converted to a plugin error: {e}");
        match e {
            RegionError::Unmapped { addr } => MemError::SegFault {
                addr,
                access: AccessKind::Read,
                min: addr,
                max: addr,
            },
            RegionError::PermissionDenied {
                addr, requested, ..
            } => MemError::SegFault {
                addr,
                access: if requested.contains(regions::Perms::WRITE) {
                    AccessKind::Write
                } else if requested.contains(regions::Perms::EXEC) {
                    AccessKind::Exec
                } else {
                    AccessKind::Read
                },
                min: addr,
                max: addr,
            },
            RegionError::NotMapped { .. } => {
                MemError::Internal("unmap of a range that was never mapped")
            }
            RegionError::Overlap { .. } => {
                MemError::Internal("map of a range overlapping an existing mapping")
            }
        }
    }
}

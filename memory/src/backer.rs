//! The two external content providers `SymbolicMemory::set_state`
//! consumes once, at initialization, per spec: a binary's initial
//! concrete segments and the initial permission layout of its address
//! space. Neither is stored on `SymbolicMemory` itself; both are
//! consumed eagerly and discarded, the same "explicit parameter, not a
//! stashed handle" treatment this crate already gives the solver (see
//! `DESIGN.md`).

use regions::Perms;

/// One contiguous span of initial concrete content, e.g. a loaded ELF
/// segment. `bytes[0]` lands at `base`.
pub struct Segment {
    pub base: u64,
    pub bytes: Vec<u8>,
}

/// Enumerates a binary's initial concrete content.
pub trait MemoryBacker {
    fn segments(&self) -> Vec<Segment>;
}

/// One contiguous span of initial mapped permissions.
pub struct PermsRange {
    pub base: u64,
    pub length: u64,
    pub perms: Perms,
}

/// Enumerates the initial permission layout of an address space.
pub trait PermsBacker {
    fn ranges(&self) -> Vec<PermsRange>;
}

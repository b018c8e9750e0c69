//! The top-level symbolic memory plugin: the composite that owns both
//! stores and the regions table, and the load/store/merge algorithm that
//! ties them together.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use arch::{Arch, Endness};
use bytestore::ByteStore;
use expr::{Expr, Solver};
use pitree::Pitree;
use regions::{Perms, RegionTable};

use crate::backer::{MemoryBacker, PermsBacker};
use crate::cell::{ByteCell, SymEntry};
use crate::config::MemoryConfig;
use crate::error::{AccessKind, MemError};

/// Which address space this instance models, mirroring the two kinds of
/// state a symbolic execution engine tracks per path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemId {
    Mem,
    Reg,
}

pub struct SymbolicMemory {
    pub id: MemId,
    arch: Rc<Arch>,
    endness: Endness,
    config: MemoryConfig,
    bytes: ByteStore<ByteCell>,
    symbolic: Pitree<SymEntry>,
    regions: RegionTable,
    stack_range: Option<(u64, u64)>,
    next_seq: u64,
    initialized: bool,
}

impl Clone for SymbolicMemory {
    fn clone(&self) -> Self {
        SymbolicMemory {
            id: self.id,
            arch: self.arch.clone(),
            endness: self.endness,
            config: self.config.clone(),
            bytes: self.bytes.clone(),
            symbolic: self.symbolic.clone(),
            regions: self.regions.clone(),
            stack_range: self.stack_range,
            next_seq: self.next_seq,
            initialized: self.initialized,
        }
    }
}

impl SymbolicMemory {
    pub fn new(id: MemId, arch: Rc<Arch>, config: MemoryConfig) -> Self {
        let endness = arch.default_endness;
        SymbolicMemory {
            id,
            bytes: ByteStore::new(config.page_size),
            symbolic: Pitree::new(config.pitree_page_size),
            regions: RegionTable::new(),
            stack_range: None,
            next_seq: 0,
            initialized: false,
            arch,
            endness,
            config,
        }
    }

    /// A sibling plugin sharing both stores lazily, for the engine to
    /// hand to a forked path. Named to match the engine-facing interface
    /// rather than relying on callers to know this is just `Clone`.
    pub fn copy(&self) -> Self {
        self.clone()
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    pub fn set_endness(&mut self, endness: Endness) {
        self.endness = endness;
    }

    /// One-time initialization from the engine's backers: every backer
    /// segment becomes a byte-store entry sharing that segment's source
    /// expression (one expression per segment, so its bytes coalesce in
    /// a load's run-compressed chain), and every backer permission range
    /// is mapped into the regions table. A no-op on any call after the
    /// first.
    pub fn set_state(
        &mut self,
        memory_backer: Option<&dyn MemoryBacker>,
        perms_backer: Option<&dyn PermsBacker>,
    ) -> Result<(), MemError> {
        if self.initialized {
            return Ok(());
        }

        if let Some(backer) = perms_backer {
            for range in backer.ranges() {
                self.regions.map(range.base, range.length, range.perms)?;
            }
        }

        if let Some(backer) = memory_backer {
            for segment in backer.segments() {
                let seq = self.take_seq();
                let source = Expr::bytes(segment.bytes.clone());
                for (offset, _) in segment.bytes.iter().enumerate() {
                    self.bytes.set(
                        segment.base + offset as u64,
                        ByteCell::new(source.clone(), offset as u32, seq),
                    );
                }
            }
        }

        self.initialized = true;
        log::debug!("memory: initialized from backers");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn set_stack_range(&mut self, lo: u64, hi: u64) {
        self.stack_range = Some((lo, hi));
    }

    pub fn stack_range(&self) -> Option<(u64, u64)> {
        self.stack_range
    }

    pub fn map_region(&mut self, base: u64, length: u64, perms: Perms) -> Result<(), MemError> {
        self.regions.map(base, length, perms).map_err(Into::into)
    }

    pub fn unmap_region(&mut self, base: u64, length: u64) -> Result<(), MemError> {
        self.regions.unmap(base, length).map_err(Into::into)
    }

    pub fn permissions(&self, addr: u64) -> Option<Perms> {
        self.regions.permissions(addr)
    }

    /// Explicit candidate enumeration for callers that want it, e.g. to
    /// resolve a symbolic size before a sequence of concrete stores. Not
    /// used internally by `load`/`store`, which bracket by `min`/`max`
    /// instead of enumerating (see `DESIGN.md`).
    pub fn concretize(&self, expr: &Rc<Expr>, solver: &dyn Solver, constraints: &[Rc<Expr>]) -> Vec<u64> {
        let candidates = solver.eval_upto(expr, constraints, self.config.address_concretization_cap);
        if candidates.len() >= self.config.address_concretization_cap {
            log::warn!(
                "memory: concretization hit the cap ({}), result may be an over-approximation",
                self.config.address_concretization_cap
            );
        }
        candidates
    }

    fn take_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    fn value_byte_index(&self, j: u64, size: u64) -> u64 {
        match self.endness {
            Endness::Little => j,
            Endness::Big => size - 1 - j,
        }
    }

    /// `maximum_symbolic_size` caps a symbolic *size*; `maximum_concrete_size`
    /// caps a concrete one. Whether the *address* happens to be symbolic
    /// doesn't enter into it: a concrete-sized access through a symbolic
    /// address is still a concrete-sized access.
    fn check_size(&self, size: u64, size_is_symbolic: bool) -> Result<(), MemError> {
        let cap = if size_is_symbolic {
            self.config.maximum_symbolic_size
        } else {
            self.config.maximum_concrete_size
        };
        if size > cap {
            return Err(MemError::MemoryLimitExceeded { size });
        }
        Ok(())
    }

    fn check_access(&self, addr: u64, size: u64, access: AccessKind) -> Result<(), MemError> {
        if !self.config.strict_page_access {
            return Ok(());
        }
        let perms = match access {
            AccessKind::Read => Perms::READ,
            AccessKind::Write => Perms::WRITE,
            AccessKind::Exec => Perms::EXEC,
        };
        self.regions
            .check_access(addr, size, perms)
            .map_err(Into::into)
    }

    fn effective_addr_expr(&self, addr_expr: &Rc<Expr>, k: u64) -> Rc<Expr> {
        if k == 0 {
            addr_expr.clone()
        } else {
            Expr::add(addr_expr.clone(), Expr::const_(self.arch.word_bits(), k))
        }
    }

    /// Every candidate value for the byte at `[lo, hi]`, sorted oldest to
    /// newest write: a paged-store hit at a concrete address `a` is
    /// guarded by `addr_k == a`; a symbolic-store entry is included only
    /// if the solver can't prove its address disjoint from `addr_k`
    /// (step 3 of the load algorithm). Folding these from newest to
    /// oldest, with the oldest innermost, makes the most recent write
    /// shadow earlier ones whether it was concrete or symbolic.
    fn candidates_at(
        &self,
        addr_k_expr: &Rc<Expr>,
        lo: u64,
        hi: u64,
        solver: &dyn Solver,
        constraints: &[Rc<Expr>],
    ) -> Vec<(u64, Rc<Expr>, Rc<Expr>)> {
        let word_bits = self.arch.word_bits();
        let mut candidates = Vec::new();

        for (a, cell) in self.bytes.iter() {
            if a < lo || a > hi {
                continue;
            }
            let cond = Expr::eq(addr_k_expr.clone(), Expr::const_(word_bits, a));
            candidates.push((cell.seq(), cond, cell.expr()));
        }

        for hit in self.symbolic.search(lo, hi + 1) {
            let entry = hit.payload;
            let eq = Expr::eq(addr_k_expr.clone(), entry.addr_expr.clone());
            let mut probe = constraints.to_vec();
            probe.push(eq.clone());
            if solver.satisfiable(&probe) {
                candidates.push((entry.seq(), eq, entry.byte.expr()));
            }
        }

        candidates.sort_by_key(|(seq, _, _)| *seq);
        candidates
    }

    fn fold_candidates(candidates: Vec<(u64, Rc<Expr>, Rc<Expr>)>, base: Rc<Expr>) -> Rc<Expr> {
        let mut chain = base;
        for (_, cond, value) in candidates {
            chain = Expr::ite(cond, value, chain);
        }
        chain
    }

    /// One byte of a load at `min + k`..`max + k`. Mints a fresh
    /// unconstrained "bottom" byte and materializes it into whichever
    /// store applies only when nothing at all covers the location, so a
    /// later load of the same untouched address finds it and returns the
    /// same (solver-equal) expression (the "bottom stability" property).
    /// When something was found the chain's own innermost fallback is
    /// unreachable dead code and a plain zero serves just as well.
    fn load_byte(
        &mut self,
        addr_expr: &Rc<Expr>,
        min: u64,
        max: u64,
        k: u64,
        solver: &dyn Solver,
        constraints: &[Rc<Expr>],
    ) -> Rc<Expr> {
        let lo = min + k;
        let hi = max + k;
        let addr_k_expr = self.effective_addr_expr(addr_expr, k);
        let candidates = self.candidates_at(&addr_k_expr, lo, hi, solver, constraints);

        if candidates.is_empty() {
            let seq = self.take_seq();
            let cell = ByteCell::new(Expr::symbol(format!("bottom@{lo:#x}"), 8), 0, seq);
            let value = cell.expr();
            if lo == hi {
                self.bytes.set(lo, cell);
            } else {
                self.symbolic.add(
                    lo,
                    hi + 1,
                    SymEntry {
                        addr_expr: addr_k_expr,
                        byte: cell,
                    },
                );
            }
            log::trace!("memory: bottom byte minted at {lo:#x}");
            return value;
        }

        Self::fold_candidates(candidates, Expr::const_(8, 0))
    }

    /// Read `size` bytes starting at `addr_expr`. Brackets the address by
    /// `min`/`max` rather than enumerating candidates (enumeration is a
    /// fallback callers reach for explicitly via `concretize`, not part
    /// of this path).
    pub fn load(
        &mut self,
        addr_expr: &Rc<Expr>,
        size: u64,
        size_is_symbolic: bool,
        solver: &dyn Solver,
        constraints: &[Rc<Expr>],
    ) -> Result<Rc<Expr>, MemError> {
        self.check_size(size, size_is_symbolic)?;

        let concrete_addr = solver.as_concrete(addr_expr, constraints);
        let (min, max) = match concrete_addr {
            Some(a) => (a, a),
            None => {
                if !solver.satisfiable(constraints) {
                    return Err(MemError::Unsatisfiable("symbolic load address has no feasible concretization"));
                }
                (solver.min(addr_expr, constraints), solver.max(addr_expr, constraints))
            }
        };
        self.check_access(min, max - min + size, AccessKind::Read)?;

        let mut bytes: Vec<Rc<Expr>> = Vec::with_capacity(size as usize);
        for k in 0..size {
            bytes.push(self.load_byte(addr_expr, min, max, k, solver, constraints));
        }
        if self.endness == Endness::Little {
            bytes.reverse();
        }
        let value = if bytes.len() == 1 {
            bytes.into_iter().next().unwrap()
        } else {
            Expr::concat(bytes)
        };

        log::trace!("memory: load of {size} byte(s) over [{min:#x}, {max:#x}]");
        Ok(value)
    }

    /// Write `size` bytes of `value_expr` to `addr_expr`. A concrete
    /// address overwrites the paged byte store directly; a symbolic one
    /// inserts one entry per byte into the symbolic-address store, keyed
    /// to that byte's own address expression rather than a concretized
    /// candidate integer.
    pub fn store(
        &mut self,
        addr_expr: &Rc<Expr>,
        size: u64,
        size_is_symbolic: bool,
        value_expr: &Rc<Expr>,
        solver: &dyn Solver,
        constraints: &[Rc<Expr>],
    ) -> Result<(), MemError> {
        self.check_size(size, size_is_symbolic)?;

        let concrete_addr = solver.as_concrete(addr_expr, constraints);
        let (min, max) = match concrete_addr {
            Some(a) => (a, a),
            None => {
                if !solver.satisfiable(constraints) {
                    return Err(MemError::Unsatisfiable("symbolic store address has no feasible concretization"));
                }
                (solver.min(addr_expr, constraints), solver.max(addr_expr, constraints))
            }
        };
        self.check_access(min, max - min + size, AccessKind::Write)?;

        let seq = self.take_seq();
        for k in 0..size {
            let byte_index = self.value_byte_index(k, size);
            let cell = ByteCell::new(value_expr.clone(), byte_index as u32, seq);
            match concrete_addr {
                Some(addr) => self.bytes.set(addr + k, cell),
                None => {
                    let addr_k_expr = self.effective_addr_expr(addr_expr, k);
                    self.symbolic.add(
                        min + k,
                        max + k + 1,
                        SymEntry {
                            addr_expr: addr_k_expr,
                            byte: cell,
                        },
                    );
                }
            }
        }

        log::debug!("memory: store of {size} byte(s) over [{min:#x}, {max:#x}]");
        Ok(())
    }

    fn all_same_cell(cells: &[Option<&ByteCell>]) -> bool {
        let first = cells.first().copied().flatten();
        cells.iter().all(|c| match (first, c) {
            (Some(a), Some(b)) => a.same_provenance(b),
            (None, None) => true,
            _ => false,
        })
    }

    /// `ite(conditions[0], cells[0], ite(conditions[1], cells[1], ...
    /// bottom))`, with a participant lacking a cell at this location
    /// contributing a placeholder in its own branch.
    fn ite_over_conditions(conditions: &[Rc<Expr>], cells: &[Option<ByteCell>], addr: u64, seq: u64) -> Rc<Expr> {
        let placeholder = || Expr::symbol(format!("merge-bottom@{addr:#x}@{seq}"), 8);
        let mut merged = placeholder();
        for (cond, cell) in conditions.iter().zip(cells.iter()).rev() {
            let value = cell.as_ref().map(ByteCell::expr).unwrap_or_else(placeholder);
            merged = Expr::ite(cond.clone(), value, merged);
        }
        merged
    }

    /// Merge `others` into `self`, each input (including `self`) gated by
    /// its matching entry in `conditions`. `conditions.len()` must equal
    /// `1 + others.len()`: one condition for `self`, one per sibling, the
    /// final implicit case being an unreachable bottom. A byte that
    /// already agrees across every input (identical provenance) is left
    /// untouched; only bytes that actually differ are rewritten into an
    /// if-then-else chain. Returns `true` iff any byte was rewritten.
    pub fn merge(&mut self, conditions: &[Rc<Expr>], others: &[&SymbolicMemory]) -> Result<bool, MemError> {
        if conditions.len() != 1 + others.len() {
            return Err(MemError::Internal("merge: one condition is required per input, including self"));
        }

        let mut changed = false;

        let mut touched: HashSet<u64> = self.bytes.iter().map(|(a, _)| a).collect();
        for other in others {
            touched.extend(other.bytes.iter().map(|(a, _)| a));
        }
        for addr in touched {
            let cells: Vec<Option<ByteCell>> = std::iter::once(self.bytes.get(addr).cloned())
                .chain(others.iter().map(|o| o.bytes.get(addr).cloned()))
                .collect();
            let refs: Vec<Option<&ByteCell>> = cells.iter().map(Option::as_ref).collect();
            if Self::all_same_cell(&refs) {
                continue;
            }
            let seq = self.take_seq();
            let merged = Self::ite_over_conditions(conditions, &cells, addr, seq);
            self.bytes.set(addr, ByteCell::new(merged, 0, seq));
            changed = true;
        }

        // Symbolic-address store: group entries by address-expression
        // identity rather than by resolved address, since two inputs can
        // only agree "as-is" if they wrote under the very same address
        // expression.
        let mut groups: HashMap<Expr, (u64, u64, Vec<Option<ByteCell>>)> = HashMap::new();
        for (lo, hi, entry) in self.symbolic.entries() {
            let slot = groups
                .entry((*entry.addr_expr).clone())
                .or_insert_with(|| (lo, hi, vec![None; 1 + others.len()]));
            slot.0 = slot.0.min(lo);
            slot.1 = slot.1.max(hi);
            slot.2[0] = Some(entry.byte);
        }
        for (idx, other) in others.iter().enumerate() {
            for (lo, hi, entry) in other.symbolic.entries() {
                let slot = groups
                    .entry((*entry.addr_expr).clone())
                    .or_insert_with(|| (lo, hi, vec![None; 1 + others.len()]));
                slot.0 = slot.0.min(lo);
                slot.1 = slot.1.max(hi);
                slot.2[idx + 1] = Some(entry.byte);
            }
        }
        for (addr_expr, (lo, hi, cells)) in groups {
            let refs: Vec<Option<&ByteCell>> = cells.iter().map(Option::as_ref).collect();
            if Self::all_same_cell(&refs) {
                continue;
            }
            let seq = self.take_seq();
            let merged = Self::ite_over_conditions(conditions, &cells, lo, seq);
            self.symbolic.add(
                lo,
                hi,
                SymEntry {
                    addr_expr: Rc::new(addr_expr),
                    byte: ByteCell::new(merged, 0, seq),
                },
            );
            changed = true;
        }

        log::debug!("memory: merged {} sibling state(s), changed = {changed}", others.len());
        Ok(changed)
    }
}

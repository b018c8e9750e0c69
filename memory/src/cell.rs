//! The two cell types the paged byte store and the symbolic-address
//! store hold, plus the monotonic sequence number that lets a load tell
//! which of several overlapping writes, concrete or symbolic, happened
//! most recently.

use std::cell::RefCell;
use std::rc::Rc;

use expr::Expr;

/// A single byte of a larger stored expression, identified by where it
/// came from rather than computed eagerly. Two cells with the same
/// source pointer and offset are the same byte without consulting the
/// solver, which is what lets adjacent identical bytes coalesce when a
/// load stitches a multi-byte expression back together.
#[derive(Clone)]
pub struct ByteCell {
    source: Rc<Expr>,
    byte_offset: u32,
    seq: u64,
    cached: RefCell<Option<Rc<Expr>>>,
}

impl ByteCell {
    pub fn new(source: Rc<Expr>, byte_offset: u32, seq: u64) -> Self {
        ByteCell {
            source,
            byte_offset,
            seq,
            cached: RefCell::new(None),
        }
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// The 8-bit expression this cell denotes, extracted from its source
    /// on first access and cached thereafter.
    pub fn expr(&self) -> Rc<Expr> {
        if let Some(e) = self.cached.borrow().as_ref() {
            return e.clone();
        }
        let lo = self.byte_offset * 8;
        let e = Expr::extract(self.source.clone(), lo + 7, lo);
        *self.cached.borrow_mut() = Some(e.clone());
        e
    }

    pub fn same_provenance(&self, other: &ByteCell) -> bool {
        Rc::ptr_eq(&self.source, &other.source) && self.byte_offset == other.byte_offset
    }
}

/// One byte of a symbolic-address write, recorded against the per-byte
/// address expression it was written under rather than a concretized
/// candidate integer, so a later load can test "is this the same
/// address" against the solver instead of enumerating candidates.
#[derive(Clone)]
pub struct SymEntry {
    pub addr_expr: Rc<Expr>,
    pub byte: ByteCell,
}

impl SymEntry {
    pub fn seq(&self) -> u64 {
        self.byte.seq()
    }
}

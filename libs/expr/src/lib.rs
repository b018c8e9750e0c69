//! A minimal bitvector expression AST and the solver seam the memory
//! plugin consumes it through.
//!
//! A real embedding backs [`Solver`] with an SMT solver and builds
//! [`Expr`] trees with whatever expression builder its lifter already
//! has; this crate only carries enough structure (constants, symbols,
//! extraction, concatenation, if-then-else, a raw concrete byte blob,
//! and the handful of boolean connectives the load/store algorithm
//! needs for its disjunction constraints) to exercise that seam from
//! this workspace's own tests. See [`mock`] for the bounded
//! brute-force solver used there.

pub mod mock;

use std::collections::HashSet;
use std::rc::Rc;

pub type SymName = Rc<str>;

/// A node in a bitvector expression tree. Every node has a fixed width in
/// bits, computed structurally by [`Expr::width`]; boolean connectives
/// are modeled as 1-bit values, matching how a byte-granular if-then-else
/// chain naturally nests `Eq`/`If` without a separate boolean sort.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Expr {
    Const(u32, u64),
    Symbol(SymName, u32),
    Extract {
        hi: u32,
        lo: u32,
        inner: Rc<Expr>,
    },
    /// Concatenation, most-significant part first.
    Concat(Vec<Rc<Expr>>),
    If(Rc<Expr>, Rc<Expr>, Rc<Expr>),
    Eq(Rc<Expr>, Rc<Expr>),
    Ne(Rc<Expr>, Rc<Expr>),
    Add(Rc<Expr>, Rc<Expr>),
    And(Vec<Rc<Expr>>),
    Or(Vec<Rc<Expr>>),
    Not(Rc<Expr>),
    /// A raw concrete byte blob, one expression per source segment so its
    /// bytes share provenance (see `ByteCell::same_provenance`). Only
    /// byte-aligned `Extract`s of this are meaningful; use
    /// [`Expr::extract`] to pull a single byte back out.
    Bytes(Rc<[u8]>),
}

pub fn mask(width: u32) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

impl Expr {
    pub fn const_(width: u32, value: u64) -> Rc<Expr> {
        Rc::new(Expr::Const(width, value & mask(width)))
    }

    pub fn symbol(name: impl Into<SymName>, width: u32) -> Rc<Expr> {
        Rc::new(Expr::Symbol(name.into(), width))
    }

    pub fn extract(inner: Rc<Expr>, hi: u32, lo: u32) -> Rc<Expr> {
        Rc::new(Expr::Extract { hi, lo, inner })
    }

    pub fn concat(parts: Vec<Rc<Expr>>) -> Rc<Expr> {
        Rc::new(Expr::Concat(parts))
    }

    pub fn ite(cond: Rc<Expr>, then_: Rc<Expr>, else_: Rc<Expr>) -> Rc<Expr> {
        Rc::new(Expr::If(cond, then_, else_))
    }

    pub fn eq(a: Rc<Expr>, b: Rc<Expr>) -> Rc<Expr> {
        Rc::new(Expr::Eq(a, b))
    }

    pub fn ne(a: Rc<Expr>, b: Rc<Expr>) -> Rc<Expr> {
        Rc::new(Expr::Ne(a, b))
    }

    pub fn add(a: Rc<Expr>, b: Rc<Expr>) -> Rc<Expr> {
        Rc::new(Expr::Add(a, b))
    }

    pub fn and(parts: Vec<Rc<Expr>>) -> Rc<Expr> {
        Rc::new(Expr::And(parts))
    }

    pub fn or(parts: Vec<Rc<Expr>>) -> Rc<Expr> {
        Rc::new(Expr::Or(parts))
    }

    pub fn not(a: Rc<Expr>) -> Rc<Expr> {
        Rc::new(Expr::Not(a))
    }

    pub fn bytes(data: impl Into<Rc<[u8]>>) -> Rc<Expr> {
        Rc::new(Expr::Bytes(data.into()))
    }

    pub fn width(&self) -> u32 {
        match self {
            Expr::Const(w, _) | Expr::Symbol(_, w) => *w,
            Expr::Extract { hi, lo, .. } => hi - lo + 1,
            Expr::Concat(parts) => parts.iter().map(|p| p.width()).sum(),
            Expr::If(_, t, _) => t.width(),
            Expr::Add(a, _) => a.width(),
            Expr::Eq(..) | Expr::Ne(..) | Expr::And(..) | Expr::Or(..) | Expr::Not(..) => 1,
            Expr::Bytes(data) => data.len() as u32 * 8,
        }
    }

    /// The constant this expression already is, without consulting a
    /// solver; used to shortcut the common concrete-byte case.
    pub fn as_const(&self) -> Option<u64> {
        match self {
            Expr::Const(_, v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_const(&self) -> bool {
        self.as_const().is_some()
    }

    pub fn free_symbols(&self, out: &mut HashSet<(SymName, u32)>) {
        match self {
            Expr::Const(..) => {}
            Expr::Symbol(name, w) => {
                out.insert((name.clone(), *w));
            }
            Expr::Extract { inner, .. } => inner.free_symbols(out),
            Expr::Concat(parts) => parts.iter().for_each(|p| p.free_symbols(out)),
            Expr::If(c, t, e) => {
                c.free_symbols(out);
                t.free_symbols(out);
                e.free_symbols(out);
            }
            Expr::Eq(a, b) | Expr::Ne(a, b) | Expr::Add(a, b) => {
                a.free_symbols(out);
                b.free_symbols(out);
            }
            Expr::And(parts) | Expr::Or(parts) => parts.iter().for_each(|p| p.free_symbols(out)),
            Expr::Not(a) => a.free_symbols(out),
            Expr::Bytes(_) => {}
        }
    }
}

/// Evaluate `expr` under a total assignment of its free symbols. Missing
/// symbols default to zero, which only matters for expressions a caller
/// builds without going through [`Expr::free_symbols`] first.
pub fn eval(expr: &Expr, assignment: &std::collections::HashMap<SymName, u64>) -> u64 {
    match expr {
        Expr::Const(w, v) => v & mask(*w),
        Expr::Symbol(name, w) => assignment.get(name).copied().unwrap_or(0) & mask(*w),
        Expr::Extract { hi, lo, inner } => {
            if let Expr::Bytes(data) = inner.as_ref() {
                // Byte-aligned extraction reads straight out of the blob
                // instead of going through `eval(inner, ..)`, which could
                // not represent a blob wider than 64 bits as a scalar.
                let width = hi - lo + 1;
                let start = (lo / 8) as usize;
                let nbytes = ((width + 7) / 8) as usize;
                let mut v: u64 = 0;
                for i in 0..nbytes {
                    let b = *data.get(start + i).unwrap_or(&0) as u64;
                    v |= b << (8 * i);
                }
                v & mask(width)
            } else {
                (eval(inner, assignment) >> lo) & mask(hi - lo + 1)
            }
        }
        Expr::Concat(parts) => parts.iter().fold(0u64, |acc, p| {
            let w = p.width();
            (acc << w) | (eval(p, assignment) & mask(w))
        }),
        Expr::If(c, t, e) => {
            if eval(c, assignment) != 0 {
                eval(t, assignment)
            } else {
                eval(e, assignment)
            }
        }
        Expr::Eq(a, b) => (eval(a, assignment) == eval(b, assignment)) as u64,
        Expr::Ne(a, b) => (eval(a, assignment) != eval(b, assignment)) as u64,
        Expr::Add(a, b) => eval(a, assignment).wrapping_add(eval(b, assignment)) & mask(a.width()),
        Expr::And(parts) => parts.iter().all(|p| eval(p, assignment) != 0) as u64,
        Expr::Or(parts) => parts.iter().any(|p| eval(p, assignment) != 0) as u64,
        Expr::Not(a) => (eval(a, assignment) == 0) as u64,
        // Only the first 8 bytes are representable as a bare scalar;
        // extracting a specific byte via `Expr::extract` is the
        // supported path for wider blobs (see the `Extract` arm above).
        Expr::Bytes(data) => data.iter().take(8).enumerate().fold(0u64, |acc, (i, b)| acc | ((*b as u64) << (8 * i))),
    }
}

/// The constraint-solving collaborator the memory plugin is written
/// against. A production embedding backs this with a real SMT solver.
pub trait Solver {
    fn min(&self, expr: &Expr, constraints: &[Rc<Expr>]) -> u64;
    fn max(&self, expr: &Expr, constraints: &[Rc<Expr>]) -> u64;
    /// `Some(v)` if `expr` can only take the value `v` under `constraints`.
    fn as_concrete(&self, expr: &Expr, constraints: &[Rc<Expr>]) -> Option<u64>;
    fn satisfiable(&self, constraints: &[Rc<Expr>]) -> bool;
    /// Up to `n` distinct values `expr` can take under `constraints`.
    fn eval_upto(&self, expr: &Expr, constraints: &[Rc<Expr>], n: usize) -> Vec<u64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concat_is_most_significant_part_first() {
        let hi = Expr::const_(8, 0xAB);
        let lo = Expr::const_(8, 0xCD);
        let c = Expr::concat(vec![hi, lo]);
        assert_eq!(c.width(), 16);
        assert_eq!(eval(&c, &Default::default()), 0xABCD);
    }

    #[test]
    fn extract_pulls_out_the_requested_bits() {
        let v = Expr::const_(16, 0xABCD);
        let byte = Expr::extract(v, 7, 0);
        assert_eq!(eval(&byte, &Default::default()), 0xCD);
    }

    #[test]
    fn ite_picks_branch_by_condition() {
        let cond = Expr::eq(Expr::const_(8, 1), Expr::const_(8, 1));
        let ite = Expr::ite(cond, Expr::const_(8, 0x11), Expr::const_(8, 0x22));
        assert_eq!(eval(&ite, &Default::default()), 0x11);
    }
}

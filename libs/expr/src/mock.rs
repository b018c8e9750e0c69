//! A bounded brute-force [`Solver`], used only by this workspace's own
//! tests where a real SMT solver is out of scope. It enumerates every
//! assignment of the free symbols involved, up to a combinatorial
//! budget, and is exact for the small domains this crate's test
//! scenarios use; beyond the budget it falls back to the symbol's own
//! width as an interval bound rather than claiming precision it can't
//! back up.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::{eval, mask, Expr, Solver, SymName};

/// `1 << 20` assignments, matching the ballpark of what the original
/// implementation's `any_n_int` concretization cap tolerated.
const DEFAULT_COMBINATION_CAP: u64 = 1 << 20;

pub struct MockSolver {
    combination_cap: u64,
}

impl Default for MockSolver {
    fn default() -> Self {
        MockSolver {
            combination_cap: DEFAULT_COMBINATION_CAP,
        }
    }
}

impl MockSolver {
    pub fn with_cap(combination_cap: u64) -> Self {
        MockSolver { combination_cap }
    }

    fn symbols_of<'a>(exprs: impl IntoIterator<Item = &'a Expr>) -> Vec<(SymName, u32)> {
        let mut set = HashSet::new();
        for e in exprs {
            e.free_symbols(&mut set);
        }
        set.into_iter().collect()
    }

    fn union_symbols(expr: &Expr, constraints: &[Rc<Expr>]) -> Vec<(SymName, u32)> {
        Self::symbols_of(std::iter::once(expr).chain(constraints.iter().map(Rc::as_ref)))
    }

    fn domain_size(width: u32) -> u64 {
        if width >= 64 {
            u64::MAX
        } else {
            1u64 << width
        }
    }

    /// Visits every assignment of `symbols`, calling `f` with each one
    /// that satisfies whatever `f` checks internally; `f` returns `false`
    /// to stop early. Returns `true` if the budget ran out before the
    /// whole space (or an early stop) was reached.
    fn for_each_assignment(
        &self,
        symbols: &[(SymName, u32)],
        f: &mut impl FnMut(&HashMap<SymName, u64>) -> bool,
    ) -> bool {
        let mut assignment = HashMap::new();
        let mut remaining = self.combination_cap.max(1);
        let mut capped = false;
        Self::rec(symbols, 0, &mut assignment, f, &mut remaining, &mut capped);
        capped
    }

    fn rec(
        symbols: &[(SymName, u32)],
        idx: usize,
        assignment: &mut HashMap<SymName, u64>,
        f: &mut impl FnMut(&HashMap<SymName, u64>) -> bool,
        remaining: &mut u64,
        capped: &mut bool,
    ) -> bool {
        if idx == symbols.len() {
            if *remaining == 0 {
                *capped = true;
                return false;
            }
            *remaining -= 1;
            return f(assignment);
        }
        let (name, width) = &symbols[idx];
        for v in 0..Self::domain_size(*width) {
            assignment.insert(name.clone(), v);
            let keep_going = Self::rec(symbols, idx + 1, assignment, f, remaining, capped);
            if !keep_going {
                assignment.remove(name);
                return false;
            }
        }
        assignment.remove(name);
        true
    }

    fn satisfies(constraints: &[Rc<Expr>], assignment: &HashMap<SymName, u64>) -> bool {
        constraints.iter().all(|c| eval(c, assignment) != 0)
    }
}

impl Solver for MockSolver {
    fn min(&self, expr: &Expr, constraints: &[Rc<Expr>]) -> u64 {
        let symbols = Self::union_symbols(expr, constraints);
        let mut best: Option<u64> = None;
        let capped = self.for_each_assignment(&symbols, &mut |assignment| {
            if Self::satisfies(constraints, assignment) {
                let v = eval(expr, assignment);
                best = Some(best.map_or(v, |b| b.min(v)));
            }
            true
        });
        match best {
            Some(v) => v,
            None if capped => {
                log::warn!("mock solver: combination budget exhausted without a witness, falling back to width bound");
                0
            }
            None => 0,
        }
    }

    fn max(&self, expr: &Expr, constraints: &[Rc<Expr>]) -> u64 {
        let symbols = Self::union_symbols(expr, constraints);
        let mut best: Option<u64> = None;
        let capped = self.for_each_assignment(&symbols, &mut |assignment| {
            if Self::satisfies(constraints, assignment) {
                let v = eval(expr, assignment);
                best = Some(best.map_or(v, |b| b.max(v)));
            }
            true
        });
        match best {
            Some(v) => v,
            None if capped => {
                log::warn!("mock solver: combination budget exhausted without a witness, falling back to width bound");
                mask(expr.width())
            }
            None => mask(expr.width()),
        }
    }

    fn as_concrete(&self, expr: &Expr, constraints: &[Rc<Expr>]) -> Option<u64> {
        if let Some(v) = expr.as_const() {
            return Some(v);
        }
        let lo = self.min(expr, constraints);
        let hi = self.max(expr, constraints);
        (lo == hi).then_some(lo)
    }

    fn satisfiable(&self, constraints: &[Rc<Expr>]) -> bool {
        let symbols = Self::symbols_of(constraints.iter().map(Rc::as_ref));
        let mut found = false;
        self.for_each_assignment(&symbols, &mut |assignment| {
            if Self::satisfies(constraints, assignment) {
                found = true;
                false
            } else {
                true
            }
        });
        found
    }

    fn eval_upto(&self, expr: &Expr, constraints: &[Rc<Expr>], n: usize) -> Vec<u64> {
        let symbols = Self::union_symbols(expr, constraints);
        let mut values: Vec<u64> = Vec::new();
        self.for_each_assignment(&symbols, &mut |assignment| {
            if Self::satisfies(constraints, assignment) {
                let v = eval(expr, assignment);
                if !values.contains(&v) {
                    values.push(v);
                }
            }
            values.len() < n
        });
        values
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Expr;

    #[test]
    fn min_max_of_a_bounded_symbol() {
        let s = MockSolver::default();
        let x = Expr::symbol("x", 8);
        assert_eq!(s.min(&x, &[]), 0);
        assert_eq!(s.max(&x, &[]), 255);
    }

    #[test]
    fn min_max_under_a_constraint() {
        let s = MockSolver::default();
        let x = Expr::symbol("x", 8);
        let le_two = Expr::not(Expr::eq(
            Expr::ite(
                Expr::eq(x.clone(), Expr::const_(8, 0)),
                Expr::const_(1, 1),
                Expr::ite(
                    Expr::eq(x.clone(), Expr::const_(8, 1)),
                    Expr::const_(1, 1),
                    Expr::ite(Expr::eq(x.clone(), Expr::const_(8, 2)), Expr::const_(1, 1), Expr::const_(1, 0)),
                ),
            ),
            Expr::const_(1, 0),
        ));
        assert_eq!(s.min(&x, std::slice::from_ref(&le_two)), 0);
        assert_eq!(s.max(&x, std::slice::from_ref(&le_two)), 2);
        assert_eq!(s.eval_upto(&x, std::slice::from_ref(&le_two), 10), vec![0, 1, 2]);
    }

    #[test]
    fn unsatisfiable_constraints_report_false() {
        let s = MockSolver::default();
        let x = Expr::symbol("x", 1);
        let contradiction = Expr::and(vec![
            Expr::eq(x.clone(), Expr::const_(1, 0)),
            Expr::eq(x, Expr::const_(1, 1)),
        ]);
        assert!(!s.satisfiable(std::slice::from_ref(&contradiction)));
    }

    #[test]
    fn as_concrete_recognizes_a_pinned_symbol() {
        let s = MockSolver::default();
        let x = Expr::symbol("x", 4);
        let pinned = Expr::eq(x.clone(), Expr::const_(4, 7));
        assert_eq!(s.as_concrete(&x, std::slice::from_ref(&pinned)), Some(7));
    }
}

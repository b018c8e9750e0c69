//! End-to-end scenarios covering the cross-cutting behaviors of the
//! memory plugin: concrete round trips, partial overwrites, symbolic
//! addressing, uninitialized reads, merging under a guard, and the
//! permission-check segfault path. Each test drives [`SymbolicMemory`]
//! through [`MockSolver`], the bounded brute-force collaborator this
//! workspace supplies for its own tests.

use std::rc::Rc;

use arch::Arch;
use expr::mock::MockSolver;
use expr::{Expr, Solver};
use memory::{MemId, MemoryConfig, Perms, SymbolicMemory};

fn new_memory() -> SymbolicMemory {
    SymbolicMemory::new(MemId::Mem, Rc::new(Arch::amd64()), MemoryConfig::default())
}

#[test]
fn concrete_store_then_load_round_trips_little_endian() {
    let mut mem = new_memory();
    let solver = MockSolver::default();
    let addr = Expr::const_(64, 0x2000);
    let value = Expr::const_(32, 0xAABBCCDD);

    mem.store(&addr, 4, false, &value, &solver, &[]).unwrap();
    let loaded = mem.load(&addr, 4, false, &solver, &[]).unwrap();

    assert_eq!(solver.as_concrete(&loaded, &[]), Some(0xAABBCCDD));
}

#[test]
fn partial_overwrite_shadows_the_earlier_concrete_write() {
    let mut mem = new_memory();
    let solver = MockSolver::default();
    let addr = Expr::const_(64, 0x3000);

    mem.store(&addr, 4, false, &Expr::const_(32, 0xAABBCCDD), &solver, &[])
        .unwrap();

    // A size resolved from a symbolic width constrained to {1, 2, 3},
    // exactly 3 feasible sizes, matching how a caller would concretize a
    // symbolic size before driving three partial stores.
    let size_sym = Expr::symbol("n", 2);
    let in_domain = Expr::or(vec![
        Expr::eq(size_sym.clone(), Expr::const_(2, 0)),
        Expr::eq(size_sym.clone(), Expr::const_(2, 1)),
        Expr::eq(size_sym.clone(), Expr::const_(2, 2)),
    ]);
    let sizes = mem.concretize(&size_sym, &solver, std::slice::from_ref(&in_domain));
    assert_eq!(sizes.len(), 3);

    for raw in sizes {
        let n = raw + 1; // n in {1, 2, 3}
        mem.store(
            &addr,
            n,
            false,
            &Expr::const_(n as u32 * 8, 0xFFFFFFFFu64 >> (32 - n * 8)),
            &solver,
            &[],
        )
        .unwrap();
    }

    let loaded = mem.load(&addr, 4, false, &solver, &[]).unwrap();
    // The widest (n=3) partial write happened last, so it shadows the
    // narrower ones; only the original top byte (the MSB, stored at the
    // highest address under little-endian) survives untouched.
    assert_eq!(solver.as_concrete(&loaded, &[]), Some(0xAAFFFFFF));
}

#[test]
fn symbolic_address_store_is_readable_from_each_candidate() {
    let mut mem = new_memory();
    let solver = MockSolver::default();

    let a = Expr::symbol("a", 64);
    let at_ten = Expr::eq(a.clone(), Expr::const_(64, 0x10));
    let at_twenty = Expr::eq(a.clone(), Expr::const_(64, 0x20));
    let domain = Expr::or(vec![at_ten, at_twenty]);

    let value = Expr::const_(8, 0xAB);
    mem.store(&a, 1, false, &value, &solver, std::slice::from_ref(&domain))
        .unwrap();

    let at_candidate = Expr::const_(64, 0x10);
    let constraints = vec![domain, Expr::eq(a, Expr::const_(64, 0x10))];
    let loaded = mem.load(&at_candidate, 1, false, &solver, &constraints).unwrap();
    assert_eq!(solver.as_concrete(&loaded, &constraints), Some(0xAB));
}

#[test]
fn uninitialized_read_mints_a_stable_bottom_byte() {
    let mut mem = new_memory();
    let solver = MockSolver::default();
    let addr = Expr::const_(64, 0x9000);

    let first = mem.load(&addr, 1, false, &solver, &[]).unwrap();
    assert_eq!(solver.as_concrete(&first, &[]), None);

    let second = mem.load(&addr, 1, false, &solver, &[]).unwrap();
    assert_eq!(first, second);
}

#[test]
fn concrete_merge_picks_the_sibling_under_its_guard() {
    let mut base = new_memory();
    let solver = MockSolver::default();
    let addr = Expr::const_(64, 0x4000);
    base.store(&addr, 4, false, &Expr::const_(32, 0x01020304), &solver, &[])
        .unwrap();

    let mut left = base.copy();
    left.store(&Expr::const_(64, 0x4001), 1, false, &Expr::const_(8, 0x05), &solver, &[])
        .unwrap();

    let mut right = base.copy();
    right
        .store(&Expr::const_(64, 0x4001), 1, false, &Expr::const_(8, 0x06), &solver, &[])
        .unwrap();

    let guard = Expr::symbol("g", 1);
    let left_taken = Expr::eq(guard.clone(), Expr::const_(1, 1));
    let right_taken = Expr::eq(guard, Expr::const_(1, 0));

    let mut merged = left;
    let changed = merged
        .merge(&[left_taken.clone(), right_taken.clone()], &[&right])
        .unwrap();
    assert!(changed);

    let under_left = merged.load(&addr, 4, false, &solver, std::slice::from_ref(&left_taken)).unwrap();
    assert_eq!(solver.as_concrete(&under_left, std::slice::from_ref(&left_taken)), Some(0x01050304));

    let under_right = merged.load(&addr, 4, false, &solver, std::slice::from_ref(&right_taken)).unwrap();
    assert_eq!(solver.as_concrete(&under_right, std::slice::from_ref(&right_taken)), Some(0x01060304));
}

#[test]
fn symbolic_merge_keeps_both_siblings_distinct_writes_reachable() {
    let base = new_memory();
    let solver = MockSolver::default();

    let a = Expr::symbol("a", 64);
    let a_domain = Expr::or(vec![
        Expr::eq(a.clone(), Expr::const_(64, 0x100)),
        Expr::eq(a.clone(), Expr::const_(64, 0x104)),
    ]);

    let mut left = base.copy();
    left.store(&a, 1, false, &Expr::const_(8, 0x11), &solver, std::slice::from_ref(&a_domain))
        .unwrap();

    let b = Expr::symbol("b", 64);
    let b_domain = Expr::or(vec![
        Expr::eq(b.clone(), Expr::const_(64, 0x200)),
        Expr::eq(b.clone(), Expr::const_(64, 0x204)),
    ]);

    let mut right = base.copy();
    right
        .store(&b, 1, false, &Expr::const_(8, 0x22), &solver, std::slice::from_ref(&b_domain))
        .unwrap();

    let guard = Expr::symbol("took_right_branch", 1);
    let left_taken = Expr::eq(guard.clone(), Expr::const_(1, 0));
    let right_taken = Expr::eq(guard, Expr::const_(1, 1));

    let mut merged = left;
    let changed = merged
        .merge(&[left_taken.clone(), right_taken.clone()], &[&right])
        .unwrap();
    assert!(changed);

    let at_a = Expr::const_(64, 0x100);
    let under_left = vec![a_domain, left_taken, Expr::eq(a, Expr::const_(64, 0x100))];
    let left_value = merged.load(&at_a, 1, false, &solver, &under_left).unwrap();
    assert_eq!(solver.as_concrete(&left_value, &under_left), Some(0x11));

    let at_b = Expr::const_(64, 0x200);
    let under_right = vec![b_domain, right_taken, Expr::eq(b, Expr::const_(64, 0x200))];
    let right_value = merged.load(&at_b, 1, false, &solver, &under_right).unwrap();
    assert_eq!(solver.as_concrete(&right_value, &under_right), Some(0x22));
}

#[test]
fn strict_mode_segfaults_on_a_write_to_unmapped_memory() {
    let mut config = MemoryConfig::default();
    config.strict_page_access = true;
    let mut mem = SymbolicMemory::new(MemId::Mem, Rc::new(Arch::amd64()), config);
    let solver = MockSolver::default();

    mem.map_region(0x5000, 0x10, Perms::READ | Perms::WRITE).unwrap();

    let inside = Expr::const_(64, 0x5000);
    assert!(mem.store(&inside, 1, false, &Expr::const_(8, 1), &solver, &[]).is_ok());

    let outside = Expr::const_(64, 0x9000);
    let err = mem
        .store(&outside, 1, false, &Expr::const_(8, 1), &solver, &[])
        .unwrap_err();
    assert!(matches!(err, memory::MemError::SegFault { .. }));
}

//! Core benchmarks using Criterion.
//!
//! Run with: `cargo bench`
//!
//! These measure the two hot paths: partial-key lookups against the
//! eight-way index, and solver enumeration over chain-shaped fact sets.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use hashbrown::HashSet;
use triad::node::{Atom, Constraint, NodeId, Query, Triplet};
use triad::solver::Solver;
use triad::structure::Structure;

fn node(raw: u32) -> NodeId {
    NodeId::new(raw).unwrap()
}

/// A chain (i, i+1, REL) for i in 1..length, with REL = length + 1.
fn chain(length: u32) -> (Structure, NodeId) {
    let rel = node(length + 1);
    let mut structure = Structure::new();
    for i in 1..length {
        structure.add_fact(Triplet::new(node(i), node(i + 1), rel));
    }
    (structure, rel)
}

fn bench_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("lookup");
    for &length in &[100u32, 1000] {
        let (structure, rel) = chain(length);
        let mid = node(length / 2);
        group.bench_with_input(BenchmarkId::new("one_hole", length), &length, |b, _| {
            b.iter(|| {
                let hits = structure.lookup(Query::new(Some(mid), None, None));
                black_box(hits.len())
            })
        });
        group.bench_with_input(BenchmarkId::new("all_holes", length), &length, |b, _| {
            b.iter(|| black_box(structure.lookup(Query::ANY).len()))
        });
        group.bench_with_input(BenchmarkId::new("fully_ground", length), &length, |b, _| {
            b.iter(|| black_box(structure.is_true(Triplet::new(mid, node(length / 2 + 1), rel))))
        });
    }
    group.finish();
}

fn bench_add_remove(c: &mut Criterion) {
    c.bench_function("add_remove_cycle", |b| {
        let (mut structure, rel) = chain(100);
        let fact = Triplet::new(node(100), node(1), rel);
        b.iter(|| {
            structure.add_fact(black_box(fact));
            structure.remove_fact(black_box(fact));
        })
    });
}

fn bench_solver(c: &mut Criterion) {
    let mut group = c.benchmark_group("solver");
    for &length in &[50u32, 200] {
        let (structure, rel) = chain(length);

        // Enumerate every two-step path: (v0, v1, REL), (v1, v2, REL).
        let constraints = vec![
            Constraint::new(Atom::Var(0), Atom::Var(1), Atom::Node(rel)),
            Constraint::new(Atom::Var(1), Atom::Var(2), Atom::Node(rel)),
        ];
        let may_equal: Vec<HashSet<usize>> = (0..3).map(|i| HashSet::from([i])).collect();

        group.bench_with_input(BenchmarkId::new("two_step_paths", length), &length, |b, _| {
            b.iter(|| {
                let solver = Solver::new(
                    &structure,
                    3,
                    black_box(constraints.clone()),
                    may_equal.clone(),
                );
                black_box(solver.count())
            })
        });

        group.bench_with_input(BenchmarkId::new("first_assignment", length), &length, |b, _| {
            b.iter(|| {
                let mut solver = Solver::new(
                    &structure,
                    3,
                    black_box(constraints.clone()),
                    may_equal.clone(),
                );
                black_box(solver.next_assignment())
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_lookup, bench_add_remove, bench_solver);
criterion_main!(benches);

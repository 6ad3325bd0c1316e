use crate::node::{Atom, Constraint, NodeId, Triplet};
use crate::solver::Solver;
use crate::structure::Structure;
use crate::test_utils::{ground, var};
use hashbrown::HashSet;

fn n(raw: u32) -> NodeId {
    NodeId::new(raw).unwrap()
}

fn t(a: u32, b: u32, c: u32) -> Triplet {
    Triplet::new(n(a), n(b), n(c))
}

fn c(a: Atom, b: Atom, c: Atom) -> Constraint {
    Constraint::new(a, b, c)
}

/// Distinctness rows: each variable may only equal itself.
fn all_distinct(n_variables: usize) -> Vec<HashSet<usize>> {
    (0..n_variables).map(|i| HashSet::from([i])).collect()
}

fn collect(mut solver: Solver<'_>) -> Vec<Vec<NodeId>> {
    let mut out = Vec::new();
    while let Some(assignment) = solver.next_assignment() {
        out.push(assignment);
    }
    out
}

// ========== CORE SCENARIOS ==========

#[test]
fn empty_structure_yields_nothing_but_is_valid() {
    let structure = Structure::new();
    let constraints = vec![c(var(0), ground(n(1)), ground(n(2)))];
    let mut solver = Solver::new(&structure, 1, constraints, all_distinct(1));

    assert!(solver.is_valid());
    assert_eq!(solver.next_assignment(), None);
    assert!(!solver.is_valid());
}

#[test]
fn ground_constraint_anchors_a_probe() {
    let mut structure = Structure::new();
    structure.add_fact(t(1, 2, 3));

    let constraints = vec![
        c(ground(n(1)), ground(n(2)), ground(n(3))),
        c(var(0), ground(n(2)), ground(n(3))),
    ];
    let solver = Solver::new(&structure, 1, constraints, all_distinct(1));
    assert_eq!(collect(solver), vec![vec![n(1)]]);
}

#[test]
fn failed_ground_constraint_invalidates_permanently() {
    let mut structure = Structure::new();
    structure.add_fact(t(1, 2, 3));

    let constraints = vec![
        c(ground(n(3)), ground(n(2)), ground(n(1))),
        c(var(0), ground(n(2)), ground(n(3))),
    ];
    let mut solver = Solver::new(&structure, 1, constraints, all_distinct(1));
    assert!(!solver.is_valid());
    assert_eq!(solver.next_assignment(), None);
}

#[test]
fn transitive_chain_has_a_unique_assignment() {
    // Pair facts: G1 relates A over B, G2 relates B over C.
    let (g1, g2, a, b, cc) = (n(1), n(2), n(3), n(4), n(5));
    let (greater, lesser) = (n(6), n(7));
    let mut structure = Structure::new();
    structure.add_fact(Triplet::new(g1, a, greater));
    structure.add_fact(Triplet::new(g1, b, lesser));
    structure.add_fact(Triplet::new(g2, b, greater));
    structure.add_fact(Triplet::new(g2, cc, lesser));

    let constraints = vec![
        c(var(0), var(1), ground(greater)),
        c(var(0), var(2), ground(lesser)),
        c(var(3), var(2), ground(greater)),
        c(var(3), var(4), ground(lesser)),
    ];
    let solver = Solver::new(&structure, 5, constraints.clone(), all_distinct(5));
    let assignments = collect(solver);
    assert_eq!(assignments, vec![vec![g1, a, b, g2, cc]]);

    // Soundness: substituting the assignment grounds every constraint.
    for constraint in &constraints {
        let [x, y, z] = constraint.atoms().map(|atom| match atom {
            Atom::Node(node) => node,
            Atom::Var(v) => assignments[0][v as usize],
        });
        assert!(structure.is_true(Triplet::new(x, y, z)));
    }
}

#[test]
fn distinctness_filters_aliased_assignments() {
    let mut structure = Structure::new();
    structure.add_fact(t(1, 2, 3)); // (A, X, R)
    structure.add_fact(t(4, 2, 3)); // (B, X, R)

    let constraints = vec![
        c(var(0), ground(n(2)), ground(n(3))),
        c(var(1), ground(n(2)), ground(n(3))),
    ];

    let solver = Solver::new(&structure, 2, constraints.clone(), all_distinct(2));
    assert_eq!(
        collect(solver),
        vec![vec![n(1), n(4)], vec![n(4), n(1)]]
    );

    let may_equal = vec![HashSet::from([0, 1]), HashSet::from([0, 1])];
    let solver = Solver::new(&structure, 2, constraints, may_equal);
    assert_eq!(
        collect(solver),
        vec![
            vec![n(1), n(1)],
            vec![n(1), n(4)],
            vec![n(4), n(1)],
            vec![n(4), n(4)],
        ]
    );
}

#[test]
fn self_referential_constraint_needs_agreeing_positions() {
    let mut structure = Structure::new();
    structure.add_fact(t(1, 1, 2)); // (A, A, B)
    structure.add_fact(t(3, 4, 2)); // (C, D, B) contributes nothing

    let constraints = vec![c(var(0), var(0), var(1))];
    let solver = Solver::new(&structure, 2, constraints, all_distinct(2));
    assert_eq!(collect(solver), vec![vec![n(1), n(2)]]);
}

#[test]
fn exhaustion_is_idempotent_and_leaves_the_structure_alone() {
    let mut structure = Structure::new();
    structure.add_fact(t(1, 2, 3));
    structure.add_fact(t(4, 2, 3));
    let facts_before: Vec<Triplet> = structure.iter().collect();

    let constraints = vec![c(var(0), ground(n(2)), ground(n(3)))];
    let mut solver = Solver::new(&structure, 1, constraints, all_distinct(1));

    assert!(solver.next_assignment().is_some());
    assert!(solver.next_assignment().is_some());
    assert_eq!(solver.next_assignment(), None);
    assert_eq!(solver.next_assignment(), None);
    assert_eq!(solver.next_assignment(), None);
    drop(solver);

    assert_eq!(structure.iter().collect::<Vec<_>>(), facts_before);
    assert!(structure.is_clean());
}

// ========== ENUMERATION BEHAVIOR ==========

#[test]
fn candidates_come_out_in_ascending_node_order() {
    let mut structure = Structure::new();
    structure.add_fact(t(9, 2, 3));
    structure.add_fact(t(4, 2, 3));
    structure.add_fact(t(7, 2, 3));

    let constraints = vec![c(var(0), ground(n(2)), ground(n(3)))];
    let solver = Solver::new(&structure, 1, constraints, all_distinct(1));
    assert_eq!(collect(solver), vec![vec![n(4)], vec![n(7)], vec![n(9)]]);
}

#[test]
fn equal_inputs_enumerate_identically() {
    let mut structure = Structure::new();
    for fact in [t(1, 2, 3), t(4, 2, 3), t(5, 2, 3), t(1, 4, 3)] {
        structure.add_fact(fact);
    }
    let constraints = vec![
        c(var(0), ground(n(2)), ground(n(3))),
        c(var(1), ground(n(2)), ground(n(3))),
    ];

    let first = collect(Solver::new(
        &structure,
        2,
        constraints.clone(),
        all_distinct(2),
    ));
    let second = collect(Solver::new(&structure, 2, constraints, all_distinct(2)));
    assert_eq!(first, second);
    assert!(!first.is_empty());
}

#[test]
fn intersection_across_constraints_narrows_candidates() {
    let mut structure = Structure::new();
    structure.add_fact(t(1, 2, 3)); // v0 candidate from the first constraint
    structure.add_fact(t(4, 2, 3));
    structure.add_fact(t(4, 5, 6)); // only 4 survives the second constraint

    let constraints = vec![
        c(var(0), ground(n(2)), ground(n(3))),
        c(var(0), ground(n(5)), ground(n(6))),
    ];
    let solver = Solver::new(&structure, 1, constraints, all_distinct(1));
    assert_eq!(collect(solver), vec![vec![n(4)]]);
}

#[test]
fn unconstrained_variable_has_no_candidates() {
    let mut structure = Structure::new();
    structure.add_fact(t(1, 2, 3));

    // Variable 1 appears in no constraint, so no assignment can complete.
    let constraints = vec![c(var(0), ground(n(2)), ground(n(3)))];
    let solver = Solver::new(&structure, 2, constraints, all_distinct(2));
    assert!(collect(solver).is_empty());
}

#[test]
fn backtracking_explores_every_branch() {
    // Two independent slots over a shared relation, plus a join.
    let mut structure = Structure::new();
    structure.add_fact(t(1, 5, 6));
    structure.add_fact(t(2, 5, 6));
    structure.add_fact(t(1, 2, 7));

    let constraints = vec![
        c(var(0), ground(n(5)), ground(n(6))),
        c(var(1), ground(n(5)), ground(n(6))),
        c(var(0), var(1), ground(n(7))),
    ];
    let solver = Solver::new(&structure, 2, constraints, all_distinct(2));
    assert_eq!(collect(solver), vec![vec![n(1), n(2)]]);
}

// ========== CONTRACTS ==========

#[test]
#[should_panic(expected = "at least one variable")]
fn zero_variables_is_a_contract_violation() {
    let structure = Structure::new();
    let _ = Solver::new(&structure, 0, Vec::new(), Vec::new());
}

#[test]
#[should_panic(expected = "names variable")]
fn out_of_range_variable_is_a_contract_violation() {
    let structure = Structure::new();
    let constraints = vec![c(var(2), ground(n(1)), ground(n(2)))];
    let _ = Solver::new(&structure, 1, constraints, all_distinct(1));
}

#[test]
#[should_panic(expected = "one row per variable")]
fn wrong_may_equal_length_is_a_contract_violation() {
    let structure = Structure::new();
    let constraints = vec![c(var(0), ground(n(1)), ground(n(2)))];
    let _ = Solver::new(&structure, 2, constraints, all_distinct(1));
}

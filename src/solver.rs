//! Backtracking enumeration of satisfying assignments.
//!
//! A [`Solver`] is bound to a borrowed [`Structure`] snapshot and a list of
//! constraint triplets whose positions are ground nodes or variables. It
//! yields every assignment of nodes to variables under which each
//! constraint, once substituted, is a stored fact — subject to the
//! distinctness rule that variables not declared may-equal must receive
//! different nodes.
//!
//! Enumeration is variable-first: each depth keeps a candidate set computed
//! by intersecting, across the constraints touching that variable, the
//! projections of hole-masked lookups. Candidates are tried in ascending
//! node order, making the assignment sequence deterministic for equal
//! inputs. Solvers are single-use; the structure must not change while one
//! is alive.

use crate::node::{Atom, Constraint, NodeId, Query, Triplet};
use crate::structure::Structure;
use hashbrown::HashSet;
use smallvec::SmallVec;
use std::collections::BTreeSet;

#[cfg(feature = "tracing")]
use crate::trace::{debug_span, trace};

/// Per-depth search state: the enumerated candidate set and a cursor.
#[derive(Debug, Clone, Default)]
struct Slot {
    options: Vec<NodeId>,
    cursor: usize,
}

/// A single-use enumerator of satisfying assignments.
pub struct Solver<'s> {
    structure: &'s Structure,
    n_variables: usize,
    /// False once construction failed a ground constraint or the search is
    /// exhausted; no further assignments will be produced.
    valid: bool,
    /// Constraints containing at least one variable, as given.
    constraints: Vec<Constraint>,
    /// The same constraints with assigned variables substituted in.
    working: Vec<Constraint>,
    /// For each variable, the indices of the constraints that mention it.
    var_to_constraints: Vec<SmallVec<[usize; 4]>>,
    /// For each variable, the lower-indexed variables it may share a node
    /// with.
    may_equal: Vec<HashSet<usize>>,
    assignment: Vec<Option<NodeId>>,
    slots: Vec<Slot>,
    depth: usize,
}

impl<'s> Solver<'s> {
    /// Build a solver over `structure` for `n_variables` variables.
    ///
    /// Fully ground constraints are checked immediately; if any is not a
    /// stored fact the solver is permanently invalid and yields nothing.
    ///
    /// Panics if `n_variables` is zero, a constraint names a variable
    /// outside `0..n_variables`, or `may_equal` is not `n_variables` long —
    /// all contract violations.
    pub fn new(
        structure: &'s Structure,
        n_variables: usize,
        constraints: Vec<Constraint>,
        may_equal: Vec<HashSet<usize>>,
    ) -> Self {
        assert!(n_variables > 0, "solver needs at least one variable");
        assert_eq!(
            may_equal.len(),
            n_variables,
            "may_equal must have one row per variable"
        );

        #[cfg(feature = "tracing")]
        let _span = debug_span!("solver_new", n_variables, constraints = constraints.len()).entered();

        let mut kept: Vec<Constraint> = Vec::new();
        let mut var_to_constraints: Vec<SmallVec<[usize; 4]>> =
            vec![SmallVec::new(); n_variables];
        let mut valid = true;

        for constraint in constraints {
            if let Some(fact) = constraint.ground() {
                if !structure.is_true(fact) {
                    #[cfg(feature = "tracing")]
                    trace!(?fact, "ground_constraint_failed");
                    valid = false;
                    break;
                }
                continue;
            }
            let index = kept.len();
            for atom in constraint.atoms() {
                if let Some(var) = atom.as_var() {
                    let var = var as usize;
                    assert!(
                        var < n_variables,
                        "constraint names variable {var} but the solver has {n_variables}"
                    );
                    let row = &mut var_to_constraints[var];
                    if !row.contains(&index) {
                        row.push(index);
                    }
                }
            }
            kept.push(constraint);
        }

        let working = kept.clone();
        let mut solver = Solver {
            structure,
            n_variables,
            valid,
            constraints: kept,
            working,
            var_to_constraints,
            may_equal,
            assignment: vec![None; n_variables],
            slots: vec![Slot::default(); n_variables],
            depth: 0,
        };
        if solver.valid {
            solver.get_options();
        }
        solver
    }

    /// True while the solver may still produce assignments. False after a
    /// ground constraint failed at construction or the search is exhausted.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Produce the next satisfying assignment, or `None` when exhausted.
    ///
    /// Assignments come out in the lexicographic product of the per-depth
    /// candidate orders (ascending node ids). Once this returns `None`, it
    /// keeps returning `None`.
    pub fn next_assignment(&mut self) -> Option<Vec<NodeId>> {
        if !self.valid {
            return None;
        }
        loop {
            let d = self.depth;
            let choice = {
                let slot = &mut self.slots[d];
                if slot.cursor < slot.options.len() {
                    let choice = slot.options[slot.cursor];
                    slot.cursor += 1;
                    Some(choice)
                } else {
                    None
                }
            };

            let Some(choice) = choice else {
                // This depth is out of candidates; backtrack.
                if d == 0 {
                    self.valid = false;
                    return None;
                }
                self.unassign();
                continue;
            };

            self.assign(choice);

            if self.depth == self.n_variables {
                let complete: Vec<NodeId> = self
                    .assignment
                    .iter()
                    .map(|&slot| slot.expect("complete assignment"))
                    .collect();
                // Step back so the next call resumes the enumeration.
                self.unassign();
                return Some(complete);
            }

            self.get_options();
        }
    }

    /// Substitute `choice` for the current variable in every constraint
    /// that mentions it, then descend.
    fn assign(&mut self, choice: NodeId) {
        let d = self.depth;
        self.assignment[d] = Some(choice);
        let var = Atom::Var(d as u32);
        for &index in &self.var_to_constraints[d] {
            for position in 0..3 {
                if self.working[index][position] == var {
                    self.working[index][position] = Atom::Node(choice);
                }
            }
        }
        #[cfg(feature = "tracing")]
        trace!(depth = d, node = choice.raw(), "assign");
        self.depth += 1;
    }

    /// Undo the substitutions of the previous depth and step back onto it.
    fn unassign(&mut self) {
        self.depth -= 1;
        let d = self.depth;
        self.assignment[d] = None;
        let var = Atom::Var(d as u32);
        for &index in &self.var_to_constraints[d] {
            let original = self.constraints[index];
            for position in 0..3 {
                if original[position] == var {
                    self.working[index][position] = original[position];
                }
            }
        }
        #[cfg(feature = "tracing")]
        trace!(depth = d, "unassign");
    }

    /// Compute the candidate set for the variable at the current depth.
    ///
    /// For each constraint touching the variable: mask every variable
    /// position to a hole, look the key up, and project each matching fact
    /// onto the positions the variable occupied. A fact whose projections
    /// disagree (the constraint mentions the variable twice, the fact has
    /// different nodes there) contributes nothing. The candidate set is the
    /// intersection across constraints, minus nodes already assigned to
    /// variables this one must stay distinct from.
    fn get_options(&mut self) {
        let d = self.depth;
        let var = Atom::Var(d as u32);

        let mut options: BTreeSet<NodeId> = BTreeSet::new();
        let mut initialized = false;

        for &index in &self.var_to_constraints[d] {
            let working = self.working[index];
            let mut key = [None; 3];
            let mut hole_is_var = [false; 3];
            for position in 0..3 {
                match working[position] {
                    Atom::Node(node) => key[position] = Some(node),
                    Atom::Var(_) => hole_is_var[position] = working[position] == var,
                }
            }

            let mut local: BTreeSet<NodeId> = BTreeSet::new();
            for &fact in self
                .structure
                .lookup(Query::new(key[0], key[1], key[2]))
            {
                if let Some(choice) = project(fact, &hole_is_var) {
                    // Running intersection: only keep what survived so far.
                    if !initialized || options.contains(&choice) {
                        local.insert(choice);
                    }
                }
            }
            options = local;
            initialized = true;
            if options.is_empty() {
                break;
            }
        }

        // Distinctness: drop nodes already taken by variables this one may
        // not equal.
        for earlier in 0..d {
            if self.may_equal[d].contains(&earlier) {
                continue;
            }
            if let Some(taken) = self.assignment[earlier] {
                options.remove(&taken);
            }
        }

        #[cfg(feature = "tracing")]
        trace!(depth = d, candidates = options.len(), "get_options");

        self.slots[d] = Slot {
            options: options.into_iter().collect(),
            cursor: 0,
        };
    }
}

/// Project a fact onto the positions a variable occupied. `None` if the
/// positions disagree; the agreed node otherwise. Facts matched through a
/// key with no variable positions never reach this.
fn project(fact: Triplet, hole_is_var: &[bool; 3]) -> Option<NodeId> {
    let mut choice: Option<NodeId> = None;
    for position in 0..3 {
        if !hole_is_var[position] {
            continue;
        }
        match choice {
            None => choice = Some(fact[position]),
            Some(agreed) if agreed != fact[position] => return None,
            Some(_) => {}
        }
    }
    choice
}

impl Iterator for Solver<'_> {
    type Item = Vec<NodeId>;

    fn next(&mut self) -> Option<Vec<NodeId>> {
        self.next_assignment()
    }
}

#[cfg(test)]
#[path = "tests/solver.rs"]
mod tests;

//! Named patterns: existential queries over a structure.
//!
//! A [`Pattern`] is a list of constraints whose variables are arbitrary
//! caller-chosen tokens, plus a declaration of which tokens may share a
//! node. Solving a pattern picks a search order for the variables
//! (most-constrained first), renumbers them into the dense index space the
//! [`Solver`] expects, runs a fresh solver, and translates its assignments
//! back into token bindings. This is the bridge between the rule layer,
//! which thinks in nodes and tokens, and the solver, which thinks in dense
//! variable indices.

use crate::node::{Atom, Constraint, NodeId};
use crate::solver::Solver;
use crate::structure::Structure;
use hashbrown::HashSet;
use rustc_hash::FxHashMap;
use std::collections::{BTreeMap, BTreeSet};

/// An assignment of nodes to pattern tokens. Ordered so collections of
/// bindings have a deterministic iteration order.
pub type Binding = BTreeMap<u32, NodeId>;

/// An existential query: constraint triplets over token variables.
#[derive(Debug, Clone, Default)]
pub struct Pattern {
    constraints: Vec<Constraint>,
    /// Token → tokens it may share a node with. Tokens without an entry
    /// form singleton classes.
    may_equal: FxHashMap<u32, BTreeSet<u32>>,
}

impl Pattern {
    /// An empty pattern with no may-equal declarations.
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty pattern with the given may-equal declaration.
    pub fn with_may_equal(may_equal: FxHashMap<u32, BTreeSet<u32>>) -> Self {
        Pattern {
            constraints: Vec::new(),
            may_equal,
        }
    }

    pub fn add_constraint(&mut self, constraint: Constraint) {
        self.constraints.push(constraint);
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn has_constraints(&self) -> bool {
        !self.constraints.is_empty()
    }

    /// The distinct tokens appearing in the constraints, ascending.
    pub fn variables(&self) -> BTreeSet<u32> {
        self.constraints
            .iter()
            .flat_map(|c| c.atoms())
            .filter_map(Atom::as_var)
            .collect()
    }

    /// The may-equal class of a token (a singleton if undeclared).
    pub fn may_equal_class(&self, token: u32) -> BTreeSet<u32> {
        match self.may_equal.get(&token) {
            Some(class) => class.clone(),
            None => BTreeSet::from([token]),
        }
    }

    /// All bindings extending `partial` under which every constraint is a
    /// stored fact, in deterministic order.
    ///
    /// A pattern with no constraints has exactly the trivial extension;
    /// a ground pattern (no free tokens after substituting `partial`) has
    /// it iff every constraint holds. Bindings where two tokens outside a
    /// common may-equal class received the same node are filtered out —
    /// this matters when `partial` itself aliases tokens.
    pub fn solutions(&self, structure: &Structure, partial: &Binding) -> Vec<Binding> {
        if self.constraints.is_empty() {
            return vec![partial.clone()];
        }

        // Substitute the partial assignment into the constraints.
        let constraints: Vec<Constraint> = self
            .constraints
            .iter()
            .map(|c| {
                let mut atoms = c.atoms();
                for atom in atoms.iter_mut() {
                    if let Atom::Var(token) = *atom {
                        if let Some(&node) = partial.get(&token) {
                            *atom = Atom::Node(node);
                        }
                    }
                }
                Constraint(atoms)
            })
            .collect();

        let free: BTreeSet<u32> = constraints
            .iter()
            .flat_map(|c| c.atoms())
            .filter_map(Atom::as_var)
            .collect();

        if free.is_empty() {
            let all_hold = constraints
                .iter()
                .all(|c| structure.is_true(c.ground().expect("no free tokens")));
            return if all_hold && self.valid_shared(partial) {
                vec![partial.clone()]
            } else {
                Vec::new()
            };
        }

        let order = search_order(&constraints, free.len());
        let dense: FxHashMap<u32, u32> = order
            .iter()
            .enumerate()
            .map(|(index, &token)| (token, index as u32))
            .collect();

        let program: Vec<Constraint> = constraints
            .iter()
            .map(|c| {
                let mut atoms = c.atoms();
                for atom in atoms.iter_mut() {
                    if let Atom::Var(token) = *atom {
                        *atom = Atom::Var(dense[&token]);
                    }
                }
                Constraint(atoms)
            })
            .collect();

        let rows: Vec<HashSet<usize>> = order
            .iter()
            .map(|token| {
                self.may_equal
                    .get(token)
                    .map(|class| {
                        class
                            .iter()
                            .filter_map(|t| dense.get(t))
                            .map(|&i| i as usize)
                            .collect()
                    })
                    .unwrap_or_default()
            })
            .collect();

        let solver = Solver::new(structure, order.len(), program, rows);
        let mut out = Vec::new();
        for assignment in solver {
            let mut binding = partial.clone();
            for (index, node) in assignment.into_iter().enumerate() {
                binding.insert(order[index], node);
            }
            if self.valid_shared(&binding) {
                out.push(binding);
            }
        }
        out
    }

    /// True iff every group of tokens sharing one node lies inside a single
    /// may-equal class.
    fn valid_shared(&self, binding: &Binding) -> bool {
        let mut preimage: FxHashMap<NodeId, Vec<u32>> = FxHashMap::default();
        for (&token, &node) in binding {
            preimage.entry(node).or_default().push(token);
        }
        for group in preimage.values() {
            if group.len() < 2 {
                continue;
            }
            let class = self.may_equal_class(group[0]);
            if !group.iter().all(|token| class.contains(token)) {
                return false;
            }
        }
        true
    }
}

/// Pick the solver's depth order for the free tokens.
///
/// Repeatedly take the constraint with the most ground positions among
/// those that still contain an unordered token (ties: lowest constraint
/// index), and order its first unordered token next. Ordering a token
/// counts as grounding its positions everywhere it appears, so later picks
/// see the narrowed search space.
fn search_order(constraints: &[Constraint], n_free: usize) -> Vec<u32> {
    let mut fixed: Vec<usize> = constraints
        .iter()
        .map(|c| c.atoms().iter().filter(|a| !a.is_var()).count())
        .collect();
    let mut order: Vec<u32> = Vec::with_capacity(n_free);
    let mut ordered: HashSet<u32> = HashSet::new();

    while order.len() < n_free {
        let mut best: Option<usize> = None;
        for (index, constraint) in constraints.iter().enumerate() {
            let has_free = constraint
                .atoms()
                .iter()
                .any(|a| a.as_var().is_some_and(|t| !ordered.contains(&t)));
            if !has_free {
                continue;
            }
            // Strict comparison keeps the first constraint on ties.
            if best.map_or(true, |b| fixed[index] > fixed[b]) {
                best = Some(index);
            }
        }
        let best = best.expect("a free token always appears in some constraint");
        let token = constraints[best]
            .atoms()
            .iter()
            .filter_map(|a| a.as_var())
            .find(|t| !ordered.contains(t))
            .expect("chosen constraint has a free token");

        ordered.insert(token);
        order.push(token);
        for (index, constraint) in constraints.iter().enumerate() {
            let occurrences = constraint
                .atoms()
                .iter()
                .filter(|a| a.as_var() == Some(token))
                .count();
            fixed[index] += occurrences;
        }
    }
    order
}

#[cfg(test)]
#[path = "tests/pattern.rs"]
mod tests;

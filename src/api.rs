//! Raw integer-encoded adapter over the structure and solver.
//!
//! Hosts that drive the core with plain integers use the encoding:
//! a node is a positive integer, 0 is the hole marker in lookup keys, and
//! variable `i` in a constraint is the non-positive integer `−i` (variable
//! 0 is 0 — holes only exist in keys, variables only in constraints, so
//! the two readings never collide). This module only marshals values;
//! malformed encodings come back as `Err`, never a panic.

use crate::node::{Atom, Constraint, NodeId, Query, Triplet};
use crate::solver::Solver;
use crate::structure::Structure;
use hashbrown::HashSet;

/// Decode a fact from raw values. Every position must be a positive node.
pub fn triplet(a: i64, b: i64, c: i64) -> Result<Triplet, String> {
    let decode = |value: i64, position: usize| -> Result<NodeId, String> {
        u32::try_from(value)
            .ok()
            .and_then(NodeId::new)
            .ok_or_else(|| format!("fact position {position} is {value}, not a positive node"))
    };
    Ok(Triplet::new(
        decode(a, 0)?,
        decode(b, 1)?,
        decode(c, 2)?,
    ))
}

/// Decode a lookup key from raw values; 0 is the hole.
pub fn query(a: i64, b: i64, c: i64) -> Result<Query, String> {
    let decode = |value: i64, position: usize| -> Result<Option<NodeId>, String> {
        if value == 0 {
            return Ok(None);
        }
        u32::try_from(value)
            .ok()
            .and_then(NodeId::new)
            .map(Some)
            .ok_or_else(|| format!("key position {position} is {value}, not a node or hole"))
    };
    Ok(Query::new(decode(a, 0)?, decode(b, 1)?, decode(c, 2)?))
}

/// Decode a constraint from raw values: positive is a node, `−i` is
/// variable `i`.
pub fn constraint(a: i64, b: i64, c: i64) -> Result<Constraint, String> {
    let decode = |value: i64, position: usize| -> Result<Atom, String> {
        if value <= 0 {
            let var = value
                .checked_neg()
                .and_then(|v| u32::try_from(v).ok())
                .ok_or_else(|| {
                    format!("constraint position {position} is {value}, out of variable range")
                })?;
            return Ok(Atom::Var(var));
        }
        u32::try_from(value)
            .ok()
            .and_then(NodeId::new)
            .map(Atom::Node)
            .ok_or_else(|| format!("constraint position {position} is {value}, not a node"))
    };
    Ok(Constraint::new(
        decode(a, 0)?,
        decode(b, 1)?,
        decode(c, 2)?,
    ))
}

/// Add a fact given raw values. Duplicates are reported, not panicked.
pub fn add_fact(structure: &mut Structure, a: i64, b: i64, c: i64) -> Result<(), String> {
    let fact = triplet(a, b, c)?;
    if !structure.ensure_fact(fact) {
        return Err(format!("fact ({a}, {b}, {c}) is already present"));
    }
    Ok(())
}

/// Remove a fact given raw values. Absence is reported, not panicked.
pub fn remove_fact(structure: &mut Structure, a: i64, b: i64, c: i64) -> Result<(), String> {
    let fact = triplet(a, b, c)?;
    if !structure.retract_fact(fact) {
        return Err(format!("fact ({a}, {b}, {c}) is not present"));
    }
    Ok(())
}

/// Truth-test a fact given raw values.
pub fn is_true(structure: &Structure, a: i64, b: i64, c: i64) -> Result<bool, String> {
    Ok(structure.is_true(triplet(a, b, c)?))
}

/// Look up all facts matching a raw key, re-encoded as raw values in the
/// structure's insertion-derived order.
pub fn lookup(structure: &Structure, a: i64, b: i64, c: i64) -> Result<Vec<[i64; 3]>, String> {
    let key = query(a, b, c)?;
    Ok(structure
        .lookup(key)
        .iter()
        .map(|fact| fact.nodes().map(|node| i64::from(node.raw())))
        .collect())
}

/// Build a solver from a raw constraint program.
///
/// `may_equal` must have one row per variable; each row lists the variable
/// indices its variable may share a node with.
pub fn solver<'s>(
    structure: &'s Structure,
    n_variables: usize,
    constraints: &[[i64; 3]],
    may_equal: &[Vec<usize>],
) -> Result<Solver<'s>, String> {
    if n_variables == 0 {
        return Err("solver needs at least one variable".to_string());
    }
    if may_equal.len() != n_variables {
        return Err(format!(
            "may_equal has {} rows for {n_variables} variables",
            may_equal.len()
        ));
    }
    let mut decoded = Vec::with_capacity(constraints.len());
    for &[a, b, c] in constraints {
        let parsed = constraint(a, b, c)?;
        for atom in parsed.atoms() {
            if let Some(var) = atom.as_var() {
                if var as usize >= n_variables {
                    return Err(format!(
                        "constraint names variable {var} but the solver has {n_variables}"
                    ));
                }
            }
        }
        decoded.push(parsed);
    }
    let rows: Vec<HashSet<usize>> = may_equal
        .iter()
        .map(|row| row.iter().copied().collect())
        .collect();
    Ok(Solver::new(structure, n_variables, decoded, rows))
}

/// The next assignment as raw values; empty signals exhaustion.
pub fn next_assignment(solver: &mut Solver<'_>) -> Vec<i64> {
    match solver.next_assignment() {
        Some(assignment) => assignment
            .into_iter()
            .map(|node| i64::from(node.raw()))
            .collect(),
        None => Vec::new(),
    }
}

//! Executing a rule match against the structure.
//!
//! Application happens in three steps: mint fresh nodes for unbound
//! `/INSERT` members, insert the translated rule facts that mention an
//! inserted member, then carry out `/REMOVE` and `/SUBTRACT`. Insertion
//! takes precedence over subtraction: a fact both inserted and subtracted
//! by one firing stays in the structure (how a rule expresses "remove the
//! marker, then put it back where it was").
//!
//! Minted nodes get reproducible names derived by hashing the match's
//! bindings, so a match produces the same nodes no matter when it fires.

use crate::names::NodeStore;
use crate::node::{NodeId, Triplet};
use crate::rule::ProductionRule;
use crate::structure::Structure;
use rustc_hash::FxHashSet;
use sha2::{Digest, Sha224};
use std::collections::{BTreeMap, BTreeSet};

#[cfg(feature = "tracing")]
use crate::trace::debug_span;

/// Apply a match's consequences to the structure.
///
/// Returns the complete binding, including the nodes minted for `/INSERT`
/// members. The changes land in the structure's delta buffer; the caller
/// decides whether to commit or roll back.
pub fn execute(
    rule: &ProductionRule,
    bindings: &BTreeMap<NodeId, NodeId>,
    structure: &mut Structure,
    names: &NodeStore,
) -> BTreeMap<NodeId, NodeId> {
    #[cfg(feature = "tracing")]
    let _span = debug_span!("rule_execute", anchor = rule.anchor().raw()).entered();

    let mut binding = bindings.clone();
    mint_inserts(rule, names, &mut binding);
    let added = insert_facts(rule, structure, &binding);
    run_removals(rule, structure, &binding, &added);
    binding
}

/// Mint a structure node for every `/INSERT` member not already bound;
/// hard-equal members share the minted node.
fn mint_inserts(rule: &ProductionRule, names: &NodeStore, binding: &mut BTreeMap<NodeId, NodeId>) {
    let base = binding_digest(binding, names);
    for &member in rule.insert_nodes() {
        if binding.contains_key(&member) {
            continue;
        }
        let member_name = names
            .resolve(member)
            .expect("rule member minted by this store");
        let minted = names.fresh(&format!("/:{}", digest(&format!("{base}{member_name}"))));
        binding.insert(member, minted);
        for partner in rule.equal_partners(member) {
            binding.insert(partner, minted);
        }
    }
}

/// Insert the translated rule facts that mention an inserted member and
/// whose rule nodes are all bound and none `/REMOVE`-marked. Returns every
/// translated candidate, inserted or pre-existing, for the subtraction
/// precedence check.
fn insert_facts(
    rule: &ProductionRule,
    structure: &mut Structure,
    binding: &BTreeMap<NodeId, NodeId>,
) -> BTreeSet<Triplet> {
    let inserted: FxHashSet<NodeId> = rule.insert_nodes().iter().copied().collect();
    let removed: FxHashSet<NodeId> = rule.remove_nodes().iter().copied().collect();
    let relevant: BTreeSet<NodeId> = binding
        .keys()
        .copied()
        .filter(|node| rule.all_nodes().contains(node) && !removed.contains(node))
        .collect();

    let mut added = BTreeSet::new();
    for &node in &relevant {
        for &fact in rule.facts_of(node) {
            let nodes = fact.nodes();
            let mentions_insert = nodes.iter().any(|n| inserted.contains(n));
            let members_bound = nodes
                .iter()
                .filter(|n| rule.all_nodes().contains(*n))
                .all(|n| relevant.contains(n));
            if mentions_insert && members_bound {
                let translated = translate(fact, binding);
                added.insert(translated);
                structure.ensure_fact(translated);
            }
        }
    }
    added
}

/// Clear `/REMOVE` members' nodes out of the structure, then retract
/// `/SUBTRACT`-touching rule facts that were not just inserted.
fn run_removals(
    rule: &ProductionRule,
    structure: &mut Structure,
    binding: &BTreeMap<NodeId, NodeId>,
    added: &BTreeSet<Triplet>,
) {
    for &member in rule.remove_nodes() {
        if let Some(&target) = binding.get(&member) {
            structure.remove_all_facts_about(target);
        }
    }

    let subtract: FxHashSet<NodeId> = rule
        .subtract_nodes()
        .iter()
        .copied()
        .filter(|node| binding.contains_key(node))
        .collect();
    if subtract.is_empty() {
        return;
    }
    for fact in assigned_rule_facts(rule, binding) {
        if fact.nodes().iter().any(|n| subtract.contains(n)) {
            let translated = translate(fact, binding);
            if !added.contains(&translated) {
                structure.retract_fact(translated);
            }
        }
    }
}

/// The snapshotted rule facts whose rule nodes are all bound.
fn assigned_rule_facts<'r>(
    rule: &'r ProductionRule,
    binding: &'r BTreeMap<NodeId, NodeId>,
) -> impl Iterator<Item = Triplet> + 'r {
    rule.all_nodes()
        .iter()
        .flat_map(|&node| rule.facts_of(node).iter().copied())
        .filter(|fact| {
            fact.nodes()
                .iter()
                .filter(|n| rule.all_nodes().contains(*n))
                .all(|n| binding.contains_key(n))
        })
}

/// Substitute bound rule nodes into a fact; unbound positions (ground
/// nodes of the host structure) pass through.
fn translate(fact: Triplet, binding: &BTreeMap<NodeId, NodeId>) -> Triplet {
    let [a, b, c] = fact
        .nodes()
        .map(|node| binding.get(&node).copied().unwrap_or(node));
    Triplet::new(a, b, c)
}

/// Reproducible digest of a binding, keyed by node names. Caller-minted
/// nodes without a name fall back to their raw id.
fn binding_digest(binding: &BTreeMap<NodeId, NodeId>, names: &NodeStore) -> String {
    let render = |node: NodeId| match names.resolve(node) {
        Some(name) => name.to_string(),
        None => node.to_string(),
    };
    let mut pairs: Vec<(String, String)> = binding
        .iter()
        .map(|(&member, &value)| (render(member), render(value)))
        .collect();
    pairs.sort();
    let mut rendered = String::new();
    for (member, value) in pairs {
        rendered.push_str(&member);
        rendered.push('=');
        rendered.push_str(&value);
        rendered.push(';');
    }
    digest(&rendered)
}

fn digest(input: &str) -> String {
    let mut hasher = Sha224::new();
    hasher.update(input.as_bytes());
    let bytes = hasher.finalize();
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

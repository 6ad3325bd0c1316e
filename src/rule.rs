//! Production rules encoded as facts in the structure.
//!
//! A rule lives in the structure it will run against, written with
//! sentinel nodes: an *annotation node* `m` carries a fact
//! `(m, anchor, /RULE)` tying it to the rule's anchor, plus facts
//! `(m, member, TYPE)` declaring members. Member types are `/MUST_MAP`,
//! `/TRY_MAP`, `/NO_MAP<k>` (an optional integer suffix selects a no-map
//! group), `/INSERT`, `/REMOVE` and `/SUBTRACT`; `/=` merges members onto
//! one variable and `/MAYBE=` relaxes distinctness between them. The core
//! store never interprets any of these — only this parser does.
//!
//! Parsing captures everything the rule needs (patterns, variable maps,
//! and a snapshot of the rule subgraph's facts), so the subgraph can be
//! deleted from the structure afterwards without breaking matching or
//! application.

use crate::names::NodeStore;
use crate::node::{Atom, Constraint, NodeId, Query, Triplet};
use crate::pattern::Pattern;
use crate::structure::Structure;
use rustc_hash::FxHashMap;
use std::collections::{BTreeMap, BTreeSet};

/// The sentinel node names the rule layer interprets.
pub mod sentinel {
    pub const RULE: &str = "/RULE";
    pub const MUST_MAP: &str = "/MUST_MAP";
    pub const TRY_MAP: &str = "/TRY_MAP";
    pub const NO_MAP: &str = "/NO_MAP";
    pub const INSERT: &str = "/INSERT";
    pub const REMOVE: &str = "/REMOVE";
    pub const SUBTRACT: &str = "/SUBTRACT";
    pub const EQUAL: &str = "/=";
    pub const MAYBE_EQUAL: &str = "/MAYBE=";
}

/// What a member declaration marks its node as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MemberKind {
    Must,
    Try,
    NoMap(usize),
    Insert,
    Remove,
    Subtract,
}

/// Classify an annotation key by its sentinel name, if it has one.
fn classify(name: &str) -> Option<MemberKind> {
    match name {
        sentinel::MUST_MAP => return Some(MemberKind::Must),
        sentinel::TRY_MAP => return Some(MemberKind::Try),
        sentinel::INSERT => return Some(MemberKind::Insert),
        sentinel::REMOVE => return Some(MemberKind::Remove),
        sentinel::SUBTRACT => return Some(MemberKind::Subtract),
        _ => {}
    }
    let suffix = name.strip_prefix(sentinel::NO_MAP)?;
    let digits = suffix.trim_matches('_');
    if digits.is_empty() {
        return Some(MemberKind::NoMap(0));
    }
    digits.parse().ok().map(MemberKind::NoMap)
}

/// A parsed `/RULE`: patterns to match and actions to take.
#[derive(Debug)]
pub struct ProductionRule {
    anchor: NodeId,
    /// The anchor, the annotation nodes, and every typed member.
    all_nodes: BTreeSet<NodeId>,
    insert_nodes: Vec<NodeId>,
    remove_nodes: Vec<NodeId>,
    subtract_nodes: Vec<NodeId>,
    /// Hard-equality partners per node (`/=`), symmetric.
    equal: FxHashMap<NodeId, BTreeSet<NodeId>>,
    node_to_var: BTreeMap<NodeId, u32>,
    var_to_node: BTreeMap<u32, NodeId>,
    must_pattern: Pattern,
    try_pattern: Pattern,
    never_patterns: BTreeMap<usize, Pattern>,
    /// Snapshot of the slot-0 facts of each rule node at parse time.
    indexed: FxHashMap<NodeId, Vec<Triplet>>,
}

impl ProductionRule {
    /// Parse the rule anchored at `anchor` out of the structure.
    ///
    /// Panics on malformed encodings (a member both `/NO_MAP` and
    /// `/TRY_MAP`, a mapped member that no constraint mentions, an
    /// equality partner that is not a rule node) — these are authoring
    /// errors in the rule subgraph.
    pub fn parse(structure: &Structure, names: &NodeStore, anchor: NodeId) -> Self {
        let rule_sentinel = names.intern(sentinel::RULE);

        let mut all_nodes = BTreeSet::from([anchor]);
        let mut map_nodes: Vec<NodeId> = Vec::new();
        let mut must_nodes: Vec<NodeId> = Vec::new();
        let mut try_nodes: Vec<NodeId> = Vec::new();
        let mut no_map_nodes: FxHashMap<NodeId, usize> = FxHashMap::default();
        let mut insert_nodes: Vec<NodeId> = Vec::new();
        let mut remove_nodes: Vec<NodeId> = Vec::new();
        let mut subtract_nodes: Vec<NodeId> = Vec::new();
        let mut equal: FxHashMap<NodeId, BTreeSet<NodeId>> = FxHashMap::default();
        let mut maybe_equal: FxHashMap<NodeId, BTreeSet<NodeId>> = FxHashMap::default();

        let annotations: Vec<NodeId> = structure
            .lookup(Query::new(None, Some(anchor), Some(rule_sentinel)))
            .iter()
            .map(|fact| fact[0])
            .collect();

        for &annotation in &annotations {
            all_nodes.insert(annotation);
            let mut equal_members: Vec<NodeId> = Vec::new();
            let mut maybe_equal_members: Vec<NodeId> = Vec::new();

            for &fact in structure.lookup(Query::new(Some(annotation), None, None)) {
                let member = fact[1];
                let key_name = match names.resolve(fact[2]) {
                    Some(name) => name,
                    None => continue,
                };
                if key_name == sentinel::EQUAL {
                    equal_members.push(member);
                    continue;
                }
                if key_name == sentinel::MAYBE_EQUAL {
                    maybe_equal_members.push(member);
                    continue;
                }
                let Some(kind) = classify(key_name) else {
                    continue;
                };
                all_nodes.insert(member);
                match kind {
                    MemberKind::Must => must_nodes.push(member),
                    MemberKind::Try => try_nodes.push(member),
                    MemberKind::NoMap(group) => {
                        no_map_nodes.insert(member, group);
                    }
                    MemberKind::Insert => insert_nodes.push(member),
                    MemberKind::Remove => remove_nodes.push(member),
                    MemberKind::Subtract => subtract_nodes.push(member),
                }
                if matches!(
                    kind,
                    MemberKind::Must | MemberKind::Try | MemberKind::NoMap(_)
                ) && !map_nodes.contains(&member)
                {
                    map_nodes.push(member);
                }
            }

            link_pairs(&mut equal, &equal_members);
            link_pairs(&mut maybe_equal, &maybe_equal_members);
        }

        assert!(
            !no_map_nodes.keys().any(|n| try_nodes.contains(n)),
            "rule member marked both /NO_MAP and /TRY_MAP"
        );

        // Assign variables: every rule node gets one, hard-equal nodes
        // share.
        let mut node_to_var: BTreeMap<NodeId, u32> = BTreeMap::new();
        let mut var_to_node: BTreeMap<u32, NodeId> = BTreeMap::new();
        let mut may_equal_vars: FxHashMap<u32, BTreeSet<u32>> = FxHashMap::default();
        for &node in &all_nodes {
            let mut var = node_to_var.len() as u32;
            if let Some(partners) = equal.get(&node) {
                for partner in partners {
                    if let Some(&merged) = node_to_var.get(partner) {
                        var = merged;
                        break;
                    }
                }
            }
            node_to_var.insert(node, var);
            var_to_node.insert(var, node);
            may_equal_vars.entry(var).or_default().insert(var);
        }
        for (node, partners) in &maybe_equal {
            let var = *node_to_var
                .get(node)
                .expect("/MAYBE= names a node outside the rule");
            for partner in partners {
                let partner_var = *node_to_var
                    .get(partner)
                    .expect("/MAYBE= names a node outside the rule");
                may_equal_vars.entry(var).or_default().insert(partner_var);
            }
        }

        // Partition the mapped members' slot-0 facts into patterns.
        let mut must_pattern = Pattern::with_may_equal(may_equal_vars.clone());
        let mut try_pattern = Pattern::with_may_equal(may_equal_vars.clone());
        let mut never_patterns: BTreeMap<usize, Pattern> = BTreeMap::new();
        let mut constrained: BTreeSet<NodeId> = BTreeSet::new();

        for &map_node in &map_nodes {
            for &fact in structure.lookup(Query::new(Some(map_node), None, None)) {
                constrained.extend(fact.nodes());
                let constraint = translate(fact, &node_to_var);
                let nodes = fact.nodes();
                if let Some(group) = nodes.iter().find_map(|n| no_map_nodes.get(n)) {
                    never_patterns
                        .entry(*group)
                        .or_insert_with(|| Pattern::with_may_equal(may_equal_vars.clone()))
                        .add_constraint(constraint);
                } else if nodes.iter().any(|n| try_nodes.contains(n)) {
                    try_pattern.add_constraint(constraint);
                } else if nodes.iter().any(|n| insert_nodes.contains(n)) {
                    // Insert-only facts are produced, never matched.
                } else {
                    assert!(
                        nodes.iter().any(|n| must_nodes.contains(n)),
                        "rule fact {fact:?} touches no mapped member"
                    );
                    must_pattern.add_constraint(constraint);
                }
            }
        }

        assert!(
            map_nodes.iter().all(|n| constrained.contains(n)),
            "a mapped rule member appears in no constraint"
        );

        // Snapshot the rule subgraph's slot-0 facts; the runtime deletes
        // the subgraph after parsing.
        let indexed: FxHashMap<NodeId, Vec<Triplet>> = all_nodes
            .iter()
            .map(|&node| {
                (
                    node,
                    structure
                        .lookup(Query::new(Some(node), None, None))
                        .to_vec(),
                )
            })
            .collect();

        ProductionRule {
            anchor,
            all_nodes,
            insert_nodes,
            remove_nodes,
            subtract_nodes,
            equal,
            node_to_var,
            var_to_node,
            must_pattern,
            try_pattern,
            never_patterns,
            indexed,
        }
    }

    /// The anchor node this rule was parsed from.
    pub fn anchor(&self) -> NodeId {
        self.anchor
    }

    /// Every node belonging to the rule's encoding.
    pub fn all_nodes(&self) -> &BTreeSet<NodeId> {
        &self.all_nodes
    }

    pub fn must_pattern(&self) -> &Pattern {
        &self.must_pattern
    }

    pub fn try_pattern(&self) -> &Pattern {
        &self.try_pattern
    }

    /// The no-map group patterns, by group index.
    pub fn never_patterns(&self) -> impl Iterator<Item = &Pattern> {
        self.never_patterns.values()
    }

    pub fn insert_nodes(&self) -> &[NodeId] {
        &self.insert_nodes
    }

    pub fn remove_nodes(&self) -> &[NodeId] {
        &self.remove_nodes
    }

    pub fn subtract_nodes(&self) -> &[NodeId] {
        &self.subtract_nodes
    }

    /// The variable standing for a rule node, if it has one.
    pub fn var_of(&self, node: NodeId) -> Option<u32> {
        self.node_to_var.get(&node).copied()
    }

    /// The rule-node ↔ variable correspondence, for composing solver
    /// bindings back into node bindings.
    pub fn node_vars(&self) -> impl Iterator<Item = (NodeId, u32)> + '_ {
        self.node_to_var.iter().map(|(&node, &var)| (node, var))
    }

    /// The representative rule node of a variable.
    pub fn node_of_var(&self, var: u32) -> Option<NodeId> {
        self.var_to_node.get(&var).copied()
    }

    /// The hard-equality partners of a node (empty if none declared).
    pub fn equal_partners(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.equal
            .get(&node)
            .into_iter()
            .flat_map(|set| set.iter().copied())
    }

    /// The snapshotted slot-0 facts of a rule node.
    pub fn facts_of(&self, node: NodeId) -> &[Triplet] {
        self.indexed.get(&node).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Record all ordered pairs of distinct members as partners.
fn link_pairs(relation: &mut FxHashMap<NodeId, BTreeSet<NodeId>>, members: &[NodeId]) {
    for &a in members {
        for &b in members {
            if a != b {
                relation.entry(a).or_default().insert(b);
            }
        }
    }
}

/// Turn a fact into a constraint: rule nodes become their variables,
/// everything else stays ground.
fn translate(fact: Triplet, node_to_var: &BTreeMap<NodeId, u32>) -> Constraint {
    let atoms = fact.nodes().map(|node| match node_to_var.get(&node) {
        Some(&var) => Atom::Var(var),
        None => Atom::Node(node),
    });
    Constraint(atoms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_sentinels() {
        assert_eq!(classify("/MUST_MAP"), Some(MemberKind::Must));
        assert_eq!(classify("/TRY_MAP"), Some(MemberKind::Try));
        assert_eq!(classify("/INSERT"), Some(MemberKind::Insert));
        assert_eq!(classify("/REMOVE"), Some(MemberKind::Remove));
        assert_eq!(classify("/SUBTRACT"), Some(MemberKind::Subtract));
        assert_eq!(classify("/NO_MAP"), Some(MemberKind::NoMap(0)));
        assert_eq!(classify("/NO_MAP1"), Some(MemberKind::NoMap(1)));
        assert_eq!(classify("/NO_MAP_2"), Some(MemberKind::NoMap(2)));
        assert_eq!(classify("/RULE"), None);
        assert_eq!(classify("/="), None);
        assert_eq!(classify("/:ordinary"), None);
        assert_eq!(classify("/NO_MAPx"), None);
    }
}

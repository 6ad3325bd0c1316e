//! The rule runtime: extraction and the propose/commit/rollback loop.
//!
//! A [`Runtime`] takes ownership of a structure, parses every `/RULE`
//! encoded in it into a [`ProductionRule`], and deletes the rule subgraphs
//! so rules cannot match each other's encodings. From then on it can
//! *propose*: speculatively apply each match of a rule, capture the
//! resulting [`Delta`], and roll the structure back. The caller (a tactic
//! layer, out of scope here) picks which proposals to accept and applies
//! their deltas.

use crate::apply;
use crate::delta::Delta;
use crate::matcher::{self, RuleMatch};
use crate::names::NodeStore;
use crate::node::{NodeId, Query};
use crate::rule::{sentinel, ProductionRule};
use crate::structure::Structure;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

#[cfg(feature = "tracing")]
use crate::trace::debug;

/// A delta some rule match would like to make, without having made it.
#[derive(Debug, Clone)]
pub struct Proposal {
    /// Rule node → structure node, including nodes minted for `/INSERT`.
    pub binding: BTreeMap<NodeId, NodeId>,
    /// The net change applying the match would cause.
    pub delta: Delta,
}

/// A structure together with the production rules extracted from it.
pub struct Runtime {
    structure: Structure,
    names: Arc<NodeStore>,
    rules: Vec<Arc<ProductionRule>>,
}

impl Runtime {
    /// Parse and extract every rule encoded in `structure`.
    ///
    /// Commits any pending changes, parses each anchor with a
    /// `(_, anchor, /RULE)` fact, deletes the rule subgraphs' facts, and
    /// commits again.
    pub fn new(mut structure: Structure, names: Arc<NodeStore>) -> Self {
        structure.commit();
        let rule_sentinel = names.intern(sentinel::RULE);

        let anchors: BTreeSet<NodeId> = structure
            .lookup(Query::new(None, None, Some(rule_sentinel)))
            .iter()
            .map(|fact| fact[1])
            .collect();
        let rules: Vec<Arc<ProductionRule>> = anchors
            .iter()
            .map(|&anchor| Arc::new(ProductionRule::parse(&structure, &names, anchor)))
            .collect();

        let doomed: BTreeSet<NodeId> = rules
            .iter()
            .flat_map(|rule| rule.all_nodes().iter().copied())
            .collect();
        for &node in &doomed {
            structure.remove_all_facts_about(node);
        }
        structure.commit();

        #[cfg(feature = "tracing")]
        debug!(rules = rules.len(), "runtime_extracted");

        Runtime {
            structure,
            names,
            rules,
        }
    }

    pub fn structure(&self) -> &Structure {
        &self.structure
    }

    pub fn structure_mut(&mut self) -> &mut Structure {
        &mut self.structure
    }

    pub fn names(&self) -> &Arc<NodeStore> {
        &self.names
    }

    /// The extracted rules, in anchor order.
    pub fn rules(&self) -> impl Iterator<Item = &ProductionRule> {
        self.rules.iter().map(Arc::as_ref)
    }

    /// The rule anchored at `anchor`, if any.
    pub fn rule(&self, anchor: NodeId) -> Option<&ProductionRule> {
        self.rules
            .iter()
            .find(|rule| rule.anchor() == anchor)
            .map(Arc::as_ref)
    }

    /// The matches of the rule anchored at `anchor` extending `partial`.
    pub fn matches(
        &self,
        anchor: NodeId,
        partial: &BTreeMap<NodeId, NodeId>,
    ) -> Vec<RuleMatch> {
        let rule = self.rule(anchor).expect("no rule at this anchor");
        matcher::matches(rule, &self.structure, partial)
    }

    /// Propose the deltas the rule anchored at `anchor` could make.
    ///
    /// Each match is applied, committed, captured and rolled back, so the
    /// structure is unchanged afterwards. Matches whose application is a
    /// net no-op propose nothing.
    pub fn propose(
        &mut self,
        anchor: NodeId,
        partial: &BTreeMap<NodeId, NodeId>,
    ) -> Vec<Proposal> {
        assert!(
            self.structure.is_clean(),
            "propose on a structure with uncommitted changes"
        );
        let rule = self
            .rules
            .iter()
            .find(|rule| rule.anchor() == anchor)
            .expect("no rule at this anchor")
            .clone();

        let matches = matcher::matches(&rule, &self.structure, partial);
        let mut proposals = Vec::new();
        for matched in matches {
            let binding =
                apply::execute(&rule, &matched.bindings, &mut self.structure, &self.names);
            let delta = self.structure.commit();
            if !delta.is_empty() {
                proposals.push(Proposal { binding, delta });
            }
            self.structure.rollback_last();
        }
        proposals
    }

    /// Proposals from every rule, in anchor order.
    pub fn propose_all(&mut self) -> Vec<Proposal> {
        let anchors: Vec<NodeId> = self.rules.iter().map(|rule| rule.anchor()).collect();
        let mut proposals = Vec::new();
        for anchor in anchors {
            proposals.extend(self.propose(anchor, &BTreeMap::new()));
        }
        proposals
    }
}

#[cfg(test)]
#[path = "tests/rules.rs"]
mod tests;

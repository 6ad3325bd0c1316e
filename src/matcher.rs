//! Three-pass match enumeration for production rules.
//!
//! Matching runs in the order the rule semantics require:
//!
//! 1. enumerate bindings of the **must** pattern;
//! 2. discard any binding some **no-map group** can extend;
//! 3. extend survivors over the **try** pattern, falling back to the bare
//!    must binding when the try part cannot be satisfied.
//!
//! Every pass compiles fresh solvers against the same structure; nothing
//! is cached across structure edits.

use crate::node::NodeId;
use crate::pattern::Binding;
use crate::rule::ProductionRule;
use crate::structure::Structure;
use std::collections::BTreeMap;

#[cfg(feature = "tracing")]
use crate::trace::debug_span;

/// A satisfying match of a rule: each matched rule node's structure node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleMatch {
    pub bindings: BTreeMap<NodeId, NodeId>,
}

/// Enumerate the rule's matches extending `partial` (rule node →
/// structure node), in deterministic order.
pub fn matches(
    rule: &ProductionRule,
    structure: &Structure,
    partial: &BTreeMap<NodeId, NodeId>,
) -> Vec<RuleMatch> {
    #[cfg(feature = "tracing")]
    let _span = debug_span!("rule_matches", anchor = rule.anchor().raw()).entered();

    // Rekey the partial from rule nodes to pattern tokens; entries for
    // nodes outside the rule are dropped.
    let partial: Binding = partial
        .iter()
        .filter_map(|(&node, &value)| rule.var_of(node).map(|var| (var, value)))
        .collect();

    let mut out = Vec::new();
    for must in rule.must_pattern().solutions(structure, &partial) {
        if excluded(rule, structure, &must) {
            continue;
        }
        let extensions = rule.try_pattern().solutions(structure, &must);
        if rule.try_pattern().has_constraints() && extensions.is_empty() {
            // The optional part failed to map; keep the base match.
            out.push(compose(rule, &must));
            continue;
        }
        for extension in &extensions {
            out.push(compose(rule, extension));
        }
    }
    out
}

/// True iff some no-map group can be extended from this must binding.
fn excluded(rule: &ProductionRule, structure: &Structure, must: &Binding) -> bool {
    rule.never_patterns()
        .any(|never| !never.solutions(structure, must).is_empty())
}

/// Turn a token binding back into a rule-node binding.
fn compose(rule: &ProductionRule, binding: &Binding) -> RuleMatch {
    let bindings = rule
        .node_vars()
        .filter_map(|(node, var)| binding.get(&var).map(|&value| (node, value)))
        .collect();
    RuleMatch { bindings }
}

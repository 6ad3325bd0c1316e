//! The indexed fact store.
//!
//! A structure is a set of [`Triplet`] facts indexed eight ways, one index
//! per subset of the three positions. Every partial-key lookup is a single
//! hash probe: the bucket keyed by a fact masked onto subset `S` holds all
//! facts agreeing with it at the positions in `S`, and the all-hole bucket
//! holds every fact. A ninth index lists the facts touching each node.
//!
//! Mutations are journaled into an uncommitted buffer [`Delta`]; see
//! [`crate::delta`] for the commit/rollback machinery.

use crate::delta::Delta;
use crate::node::{NodeId, Query, Triplet};
use hashbrown::HashMap;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

#[cfg(feature = "tracing")]
use crate::trace::trace;

/// The indexed, mutable fact store.
pub struct Structure {
    /// One bucket per masked key. Buckets keep insertion order; empty
    /// buckets are pruned, so a missing key and an empty bucket are the
    /// same thing.
    buckets: HashMap<Query, Vec<Triplet>>,
    /// Facts touching each node, once per distinct node in the fact.
    by_node: FxHashMap<NodeId, Vec<Triplet>>,
    /// Uncommitted changes.
    buffer: Delta,
    /// Committed history.
    path: Vec<Delta>,
}

impl Structure {
    /// Create an empty structure.
    pub fn new() -> Self {
        Structure {
            buckets: HashMap::new(),
            by_node: FxHashMap::default(),
            buffer: Delta::new(),
            path: Vec::new(),
        }
    }

    /// Number of facts currently stored.
    pub fn len(&self) -> usize {
        self.lookup(Query::ANY).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All facts, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = Triplet> + '_ {
        self.lookup(Query::ANY).iter().copied()
    }

    /// Add a fact, indexing it in all buckets.
    ///
    /// Panics if the fact is already present; adding a duplicate is a
    /// contract violation. Use [`Structure::ensure_fact`] for idempotent
    /// insertion.
    pub fn add_fact(&mut self, fact: Triplet) {
        assert!(!self.is_true(fact), "add_fact: duplicate fact {fact:?}");
        self.index_fact(fact);
        self.buffer.record_add(fact);
        #[cfg(feature = "tracing")]
        trace!(?fact, "add_fact");
    }

    /// Remove a fact from all buckets.
    ///
    /// Panics if the fact is absent; removing a missing fact is a contract
    /// violation. Use [`Structure::retract_fact`] for idempotent removal.
    pub fn remove_fact(&mut self, fact: Triplet) {
        assert!(self.is_true(fact), "remove_fact: absent fact {fact:?}");
        self.unindex_fact(fact);
        self.buffer.record_remove(fact);
        #[cfg(feature = "tracing")]
        trace!(?fact, "remove_fact");
    }

    /// Add a fact unless it is already present. Returns whether it was added.
    pub fn ensure_fact(&mut self, fact: Triplet) -> bool {
        if self.is_true(fact) {
            return false;
        }
        self.add_fact(fact);
        true
    }

    /// Remove a fact if it is present. Returns whether it was removed.
    pub fn retract_fact(&mut self, fact: Triplet) -> bool {
        if !self.is_true(fact) {
            return false;
        }
        self.remove_fact(fact);
        true
    }

    /// True iff the fact is stored.
    pub fn is_true(&self, fact: Triplet) -> bool {
        !self.lookup(fact.key()).is_empty()
    }

    /// True iff every fact in the slice is stored.
    pub fn all_true(&self, facts: &[Triplet]) -> bool {
        facts.iter().all(|&fact| self.is_true(fact))
    }

    /// All stored facts matching the key, in insertion order.
    ///
    /// The returned slice aliases internal storage; do not mutate the
    /// structure while holding it.
    pub fn lookup(&self, key: Query) -> &[Triplet] {
        self.buckets.get(&key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All facts with `node` in at least one position, in insertion order.
    pub fn facts_about(&self, node: NodeId) -> &[Triplet] {
        self.by_node.get(&node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Remove every fact that mentions `node`.
    pub fn remove_all_facts_about(&mut self, node: NodeId) {
        let doomed: Vec<Triplet> = self.facts_about(node).to_vec();
        for fact in doomed {
            self.remove_fact(fact);
        }
    }

    // ---- change journal ----

    /// True iff there are no uncommitted changes.
    pub fn is_clean(&self) -> bool {
        self.buffer.is_empty()
    }

    /// The uncommitted changes.
    pub fn buffer(&self) -> &Delta {
        &self.buffer
    }

    /// Number of committed deltas on the history path.
    pub fn epoch(&self) -> usize {
        self.path.len()
    }

    /// The committed history, oldest first.
    pub fn history(&self) -> &[Delta] {
        &self.path
    }

    /// Commit the buffer onto the history path, returning the committed
    /// delta (possibly empty).
    pub fn commit(&mut self) -> Delta {
        let delta = std::mem::take(&mut self.buffer);
        self.path.push(delta.clone());
        delta
    }

    /// Undo all uncommitted changes.
    pub fn rollback_buffer(&mut self) {
        let delta = std::mem::take(&mut self.buffer);
        self.revert_unjournaled(&delta);
    }

    /// Undo the buffer and pop committed deltas until `epoch` remain.
    pub fn rollback_to(&mut self, epoch: usize) {
        assert!(
            epoch <= self.path.len(),
            "rollback_to: epoch {epoch} is in the future (path has {})",
            self.path.len()
        );
        self.rollback_buffer();
        while self.path.len() > epoch {
            let delta = self.path.pop().expect("path is non-empty");
            self.revert_unjournaled(&delta);
        }
    }

    /// Undo the buffer and the most recent commit.
    pub fn rollback_last(&mut self) {
        assert!(!self.path.is_empty(), "rollback_last: no committed delta");
        self.rollback_to(self.path.len() - 1);
    }

    /// Discard the buffer without undoing its changes.
    pub(crate) fn force_clean(&mut self) {
        self.buffer = Delta::new();
    }

    /// Install `delta` as the most recent commit, discarding the buffer.
    /// Used by [`Delta::apply`], which has already replayed the changes.
    pub(crate) fn adopt(&mut self, delta: Delta) {
        self.force_clean();
        self.path.push(delta);
    }

    // ---- indexing ----

    fn index_fact(&mut self, fact: Triplet) {
        for subset in 0..8u8 {
            self.buckets
                .entry(fact.masked(subset))
                .or_default()
                .push(fact);
        }
        let mut seen: SmallVec<[NodeId; 3]> = SmallVec::new();
        for node in fact.nodes() {
            if !seen.contains(&node) {
                seen.push(node);
                self.by_node.entry(node).or_default().push(fact);
            }
        }
    }

    fn unindex_fact(&mut self, fact: Triplet) {
        for subset in 0..8u8 {
            let key = fact.masked(subset);
            let bucket = self
                .buckets
                .get_mut(&key)
                .expect("stored fact missing from a bucket");
            let at = bucket
                .iter()
                .position(|&f| f == fact)
                .expect("stored fact missing from a bucket");
            bucket.remove(at);
            if bucket.is_empty() {
                self.buckets.remove(&key);
            }
        }
        let mut seen: SmallVec<[NodeId; 3]> = SmallVec::new();
        for node in fact.nodes() {
            if seen.contains(&node) {
                continue;
            }
            seen.push(node);
            let list = self
                .by_node
                .get_mut(&node)
                .expect("stored fact missing from the node index");
            let at = list
                .iter()
                .position(|&f| f == fact)
                .expect("stored fact missing from the node index");
            list.remove(at);
            if list.is_empty() {
                self.by_node.remove(&node);
            }
        }
    }

    /// Replay or undo a delta without journaling, for rollback.
    fn revert_unjournaled(&mut self, delta: &Delta) {
        for fact in delta.added() {
            self.unindex_fact(fact);
        }
        for fact in delta.removed() {
            self.index_fact(fact);
        }
    }
}

impl Default for Structure {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "tests/structure.rs"]
mod tests;

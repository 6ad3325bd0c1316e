use crate::names::NodeStore;
use crate::node::{Atom, NodeId, Triplet};
use crate::structure::Structure;
use std::sync::Arc;

pub(crate) fn setup() -> (Arc<NodeStore>, Structure) {
    (Arc::new(NodeStore::new()), Structure::new())
}

pub(crate) fn fact(names: &NodeStore, a: &str, b: &str, c: &str) -> Triplet {
    Triplet::new(names.intern(a), names.intern(b), names.intern(c))
}

pub(crate) fn add(structure: &mut Structure, names: &NodeStore, a: &str, b: &str, c: &str) {
    structure.add_fact(fact(names, a, b, c));
}

pub(crate) fn var(index: u32) -> Atom {
    Atom::Var(index)
}

pub(crate) fn ground(node: NodeId) -> Atom {
    Atom::Node(node)
}

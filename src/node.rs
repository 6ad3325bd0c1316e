use std::fmt;
use std::num::NonZeroU32;
use std::ops::{Index, IndexMut};

/// Identity of a node in a triplet structure.
///
/// Node identities are opaque positive integers minted by the caller (or by
/// a [`NodeStore`](crate::names::NodeStore)). Zero is reserved as the "any
/// value" hole in lookup keys and can never be a node, which is what the
/// `NonZeroU32` encodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(NonZeroU32);

impl NodeId {
    /// Create a node identity from its raw value. Returns `None` for 0.
    pub fn new(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(NodeId)
    }

    /// Get the raw positive integer value.
    pub fn raw(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An ordered 3-tuple of nodes: one fact in a structure.
///
/// Order is significant; `(a, b, c)` and `(c, b, a)` are unrelated facts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Triplet([NodeId; 3]);

impl Triplet {
    pub fn new(a: NodeId, b: NodeId, c: NodeId) -> Self {
        Triplet([a, b, c])
    }

    /// The three positions in order.
    pub fn nodes(self) -> [NodeId; 3] {
        self.0
    }

    /// Project the fact onto a subset of positions, producing a lookup key.
    ///
    /// Bit `j` of `subset` keeps position `j`; cleared bits become holes.
    /// `subset` ranges over `0..8`, one value per index bucket.
    pub fn masked(self, subset: u8) -> Query {
        let mut key = [None; 3];
        for (j, slot) in key.iter_mut().enumerate() {
            if (subset >> j) & 1 == 1 {
                *slot = Some(self.0[j]);
            }
        }
        Query(key)
    }

    /// The fully-specified key selecting exactly this fact.
    pub fn key(self) -> Query {
        self.masked(0b111)
    }
}

impl Index<usize> for Triplet {
    type Output = NodeId;

    fn index(&self, i: usize) -> &NodeId {
        &self.0[i]
    }
}

/// A partial lookup key: each position is a node or a hole (`None`).
///
/// A key matches every stored fact that agrees with it at all non-hole
/// positions; the all-hole key matches everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Query([Option<NodeId>; 3]);

impl Query {
    /// The all-hole key, matching every fact.
    pub const ANY: Query = Query([None; 3]);

    pub fn new(a: Option<NodeId>, b: Option<NodeId>, c: Option<NodeId>) -> Self {
        Query([a, b, c])
    }

    /// The positions in order.
    pub fn slots(self) -> [Option<NodeId>; 3] {
        self.0
    }

    /// True iff `fact` agrees with this key at every non-hole position.
    pub fn matches(self, fact: Triplet) -> bool {
        self.0
            .iter()
            .zip(fact.nodes())
            .all(|(slot, node)| slot.map_or(true, |want| want == node))
    }
}

impl From<Triplet> for Query {
    fn from(fact: Triplet) -> Self {
        fact.key()
    }
}

/// One position of a constraint: a ground node or a variable to solve for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Atom {
    /// A ground node that must match exactly.
    Node(NodeId),
    /// A variable, identified by its index.
    Var(u32),
}

impl Atom {
    pub fn is_var(self) -> bool {
        matches!(self, Atom::Var(_))
    }

    pub fn as_node(self) -> Option<NodeId> {
        match self {
            Atom::Node(n) => Some(n),
            Atom::Var(_) => None,
        }
    }

    pub fn as_var(self) -> Option<u32> {
        match self {
            Atom::Node(_) => None,
            Atom::Var(v) => Some(v),
        }
    }
}

/// A constraint triplet: three positions, each a node or a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Constraint(pub [Atom; 3]);

impl Constraint {
    pub fn new(a: Atom, b: Atom, c: Atom) -> Self {
        Constraint([a, b, c])
    }

    pub fn atoms(self) -> [Atom; 3] {
        self.0
    }

    /// True iff no position is a variable.
    pub fn is_ground(self) -> bool {
        self.0.iter().all(|a| !a.is_var())
    }

    /// The fact this constraint denotes, if it is fully ground.
    pub fn ground(self) -> Option<Triplet> {
        match self.0 {
            [Atom::Node(a), Atom::Node(b), Atom::Node(c)] => Some(Triplet::new(a, b, c)),
            _ => None,
        }
    }
}

impl Index<usize> for Constraint {
    type Output = Atom;

    fn index(&self, i: usize) -> &Atom {
        &self.0[i]
    }
}

impl IndexMut<usize> for Constraint {
    fn index_mut(&mut self, i: usize) -> &mut Atom {
        &mut self.0[i]
    }
}

use crate::node::NodeId;
use lasso::{Key, Spur, ThreadedRodeo};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

/// Interning store mapping node names to [`NodeId`]s.
///
/// Guarantees:
/// - Same name always produces the same NodeId
/// - Different names always produce different NodeIds
/// - A NodeId can be resolved back to its name
///
/// Interned identities are permanent; there is no way to forget a name.
/// The store also carries optional display names for user-facing printouts
/// and can mint fresh names for nodes produced by rule application.
pub struct NodeStore {
    rodeo: ThreadedRodeo,
    display: RwLock<FxHashMap<NodeId, String>>,
}

impl NodeStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            rodeo: ThreadedRodeo::new(),
            display: RwLock::new(FxHashMap::default()),
        }
    }

    /// Intern a node name, returning its NodeId.
    /// If the name was already interned, returns the existing NodeId.
    pub fn intern(&self, name: &str) -> NodeId {
        node_of(self.rodeo.get_or_intern(name))
    }

    /// Get the NodeId for a name if it exists, without interning.
    pub fn get(&self, name: &str) -> Option<NodeId> {
        self.rodeo.get(name).map(node_of)
    }

    /// Check if a name has already been interned.
    pub fn contains(&self, name: &str) -> bool {
        self.rodeo.contains(name)
    }

    /// Resolve a NodeId back to its name.
    /// Returns None if the NodeId was not minted by this store.
    pub fn resolve(&self, node: NodeId) -> Option<&str> {
        let spur = Spur::try_from_usize((node.raw() - 1) as usize)?;
        self.rodeo.try_resolve(&spur)
    }

    /// Intern the first unused name of the form `base:0`, `base:1`, …
    ///
    /// This is the gensym used for nodes minted by rule application; the
    /// numbering makes repeated mints from one base distinguishable.
    pub fn fresh(&self, base: &str) -> NodeId {
        for counter in 0u64.. {
            let candidate = format!("{base}:{counter}");
            if !self.rodeo.contains(&candidate) {
                return self.intern(&candidate);
            }
        }
        unreachable!("ran out of fresh names")
    }

    /// Set the display name used in printouts for a node.
    pub fn set_display(&self, node: NodeId, display: &str) {
        self.display.write().insert(node, display.to_string());
    }

    /// The display name for a node: the assigned one, the interned name,
    /// or the raw id for foreign nodes.
    pub fn display(&self, node: NodeId) -> String {
        if let Some(display) = self.display.read().get(&node) {
            return display.clone();
        }
        match self.resolve(node) {
            Some(name) => name.to_string(),
            None => node.to_string(),
        }
    }

    /// Number of interned names.
    pub fn len(&self) -> usize {
        self.rodeo.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rodeo.is_empty()
    }
}

impl Default for NodeStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Spur keys count from zero; node ids are positive, so shift by one.
fn node_of(spur: Spur) -> NodeId {
    NodeId::new(spur.into_usize() as u32 + 1).expect("spur + 1 is nonzero")
}

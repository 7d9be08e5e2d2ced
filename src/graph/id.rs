use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a node inside one graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Monotonic id source owned by whoever creates nodes (normally the `Graph`)
#[derive(Debug, Clone, Default)]
pub struct NodeIdGenerator {
    next: u64,
}

impl NodeIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start counting at `first`
    pub fn starting_at(first: u64) -> Self {
        Self { next: first }
    }

    pub fn next_id(&mut self) -> NodeId {
        let id = NodeId(self.next);
        self.next = self.next.saturating_add(1);
        id
    }

    /// Make sure ids handed out later never collide with `id`
    pub fn observe(&mut self, id: NodeId) {
        if id.0 >= self.next {
            self.next = id.0.saturating_add(1);
        }
    }
}

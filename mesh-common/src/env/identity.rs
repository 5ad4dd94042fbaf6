use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::{address::HwAddress, utils::NodeId};

/// Who a node is and whom it talks to. Immutable once the node starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeIdentity {
    pub id: NodeId,
    pub hw_address: HwAddress,
    pub neighbors: BTreeSet<NodeId>,
    /// Destination id -> next-hop id. Empty means "direct only".
    #[serde(default)]
    pub routes: HashMap<NodeId, NodeId>,
}

impl NodeIdentity {
    pub fn new(id: NodeId, hw_address: HwAddress) -> Self {
        Self {
            id,
            hw_address,
            neighbors: BTreeSet::new(),
            routes: HashMap::new(),
        }
    }

    pub fn with_neighbors<I: IntoIterator<Item = NodeId>>(mut self, neighbors: I) -> Self {
        self.neighbors.extend(neighbors);
        self.neighbors.remove(&self.id);
        self
    }

    pub fn with_route(mut self, dst: NodeId, next_hop: NodeId) -> Self {
        self.routes.insert(dst, next_hop);
        self
    }

    pub fn is_neighbor(&self, id: &NodeId) -> bool {
        self.neighbors.contains(id)
    }
}

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use mesh_common::{HwAddress, MeshError, NodeId, NodeIdentity, Result};
use mesh_consensus::ConsensusParams;
use mesh_p2p::{AddressBook, RetryPolicy};

/// Per-node entry of the topology file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default, alias = "neighbors")]
    pub neighbours: Vec<NodeId>,
    #[serde(default)]
    pub value: f64,
}

/// Runtime tunables. Every field has a default so a config file may omit the
/// whole section or any part of it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSettings {
    pub sigma: f64,
    pub rounds: u64,
    #[serde(with = "mesh_common::utils::duration_ms")]
    pub round_timeout: Duration,
    #[serde(with = "mesh_common::utils::duration_ms")]
    pub poll_interval: Duration,
    #[serde(with = "mesh_common::utils::duration_ms")]
    pub exchange_timeout: Duration,
    pub ack_enabled: bool,
    pub retry: RetryPolicy,
    pub dedup_capacity: Option<usize>,
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            sigma: 0.1,
            rounds: 30,
            round_timeout: Duration::from_secs(2),
            poll_interval: Duration::from_millis(100),
            exchange_timeout: Duration::from_secs(4),
            ack_enabled: true,
            retry: RetryPolicy::default(),
            dedup_capacity: None,
        }
    }
}

impl NodeSettings {
    pub fn consensus_params(&self) -> ConsensusParams {
        ConsensusParams {
            sigma: self.sigma,
            rounds: self.rounds,
            round_timeout: self.round_timeout,
        }
    }
}

/// The whole mesh as described by one JSON file. Loaded once, read-only after.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeshConfig {
    pub id_to_addr: BTreeMap<NodeId, HwAddress>,
    #[serde(default)]
    pub nodes: BTreeMap<NodeId, NodeConfig>,
    /// Source id -> (destination id -> next-hop id).
    #[serde(default)]
    pub routes: BTreeMap<NodeId, HashMap<NodeId, NodeId>>,
    /// UDP endpoint per node, for running the mesh over IP.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub endpoints: BTreeMap<NodeId, SocketAddr>,
    #[serde(default)]
    pub settings: NodeSettings,
}

impl MeshConfig {
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .map_err(|e| MeshError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let config = serde_json::from_str(&data)
            .map_err(|e| MeshError::Config(format!("invalid {}: {}", path.display(), e)))?;
        Ok(config)
    }

    pub fn address_book(&self) -> AddressBook {
        self.id_to_addr
            .iter()
            .map(|(id, addr)| (id.clone(), *addr))
            .collect()
    }

    /// Ids with a `nodes` entry, in order.
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.keys().cloned().collect()
    }

    pub fn initial_value(&self, id: &NodeId) -> f64 {
        self.nodes.get(id).map(|n| n.value).unwrap_or_default()
    }

    /// Builds and validates the identity of `id`. Every neighbour, route
    /// destination and next hop must have a hardware address.
    pub fn identity(&self, id: &NodeId) -> Result<NodeIdentity> {
        let hw = self
            .id_to_addr
            .get(id)
            .copied()
            .ok_or_else(|| MeshError::Config(format!("unknown node id '{}'", id)))?;

        let entry = self.nodes.get(id).cloned().unwrap_or_default();
        for n in &entry.neighbours {
            if !self.id_to_addr.contains_key(n) {
                return Err(MeshError::Config(format!(
                    "node '{}': neighbour '{}' has no address",
                    id, n
                )));
            }
        }

        let mut identity = NodeIdentity::new(id.clone(), hw).with_neighbors(entry.neighbours);
        if let Some(routes) = self.routes.get(id) {
            for (dst, next_hop) in routes {
                for hop in [dst, next_hop] {
                    if !self.id_to_addr.contains_key(hop) {
                        return Err(MeshError::Config(format!(
                            "node '{}': route {} -> {} references unknown node '{}'",
                            id, dst, next_hop, hop
                        )));
                    }
                }
                identity = identity.with_route(dst.clone(), next_hop.clone());
            }
        }
        Ok(identity)
    }

    /// Hardware address -> UDP endpoint for every node with both.
    pub fn peer_endpoints(&self) -> HashMap<HwAddress, SocketAddr> {
        self.endpoints
            .iter()
            .filter_map(|(id, ep)| self.id_to_addr.get(id).map(|hw| (*hw, *ep)))
            .collect()
    }

    pub fn endpoint(&self, id: &NodeId) -> Result<SocketAddr> {
        self.endpoints
            .get(id)
            .copied()
            .ok_or_else(|| MeshError::Config(format!("node '{}' has no endpoint", id)))
    }

    /// Largest neighbour count across the mesh.
    pub fn max_degree(&self) -> usize {
        self.nodes
            .iter()
            .map(|(id, n)| n.neighbours.iter().filter(|x| *x != id).collect::<BTreeSet<_>>().len())
            .max()
            .unwrap_or(0)
    }
}

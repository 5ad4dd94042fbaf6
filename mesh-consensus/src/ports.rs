use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use async_trait::async_trait;

use mesh_common::NodeId;

/// What the consensus engine needs from the node it runs on.
#[async_trait]
pub trait RoundLink: Send + Sync {
    /// Sends this node's value for `round` to one neighbour.
    async fn send_value(&self, round: u64, neighbor: &NodeId, value: f64) -> Result<(), String>;

    /// Waits until every neighbour's value for `round` has arrived or `timeout`
    /// elapses, then retires the round and returns what was collected.
    async fn collect_round(
        &self,
        round: u64,
        neighbors: &BTreeSet<NodeId>,
        timeout: Duration,
    ) -> HashMap<NodeId, f64>;
}

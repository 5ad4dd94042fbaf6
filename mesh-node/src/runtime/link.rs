use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use mesh_common::{MessageEnvelope, NodeId};
use mesh_consensus::RoundLink;

use crate::runtime::shared::NodeShared;

/// Connects the consensus engine to a running node.
pub(crate) struct RuntimeLink {
    pub shared: Arc<NodeShared>,
}

#[async_trait]
impl RoundLink for RuntimeLink {
    async fn send_value(&self, round: u64, neighbor: &NodeId, value: f64) -> Result<(), String> {
        let envelope = MessageEnvelope::val(round, self.shared.me().clone(), neighbor.clone(), value);
        self.shared
            .router
            .send_to_node(neighbor, &envelope)
            .await
            .map_err(|e| e.to_string())
    }

    async fn collect_round(
        &self,
        round: u64,
        neighbors: &BTreeSet<NodeId>,
        timeout: Duration,
    ) -> HashMap<NodeId, f64> {
        let deadline = Instant::now() + timeout;
        self.shared
            .wait_until(deadline, |state| state.rounds.has_all(round, neighbors))
            .await;
        self.shared.state.lock().await.rounds.retire(round)
    }
}

use std::sync::Arc;

use futures::future::join_all;
use tracing::info;

use mesh_common::{MeshError, Result};
use mesh_consensus::ConsensusReport;
use mesh_p2p::InMemoryHub;

use crate::config::{MeshConfig, NodeSettings};
use crate::runtime::builder::build_runtime;
use crate::runtime::node::NodeRuntime;

#[derive(Debug, Clone)]
pub struct SimulationReport {
    pub reports: Vec<ConsensusReport>,
    /// Mean of the initial values, the fixed point of the iteration.
    pub initial_mean: f64,
}

impl SimulationReport {
    pub fn final_mean(&self) -> f64 {
        if self.reports.is_empty() {
            return 0.0;
        }
        self.reports.iter().map(|r| r.final_value).sum::<f64>() / self.reports.len() as f64
    }

    /// Largest distance between any final value and the initial mean.
    pub fn max_deviation(&self) -> f64 {
        self.reports
            .iter()
            .map(|r| (r.final_value - self.initial_mean).abs())
            .fold(0.0, f64::max)
    }
}

/// Runs every node of `config` in this process over an in-memory hub and
/// returns each node's consensus report, ordered by node id.
pub async fn simulate(config: &MeshConfig, settings: NodeSettings) -> Result<SimulationReport> {
    simulate_on(&InMemoryHub::new(), config, settings).await
}

/// Like [`simulate`], on a caller-provided hub so links can be cut or lossy.
pub async fn simulate_on(hub: &InMemoryHub, config: &MeshConfig, settings: NodeSettings) -> Result<SimulationReport> {
    let ids = config.node_ids();
    if ids.is_empty() {
        return Err(MeshError::Config("no nodes to simulate".to_string()));
    }

    let mut nodes: Vec<NodeRuntime> = Vec::with_capacity(ids.len());
    for id in &ids {
        let hw = config.identity(id)?.hw_address;
        let node = build_runtime(config, id, Arc::new(hub.transport(hw)), settings)?;
        node.start().await?;
        nodes.push(node);
    }

    let initial_mean = ids.iter().map(|id| config.initial_value(id)).sum::<f64>() / ids.len() as f64;
    info!(
        "simulating {} nodes, sigma={} rounds={} initial mean={:.6}",
        ids.len(),
        settings.sigma,
        settings.rounds,
        initial_mean
    );

    let runs = nodes
        .iter()
        .zip(ids.iter())
        .map(|(node, id)| node.run_consensus(config.initial_value(id)));
    let reports = join_all(runs).await;

    for node in &nodes {
        node.stop().await?;
    }
    Ok(SimulationReport {
        reports,
        initial_mean,
    })
}

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use mesh_common::NodeId;

use crate::consensus::state::{ConsensusState, RoundOutcome, RoundStatus};
use crate::ports::RoundLink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnginePhase {
    Idle,
    Broadcasting(u64),
    AwaitingNeighbors(u64),
    Updating(u64),
    Finished,
}

impl fmt::Display for EnginePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnginePhase::Idle => write!(f, "idle"),
            EnginePhase::Broadcasting(k) => write!(f, "broadcasting k={k}"),
            EnginePhase::AwaitingNeighbors(k) => write!(f, "awaiting k={k}"),
            EnginePhase::Updating(k) => write!(f, "updating k={k}"),
            EnginePhase::Finished => write!(f, "finished"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusReport {
    pub node_id: NodeId,
    pub final_value: f64,
    pub rounds: Vec<RoundOutcome>,
}

impl ConsensusReport {
    pub fn completed_rounds(&self) -> usize {
        self.rounds
            .iter()
            .filter(|r| r.status == RoundStatus::Completed)
            .count()
    }

    pub fn partial_rounds(&self) -> usize {
        self.rounds.len() - self.completed_rounds()
    }
}

/// Drives a [`ConsensusState`] through its round budget over a [`RoundLink`].
pub struct ConsensusEngine<L: RoundLink> {
    node_id: NodeId,
    link: L,
    state: ConsensusState,
    phase: EnginePhase,
    history: Vec<RoundOutcome>,
}

impl<L: RoundLink> ConsensusEngine<L> {
    pub fn new(node_id: NodeId, link: L, state: ConsensusState) -> Self {
        Self {
            node_id,
            link,
            state,
            phase: EnginePhase::Idle,
            history: Vec::new(),
        }
    }

    pub fn phase(&self) -> EnginePhase {
        self.phase
    }

    pub fn state(&self) -> &ConsensusState {
        &self.state
    }

    /// Runs one full round. Returns `None` once the budget is spent.
    pub async fn step(&mut self) -> Option<RoundOutcome> {
        if self.state.is_finished() {
            self.phase = EnginePhase::Finished;
            return None;
        }
        let k = self.state.round();
        let value = self.state.value();

        self.phase = EnginePhase::Broadcasting(k);
        for neighbor in self.state.neighbors().iter() {
            // A lost VAL only makes the neighbour's round partial.
            if let Err(e) = self.link.send_value(k, neighbor, value).await {
                warn!("[{}] VAL k={} to {} failed: {}", self.node_id, k, neighbor, e);
            }
        }

        self.phase = EnginePhase::AwaitingNeighbors(k);
        let timeout = self.state.params().round_timeout;
        let received = self
            .link
            .collect_round(k, self.state.neighbors(), timeout)
            .await;

        self.phase = EnginePhase::Updating(k);
        let outcome = self.state.apply_round(&received);

        match outcome.status {
            RoundStatus::Completed => {
                debug!(
                    "[{}] round {} complete: {:.6} -> {:.6}",
                    self.node_id, k, outcome.value_before, outcome.value_after
                );
            }
            RoundStatus::Partial => {
                warn!(
                    "[{}] round {} partial ({}/{}), keeping {:.6}",
                    self.node_id, k, outcome.received, outcome.expected, outcome.value_after
                );
            }
        }
        info!(
            target: "consensus",
            "EVENT:ROUND node={} k={} status={:?} received={}/{} value={:.6}",
            self.node_id, k, outcome.status, outcome.received, outcome.expected, outcome.value_after
        );

        self.history.push(outcome.clone());
        if self.state.is_finished() {
            self.phase = EnginePhase::Finished;
        }
        Some(outcome)
    }

    pub async fn run(mut self) -> ConsensusReport {
        info!(
            "[{}] consensus start value={:.6} neighbours={} rounds={}",
            self.node_id,
            self.state.value(),
            self.state.neighbors().len(),
            self.state.params().rounds
        );
        while self.step().await.is_some() {}

        let final_value = self.state.value();
        info!(target: "consensus", "EVENT:FINAL node={} value={:.6}", self.node_id, final_value);
        ConsensusReport {
            node_id: self.node_id,
            final_value,
            rounds: self.history,
        }
    }
}

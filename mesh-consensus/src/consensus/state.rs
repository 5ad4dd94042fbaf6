use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use mesh_common::NodeId;

/// Tunables shared by every node of a run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConsensusParams {
    /// Gain σ. Stable for `0 < σ < 1 / max_degree`.
    pub sigma: f64,
    pub rounds: u64,
    #[serde(with = "mesh_common::utils::duration_ms")]
    pub round_timeout: Duration,
}

impl Default for ConsensusParams {
    fn default() -> Self {
        Self {
            sigma: 0.1,
            rounds: 30,
            round_timeout: Duration::from_secs(2),
        }
    }
}

impl ConsensusParams {
    /// Largest σ (exclusive) for which the iteration converges on a graph
    /// with the given maximum degree.
    pub fn stable_sigma_bound(max_degree: usize) -> f64 {
        if max_degree == 0 {
            f64::INFINITY
        } else {
            1.0 / max_degree as f64
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoundStatus {
    /// Every neighbour answered; the update was applied.
    Completed,
    /// Some neighbour was missing at the deadline; value left unchanged.
    Partial,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundOutcome {
    pub round: u64,
    pub status: RoundStatus,
    pub received: usize,
    pub expected: usize,
    pub value_before: f64,
    pub value_after: f64,
}

/// `value + σ · Σ (neighbour − value)`.
pub fn laplacian_step<I: IntoIterator<Item = f64>>(value: f64, sigma: f64, neighbor_values: I) -> f64 {
    let sum: f64 = neighbor_values.into_iter().map(|v| v - value).sum();
    value + sigma * sum
}

/// Local consensus state. The value changes only in [`ConsensusState::apply_round`].
#[derive(Debug, Clone)]
pub struct ConsensusState {
    value: f64,
    params: ConsensusParams,
    neighbors: BTreeSet<NodeId>,
    round: u64,
}

impl ConsensusState {
    pub fn new(initial_value: f64, neighbors: BTreeSet<NodeId>, params: ConsensusParams) -> Self {
        Self {
            value: initial_value,
            params,
            neighbors,
            round: 0,
        }
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    /// Index of the next round to run.
    pub fn round(&self) -> u64 {
        self.round
    }

    pub fn params(&self) -> &ConsensusParams {
        &self.params
    }

    pub fn neighbors(&self) -> &BTreeSet<NodeId> {
        &self.neighbors
    }

    pub fn is_finished(&self) -> bool {
        self.round >= self.params.rounds
    }

    /// Closes the current round with whatever was collected and advances.
    ///
    /// Values from senders outside the neighbour set are ignored. If any
    /// neighbour is missing the value is left untouched.
    pub fn apply_round(&mut self, received: &HashMap<NodeId, f64>) -> RoundOutcome {
        let got: Vec<f64> = self
            .neighbors
            .iter()
            .filter_map(|n| received.get(n).copied())
            .collect();

        let value_before = self.value;
        let status = if got.len() == self.neighbors.len() {
            self.value = laplacian_step(self.value, self.params.sigma, got.iter().copied());
            RoundStatus::Completed
        } else {
            RoundStatus::Partial
        };

        let outcome = RoundOutcome {
            round: self.round,
            status,
            received: got.len(),
            expected: self.neighbors.len(),
            value_before,
            value_after: self.value,
        };
        self.round += 1;
        outcome
    }
}

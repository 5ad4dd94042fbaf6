use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

use mesh_common::NodeId;
use mesh_p2p::udp::DEFAULT_MAX_FRAME;

use crate::config::NodeSettings;

#[derive(Parser, Debug)]
#[command(name = "mesh-node")]
#[command(about = "Mesh radio node: multi-hop messaging and distributed averaging")]
pub struct Args {
    /// Logical id of this node
    #[arg(long, global = true)]
    pub id: Option<String>,

    /// Mesh topology file
    #[arg(long, global = true, default_value = "mesh.json")]
    pub config: PathBuf,

    /// Consensus gain
    #[arg(long, global = true)]
    pub sigma: Option<f64>,

    /// Number of consensus rounds
    #[arg(long, global = true)]
    pub rounds: Option<u64>,

    /// Per-round wait, in seconds
    #[arg(long, global = true)]
    pub timeout: Option<f64>,

    /// Transmit attempts per frame
    #[arg(long, global = true)]
    pub retries: Option<u32>,

    /// Delay between transmit attempts, in seconds
    #[arg(long, global = true)]
    pub retry_delay: Option<f64>,

    /// Disable end-to-end ACKs
    #[arg(long, global = true)]
    pub no_ack: bool,

    /// Largest frame the transport accepts, in bytes
    #[arg(long, global = true, default_value_t = DEFAULT_MAX_FRAME)]
    pub max_frame: usize,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Serve the mesh (forward, acknowledge, reply) until Ctrl+C
    Listen,
    /// Run the consensus rounds and print the final value
    Consensus {
        /// Start from this value instead of the configured one
        #[arg(long)]
        value: Option<f64>,
    },
    /// Send one message and wait for its reply
    Send {
        #[arg(long)]
        dst: String,
        #[arg(long)]
        message: String,
        /// Reply wait, in seconds
        #[arg(long)]
        wait: Option<f64>,
    },
    /// Repeated send-and-wait with round-trip timing
    Probe {
        #[arg(long)]
        dst: String,
        #[arg(long, default_value_t = 10)]
        count: u32,
        #[arg(long, default_value_t = 32)]
        payload_size: usize,
        #[arg(long)]
        wait: Option<f64>,
    },
    /// Run every configured node in-process and report the outcome
    Simulate,
}

impl Args {
    pub fn node_id(&self) -> Option<NodeId> {
        self.id.as_deref().map(NodeId::from)
    }

    /// Applies command-line overrides on top of `base`.
    pub fn settings(&self, base: NodeSettings) -> NodeSettings {
        let mut s = base;
        if let Some(sigma) = self.sigma {
            s.sigma = sigma;
        }
        if let Some(rounds) = self.rounds {
            s.rounds = rounds;
        }
        if let Some(timeout) = self.timeout {
            s.round_timeout = secs(timeout);
        }
        if let Some(retries) = self.retries {
            s.retry.attempts = retries.max(1);
        }
        if let Some(delay) = self.retry_delay {
            s.retry.delay = secs(delay);
        }
        if self.no_ack {
            s.ack_enabled = false;
        }
        s
    }
}

/// Seconds to `Duration`; negative or non-finite input is treated as zero.
pub fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}

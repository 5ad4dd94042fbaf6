use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{info, warn};

use mesh_common::{HwAddress, MeshError, NodeId, NodeIdentity, Result};
use mesh_consensus::{ConsensusEngine, ConsensusReport, ConsensusState};
use mesh_p2p::{AddressBook, Router, Transport};

use crate::config::NodeSettings;
use crate::runtime::dispatch::{run_outbound, run_receive};
use crate::runtime::exchange::ExchangeResult;
use crate::runtime::link::RuntimeLink;
use crate::runtime::shared::{DeliveredMessage, NodeShared, OutboundCmd, SharedState};

struct Tasks {
    receive: JoinHandle<()>,
    outbound: JoinHandle<()>,
}

/// One mesh node: transport, receive path, reliable exchange and consensus.
pub struct NodeRuntime {
    shared: Arc<NodeShared>,
    outbound_rx: Mutex<Option<mpsc::UnboundedReceiver<OutboundCmd>>>,
    tasks: Mutex<Option<Tasks>>,
}

impl NodeRuntime {
    pub fn new(
        identity: NodeIdentity,
        book: AddressBook,
        transport: Arc<dyn Transport>,
        settings: NodeSettings,
    ) -> Self {
        let router = Router::new(
            identity.id.clone(),
            Arc::new(book),
            identity.routes.clone(),
            Arc::clone(&transport),
        )
        .with_retry(settings.retry);
        let (outbound, outbound_rx) = mpsc::unbounded_channel();

        let shared = NodeShared {
            state: Mutex::new(SharedState::new(settings.dedup_capacity)),
            notify: Notify::new(),
            identity,
            settings,
            transport,
            router,
            outbound,
        };
        Self {
            shared: Arc::new(shared),
            outbound_rx: Mutex::new(Some(outbound_rx)),
            tasks: Mutex::new(None),
        }
    }

    pub fn identity(&self) -> &NodeIdentity {
        &self.shared.identity
    }

    pub fn settings(&self) -> &NodeSettings {
        &self.shared.settings
    }

    /// Registers the receive callback, opens the transport and starts the
    /// receive and outbound tasks. A runtime starts at most once.
    pub async fn start(&self) -> Result<()> {
        let outbound_rx = self
            .outbound_rx
            .lock()
            .await
            .take()
            .ok_or_else(|| MeshError::Transport("runtime already started".to_string()))?;

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        self.shared
            .transport
            .register_receive_callback(Arc::new(move |bytes: Vec<u8>, from: HwAddress| {
                let _ = inbound_tx.send((bytes, from));
            }));
        self.shared.transport.open().await?;

        let receive = tokio::spawn(run_receive(Arc::clone(&self.shared), inbound_rx));
        let outbound = tokio::spawn(run_outbound(Arc::clone(&self.shared), outbound_rx));
        *self.tasks.lock().await = Some(Tasks { receive, outbound });

        let identity = &self.shared.identity;
        info!(
            "[{}] node up addr={} neighbours={:?}",
            identity.id, identity.hw_address, identity.neighbors
        );
        Ok(())
    }

    /// Gives in-flight exchanges up to the exchange timeout to get their REPLY,
    /// stops the receive path, lets queued transmissions go out, then closes
    /// the transport.
    pub async fn stop(&self) -> Result<()> {
        let Some(tasks) = self.tasks.lock().await.take() else {
            return Ok(());
        };

        let deadline = Instant::now() + self.shared.settings.exchange_timeout;
        let drained = self
            .shared
            .wait_until(deadline, |s| s.pending.values().all(|p| p.reply.is_some()))
            .await;
        if !drained {
            let unanswered = self.shared.state.lock().await.pending.len();
            warn!("[{}] stopping with {} exchange(s) still unanswered", self.shared.me(), unanswered);
        }

        tasks.receive.abort();
        let _ = tasks.receive.await;

        let (done_tx, done_rx) = oneshot::channel();
        if self.shared.outbound.send(OutboundCmd::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
        if let Err(e) = tasks.outbound.await {
            warn!("[{}] outbound task ended abnormally: {}", self.shared.me(), e);
        }

        self.shared.transport.close().await?;
        info!("[{}] node down", self.shared.me());
        Ok(())
    }

    /// Sends `payload` to `dst` and waits for its REPLY or the timeout.
    /// Returns at once with `sent == false` when the message cannot leave.
    pub async fn send_and_wait(&self, dst: &NodeId, payload: Vec<u8>, timeout: Duration) -> ExchangeResult {
        self.shared.send_and_wait(dst.clone(), payload, timeout).await
    }

    /// Runs the configured number of consensus rounds starting from
    /// `initial_value`. Only one consensus run may be active per node; runs
    /// may follow each other on the same runtime.
    pub async fn run_consensus(&self, initial_value: f64) -> ConsensusReport {
        {
            // A run that was cancelled part way leaves retired rounds behind.
            let mut state = self.shared.state.lock().await;
            if state.rounds.is_retired(0) {
                state.rounds.reset();
            }
        }
        let state = ConsensusState::new(
            initial_value,
            self.shared.identity.neighbors.clone(),
            self.shared.settings.consensus_params(),
        );
        let link = RuntimeLink {
            shared: Arc::clone(&self.shared),
        };
        let report = ConsensusEngine::new(self.shared.identity.id.clone(), link, state)
            .run()
            .await;

        // Values neighbours send for the next run from here on start fresh.
        self.shared.state.lock().await.rounds.reset();
        report
    }

    /// Takes every DATA delivered to this node since the last call.
    pub async fn take_inbox(&self) -> Vec<DeliveredMessage> {
        std::mem::take(&mut self.shared.state.lock().await.inbox)
    }

    /// Number of distinct DATA identifiers this node has seen.
    pub async fn seen_messages(&self) -> usize {
        self.shared.state.lock().await.dedup.len()
    }

    /// Exchanges still waiting for a REPLY.
    pub async fn pending_exchanges(&self) -> usize {
        self.shared.state.lock().await.pending.len()
    }
}

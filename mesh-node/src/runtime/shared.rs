use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, Mutex, Notify};
use tokio::time::Instant;
use tracing::debug;

use mesh_common::{MessageEnvelope, MessageId, NodeId, NodeIdentity};
use mesh_consensus::RoundBuffer;
use mesh_p2p::{DedupCache, Router, Transport};

use crate::config::NodeSettings;

/// One outstanding `send_and_wait`.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingExchange {
    pub msg_id: MessageId,
    pub acknowledged: bool,
    pub reply: Option<Vec<u8>>,
}

impl PendingExchange {
    pub fn new(msg_id: MessageId) -> Self {
        Self {
            msg_id,
            acknowledged: false,
            reply: None,
        }
    }
}

/// DATA that reached its destination on this node.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveredMessage {
    pub msg_id: MessageId,
    pub src: NodeId,
    pub payload: Vec<u8>,
}

/// Everything the receive path and the driver path both touch.
#[derive(Debug)]
pub(crate) struct SharedState {
    pub dedup: DedupCache,
    // ACK/REPLY relayed for other nodes, keyed "<TYPE>/<msg_id>".
    pub relayed: DedupCache,
    pub pending: HashMap<MessageId, PendingExchange>,
    pub rounds: RoundBuffer,
    pub inbox: Vec<DeliveredMessage>,
}

impl SharedState {
    pub fn new(dedup_capacity: Option<usize>) -> Self {
        let cache = || match dedup_capacity {
            Some(cap) => DedupCache::with_capacity(cap),
            None => DedupCache::new(),
        };
        Self {
            dedup: cache(),
            relayed: cache(),
            pending: HashMap::new(),
            rounds: RoundBuffer::new(),
            inbox: Vec::new(),
        }
    }
}

pub(crate) enum OutboundCmd {
    Send(MessageEnvelope),
    /// Sent last on shutdown; answered once everything queued before it is out.
    Flush(oneshot::Sender<()>),
}

pub(crate) struct NodeShared {
    pub identity: NodeIdentity,
    pub settings: NodeSettings,
    pub transport: Arc<dyn Transport>,
    pub router: Router,
    pub state: Mutex<SharedState>,
    pub notify: Notify,
    pub outbound: mpsc::UnboundedSender<OutboundCmd>,
}

impl NodeShared {
    pub fn me(&self) -> &NodeId {
        &self.identity.id
    }

    pub fn queue(&self, envelope: MessageEnvelope) {
        if self.outbound.send(OutboundCmd::Send(envelope)).is_err() {
            debug!("[{}] outbound queue closed", self.me());
        }
    }

    /// Waits until `done` holds or `deadline` passes. The condition is
    /// re-checked on every notification and at least every poll interval.
    pub async fn wait_until<F>(&self, deadline: Instant, mut done: F) -> bool
    where
        F: FnMut(&SharedState) -> bool,
    {
        let poll = self.settings.poll_interval.max(Duration::from_millis(1));
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if done(&*self.state.lock().await) {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let _ = tokio::time::timeout_at((now + poll).min(deadline), notified).await;
        }
    }
}

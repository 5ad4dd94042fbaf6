use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use mesh_common::{HwAddress, MessageEnvelope, MessageId, NodeId};
use mesh_consensus::RecordOutcome;
use mesh_p2p::codec;

use crate::runtime::shared::{DeliveredMessage, NodeShared, OutboundCmd};

/// Receive path: one frame at a time, in arrival order.
pub(crate) async fn run_receive(shared: Arc<NodeShared>, mut rx: mpsc::UnboundedReceiver<(Vec<u8>, HwAddress)>) {
    while let Some((bytes, from)) = rx.recv().await {
        shared.handle_frame(&bytes, from).await;
    }
    debug!("[{}] receive path stopped", shared.me());
}

/// Drains queued envelopes onto the air until a flush request arrives.
///
/// Each next hop gets its own lane so retries towards an unreachable neighbour
/// never hold up frames for the others. Order is kept within a lane.
pub(crate) async fn run_outbound(shared: Arc<NodeShared>, mut rx: mpsc::UnboundedReceiver<OutboundCmd>) {
    let mut lanes: HashMap<NodeId, mpsc::UnboundedSender<MessageEnvelope>> = HashMap::new();
    let mut workers = JoinSet::new();

    while let Some(cmd) = rx.recv().await {
        match cmd {
            OutboundCmd::Send(envelope) => {
                let hop = envelope
                    .dst()
                    .and_then(|dst| shared.router.resolve_next_hop(dst));
                let Some(hop) = hop else {
                    // Unroutable: the router logs the drop without transmitting.
                    let _ = shared.router.route_and_send(&envelope).await;
                    continue;
                };
                let lane = lanes.entry(hop).or_insert_with_key(|hop| {
                    let (tx, lane_rx) = mpsc::unbounded_channel();
                    workers.spawn(run_lane(Arc::clone(&shared), hop.clone(), lane_rx));
                    tx
                });
                if lane.send(envelope).is_err() {
                    warn!("[{}] outbound lane closed", shared.me());
                }
            }
            OutboundCmd::Flush(done) => {
                lanes.clear();
                while workers.join_next().await.is_some() {}
                let _ = done.send(());
                break;
            }
        }
    }
    debug!("[{}] outbound path stopped", shared.me());
}

async fn run_lane(shared: Arc<NodeShared>, hop: NodeId, mut rx: mpsc::UnboundedReceiver<MessageEnvelope>) {
    while let Some(envelope) = rx.recv().await {
        // Failures are logged by the router.
        let _ = shared.router.route_and_send(&envelope).await;
    }
    debug!("[{}] lane to {} drained", shared.me(), hop);
}

impl NodeShared {
    pub(crate) async fn handle_frame(&self, bytes: &[u8], from: HwAddress) {
        let envelope = match codec::decode(bytes) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("[{}] DROP frame from {} ({})", self.me(), from, e);
                return;
            }
        };
        if !self.router.address_book().contains(envelope.src()) {
            warn!("[{}] DROP {} (unknown source)", self.me(), envelope);
            return;
        }
        debug!("[{}] RX {} via={}", self.me(), envelope, from);

        match envelope {
            MessageEnvelope::Data { .. } => self.on_data(envelope).await,
            MessageEnvelope::Ack { .. } | MessageEnvelope::Reply { .. } => {
                self.on_response(envelope).await
            }
            MessageEnvelope::Val {
                round,
                src,
                dst,
                value,
            } => self.on_value(round, src, dst, value).await,
        }
    }

    async fn on_data(&self, envelope: MessageEnvelope) {
        let MessageEnvelope::Data {
            msg_id,
            src,
            dst,
            payload,
        } = &envelope
        else {
            return;
        };
        let for_me = dst == self.me();

        {
            let mut state = self.state.lock().await;
            if !state.dedup.should_accept_and_forward(msg_id) {
                debug!("[{}] DUP {} ignored", self.me(), envelope);
                return;
            }
            if for_me {
                state.inbox.push(DeliveredMessage {
                    msg_id: msg_id.clone(),
                    src: src.clone(),
                    payload: payload.clone(),
                });
            }
        }

        if self.settings.ack_enabled && src != self.me() {
            self.queue(MessageEnvelope::ack(msg_id.clone(), self.me().clone(), src.clone()));
        }

        if for_me {
            info!(
                "[{}] DELIVER msg_id={} from={} bytes={}",
                self.me(),
                msg_id,
                src,
                payload.len()
            );
            self.notify.notify_waiters();
            self.queue(MessageEnvelope::reply_ok(
                msg_id.clone(),
                self.me().clone(),
                src.clone(),
            ));
        } else {
            self.queue(envelope);
        }
    }

    async fn on_response(&self, envelope: MessageEnvelope) {
        let (Some(msg_id), Some(dst)) = (envelope.msg_id(), envelope.dst()) else {
            return;
        };

        if dst != self.me() {
            let key = MessageId(format!("{}/{}", envelope.kind(), msg_id));
            if self.state.lock().await.relayed.should_accept_and_forward(&key) {
                self.queue(envelope);
            } else {
                debug!("[{}] DUP {} ignored", self.me(), envelope);
            }
            return;
        }

        let mut state = self.state.lock().await;
        let Some(pending) = state.pending.get_mut(msg_id) else {
            debug!("[{}] {} matches no pending exchange", self.me(), envelope);
            return;
        };
        match &envelope {
            MessageEnvelope::Ack { .. } => pending.acknowledged = true,
            MessageEnvelope::Reply { payload, .. } => pending.reply = Some(payload.clone()),
            _ => {}
        }
        drop(state);
        self.notify.notify_waiters();
    }

    async fn on_value(&self, round: u64, src: NodeId, dst: Option<NodeId>, value: f64) {
        if let Some(dst) = dst.as_ref().filter(|d| *d != self.me()) {
            debug!("[{}] VAL k={} from {} addressed to {}, ignored", self.me(), round, src, dst);
            return;
        }
        if !self.identity.is_neighbor(&src) {
            debug!("[{}] VAL k={} from non-neighbour {}", self.me(), round, src);
        }

        let outcome = self.state.lock().await.rounds.record(round, src.clone(), value);
        match outcome {
            RecordOutcome::Retired => {
                debug!("[{}] late VAL k={} from {} discarded", self.me(), round, src);
            }
            RecordOutcome::Overwritten | RecordOutcome::Recorded => {
                self.notify.notify_waiters();
            }
        }
    }
}

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use mesh_common::{env::message::REPLY_OK, MessageEnvelope, MessageId, NodeId};
use mesh_p2p::DropReason;

use crate::runtime::shared::{NodeShared, PendingExchange};

/// Outcome of one [`send_and_wait`](crate::runtime::NodeRuntime::send_and_wait).
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeResult {
    pub msg_id: MessageId,
    /// False when the message never left this node.
    pub sent: bool,
    /// `None` when acknowledgments are disabled or nothing was sent.
    pub acknowledged: Option<bool>,
    pub reply: Option<Vec<u8>>,
    pub dropped: Option<DropReason>,
    pub elapsed: Duration,
}

impl ExchangeResult {
    pub fn replied(&self) -> bool {
        self.reply.is_some()
    }

    pub fn reply_is_ok(&self) -> bool {
        self.reply.as_deref() == Some(REPLY_OK)
    }
}

impl NodeShared {
    pub(crate) async fn send_and_wait(
        &self,
        dst: NodeId,
        payload: Vec<u8>,
        timeout: Duration,
    ) -> ExchangeResult {
        let started = Instant::now();
        let envelope = MessageEnvelope::data(self.me().clone(), dst, payload);
        let msg_id = match envelope.msg_id() {
            Some(id) => id.clone(),
            None => MessageId::fresh(),
        };

        {
            let mut state = self.state.lock().await;
            // A copy looping back to us is never handled twice.
            state.dedup.should_accept_and_forward(&msg_id);
            state
                .pending
                .insert(msg_id.clone(), PendingExchange::new(msg_id.clone()));
        }

        if let Err(reason) = self.router.route_and_send(&envelope).await {
            self.state.lock().await.pending.remove(&msg_id);
            info!(target: "consensus", "EVENT:EXCHANGE msg_id={} sent=false reason={}", msg_id, reason);
            return ExchangeResult {
                msg_id,
                sent: false,
                acknowledged: None,
                reply: None,
                dropped: Some(reason),
                elapsed: started.elapsed(),
            };
        }

        let deadline = started + timeout;
        let replied = self
            .wait_until(deadline, |state| {
                state
                    .pending
                    .get(&msg_id)
                    .map_or(true, |p| p.reply.is_some())
            })
            .await;

        let pending = self
            .state
            .lock()
            .await
            .pending
            .remove(&msg_id)
            .unwrap_or_else(|| PendingExchange::new(msg_id.clone()));
        if !replied {
            debug!("[{}] exchange {} timed out", self.me(), msg_id);
        }

        let result = ExchangeResult {
            msg_id,
            sent: true,
            acknowledged: self.settings.ack_enabled.then_some(pending.acknowledged),
            reply: pending.reply,
            dropped: None,
            elapsed: started.elapsed(),
        };
        info!(
            target: "consensus",
            "EVENT:EXCHANGE msg_id={} sent=true ack={:?} reply={} elapsed_ms={}",
            result.msg_id,
            result.acknowledged,
            result.replied(),
            result.elapsed.as_millis()
        );
        result
    }
}

//! routing.rs
//!
//! Next-hop resolution and forwarding over the unicast transport.
//!
//! Routing is static: an explicit route table entry wins, otherwise a
//! destination present in the address book is sent to directly. There is no
//! route discovery. Every drop is reported as a [`DropReason`] and logged; none
//! of them are fatal to the node.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use mesh_common::{MessageEnvelope, NodeId};

use crate::{
    address_book::AddressBook,
    codec,
    error::TransmitError,
    ports::Transport,
    retry::RetryPolicy,
};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DropReason {
    #[error("no route to {0}")]
    NoRoute(NodeId),

    #[error("next hop for {0} is this node")]
    SelfLoop(NodeId),

    #[error("next hop {next_hop} failed: {error}")]
    TransmitFailed {
        next_hop: NodeId,
        error: TransmitError,
    },

    #[error("unknown destination {0}")]
    UnknownDestination(String),
}

#[derive(Debug, Clone)]
pub struct Router {
    self_id: NodeId,
    book: Arc<AddressBook>,
    routes: HashMap<NodeId, NodeId>,
    transport: Arc<dyn Transport>,
    retry: RetryPolicy,
}

impl Router {
    pub fn new(
        self_id: NodeId,
        book: Arc<AddressBook>,
        routes: HashMap<NodeId, NodeId>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            self_id,
            book,
            routes,
            transport,
            retry: RetryPolicy::once(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn self_id(&self) -> &NodeId {
        &self.self_id
    }

    pub fn address_book(&self) -> &AddressBook {
        &self.book
    }

    /// Explicit route first, then direct delivery if the destination is known.
    pub fn resolve_next_hop(&self, dst: &NodeId) -> Option<NodeId> {
        if let Some(next_hop) = self.routes.get(dst) {
            return Some(next_hop.clone());
        }
        if self.book.contains(dst) {
            return Some(dst.clone());
        }
        None
    }

    /// Resolves the next hop for the envelope's destination and transmits it.
    /// Returns the hop the frame left through.
    pub async fn route_and_send(&self, envelope: &MessageEnvelope) -> Result<NodeId, DropReason> {
        let dst = envelope
            .dst()
            .ok_or_else(|| DropReason::UnknownDestination("<none>".into()))?;

        let next_hop = match self.resolve_next_hop(dst) {
            Some(nh) => nh,
            None => {
                let reason = DropReason::NoRoute(dst.clone());
                warn!("[{}] DROP {} ({})", self.self_id, envelope, reason);
                return Err(reason);
            }
        };
        if next_hop == self.self_id {
            let reason = DropReason::SelfLoop(dst.clone());
            warn!("[{}] DROP {} ({})", self.self_id, envelope, reason);
            return Err(reason);
        }

        self.send_to_node(&next_hop, envelope).await?;
        debug!("[{}] TX {} via={}", self.self_id, envelope, next_hop);
        Ok(next_hop)
    }

    /// Single-hop transmission to a known node, with the configured retries.
    pub async fn send_to_node(&self, node: &NodeId, envelope: &MessageEnvelope) -> Result<(), DropReason> {
        let addr = match self.book.lookup(node) {
            Some(addr) => addr,
            None => {
                let reason = DropReason::UnknownDestination(node.0.clone());
                warn!("[{}] DROP {} (unknown next hop '{}')", self.self_id, envelope, node);
                return Err(reason);
            }
        };

        let bytes = codec::encode(envelope).map_err(|e| {
            warn!("[{}] DROP {} (encode: {})", self.self_id, envelope, e);
            DropReason::TransmitFailed {
                next_hop: node.clone(),
                error: TransmitError::Io(e.to_string()),
            }
        })?;

        let transport = &self.transport;
        let bytes = &bytes;
        self.retry
            .run(move |_| async move { transport.send_unicast(addr, bytes).await })
            .await
            .map(|_| ())
            .map_err(|error| {
                warn!("[{}] TX FAIL to={} {} error={}", self.self_id, node, envelope, error);
                DropReason::TransmitFailed {
                    next_hop: node.clone(),
                    error,
                }
            })
    }
}

//! message.rs
//!
//! Structured envelope exchanged between mesh nodes.
//!
//! The envelope is a tagged variant: reliable traffic (`Data`, `Ack`, `Reply`)
//! is correlated by a [`MessageId`], consensus traffic (`Val`) by its round index.
//! The byte-level representation lives in the p2p codec; this module only holds
//! the typed model.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::utils::NodeId;

/// Wire protocol version spoken by this implementation.
pub const PROTOCOL_VERSION: u8 = 1;

/// Fixed payload carried by the automatic REPLY to an accepted DATA message.
pub const REPLY_OK: &[u8] = b"OK";

/// Globally unique message identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl MessageId {
    /// Generates a fresh identifier (uuid v4, 32 hex chars without dashes).
    pub fn fresh() -> Self {
        MessageId(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        MessageId(s.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Data,
    Ack,
    Reply,
    Val,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Data => "DATA",
            MessageKind::Ack => "ACK",
            MessageKind::Reply => "REPLY",
            MessageKind::Val => "VAL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "DATA" => Some(MessageKind::Data),
            "ACK" => Some(MessageKind::Ack),
            "REPLY" => Some(MessageKind::Reply),
            "VAL" => Some(MessageKind::Val),
            _ => None,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MessageEnvelope {
    Data {
        msg_id: MessageId,
        src: NodeId,
        dst: NodeId,
        payload: Vec<u8>,
    },
    Ack {
        msg_id: MessageId,
        src: NodeId,
        dst: NodeId,
    },
    Reply {
        msg_id: MessageId,
        src: NodeId,
        dst: NodeId,
        payload: Vec<u8>,
    },
    Val {
        round: u64,
        src: NodeId,
        dst: Option<NodeId>,
        value: f64,
    },
}

impl MessageEnvelope {
    /// New DATA envelope with a fresh identifier.
    pub fn data(src: NodeId, dst: NodeId, payload: Vec<u8>) -> Self {
        MessageEnvelope::Data {
            msg_id: MessageId::fresh(),
            src,
            dst,
            payload,
        }
    }

    /// End-to-end ACK for `msg_id`, sent from `me` back to the original source.
    pub fn ack(msg_id: MessageId, me: NodeId, original_src: NodeId) -> Self {
        MessageEnvelope::Ack {
            msg_id,
            src: me,
            dst: original_src,
        }
    }

    /// REPLY carrying the fixed acknowledgment payload.
    pub fn reply_ok(msg_id: MessageId, me: NodeId, original_src: NodeId) -> Self {
        MessageEnvelope::Reply {
            msg_id,
            src: me,
            dst: original_src,
            payload: REPLY_OK.to_vec(),
        }
    }

    pub fn val(round: u64, src: NodeId, dst: NodeId, value: f64) -> Self {
        MessageEnvelope::Val {
            round,
            src,
            dst: Some(dst),
            value,
        }
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            MessageEnvelope::Data { .. } => MessageKind::Data,
            MessageEnvelope::Ack { .. } => MessageKind::Ack,
            MessageEnvelope::Reply { .. } => MessageKind::Reply,
            MessageEnvelope::Val { .. } => MessageKind::Val,
        }
    }

    pub fn src(&self) -> &NodeId {
        match self {
            MessageEnvelope::Data { src, .. }
            | MessageEnvelope::Ack { src, .. }
            | MessageEnvelope::Reply { src, .. }
            | MessageEnvelope::Val { src, .. } => src,
        }
    }

    pub fn dst(&self) -> Option<&NodeId> {
        match self {
            MessageEnvelope::Data { dst, .. }
            | MessageEnvelope::Ack { dst, .. }
            | MessageEnvelope::Reply { dst, .. } => Some(dst),
            MessageEnvelope::Val { dst, .. } => dst.as_ref(),
        }
    }

    /// Identifier for DATA/ACK/REPLY; `None` for VAL.
    pub fn msg_id(&self) -> Option<&MessageId> {
        match self {
            MessageEnvelope::Data { msg_id, .. }
            | MessageEnvelope::Ack { msg_id, .. }
            | MessageEnvelope::Reply { msg_id, .. } => Some(msg_id),
            MessageEnvelope::Val { .. } => None,
        }
    }
}

impl fmt::Display for MessageEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageEnvelope::Val { round, src, value, .. } => {
                write!(f, "VAL k={} src={} value={:.6}", round, src, value)
            }
            other => write!(
                f,
                "{} msg_id={} src={} dst={}",
                other.kind(),
                other.msg_id().map(MessageId::as_str).unwrap_or("-"),
                other.src(),
                other.dst().map(NodeId::as_str).unwrap_or("-"),
            ),
        }
    }
}

//! codec.rs
//!
//! Compact JSON wire format for [`MessageEnvelope`].
//!
//! Logical layout: `{v, type, msg_id?, k?, src, dst?, payload?, enc?, value?}`.
//! A UTF-8 `payload` travels as a plain JSON string. Other bytes are
//! hex-encoded and tagged with `"enc":"hex"`. Unknown fields are ignored so
//! newer peers can add fields without breaking older ones. Anything else that does not fit the
//! layout is a [`DecodeError`] and the frame is dropped by the caller.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use mesh_common::{
    env::message::MessageKind, MessageEnvelope, MessageId, NodeId, PROTOCOL_VERSION,
};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("malformed frame: {0}")]
    Malformed(String),

    #[error("missing protocol version")]
    MissingVersion,

    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u64),

    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("unknown message type '{0}'")]
    UnknownType(String),

    #[error("bad payload: {0}")]
    BadPayload(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EncodeError {
    #[error("VAL value {0} is not a finite number")]
    NonFiniteValue(f64),

    #[error("serialization failed: {0}")]
    Serialize(String),
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct WireEnvelope {
    #[serde(skip_serializing_if = "Option::is_none")]
    v: Option<u64>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    msg_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    k: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    src: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dst: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    enc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<f64>,
}

const HEX_ENCODING: &str = "hex";

/// Serializes an envelope. Only non-finite VAL values are rejected, since JSON
/// has no representation for them.
pub fn encode(envelope: &MessageEnvelope) -> Result<Vec<u8>, EncodeError> {
    let mut wire = WireEnvelope {
        v: Some(u64::from(PROTOCOL_VERSION)),
        kind: Some(envelope.kind().as_str().to_string()),
        src: Some(envelope.src().0.clone()),
        dst: envelope.dst().map(|d| d.0.clone()),
        msg_id: envelope.msg_id().map(|id| id.0.clone()),
        ..Default::default()
    };

    match envelope {
        MessageEnvelope::Data { payload, .. } | MessageEnvelope::Reply { payload, .. } => {
            match std::str::from_utf8(payload) {
                Ok(text) => wire.payload = Some(text.to_string()),
                Err(_) => {
                    wire.payload = Some(hex::encode(payload));
                    wire.enc = Some(HEX_ENCODING.to_string());
                }
            }
        }
        MessageEnvelope::Ack { .. } => {}
        MessageEnvelope::Val { round, value, .. } => {
            if !value.is_finite() {
                return Err(EncodeError::NonFiniteValue(*value));
            }
            wire.k = Some(*round);
            wire.value = Some(*value);
        }
    }

    serde_json::to_vec(&wire).map_err(|e| EncodeError::Serialize(e.to_string()))
}

pub fn decode(bytes: &[u8]) -> Result<MessageEnvelope, DecodeError> {
    let wire: WireEnvelope =
        serde_json::from_slice(bytes).map_err(|e| DecodeError::Malformed(e.to_string()))?;

    match wire.v {
        None => return Err(DecodeError::MissingVersion),
        Some(v) if v != u64::from(PROTOCOL_VERSION) => {
            return Err(DecodeError::UnsupportedVersion(v))
        }
        Some(_) => {}
    }

    let kind_str = wire.kind.ok_or(DecodeError::MissingField("type"))?;
    let kind = MessageKind::parse(&kind_str).ok_or(DecodeError::UnknownType(kind_str))?;
    let src = required(wire.src, "src")?;

    let envelope = match kind {
        MessageKind::Data => MessageEnvelope::Data {
            msg_id: MessageId(required(wire.msg_id, "msg_id")?),
            src,
            dst: required(wire.dst, "dst")?,
            payload: decode_payload(wire.payload, wire.enc.as_deref())?,
        },
        MessageKind::Ack => MessageEnvelope::Ack {
            msg_id: MessageId(required(wire.msg_id, "msg_id")?),
            src,
            dst: required(wire.dst, "dst")?,
        },
        MessageKind::Reply => MessageEnvelope::Reply {
            msg_id: MessageId(required(wire.msg_id, "msg_id")?),
            src,
            dst: required(wire.dst, "dst")?,
            payload: decode_payload(wire.payload, wire.enc.as_deref())?,
        },
        MessageKind::Val => MessageEnvelope::Val {
            round: wire.k.ok_or(DecodeError::MissingField("k"))?,
            src,
            dst: wire.dst.filter(|d| !d.is_empty()).map(NodeId),
            value: wire.value.ok_or(DecodeError::MissingField("value"))?,
        },
    };
    Ok(envelope)
}

/// Empty strings count as absent.
fn required<T: From<String>>(field: Option<String>, name: &'static str) -> Result<T, DecodeError> {
    field
        .filter(|s| !s.is_empty())
        .map(T::from)
        .ok_or(DecodeError::MissingField(name))
}

fn decode_payload(payload: Option<String>, enc: Option<&str>) -> Result<Vec<u8>, DecodeError> {
    let Some(text) = payload else {
        return Ok(Vec::new());
    };
    match enc {
        None => Ok(text.into_bytes()),
        Some(HEX_ENCODING) => hex::decode(text).map_err(|e| DecodeError::BadPayload(e.to_string())),
        Some(other) => Err(DecodeError::BadPayload(format!("unknown encoding '{other}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_wire_shape_is_compact_json() {
        let env = MessageEnvelope::Data {
            msg_id: "m1".into(),
            src: "A".into(),
            dst: "C".into(),
            payload: b"hi".to_vec(),
        };
        let bytes = encode(&env).unwrap();
        let text = std::str::from_utf8(&bytes).unwrap();

        assert!(!text.contains(' '));
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["v"], 1);
        assert_eq!(value["type"], "DATA");
        assert_eq!(value["payload"], "hi");
        assert!(value.get("enc").is_none());
        assert!(value.get("k").is_none());

        assert_eq!(decode(&bytes).unwrap(), env);
    }

    #[test]
    fn test_val_carries_round_not_msg_id() {
        let env = MessageEnvelope::val(7, "B".into(), "A".into(), 8.25);
        let bytes = encode(&env).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(value["k"], 7);
        assert!(value.get("msg_id").is_none());
        assert_eq!(decode(&bytes).unwrap(), env);
    }

    #[test]
    fn test_non_finite_value_cannot_be_encoded() {
        let env = MessageEnvelope::val(0, "B".into(), "A".into(), f64::NAN);
        assert!(matches!(encode(&env), Err(EncodeError::NonFiniteValue(_))));
    }

    #[test]
    fn test_garbage_is_rejected_not_panicking() {
        for raw in [&b"\xff\xfe\x00"[..], &b"not json"[..], &b"[1,2,3]"[..], &b"42"[..], &b""[..]] {
            assert!(matches!(decode(raw), Err(DecodeError::Malformed(_))), "{raw:?}");
        }
    }

    #[test]
    fn test_version_checks() {
        let missing = br#"{"type":"ACK","msg_id":"m","src":"A","dst":"B"}"#;
        assert_eq!(decode(missing), Err(DecodeError::MissingVersion));

        let future = br#"{"v":2,"type":"ACK","msg_id":"m","src":"A","dst":"B"}"#;
        assert_eq!(decode(future), Err(DecodeError::UnsupportedVersion(2)));
    }

    #[test]
    fn test_required_fields_per_type() {
        let no_id = br#"{"v":1,"type":"DATA","src":"A","dst":"B","payload":""}"#;
        assert_eq!(decode(no_id), Err(DecodeError::MissingField("msg_id")));

        let empty_id = br#"{"v":1,"type":"REPLY","msg_id":"","src":"A","dst":"B"}"#;
        assert_eq!(decode(empty_id), Err(DecodeError::MissingField("msg_id")));

        let no_src = br#"{"v":1,"type":"ACK","msg_id":"m","dst":"B"}"#;
        assert_eq!(decode(no_src), Err(DecodeError::MissingField("src")));

        let no_dst = br#"{"v":1,"type":"ACK","msg_id":"m","src":"A"}"#;
        assert_eq!(decode(no_dst), Err(DecodeError::MissingField("dst")));

        let no_round = br#"{"v":1,"type":"VAL","src":"A","value":1.0}"#;
        assert_eq!(decode(no_round), Err(DecodeError::MissingField("k")));

        let unknown = br#"{"v":1,"type":"PING","src":"A"}"#;
        assert_eq!(decode(unknown), Err(DecodeError::UnknownType("PING".into())));
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let raw = br#"{"v":1,"type":"VAL","k":0,"src":"A","value":2.5,"ts":1700000000.5,"hops":3}"#;
        match decode(raw).unwrap() {
            MessageEnvelope::Val { round, value, dst, .. } => {
                assert_eq!(round, 0);
                assert_eq!(value, 2.5);
                assert!(dst.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_plain_string_payload_from_older_nodes() {
        let raw = br#"{"v":1,"type":"REPLY","msg_id":"m","src":"C","dst":"A","payload":"OK"}"#;
        match decode(raw).unwrap() {
            MessageEnvelope::Reply { payload, .. } => assert_eq!(payload, b"OK"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_binary_payload_falls_back_to_hex() {
        let env = MessageEnvelope::Data {
            msg_id: "m2".into(),
            src: "A".into(),
            dst: "B".into(),
            payload: vec![0xff, 0x00, 0x41],
        };
        let bytes = encode(&env).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(value["payload"], "ff0041");
        assert_eq!(value["enc"], "hex");
        assert_eq!(decode(&bytes).unwrap(), env);
    }

    #[test]
    fn test_bad_payload_encoding() {
        let bad_hex =
            br#"{"v":1,"type":"DATA","msg_id":"m","src":"A","dst":"B","payload":"zz","enc":"hex"}"#;
        assert!(matches!(decode(bad_hex), Err(DecodeError::BadPayload(_))));

        let unknown =
            br#"{"v":1,"type":"DATA","msg_id":"m","src":"A","dst":"B","payload":"x","enc":"b64"}"#;
        assert!(matches!(decode(unknown), Err(DecodeError::BadPayload(_))));
    }
}

//! Signed frame encoding for room broadcast
//!
//! Outbound traffic is postcard-encoded and signed so stations cannot be
//! spoofed. Inbound traffic falls back through the older wire shapes when
//! the bytes are not a signed envelope: first the JSON form the earlier
//! HTTP relays published, then bare UTF-8 terminal input. Binary garbage
//! that matches none of these is dropped.

use chrono::{DateTime, Utc};
use iroh::{PublicKey, SecretKey, Signature};
use serde::{Deserialize, Serialize};

use lantern_core::{ChatMessage, MessageId, MessageKind, Role, StationId};

use crate::error::{MeshError, MeshResult};
use crate::presence::PresenceBeacon;

/// A signed frame ready for room broadcast
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedEnvelope {
    /// Public key of the sending station
    pub from: PublicKey,
    /// Serialized frame data
    pub data: Vec<u8>,
    /// Signature over the data
    pub signature: Signature,
}

/// Wire format for room frames (versioned for future compatibility)
#[derive(Debug, Serialize, Deserialize)]
pub enum WireFrame {
    /// Version 0 format
    V0 {
        /// When the sender created the frame, in Unix seconds
        sent_at_unix: i64,
        /// Serialized WirePayload bytes
        body: Vec<u8>,
    },
}

/// What a frame carries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WirePayload {
    /// A chat message
    Chat(ChatMessage),
    /// Delivery confirmation for a previously received message
    Ack {
        /// Id of the confirmed message
        id: MessageId,
    },
    /// Liveness announcement
    Presence(PresenceBeacon),
}

/// A decoded inbound frame
#[derive(Debug, Clone)]
pub struct ReceivedFrame {
    /// Originating station
    ///
    /// For legacy frames, a stable pseudo-identity derived from the frame
    /// bytes so duplicates from different relays collapse to one sender.
    pub from: StationId,
    /// When the sender created the frame
    pub sent_at: DateTime<Utc>,
    /// The decoded payload
    pub payload: WirePayload,
    /// Whether the frame carried a verified signature
    pub verified: bool,
}

/// Sign a payload and encode it for broadcast
pub fn sign_and_encode(secret_key: &SecretKey, payload: &WirePayload) -> MeshResult<Vec<u8>> {
    let body = postcard::to_allocvec(payload)?;
    let frame = WireFrame::V0 {
        sent_at_unix: Utc::now().timestamp(),
        body,
    };

    let data = postcard::to_allocvec(&frame)?;
    let signature = secret_key.sign(&data);
    let envelope = SignedEnvelope {
        from: secret_key.public(),
        data,
        signature,
    };

    postcard::to_allocvec(&envelope).map_err(Into::into)
}

/// The older JSON wire shape published by the original HTTP relays
#[derive(Debug, Deserialize)]
struct LegacyChat {
    content: String,
    #[serde(rename = "userType", default)]
    user_type: Option<String>,
    #[serde(default)]
    timestamp: Option<i64>,
}

/// Decode inbound bytes, cascading through the supported wire shapes
///
/// A structurally valid envelope whose signature does not verify is
/// rejected outright; the legacy fallbacks apply only to bytes that are
/// not an envelope at all.
pub fn decode_incoming(bytes: &[u8]) -> MeshResult<ReceivedFrame> {
    if let Ok(envelope) = postcard::from_bytes::<SignedEnvelope>(bytes) {
        return decode_envelope(envelope);
    }

    if let Ok(legacy) = serde_json::from_slice::<LegacyChat>(bytes) {
        return decode_legacy_json(bytes, legacy);
    }

    if let Ok(text) = std::str::from_utf8(bytes)
        && !text.trim().is_empty()
    {
        return decode_plain_text(bytes, text);
    }

    Err(MeshError::Decode("unrecognized frame".into()))
}

fn decode_envelope(envelope: SignedEnvelope) -> MeshResult<ReceivedFrame> {
    envelope
        .from
        .verify(&envelope.data, &envelope.signature)
        .map_err(|e| MeshError::SignatureRejected(e.to_string()))?;

    let WireFrame::V0 { sent_at_unix, body } = postcard::from_bytes(&envelope.data)
        .map_err(|e| MeshError::Decode(e.to_string()))?;

    let payload: WirePayload =
        postcard::from_bytes(&body).map_err(|e| MeshError::Decode(e.to_string()))?;

    Ok(ReceivedFrame {
        from: StationId::new(*envelope.from.as_bytes()),
        sent_at: DateTime::from_timestamp(sent_at_unix, 0).unwrap_or_else(Utc::now),
        payload,
        verified: true,
    })
}

fn decode_legacy_json(bytes: &[u8], legacy: LegacyChat) -> MeshResult<ReceivedFrame> {
    let role = legacy
        .user_type
        .as_deref()
        .map(Role::parse)
        .unwrap_or(Role::Unknown);

    let sent_at = legacy
        .timestamp
        .and_then(|ts| DateTime::from_timestamp(ts, 0))
        .unwrap_or_else(Utc::now);

    let from = legacy_station(bytes);
    let message = ChatMessage::new(legacy_frame_id(bytes), legacy.content, role, MessageKind::Text)
        .map_err(|e| MeshError::Decode(e.to_string()))?
        .with_sent_at(sent_at);

    Ok(ReceivedFrame {
        from,
        sent_at,
        payload: WirePayload::Chat(message),
        verified: false,
    })
}

fn decode_plain_text(bytes: &[u8], text: &str) -> MeshResult<ReceivedFrame> {
    let from = legacy_station(bytes);
    let message = ChatMessage::new(
        legacy_frame_id(bytes),
        text.trim_end_matches(['\r', '\n']),
        Role::Unknown,
        MessageKind::Text,
    )
    .map_err(|e| MeshError::Decode(e.to_string()))?;

    Ok(ReceivedFrame {
        from,
        sent_at: message.sent_at,
        payload: WirePayload::Chat(message),
        verified: false,
    })
}

/// Stable pseudo-identity for a legacy frame
///
/// Derived from the frame bytes, so the same frame relayed twice maps to
/// the same sender and message id.
fn legacy_station(bytes: &[u8]) -> StationId {
    StationId::new(*blake3::hash(bytes).as_bytes())
}

fn legacy_frame_id(bytes: &[u8]) -> MessageId {
    let digest = blake3::hash(bytes);
    let mut origin = [0u8; 8];
    let mut sequence = [0u8; 8];
    origin.copy_from_slice(&digest.as_bytes()[..8]);
    sequence.copy_from_slice(&digest.as_bytes()[8..16]);
    MessageId::new(u64::from_le_bytes(origin), u64::from_le_bytes(sequence))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_chat(content: &str) -> ChatMessage {
        ChatMessage::new(MessageId::new(0xAB, 1), content, Role::Civilian, MessageKind::Text)
            .unwrap()
            .with_nick("shelter-7")
    }

    #[test]
    fn test_sign_and_decode_roundtrip() {
        let secret_key = SecretKey::generate(&mut rand::rng());
        let payload = WirePayload::Chat(make_chat("water supply holding"));

        let encoded = sign_and_encode(&secret_key, &payload).unwrap();
        let received = decode_incoming(&encoded).unwrap();

        assert!(received.verified);
        assert_eq!(
            received.from,
            StationId::new(*secret_key.public().as_bytes())
        );
        match received.payload {
            WirePayload::Chat(msg) => {
                assert_eq!(msg.content, "water supply holding");
                assert_eq!(msg.nick.as_deref(), Some("shelter-7"));
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn test_ack_roundtrip() {
        let secret_key = SecretKey::generate(&mut rand::rng());
        let id = MessageId::new(0xCD, 9);
        let encoded = sign_and_encode(&secret_key, &WirePayload::Ack { id }).unwrap();

        let received = decode_incoming(&encoded).unwrap();
        assert!(matches!(received.payload, WirePayload::Ack { id: got } if got == id));
    }

    #[test]
    fn test_tampered_data_rejected() {
        let secret_key = SecretKey::generate(&mut rand::rng());
        let payload = WirePayload::Chat(make_chat("original"));
        let encoded = sign_and_encode(&secret_key, &payload).unwrap();

        let mut envelope: SignedEnvelope = postcard::from_bytes(&encoded).unwrap();
        let mid = envelope.data.len() / 2;
        envelope.data[mid] = envelope.data[mid].wrapping_add(1);
        let tampered = postcard::to_allocvec(&envelope).unwrap();

        let result = decode_incoming(&tampered);
        assert!(matches!(result, Err(MeshError::SignatureRejected(_))));
    }

    #[test]
    fn test_legacy_json_decodes() {
        let bytes = br#"{"content":"need water at the school","userType":"team","timestamp":1700000000}"#;
        let received = decode_incoming(bytes).unwrap();

        assert!(!received.verified);
        assert_eq!(received.sent_at.timestamp(), 1_700_000_000);
        match received.payload {
            WirePayload::Chat(msg) => {
                assert_eq!(msg.content, "need water at the school");
                assert_eq!(msg.role, Role::Team);
                assert!(msg.nick.is_none());
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn test_legacy_json_unrecognized_role() {
        let bytes = br#"{"content":"hello","userType":"dispatcher"}"#;
        let received = decode_incoming(bytes).unwrap();
        match received.payload {
            WirePayload::Chat(msg) => assert_eq!(msg.role, Role::Unknown),
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn test_plain_text_decodes_as_unknown() {
        let received = decode_incoming(b"anyone on this channel?\n").unwrap();

        assert!(!received.verified);
        match received.payload {
            WirePayload::Chat(msg) => {
                assert_eq!(msg.content, "anyone on this channel?");
                assert_eq!(msg.role, Role::Unknown);
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn test_legacy_frames_get_stable_ids() {
        let bytes = b"same bytes both times";
        let first = decode_incoming(bytes).unwrap();
        let second = decode_incoming(bytes).unwrap();

        let (WirePayload::Chat(a), WirePayload::Chat(b)) = (first.payload, second.payload) else {
            panic!("expected chat payloads");
        };
        assert_eq!(a.id, b.id);
        assert_eq!(first.from, second.from);
    }

    #[test]
    fn test_binary_garbage_dropped() {
        let result = decode_incoming(&[0xff, 0xfe, 0x00, 0x9c]);
        assert!(matches!(result, Err(MeshError::Decode(_))));
    }

    #[test]
    fn test_empty_legacy_content_dropped() {
        let result = decode_incoming(br#"{"content":"   ","userType":"civilian"}"#);
        assert!(result.is_err());
    }
}

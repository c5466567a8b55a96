//! Transport envelope codec.
//!
//! Every frame from the match engine is a JSON object tagged by `kind`:
//!
//! ```text
//! { "kind": "event"|"error"|"connected"|"disconnected",
//!   "payload"?: { "kind": "...", "matchId": "...", ... },
//!   "errorText"?: "...",
//!   "timestamp"?: 1700000000000 }
//! ```
//!
//! Unknown extra fields never fail a decode. A field required by the
//! envelope kind always does.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{DecodeError, Result};
use crate::event::{self, GameEvent};

// ── Types ───────────────────────────────────────────────────────────

/// The body of an envelope, selected by its wire `kind`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    /// A game event for some match.
    Event(GameEvent),
    /// A server-side error report.
    Error { error_text: String },
    /// The engine acknowledged the connection.
    Connected,
    /// The engine is closing the connection.
    Disconnected,
}

impl MessageBody {
    /// The wire `kind` string for this body.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Event(_) => "event",
            Self::Error { .. } => "error",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
        }
    }
}

/// A decoded transport frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportMessage {
    pub body: MessageBody,
    /// Send time in milliseconds since the Unix epoch, if the engine stamped it.
    pub timestamp: Option<u64>,
}

impl TransportMessage {
    pub fn new(body: MessageBody) -> Self {
        Self {
            body,
            timestamp: None,
        }
    }

    pub fn event(event: GameEvent) -> Self {
        Self::new(MessageBody::Event(event))
    }

    pub fn error(error_text: impl Into<String>) -> Self {
        Self::new(MessageBody::Error {
            error_text: error_text.into(),
        })
    }

    pub fn connected() -> Self {
        Self::new(MessageBody::Connected)
    }

    pub fn disconnected() -> Self {
        Self::new(MessageBody::Disconnected)
    }

    #[must_use]
    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// Borrowed wire shape used for encoding.
#[derive(Serialize)]
struct WireEnvelope<'a> {
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload: Option<&'a GameEvent>,
    #[serde(rename = "errorText", skip_serializing_if = "Option::is_none")]
    error_text: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<u64>,
}

impl<'a> From<&'a TransportMessage> for WireEnvelope<'a> {
    fn from(msg: &'a TransportMessage) -> Self {
        let (payload, error_text) = match &msg.body {
            MessageBody::Event(event) => (Some(event), None),
            MessageBody::Error { error_text } => (None, Some(error_text.as_str())),
            MessageBody::Connected | MessageBody::Disconnected => (None, None),
        };
        Self {
            kind: msg.body.kind(),
            payload,
            error_text,
            timestamp: msg.timestamp,
        }
    }
}

// ── Codec ───────────────────────────────────────────────────────────

/// Decode a raw text frame into a [`TransportMessage`].
///
/// # Errors
///
/// - [`DecodeError::MalformedEnvelope`] if the frame is not a JSON object or
///   `timestamp` is not an unsigned integer.
/// - [`DecodeError::UnknownEnvelopeKind`] if `kind` is absent or unrecognized.
/// - [`DecodeError::MalformedEvent`] if an `event` envelope lacks a valid payload.
/// - [`DecodeError::MissingErrorText`] if an `error` envelope lacks `errorText`.
pub fn decode(raw: &str) -> std::result::Result<TransportMessage, DecodeError> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| DecodeError::malformed_envelope(format!("invalid JSON: {e}")))?;
    decode_value(value)
}

/// Decode an already-parsed JSON value into a [`TransportMessage`].
///
/// Applies the same rules as [`decode`].
///
/// # Errors
///
/// See [`decode`].
pub fn decode_value(value: Value) -> std::result::Result<TransportMessage, DecodeError> {
    let Value::Object(obj) = value else {
        return Err(DecodeError::malformed_envelope("frame is not a JSON object"));
    };

    let body = match obj.get("kind") {
        Some(Value::String(kind)) => decode_body(kind, &obj)?,
        Some(other) => {
            return Err(DecodeError::UnknownEnvelopeKind {
                kind: Some(other.to_string()),
            })
        }
        None => return Err(DecodeError::UnknownEnvelopeKind { kind: None }),
    };

    let timestamp = match obj.get("timestamp") {
        None | Some(Value::Null) => None,
        Some(Value::Number(n)) => Some(n.as_u64().ok_or_else(|| {
            DecodeError::malformed_envelope(format!("timestamp {n} is not an unsigned integer"))
        })?),
        Some(_) => return Err(DecodeError::malformed_envelope("timestamp is not a number")),
    };

    Ok(TransportMessage { body, timestamp })
}

fn decode_body(
    kind: &str,
    obj: &Map<String, Value>,
) -> std::result::Result<MessageBody, DecodeError> {
    match kind {
        "event" => {
            let payload = obj
                .get("payload")
                .filter(|p| !p.is_null())
                .ok_or_else(|| DecodeError::malformed_event("event envelope has no payload"))?;
            Ok(MessageBody::Event(event::validate(payload)?))
        }
        "error" => match obj.get("errorText") {
            Some(Value::String(text)) => Ok(MessageBody::Error {
                error_text: text.clone(),
            }),
            _ => Err(DecodeError::MissingErrorText),
        },
        "connected" => Ok(MessageBody::Connected),
        "disconnected" => Ok(MessageBody::Disconnected),
        other => Err(DecodeError::UnknownEnvelopeKind {
            kind: Some(other.to_owned()),
        }),
    }
}

/// Encode a [`TransportMessage`] as a JSON text frame.
///
/// The output decodes back to an equal message.
///
/// # Errors
///
/// Returns [`BroadsideError::Serialization`](crate::BroadsideError::Serialization)
/// if serialization fails.
pub fn encode(msg: &TransportMessage) -> Result<String> {
    Ok(serde_json::to_string(&WireEnvelope::from(msg))?)
}

/// Encode a [`TransportMessage`] as a JSON value.
///
/// # Errors
///
/// Returns [`BroadsideError::Serialization`](crate::BroadsideError::Serialization)
/// if serialization fails.
pub fn encode_value(msg: &TransportMessage) -> Result<Value> {
    Ok(serde_json::to_value(WireEnvelope::from(msg))?)
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::event::ShotResult;
    use serde_json::json;

    #[test]
    fn decodes_event_envelope() {
        let msg = decode(
            r#"{"kind":"event","payload":{"kind":"ShotFired","matchId":"m1","x":2,"y":3,"result":"hit"},"timestamp":17}"#,
        )
        .unwrap();
        assert_eq!(msg.timestamp, Some(17));
        assert_eq!(
            msg.body,
            MessageBody::Event(GameEvent::ShotFired {
                match_id: "m1".into(),
                x: 2,
                y: 3,
                result: ShotResult::Hit,
            })
        );
    }

    #[test]
    fn missing_coordinates_fail_as_malformed_event() {
        let err = decode(r#"{"kind":"event","payload":{"kind":"ShotProposed","matchId":"m1"}}"#)
            .unwrap_err();
        assert!(matches!(err, DecodeError::MalformedEvent { .. }), "{err:?}");
    }

    #[test]
    fn event_without_payload_is_malformed_event() {
        let err = decode(r#"{"kind":"event"}"#).unwrap_err();
        assert!(matches!(err, DecodeError::MalformedEvent { .. }));
        let err = decode(r#"{"kind":"event","payload":null}"#).unwrap_err();
        assert!(matches!(err, DecodeError::MalformedEvent { .. }));
    }

    #[test]
    fn unknown_kind_is_rejected() {
        assert_eq!(
            decode(r#"{"kind":"heartbeat"}"#).unwrap_err(),
            DecodeError::UnknownEnvelopeKind {
                kind: Some("heartbeat".into())
            }
        );
        assert_eq!(
            decode(r#"{"payload":{}}"#).unwrap_err(),
            DecodeError::UnknownEnvelopeKind { kind: None }
        );
        assert!(matches!(
            decode(r#"{"kind":5}"#).unwrap_err(),
            DecodeError::UnknownEnvelopeKind { kind: Some(_) }
        ));
    }

    #[test]
    fn error_envelope_requires_error_text() {
        assert_eq!(
            decode(r#"{"kind":"error"}"#).unwrap_err(),
            DecodeError::MissingErrorText
        );
        assert_eq!(
            decode(r#"{"kind":"error","errorText":42}"#).unwrap_err(),
            DecodeError::MissingErrorText
        );
        let msg = decode(r#"{"kind":"error","errorText":"not your turn"}"#).unwrap();
        assert_eq!(
            msg.body,
            MessageBody::Error {
                error_text: "not your turn".into()
            }
        );
    }

    #[test]
    fn status_envelopes_ignore_extra_fields() {
        let msg = decode(r#"{"kind":"connected","payload":{"junk":true},"errorText":"x","v":2}"#)
            .unwrap();
        assert_eq!(msg, TransportMessage::connected());
        let msg = decode(r#"{"kind":"disconnected","timestamp":5}"#).unwrap();
        assert_eq!(msg, TransportMessage::disconnected().with_timestamp(5));
    }

    #[test]
    fn non_object_frames_are_malformed_envelopes() {
        for raw in ["not json", "[]", "\"event\"", "42", ""] {
            assert!(
                matches!(decode(raw), Err(DecodeError::MalformedEnvelope { .. })),
                "{raw:?} should be a malformed envelope"
            );
        }
    }

    #[test]
    fn bad_timestamp_is_malformed_envelope() {
        for raw in [
            r#"{"kind":"connected","timestamp":-1}"#,
            r#"{"kind":"connected","timestamp":1.5}"#,
            r#"{"kind":"connected","timestamp":"now"}"#,
        ] {
            assert!(
                matches!(decode(raw), Err(DecodeError::MalformedEnvelope { .. })),
                "{raw} should be rejected"
            );
        }
    }

    #[test]
    fn encode_omits_absent_fields() {
        let value = encode_value(&TransportMessage::disconnected()).unwrap();
        assert_eq!(value, json!({"kind": "disconnected"}));

        let value = encode_value(&TransportMessage::error("boom").with_timestamp(9)).unwrap();
        assert_eq!(
            value,
            json!({"kind": "error", "errorText": "boom", "timestamp": 9})
        );
    }

    #[test]
    fn encode_then_decode_is_identity() {
        let messages = [
            TransportMessage::event(GameEvent::ShotFired {
                match_id: "m1".into(),
                x: 9,
                y: 0,
                result: ShotResult::from("grazed"),
            })
            .with_timestamp(1_700_000_000_000),
            TransportMessage::event(GameEvent::MatchCreated {
                match_id: "m2".into(),
            }),
            TransportMessage::error("rate limited"),
            TransportMessage::connected().with_timestamp(0),
            TransportMessage::disconnected(),
        ];
        for msg in messages {
            let raw = encode(&msg).unwrap();
            assert_eq!(decode(&raw).unwrap(), msg, "round trip of {raw}");
        }
    }
}

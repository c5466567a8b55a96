#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Envelope codec tests against JSON fixtures shaped like real engine output.

use broadside_client::error_codes::FailureCode;
use broadside_client::event::validate;
use broadside_client::{
    decode, encode, DecodeError, EventKind, GameEvent, MessageBody, ShotResult, TransportMessage,
};
use serde_json::{json, Value};
use tokio_test::{assert_err, assert_ok};

// ════════════════════════════════════════════════════════════════════
// Fixtures
// ════════════════════════════════════════════════════════════════════

/// One envelope per event kind, as the engine emits them.
fn engine_fixtures() -> Vec<(Value, GameEvent)> {
    vec![
        (
            json!({"kind": "MatchCreated", "matchId": "7f3a"}),
            GameEvent::MatchCreated {
                match_id: "7f3a".into(),
            },
        ),
        (
            json!({"kind": "ShipsPlaced", "matchId": "7f3a", "player": "alice"}),
            GameEvent::ShipsPlaced {
                match_id: "7f3a".into(),
            },
        ),
        (
            json!({"kind": "ShotProposed", "matchId": "7f3a", "x": 4, "y": 9}),
            GameEvent::ShotProposed {
                match_id: "7f3a".into(),
                x: 4,
                y: 9,
            },
        ),
        (
            json!({"kind": "ShotFired", "matchId": "7f3a", "x": 4, "y": 9, "result": "sunk"}),
            GameEvent::ShotFired {
                match_id: "7f3a".into(),
                x: 4,
                y: 9,
                result: ShotResult::Sunk,
            },
        ),
        (
            json!({"kind": "Winner", "matchId": "7f3a"}),
            GameEvent::Winner {
                match_id: "7f3a".into(),
            },
        ),
        (
            json!({"kind": "MatchEnded", "matchId": "7f3a"}),
            GameEvent::MatchEnded {
                match_id: "7f3a".into(),
            },
        ),
    ]
}

// ════════════════════════════════════════════════════════════════════
// Decoding
// ════════════════════════════════════════════════════════════════════

#[test]
fn decodes_every_engine_event() {
    for (payload, expected) in engine_fixtures() {
        let raw = json!({"kind": "event", "payload": payload, "timestamp": 1_700_000_000_123_u64})
            .to_string();
        let msg = assert_ok!(decode(&raw));
        assert_eq!(msg.body, MessageBody::Event(expected));
        assert_eq!(msg.timestamp, Some(1_700_000_000_123));
    }
}

#[test]
fn every_event_kind_has_a_fixture() {
    let kinds: Vec<EventKind> = engine_fixtures().iter().map(|(_, e)| e.kind()).collect();
    assert_eq!(kinds, EventKind::ALL.to_vec());
}

#[test]
fn unknown_result_strings_are_preserved() {
    let event = assert_ok!(validate(&json!({
        "kind": "ShotFired", "matchId": "m", "x": 0, "y": 0, "result": "deflected"
    })));
    let GameEvent::ShotFired { result, .. } = event else {
        panic!("wrong variant");
    };
    assert_eq!(result, ShotResult::from("deflected"));
    assert!(matches!(result, ShotResult::Other(ref unknown) if unknown.as_str() == "deflected"));
    assert!(!result.is_hit());
}

#[test]
fn payload_failures_are_malformed_event() {
    let cases = [
        json!({"kind": "Teleported", "matchId": "m"}),
        json!({"matchId": "m"}),
        json!({"kind": "ShotFired", "matchId": "m", "x": 1, "y": 1}),
        json!({"kind": "ShotProposed", "matchId": "m", "x": 1}),
        json!({"kind": "ShotProposed", "matchId": "m", "x": 300, "y": 1}),
        json!({"kind": "ShotProposed", "matchId": "m", "x": -1, "y": 1}),
        json!({"kind": "Winner"}),
        json!({"kind": "MatchCreated", "matchId": 12}),
        json!("MatchCreated"),
    ];
    for payload in cases {
        let raw = json!({"kind": "event", "payload": payload}).to_string();
        let err = assert_err!(decode(&raw));
        assert_eq!(err.code(), FailureCode::MalformedEvent, "{raw}");
    }
}

#[test]
fn envelope_failures_have_distinct_codes() {
    let cases = [
        (r#"{"kind":"ping"}"#, FailureCode::UnknownEnvelopeKind),
        (r#"{}"#, FailureCode::UnknownEnvelopeKind),
        (r#"{"kind":null}"#, FailureCode::UnknownEnvelopeKind),
        (r#"{"kind":"error"}"#, FailureCode::MissingErrorText),
        (r#"{"kind":"error","errorText":null}"#, FailureCode::MissingErrorText),
        (r#"{"kind":"event"}"#, FailureCode::MalformedEvent),
        (r#"{"kind":"event""#, FailureCode::MalformedEnvelope),
        (r#"[{"kind":"connected"}]"#, FailureCode::MalformedEnvelope),
    ];
    for (raw, code) in cases {
        let err = assert_err!(decode(raw));
        assert_eq!(err.code(), code, "{raw}");
    }
}

#[test]
fn empty_error_text_is_accepted() {
    let msg = assert_ok!(decode(r#"{"kind":"error","errorText":""}"#));
    assert_eq!(
        msg.body,
        MessageBody::Error {
            error_text: String::new()
        }
    );
}

#[test]
fn unknown_kind_error_names_the_kind() {
    let err = assert_err!(decode(r#"{"kind":"heartbeat"}"#));
    assert_eq!(err.to_string(), "unknown envelope kind: heartbeat");
    let err = assert_err!(decode(r#"{"timestamp":3}"#));
    assert_eq!(err.to_string(), "unknown envelope kind: <absent>");
    assert!(matches!(err, DecodeError::UnknownEnvelopeKind { kind: None }));
}

// ════════════════════════════════════════════════════════════════════
// Encoding
// ════════════════════════════════════════════════════════════════════

#[test]
fn encoded_event_uses_camel_case_wire_names() {
    let raw = encode(&TransportMessage::event(GameEvent::ShotProposed {
        match_id: "m9".into(),
        x: 2,
        y: 7,
    }))
    .unwrap();
    let value: Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(
        value,
        json!({
            "kind": "event",
            "payload": {"kind": "ShotProposed", "matchId": "m9", "x": 2, "y": 7}
        })
    );
}

#[test]
fn encoded_result_is_plain_string() {
    let raw = encode(&TransportMessage::event(GameEvent::ShotFired {
        match_id: "m".into(),
        x: 0,
        y: 1,
        result: ShotResult::Miss,
    }))
    .unwrap();
    let value: Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(value["payload"]["result"], "miss");
}

#[test]
fn engine_fixtures_survive_encode_then_decode() {
    for (_, event) in engine_fixtures() {
        for msg in [
            TransportMessage::event(event.clone()),
            TransportMessage::event(event.clone()).with_timestamp(42),
        ] {
            let raw = encode(&msg).unwrap();
            assert_eq!(decode(&raw).unwrap(), msg);
        }
    }
}

// ════════════════════════════════════════════════════════════════════
// Failure codes
// ════════════════════════════════════════════════════════════════════

#[test]
fn failure_codes_serialize_screaming_snake_case() {
    let expected = [
        "UNKNOWN_ENVELOPE_KIND",
        "MISSING_ERROR_TEXT",
        "MALFORMED_EVENT",
        "MALFORMED_ENVELOPE",
        "OUT_OF_ORDER_EVENT",
        "CONFLICTING_RESULT",
        "MATCH_ALREADY_ENDED",
        "OBSERVER_FAILED",
    ];
    for (code, name) in FailureCode::ALL.iter().zip(expected) {
        assert_eq!(serde_json::to_value(code).unwrap(), json!(name));
        let back: FailureCode = serde_json::from_value(json!(name)).unwrap();
        assert_eq!(back, *code);
    }
}

//! Game events streamed by the match engine.
//!
//! [`GameEvent`] is a closed sum type tagged by its `kind` field. Payload
//! fields live only on the variants that use them, so an event with
//! coordinates but no result, or a result on a `Winner`, cannot be built.
//!
//! ```
//! use broadside_client::event::{validate, GameEvent, ShotResult};
//!
//! let raw = serde_json::json!({
//!     "kind": "ShotFired",
//!     "matchId": "match-1",
//!     "x": 2,
//!     "y": 3,
//!     "result": "hit"
//! });
//! let event = validate(&raw).unwrap();
//! assert!(matches!(event, GameEvent::ShotFired { result: ShotResult::Hit, .. }));
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DecodeError;

// ── Identifiers ─────────────────────────────────────────────────────

/// Opaque identifier of a match, assigned by the match engine.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MatchId(String);

impl MatchId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MatchId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for MatchId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A board cell, as `(x, y)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Coordinate {
    pub x: u8,
    pub y: u8,
}

impl Coordinate {
    pub fn new(x: u8, y: u8) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

// ── Shot results ────────────────────────────────────────────────────

/// Resolved outcome of a shot.
///
/// The engine reports outcomes as strings. Unrecognized values are kept
/// verbatim in [`ShotResult::Other`] rather than rejected. Build values with
/// [`ShotResult::from`]; `Other` never holds `"hit"`, `"miss"` or `"sunk"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ShotResult {
    Hit,
    Miss,
    Sunk,
    Other(UnknownResult),
}

/// An outcome string the client does not recognize.
///
/// Only [`ShotResult::from`] creates one, so it never spells a known result.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UnknownResult(String);

impl UnknownResult {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl ShotResult {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Hit => "hit",
            Self::Miss => "miss",
            Self::Sunk => "sunk",
            Self::Other(s) => s.as_str(),
        }
    }

    /// `true` for outcomes that struck a ship.
    pub fn is_hit(&self) -> bool {
        matches!(self, Self::Hit | Self::Sunk)
    }
}

impl From<String> for ShotResult {
    fn from(s: String) -> Self {
        match s.as_str() {
            "hit" => Self::Hit,
            "miss" => Self::Miss,
            "sunk" => Self::Sunk,
            _ => Self::Other(UnknownResult(s)),
        }
    }
}

impl From<&str> for ShotResult {
    fn from(s: &str) -> Self {
        Self::from(s.to_owned())
    }
}

impl From<ShotResult> for String {
    fn from(result: ShotResult) -> Self {
        match result {
            ShotResult::Other(UnknownResult(s)) => s,
            known => known.as_str().to_owned(),
        }
    }
}

impl fmt::Display for ShotResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Events ──────────────────────────────────────────────────────────

/// Events emitted by the match engine, one per game action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all_fields = "camelCase")]
pub enum GameEvent {
    /// A new match exists.
    MatchCreated { match_id: MatchId },
    /// One player finished placing their fleet.
    ShipsPlaced { match_id: MatchId },
    /// A shot at `(x, y)` was proposed and awaits resolution.
    ShotProposed { match_id: MatchId, x: u8, y: u8 },
    /// A shot at `(x, y)` was resolved.
    ShotFired {
        match_id: MatchId,
        x: u8,
        y: u8,
        result: ShotResult,
    },
    /// The match has a winner.
    Winner { match_id: MatchId },
    /// The match is over.
    MatchEnded { match_id: MatchId },
}

impl GameEvent {
    pub fn match_id(&self) -> &MatchId {
        match self {
            Self::MatchCreated { match_id }
            | Self::ShipsPlaced { match_id }
            | Self::ShotProposed { match_id, .. }
            | Self::ShotFired { match_id, .. }
            | Self::Winner { match_id }
            | Self::MatchEnded { match_id } => match_id,
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Self::MatchCreated { .. } => EventKind::MatchCreated,
            Self::ShipsPlaced { .. } => EventKind::ShipsPlaced,
            Self::ShotProposed { .. } => EventKind::ShotProposed,
            Self::ShotFired { .. } => EventKind::ShotFired,
            Self::Winner { .. } => EventKind::Winner,
            Self::MatchEnded { .. } => EventKind::MatchEnded,
        }
    }

    /// The targeted cell, for shot events.
    pub fn coordinate(&self) -> Option<Coordinate> {
        match self {
            Self::ShotProposed { x, y, .. } | Self::ShotFired { x, y, .. } => {
                Some(Coordinate::new(*x, *y))
            }
            _ => None,
        }
    }
}

/// Discriminant of a [`GameEvent`], without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    MatchCreated,
    ShipsPlaced,
    ShotProposed,
    ShotFired,
    Winner,
    MatchEnded,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        Self::MatchCreated,
        Self::ShipsPlaced,
        Self::ShotProposed,
        Self::ShotFired,
        Self::Winner,
        Self::MatchEnded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MatchCreated => "MatchCreated",
            Self::ShipsPlaced => "ShipsPlaced",
            Self::ShotProposed => "ShotProposed",
            Self::ShotFired => "ShotFired",
            Self::Winner => "Winner",
            Self::MatchEnded => "MatchEnded",
        }
    }

    fn from_wire(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Validation ──────────────────────────────────────────────────────

/// Classify an arbitrary decoded value as a [`GameEvent`].
///
/// Unknown extra fields are ignored.
///
/// # Errors
///
/// Returns [`DecodeError::MalformedEvent`] if the value is not an object, the
/// `kind` discriminant is missing or unrecognized, or a field required by that
/// discriminant is missing or of the wrong type.
pub fn validate(value: &Value) -> Result<GameEvent, DecodeError> {
    let obj = value
        .as_object()
        .ok_or_else(|| DecodeError::malformed_event("payload is not an object"))?;

    let kind = match obj.get("kind") {
        Some(Value::String(s)) => EventKind::from_wire(s)
            .ok_or_else(|| DecodeError::malformed_event(format!("unknown event kind `{s}`")))?,
        Some(_) => return Err(DecodeError::malformed_event("event kind is not a string")),
        None => return Err(DecodeError::malformed_event("event kind is missing")),
    };

    // The discriminant is known; serde reports the first missing or
    // mistyped field for that variant.
    GameEvent::deserialize(value)
        .map_err(|e| DecodeError::malformed_event(format!("invalid {kind} payload: {e}")))
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
    use serde_json::json;

    fn assert_malformed(value: Value) {
        match validate(&value) {
            Err(DecodeError::MalformedEvent { .. }) => {}
            other => panic!("expected MalformedEvent for {value}, got {other:?}"),
        }
    }

    #[test]
    fn validates_every_variant() {
        let cases = [
            (json!({"kind": "MatchCreated", "matchId": "m"}), EventKind::MatchCreated),
            (json!({"kind": "ShipsPlaced", "matchId": "m"}), EventKind::ShipsPlaced),
            (
                json!({"kind": "ShotProposed", "matchId": "m", "x": 0, "y": 9}),
                EventKind::ShotProposed,
            ),
            (
                json!({"kind": "ShotFired", "matchId": "m", "x": 1, "y": 1, "result": "miss"}),
                EventKind::ShotFired,
            ),
            (json!({"kind": "Winner", "matchId": "m"}), EventKind::Winner),
            (json!({"kind": "MatchEnded", "matchId": "m"}), EventKind::MatchEnded),
        ];
        for (value, kind) in cases {
            let event = validate(&value).unwrap();
            assert_eq!(event.kind(), kind);
            assert_eq!(event.match_id().as_str(), "m");
        }
    }

    #[test]
    fn shot_proposed_without_coordinates_is_malformed() {
        assert_malformed(json!({"kind": "ShotProposed", "matchId": "m1"}));
        assert_malformed(json!({"kind": "ShotProposed", "matchId": "m1", "x": 1}));
    }

    #[test]
    fn non_numeric_coordinates_are_malformed() {
        assert_malformed(json!({"kind": "ShotProposed", "matchId": "m", "x": "2", "y": 3}));
        assert_malformed(json!({"kind": "ShotProposed", "matchId": "m", "x": -1, "y": 3}));
        assert_malformed(json!({"kind": "ShotProposed", "matchId": "m", "x": 2.5, "y": 3}));
        assert_malformed(json!({"kind": "ShotProposed", "matchId": "m", "x": 256, "y": 3}));
    }

    #[test]
    fn shot_fired_requires_result_string() {
        assert_malformed(json!({"kind": "ShotFired", "matchId": "m", "x": 2, "y": 3}));
        assert_malformed(json!({"kind": "ShotFired", "matchId": "m", "x": 2, "y": 3, "result": 1}));
    }

    #[test]
    fn unknown_or_missing_discriminant_is_malformed() {
        assert_malformed(json!({"kind": "ShipSunk", "matchId": "m"}));
        assert_malformed(json!({"matchId": "m"}));
        assert_malformed(json!({"kind": 3, "matchId": "m"}));
        assert_malformed(json!(["MatchCreated"]));
    }

    #[test]
    fn match_id_must_be_a_string() {
        assert_malformed(json!({"kind": "Winner"}));
        assert_malformed(json!({"kind": "Winner", "matchId": 7}));
    }

    #[test]
    fn extra_fields_are_ignored() {
        let event = validate(&json!({
            "kind": "MatchCreated",
            "matchId": "m",
            "x": 4,
            "players": ["a", "b"]
        }))
        .unwrap();
        assert_eq!(
            event,
            GameEvent::MatchCreated {
                match_id: "m".into()
            }
        );
    }

    #[test]
    fn unrecognized_shot_result_is_preserved() {
        let event = validate(&json!({
            "kind": "ShotFired", "matchId": "m", "x": 0, "y": 0, "result": "grazed"
        }))
        .unwrap();
        match event {
            GameEvent::ShotFired { result, .. } => {
                assert_eq!(result, ShotResult::from("grazed"));
                assert_eq!(String::from(result), "grazed");
            }
            other => panic!("expected ShotFired, got {other:?}"),
        }
    }

    #[test]
    fn serializes_with_camel_case_match_id() {
        let event = GameEvent::ShotProposed {
            match_id: "m1".into(),
            x: 2,
            y: 3,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({"kind": "ShotProposed", "matchId": "m1", "x": 2, "y": 3})
        );
    }

    #[test]
    fn payload_free_variants_serialize_without_shot_fields() {
        let value = serde_json::to_value(GameEvent::Winner {
            match_id: "m1".into(),
        })
        .unwrap();
        let obj = value.as_object().unwrap();
        assert!(!obj.contains_key("x"));
        assert!(!obj.contains_key("y"));
        assert!(!obj.contains_key("result"));
    }

    #[test]
    fn shot_result_hit_classification() {
        assert!(ShotResult::Hit.is_hit());
        assert!(ShotResult::Sunk.is_hit());
        assert!(!ShotResult::Miss.is_hit());
        assert!(!ShotResult::from("grazed").is_hit());
    }

    #[test]
    fn known_result_names_never_become_other() {
        for name in ["hit", "miss", "sunk"] {
            let result = ShotResult::from(name);
            assert!(!matches!(result, ShotResult::Other(_)), "{name}");
            let back: ShotResult =
                serde_json::from_value(serde_json::to_value(&result).unwrap()).unwrap();
            assert_eq!(back, result);
        }
        let unknown = ShotResult::from("grazed");
        let back: ShotResult =
            serde_json::from_value(serde_json::to_value(&unknown).unwrap()).unwrap();
        assert_eq!(back, unknown);
    }

    #[test]
    fn coordinate_accessor_only_on_shots() {
        let fired = GameEvent::ShotFired {
            match_id: "m".into(),
            x: 4,
            y: 5,
            result: ShotResult::Miss,
        };
        assert_eq!(fired.coordinate(), Some(Coordinate::new(4, 5)));
        assert_eq!(
            GameEvent::MatchEnded {
                match_id: "m".into()
            }
            .coordinate(),
            None
        );
    }
}

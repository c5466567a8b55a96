//! Stable failure codes for decode, fold, and dispatch failures.
//!
//! Codes serialize as `SCREAMING_SNAKE_CASE` strings so they can be logged,
//! shipped to telemetry, or matched on by UI code without depending on the
//! shape of the Rust error enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Machine-readable classification of every failure the core can report.
///
/// Obtain one from [`DecodeError::code`](crate::error::DecodeError::code) or
/// [`FoldError::code`](crate::error::FoldError::code). Use
/// [`description()`](FailureCode::description) for a human-readable explanation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureCode {
    // Decode-time
    UnknownEnvelopeKind,
    MissingErrorText,
    MalformedEvent,
    MalformedEnvelope,

    // Fold-time
    OutOfOrderEvent,
    ConflictingResult,
    MatchAlreadyEnded,

    // Dispatch
    ObserverFailed,
}

impl FailureCode {
    /// Every code, in declaration order.
    pub const ALL: [FailureCode; 8] = [
        Self::UnknownEnvelopeKind,
        Self::MissingErrorText,
        Self::MalformedEvent,
        Self::MalformedEnvelope,
        Self::OutOfOrderEvent,
        Self::ConflictingResult,
        Self::MatchAlreadyEnded,
        Self::ObserverFailed,
    ];

    /// Returns a human-readable description of this failure code.
    pub fn description(&self) -> &'static str {
        match self {
            Self::UnknownEnvelopeKind => {
                "The envelope `kind` is missing or is not one of event, error, connected, disconnected."
            }
            Self::MissingErrorText => "An error envelope arrived without a string `errorText`.",
            Self::MalformedEvent => {
                "The event payload is missing, has an unknown discriminant, or lacks a required field."
            }
            Self::MalformedEnvelope => {
                "The frame is not a JSON object or carries a field of the wrong type."
            }
            Self::OutOfOrderEvent => {
                "The event is not valid in the match's current phase, or the match was never created."
            }
            Self::ConflictingResult => {
                "The event contradicts a result already recorded for this match."
            }
            Self::MatchAlreadyEnded => {
                "The match has ended; later events for it are rejected and can usually be dropped."
            }
            Self::ObserverFailed => "A state observer returned an error or panicked.",
        }
    }

    /// Returns `true` for codes produced while folding events into state.
    pub fn is_fold_failure(&self) -> bool {
        matches!(
            self,
            Self::OutOfOrderEvent | Self::ConflictingResult | Self::MatchAlreadyEnded
        )
    }
}

impl fmt::Display for FailureCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Reuse the serde representation so Display matches the wire format.
        let json = serde_json::to_value(self).map_err(|_| fmt::Error)?;
        match json.as_str() {
            Some(s) => f.write_str(s),
            None => Err(fmt::Error),
        }
    }
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

    #[test]
    fn display_matches_serde_representation() {
        for code in FailureCode::ALL {
            let json = serde_json::to_string(&code).unwrap();
            assert_eq!(json, format!("\"{code}\""));
        }
        assert_eq!(
            FailureCode::MatchAlreadyEnded.to_string(),
            "MATCH_ALREADY_ENDED"
        );
    }

    #[test]
    fn every_code_has_a_description() {
        for code in FailureCode::ALL {
            assert!(!code.description().is_empty(), "{code} has no description");
        }
    }

    #[test]
    fn fold_failures_are_classified() {
        let fold: Vec<_> = FailureCode::ALL
            .into_iter()
            .filter(FailureCode::is_fold_failure)
            .collect();
        assert_eq!(
            fold,
            vec![
                FailureCode::OutOfOrderEvent,
                FailureCode::ConflictingResult,
                FailureCode::MatchAlreadyEnded,
            ]
        );
    }
}

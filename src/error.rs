//! Error types for the broadside client.

use thiserror::Error;

use crate::error_codes::FailureCode;
use crate::event::{Coordinate, EventKind, MatchId, ShotResult};
use crate::state::{MatchPhase, Winner};

/// Failures raised while decoding a transport frame into a typed message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The envelope `kind` is absent or not one of the recognized values.
    #[error("unknown envelope kind: {}", .kind.as_deref().unwrap_or("<absent>"))]
    UnknownEnvelopeKind {
        /// The raw `kind` value, if it was a string.
        kind: Option<String>,
    },

    /// An `error` envelope without a string `errorText`.
    #[error("error envelope is missing errorText")]
    MissingErrorText,

    /// The event payload failed validation.
    #[error("malformed event: {reason}")]
    MalformedEvent {
        /// What was wrong with the payload.
        reason: String,
    },

    /// The frame could not be read as an envelope object at all.
    #[error("malformed envelope: {reason}")]
    MalformedEnvelope {
        /// What was wrong with the frame.
        reason: String,
    },
}

impl DecodeError {
    pub(crate) fn malformed_event(reason: impl Into<String>) -> Self {
        Self::MalformedEvent {
            reason: reason.into(),
        }
    }

    pub(crate) fn malformed_envelope(reason: impl Into<String>) -> Self {
        Self::MalformedEnvelope {
            reason: reason.into(),
        }
    }

    /// Stable code for this failure.
    pub fn code(&self) -> FailureCode {
        match self {
            Self::UnknownEnvelopeKind { .. } => FailureCode::UnknownEnvelopeKind,
            Self::MissingErrorText => FailureCode::MissingErrorText,
            Self::MalformedEvent { .. } => FailureCode::MalformedEvent,
            Self::MalformedEnvelope { .. } => FailureCode::MalformedEnvelope,
        }
    }
}

/// The recorded value an incoming event contradicted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Conflict {
    /// A cell already holds a different shot result.
    Shot {
        at: Coordinate,
        recorded: ShotResult,
        incoming: ShotResult,
    },
    /// The match already has a different winner.
    Winner { recorded: Winner, incoming: Winner },
}

impl std::fmt::Display for Conflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Shot {
                at,
                recorded,
                incoming,
            } => write!(f, "cell {at} is {recorded}, incoming {incoming}"),
            Self::Winner { recorded, incoming } => {
                write!(f, "winner is {recorded}, incoming {incoming}")
            }
        }
    }
}

/// Failures raised while folding an event into match state.
///
/// A failed fold never changes state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FoldError {
    /// The event is not valid for the match's current phase.
    #[error("{kind} for match {match_id} is out of order (phase {phase})")]
    OutOfOrderEvent {
        match_id: MatchId,
        kind: EventKind,
        phase: MatchPhase,
    },

    /// The event contradicts a previously recorded result.
    #[error("conflicting result for match {match_id}: {conflict}")]
    ConflictingResult { match_id: MatchId, conflict: Conflict },

    /// The match has ended and accepts no further events.
    #[error("match {match_id} has already ended; {kind} rejected")]
    MatchAlreadyEnded { match_id: MatchId, kind: EventKind },
}

impl FoldError {
    /// Stable code for this failure.
    pub fn code(&self) -> FailureCode {
        match self {
            Self::OutOfOrderEvent { .. } => FailureCode::OutOfOrderEvent,
            Self::ConflictingResult { .. } => FailureCode::ConflictingResult,
            Self::MatchAlreadyEnded { .. } => FailureCode::MatchAlreadyEnded,
        }
    }

    /// The match the rejected event was addressed to.
    pub fn match_id(&self) -> &MatchId {
        match self {
            Self::OutOfOrderEvent { match_id, .. }
            | Self::ConflictingResult { match_id, .. }
            | Self::MatchAlreadyEnded { match_id, .. } => match_id,
        }
    }

    /// Returns `true` if the caller can safely log and drop this failure.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::MatchAlreadyEnded { .. })
    }
}

/// A failure reported by a state observer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("observer failed: {0}")]
pub struct ObserverError(pub String);

impl ObserverError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Failure of a single frame passed through a [`MatchSession`](crate::session::MatchSession).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Fold(#[from] FoldError),
}

impl SessionError {
    /// Stable code for this failure.
    pub fn code(&self) -> FailureCode {
        match self {
            Self::Decode(e) => e.code(),
            Self::Fold(e) => e.code(),
        }
    }
}

/// Errors that can occur when using the broadside client.
#[derive(Debug, Error)]
pub enum BroadsideError {
    /// Failed to receive a frame from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// Failed to close the transport cleanly.
    #[error("transport close error: {0}")]
    TransportClose(String),

    /// The transport connection was closed unexpectedly.
    #[error("transport connection closed")]
    TransportClosed,

    /// Failed to serialize an envelope.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The client's transport loop is no longer running.
    #[error("not connected")]
    NotConnected,

    /// A frame could not be decoded.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// An event could not be folded into match state.
    #[error(transparent)]
    Fold(#[from] FoldError),

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<SessionError> for BroadsideError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Decode(e) => Self::Decode(e),
            SessionError::Fold(e) => Self::Fold(e),
        }
    }
}

/// A specialized [`Result`] type for broadside client operations.
pub type Result<T> = std::result::Result<T, BroadsideError>;

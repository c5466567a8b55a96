//! # Broadside Client
//!
//! Event-stream client for networked two-player battleship matches.
//!
//! A remote match engine pushes JSON envelopes over a persistent connection.
//! This crate decodes them, folds the game events into authoritative
//! per-match state, and notifies UI observers of every change.
//!
//! ## Layers
//!
//! - **Core** (synchronous): [`event`] and [`protocol`] decode frames,
//!   [`state`] folds events into [`MatchState`], [`dispatch`] notifies
//!   observers, and [`session`] chains the three.
//! - **Client** (`tokio-runtime` feature): [`BroadsideClient`] drives any
//!   [`Transport`] into a session on a background task.
//! - **WebSocket** (`transport-websocket` feature, default):
//!   [`WebSocketTransport`].
//!
//! ## Quick Start
//!
//! ```
//! use broadside_client::{MatchPhase, MatchSession, StateChange};
//!
//! let mut session = MatchSession::default();
//! session.subscribe("m1", |change: &StateChange| {
//!     println!("{}: {}", change.match_id(), change.current.phase());
//! });
//!
//! session
//!     .ingest(r#"{"kind":"event","payload":{"kind":"MatchCreated","matchId":"m1"}}"#)
//!     .unwrap();
//! assert_eq!(session.store().phase_of(&"m1".into()), MatchPhase::Created);
//! ```

pub mod dispatch;
pub mod error;
pub mod error_codes;
pub mod event;
pub mod protocol;
pub mod session;
pub mod state;
pub mod transport;
pub mod transports;

#[cfg(feature = "tokio-runtime")]
pub mod client;

pub use dispatch::{DispatchReport, Dispatcher, Observer, SubscriptionHandle};
pub use error::{BroadsideError, DecodeError, FoldError, ObserverError, SessionError};
pub use error_codes::FailureCode;
pub use event::{Coordinate, EventKind, GameEvent, MatchId, ShotResult, UnknownResult};
pub use protocol::{decode, encode, MessageBody, TransportMessage};
pub use session::{Ingested, MatchSession};
pub use state::{
    FoldOutcome, MatchPhase, MatchState, MatchStore, PlayerContext, StateChange, Winner,
};
pub use transport::Transport;

#[cfg(feature = "tokio-runtime")]
pub use client::{BroadsideClient, BroadsideConfig, BroadsideEvent, FailureAction, FailurePolicy};

#[cfg(feature = "transport-websocket")]
pub use transports::WebSocketTransport;

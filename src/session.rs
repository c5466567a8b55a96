//! Decode → fold → dispatch pipeline.
//!
//! A [`MatchSession`] is the synchronous heart of the client: it takes raw
//! frames in delivery order, keeps the [`MatchStore`] current, and notifies
//! observers of every committed change. It holds no global state; build one
//! per connection.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::dispatch::{DispatchReport, Dispatcher, Observer, SubscriptionHandle};
use crate::error::SessionError;
use crate::event::{GameEvent, MatchId};
use crate::protocol::{self, MessageBody, TransportMessage};
use crate::state::{FoldOutcome, MatchState, MatchStore, PlayerContext, StateChange};

/// What a successfully processed frame did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ingested {
    /// An event changed match state and observers were notified.
    Applied {
        change: StateChange,
        report: DispatchReport,
    },
    /// An event repeated something already recorded.
    Unchanged { match_id: MatchId },
    /// The engine reported an error.
    ServerError { error_text: String },
    Connected,
    Disconnected,
}

/// Owns the match store and observer registry for one connection.
#[derive(Debug, Default)]
pub struct MatchSession {
    store: MatchStore,
    dispatcher: Dispatcher,
    last_timestamps: HashMap<MatchId, u64>,
}

impl MatchSession {
    /// Create a session that resolves winners through `context`.
    pub fn new(context: impl PlayerContext + 'static) -> Self {
        Self::with_parts(MatchStore::new(context), Dispatcher::new())
    }

    pub fn with_parts(store: MatchStore, dispatcher: Dispatcher) -> Self {
        Self {
            store,
            dispatcher,
            last_timestamps: HashMap::new(),
        }
    }

    /// Decode and apply one raw frame.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Decode`] if the frame does not decode and
    /// [`SessionError::Fold`] if its event is rejected. Neither changes state.
    pub fn ingest(&mut self, raw: &str) -> Result<Ingested, SessionError> {
        let msg = protocol::decode(raw)?;
        self.apply(msg)
    }

    /// Apply an already-decoded message.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Fold`] if the event is rejected.
    pub fn apply(&mut self, msg: TransportMessage) -> Result<Ingested, SessionError> {
        match msg.body {
            MessageBody::Event(event) => self.fold_and_notify(event, msg.timestamp),
            MessageBody::Error { error_text } => {
                debug!(%error_text, "server error envelope");
                Ok(Ingested::ServerError { error_text })
            }
            MessageBody::Connected => Ok(Ingested::Connected),
            MessageBody::Disconnected => Ok(Ingested::Disconnected),
        }
    }

    /// Apply a bare event with no envelope timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Fold`] if the event is rejected.
    pub fn apply_event(&mut self, event: GameEvent) -> Result<Ingested, SessionError> {
        self.fold_and_notify(event, None)
    }

    fn fold_and_notify(
        &mut self,
        event: GameEvent,
        timestamp: Option<u64>,
    ) -> Result<Ingested, SessionError> {
        let outcome = self.store.fold(&event)?;
        if let Some(ts) = timestamp {
            self.record_timestamp(event.match_id(), ts);
        }

        match outcome {
            FoldOutcome::Unchanged => Ok(Ingested::Unchanged {
                match_id: event.match_id().clone(),
            }),
            FoldOutcome::Changed(mut change) => {
                change.timestamp = timestamp;
                let report = self.dispatcher.notify(&change);
                Ok(Ingested::Applied { change, report })
            }
        }
    }

    fn record_timestamp(&mut self, match_id: &MatchId, ts: u64) {
        match self.last_timestamps.get_mut(match_id) {
            Some(last) if ts < *last => {
                warn!(
                    match_id = %match_id,
                    timestamp = ts,
                    last_seen = *last,
                    "event timestamp went backwards"
                );
            }
            Some(last) => *last = ts,
            None => {
                self.last_timestamps.insert(match_id.clone(), ts);
            }
        }
    }

    pub fn subscribe(
        &mut self,
        match_id: impl Into<MatchId>,
        observer: impl Observer + 'static,
    ) -> SubscriptionHandle {
        self.dispatcher.subscribe(match_id, observer)
    }

    pub fn unsubscribe(&mut self, handle: &SubscriptionHandle) -> bool {
        self.dispatcher.unsubscribe(handle)
    }

    pub fn current_state(&self, match_id: &MatchId) -> Option<&MatchState> {
        self.store.current_state(match_id)
    }

    pub fn store(&self) -> &MatchStore {
        &self.store
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Forget every ended match. Returns how many were removed.
    pub fn prune_ended(&mut self) -> usize {
        let removed = self.store.prune_ended();
        let store = &self.store;
        self.last_timestamps
            .retain(|id, _| store.current_state(id).is_some());
        removed
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
    use crate::error::{DecodeError, FoldError};
    use crate::state::{MatchPhase, Winner};
    use std::sync::{Arc, Mutex};

    fn frame(payload: &str) -> String {
        format!(r#"{{"kind":"event","payload":{payload}}}"#)
    }

    #[test]
    fn ingest_runs_full_pipeline() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut session = MatchSession::default();
        let sink = Arc::clone(&seen);
        session.subscribe("m1", move |change: &StateChange| {
            sink.lock().unwrap().push(change.current.phase());
        });

        session
            .ingest(&frame(r#"{"kind":"MatchCreated","matchId":"m1"}"#))
            .unwrap();
        let out = session
            .ingest(r#"{"kind":"event","payload":{"kind":"ShipsPlaced","matchId":"m1"},"timestamp":10}"#)
            .unwrap();

        let Ingested::Applied { change, report } = out else {
            panic!("expected applied, got {out:?}");
        };
        assert_eq!(change.timestamp, Some(10));
        assert_eq!(change.previous_phase(), MatchPhase::Created);
        assert_eq!(report.notified, 1);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![MatchPhase::Created, MatchPhase::PlacementPhase]
        );
    }

    #[test]
    fn status_and_error_envelopes_pass_through() {
        let mut session = MatchSession::default();
        assert_eq!(
            session.ingest(r#"{"kind":"connected"}"#).unwrap(),
            Ingested::Connected
        );
        assert_eq!(
            session
                .ingest(r#"{"kind":"error","errorText":"bad move"}"#)
                .unwrap(),
            Ingested::ServerError {
                error_text: "bad move".into()
            }
        );
        assert_eq!(
            session.ingest(r#"{"kind":"disconnected"}"#).unwrap(),
            Ingested::Disconnected
        );
        assert!(session.store().is_empty());
    }

    #[test]
    fn decode_failure_leaves_state_untouched() {
        let mut session = MatchSession::default();
        session
            .apply_event(GameEvent::MatchCreated {
                match_id: "m1".into(),
            })
            .unwrap();
        let before = session.current_state(&"m1".into()).cloned();

        let err = session.ingest(r#"{"kind":"mystery"}"#).unwrap_err();
        assert!(matches!(
            err,
            SessionError::Decode(DecodeError::UnknownEnvelopeKind { .. })
        ));
        assert_eq!(session.current_state(&"m1".into()).cloned(), before);
    }

    #[test]
    fn fold_failure_does_not_notify() {
        let calls = Arc::new(Mutex::new(0_u32));
        let mut session = MatchSession::default();
        let counter = Arc::clone(&calls);
        session.subscribe("m1", move |_: &StateChange| {
            *counter.lock().unwrap() += 1;
        });

        let err = session
            .apply_event(GameEvent::Winner {
                match_id: "m1".into(),
            })
            .unwrap_err();
        assert!(matches!(
            err,
            SessionError::Fold(FoldError::OutOfOrderEvent { .. })
        ));
        assert_eq!(*calls.lock().unwrap(), 0);
    }

    #[test]
    fn repeated_event_reports_unchanged() {
        let mut session = MatchSession::default();
        let created = GameEvent::MatchCreated {
            match_id: "m1".into(),
        };
        session.apply_event(created.clone()).unwrap();
        assert_eq!(
            session.apply_event(created).unwrap(),
            Ingested::Unchanged {
                match_id: "m1".into()
            }
        );
    }

    #[test]
    fn backwards_timestamp_is_still_applied() {
        let mut session = MatchSession::default();
        session
            .apply(
                TransportMessage::event(GameEvent::MatchCreated {
                    match_id: "m1".into(),
                })
                .with_timestamp(100),
            )
            .unwrap();
        let out = session
            .apply(
                TransportMessage::event(GameEvent::ShipsPlaced {
                    match_id: "m1".into(),
                })
                .with_timestamp(50),
            )
            .unwrap();
        assert!(matches!(out, Ingested::Applied { .. }));
        assert_eq!(
            session.store().phase_of(&"m1".into()),
            MatchPhase::PlacementPhase
        );
    }

    #[test]
    fn rejected_frames_leave_timestamps_untouched() {
        let mut session = MatchSession::default();
        let err = session
            .apply(
                TransportMessage::event(GameEvent::ShipsPlaced {
                    match_id: "ghost".into(),
                })
                .with_timestamp(100),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            SessionError::Fold(FoldError::OutOfOrderEvent { .. })
        ));
        assert!(session.last_timestamps.get(&"ghost".into()).is_none());

        session
            .apply(
                TransportMessage::event(GameEvent::MatchCreated {
                    match_id: "m1".into(),
                })
                .with_timestamp(10),
            )
            .unwrap();
        session
            .apply(
                TransportMessage::event(GameEvent::MatchEnded {
                    match_id: "m1".into(),
                })
                .with_timestamp(20),
            )
            .unwrap();
        let err = session
            .apply(
                TransportMessage::event(GameEvent::Winner {
                    match_id: "m1".into(),
                })
                .with_timestamp(999_999),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            SessionError::Fold(FoldError::MatchAlreadyEnded { .. })
        ));
        assert_eq!(session.last_timestamps.get(&"m1".into()), Some(&20));
    }

    #[test]
    fn explicit_context_resolves_winner() {
        let mut session =
            MatchSession::new(|_: &MatchId, _: &MatchState| Winner::Player("alice".into()));
        for event in [
            GameEvent::MatchCreated {
                match_id: "m1".into(),
            },
            GameEvent::ShipsPlaced {
                match_id: "m1".into(),
            },
            GameEvent::Winner {
                match_id: "m1".into(),
            },
        ] {
            session.apply_event(event).unwrap();
        }
        assert_eq!(
            session.current_state(&"m1".into()).unwrap().winner(),
            Some(&Winner::Player("alice".into()))
        );
    }

    #[test]
    fn prune_forgets_ended_matches() {
        let mut session = MatchSession::default();
        for event in [
            GameEvent::MatchCreated {
                match_id: "m1".into(),
            },
            GameEvent::MatchEnded {
                match_id: "m1".into(),
            },
            GameEvent::MatchCreated {
                match_id: "m2".into(),
            },
        ] {
            session.apply_event(event).unwrap();
        }
        assert_eq!(session.prune_ended(), 1);
        assert!(session.current_state(&"m1".into()).is_none());
        assert!(session.current_state(&"m2".into()).is_some());
    }
}

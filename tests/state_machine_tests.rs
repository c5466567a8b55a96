#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! End-to-end properties of the decode → fold → dispatch pipeline.

mod common;

use std::sync::{Arc, Mutex};

use broadside_client::error::Conflict;
use broadside_client::{
    Coordinate, FailureCode, FoldError, Ingested, MatchId, MatchPhase, MatchSession, MatchState,
    SessionError, ShotResult, StateChange, Winner,
};
use tokio_test::{assert_err, assert_ok};

use common::{created, ended, fired, full_match, placed, proposed, winner};

/// Subscribe a recorder to `match_id` and return the shared log of states.
fn record(session: &mut MatchSession, match_id: &str) -> Arc<Mutex<Vec<MatchState>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    session.subscribe(match_id, move |change: &StateChange| {
        sink.lock().unwrap().push(change.current.clone());
    });
    log
}

fn m1() -> MatchId {
    MatchId::new("m1")
}

#[test]
fn observed_states_match_successful_folds_in_order() {
    common::init_tracing();
    let mut session = MatchSession::default();
    let log = record(&mut session, "m1");

    let mut committed = Vec::new();
    for frame in [
        created("m1"),
        placed("m1"),
        proposed("m1", 1, 1),
        fired("m1", 1, 1, "hit"),
        fired("m1", 1, 1, "hit"),
        fired("m1", 1, 1, "miss"),
        proposed("m1", 2, 2),
    ] {
        if let Ok(Ingested::Applied { change, .. }) = session.ingest(&frame) {
            committed.push(change.current);
        }
    }

    assert_eq!(committed.len(), 5);
    assert_eq!(*log.lock().unwrap(), committed);
}

#[test]
fn other_matches_are_not_observed() {
    let mut session = MatchSession::default();
    let log = record(&mut session, "m1");

    assert_ok!(session.ingest(&created("m2")));
    assert_ok!(session.ingest(&placed("m2")));
    assert!(log.lock().unwrap().is_empty());
}

#[test]
fn repeated_shot_notifies_once() {
    let mut session = MatchSession::default();
    for frame in [created("m1"), placed("m1")] {
        assert_ok!(session.ingest(&frame));
    }
    let log = record(&mut session, "m1");

    let first = assert_ok!(session.ingest(&fired("m1", 4, 4, "miss")));
    assert!(matches!(first, Ingested::Applied { .. }));
    let second = assert_ok!(session.ingest(&fired("m1", 4, 4, "miss")));
    assert_eq!(second, Ingested::Unchanged { match_id: m1() });
    assert_eq!(log.lock().unwrap().len(), 1);
}

#[test]
fn conflicting_shot_keeps_first_result() {
    let mut session = MatchSession::default();
    for frame in [created("m1"), placed("m1"), fired("m1", 3, 3, "hit")] {
        assert_ok!(session.ingest(&frame));
    }

    let err = assert_err!(session.ingest(&fired("m1", 3, 3, "miss")));
    let SessionError::Fold(FoldError::ConflictingResult { conflict, .. }) = &err else {
        panic!("expected conflict, got {err:?}");
    };
    assert_eq!(
        *conflict,
        Conflict::Shot {
            at: Coordinate::new(3, 3),
            recorded: ShotResult::Hit,
            incoming: ShotResult::Miss,
        }
    );

    let state = session.current_state(&m1()).unwrap();
    assert_eq!(state.board().len(), 1);
    assert_eq!(state.result_at(Coordinate::new(3, 3)), Some(&ShotResult::Hit));
}

#[test]
fn events_for_unknown_match_create_nothing() {
    let mut session = MatchSession::default();
    for frame in [
        placed("ghost"),
        proposed("ghost", 0, 0),
        fired("ghost", 0, 0, "hit"),
        winner("ghost"),
        ended("ghost"),
    ] {
        let err = assert_err!(session.ingest(&frame));
        assert_eq!(err.code(), FailureCode::OutOfOrderEvent);
    }
    assert!(session.store().is_empty());
    assert_eq!(
        session.store().phase_of(&"ghost".into()),
        MatchPhase::Unknown
    );
}

#[test]
fn documented_scenario_concludes_and_locks_match() {
    let mut session = MatchSession::new(|_: &MatchId, state: &MatchState| {
        if state.hits() > 0 {
            Winner::Player("shooter".into())
        } else {
            Winner::Undetermined
        }
    });

    for frame in [
        created("m1"),
        placed("m1"),
        proposed("m1", 2, 3),
        fired("m1", 2, 3, "hit"),
        winner("m1"),
        ended("m1"),
    ] {
        assert_ok!(session.ingest(&frame));
    }

    let state = session.current_state(&m1()).unwrap().clone();
    assert_eq!(state.phase(), MatchPhase::Concluded);
    assert!(state.is_ended());
    assert_eq!(state.board().len(), 1);
    assert_eq!(state.result_at(Coordinate::new(2, 3)), Some(&ShotResult::Hit));
    assert_eq!(state.winner(), Some(&Winner::Player("shooter".into())));

    for frame in [
        created("m1"),
        placed("m1"),
        proposed("m1", 0, 0),
        fired("m1", 0, 0, "miss"),
        winner("m1"),
        ended("m1"),
    ] {
        let err = assert_err!(session.ingest(&frame));
        assert_eq!(err.code(), FailureCode::MatchAlreadyEnded);
    }
    assert_eq!(session.current_state(&m1()), Some(&state));
}

#[test]
fn engine_end_order_leaves_session_usable() {
    let mut session = MatchSession::default();
    let mut rejected = Vec::new();
    for frame in full_match("m1") {
        if let Err(e) = session.ingest(&frame) {
            rejected.push(e.code());
        }
    }
    // Only the trailing shot after MatchEnded is refused.
    assert_eq!(rejected, vec![FailureCode::MatchAlreadyEnded]);

    for frame in full_match("m2") {
        let _ = session.ingest(&frame);
    }
    assert_eq!(session.store().len(), 2);
    assert_eq!(session.prune_ended(), 2);
    assert!(session.store().is_empty());
}

#[test]
fn malformed_shot_proposal_is_rejected_before_fold() {
    let mut session = MatchSession::default();
    assert_ok!(session.ingest(&created("m1")));
    let err = assert_err!(
        session.ingest(r#"{"kind":"event","payload":{"kind":"ShotProposed","matchId":"m1"}}"#)
    );
    assert_eq!(err.code(), FailureCode::MalformedEvent);
    assert_eq!(session.store().phase_of(&m1()), MatchPhase::Created);
}

#[test]
fn panicking_observer_does_not_block_others_or_fold() {
    let mut session = MatchSession::default();
    session.subscribe("m1", |_: &StateChange| panic!("widget exploded"));
    let log = record(&mut session, "m1");

    let out = assert_ok!(session.ingest(&created("m1")));
    let Ingested::Applied { report, .. } = out else {
        panic!("expected applied");
    };
    assert_eq!(report.failures.len(), 1);
    assert_eq!(log.lock().unwrap().len(), 1);
    assert_eq!(session.store().phase_of(&m1()), MatchPhase::Created);
}

#[test]
fn unsubscribed_observer_receives_nothing_more() {
    let mut session = MatchSession::default();
    let log = Arc::new(Mutex::new(0_u32));
    let sink = Arc::clone(&log);
    let handle = session.subscribe("m1", move |_: &StateChange| {
        *sink.lock().unwrap() += 1;
    });

    assert_ok!(session.ingest(&created("m1")));
    assert!(session.unsubscribe(&handle));
    assert_ok!(session.ingest(&placed("m1")));
    assert_eq!(*log.lock().unwrap(), 1);
}

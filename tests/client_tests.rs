#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Client tests driving `BroadsideClient` through scripted transports.
//!
//! Covers event ordering on the channel, failure-policy routing, observer
//! delivery through the handle, and shutdown behavior.

mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use broadside_client::{
    BroadsideClient, BroadsideConfig, BroadsideError, BroadsideEvent, FailureAction, FailureCode,
    FailurePolicy, MatchId, MatchPhase, MatchSession, MatchState, StateChange, Winner,
};
use tokio::sync::mpsc;

use common::{
    created, ended, fired, full_match, placed, proposed, server_error, winner, FeedTransport,
    MockTransport,
};

// ════════════════════════════════════════════════════════════════════
// Helpers
// ════════════════════════════════════════════════════════════════════

/// Collect every event until the channel closes.
async fn drain(mut events: mpsc::Receiver<BroadsideEvent>) -> Vec<BroadsideEvent> {
    let mut all = Vec::new();
    while let Some(event) = events.recv().await {
        all.push(event);
    }
    all
}

fn phases(events: &[BroadsideEvent]) -> Vec<MatchPhase> {
    events
        .iter()
        .filter_map(|e| match e {
            BroadsideEvent::StateChanged(change) => Some(change.current.phase()),
            _ => None,
        })
        .collect()
}

fn rejections(events: &[BroadsideEvent]) -> Vec<FailureCode> {
    events
        .iter()
        .filter_map(|e| match e {
            BroadsideEvent::Rejected { code, .. } => Some(*code),
            _ => None,
        })
        .collect()
}

// ════════════════════════════════════════════════════════════════════
// Lifecycle
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn full_match_over_closed_feed() {
    common::init_tracing();
    let mut frames = full_match("m1");
    frames.insert(0, r#"{"kind":"connected"}"#.to_owned());
    let mut script: Vec<_> = frames.into_iter().map(|f| Some(Ok(f))).collect();
    script.push(None);

    let (transport, _closed) = MockTransport::new(script);
    let (client, events) = BroadsideClient::start(transport, BroadsideConfig::default());
    let events = drain(events).await;

    assert_eq!(events.first(), Some(&BroadsideEvent::Connected));
    assert_eq!(events.get(1), Some(&BroadsideEvent::ServerConnected));
    assert_eq!(
        events.last(),
        Some(&BroadsideEvent::Disconnected { reason: None })
    );
    assert_eq!(
        phases(&events),
        vec![
            MatchPhase::Created,
            MatchPhase::PlacementPhase,
            MatchPhase::PlacementPhase,
            MatchPhase::InProgress,
            MatchPhase::InProgress,
            MatchPhase::InProgress,
            MatchPhase::InProgress,
            MatchPhase::InProgress,
            MatchPhase::Concluded,
            MatchPhase::Concluded,
        ]
    );
    // The trailing ShotFired after MatchEnded is dropped quietly.
    assert!(rejections(&events).is_empty());

    let state = client.current_state(&"m1".into()).await.unwrap();
    assert!(state.is_ended());
    assert_eq!(state.hits(), 1);
    assert!(!client.is_connected());
}

#[tokio::test]
async fn server_error_is_forwarded_and_loop_continues() {
    let (transport, _closed) = MockTransport::frames([server_error("match m9 not found"), created("m1")]);
    let (mut client, mut events) = BroadsideClient::start(transport, BroadsideConfig::default());

    assert_eq!(events.recv().await, Some(BroadsideEvent::Connected));
    assert_eq!(
        events.recv().await,
        Some(BroadsideEvent::ServerError {
            error_text: "match m9 not found".into()
        })
    );
    assert!(matches!(
        events.recv().await,
        Some(BroadsideEvent::StateChanged(_))
    ));

    client.shutdown().await;
}

#[tokio::test]
async fn shutdown_emits_disconnected_last_and_closes_transport() {
    let (transport, closed) = MockTransport::frames([created("m1")]);
    let (mut client, events) = BroadsideClient::start(transport, BroadsideConfig::default());

    client.shutdown().await;
    let events = drain(events).await;

    assert_eq!(events.first(), Some(&BroadsideEvent::Connected));
    assert_eq!(
        events.last(),
        Some(&BroadsideEvent::Disconnected {
            reason: Some("client shut down".into())
        })
    );
    assert!(closed.load(Ordering::Relaxed));
    assert!(!client.is_connected());
}

#[tokio::test]
async fn shutdown_twice_is_harmless() {
    let (transport, _closed) = MockTransport::new(vec![]);
    let (mut client, _events) = BroadsideClient::start(transport, BroadsideConfig::default());
    client.shutdown().await;
    client.shutdown().await;
    assert!(!client.is_connected());
}

#[tokio::test]
async fn receive_error_ends_loop_with_reason() {
    let (transport, closed) = MockTransport::new(vec![
        Some(Ok(created("m1"))),
        Some(Err(BroadsideError::TransportReceive("connection reset".into()))),
    ]);
    let (_client, events) = BroadsideClient::start(transport, BroadsideConfig::default());
    let events = drain(events).await;

    let Some(BroadsideEvent::Disconnected {
        reason: Some(reason),
    }) = events.last()
    else {
        panic!("expected disconnect with reason, got {events:?}");
    };
    assert!(reason.contains("connection reset"));
    // A failing transport is not closed by the client.
    assert!(!closed.load(Ordering::Relaxed));
}

#[tokio::test]
async fn shutdown_with_zero_timeout_still_returns() {
    let (transport, _closed) = MockTransport::new(vec![]);
    let config = BroadsideConfig::default().with_shutdown_timeout(Duration::ZERO);
    let (mut client, _events) = BroadsideClient::start(transport, config);
    tokio::time::timeout(Duration::from_secs(1), client.shutdown())
        .await
        .unwrap();
}

// ════════════════════════════════════════════════════════════════════
// Failure policy
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn default_policy_reports_decode_and_fold_failures() {
    let (transport, _closed) = MockTransport::new(vec![
        Some(Ok("not json".into())),
        Some(Ok(r#"{"kind":"resync"}"#.into())),
        Some(Ok(r#"{"kind":"error"}"#.into())),
        Some(Ok(placed("m1"))),
        Some(Ok(created("m1"))),
        Some(Ok(placed("m1"))),
        Some(Ok(fired("m1", 0, 0, "hit"))),
        Some(Ok(fired("m1", 0, 0, "miss"))),
        None,
    ]);
    let (_client, events) = BroadsideClient::start(transport, BroadsideConfig::default());
    let events = drain(events).await;

    assert_eq!(
        rejections(&events),
        vec![
            FailureCode::MalformedEnvelope,
            FailureCode::UnknownEnvelopeKind,
            FailureCode::MissingErrorText,
            FailureCode::OutOfOrderEvent,
            FailureCode::ConflictingResult,
        ]
    );
    assert_eq!(phases(&events).len(), 3);
}

#[tokio::test]
async fn ignore_everything_policy_emits_no_rejections() {
    let (transport, _closed) = MockTransport::new(vec![
        Some(Ok("{".into())),
        Some(Ok(winner("m1"))),
        None,
    ]);
    let config = BroadsideConfig::default()
        .with_failure_policy(FailurePolicy::uniform(FailureAction::Ignore));
    let (_client, events) = BroadsideClient::start(transport, config);
    let events = drain(events).await;

    assert_eq!(
        events,
        vec![
            BroadsideEvent::Connected,
            BroadsideEvent::Disconnected { reason: None }
        ]
    );
}

#[tokio::test]
async fn conflict_can_terminate_the_session() {
    let (transport, closed) = MockTransport::frames([
        created("m1"),
        placed("m1"),
        fired("m1", 1, 2, "hit"),
        fired("m1", 1, 2, "miss"),
        proposed("m1", 5, 5),
    ]);
    let config = BroadsideConfig::default().with_failure_policy(
        FailurePolicy::default().with_action(FailureCode::ConflictingResult, FailureAction::Terminate),
    );
    let (client, events) = BroadsideClient::start(transport, config);
    let events = drain(events).await;

    let Some(BroadsideEvent::Disconnected {
        reason: Some(reason),
    }) = events.last()
    else {
        panic!("expected terminating disconnect, got {events:?}");
    };
    assert!(reason.starts_with("CONFLICTING_RESULT"), "{reason}");
    assert!(closed.load(Ordering::Relaxed));
    assert_eq!(phases(&events).len(), 3);

    let state = client.current_state(&"m1".into()).await.unwrap();
    assert_eq!(state.pending_shot(), None);
}

#[tokio::test]
async fn ended_match_can_be_reported_instead_of_ignored() {
    let (transport, _closed) = MockTransport::new(vec![
        Some(Ok(created("m1"))),
        Some(Ok(ended("m1"))),
        Some(Ok(placed("m1"))),
        None,
    ]);
    let config = BroadsideConfig::default().with_failure_policy(
        FailurePolicy::default().with_action(FailureCode::MatchAlreadyEnded, FailureAction::Report),
    );
    let (_client, events) = BroadsideClient::start(transport, config);
    let events = drain(events).await;
    assert_eq!(rejections(&events), vec![FailureCode::MatchAlreadyEnded]);
}

// ════════════════════════════════════════════════════════════════════
// Observers through the handle
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn handle_subscription_follows_live_feed() {
    let (transport, feed) = FeedTransport::new(8);
    let (mut client, mut events) = BroadsideClient::start(transport, BroadsideConfig::default());
    assert_eq!(events.recv().await, Some(BroadsideEvent::Connected));

    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel::<(MatchPhase, MatchPhase)>();
    let handle = client
        .subscribe("m1", move |change: &StateChange| {
            let _ = seen_tx.send((change.previous_phase(), change.current.phase()));
        })
        .await;

    feed.send(created("m1")).await.unwrap();
    feed.send(placed("m1")).await.unwrap();
    assert_eq!(
        seen_rx.recv().await,
        Some((MatchPhase::Unknown, MatchPhase::Created))
    );
    assert_eq!(
        seen_rx.recv().await,
        Some((MatchPhase::Created, MatchPhase::PlacementPhase))
    );

    assert!(client.unsubscribe(&handle).await);
    assert!(!client.unsubscribe(&handle).await);

    feed.send(proposed("m1", 0, 0)).await.unwrap();
    for _ in 0..3 {
        assert!(matches!(
            events.recv().await,
            Some(BroadsideEvent::StateChanged(_))
        ));
    }
    assert!(seen_rx.try_recv().is_err());

    drop(feed);
    assert_eq!(
        events.recv().await,
        Some(BroadsideEvent::Disconnected { reason: None })
    );
    client.shutdown().await;
}

#[tokio::test]
async fn prepared_session_resolves_winner() {
    let session =
        MatchSession::new(|_: &MatchId, _: &MatchState| Winner::Player("bob".into()));
    let (transport, _closed) = MockTransport::new(vec![
        Some(Ok(created("m1"))),
        Some(Ok(placed("m1"))),
        Some(Ok(winner("m1"))),
        None,
    ]);
    let (client, events) =
        BroadsideClient::start_with_session(transport, session, BroadsideConfig::default());
    let _ = drain(events).await;

    let state = client.current_state(&"m1".into()).await.unwrap();
    assert_eq!(state.winner(), Some(&Winner::Player("bob".into())));
    let matches = client.with_session(|s| s.store().len()).await;
    assert_eq!(matches, 1);
}

#[tokio::test]
async fn failing_observer_is_reported_and_feed_continues() {
    let mut session = MatchSession::default();
    session.subscribe(
        "m1",
        broadside_client::dispatch::fallible(|change: &StateChange| {
            if change.current.phase() == MatchPhase::PlacementPhase {
                Err(broadside_client::ObserverError::new("cannot render fleet"))
            } else {
                Ok(())
            }
        }),
    );
    let (transport, _closed) = MockTransport::new(vec![
        Some(Ok(created("m1"))),
        Some(Ok(placed("m1"))),
        Some(Ok(proposed("m1", 1, 1))),
        None,
    ]);
    let (_client, events) =
        BroadsideClient::start_with_session(transport, session, BroadsideConfig::default());
    let events = drain(events).await;

    assert_eq!(rejections(&events), vec![FailureCode::ObserverFailed]);
    assert_eq!(phases(&events).len(), 3);
}

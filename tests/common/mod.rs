#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared helpers for broadside client integration tests.
//!
//! Provides a scripted [`MockTransport`], a channel-fed [`FeedTransport`],
//! and builders for envelope frames.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use broadside_client::{BroadsideError, GameEvent, ShotResult, Transport, TransportMessage};
use serde_json::json;
use tokio::sync::mpsc;

// ── Transports ──────────────────────────────────────────────────────

/// Replays scripted frames in order, then hangs until shutdown.
///
/// An explicit `None` entry simulates the engine closing the connection.
pub struct MockTransport {
    incoming: VecDeque<Option<Result<String, BroadsideError>>>,
    pub closed: Arc<AtomicBool>,
}

impl MockTransport {
    pub fn new(incoming: Vec<Option<Result<String, BroadsideError>>>) -> (Self, Arc<AtomicBool>) {
        let closed = Arc::new(AtomicBool::new(false));
        let transport = Self {
            incoming: VecDeque::from(incoming),
            closed: Arc::clone(&closed),
        };
        (transport, closed)
    }

    /// Script only successful frames.
    pub fn frames(frames: impl IntoIterator<Item = String>) -> (Self, Arc<AtomicBool>) {
        Self::new(frames.into_iter().map(|f| Some(Ok(f))).collect())
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn recv(&mut self) -> Option<Result<String, BroadsideError>> {
        match self.incoming.pop_front() {
            Some(item) => item,
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) -> Result<(), BroadsideError> {
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}

/// A transport fed frame by frame from the test body.
///
/// Dropping the sender closes the feed cleanly.
pub struct FeedTransport {
    rx: mpsc::Receiver<String>,
}

impl FeedTransport {
    pub fn new(capacity: usize) -> (Self, mpsc::Sender<String>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { rx }, tx)
    }
}

#[async_trait]
impl Transport for FeedTransport {
    async fn recv(&mut self) -> Option<Result<String, BroadsideError>> {
        self.rx.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<(), BroadsideError> {
        self.rx.close();
        Ok(())
    }
}

// ── Frame builders ──────────────────────────────────────────────────

pub fn event_frame(event: GameEvent) -> String {
    broadside_client::encode(&TransportMessage::event(event)).unwrap()
}

pub fn created(match_id: &str) -> String {
    event_frame(GameEvent::MatchCreated {
        match_id: match_id.into(),
    })
}

pub fn placed(match_id: &str) -> String {
    event_frame(GameEvent::ShipsPlaced {
        match_id: match_id.into(),
    })
}

pub fn proposed(match_id: &str, x: u8, y: u8) -> String {
    event_frame(GameEvent::ShotProposed {
        match_id: match_id.into(),
        x,
        y,
    })
}

pub fn fired(match_id: &str, x: u8, y: u8, result: &str) -> String {
    event_frame(GameEvent::ShotFired {
        match_id: match_id.into(),
        x,
        y,
        result: ShotResult::from(result),
    })
}

pub fn winner(match_id: &str) -> String {
    event_frame(GameEvent::Winner {
        match_id: match_id.into(),
    })
}

pub fn ended(match_id: &str) -> String {
    event_frame(GameEvent::MatchEnded {
        match_id: match_id.into(),
    })
}

pub fn server_error(text: &str) -> String {
    json!({ "kind": "error", "errorText": text }).to_string()
}

/// The frames the engine sends for one short game, in the engine's order:
/// the final `ShotFired` arrives after `MatchEnded`.
pub fn full_match(match_id: &str) -> Vec<String> {
    vec![
        created(match_id),
        placed(match_id),
        placed(match_id),
        proposed(match_id, 0, 0),
        fired(match_id, 0, 0, "miss"),
        proposed(match_id, 3, 4),
        fired(match_id, 3, 4, "hit"),
        proposed(match_id, 3, 5),
        winner(match_id),
        ended(match_id),
        fired(match_id, 3, 5, "sunk"),
    ]
}

/// Install a test subscriber once; respects `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

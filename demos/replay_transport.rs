//! # Replay Transport Example
//!
//! Implements [`Transport`] over an in-process channel and replays a full
//! match through it, the way the engine would send it. Useful as a template
//! for:
//!
//! - **Testing**: drive UI code from recorded matches without an engine
//! - **Custom backends**: adapt any frame source (TCP, QUIC, log files)
//!
//! ## Running
//!
//! ```sh
//! cargo run --example replay_transport
//! ```

use async_trait::async_trait;
use broadside_client::{
    encode, BroadsideClient, BroadsideConfig, BroadsideError, BroadsideEvent, GameEvent, MatchId,
    MatchSession, MatchState, ShotResult, StateChange, Transport, TransportMessage, Winner,
};
use tokio::sync::mpsc;

// ─────────────────────────────────────────────────────────────────────
// Step 1: A channel-backed transport
// ─────────────────────────────────────────────────────────────────────

/// Receives frames pushed by a [`Replayer`].
pub struct ReplayTransport {
    rx: mpsc::UnboundedReceiver<String>,
}

/// The engine side: push frames, drop to close the feed.
pub struct Replayer {
    tx: mpsc::UnboundedSender<String>,
    clock: u64,
}

fn replay_pair() -> (ReplayTransport, Replayer) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        ReplayTransport { rx },
        Replayer {
            tx,
            clock: 1_700_000_000_000,
        },
    )
}

impl Replayer {
    fn push(&mut self, msg: TransportMessage) -> Result<(), Box<dyn std::error::Error>> {
        self.clock += 250;
        self.tx.send(encode(&msg.with_timestamp(self.clock))?)?;
        Ok(())
    }

    fn event(&mut self, event: GameEvent) -> Result<(), Box<dyn std::error::Error>> {
        self.push(TransportMessage::event(event))
    }
}

// ─────────────────────────────────────────────────────────────────────
// Step 2: Implement the Transport trait
// ─────────────────────────────────────────────────────────────────────

#[async_trait]
impl Transport for ReplayTransport {
    /// `UnboundedReceiver::recv` is cancel-safe, so this is too.
    async fn recv(&mut self) -> Option<Result<String, BroadsideError>> {
        self.rx.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<(), BroadsideError> {
        self.rx.close();
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────
// Step 3: Replay a match
// ─────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let (transport, mut engine) = replay_pair();

    // Player one wins once any of their shots has hit.
    let session = MatchSession::new(|_: &MatchId, state: &MatchState| {
        if state.hits() > 0 {
            Winner::Player("player-one".into())
        } else {
            Winner::Undetermined
        }
    });
    let (client, mut event_rx) =
        BroadsideClient::start_with_session(transport, session, BroadsideConfig::default());

    client
        .subscribe("demo", |change: &StateChange| {
            tracing::info!(
                "{} -> {} via {}",
                change.previous_phase(),
                change.current.phase(),
                change.event.kind()
            );
        })
        .await;

    let id = || MatchId::new("demo");
    let shots: [(u8, u8, ShotResult); 3] = [
        (0, 0, ShotResult::Miss),
        (4, 2, ShotResult::Hit),
        (4, 3, ShotResult::Sunk),
    ];

    engine.push(TransportMessage::connected())?;
    engine.event(GameEvent::MatchCreated { match_id: id() })?;
    engine.event(GameEvent::ShipsPlaced { match_id: id() })?;
    engine.event(GameEvent::ShipsPlaced { match_id: id() })?;
    for (x, y, result) in shots {
        engine.event(GameEvent::ShotProposed { match_id: id(), x, y })?;
        if result == ShotResult::Sunk {
            // The engine announces the end before resolving the winning shot.
            engine.event(GameEvent::Winner { match_id: id() })?;
            engine.event(GameEvent::MatchEnded { match_id: id() })?;
        }
        engine.event(GameEvent::ShotFired {
            match_id: id(),
            x,
            y,
            result,
        })?;
    }
    engine.push(TransportMessage::disconnected())?;
    drop(engine);

    while let Some(event) = event_rx.recv().await {
        match event {
            BroadsideEvent::Connected => tracing::info!("Event: Connected (synthetic)"),
            BroadsideEvent::ServerConnected => tracing::info!("Event: engine connected"),
            BroadsideEvent::ServerDisconnected => tracing::info!("Event: engine disconnecting"),
            BroadsideEvent::StateChanged(_) => {}
            BroadsideEvent::ServerError { error_text } => tracing::warn!("Engine error: {error_text}"),
            BroadsideEvent::Rejected { code, message } => {
                tracing::warn!("Rejected [{code}]: {message}");
            }
            BroadsideEvent::Disconnected { reason } => {
                tracing::info!("Event: Disconnected ({reason:?})");
                break;
            }
        }
    }

    if let Some(state) = client.current_state(&id()).await {
        tracing::info!(
            "Replay finished: phase {}, winner {}, {} of {} shots hit",
            state.phase(),
            state
                .winner()
                .map_or_else(|| "none".to_owned(), ToString::to_string),
            state.hits(),
            state.board().len()
        );
    }
    Ok(())
}

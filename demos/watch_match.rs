//! # Watch Match Example
//!
//! Connects to a live match engine feed, subscribes to one match and prints
//! every state change until the match ends, the feed closes, or Ctrl+C.
//!
//! ## Running
//!
//! ```sh
//! # Start a match engine on localhost:8080, then:
//! cargo run --example watch_match -- <match-id>
//!
//! # Override the feed URL:
//! BROADSIDE_URL=ws://engine:8080/matches cargo run --example watch_match -- 7f3a
//! ```

use broadside_client::{
    BroadsideClient, BroadsideConfig, BroadsideEvent, MatchId, StateChange, WebSocketTransport,
};
use std::time::Duration;

/// Default feed URL when `BROADSIDE_URL` is not set.
const DEFAULT_URL: &str = "ws://localhost:8080/matches";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let url = std::env::var("BROADSIDE_URL").unwrap_or_else(|_| DEFAULT_URL.to_string());
    let Some(match_id) = std::env::args().nth(1).map(MatchId::from) else {
        return Err("usage: watch_match <match-id>".into());
    };
    tracing::info!("Connecting to {url} to watch match {match_id}");

    let transport = WebSocketTransport::connect_with_timeout(&url, Duration::from_secs(10)).await?;
    let (mut client, mut event_rx) = BroadsideClient::start(transport, BroadsideConfig::default());

    client
        .subscribe(match_id.clone(), |change: &StateChange| {
            let state = &change.current;
            match change.event.coordinate() {
                Some(at) => tracing::info!(
                    "{}: {} at {at} -> {} ({} hits on the board)",
                    state.match_id(),
                    change.event.kind(),
                    state.phase(),
                    state.hits()
                ),
                None => tracing::info!(
                    "{}: {} -> {}",
                    state.match_id(),
                    change.event.kind(),
                    state.phase()
                ),
            }
            if let Some(winner) = state.winner() {
                tracing::info!("{}: winner {winner}", state.match_id());
            }
        })
        .await;

    loop {
        tokio::select! {
            event = event_rx.recv() => {
                let Some(event) = event else {
                    tracing::info!("Event channel closed, exiting");
                    break;
                };
                match event {
                    BroadsideEvent::Connected => tracing::info!("Feed connected"),
                    BroadsideEvent::ServerConnected => tracing::info!("Engine acknowledged connection"),
                    BroadsideEvent::ServerDisconnected => tracing::info!("Engine is closing the feed"),
                    BroadsideEvent::StateChanged(change) => {
                        if change.match_id() == &match_id && change.current.is_ended() {
                            tracing::info!("Match {match_id} ended");
                            client.shutdown().await;
                        }
                    }
                    BroadsideEvent::ServerError { error_text } => {
                        tracing::warn!("Engine error: {error_text}");
                    }
                    BroadsideEvent::Rejected { code, message } => {
                        tracing::warn!("Rejected frame [{code}]: {message}");
                    }
                    BroadsideEvent::Disconnected { reason } => {
                        tracing::info!("Disconnected: {}", reason.as_deref().unwrap_or("feed closed"));
                        break;
                    }
                }
            }

            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received, shutting down");
                client.shutdown().await;
                break;
            }
        }
    }

    if let Some(state) = client.current_state(&match_id).await {
        tracing::info!(
            "Final: phase {}, {} shots resolved, {} hits",
            state.phase(),
            state.board().len(),
            state.hits()
        );
    }
    Ok(())
}

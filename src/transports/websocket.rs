//! WebSocket transport built on `tokio-tungstenite`.
//!
//! [`WebSocketTransport`] reads envelope frames from a match engine feed over
//! `ws://` or `wss://`. Text frames are delivered as-is; binary frames are
//! delivered when they hold valid UTF-8 and dropped with a warning otherwise.
//! Ping and pong frames never reach the caller.
//!
//! Available with the `transport-websocket` feature (on by default).
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), broadside_client::BroadsideError> {
//! use broadside_client::{Transport, WebSocketTransport};
//!
//! let mut feed = WebSocketTransport::connect("ws://localhost:8080/matches").await?;
//! while let Some(frame) = feed.recv().await {
//!     println!("frame: {}", frame?);
//! }
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio_tungstenite::tungstenite::protocol::Message;

use crate::error::BroadsideError;
use crate::transport::Transport;

/// The stream type [`WebSocketTransport::from_stream`] accepts.
pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// A [`Transport`] reading from a WebSocket connection.
///
/// For custom TLS, proxies or headers, open the stream yourself and use
/// [`WebSocketTransport::from_stream`].
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) is cancel-safe: dropping the future before it
/// completes loses no frames.
#[derive(Debug)]
pub struct WebSocketTransport {
    stream: WsStream,
    closed: bool,
}

impl WebSocketTransport {
    /// Connect to the engine feed at `url`.
    ///
    /// # Errors
    ///
    /// Returns [`BroadsideError::Io`] if the URL is invalid or the handshake
    /// fails. An underlying I/O error keeps its [`ErrorKind`](std::io::ErrorKind).
    pub async fn connect(url: &str) -> Result<Self, BroadsideError> {
        tracing::debug!(url = %url, "connecting to match feed");

        let (stream, _response) = tokio_tungstenite::connect_async(url).await.map_err(|e| {
            let kind = match &e {
                tokio_tungstenite::tungstenite::Error::Io(io) => io.kind(),
                _ => std::io::ErrorKind::Other,
            };
            BroadsideError::Io(std::io::Error::new(kind, e))
        })?;

        tracing::info!(url = %url, "match feed connected");
        Ok(Self::from_stream(stream))
    }

    /// Wrap an already-open WebSocket stream.
    pub fn from_stream(stream: WsStream) -> Self {
        Self {
            stream,
            closed: false,
        }
    }

    /// [`connect`](Self::connect) with a deadline.
    ///
    /// # Errors
    ///
    /// Returns [`BroadsideError::Timeout`] if `timeout` elapses first, or any
    /// error [`connect`](Self::connect) returns.
    pub async fn connect_with_timeout(
        url: &str,
        timeout: Duration,
    ) -> Result<Self, BroadsideError> {
        tokio::time::timeout(timeout, Self::connect(url))
            .await
            .map_err(|_| BroadsideError::Timeout)?
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn recv(&mut self) -> Option<Result<String, BroadsideError>> {
        if self.closed {
            return None;
        }
        loop {
            let msg = match self.stream.next().await? {
                Ok(msg) => msg,
                Err(e) => return Some(Err(BroadsideError::TransportReceive(e.to_string()))),
            };

            match msg {
                Message::Text(text) => return Some(Ok(text.to_string())),
                Message::Binary(bytes) => match std::str::from_utf8(&bytes) {
                    Ok(text) => return Some(Ok(text.to_owned())),
                    Err(e) => {
                        tracing::warn!(len = bytes.len(), error = %e, "dropping non-UTF-8 binary frame");
                    }
                },
                Message::Close(frame) => {
                    tracing::debug!(?frame, "match feed sent close frame");
                    return None;
                }
                // tungstenite answers pings itself.
                Message::Ping(_) | Message::Pong(_) => {}
                Message::Frame(_) => {
                    tracing::debug!("skipping raw WebSocket frame");
                }
            }
        }
    }

    async fn close(&mut self) -> Result<(), BroadsideError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stream
            .close(None)
            .await
            .map_err(|e| BroadsideError::TransportClose(e.to_string()))
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
    use futures_util::SinkExt;
    use tokio::net::TcpListener;

    const CREATED: &str = r#"{"kind":"event","payload":{"kind":"MatchCreated","matchId":"m1"}}"#;

    /// Serve one WebSocket connection with `handler` and return its URL.
    async fn start_mock_feed<F, Fut>(handler: F) -> String
    where
        F: FnOnce(tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>) -> Fut
            + Send
            + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            handler(ws).await;
        });

        format!("ws://{addr}")
    }

    #[test]
    fn websocket_transport_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<WebSocketTransport>();
    }

    #[tokio::test]
    async fn connect_fails_with_invalid_url() {
        let err = WebSocketTransport::connect("not-a-valid-url")
            .await
            .unwrap_err();
        assert!(matches!(err, BroadsideError::Io(_)));
    }

    #[tokio::test]
    async fn connect_fails_with_unreachable_host() {
        let err = WebSocketTransport::connect("ws://127.0.0.1:1")
            .await
            .unwrap_err();
        assert!(matches!(err, BroadsideError::Io(_)));
    }

    #[tokio::test]
    async fn connect_with_timeout_times_out() {
        let err = WebSocketTransport::connect_with_timeout(
            "ws://192.0.2.1:1",
            Duration::from_millis(50),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, BroadsideError::Timeout));
    }

    #[tokio::test]
    async fn recv_delivers_text_frames_in_order() {
        let url = start_mock_feed(|mut ws| async move {
            ws.send(Message::Text(CREATED.into())).await.unwrap();
            ws.send(Message::Text(r#"{"kind":"connected"}"#.into()))
                .await
                .unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut feed = WebSocketTransport::connect(&url).await.unwrap();
        assert_eq!(feed.recv().await.unwrap().unwrap(), CREATED);
        assert_eq!(
            feed.recv().await.unwrap().unwrap(),
            r#"{"kind":"connected"}"#
        );
        assert!(feed.recv().await.is_none());
    }

    #[tokio::test]
    async fn recv_accepts_utf8_binary_and_drops_the_rest() {
        let url = start_mock_feed(|mut ws| async move {
            ws.send(Message::Binary(vec![0xDE, 0xAD].into()))
                .await
                .unwrap();
            ws.send(Message::Binary(CREATED.as_bytes().to_vec().into()))
                .await
                .unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut feed = WebSocketTransport::connect(&url).await.unwrap();
        assert_eq!(feed.recv().await.unwrap().unwrap(), CREATED);
    }

    #[tokio::test]
    async fn recv_skips_ping_frames() {
        let url = start_mock_feed(|mut ws| async move {
            ws.send(Message::Ping(vec![1, 2, 3].into())).await.unwrap();
            ws.send(Message::Text(CREATED.into())).await.unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut feed = WebSocketTransport::connect(&url).await.unwrap();
        assert_eq!(feed.recv().await.unwrap().unwrap(), CREATED);
    }

    #[tokio::test]
    async fn recv_returns_none_on_close_frame() {
        let url = start_mock_feed(|mut ws| async move {
            ws.close(None).await.unwrap();
        })
        .await;

        let mut feed = WebSocketTransport::connect(&url).await.unwrap();
        assert!(feed.recv().await.is_none());
    }

    #[tokio::test]
    async fn from_stream_wraps_existing_connection() {
        let url = start_mock_feed(|mut ws| async move {
            ws.send(Message::Text(CREATED.into())).await.unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let (stream, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
        let mut feed = WebSocketTransport::from_stream(stream);
        assert_eq!(feed.recv().await.unwrap().unwrap(), CREATED);
    }

    #[tokio::test]
    async fn close_is_idempotent_and_ends_recv() {
        let url =
            start_mock_feed(|mut ws| async move { while let Some(Ok(_)) = ws.next().await {} })
                .await;

        let mut feed = WebSocketTransport::connect(&url).await.unwrap();
        feed.close().await.unwrap();
        feed.close().await.unwrap();
        assert!(feed.recv().await.is_none());
    }
}

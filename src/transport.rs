//! Inbound frame source for the broadside client.
//!
//! The match engine pushes JSON text frames; the client never writes to the
//! connection, so a [`Transport`] is a receive side plus a close. Connection
//! setup, reconnects and retries belong to the implementation: build a
//! connected transport, then hand it to `BroadsideClient::start`.
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use broadside_client::error::BroadsideError;
//! use broadside_client::transport::Transport;
//! use tokio::sync::mpsc;
//!
//! struct ChannelTransport {
//!     rx: mpsc::Receiver<String>,
//! }
//!
//! #[async_trait]
//! impl Transport for ChannelTransport {
//!     async fn recv(&mut self) -> Option<Result<String, BroadsideError>> {
//!         self.rx.recv().await.map(Ok)
//!     }
//!
//!     async fn close(&mut self) -> Result<(), BroadsideError> {
//!         self.rx.close();
//!         Ok(())
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::BroadsideError;

/// A source of envelope frames from the match engine.
///
/// Object-safe, so `Box<dyn Transport>` works.
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) **MUST** be cancel-safe because the client polls
/// it inside `tokio::select!`. A cancelled call must not lose a frame.
/// Wrapping an `mpsc::Receiver` is cancel-safe.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Receive the next frame.
    ///
    /// Returns:
    /// - `Some(Ok(text))`: one complete envelope frame
    /// - `Some(Err(e))`: a transport failure, usually [`BroadsideError::TransportReceive`]
    /// - `None`: the engine closed the connection
    async fn recv(&mut self) -> Option<Result<String, BroadsideError>>;

    /// Close the connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the close handshake fails. Resources are released
    /// either way.
    async fn close(&mut self) -> Result<(), BroadsideError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Box<T> {
    async fn recv(&mut self) -> Option<Result<String, BroadsideError>> {
        (**self).recv().await
    }

    async fn close(&mut self) -> Result<(), BroadsideError> {
        (**self).close().await
    }
}

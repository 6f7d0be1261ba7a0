//! Trait abstractions for the socket
//!
//! These traits let the reconnect loop run against scripted connections in
//! tests.

use super::TransportError;
use async_trait::async_trait;
use std::sync::Arc;

/// Opens connections to the chat endpoint
#[async_trait]
pub trait Connector: Send + Sync {
    /// Perform the handshake
    async fn connect(&self, url: &str) -> Result<Box<dyn Connection>, TransportError>;
}

/// One established connection
#[async_trait]
pub trait Connection: Send {
    /// Transmit a text frame
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    /// Next inbound text frame, or `None` once the peer has closed.
    ///
    /// Must be cancel-safe: the transport polls it inside `select!`.
    async fn next_text(&mut self) -> Option<Result<String, TransportError>>;

    /// Close politely; errors are ignored
    async fn close(&mut self);
}

#[async_trait]
impl<T: Connector + ?Sized> Connector for Arc<T> {
    async fn connect(&self, url: &str) -> Result<Box<dyn Connection>, TransportError> {
        (**self).connect(url).await
    }
}

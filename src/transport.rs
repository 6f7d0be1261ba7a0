//! Reconnecting chat transport
//!
//! A single background task owns the socket and the connection state. It
//! keeps exactly one connection alive, reconnecting after a fixed delay
//! whenever the connection drops, until the transport is shut down.

mod state;
pub mod traits;
pub mod ws;

#[cfg(test)]
pub mod testing;

pub use state::{ConnectionState, TransportEvent};
pub use traits::{Connection, Connector};
pub use ws::WsConnector;

use crate::assembler::frame::OutboundFrame;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

/// Delay between a close and the next connection attempt
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(3000);

const EVENT_BUFFER: usize = 64;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("not connected")]
    NotConnected,
    #[error("transport has shut down")]
    Shutdown,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("connection error: {0}")]
    Io(String),
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Transport settings
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub url: String,
    pub reconnect_delay: Duration,
}

impl TransportConfig {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }

    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }
}

#[derive(Debug)]
enum Command {
    Connect,
    Send(Outbound),
}

#[derive(Debug)]
struct Outbound {
    text: String,
    payload: String,
}

/// Cloneable handle to the transport task
#[derive(Debug, Clone)]
pub struct TransportHandle {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
    cancel: CancellationToken,
}

impl TransportHandle {
    /// Current connection state
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Receiver that observes every state change
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Ask for a connection.
    ///
    /// No-op while connecting or open. While waiting to reconnect, the wait
    /// is cut short; the fixed delay still applies after a handshake that
    /// fails.
    pub fn connect(&self) {
        if self.commands.send(Command::Connect).is_err() {
            tracing::debug!("connect() after transport shutdown");
        }
    }

    /// Send a user message as `{"message": text}`.
    ///
    /// A message accepted here can still be lost if the socket closes before
    /// it is written; the transport then reports
    /// [`TransportEvent::SendDropped`].
    ///
    /// # Errors
    ///
    /// [`TransportError::NotConnected`] unless the connection is open, in
    /// which case nothing is transmitted. [`TransportError::Shutdown`] once
    /// the transport task has stopped.
    pub fn send(&self, text: &str) -> Result<(), TransportError> {
        if !self.state().is_open() {
            return Err(TransportError::NotConnected);
        }
        let payload = serde_json::to_string(&OutboundFrame { message: text })?;
        let outbound = Outbound {
            text: text.to_string(),
            payload,
        };
        self.commands
            .send(Command::Send(outbound))
            .map_err(|_| TransportError::Shutdown)
    }

    /// Stop the transport task and close the socket
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

/// Spawn the transport task.
///
/// The transport starts `Closed` and makes its first attempt on the first
/// [`TransportHandle::connect`] call.
#[must_use]
pub fn spawn<C>(
    connector: C,
    config: TransportConfig,
) -> (TransportHandle, mpsc::Receiver<TransportEvent>)
where
    C: Connector + 'static,
{
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (state_tx, state_rx) = watch::channel(ConnectionState::Closed);
    let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
    let cancel = CancellationToken::new();

    let task = TransportTask {
        connector,
        config,
        commands: command_rx,
        state_tx,
        events: event_tx,
        cancel: cancel.clone(),
    };
    tokio::spawn(task.run());

    let handle = TransportHandle {
        commands: command_tx,
        state: state_rx,
        cancel,
    };
    (handle, event_rx)
}

struct TransportTask<C> {
    connector: C,
    config: TransportConfig,
    commands: mpsc::UnboundedReceiver<Command>,
    state_tx: watch::Sender<ConnectionState>,
    events: mpsc::Sender<TransportEvent>,
    cancel: CancellationToken,
}

impl<C: Connector> TransportTask<C> {
    async fn run(mut self) {
        tracing::info!(url = %self.config.url, "Transport started");

        let mut wait = None;
        while self.wait_for_attempt(wait).await {
            wait = Some(self.config.reconnect_delay);

            self.set_state(ConnectionState::Connecting).await;
            let Some(attempt) = self.handshake().await else {
                break;
            };

            match attempt {
                Ok(conn) => {
                    tracing::info!(url = %self.config.url, "Chat connection open");
                    self.set_state(ConnectionState::Open).await;
                    self.pump(conn).await;
                }
                Err(e) => {
                    tracing::warn!(url = %self.config.url, error = %e, "Connection attempt failed");
                }
            }

            self.set_state(ConnectionState::Closed).await;
            if !self.cancel.is_cancelled() {
                tracing::info!(
                    delay_ms = self.config.reconnect_delay.as_millis(),
                    "Reconnecting after delay"
                );
            }
        }

        self.set_state(ConnectionState::Closed).await;
        tracing::info!("Transport stopped");
    }

    /// Wait until the next attempt should start. `None` waits for an explicit
    /// connect request. Returns false when the transport should stop.
    async fn wait_for_attempt(&mut self, delay: Option<Duration>) -> bool {
        let timer = async {
            match delay {
                Some(delay) => tokio::time::sleep(delay).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(timer);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => return false,
                () = &mut timer => return true,
                command = self.commands.recv() => match command {
                    Some(Command::Connect) => {
                        tracing::debug!("Connect requested");
                        return true;
                    }
                    Some(Command::Send(outbound)) => self.report_dropped(outbound.text).await,
                    None => return false,
                },
            }
        }
    }

    /// Run one handshake. Returns `None` when the transport should stop.
    ///
    /// Commands are consumed meanwhile so that a `connect()` issued while
    /// connecting is not left queued to skip the next reconnect delay.
    async fn handshake(&mut self) -> Option<Result<Box<dyn Connection>, TransportError>> {
        let mut attempt = self.connector.connect(&self.config.url);
        loop {
            tokio::select! {
                () = self.cancel.cancelled() => return None,
                result = &mut attempt => return Some(result),
                command = self.commands.recv() => match command {
                    Some(Command::Connect) => {
                        tracing::debug!("Connect requested while connecting, ignoring");
                    }
                    Some(Command::Send(outbound)) => self.report_dropped(outbound.text).await,
                    None => return None,
                },
            }
        }
    }

    /// Drive an open connection until it closes
    async fn pump(&mut self, mut conn: Box<dyn Connection>) {
        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    conn.close().await;
                    return;
                }
                inbound = conn.next_text() => match inbound {
                    Some(Ok(text)) => {
                        tracing::trace!(len = text.len(), "Inbound frame");
                        if self.events.send(TransportEvent::Frame(text)).await.is_err() {
                            tracing::debug!("Event receiver dropped, stopping transport");
                            self.cancel.cancel();
                        }
                    }
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "Connection error");
                        return;
                    }
                    None => {
                        tracing::info!("Connection closed by peer");
                        return;
                    }
                },
                command = self.commands.recv() => match command {
                    Some(Command::Send(Outbound { text, payload })) => {
                        if let Err(e) = conn.send_text(payload).await {
                            tracing::warn!(error = %e, "Send failed");
                            self.report_dropped(text).await;
                            return;
                        }
                    }
                    Some(Command::Connect) => {
                        tracing::debug!("Connect requested while open, ignoring");
                    }
                    None => self.cancel.cancel(),
                },
            }
        }
    }

    async fn report_dropped(&self, text: String) {
        tracing::warn!(len = text.len(), "Outbound message dropped, connection is not open");
        if self.events.send(TransportEvent::SendDropped(text)).await.is_err() {
            self.cancel.cancel();
        }
    }

    async fn set_state(&self, next: ConnectionState) {
        let previous = self.state_tx.send_replace(next);
        if previous == next {
            return;
        }
        tracing::debug!(from = %previous, to = %next, "Connection state changed");
        if self.events.send(TransportEvent::StateChanged(next)).await.is_err() {
            self.cancel.cancel();
        }
    }
}

//! Scripted connector for testing
//!
//! Lets tests drive the transport without a network: each scripted attempt
//! either fails or yields a connection whose inbound frames the test feeds
//! through a [`ScriptedLink`].

use super::traits::{Connection, Connector};
use super::TransportError;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

enum Attempt {
    Connect {
        inbound: mpsc::UnboundedReceiver<String>,
        fail_sends: Arc<AtomicBool>,
    },
    Fail {
        reason: String,
        after: Duration,
    },
}

/// Connector that replays queued attempts in order.
///
/// Once the queue is empty, further handshakes never complete.
pub struct ScriptedConnector {
    attempts: Mutex<VecDeque<Attempt>>,
    attempt_count: AtomicUsize,
    sent_count: Arc<AtomicUsize>,
    sent_tx: mpsc::UnboundedSender<String>,
    sent_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<String>>,
}

/// Test side of a scripted connection
pub struct ScriptedLink {
    inbound: mpsc::UnboundedSender<String>,
    fail_sends: Arc<AtomicBool>,
}

impl ScriptedLink {
    /// Queue an inbound text frame
    pub fn deliver(&self, frame: &str) {
        let _ = self.inbound.send(frame.to_string());
    }

    /// Make every later write on this connection fail
    pub fn fail_sends(&self) {
        self.fail_sends.store(true, Ordering::SeqCst);
    }

    /// Close the connection from the peer side
    pub fn close(self) {
        drop(self);
    }
}

#[allow(dead_code)]
impl ScriptedConnector {
    pub fn new() -> Self {
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        Self {
            attempts: Mutex::new(VecDeque::new()),
            attempt_count: AtomicUsize::new(0),
            sent_count: Arc::new(AtomicUsize::new(0)),
            sent_tx,
            sent_rx: tokio::sync::Mutex::new(sent_rx),
        }
    }

    /// Queue a successful handshake
    pub fn push_connection(&self) -> ScriptedLink {
        let (inbound, rx) = mpsc::unbounded_channel();
        let fail_sends = Arc::new(AtomicBool::new(false));
        self.attempts.lock().unwrap().push_back(Attempt::Connect {
            inbound: rx,
            fail_sends: Arc::clone(&fail_sends),
        });
        ScriptedLink {
            inbound,
            fail_sends,
        }
    }

    /// Queue a handshake that fails at once
    pub fn push_failure(&self, reason: impl Into<String>) {
        self.push_failure_after(Duration::ZERO, reason);
    }

    /// Queue a handshake that fails after hanging for `after`
    pub fn push_failure_after(&self, after: Duration, reason: impl Into<String>) {
        self.attempts.lock().unwrap().push_back(Attempt::Fail {
            reason: reason.into(),
            after,
        });
    }

    /// Number of handshakes started
    pub fn attempts(&self) -> usize {
        self.attempt_count.load(Ordering::SeqCst)
    }

    /// Number of frames transmitted across all connections
    pub fn sent_count(&self) -> usize {
        self.sent_count.load(Ordering::SeqCst)
    }

    /// Wait for the next transmitted frame
    pub async fn next_sent(&self) -> Option<String> {
        self.sent_rx.lock().await.recv().await
    }
}

impl Default for ScriptedConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, _url: &str) -> Result<Box<dyn Connection>, TransportError> {
        self.attempt_count.fetch_add(1, Ordering::SeqCst);
        let next = self.attempts.lock().unwrap().pop_front();
        match next {
            Some(Attempt::Connect {
                inbound,
                fail_sends,
            }) => Ok(Box::new(ScriptedConnection {
                inbound,
                fail_sends,
                sent_tx: self.sent_tx.clone(),
                sent_count: Arc::clone(&self.sent_count),
            })),
            Some(Attempt::Fail { reason, after }) => {
                if !after.is_zero() {
                    tokio::time::sleep(after).await;
                }
                Err(TransportError::Connect(reason))
            }
            None => std::future::pending().await,
        }
    }
}

struct ScriptedConnection {
    inbound: mpsc::UnboundedReceiver<String>,
    fail_sends: Arc<AtomicBool>,
    sent_tx: mpsc::UnboundedSender<String>,
    sent_count: Arc<AtomicUsize>,
}

#[async_trait]
impl Connection for ScriptedConnection {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::Io("broken pipe".to_string()));
        }
        self.sent_count.fetch_add(1, Ordering::SeqCst);
        let _ = self.sent_tx.send(text);
        Ok(())
    }

    async fn next_text(&mut self) -> Option<Result<String, TransportError>> {
        self.inbound.recv().await.map(Ok)
    }

    async fn close(&mut self) {
        self.inbound.close();
    }
}

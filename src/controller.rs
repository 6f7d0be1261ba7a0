//! Chat controller
//!
//! Owns the conversation store and reply state, reacts to user input and
//! transport events, and publishes [`ViewEvent`]s. One controller per chat
//! session; nothing here is global.

mod view;

pub use view::ViewEvent;

use crate::assembler::{transition, Effect, Frame, ReplyState};
use crate::message::{ChatMessage, Clock};
use crate::store::{ConversationStore, SessionStorage};
use crate::transport::{ConnectionState, TransportError, TransportEvent, TransportHandle};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

/// Default lifetime of an error banner
pub const DEFAULT_BANNER_TTL: Duration = Duration::from_millis(5000);

pub const NOT_CONNECTED_NOTICE: &str = "not connected";
pub const BUSY_NOTICE: &str = "still waiting for the previous reply";

const VIEW_BUFFER: usize = 256;
const COMMAND_BUFFER: usize = 32;

#[derive(Debug)]
enum Command {
    Submit(String),
    ReplayHistory,
    ExpireBanner(u64),
}

/// Cloneable handle for UI code
#[derive(Clone)]
pub struct ControllerHandle {
    commands: mpsc::Sender<Command>,
    views: broadcast::Sender<ViewEvent>,
}

impl ControllerHandle {
    /// Submit a user message
    pub async fn submit(&self, text: impl Into<String>) {
        if self.commands.send(Command::Submit(text.into())).await.is_err() {
            tracing::debug!("submit() after controller stopped");
        }
    }

    /// Ask for a fresh `History` event
    pub async fn replay_history(&self) {
        let _ = self.commands.send(Command::ReplayHistory).await;
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ViewEvent> {
        self.views.subscribe()
    }
}

pub struct ChatController<S> {
    transport: TransportHandle,
    /// Connection state as last reported by the transport, in event order
    connection: ConnectionState,
    store: ConversationStore<S>,
    reply: ReplyState,
    /// A user message was sent and its reply has not finished
    awaiting_reply: bool,
    clock: Arc<dyn Clock>,
    banner_ttl: Duration,
    next_banner_id: u64,
    commands_tx: mpsc::Sender<Command>,
    commands_rx: mpsc::Receiver<Command>,
    views: broadcast::Sender<ViewEvent>,
}

impl<S: SessionStorage> ChatController<S> {
    #[must_use]
    pub fn new(
        transport: TransportHandle,
        store: ConversationStore<S>,
        clock: Arc<dyn Clock>,
    ) -> (Self, ControllerHandle) {
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);
        let (views, _) = broadcast::channel(VIEW_BUFFER);
        let handle = ControllerHandle {
            commands: commands_tx.clone(),
            views: views.clone(),
        };
        let controller = Self {
            transport,
            connection: ConnectionState::Closed,
            store,
            reply: ReplyState::Idle,
            awaiting_reply: false,
            clock,
            banner_ttl: DEFAULT_BANNER_TTL,
            next_banner_id: 0,
            commands_tx,
            commands_rx,
            views,
        };
        (controller, handle)
    }

    #[must_use]
    pub fn with_banner_ttl(mut self, ttl: Duration) -> Self {
        self.banner_ttl = ttl;
        self
    }

    /// Process input until the transport stops.
    ///
    /// The transport starts `Closed` and reports every change afterwards, so
    /// connection views are replayed from its events rather than sampled.
    pub async fn run(mut self, mut transport_events: mpsc::Receiver<TransportEvent>) {
        tracing::info!(messages = self.store.messages().len(), "Chat controller started");
        self.publish_history();
        self.publish(ViewEvent::Connection {
            state: self.connection,
        });

        loop {
            tokio::select! {
                Some(command) = self.commands_rx.recv() => self.handle_command(command),
                event = transport_events.recv() => match event {
                    Some(event) => self.handle_transport_event(event),
                    None => break,
                },
            }
        }

        tracing::info!("Chat controller stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Submit(text) => self.submit(&text),
            Command::ReplayHistory => self.publish_history(),
            Command::ExpireBanner(id) => self.publish(ViewEvent::BannerExpired { id }),
        }
    }

    fn submit(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        if !self.connection.is_open() {
            self.notice(NOT_CONNECTED_NOTICE);
            return;
        }
        if self.awaiting_reply {
            self.notice(BUSY_NOTICE);
            return;
        }

        // Only a message the transport accepted enters the log
        match self.transport.send(text) {
            Ok(()) => self.awaiting_reply = true,
            Err(TransportError::NotConnected) => {
                self.notice(NOT_CONNECTED_NOTICE);
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Send failed");
                self.notice(&e.to_string());
                return;
            }
        }

        let message = ChatMessage::user(text, self.clock.now_hhmm());
        if let Err(e) = self.store.append(message.clone()) {
            tracing::warn!(error = %e, "Failed to persist user message");
        }
        self.publish(ViewEvent::MessageAppended { message });
    }

    /// The transport lost a message after accepting it
    fn send_dropped(&mut self, text: &str) {
        self.awaiting_reply = false;
        if let Some(message) = self.store.retract_user_message(text) {
            if let Err(e) = self.store.persist() {
                tracing::warn!(error = %e, "Failed to persist history");
            }
            self.publish(ViewEvent::MessageRetracted { message });
        }
        self.notice(NOT_CONNECTED_NOTICE);
    }

    fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::StateChanged(state) => {
                self.connection = state;
                if state == ConnectionState::Closed && self.reply.is_streaming() {
                    tracing::info!("Connection lost mid-reply, abandoning it");
                    self.reply = ReplyState::Idle;
                    self.execute_effect(Effect::AbandonReply);
                }
                if state == ConnectionState::Closed {
                    self.awaiting_reply = false;
                }
                self.publish(ViewEvent::Connection { state });
            }
            TransportEvent::Frame(raw) => match Frame::parse(&raw) {
                Ok(frame) => self.apply_frame(frame),
                Err(e) => {
                    tracing::warn!(error = %e, len = raw.len(), "Dropping malformed frame");
                }
            },
            TransportEvent::SendDropped(text) => self.send_dropped(&text),
        }
    }

    fn apply_frame(&mut self, frame: Frame) {
        match transition(&self.reply, frame) {
            Ok(result) => {
                self.reply = result.next;
                for effect in result.effects {
                    self.execute_effect(effect);
                }
            }
            Err(e) => tracing::warn!(error = %e, "Ignoring out-of-sequence frame"),
        }
    }

    fn execute_effect(&mut self, effect: Effect) {
        match effect {
            Effect::OpenReply => {
                let timestamp = self.clock.now_hhmm();
                self.store.begin_reply(timestamp.clone());
                self.publish(ViewEvent::ReplyStarted { timestamp });
            }
            Effect::AppendFragment { text } => {
                if let Some(so_far) = self.store.push_fragment(&text) {
                    let text = so_far.to_string();
                    self.publish(ViewEvent::ReplyUpdated { text });
                }
            }
            Effect::FinalizeReply { text } => {
                self.awaiting_reply = false;
                if let Some(message) = self.store.finalize_reply(text) {
                    if let Err(e) = self.store.persist() {
                        tracing::warn!(error = %e, "Failed to persist reply");
                    }
                    self.publish(ViewEvent::ReplyFinished { message });
                }
            }
            Effect::AbandonReply => {
                self.awaiting_reply = false;
                if self.store.abandon_reply() {
                    self.publish(ViewEvent::ReplyAbandoned);
                }
            }
            Effect::ShowBanner { message } => {
                self.awaiting_reply = false;
                self.show_banner(message);
            }
        }
    }

    fn show_banner(&mut self, text: String) {
        let id = self.next_banner_id;
        self.next_banner_id += 1;
        tracing::info!(id, %text, "Showing error banner");
        self.publish(ViewEvent::Banner { id, text });

        let commands = self.commands_tx.clone();
        let ttl = self.banner_ttl;
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            let _ = commands.send(Command::ExpireBanner(id)).await;
        });
    }

    fn notice(&self, text: &str) {
        self.publish(ViewEvent::Notice {
            text: text.to_string(),
        });
    }

    fn publish_history(&self) {
        self.publish(ViewEvent::History {
            entries: self.store.display().to_vec(),
        });
    }

    fn publish(&self, event: ViewEvent) {
        // No subscribers is fine
        let _ = self.views.send(event);
    }
}

#[cfg(test)]
mod tests;

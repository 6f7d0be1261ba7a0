//! Conversation store
//!
//! Owns the ordered list of finalized messages and mirrors it to session
//! storage on every change. The display list is what the UI renders: it
//! also carries the in-progress reply and replies abandoned mid-stream, which
//! are never persisted.

pub mod storage;

pub use storage::{FileStorage, MemoryStorage, SessionStorage};

use crate::message::{ChatMessage, Sender};
use serde::Serialize;
use thiserror::Error;

/// Storage key holding the serialized history
pub const HISTORY_KEY: &str = "chatHistory";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize history: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("storage lock poisoned")]
    Poisoned,
}

/// Lifecycle of a displayed message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Final,
    Streaming,
    /// Partial reply cut off by an error; shown but not persisted
    Abandoned,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayEntry {
    pub message: ChatMessage,
    pub status: EntryStatus,
}

pub struct ConversationStore<S> {
    storage: S,
    messages: Vec<ChatMessage>,
    display: Vec<DisplayEntry>,
    /// Index into `display` of the reply being streamed
    streaming: Option<usize>,
    history_limit: Option<usize>,
}

impl<S: SessionStorage> ConversationStore<S> {
    /// Load history from storage. Missing or malformed data yields an empty
    /// history.
    #[must_use]
    pub fn load(storage: S) -> Self {
        let messages = read_history(&storage);
        tracing::debug!(count = messages.len(), "Loaded chat history");
        let display = messages
            .iter()
            .cloned()
            .map(|message| DisplayEntry {
                message,
                status: EntryStatus::Final,
            })
            .collect();
        Self {
            storage,
            messages,
            display,
            streaming: None,
            history_limit: None,
        }
    }

    /// Keep at most `limit` finalized messages, dropping the oldest first.
    /// `None` keeps everything.
    #[must_use]
    pub fn with_history_limit(mut self, limit: Option<usize>) -> Self {
        self.history_limit = limit;
        self.enforce_limit();
        self
    }

    /// Finalized messages in chronological order
    #[must_use]
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Everything the UI should show, in order
    #[must_use]
    pub fn display(&self) -> &[DisplayEntry] {
        &self.display
    }

    #[must_use]
    pub fn streaming_text(&self) -> Option<&str> {
        self.streaming
            .map(|idx| self.display[idx].message.text.as_str())
    }

    /// Append a finalized message and persist the full history
    ///
    /// # Errors
    ///
    /// Fails when the history cannot be written; the message is kept in
    /// memory either way.
    pub fn append(&mut self, message: ChatMessage) -> Result<(), StoreError> {
        self.push_final(message);
        self.persist()
    }

    /// Serialize the full history to storage
    ///
    /// # Errors
    ///
    /// Serialization or storage failures.
    pub fn persist(&self) -> Result<(), StoreError> {
        let raw = serde_json::to_string(&self.messages)?;
        self.storage.set(HISTORY_KEY, &raw)
    }

    /// Register an empty bot message that grows as fragments arrive
    pub fn begin_reply(&mut self, timestamp: impl Into<String>) {
        if self.streaming.is_some() {
            tracing::warn!("New reply started over an unfinished one");
            self.abandon_reply();
        }
        self.display.push(DisplayEntry {
            message: ChatMessage::bot(String::new(), timestamp),
            status: EntryStatus::Streaming,
        });
        self.streaming = Some(self.display.len() - 1);
    }

    /// Append a fragment to the in-progress reply, returning the text so far
    pub fn push_fragment(&mut self, fragment: &str) -> Option<&str> {
        let idx = self.streaming?;
        let text = &mut self.display[idx].message.text;
        text.push_str(fragment);
        Some(text.as_str())
    }

    /// Mark the in-progress reply final with `text`. Call [`Self::persist`]
    /// afterwards.
    pub fn finalize_reply(&mut self, text: String) -> Option<ChatMessage> {
        let idx = self.streaming.take()?;
        let entry = &mut self.display[idx];
        entry.message.text = text;
        entry.status = EntryStatus::Final;
        let message = entry.message.clone();
        self.messages.push(message.clone());
        self.enforce_limit();
        Some(message)
    }

    /// Stop tracking the in-progress reply. Its text stays on display.
    pub fn abandon_reply(&mut self) -> bool {
        match self.streaming.take() {
            Some(idx) => {
                self.display[idx].status = EntryStatus::Abandoned;
                true
            }
            None => false,
        }
    }

    /// Remove the most recent user message with this text. Used when the
    /// message never reached the peer. Call [`Self::persist`] afterwards.
    pub fn retract_user_message(&mut self, text: &str) -> Option<ChatMessage> {
        let is_match = |m: &ChatMessage| m.sender == Sender::User && m.text == text;
        let pos = self.messages.iter().rposition(is_match)?;
        let message = self.messages.remove(pos);
        if let Some(idx) = self
            .display
            .iter()
            .rposition(|e| e.status == EntryStatus::Final && is_match(&e.message))
        {
            self.display.remove(idx);
            if let Some(streaming) = self.streaming.as_mut() {
                if idx < *streaming {
                    *streaming -= 1;
                }
            }
        }
        Some(message)
    }

    /// Drop all history, in memory and in storage
    ///
    /// # Errors
    ///
    /// Fails when the stored history cannot be removed.
    pub fn clear(&mut self) -> Result<(), StoreError> {
        self.messages.clear();
        self.display.clear();
        self.streaming = None;
        self.storage.remove(HISTORY_KEY)
    }

    fn push_final(&mut self, message: ChatMessage) {
        self.messages.push(message.clone());
        self.display.push(DisplayEntry {
            message,
            status: EntryStatus::Final,
        });
        self.enforce_limit();
    }

    fn enforce_limit(&mut self) {
        let Some(limit) = self.history_limit else {
            return;
        };
        while self.messages.len() > limit {
            self.messages.remove(0);
            if let Some(pos) = self
                .display
                .iter()
                .position(|e| e.status == EntryStatus::Final)
            {
                self.display.remove(pos);
                if let Some(idx) = self.streaming.as_mut() {
                    if pos < *idx {
                        *idx -= 1;
                    }
                }
            }
        }
    }
}

fn read_history<S: SessionStorage>(storage: &S) -> Vec<ChatMessage> {
    match storage.get(HISTORY_KEY) {
        Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Discarding malformed chat history");
            Vec::new()
        }),
        Ok(None) => Vec::new(),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read chat history");
            Vec::new()
        }
    }
}

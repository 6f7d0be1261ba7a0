//! Chat message types

use serde::{Deserialize, Serialize};

/// Who wrote a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
}

/// A finalized chat message
///
/// Serialized as `{ "text", "sender", "time" }`, the layout the session
/// history has always used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub text: String,
    pub sender: Sender,
    /// Wall-clock time formatted as `HH:MM`
    #[serde(rename = "time")]
    pub timestamp: String,
}

impl ChatMessage {
    #[must_use]
    pub fn user(text: impl Into<String>, timestamp: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sender: Sender::User,
            timestamp: timestamp.into(),
        }
    }

    #[must_use]
    pub fn bot(text: impl Into<String>, timestamp: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sender: Sender::Bot,
            timestamp: timestamp.into(),
        }
    }
}

/// Source of message timestamps
pub trait Clock: Send + Sync {
    /// Current local time as `HH:MM`
    fn now_hhmm(&self) -> String;
}

/// Local system time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_hhmm(&self) -> String {
        chrono::Local::now().format("%H:%M").to_string()
    }
}

/// Clock pinned to one time, for tests and replays
#[derive(Debug, Clone)]
pub struct FixedClock(pub String);

impl Clock for FixedClock {
    fn now_hhmm(&self) -> String {
        self.0.clone()
    }
}

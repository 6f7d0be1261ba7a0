//! Wire frames on the chat channel

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One inbound event from the chat endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Frame {
    /// A fragment of the reply being streamed
    Chunk { content: String },
    /// The reply is finished
    Complete,
    /// The peer gave up on the reply
    Error { message: String },
}

/// Outbound envelope for a user message
#[derive(Debug, Clone, Serialize)]
pub struct OutboundFrame<'a> {
    pub message: &'a str,
}

#[derive(Debug, Error)]
#[error("malformed frame: {source}")]
pub struct FrameError {
    #[from]
    source: serde_json::Error,
}

impl Frame {
    /// # Errors
    ///
    /// Invalid JSON, or a missing or unknown `type`.
    pub fn parse(raw: &str) -> Result<Self, FrameError> {
        Ok(serde_json::from_str(raw)?)
    }
}

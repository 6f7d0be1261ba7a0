//! Events published to the UI

use crate::message::ChatMessage;
use crate::store::DisplayEntry;
use crate::transport::ConnectionState;

/// Everything a renderer needs to mirror the conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewEvent {
    /// Full display list, sent on start and on request
    History { entries: Vec<DisplayEntry> },
    /// A finalized message was added (user messages)
    MessageAppended { message: ChatMessage },
    /// A user message was taken back out of the log because it never left
    /// the client
    MessageRetracted { message: ChatMessage },
    /// An empty bot bubble appeared
    ReplyStarted { timestamp: String },
    /// The in-progress reply grew; `text` is everything so far
    ReplyUpdated { text: String },
    ReplyFinished { message: ChatMessage },
    /// The in-progress reply was cut off; its partial text stays visible
    ReplyAbandoned,
    /// Sending is only possible while `Open`
    Connection { state: ConnectionState },
    Banner { id: u64, text: String },
    BannerExpired { id: u64 },
    /// Short inline notice, e.g. a refused send
    Notice { text: String },
}

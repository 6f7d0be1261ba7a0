//! Effects produced by assembler transitions

/// Effects to be executed after a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Register an empty bot message so the reply shows up immediately
    OpenReply,

    /// Append a fragment to the visible in-progress reply
    AppendFragment { text: String },

    /// Turn the in-progress reply into a finalized message and persist it
    FinalizeReply { text: String },

    /// Stop tracking the in-progress reply without persisting it
    AbandonReply,

    /// Show a transient error banner
    ShowBanner { message: String },
}

impl Effect {
    #[must_use]
    pub fn append(text: impl Into<String>) -> Self {
        Effect::AppendFragment { text: text.into() }
    }

    #[must_use]
    pub fn banner(message: impl Into<String>) -> Self {
        Effect::ShowBanner {
            message: message.into(),
        }
    }
}

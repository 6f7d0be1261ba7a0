//! Pure reply transition function

use super::{Effect, Frame};
use thiserror::Error;

/// Reply assembly state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ReplyState {
    /// No reply in progress
    #[default]
    Idle,
    /// A reply is being streamed; `text` is everything received so far
    Streaming { text: String },
}

impl ReplyState {
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        matches!(self, ReplyState::Streaming { .. })
    }
}

/// Result of a transition
#[derive(Debug)]
pub struct Transition {
    pub next: ReplyState,
    pub effects: Vec<Effect>,
}

impl Transition {
    fn new(next: ReplyState) -> Self {
        Self {
            next,
            effects: vec![],
        }
    }

    fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AssemblyError {
    #[error("completion received with no reply in progress")]
    NothingToComplete,
}

/// Apply one frame to the reply state.
///
/// A chunk arriving while idle always opens a new reply, including right
/// after a completion with no user message in between.
///
/// # Errors
///
/// [`AssemblyError::NothingToComplete`] for a completion while idle.
pub fn transition(state: &ReplyState, frame: Frame) -> Result<Transition, AssemblyError> {
    match (state, frame) {
        (ReplyState::Idle, Frame::Chunk { content }) => Ok(Transition::new(ReplyState::Streaming {
            text: content.clone(),
        })
        .with_effect(Effect::OpenReply)
        .with_effect(Effect::append(content))),

        (ReplyState::Streaming { text }, Frame::Chunk { content }) => {
            let mut text = text.clone();
            text.push_str(&content);
            Ok(Transition::new(ReplyState::Streaming { text }).with_effect(Effect::append(content)))
        }

        (ReplyState::Streaming { text }, Frame::Complete) => {
            Ok(Transition::new(ReplyState::Idle)
                .with_effect(Effect::FinalizeReply { text: text.clone() }))
        }

        (ReplyState::Idle, Frame::Complete) => Err(AssemblyError::NothingToComplete),

        // Partial text stays on screen but is never finalized
        (ReplyState::Streaming { .. }, Frame::Error { message }) => {
            Ok(Transition::new(ReplyState::Idle)
                .with_effect(Effect::AbandonReply)
                .with_effect(Effect::banner(message)))
        }

        (ReplyState::Idle, Frame::Error { message }) => {
            Ok(Transition::new(ReplyState::Idle).with_effect(Effect::banner(message)))
        }
    }
}

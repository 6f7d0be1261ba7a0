//! Streamed reply assembly
//!
//! Turns inbound chat frames into finalized bot messages. The transition
//! function is pure; the controller executes the effects it returns.

mod effect;
pub mod frame;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;

pub use effect::Effect;
pub use frame::{Frame, FrameError};
pub use transition::{transition, AssemblyError, ReplyState, Transition};

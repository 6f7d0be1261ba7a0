//! Study tracker chat client
//!
//! A streaming chat client for the study-tracking backend: a reconnecting
//! WebSocket transport, a frame assembler that builds bot replies
//! incrementally, and a conversation log mirrored to session storage.

pub mod assembler;
pub mod config;
pub mod controller;
pub mod gateway;
pub mod message;
pub mod store;
pub mod transport;

pub use config::ChatConfig;
pub use controller::{ChatController, ControllerHandle, ViewEvent};
pub use message::{ChatMessage, Sender};

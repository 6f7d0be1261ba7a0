//! Gateway error types

use thiserror::Error;

/// Failed API call, normalized to a user-facing message
#[derive(Debug, Error)]
#[error("{message}")]
pub struct GatewayError {
    pub kind: GatewayErrorKind,
    pub message: String,
    /// HTTP status when the server answered
    pub status: Option<u16>,
}

impl GatewayError {
    #[must_use]
    pub fn new(kind: GatewayErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorKind::Network, message)
    }

    #[must_use]
    pub fn unauthorized() -> Self {
        Self::new(GatewayErrorKind::Unauthorized, "Session expired, please log in again")
            .with_status(401)
    }

    #[must_use]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorKind::Decode, message)
    }

    /// Classify a non-2xx response
    #[must_use]
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let kind = match status {
            401 => GatewayErrorKind::Unauthorized,
            500..=599 => GatewayErrorKind::Server,
            _ => GatewayErrorKind::Client,
        };
        Self::new(kind, message).with_status(status)
    }
}

/// Error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayErrorKind {
    /// Connection failed or timed out
    Network,
    /// Token missing, invalid or expired (401); the stored token is dropped
    Unauthorized,
    /// Other 4xx
    Client,
    /// 5xx
    Server,
    /// Response body did not match the expected shape
    Decode,
}

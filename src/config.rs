//! Runtime configuration from environment variables

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must be a non-negative integer, got {value:?}")]
    InvalidNumber { var: &'static str, value: String },
}

/// Client configuration
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Chat WebSocket endpoint
    pub ws_url: String,
    /// Base URL of the REST API
    pub api_url: String,
    /// Directory holding session state. `None` keeps the session in a
    /// temporary directory that lasts for one run.
    pub session_dir: Option<PathBuf>,
    pub reconnect_delay: Duration,
    /// How long an error banner stays up
    pub banner_ttl: Duration,
    /// Cap on stored messages; `None` keeps everything
    pub history_limit: Option<usize>,
    /// Bearer token for the REST API
    pub token: Option<String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            ws_url: "ws://localhost:8000/api/chatbot/ws".to_string(),
            api_url: "http://localhost:8000".to_string(),
            session_dir: None,
            reconnect_delay: Duration::from_millis(3000),
            banner_ttl: Duration::from_millis(5000),
            history_limit: None,
            token: None,
        }
    }
}

impl ChatConfig {
    /// # Errors
    ///
    /// [`ConfigError::InvalidNumber`] for a numeric variable that does not
    /// parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup
    ///
    /// # Errors
    ///
    /// Same as [`ChatConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let number = |var: &'static str| -> Result<Option<u64>, ConfigError> {
            lookup(var)
                .map(|value| {
                    value
                        .trim()
                        .parse::<u64>()
                        .map_err(|_| ConfigError::InvalidNumber { var, value })
                })
                .transpose()
        };

        Ok(Self {
            ws_url: lookup("STUDYFLOW_WS_URL").unwrap_or(defaults.ws_url),
            api_url: lookup("STUDYFLOW_API_URL").unwrap_or(defaults.api_url),
            session_dir: lookup("STUDYFLOW_SESSION_DIR")
                .filter(|dir| !dir.is_empty())
                .map(PathBuf::from),
            reconnect_delay: number("STUDYFLOW_RECONNECT_MS")?
                .map_or(defaults.reconnect_delay, Duration::from_millis),
            banner_ttl: number("STUDYFLOW_BANNER_MS")?.map_or(defaults.banner_ttl, Duration::from_millis),
            history_limit: number("STUDYFLOW_HISTORY_LIMIT")?
                .map(|n| usize::try_from(n).unwrap_or(usize::MAX)),
            token: lookup("STUDYFLOW_TOKEN").filter(|t| !t.is_empty()),
        })
    }
}

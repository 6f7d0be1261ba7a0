//! Authenticated HTTP gateway for the non-chat endpoints
//!
//! Every call sends JSON, attaches the bearer token when one is set, and
//! normalizes failures into [`GatewayError`].

mod error;

pub use error::{GatewayError, GatewayErrorKind};

use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::RwLock;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for the study tracker's REST API
pub struct ApiClient {
    http: Client,
    base_url: String,
    token: RwLock<Option<String>>,
}

impl ApiClient {
    /// # Errors
    ///
    /// Fails when the HTTP client cannot be built.
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self, GatewayError> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| GatewayError::network(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: RwLock::new(token),
        })
    }

    pub async fn token(&self) -> Option<String> {
        self.token.read().await.clone()
    }

    pub async fn set_token(&self, token: Option<String>) {
        *self.token.write().await = token;
    }

    /// Issue a request and decode the JSON body.
    ///
    /// A body that is not JSON decodes as `null`.
    ///
    /// # Errors
    ///
    /// A [`GatewayError`] for network failures and non-2xx answers, where a
    /// 401 also drops the stored token, and for bodies that do not decode
    /// into `T`.
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<T, GatewayError> {
        let mut builder = self.builder(method, path).await;
        if let Some(body) = body {
            builder = builder.json(body);
        }
        self.execute(builder).await
    }

    async fn builder(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let mut builder = self
            .http
            .request(method, url)
            .header(CONTENT_TYPE, "application/json");
        if let Some(token) = self.token.read().await.as_deref() {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    async fn execute<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, GatewayError> {
        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                GatewayError::network(format!("Request timeout: {e}"))
            } else {
                GatewayError::network(format!("Connection failed: {e}"))
            }
        })?;

        let status = response.status();
        let url = response.url().path().to_string();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| GatewayError::network(format!("Failed to read response: {e}")))?;
        let data: Value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

        if !status.is_success() {
            if status == StatusCode::UNAUTHORIZED {
                tracing::warn!(path = %url, "Token rejected, clearing credentials");
                self.token.write().await.take();
                return Err(GatewayError::unauthorized());
            }
            let message = error_message(&data, status);
            tracing::debug!(path = %url, status = status.as_u16(), %message, "API request failed");
            return Err(GatewayError::from_status(status.as_u16(), message));
        }

        serde_json::from_value(data)
            .map_err(|e| GatewayError::decode(format!("Unexpected response shape: {e}")))
    }
}

#[allow(clippy::missing_errors_doc)] // Endpoints fail exactly as `request` does
impl ApiClient {
    // Study sessions

    pub async fn sessions(&self, params: &[(&str, &str)]) -> Result<Value, GatewayError> {
        let builder = self.builder(Method::GET, "/api/sessions/").await.query(params);
        self.execute(builder).await
    }

    pub async fn create_session(&self, data: &Value) -> Result<Value, GatewayError> {
        self.request(Method::POST, "/api/sessions/", Some(data)).await
    }

    pub async fn update_session(&self, id: i64, data: &Value) -> Result<Value, GatewayError> {
        self.request(Method::PUT, &format!("/api/sessions/{id}"), Some(data))
            .await
    }

    pub async fn delete_session(&self, id: i64) -> Result<Value, GatewayError> {
        self.request(Method::DELETE, &format!("/api/sessions/{id}"), None)
            .await
    }

    // Stats

    pub async fn weekly_stats(&self) -> Result<Value, GatewayError> {
        self.request(Method::GET, "/api/stats/weekly/", None).await
    }

    pub async fn dashboard_stats(&self) -> Result<Value, GatewayError> {
        self.request(Method::GET, "/api/stats/dashboard/", None).await
    }

    pub async fn history_stats(&self) -> Result<Value, GatewayError> {
        self.request(Method::GET, "/api/stats/history/", None).await
    }

    // Auth

    /// Log in and keep the returned `access_token` for later calls
    pub async fn login(&self, credentials: &Value) -> Result<Value, GatewayError> {
        let response: Value = self
            .request(Method::POST, "/api/auth/login/", Some(credentials))
            .await?;
        if let Some(token) = response.get("access_token").and_then(Value::as_str) {
            self.set_token(Some(token.to_string())).await;
        } else {
            tracing::warn!("Login response carried no access token");
        }
        Ok(response)
    }

    pub async fn register(&self, data: &Value) -> Result<Value, GatewayError> {
        self.request(Method::POST, "/api/auth/register/", Some(data))
            .await
    }

    // Profile

    pub async fn profile(&self) -> Result<Value, GatewayError> {
        self.request(Method::GET, "/api/profile/", None).await
    }

    pub async fn update_profile(&self, data: &Value) -> Result<Value, GatewayError> {
        self.request(Method::PUT, "/api/profile/", Some(data)).await
    }

    pub async fn me(&self) -> Result<Value, GatewayError> {
        self.request(Method::GET, "/api/profile/me", None).await
    }
}

/// Prefer the server's `detail`, then `message`, then the bare status
fn error_message(data: &Value, status: StatusCode) -> String {
    ["detail", "message"]
        .iter()
        .find_map(|key| data.get(key).and_then(Value::as_str))
        .map_or_else(|| format!("HTTP {}", status.as_u16()), str::to_string)
}

/// Initials for an avatar: first letter of up to two words, uppercased
#[must_use]
pub fn initials(full_name: &str) -> String {
    full_name
        .split_whitespace()
        .filter_map(|word| word.chars().next())
        .flat_map(char::to_uppercase)
        .take(2)
        .collect()
}

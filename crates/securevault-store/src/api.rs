//! REST client for the vault API.
//!
//! Every endpoint answers with an envelope:
//!
//! ```json
//! { "success": true, "data": ..., "error": null, "message": null }
//! ```
//!
//! A request succeeds only when the HTTP status is 2xx, `success` is true,
//! and `data` is present. The failure message is taken from `error`, then
//! `message`, then a generic fallback.

use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{StoreError, StoreResult};

/// Default base URL of the vault API.
pub const DEFAULT_API_URL: &str = "http://localhost:3000";

/// Response envelope shared by all endpoints.
#[derive(Debug, serde::Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub message: Option<String>,
}

impl<T> Envelope<T> {
    fn failure_message(&self) -> Option<String> {
        self.error.clone().or_else(|| self.message.clone())
    }

    /// Unwrap into the payload, applying the success/data rules.
    pub fn into_data(self) -> StoreResult<T> {
        if !self.success {
            return Err(StoreError::api(
                self.failure_message()
                    .unwrap_or_else(|| "API request failed".to_string()),
            ));
        }
        self.data.ok_or(StoreError::EmptyResponse)
    }
}

/// Thin wrapper around `reqwest` bound to the API base URL.
///
/// Cloning is cheap; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    http: reqwest::Client,
}

impl ApiClient {
    /// Create a client for `base_url` (for example `http://localhost:3000`).
    pub fn new(base_url: &str) -> StoreResult<Self> {
        Self::with_client(base_url, reqwest::Client::new())
    }

    pub fn with_client(base_url: &str, http: reqwest::Client) -> StoreResult<Self> {
        // Validate early so a typo fails at startup, not on first use.
        url::Url::parse(base_url)?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> StoreResult<T> {
        self.envelope::<T>(Method::GET, path, None).await?.into_data()
    }

    pub async fn post<B, T>(&self, path: &str, body: &B) -> StoreResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = serde_json::to_value(body)?;
        self.envelope::<T>(Method::POST, path, Some(&body))
            .await?
            .into_data()
    }

    pub async fn put<B, T>(&self, path: &str, body: &B) -> StoreResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = serde_json::to_value(body)?;
        self.envelope::<T>(Method::PUT, path, Some(&body))
            .await?
            .into_data()
    }

    /// DELETE only requires a success envelope; `data` may be absent.
    pub async fn delete(&self, path: &str) -> StoreResult<()> {
        let envelope = self.envelope::<Value>(Method::DELETE, path, None).await?;
        if envelope.success {
            Ok(())
        } else {
            Err(StoreError::api(
                envelope
                    .failure_message()
                    .unwrap_or_else(|| "API request failed".to_string()),
            ))
        }
    }

    /// Send a request and decode the body as `T` without envelope rules.
    ///
    /// Non-2xx statuses still fail, with the server's message when it sent
    /// one.
    pub async fn request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> StoreResult<T> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!(%method, %url, "api request");

        let mut request = self.http.request(method, &url);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;

        if !status.is_success() {
            let message = serde_json::from_slice::<Envelope<Value>>(&bytes)
                .ok()
                .and_then(|e| e.failure_message())
                .unwrap_or_else(|| format!("HTTP error! status: {}", status.as_u16()));
            tracing::warn!(status = status.as_u16(), %url, %message, "api request failed");
            return Err(StoreError::Api {
                status: Some(status.as_u16()),
                message,
            });
        }

        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn envelope<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> StoreResult<Envelope<T>> {
        self.request_json(method, path, body).await
    }
}

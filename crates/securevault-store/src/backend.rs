//! Hosted backend client (PostgREST tables + object storage).
//!
//! Two concerns live on the hosted backend rather than behind the vault API:
//! the `user_master.master_password` PIN reference, and the attachment
//! buckets. Both authenticate with the project's anon key.
//!
//! When the URL or key is missing the client is built in placeholder mode:
//! construction succeeds with a warning and every call fails with
//! [`StoreError::NotConfigured`].

use async_trait::async_trait;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::header::{AUTHORIZATION, CACHE_CONTROL, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::{StoreError, StoreResult};

/// Characters kept verbatim inside an object-path segment.
const OBJECT_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Backend connection settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    pub url: Option<String>,
    pub anon_key: Option<String>,
}

impl BackendConfig {
    pub fn new(url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            anon_key: Some(anon_key.into()),
        }
    }

    /// Whether both URL and key are present and non-blank.
    pub fn is_complete(&self) -> bool {
        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        present(&self.url) && present(&self.anon_key)
    }
}

// ---------------------------------------------------------------------------
// Object storage seam
// ---------------------------------------------------------------------------

/// Bucketed blob storage with public URLs.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store `bytes` at `path` in `bucket`. Existing objects are not
    /// overwritten.
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> StoreResult<()>;

    /// Public URL for an object.
    fn public_url(&self, bucket: &str, path: &str) -> StoreResult<String>;

    /// Remove objects by path.
    async fn remove(&self, bucket: &str, paths: &[String]) -> StoreResult<()>;
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Connection {
    url: String,
    http: reqwest::Client,
}

/// Client for the hosted backend.
#[derive(Debug, Clone)]
pub struct BackendClient {
    conn: Option<Connection>,
}

#[derive(Debug, Deserialize)]
struct MasterRow {
    master_password: Option<String>,
}

impl BackendClient {
    /// Build a client. Incomplete configuration yields placeholder mode.
    pub fn new(config: &BackendConfig) -> StoreResult<Self> {
        let (Some(url), Some(key)) = (&config.url, &config.anon_key) else {
            return Ok(Self::placeholder());
        };
        if !config.is_complete() {
            return Ok(Self::placeholder());
        }

        url::Url::parse(url)?;
        let mut headers = HeaderMap::new();
        let key_value = HeaderValue::from_str(key.trim()).map_err(|_| StoreError::Backend {
            status: 0,
            message: "anon key is not a valid header value".to_string(),
        })?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", key.trim())).map_err(|_| {
            StoreError::Backend {
                status: 0,
                message: "anon key is not a valid header value".to_string(),
            }
        })?;
        headers.insert("apikey", key_value);
        headers.insert(AUTHORIZATION, bearer);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;
        tracing::info!(url = %url, "backend client configured");
        Ok(Self {
            conn: Some(Connection {
                url: url.trim_end_matches('/').to_string(),
                http,
            }),
        })
    }

    /// A client with no backend behind it.
    pub fn placeholder() -> Self {
        tracing::warn!("backend URL or anon key missing; running in placeholder mode");
        Self { conn: None }
    }

    pub fn is_placeholder(&self) -> bool {
        self.conn.is_none()
    }

    fn conn(&self) -> StoreResult<&Connection> {
        self.conn.as_ref().ok_or(StoreError::NotConfigured)
    }

    // -- user_master ----------------------------------------------------------

    /// Fetch the stored PIN reference, `None` when the table has no row.
    pub async fn fetch_master_reference(&self) -> StoreResult<Option<String>> {
        let conn = self.conn()?;
        let url = format!(
            "{}/rest/v1/user_master?select=master_password&limit=1",
            conn.url
        );
        tracing::debug!("fetching master reference");

        let response = conn.http.get(&url).send().await?;
        let rows: Vec<MasterRow> = read_json(response).await?;
        Ok(rows.into_iter().next().and_then(|row| row.master_password))
    }

    /// Replace the stored PIN reference on the single `user_master` row.
    pub async fn update_master_reference(&self, reference: &str) -> StoreResult<()> {
        let conn = self.conn()?;
        let url = format!("{}/rest/v1/user_master?id=eq.1", conn.url);

        let response = conn
            .http
            .patch(&url)
            .header("Prefer", "return=representation")
            .json(&json!({ "master_password": reference }))
            .send()
            .await?;
        let rows: Vec<Value> = read_json(response).await?;
        if rows.is_empty() {
            return Err(StoreError::NotFound {
                kind: "user_master",
                id: "1".to_string(),
            });
        }
        tracing::info!("master reference updated");
        Ok(())
    }
}

#[async_trait]
impl ObjectStorage for BackendClient {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> StoreResult<()> {
        let conn = self.conn()?;
        let url = format!(
            "{}/storage/v1/object/{}/{}",
            conn.url,
            encode_segment(bucket),
            encode_path(path)
        );
        tracing::debug!(bucket, size = bytes.len(), "uploading object");

        let response = conn
            .http
            .post(&url)
            .header(CONTENT_TYPE, content_type)
            .header(CACHE_CONTROL, "max-age=3600")
            .header("x-upsert", "false")
            .body(bytes)
            .send()
            .await?;
        let _: Value = read_json(response).await?;
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> StoreResult<String> {
        let conn = self.conn()?;
        Ok(format!(
            "{}/storage/v1/object/public/{}/{}",
            conn.url,
            encode_segment(bucket),
            encode_path(path)
        ))
    }

    async fn remove(&self, bucket: &str, paths: &[String]) -> StoreResult<()> {
        let conn = self.conn()?;
        let url = format!("{}/storage/v1/object/{}", conn.url, encode_segment(bucket));

        let response = conn
            .http
            .delete(&url)
            .json(&json!({ "prefixes": paths }))
            .send()
            .await?;
        let _: Value = read_json(response).await?;
        tracing::debug!(bucket, count = paths.len(), "objects removed");
        Ok(())
    }
}

fn encode_segment(segment: &str) -> String {
    utf8_percent_encode(segment, OBJECT_SEGMENT).to_string()
}

fn encode_path(path: &str) -> String {
    path.split('/')
        .map(encode_segment)
        .collect::<Vec<_>>()
        .join("/")
}

/// Decode a backend response, mapping failures to [`StoreError::Backend`].
async fn read_json<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> StoreResult<T> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| {
                ["message", "error", "msg"]
                    .iter()
                    .find_map(|k| v.get(*k).and_then(Value::as_str).map(str::to_string))
            })
            .unwrap_or(body);
        tracing::warn!(status = status.as_u16(), %message, "backend request failed");
        return Err(StoreError::Backend {
            status: status.as_u16(),
            message,
        });
    }

    Ok(serde_json::from_str(&body)?)
}

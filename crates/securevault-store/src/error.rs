//! Error types for the securevault-store crate.
//!
//! All remote and record operations return [`StoreError`] via
//! [`StoreResult`].

use thiserror::Error;

/// Alias for `Result<T, StoreError>`.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by repositories, the backend client and the helpers around
/// them.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Transport-level HTTP failure (connection refused, timeout, ...).
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The REST API answered with a failure status or a `success: false`
    /// envelope.
    #[error("{message}")]
    Api {
        /// HTTP status, when the failure came from the status line.
        status: Option<u16>,
        /// Message taken from the envelope (`error` or `message`).
        message: String,
    },

    /// A success envelope arrived without a `data` payload.
    #[error("No data returned from API")]
    EmptyResponse,

    /// The hosted backend rejected a request.
    #[error("backend error ({status}): {message}")]
    Backend { status: u16, message: String },

    /// Backend URL or key are missing; the client runs in placeholder mode.
    #[error("backend is not configured (set SUPABASE_URL and SUPABASE_ANON_KEY)")]
    NotConfigured,

    /// A record payload did not have the expected shape.
    #[error("malformed {kind} record: {reason}")]
    MalformedRecord { kind: &'static str, reason: String },

    /// A patch or item referenced a field the record kind does not have.
    #[error("unknown field `{field}` for {kind}")]
    UnknownField { kind: &'static str, field: String },

    /// A required field is missing or empty.
    #[error("{kind} requires `{field}`")]
    MissingField { kind: &'static str, field: String },

    /// A secure field would have been sent without a session key.
    #[error("vault is locked: cannot write secure field `{field}` without a session key")]
    Locked { field: String },

    /// The requested record is not in the collection.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// An attachment failed validation before upload.
    #[error("invalid attachment: {reason}")]
    InvalidAttachment { reason: String },

    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A configured URL could not be parsed.
    #[error("url parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// Field cipher or local storage failure.
    #[error("crypto error: {0}")]
    Crypto(#[from] securevault_crypto::CryptoError),

    /// Reading a local file failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub(crate) fn api(message: impl Into<String>) -> Self {
        Self::Api {
            status: None,
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_displays_server_message_verbatim() {
        let err = StoreError::Api {
            status: Some(500),
            message: "Failed to fetch bank accounts".into(),
        };
        assert_eq!(err.to_string(), "Failed to fetch bank accounts");
    }

    #[test]
    fn empty_response_message() {
        assert_eq!(
            StoreError::EmptyResponse.to_string(),
            "No data returned from API"
        );
    }

    #[test]
    fn field_errors_name_the_kind() {
        let err = StoreError::UnknownField {
            kind: "bank_accounts",
            field: "colour".into(),
        };
        assert_eq!(err.to_string(), "unknown field `colour` for bank_accounts");

        let err = StoreError::MissingField {
            kind: "deposits",
            field: "amount".into(),
        };
        assert_eq!(err.to_string(), "deposits requires `amount`");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<StoreError>();
    }
}

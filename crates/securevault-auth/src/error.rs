//! Error types for the auth crate.
//!
//! Every PIN and session operation surfaces failures through [`AuthError`].
//! Lookup failures, missing references and PIN mismatches are distinct
//! variants so callers can tell the user which one happened.

use securevault_crypto::CryptoError;
use securevault_store::StoreError;

/// Unified error type for SecureVault authentication.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The PIN does not match the stored reference.
    #[error("Invalid PIN")]
    InvalidPin,

    /// The PIN is not exactly six digits.
    #[error("PIN must be exactly {expected} digits")]
    InvalidPinFormat {
        /// Required number of digits.
        expected: usize,
    },

    /// The backend has no PIN reference to compare against.
    #[error("User not found. Please set up your PIN first.")]
    ReferenceMissing,

    /// The operation needs an authenticated session.
    #[error("not authenticated")]
    NotAuthenticated,

    /// Looking up or updating the PIN reference failed.
    #[error("failed to verify credentials: {0}")]
    Backend(#[from] StoreError),

    /// Local credential storage or key derivation failed.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// A blocking key-derivation task was cancelled or panicked.
    #[error("background task failed: {0}")]
    TaskJoin(String),
}

impl From<tokio::task::JoinError> for AuthError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::TaskJoin(err.to_string())
    }
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, AuthError>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pin_errors_are_distinct() {
        assert_eq!(AuthError::InvalidPin.to_string(), "Invalid PIN");
        assert_eq!(
            AuthError::ReferenceMissing.to_string(),
            "User not found. Please set up your PIN first."
        );
        assert_eq!(
            AuthError::InvalidPinFormat { expected: 6 }.to_string(),
            "PIN must be exactly 6 digits"
        );
    }

    #[test]
    fn backend_errors_keep_their_message() {
        let err = AuthError::from(StoreError::NotConfigured);
        assert!(err.to_string().starts_with("failed to verify credentials: "));
        assert!(err.to_string().contains("not configured"));
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<AuthError>();
    }
}

//! Error types for the crypto crate.
//!
//! Every public API in this crate returns [`CryptoError`]. Field-level
//! decryption is the exception: it degrades to a sentinel value instead of
//! failing (see [`crate::crypto::decrypt_field`]).

/// Unified error type for SecureVault cryptography and local storage.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    // -- Crypto errors ------------------------------------------------------
    /// Encryption failed (e.g. invalid key length, ring internal error).
    #[error("encryption failed: {reason}")]
    EncryptionFailed { reason: String },

    /// Decryption failed (e.g. wrong key, corrupted ciphertext, bad nonce).
    #[error("decryption failed: {reason}")]
    DecryptionFailed { reason: String },

    /// Key derivation failed (e.g. zero iterations).
    #[error("key derivation failed: {reason}")]
    KeyDerivationFailed { reason: String },

    /// A stored PIN reference could not be parsed.
    #[error("malformed PIN reference: {reason}")]
    MalformedReference { reason: String },

    // -- Local storage errors -----------------------------------------------
    /// A stored value exists but does not have the expected shape.
    #[error("corrupted local value for key {key}: {reason}")]
    CorruptedValue { key: String, reason: String },

    /// The storage lock was poisoned by a panicking writer.
    #[error("local storage lock poisoned")]
    LockPoisoned,

    // -- Underlying errors --------------------------------------------------
    /// SQLite error from `rusqlite`.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// JSON serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error from the filesystem.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the crypto crate.
pub type Result<T> = std::result::Result<T, CryptoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_corrupted_value() {
        let err = CryptoError::CorruptedValue {
            key: "secure_vault_biometric_credential".into(),
            reason: "not json".into(),
        };
        assert_eq!(
            err.to_string(),
            "corrupted local value for key secure_vault_biometric_credential: not json"
        );
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CryptoError>();
    }
}

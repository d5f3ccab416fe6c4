//! Cryptography and device-local state for SecureVault.
//!
//! # Modules
//!
//! - [`crypto`] — PBKDF2 PIN key derivation, AES-256-GCM field cipher, PIN
//!   references.
//! - [`storage`] — durable local key-value storage (SQLite or in-memory).
//! - [`credentials`] — typed credential record on top of local storage.
//! - [`keyslot`] — volatile slot holding the session key (and keys retired
//!   by a PIN change until re-encryption finishes).
//! - [`error`] — unified error type.
//!
//! # Quick Start
//!
//! ```rust
//! use securevault_crypto::crypto::{self, PIN_KEY_SALT};
//!
//! let key = crypto::derive_key("123456", PIN_KEY_SALT);
//! let sealed = crypto::encrypt_field("4111 1111 1111 1111", &key)?;
//! assert_eq!(crypto::decrypt_field(&sealed, &key), "4111 1111 1111 1111");
//! # Ok::<(), securevault_crypto::CryptoError>(())
//! ```

pub mod credentials;
pub mod crypto;
pub mod error;
pub mod keyslot;
pub mod storage;

pub use credentials::{BiometricCredential, CredentialRecord, CredentialStore, Theme};
pub use crypto::{SessionKey, UNREADABLE_SENTINEL};
pub use error::{CryptoError, Result};
pub use keyslot::SessionKeySlot;
pub use storage::{LocalStorage, MemoryStorage, SqliteStorage};

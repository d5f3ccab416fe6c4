//! Session and unlock flows for SecureVault.
//!
//! This crate owns everything between "app started" and "vault readable":
//!
//! - **PIN setup and login** against the backend PIN reference
//! - **Session key** derivation into the shared [`SessionKeySlot`]
//! - **Inactivity timeout** with a single resettable timer
//! - **Biometric unlock** through a pluggable platform authenticator
//! - **PIN change**, returning the previous key so stored fields can be
//!   re-encrypted
//!
//! # Architecture
//!
//! ```text
//! SessionManager
//! ├── PinReferenceStore   (remote PIN reference, BackendClient)
//! ├── CredentialStore     (local hash, flags, session marker)
//! ├── SessionKeySlot      (volatile key shared with repositories)
//! └── inactivity timer    (tokio task, one per session)
//!
//! BiometricBinder
//! └── PlatformAuthenticator (device credential API)
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use securevault_auth::{SessionConfig, SessionManager};
//! use securevault_crypto::{CredentialStore, MemoryStorage, SessionKeySlot};
//! use securevault_store::{BackendClient, BackendConfig};
//!
//! # async fn example() -> securevault_auth::Result<()> {
//! let backend = BackendClient::new(&BackendConfig::new("https://db.example", "anon"))?;
//! let credentials = CredentialStore::new(Arc::new(MemoryStorage::new()));
//! let session = SessionManager::new(
//!     Arc::new(backend),
//!     credentials,
//!     SessionKeySlot::new(),
//!     SessionConfig::default(),
//! )?;
//!
//! session.login("123456").await?;
//! assert!(session.is_authenticated());
//! # Ok(())
//! # }
//! ```
//!
//! [`SessionKeySlot`]: securevault_crypto::SessionKeySlot
//! [`CredentialStore`]: securevault_crypto::CredentialStore

pub mod biometric;
pub mod error;
pub mod session;

// Re-export key types at the crate root for convenience.
pub use biometric::{
    Assertion, AttestedCredential, BiometricBinder, CreationOptions, PlatformAuthenticator,
    PlatformError, RequestOptions,
};
pub use error::{AuthError, Result};
pub use session::{
    LogoutReason, PIN_LENGTH, PinChange, PinReferenceStore, SessionConfig, SessionEvent,
    SessionManager, SessionState, SessionStatus, UnlockMethod, validate_pin,
};

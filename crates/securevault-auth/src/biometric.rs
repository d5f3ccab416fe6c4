//! Biometric unlock via a platform public-key credential.
//!
//! The platform's credential API is reached only through the
//! [`PlatformAuthenticator`] trait. [`BiometricBinder`] registers one
//! credential per device, stores its handle in the credential record, and
//! later asks the platform for an assertion against it.
//!
//! A successful assertion only unlocks the session. It does not produce the
//! session key, so secure fields stay opaque until the PIN is entered.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use securevault_crypto::crypto;
use securevault_crypto::{BiometricCredential, CredentialStore};

use crate::error::Result;

/// Relying party display name.
pub const RP_NAME: &str = "SecureVault";

/// Display name attached to the registered user handle.
pub const USER_DISPLAY_NAME: &str = "SecureVault User";

/// Challenge size in bytes.
pub const CHALLENGE_LEN: usize = 32;

/// How long the platform may take to complete a ceremony.
pub const CEREMONY_TIMEOUT: Duration = Duration::from_secs(30);

/// COSE algorithm identifiers offered at registration (ES256, RS256).
pub const SUPPORTED_ALGORITHMS: [i32; 2] = [-7, -257];

// ---------------------------------------------------------------------------
// Platform seam
// ---------------------------------------------------------------------------

/// Failures reported by the platform authenticator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlatformError {
    #[error("biometric authenticator not available on this device")]
    NotAvailable,

    #[error("the user cancelled the request")]
    Cancelled,

    #[error("platform authenticator failed: {reason}")]
    Failed { reason: String },
}

/// Options for creating a platform credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreationOptions {
    pub challenge: Vec<u8>,
    pub rp_name: String,
    pub rp_id: String,
    pub user_id: Vec<u8>,
    pub user_name: String,
    pub user_display_name: String,
    pub algorithms: Vec<i32>,
    pub timeout: Duration,
    /// Restrict to built-in (platform) authenticators.
    pub platform_only: bool,
}

/// A freshly created credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestedCredential {
    pub raw_id: Vec<u8>,
    pub attestation_object: Vec<u8>,
}

/// Options for requesting an assertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOptions {
    pub challenge: Vec<u8>,
    pub allow_credentials: Vec<Vec<u8>>,
    pub timeout: Duration,
}

/// A signed assertion from the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assertion {
    pub credential_id: Vec<u8>,
    pub sign_count: u32,
}

/// The platform's public-key credential API.
#[async_trait]
pub trait PlatformAuthenticator: Send + Sync {
    /// Whether a user-verifying platform authenticator is present.
    async fn is_available(&self) -> bool;

    async fn create_credential(
        &self,
        options: CreationOptions,
    ) -> std::result::Result<AttestedCredential, PlatformError>;

    async fn get_assertion(
        &self,
        options: RequestOptions,
    ) -> std::result::Result<Assertion, PlatformError>;
}

// ---------------------------------------------------------------------------
// Binder
// ---------------------------------------------------------------------------

/// Registers and verifies the device's biometric credential.
#[derive(Clone)]
pub struct BiometricBinder {
    authenticator: Option<Arc<dyn PlatformAuthenticator>>,
    credentials: CredentialStore,
    rp_id: String,
}

impl BiometricBinder {
    /// `authenticator` is `None` on hosts without a platform credential API.
    pub fn new(
        authenticator: Option<Arc<dyn PlatformAuthenticator>>,
        credentials: CredentialStore,
        rp_id: impl Into<String>,
    ) -> Self {
        Self {
            authenticator,
            credentials,
            rp_id: rp_id.into(),
        }
    }

    /// Whether the platform exposes a credential API at all.
    pub fn is_supported(&self) -> bool {
        self.authenticator.is_some()
    }

    pub fn is_enabled(&self) -> bool {
        self.credentials.is_biometric_enabled().unwrap_or(false)
    }

    /// The stored credential handle, if any.
    pub fn credential(&self) -> Option<BiometricCredential> {
        self.credentials.biometric_credential().ok().flatten()
    }

    /// Create a credential and persist it. Returns `false` on any failure,
    /// including user cancellation.
    pub async fn register_credential(&self) -> bool {
        let Some(authenticator) = &self.authenticator else {
            tracing::warn!("biometrics not supported on this device");
            return false;
        };
        match self.try_register(authenticator.as_ref()).await {
            Ok(()) => {
                tracing::info!("biometric login enabled");
                true
            }
            Err(RegisterError::Platform(PlatformError::Cancelled)) => {
                tracing::info!("biometric registration cancelled");
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "biometric registration failed");
                false
            }
        }
    }

    async fn try_register(
        &self,
        authenticator: &dyn PlatformAuthenticator,
    ) -> std::result::Result<(), RegisterError> {
        if !authenticator.is_available().await {
            return Err(PlatformError::NotAvailable.into());
        }

        let user_id = self.credentials.device_user_id()?;
        let options = CreationOptions {
            challenge: crypto::random_bytes(CHALLENGE_LEN)?,
            rp_name: RP_NAME.to_string(),
            rp_id: self.rp_id.clone(),
            user_id: user_id.as_bytes().to_vec(),
            user_name: user_id,
            user_display_name: USER_DISPLAY_NAME.to_string(),
            algorithms: SUPPORTED_ALGORITHMS.to_vec(),
            timeout: CEREMONY_TIMEOUT,
            platform_only: true,
        };

        let created = authenticator.create_credential(options).await?;
        self.credentials
            .store_biometric_credential(&BiometricCredential {
                id: STANDARD.encode(&created.raw_id),
                public_key: STANDARD.encode(&created.attestation_object),
                counter: 0,
            })?;
        Ok(())
    }

    /// Ask the platform to assert the stored credential.
    ///
    /// Returns `true` only when the assertion names the stored credential and
    /// its signature counter has not gone backwards.
    pub async fn verify_credential(&self) -> bool {
        let Some(authenticator) = &self.authenticator else {
            return false;
        };
        let Some(stored) = self.credential() else {
            return false;
        };
        let Ok(credential_id) = STANDARD.decode(&stored.id) else {
            tracing::warn!("stored biometric credential id is not valid base64");
            return false;
        };
        let Ok(challenge) = crypto::random_bytes(CHALLENGE_LEN) else {
            return false;
        };

        let options = RequestOptions {
            challenge,
            allow_credentials: vec![credential_id.clone()],
            timeout: CEREMONY_TIMEOUT,
        };
        let assertion = match authenticator.get_assertion(options).await {
            Ok(assertion) => assertion,
            Err(e) => {
                tracing::info!(error = %e, "biometric verification failed");
                return false;
            }
        };

        if assertion.credential_id != credential_id {
            tracing::warn!("assertion was made with an unknown credential");
            return false;
        }
        // Authenticators that do not count always report zero.
        if assertion.sign_count != 0 && assertion.sign_count <= stored.counter {
            tracing::warn!(
                stored = stored.counter,
                reported = assertion.sign_count,
                "signature counter did not advance"
            );
            return false;
        }
        if assertion.sign_count > stored.counter {
            let updated = BiometricCredential {
                counter: assertion.sign_count,
                ..stored
            };
            if let Err(e) = self.credentials.store_biometric_credential(&updated) {
                tracing::warn!(error = %e, "failed to persist signature counter");
            }
        }
        true
    }

    /// Forget the credential and disable biometrics.
    pub fn clear_credential(&self) -> Result<()> {
        self.credentials.clear_biometric_credential()?;
        tracing::info!("biometric credential cleared");
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
enum RegisterError {
    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error(transparent)]
    Local(#[from] securevault_crypto::CryptoError),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use securevault_crypto::MemoryStorage;

    #[derive(Default)]
    struct FakeAuthenticator {
        unavailable: bool,
        cancel: bool,
        sign_count: u32,
        foreign_credential: bool,
        created: Mutex<Vec<CreationOptions>>,
        requested: Mutex<Vec<RequestOptions>>,
    }

    #[async_trait]
    impl PlatformAuthenticator for FakeAuthenticator {
        async fn is_available(&self) -> bool {
            !self.unavailable
        }

        async fn create_credential(
            &self,
            options: CreationOptions,
        ) -> std::result::Result<AttestedCredential, PlatformError> {
            self.created.lock().unwrap().push(options);
            if self.cancel {
                return Err(PlatformError::Cancelled);
            }
            Ok(AttestedCredential {
                raw_id: b"cred-1".to_vec(),
                attestation_object: b"attestation".to_vec(),
            })
        }

        async fn get_assertion(
            &self,
            options: RequestOptions,
        ) -> std::result::Result<Assertion, PlatformError> {
            self.requested.lock().unwrap().push(options);
            if self.cancel {
                return Err(PlatformError::Cancelled);
            }
            Ok(Assertion {
                credential_id: if self.foreign_credential {
                    b"other".to_vec()
                } else {
                    b"cred-1".to_vec()
                },
                sign_count: self.sign_count,
            })
        }
    }

    fn binder_with_store(
        fake: FakeAuthenticator,
        credentials: CredentialStore,
    ) -> (Arc<FakeAuthenticator>, CredentialStore, BiometricBinder) {
        let fake = Arc::new(fake);
        let authenticator: Arc<dyn PlatformAuthenticator> = fake.clone();
        let binder = BiometricBinder::new(Some(authenticator), credentials.clone(), "localhost");
        (fake, credentials, binder)
    }

    fn binder(fake: FakeAuthenticator) -> (Arc<FakeAuthenticator>, CredentialStore, BiometricBinder) {
        binder_with_store(fake, CredentialStore::new(Arc::new(MemoryStorage::new())))
    }

    #[tokio::test]
    async fn registration_persists_credential_and_flag() {
        let (fake, credentials, binder) = binder(FakeAuthenticator::default());
        assert!(binder.register_credential().await);

        let stored = credentials.biometric_credential().unwrap().unwrap();
        assert_eq!(stored.id, STANDARD.encode(b"cred-1"));
        assert_eq!(stored.public_key, STANDARD.encode(b"attestation"));
        assert_eq!(stored.counter, 0);
        assert!(credentials.is_biometric_enabled().unwrap());

        let options = fake.created.lock().unwrap()[0].clone();
        assert_eq!(options.challenge.len(), CHALLENGE_LEN);
        assert_eq!(options.rp_name, "SecureVault");
        assert_eq!(options.rp_id, "localhost");
        assert_eq!(options.user_id, credentials.device_user_id().unwrap().into_bytes());
        assert_eq!(options.algorithms, [-7, -257]);
        assert!(options.platform_only);
    }

    #[tokio::test]
    async fn unsupported_platform_makes_no_attempt() {
        let credentials = CredentialStore::new(Arc::new(MemoryStorage::new()));
        let binder = BiometricBinder::new(None, credentials.clone(), "localhost");
        assert!(!binder.is_supported());
        assert!(!binder.register_credential().await);
        assert!(!binder.verify_credential().await);
        assert!(!credentials.is_biometric_enabled().unwrap());
    }

    #[tokio::test]
    async fn unavailable_or_cancelled_registration_is_plain_failure() {
        let (fake, credentials, binder) = binder(FakeAuthenticator {
            unavailable: true,
            ..Default::default()
        });
        assert!(!binder.register_credential().await);
        assert!(fake.created.lock().unwrap().is_empty());

        let (_, _, cancelling) = binder_with_store(
            FakeAuthenticator {
                cancel: true,
                ..Default::default()
            },
            credentials.clone(),
        );
        assert!(!cancelling.register_credential().await);
        assert!(credentials.biometric_credential().unwrap().is_none());
    }

    #[tokio::test]
    async fn verification_uses_stored_id_and_fresh_challenge() {
        let (fake, _, binder) = binder(FakeAuthenticator::default());
        assert!(!binder.verify_credential().await, "nothing registered yet");

        assert!(binder.register_credential().await);
        assert!(binder.verify_credential().await);
        assert!(binder.verify_credential().await);

        let requests = fake.requested.lock().unwrap().clone();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].allow_credentials, vec![b"cred-1".to_vec()]);
        assert_ne!(requests[0].challenge, requests[1].challenge);
    }

    #[tokio::test]
    async fn foreign_credential_is_rejected() {
        let (_, credentials, binder) = binder(FakeAuthenticator {
            foreign_credential: true,
            ..Default::default()
        });
        credentials
            .store_biometric_credential(&BiometricCredential {
                id: STANDARD.encode(b"cred-1"),
                public_key: String::new(),
                counter: 0,
            })
            .unwrap();
        assert!(!binder.verify_credential().await);
    }

    #[tokio::test]
    async fn signature_counter_must_advance() {
        let (_, credentials, binder) = binder(FakeAuthenticator {
            sign_count: 5,
            ..Default::default()
        });
        assert!(binder.register_credential().await);

        assert!(binder.verify_credential().await);
        assert_eq!(credentials.biometric_credential().unwrap().unwrap().counter, 5);
        // Same counter again looks like a cloned authenticator.
        assert!(!binder.verify_credential().await);
    }

    #[tokio::test]
    async fn clear_credential_disables_biometrics() {
        let (_, credentials, binder) = binder(FakeAuthenticator::default());
        assert!(binder.register_credential().await);
        assert!(binder.is_enabled());

        binder.clear_credential().unwrap();
        assert!(!binder.is_enabled());
        assert!(binder.credential().is_none());
        assert!(!credentials.is_biometric_enabled().unwrap());
        assert!(!binder.verify_credential().await);
    }
}

//! PIN session manager.
//!
//! [`SessionManager`] owns the authenticated/unauthenticated state machine.
//! PIN paths (setup, login) derive the session key and place it in the
//! shared [`SessionKeySlot`]; biometric unlock flips state without a key.
//! While authenticated, a single inactivity timer runs. Every call to
//! [`SessionManager::record_activity`] replaces it; when it fires the session
//! is logged out and a [`SessionEvent::LoggedOut`] is broadcast.

use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use async_trait::async_trait;
use securevault_crypto::crypto::{self, PIN_KDF_ITERATIONS, PIN_KEY_SALT};
use securevault_crypto::{CredentialStore, SessionKey, SessionKeySlot};
use securevault_store::{BackendClient, StoreResult};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use zeroize::Zeroizing;

use crate::biometric::BiometricBinder;
use crate::error::{AuthError, Result};

/// Number of digits in a PIN.
pub const PIN_LENGTH: usize = 6;

/// Default inactivity window.
pub const DEFAULT_INACTIVITY_TIMEOUT: Duration = Duration::from_secs(5 * 60);

// ---------------------------------------------------------------------------
// PIN reference seam
// ---------------------------------------------------------------------------

/// Where the remote PIN reference lives.
#[async_trait]
pub trait PinReferenceStore: Send + Sync {
    /// The stored reference, `None` when no user row exists.
    async fn fetch_reference(&self) -> StoreResult<Option<String>>;

    /// Replace the stored reference.
    async fn update_reference(&self, reference: &str) -> StoreResult<()>;
}

#[async_trait]
impl PinReferenceStore for BackendClient {
    async fn fetch_reference(&self) -> StoreResult<Option<String>> {
        self.fetch_master_reference().await
    }

    async fn update_reference(&self, reference: &str) -> StoreResult<()> {
        self.update_master_reference(reference).await
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Session tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub inactivity_timeout: Duration,
    /// PBKDF2 rounds for the session key.
    pub kdf_iterations: NonZeroU32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            inactivity_timeout: DEFAULT_INACTIVITY_TIMEOUT,
            kdf_iterations: PIN_KDF_ITERATIONS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticated,
}

/// How a session was unlocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlockMethod {
    Setup,
    Pin,
    Biometric,
    /// A previous run left the session marker behind.
    Restored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutReason {
    Explicit,
    Inactivity,
}

/// Broadcast on every state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    LoggedIn { method: UnlockMethod },
    LoggedOut { reason: LogoutReason },
}

/// Point-in-time view for status displays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStatus {
    pub is_authenticated: bool,
    pub is_setup: bool,
    pub has_session_key: bool,
    pub biometric_enabled: bool,
}

/// Key material produced by a PIN change.
pub struct PinChange {
    /// Key derived from the old PIN; needed to re-encrypt stored fields.
    /// It also stays retired in the key slot until the caller calls
    /// [`SessionKeySlot::finish_rotation`].
    pub previous_key: SessionKey,
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

struct Inner {
    references: Arc<dyn PinReferenceStore>,
    credentials: CredentialStore,
    keys: SessionKeySlot,
    config: SessionConfig,
    state: Mutex<SessionState>,
    timer: Mutex<Option<JoinHandle<()>>>,
    generation: AtomicU64,
    events: broadcast::Sender<SessionEvent>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let timer = self.timer.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(task) = timer.take() {
            task.abort();
        }
    }
}

/// Authenticated-state machine with inactivity timeout.
///
/// Clones share state.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    /// Build the manager. Starts authenticated (without a session key) when
    /// the credential record carries an active-session marker.
    pub fn new(
        references: Arc<dyn PinReferenceStore>,
        credentials: CredentialStore,
        keys: SessionKeySlot,
        config: SessionConfig,
    ) -> Result<Self> {
        let restored = credentials.has_active_session()?;
        let (events, _) = broadcast::channel(32);
        let manager = Self {
            inner: Arc::new(Inner {
                references,
                credentials,
                keys,
                config,
                state: Mutex::new(SessionState::Unauthenticated),
                timer: Mutex::new(None),
                generation: AtomicU64::new(0),
                events,
            }),
        };
        if restored {
            tracing::info!("restoring previous session without a session key");
            manager.enter(UnlockMethod::Restored);
        }
        Ok(manager)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    pub fn state(&self) -> SessionState {
        *self
            .inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_authenticated(&self) -> bool {
        self.state() == SessionState::Authenticated
    }

    pub fn is_setup(&self) -> Result<bool> {
        Ok(self.inner.credentials.is_setup()?)
    }

    pub fn status(&self) -> Result<SessionStatus> {
        Ok(SessionStatus {
            is_authenticated: self.is_authenticated(),
            is_setup: self.inner.credentials.is_setup()?,
            has_session_key: self.inner.keys.is_set(),
            biometric_enabled: self.inner.credentials.is_biometric_enabled()?,
        })
    }

    pub fn config(&self) -> SessionConfig {
        self.inner.config
    }

    /// First-run setup: store the PIN hash locally, derive the session key
    /// and authenticate.
    pub fn setup(&self, pin: &str) -> Result<()> {
        validate_pin(pin)?;
        let creds = &self.inner.credentials;
        creds.set_pin_hash(&crypto::hash_pin(pin))?;
        creds.set_setup(true)?;

        let key = crypto::derive_key_with_iterations(
            pin,
            PIN_KEY_SALT,
            self.inner.config.kdf_iterations,
        );
        self.inner.keys.set(key);
        creds.mark_session_active()?;
        self.enter(UnlockMethod::Setup);
        tracing::info!("vault set up");
        Ok(())
    }

    /// Check `pin` against the remote reference and authenticate.
    ///
    /// On any failure the state is left unchanged.
    pub async fn login(&self, pin: &str) -> Result<()> {
        validate_pin(pin)?;
        self.verify_against_reference(pin).await?;

        let key = self.derive(pin).await?;
        self.inner.keys.set(key);
        let creds = &self.inner.credentials;
        creds.set_pin_hash(&crypto::hash_pin(pin))?;
        creds.mark_session_active()?;
        self.enter(UnlockMethod::Pin);
        tracing::info!("logged in");
        Ok(())
    }

    /// Unlock through the biometric binder. No session key is produced.
    pub async fn unlock_with_biometric(&self, binder: &BiometricBinder) -> bool {
        if !binder.is_enabled() {
            return false;
        }
        if !binder.verify_credential().await {
            return false;
        }
        if let Err(e) = self.inner.credentials.mark_session_active() {
            tracing::warn!(error = %e, "failed to persist session marker");
        }
        self.enter(UnlockMethod::Biometric);
        tracing::info!("unlocked with biometrics");
        true
    }

    /// Prove `old`, write the new reference remotely, then switch the local
    /// hash and session key. A failed remote update leaves the old PIN in
    /// force. The old key is retired, not dropped: records sealed under it
    /// stay readable until re-encryption finishes.
    pub async fn change_pin(&self, old: &str, new: &str) -> Result<PinChange> {
        if !self.is_authenticated() {
            return Err(AuthError::NotAuthenticated);
        }
        validate_pin(old)?;
        validate_pin(new)?;
        self.verify_against_reference(old).await?;

        let reference = crypto::seal_pin_reference(new)?;
        self.inner
            .references
            .update_reference(&reference)
            .await
            .inspect_err(|e| tracing::warn!(error = %e, "failed to update PIN reference"))?;

        let previous_key = self.derive(old).await?;
        let next_key = self.derive(new).await?;
        self.inner
            .credentials
            .set_pin_hash(&crypto::hash_pin(new))?;
        self.inner.keys.set(next_key);
        self.inner.keys.retire(previous_key.clone());
        self.record_activity();
        tracing::info!("PIN changed");
        Ok(PinChange { previous_key })
    }

    /// Derive the key of an earlier PIN and retire it into the key slot, so
    /// records a previous session left half re-encrypted can be read and
    /// moved again. Requires a PIN session.
    pub async fn recover_previous_key(&self, old: &str) -> Result<SessionKey> {
        if !self.is_authenticated() || !self.inner.keys.is_set() {
            return Err(AuthError::NotAuthenticated);
        }
        validate_pin(old)?;
        let key = self.derive(old).await?;
        self.inner.keys.retire(key.clone());
        tracing::info!("previous key restored for re-encryption");
        Ok(key)
    }

    /// Reset the inactivity timer. No-op while unauthenticated.
    pub fn record_activity(&self) {
        if self.is_authenticated() {
            self.arm_timer();
        }
    }

    /// End the session, drop the key and clear the marker.
    pub fn logout(&self) {
        self.leave(LogoutReason::Explicit);
    }

    /// Log out and wipe every local value (credential record included).
    pub fn clear_local_data(&self) -> Result<()> {
        self.leave(LogoutReason::Explicit);
        self.inner.credentials.clear_all()?;
        tracing::warn!("all local data cleared");
        Ok(())
    }

    // -- internals ------------------------------------------------------------

    async fn verify_against_reference(&self, pin: &str) -> Result<()> {
        let reference = self
            .inner
            .references
            .fetch_reference()
            .await
            .inspect_err(|e| tracing::warn!(error = %e, "PIN reference lookup failed"))?
            .ok_or(AuthError::ReferenceMissing)?;

        if crypto::verify_pin_reference(pin, &reference)? {
            Ok(())
        } else {
            tracing::warn!("PIN mismatch");
            Err(AuthError::InvalidPin)
        }
    }

    async fn derive(&self, pin: &str) -> Result<SessionKey> {
        let pin = Zeroizing::new(pin.to_owned());
        let iterations = self.inner.config.kdf_iterations;
        let key = tokio::task::spawn_blocking(move || {
            crypto::derive_key_with_iterations(&pin, PIN_KEY_SALT, iterations)
        })
        .await?;
        Ok(key)
    }

    fn enter(&self, method: UnlockMethod) {
        *self
            .inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = SessionState::Authenticated;
        self.arm_timer();
        let _ = self.inner.events.send(SessionEvent::LoggedIn { method });
    }

    fn leave(&self, reason: LogoutReason) {
        let was_authenticated = {
            let mut state = self
                .inner
                .state
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *state, SessionState::Unauthenticated)
                == SessionState::Authenticated
        };

        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(task) = self
            .inner
            .timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
        self.inner.keys.clear();
        if let Err(e) = self.inner.credentials.clear_session() {
            tracing::warn!(error = %e, "failed to clear session marker");
        }

        if was_authenticated {
            match reason {
                LogoutReason::Explicit => tracing::info!("logged out"),
                LogoutReason::Inactivity => {
                    tracing::info!("session timed out due to inactivity")
                }
            }
            let _ = self.inner.events.send(SessionEvent::LoggedOut { reason });
        }
    }

    /// Replace the running timer with a fresh one.
    fn arm_timer(&self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::debug!("no async runtime; inactivity timer not armed");
            return;
        };

        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let timeout = self.inner.config.inactivity_timeout;
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let task = runtime.spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(inner) = weak.upgrade() {
                SessionManager { inner }.expire(generation);
            }
        });

        let previous = self
            .inner
            .timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(task);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    fn expire(&self, generation: u64) {
        if self.inner.generation.load(Ordering::SeqCst) != generation {
            return;
        }
        self.leave(LogoutReason::Inactivity);
    }
}

/// Require exactly [`PIN_LENGTH`] ASCII digits.
pub fn validate_pin(pin: &str) -> Result<()> {
    if pin.len() == PIN_LENGTH && pin.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(AuthError::InvalidPinFormat {
            expected: PIN_LENGTH,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use securevault_crypto::MemoryStorage;
    use securevault_store::StoreError;
    use tokio::sync::broadcast::error::TryRecvError;

    #[derive(Default)]
    struct FakeReferences {
        reference: Mutex<Option<String>>,
        fail_lookup: bool,
        fail_update: bool,
    }

    #[async_trait]
    impl PinReferenceStore for FakeReferences {
        async fn fetch_reference(&self) -> StoreResult<Option<String>> {
            if self.fail_lookup {
                return Err(StoreError::NotConfigured);
            }
            Ok(self.reference.lock().unwrap().clone())
        }

        async fn update_reference(&self, reference: &str) -> StoreResult<()> {
            if self.fail_update {
                return Err(StoreError::Backend {
                    status: 500,
                    message: "update failed".into(),
                });
            }
            *self.reference.lock().unwrap() = Some(reference.to_string());
            Ok(())
        }
    }

    fn fast_config() -> SessionConfig {
        SessionConfig {
            kdf_iterations: NonZeroU32::new(1).unwrap(),
            ..SessionConfig::default()
        }
    }

    fn manager_with(
        references: FakeReferences,
    ) -> (SessionManager, CredentialStore, SessionKeySlot) {
        let credentials = CredentialStore::new(Arc::new(MemoryStorage::new()));
        let keys = SessionKeySlot::new();
        let manager = SessionManager::new(
            Arc::new(references),
            credentials.clone(),
            keys.clone(),
            fast_config(),
        )
        .unwrap();
        (manager, credentials, keys)
    }

    fn reference(pin: &str) -> FakeReferences {
        FakeReferences {
            reference: Mutex::new(Some(pin.to_string())),
            ..Default::default()
        }
    }

    #[test]
    fn pin_format() {
        validate_pin("123456").unwrap();
        assert!(validate_pin("12345").is_err());
        assert!(validate_pin("1234567").is_err());
        assert!(validate_pin("12345a").is_err());
        assert!(validate_pin("١٢٣٤٥٦").is_err());
    }

    #[tokio::test]
    async fn setup_on_fresh_device() {
        let (manager, credentials, keys) = manager_with(FakeReferences::default());
        assert_eq!(manager.state(), SessionState::Unauthenticated);
        assert!(!manager.is_setup().unwrap());

        manager.setup("123456").unwrap();
        assert!(manager.is_setup().unwrap());
        assert!(manager.is_authenticated());
        assert!(keys.is_set());

        let stored = credentials.pin_hash().unwrap().unwrap();
        assert_ne!(stored, "123456");
        assert_eq!(stored, crypto::hash_pin("123456"));
        assert!(credentials.has_active_session().unwrap());
    }

    #[tokio::test]
    async fn login_mismatch_stays_unauthenticated() {
        let (manager, _, keys) = manager_with(reference("999999"));
        let err = manager.login("123456").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidPin));
        assert!(!manager.is_authenticated());
        assert!(!keys.is_set());
    }

    #[tokio::test]
    async fn login_errors_are_distinct() {
        let (manager, _, _) = manager_with(FakeReferences::default());
        assert!(matches!(
            manager.login("123456").await,
            Err(AuthError::ReferenceMissing)
        ));

        let (manager, _, _) = manager_with(FakeReferences {
            fail_lookup: true,
            ..Default::default()
        });
        assert!(matches!(
            manager.login("123456").await,
            Err(AuthError::Backend(StoreError::NotConfigured))
        ));

        assert!(matches!(
            manager.login("12").await,
            Err(AuthError::InvalidPinFormat { .. })
        ));
        assert!(!manager.is_authenticated());
    }

    #[tokio::test]
    async fn login_success_derives_the_setup_key() {
        let (manager, credentials, keys) = manager_with(reference("123456"));
        manager.login("123456").await.unwrap();
        assert!(manager.is_authenticated());
        assert_eq!(
            keys.get().unwrap(),
            crypto::derive_key_with_iterations(
                "123456",
                PIN_KEY_SALT,
                NonZeroU32::new(1).unwrap()
            )
        );
        assert_eq!(
            credentials.pin_hash().unwrap(),
            Some(crypto::hash_pin("123456"))
        );
    }

    #[tokio::test]
    async fn logout_clears_key_and_marker() {
        let (manager, credentials, keys) = manager_with(reference("123456"));
        let mut events = manager.subscribe();
        manager.login("123456").await.unwrap();
        manager.logout();

        assert!(!manager.is_authenticated());
        assert!(!keys.is_set());
        assert!(!credentials.has_active_session().unwrap());
        assert_eq!(
            events.recv().await.unwrap(),
            SessionEvent::LoggedIn {
                method: UnlockMethod::Pin
            }
        );
        assert_eq!(
            events.recv().await.unwrap(),
            SessionEvent::LoggedOut {
                reason: LogoutReason::Explicit
            }
        );

        // A second logout is silent.
        manager.logout();
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn restored_session_has_no_key() {
        let credentials = CredentialStore::new(Arc::new(MemoryStorage::new()));
        credentials.mark_session_active().unwrap();
        let keys = SessionKeySlot::new();
        let manager = SessionManager::new(
            Arc::new(FakeReferences::default()),
            credentials,
            keys.clone(),
            fast_config(),
        )
        .unwrap();
        assert!(manager.is_authenticated());
        assert!(!keys.is_set());
        assert!(!manager.status().unwrap().has_session_key);
    }

    #[tokio::test(start_paused = true)]
    async fn inactivity_logs_out_exactly_once() {
        let (manager, _, keys) = manager_with(FakeReferences::default());
        let mut events = manager.subscribe();
        manager.setup("123456").unwrap();
        assert!(matches!(
            events.recv().await.unwrap(),
            SessionEvent::LoggedIn { .. }
        ));

        tokio::time::sleep(DEFAULT_INACTIVITY_TIMEOUT + Duration::from_secs(1)).await;
        assert_eq!(
            events.recv().await.unwrap(),
            SessionEvent::LoggedOut {
                reason: LogoutReason::Inactivity
            }
        );
        assert!(!manager.is_authenticated());
        assert!(!keys.is_set());

        tokio::time::sleep(DEFAULT_INACTIVITY_TIMEOUT * 3).await;
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test(start_paused = true)]
    async fn frequent_activity_never_times_out() {
        let (manager, _, _) = manager_with(FakeReferences::default());
        let mut events = manager.subscribe();
        manager.setup("123456").unwrap();
        let _ = events.recv().await;

        for _ in 0..10 {
            tokio::time::sleep(Duration::from_secs(240)).await;
            manager.record_activity();
        }
        assert!(manager.is_authenticated());
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));

        // Going quiet afterwards still expires.
        tokio::time::sleep(DEFAULT_INACTIVITY_TIMEOUT + Duration::from_secs(1)).await;
        assert!(!manager.is_authenticated());
    }

    #[tokio::test(start_paused = true)]
    async fn activity_while_locked_does_not_arm_timer() {
        let (manager, _, _) = manager_with(FakeReferences::default());
        let mut events = manager.subscribe();
        manager.record_activity();
        tokio::time::sleep(DEFAULT_INACTIVITY_TIMEOUT * 2).await;
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn change_pin_updates_reference_and_key() {
        let (manager, credentials, keys) = manager_with(reference("123456"));
        manager.login("123456").await.unwrap();
        let old_key = keys.get().unwrap();

        let change = manager.change_pin("123456", "654321").await.unwrap();
        assert_eq!(change.previous_key, old_key);
        assert_ne!(keys.get().unwrap(), old_key);
        assert_eq!(keys.retired(), vec![old_key.clone()]);
        assert_eq!(
            credentials.pin_hash().unwrap(),
            Some(crypto::hash_pin("654321"))
        );

        // The new reference is hashed and accepts only the new PIN.
        manager.logout();
        assert!(matches!(
            manager.login("123456").await,
            Err(AuthError::InvalidPin)
        ));
        manager.login("654321").await.unwrap();
    }

    #[tokio::test]
    async fn failed_remote_update_keeps_old_pin() {
        let (manager, credentials, keys) = manager_with(FakeReferences {
            reference: Mutex::new(Some("123456".into())),
            fail_update: true,
            ..Default::default()
        });
        manager.login("123456").await.unwrap();
        let old_key = keys.get().unwrap();

        assert!(matches!(
            manager.change_pin("123456", "654321").await,
            Err(AuthError::Backend(_))
        ));
        assert_eq!(keys.get().unwrap(), old_key);
        assert_eq!(
            credentials.pin_hash().unwrap(),
            Some(crypto::hash_pin("123456"))
        );
    }

    #[tokio::test]
    async fn change_pin_requires_old_pin_and_session() {
        let (manager, _, _) = manager_with(reference("123456"));
        assert!(matches!(
            manager.change_pin("123456", "654321").await,
            Err(AuthError::NotAuthenticated)
        ));

        manager.login("123456").await.unwrap();
        assert!(matches!(
            manager.change_pin("111111", "654321").await,
            Err(AuthError::InvalidPin)
        ));
    }

    #[tokio::test]
    async fn previous_key_can_be_recovered_after_logout() {
        let (manager, _, keys) = manager_with(reference("123456"));
        assert!(matches!(
            manager.recover_previous_key("123456").await,
            Err(AuthError::NotAuthenticated)
        ));

        manager.login("123456").await.unwrap();
        let old_key = keys.get().unwrap();
        manager.change_pin("123456", "654321").await.unwrap();

        // Logging out drops the retired key with the current one.
        manager.logout();
        assert!(keys.retired().is_empty());

        manager.login("654321").await.unwrap();
        let recovered = manager.recover_previous_key("123456").await.unwrap();
        assert_eq!(recovered, old_key);
        assert_eq!(keys.retired(), vec![old_key]);
        assert!(manager.recover_previous_key("12").await.is_err());
    }

    #[tokio::test]
    async fn clear_local_data_wipes_record() {
        let (manager, credentials, keys) = manager_with(FakeReferences::default());
        manager.setup("123456").unwrap();
        manager.clear_local_data().unwrap();

        assert!(!manager.is_authenticated());
        assert!(!keys.is_set());
        assert!(credentials.pin_hash().unwrap().is_none());
        assert!(!manager.is_setup().unwrap());
    }
}

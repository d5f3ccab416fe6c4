//! The device credential record.
//!
//! [`CredentialStore`] is a typed view over [`LocalStorage`] holding the
//! long-lived, device-scoped state: PIN hash, setup flag, biometric flag and
//! credential, device user handle, theme, dismissed notifications, and the
//! "session active" marker.
//!
//! Invariant: a stored [`BiometricCredential`] implies the biometric flag is
//! set. Writes are ordered so the invariant holds between any two calls.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{CryptoError, Result};
use crate::storage::LocalStorage;

/// Storage key constants.
pub mod keys {
    pub const THEME: &str = "secure_vault_theme";
    pub const PIN_HASH: &str = "secure_vault_pin_hash";
    pub const BIOMETRIC_ENABLED: &str = "secure_vault_biometric";
    pub const IS_SETUP: &str = "secure_vault_is_setup";
    pub const USER_ID: &str = "secure_vault_user_id";
    pub const BIOMETRIC_CREDENTIAL: &str = "secure_vault_biometric_credential";
    pub const DISMISSED_NOTIFICATIONS: &str = "dismissed_notifications";
    pub const SESSION_ACTIVE: &str = "secure_vault_session_active";
}

/// Display preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "light" => Some(Self::Light),
            "dark" => Some(Self::Dark),
            _ => None,
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Self::Light => Self::Dark,
            Self::Dark => Self::Light,
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handle to a platform-registered public-key credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BiometricCredential {
    /// Base64 raw credential id.
    pub id: String,
    /// Base64 attestation object returned at registration.
    pub public_key: String,
    /// Last seen signature counter.
    pub counter: u32,
}

/// Snapshot of everything in the credential record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialRecord {
    pub pin_hash: Option<String>,
    pub is_setup: bool,
    pub biometric_enabled: bool,
    pub device_user_id: Option<String>,
    pub theme: Option<Theme>,
}

/// Typed accessor for the device credential record.
#[derive(Clone)]
pub struct CredentialStore {
    storage: Arc<dyn LocalStorage>,
}

impl CredentialStore {
    pub fn new(storage: Arc<dyn LocalStorage>) -> Self {
        Self { storage }
    }

    // -- PIN / setup ----------------------------------------------------------

    pub fn pin_hash(&self) -> Result<Option<String>> {
        self.storage.get(keys::PIN_HASH)
    }

    pub fn set_pin_hash(&self, hash: &str) -> Result<()> {
        self.storage.set(keys::PIN_HASH, hash)
    }

    pub fn is_setup(&self) -> Result<bool> {
        self.flag(keys::IS_SETUP)
    }

    pub fn set_setup(&self, complete: bool) -> Result<()> {
        self.set_flag(keys::IS_SETUP, complete)
    }

    // -- Session marker -------------------------------------------------------

    /// Whether a previous run left an authenticated session behind.
    pub fn has_active_session(&self) -> Result<bool> {
        Ok(self.storage.get(keys::SESSION_ACTIVE)?.is_some())
    }

    pub fn mark_session_active(&self) -> Result<()> {
        self.storage.set(keys::SESSION_ACTIVE, "true")
    }

    pub fn clear_session(&self) -> Result<()> {
        self.storage.remove(keys::SESSION_ACTIVE)
    }

    // -- Biometrics -----------------------------------------------------------

    pub fn is_biometric_enabled(&self) -> Result<bool> {
        self.flag(keys::BIOMETRIC_ENABLED)
    }

    pub fn biometric_credential(&self) -> Result<Option<BiometricCredential>> {
        let Some(raw) = self.storage.get(keys::BIOMETRIC_CREDENTIAL)? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| CryptoError::CorruptedValue {
                key: keys::BIOMETRIC_CREDENTIAL.into(),
                reason: e.to_string(),
            })
    }

    /// Persist a credential and enable biometrics.
    pub fn store_biometric_credential(&self, credential: &BiometricCredential) -> Result<()> {
        let raw = serde_json::to_string(credential)?;
        self.set_flag(keys::BIOMETRIC_ENABLED, true)?;
        self.storage.set(keys::BIOMETRIC_CREDENTIAL, &raw)
    }

    /// Remove the credential and disable biometrics.
    pub fn clear_biometric_credential(&self) -> Result<()> {
        self.storage.remove(keys::BIOMETRIC_CREDENTIAL)?;
        self.set_flag(keys::BIOMETRIC_ENABLED, false)
    }

    // -- Device identity ------------------------------------------------------

    /// The per-device user handle, created on first use.
    pub fn device_user_id(&self) -> Result<String> {
        if let Some(id) = self.storage.get(keys::USER_ID)? {
            return Ok(id);
        }
        let id = uuid::Uuid::new_v4().to_string();
        self.storage.set(keys::USER_ID, &id)?;
        tracing::debug!("generated device user id");
        Ok(id)
    }

    // -- Theme ----------------------------------------------------------------

    pub fn theme(&self) -> Result<Option<Theme>> {
        Ok(self
            .storage
            .get(keys::THEME)?
            .as_deref()
            .and_then(Theme::parse))
    }

    pub fn set_theme(&self, theme: Theme) -> Result<()> {
        self.storage.set(keys::THEME, theme.as_str())
    }

    /// Flip the stored theme (light when unset) and return the new value.
    pub fn toggle_theme(&self) -> Result<Theme> {
        let next = self.theme()?.unwrap_or_default().toggled();
        self.set_theme(next)?;
        Ok(next)
    }

    // -- Notifications --------------------------------------------------------

    /// Dismissed notification ids. A corrupted value reads as empty.
    pub fn dismissed_notifications(&self) -> Result<BTreeSet<String>> {
        let Some(raw) = self.storage.get(keys::DISMISSED_NOTIFICATIONS)? else {
            return Ok(BTreeSet::new());
        };
        match serde_json::from_str::<Vec<String>>(&raw) {
            Ok(ids) => Ok(ids.into_iter().collect()),
            Err(e) => {
                tracing::warn!(error = %e, "ignoring corrupted dismissed notification list");
                Ok(BTreeSet::new())
            }
        }
    }

    pub fn dismiss_notification(&self, id: &str) -> Result<()> {
        let mut ids = self.dismissed_notifications()?;
        if ids.insert(id.to_string()) {
            let raw = serde_json::to_string(&ids)?;
            self.storage.set(keys::DISMISSED_NOTIFICATIONS, &raw)?;
        }
        Ok(())
    }

    // -- Whole record ---------------------------------------------------------

    pub fn record(&self) -> Result<CredentialRecord> {
        Ok(CredentialRecord {
            pin_hash: self.pin_hash()?,
            is_setup: self.is_setup()?,
            biometric_enabled: self.is_biometric_enabled()?,
            device_user_id: self.storage.get(keys::USER_ID)?,
            theme: self.theme()?,
        })
    }

    /// Wipe all local data.
    pub fn clear_all(&self) -> Result<()> {
        self.storage.clear()
    }

    fn flag(&self, key: &str) -> Result<bool> {
        Ok(self.storage.get(key)?.as_deref() == Some("true"))
    }

    fn set_flag(&self, key: &str, value: bool) -> Result<()> {
        self.storage.set(key, if value { "true" } else { "false" })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn store() -> (MemoryStorage, CredentialStore) {
        let storage = MemoryStorage::new();
        let creds = CredentialStore::new(Arc::new(storage.clone()));
        (storage, creds)
    }

    fn sample_credential() -> BiometricCredential {
        BiometricCredential {
            id: "Y3JlZC1pZA==".into(),
            public_key: "YXR0ZXN0YXRpb24=".into(),
            counter: 0,
        }
    }

    #[test]
    fn fresh_record_is_empty() {
        let (_, creds) = store();
        let record = creds.record().unwrap();
        assert_eq!(
            record,
            CredentialRecord {
                pin_hash: None,
                is_setup: false,
                biometric_enabled: false,
                device_user_id: None,
                theme: None,
            }
        );
        assert!(!creds.has_active_session().unwrap());
    }

    #[test]
    fn device_user_id_is_stable() {
        let (_, creds) = store();
        let first = creds.device_user_id().unwrap();
        let second = creds.device_user_id().unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 36);
    }

    #[test]
    fn biometric_credential_implies_flag() {
        let (storage, creds) = store();
        creds.store_biometric_credential(&sample_credential()).unwrap();

        assert!(creds.is_biometric_enabled().unwrap());
        assert_eq!(creds.biometric_credential().unwrap(), Some(sample_credential()));

        let raw = storage.get(keys::BIOMETRIC_CREDENTIAL).unwrap().unwrap();
        assert!(raw.contains("\"publicKey\""));

        creds.clear_biometric_credential().unwrap();
        assert!(!creds.is_biometric_enabled().unwrap());
        assert_eq!(creds.biometric_credential().unwrap(), None);
    }

    #[test]
    fn corrupted_biometric_credential_is_reported() {
        let (storage, creds) = store();
        storage.set(keys::BIOMETRIC_CREDENTIAL, "{not json").unwrap();
        assert!(matches!(
            creds.biometric_credential(),
            Err(CryptoError::CorruptedValue { .. })
        ));
    }

    #[test]
    fn theme_toggle_defaults_from_light() {
        let (_, creds) = store();
        assert_eq!(creds.toggle_theme().unwrap(), Theme::Dark);
        assert_eq!(creds.toggle_theme().unwrap(), Theme::Light);
        assert_eq!(creds.theme().unwrap(), Some(Theme::Light));
    }

    #[test]
    fn dismissed_notifications_accumulate() {
        let (storage, creds) = store();
        creds.dismiss_notification("credit_cards-1").unwrap();
        creds.dismiss_notification("credit_cards-1").unwrap();
        creds.dismiss_notification("bank_accounts-7").unwrap();

        let ids = creds.dismissed_notifications().unwrap();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains("bank_accounts-7"));

        storage.set(keys::DISMISSED_NOTIFICATIONS, "oops").unwrap();
        assert!(creds.dismissed_notifications().unwrap().is_empty());
    }

    #[test]
    fn session_marker_lifecycle() {
        let (_, creds) = store();
        creds.mark_session_active().unwrap();
        assert!(creds.has_active_session().unwrap());
        creds.clear_session().unwrap();
        assert!(!creds.has_active_session().unwrap());
    }

    #[test]
    fn clear_all_wipes_everything() {
        let (_, creds) = store();
        creds.set_pin_hash("abc").unwrap();
        creds.set_setup(true).unwrap();
        creds.set_theme(Theme::Dark).unwrap();
        creds.clear_all().unwrap();

        let record = creds.record().unwrap();
        assert!(record.pin_hash.is_none());
        assert!(!record.is_setup);
        assert!(record.theme.is_none());
    }
}

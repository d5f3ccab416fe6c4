//! Integration tests for the securevault-crypto crate.
//!
//! These exercise the PIN → key → field cipher path together with the
//! SQLite-backed credential record.

use std::sync::Arc;

use securevault_crypto::crypto::{self, PIN_KEY_SALT};
use securevault_crypto::{
    BiometricCredential, CredentialStore, SessionKeySlot, SqliteStorage, Theme,
    UNREADABLE_SENTINEL,
};

// ═══════════════════════════════════════════════════════════════════════
//  Key derivation + field cipher
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn pin_derived_key_opens_fields_sealed_in_an_earlier_session() {
    let sealed = {
        let key = crypto::derive_key("123456", PIN_KEY_SALT);
        crypto::encrypt_field("HDFC0001234", &key).unwrap()
    };

    // A later session re-derives the same key from the same PIN.
    let key = crypto::derive_key("123456", PIN_KEY_SALT);
    assert_eq!(crypto::decrypt_field(&sealed, &key), "HDFC0001234");

    let other = crypto::derive_key("000000", PIN_KEY_SALT);
    assert_eq!(crypto::decrypt_field(&sealed, &other), UNREADABLE_SENTINEL);
}

#[test]
fn key_slot_hands_the_key_to_readers() {
    let slot = SessionKeySlot::new();
    let reader = slot.clone();

    slot.set(crypto::derive_key("123456", PIN_KEY_SALT));
    let sealed = crypto::encrypt_field("cvv 123", &reader.get().unwrap()).unwrap();

    slot.clear();
    assert!(reader.get().is_none());
    // Without a key the ciphertext stays opaque.
    assert!(crypto::is_encrypted_field(&sealed));
}

// ═══════════════════════════════════════════════════════════════════════
//  Credential record on disk
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn credential_record_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = SqliteStorage::default_path(dir.path());

    let user_id = {
        let creds = CredentialStore::new(Arc::new(SqliteStorage::open(&path).unwrap()));
        creds.set_pin_hash(&crypto::hash_pin("123456")).unwrap();
        creds.set_setup(true).unwrap();
        creds.set_theme(Theme::Dark).unwrap();
        creds
            .store_biometric_credential(&BiometricCredential {
                id: "aWQ=".into(),
                public_key: "cGs=".into(),
                counter: 3,
            })
            .unwrap();
        creds.device_user_id().unwrap()
    };

    let creds = CredentialStore::new(Arc::new(SqliteStorage::open(&path).unwrap()));
    let record = creds.record().unwrap();

    assert!(record.is_setup);
    assert!(record.biometric_enabled);
    assert_eq!(record.theme, Some(Theme::Dark));
    assert_eq!(record.device_user_id.as_deref(), Some(user_id.as_str()));
    assert_eq!(record.pin_hash, Some(crypto::hash_pin("123456")));
    assert_eq!(creds.biometric_credential().unwrap().unwrap().counter, 3);
}

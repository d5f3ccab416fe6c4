//! PIN key derivation and AES-256-GCM field encryption using `ring`.
//!
//! - **Key derivation**: PBKDF2-HMAC-SHA256 over the user's PIN and a fixed
//!   application salt. The result is the session key; it lives only in
//!   memory (see [`crate::keyslot`]).
//! - **Field cipher**: each secure field is sealed independently with a fresh
//!   random 96-bit nonce and stored as `enc:v1:<base64(nonce || ct || tag)>`.
//! - **PIN references**: salted PBKDF2 digests used to check a PIN against the
//!   value kept by the hosted backend.
//!
//! # Security Notes
//!
//! - The fixed salt makes the session key a pure function of the PIN. That is
//!   only acceptable for a single-user, local-only threat model.
//! - [`decrypt_field`] never fails. A field that cannot be opened is replaced
//!   with [`UNREADABLE_SENTINEL`] so one bad value cannot break a whole record.

use std::fmt;
use std::num::NonZeroU32;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use ring::aead::{self, Aad, BoundKey, NONCE_LEN, Nonce, NonceSequence, SealingKey, UnboundKey};
use ring::rand::{SecureRandom, SystemRandom};
use ring::{digest, pbkdf2};
use zeroize::Zeroizing;

use crate::error::{CryptoError, Result};

/// Length of the AES-256-GCM key in bytes.
pub const KEY_LEN: usize = 32;

/// Length of the AES-256-GCM nonce in bytes (96 bits).
pub const NONCE_LEN_BYTES: usize = NONCE_LEN;

/// Length of the GCM authentication tag in bytes.
pub const TAG_LEN: usize = 16;

/// Fixed salt mixed into the PIN-derived session key.
pub const PIN_KEY_SALT: &[u8] = b"secure-vault-salt";

/// Iteration count for the session key derivation.
pub const PIN_KDF_ITERATIONS: NonZeroU32 = match NonZeroU32::new(100_000) {
    Some(n) => n,
    None => panic!("PIN_KDF_ITERATIONS must be non-zero"),
};

/// Iteration count for PIN references written to the backend.
const REFERENCE_ITERATIONS: u32 = 210_000;

/// Salt length for PIN references.
const REFERENCE_SALT_LEN: usize = 16;

/// Scheme tag for hashed PIN references.
const REFERENCE_SCHEME: &str = "pbkdf2-sha256";

/// Prefix identifying an encrypted field value.
pub const ENCRYPTED_PREFIX: &str = "enc:v1:";

/// Value substituted for a secure field that cannot be decrypted.
pub const UNREADABLE_SENTINEL: &str = "***";

static PBKDF2_ALG: pbkdf2::Algorithm = pbkdf2::PBKDF2_HMAC_SHA256;

static AEAD_ALG: &aead::Algorithm = &aead::AES_256_GCM;

// ---------------------------------------------------------------------------
// Session key
// ---------------------------------------------------------------------------

/// A 256-bit symmetric key derived from the user's PIN.
///
/// The bytes are zeroed on drop. `Debug` never prints key material.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionKey(Zeroizing<[u8; KEY_LEN]>);

impl SessionKey {
    /// Wrap raw key bytes.
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(Zeroizing::new(bytes))
    }

    /// Generate a random key (used by tests and tooling).
    pub fn random() -> Result<Self> {
        let mut bytes = [0u8; KEY_LEN];
        SystemRandom::new()
            .fill(&mut bytes)
            .map_err(|_| CryptoError::KeyDerivationFailed {
                reason: "failed to generate random key".into(),
            })?;
        Ok(Self::from_bytes(bytes))
    }

    /// Borrow the raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionKey(..)")
    }
}

// ---------------------------------------------------------------------------
// Key derivation
// ---------------------------------------------------------------------------

/// Derive the session key from `pin` and `salt` with the default iteration
/// count. Deterministic: the same inputs always yield the same key.
pub fn derive_key(pin: &str, salt: &[u8]) -> SessionKey {
    derive_key_with_iterations(pin, salt, PIN_KDF_ITERATIONS)
}

/// Derive the session key with an explicit PBKDF2 iteration count.
pub fn derive_key_with_iterations(pin: &str, salt: &[u8], iterations: NonZeroU32) -> SessionKey {
    let mut out = [0u8; KEY_LEN];
    pbkdf2::derive(PBKDF2_ALG, iterations, salt, pin.as_bytes(), &mut out);
    let key = SessionKey::from_bytes(out);
    out.fill(0);
    tracing::trace!(iterations = iterations.get(), "derived session key from PIN");
    key
}

/// Hex-encoded SHA-256 of the PIN, kept in the local credential record.
pub fn hash_pin(pin: &str) -> String {
    let hash = digest::digest(&digest::SHA256, pin.as_bytes());
    hash.as_ref().iter().map(|b| format!("{b:02x}")).collect()
}

// ---------------------------------------------------------------------------
// PIN references
// ---------------------------------------------------------------------------

/// Produce a salted PBKDF2 reference for `pin`:
/// `pbkdf2-sha256$<iterations>$<salt>$<hash>` (base64 fields).
pub fn seal_pin_reference(pin: &str) -> Result<String> {
    let salt = random_bytes(REFERENCE_SALT_LEN)?;
    let iterations = NonZeroU32::new(REFERENCE_ITERATIONS).ok_or_else(|| {
        CryptoError::KeyDerivationFailed {
            reason: "reference iteration count is zero".into(),
        }
    })?;

    let mut hash = [0u8; KEY_LEN];
    pbkdf2::derive(PBKDF2_ALG, iterations, &salt, pin.as_bytes(), &mut hash);

    Ok(format!(
        "{REFERENCE_SCHEME}${}${}${}",
        iterations.get(),
        STANDARD.encode(&salt),
        STANDARD.encode(hash)
    ))
}

/// Check `pin` against a reference value fetched from the backend.
///
/// Hashed references are verified with PBKDF2. Anything else is treated as a
/// legacy plaintext reference and compared through SHA-256 digests.
pub fn verify_pin_reference(pin: &str, reference: &str) -> Result<bool> {
    let Some(rest) = reference
        .strip_prefix(REFERENCE_SCHEME)
        .and_then(|r| r.strip_prefix('$'))
    else {
        let entered = digest::digest(&digest::SHA256, pin.as_bytes());
        let stored = digest::digest(&digest::SHA256, reference.as_bytes());
        return Ok(entered.as_ref() == stored.as_ref());
    };

    let mut parts = rest.splitn(3, '$');
    let (Some(iterations), Some(salt), Some(hash)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(CryptoError::MalformedReference {
            reason: "expected iterations, salt and hash".into(),
        });
    };

    let iterations = iterations
        .parse::<u32>()
        .ok()
        .and_then(NonZeroU32::new)
        .ok_or_else(|| CryptoError::MalformedReference {
            reason: format!("invalid iteration count {iterations:?}"),
        })?;
    let salt = STANDARD
        .decode(salt)
        .map_err(|e| CryptoError::MalformedReference {
            reason: format!("salt: {e}"),
        })?;
    let hash = STANDARD
        .decode(hash)
        .map_err(|e| CryptoError::MalformedReference {
            reason: format!("hash: {e}"),
        })?;

    Ok(pbkdf2::verify(PBKDF2_ALG, iterations, &salt, pin.as_bytes(), &hash).is_ok())
}

// ---------------------------------------------------------------------------
// Nonce handling
// ---------------------------------------------------------------------------

/// A nonce sequence that yields exactly one nonce and then errors.
struct SingleNonce(Option<[u8; NONCE_LEN_BYTES]>);

impl NonceSequence for SingleNonce {
    fn advance(&mut self) -> std::result::Result<Nonce, ring::error::Unspecified> {
        self.0
            .take()
            .map(Nonce::assume_unique_for_key)
            .ok_or(ring::error::Unspecified)
    }
}

// ---------------------------------------------------------------------------
// Raw AEAD
// ---------------------------------------------------------------------------

/// Encrypt `plaintext` with AES-256-GCM. Returns `(nonce, ciphertext || tag)`.
pub fn encrypt(plaintext: &[u8], key: &SessionKey) -> Result<([u8; NONCE_LEN_BYTES], Vec<u8>)> {
    let mut nonce_bytes = [0u8; NONCE_LEN_BYTES];
    SystemRandom::new()
        .fill(&mut nonce_bytes)
        .map_err(|_| CryptoError::EncryptionFailed {
            reason: "failed to generate random nonce".into(),
        })?;

    let unbound_key =
        UnboundKey::new(AEAD_ALG, key.as_bytes()).map_err(|_| CryptoError::EncryptionFailed {
            reason: "failed to create AES-256-GCM key".into(),
        })?;
    let mut sealing_key = SealingKey::new(unbound_key, SingleNonce(Some(nonce_bytes)));

    let mut in_out = plaintext.to_vec();
    sealing_key
        .seal_in_place_append_tag(Aad::empty(), &mut in_out)
        .map_err(|_| CryptoError::EncryptionFailed {
            reason: "seal_in_place failed".into(),
        })?;

    Ok((nonce_bytes, in_out))
}

/// Decrypt `ciphertext` (tag included) with the given `nonce` and `key`.
pub fn decrypt(
    nonce: &[u8; NONCE_LEN_BYTES],
    ciphertext: &[u8],
    key: &SessionKey,
) -> Result<Vec<u8>> {
    let unbound_key =
        UnboundKey::new(AEAD_ALG, key.as_bytes()).map_err(|_| CryptoError::DecryptionFailed {
            reason: "failed to create AES-256-GCM key".into(),
        })?;
    let mut opening_key = aead::OpeningKey::new(unbound_key, SingleNonce(Some(*nonce)));

    let mut in_out = ciphertext.to_vec();
    let plaintext = opening_key
        .open_in_place(Aad::empty(), &mut in_out)
        .map_err(|_| CryptoError::DecryptionFailed {
            reason: "authentication failed, wrong key or corrupted data".into(),
        })?;

    Ok(plaintext.to_vec())
}

// ---------------------------------------------------------------------------
// Field cipher
// ---------------------------------------------------------------------------

/// Whether `value` carries the encrypted-field envelope.
pub fn is_encrypted_field(value: &str) -> bool {
    value.starts_with(ENCRYPTED_PREFIX)
}

/// Whether `value` is a well-formed envelope: the prefix followed by base64
/// of at least a nonce and a tag. Plaintext that merely starts with the
/// prefix does not qualify.
pub fn is_sealed_envelope(value: &str) -> bool {
    value
        .strip_prefix(ENCRYPTED_PREFIX)
        .and_then(|encoded| STANDARD.decode(encoded).ok())
        .is_some_and(|blob| blob.len() >= NONCE_LEN_BYTES + TAG_LEN)
}

/// Encrypt one string field. Empty strings stay empty.
pub fn encrypt_field(plaintext: &str, key: &SessionKey) -> Result<String> {
    if plaintext.is_empty() {
        return Ok(String::new());
    }

    let (nonce, ciphertext) = encrypt(plaintext.as_bytes(), key)?;
    let mut blob = Vec::with_capacity(NONCE_LEN_BYTES + ciphertext.len());
    blob.extend_from_slice(&nonce);
    blob.extend_from_slice(&ciphertext);

    Ok(format!("{ENCRYPTED_PREFIX}{}", STANDARD.encode(blob)))
}

/// Decrypt one string field, failing loudly.
///
/// Values without the envelope are legacy plaintext and pass through.
pub fn try_decrypt_field(value: &str, key: &SessionKey) -> Result<String> {
    let Some(encoded) = value.strip_prefix(ENCRYPTED_PREFIX) else {
        return Ok(value.to_string());
    };

    let blob = STANDARD
        .decode(encoded)
        .map_err(|e| CryptoError::DecryptionFailed {
            reason: format!("invalid base64: {e}"),
        })?;
    if blob.len() < NONCE_LEN_BYTES + TAG_LEN {
        return Err(CryptoError::DecryptionFailed {
            reason: "ciphertext too short".into(),
        });
    }

    let (nonce_bytes, ciphertext) = blob.split_at(NONCE_LEN_BYTES);
    let mut nonce = [0u8; NONCE_LEN_BYTES];
    nonce.copy_from_slice(nonce_bytes);

    let plaintext = decrypt(&nonce, ciphertext, key)?;
    String::from_utf8(plaintext).map_err(|_| CryptoError::DecryptionFailed {
        reason: "plaintext is not valid UTF-8".into(),
    })
}

/// Decrypt one string field. Never fails: an unreadable value becomes
/// [`UNREADABLE_SENTINEL`].
pub fn decrypt_field(value: &str, key: &SessionKey) -> String {
    match try_decrypt_field(value, key) {
        Ok(plaintext) => plaintext,
        Err(e) => {
            tracing::debug!(error = %e, "secure field could not be decrypted");
            UNREADABLE_SENTINEL.to_string()
        }
    }
}

// ---------------------------------------------------------------------------
// Random bytes
// ---------------------------------------------------------------------------

/// Generate `len` cryptographically secure random bytes.
pub fn random_bytes(len: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    SystemRandom::new()
        .fill(&mut buf)
        .map_err(|_| CryptoError::KeyDerivationFailed {
            reason: "failed to generate random bytes".into(),
        })?;
    Ok(buf)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

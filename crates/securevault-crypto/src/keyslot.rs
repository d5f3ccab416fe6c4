//! Volatile holder for the session key.
//!
//! The PIN-derived key is never written to durable storage. It lives in a
//! [`SessionKeySlot`] for the lifetime of the process (or until logout), and
//! is shared between the session manager, which fills it, and the record
//! repositories, which read it.
//!
//! After a PIN change the old key is kept here as *retired* until every
//! record has been re-encrypted, so reads can still open fields that have
//! not been migrated yet.

use std::sync::{Arc, PoisonError, RwLock};

use crate::crypto::SessionKey;

#[derive(Default)]
struct Keys {
    current: Option<SessionKey>,
    retired: Vec<SessionKey>,
}

/// Shared, process-lifetime slot for the current [`SessionKey`].
///
/// Clones refer to the same slot.
#[derive(Clone, Default)]
pub struct SessionKeySlot {
    inner: Arc<RwLock<Keys>>,
}

impl SessionKeySlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current key. Retired keys are kept.
    pub fn set(&self, key: SessionKey) {
        self.write(|keys| keys.current = Some(key));
    }

    /// A copy of the current key, if any.
    pub fn get(&self) -> Option<SessionKey> {
        self.read(|keys| keys.current.clone())
    }

    /// Keep `previous` readable until [`finish_rotation`](Self::finish_rotation).
    pub fn retire(&self, previous: SessionKey) {
        self.write(|keys| {
            if keys.current.as_ref() != Some(&previous) && !keys.retired.contains(&previous) {
                keys.retired.push(previous);
            }
        });
    }

    /// Keys awaiting re-encryption, oldest first.
    pub fn retired(&self) -> Vec<SessionKey> {
        self.read(|keys| keys.retired.clone())
    }

    /// Whether a re-encryption is still outstanding.
    pub fn rotation_pending(&self) -> bool {
        self.read(|keys| !keys.retired.is_empty())
    }

    /// Drop every retired key once no record depends on them.
    pub fn finish_rotation(&self) {
        self.write(|keys| keys.retired.clear());
    }

    /// Keys to try when opening a field: the current key, then retired ones.
    pub fn readers(&self) -> Vec<SessionKey> {
        self.read(|keys| keys.current.iter().chain(&keys.retired).cloned().collect())
    }

    /// Drop the current key and any retired ones (zeroizing them).
    pub fn clear(&self) {
        self.write(|keys| {
            keys.current = None;
            keys.retired.clear();
        });
    }

    pub fn is_set(&self) -> bool {
        self.read(|keys| keys.current.is_some())
    }

    fn read<R>(&self, f: impl FnOnce(&Keys) -> R) -> R {
        f(&*self.inner.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn write(&self, f: impl FnOnce(&mut Keys)) {
        f(&mut *self.inner.write().unwrap_or_else(PoisonError::into_inner));
    }
}

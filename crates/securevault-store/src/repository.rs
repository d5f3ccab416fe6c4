//! Generic CRUD repository over one record kind.
//!
//! [`Repository<T>`] talks to the kind's REST collection, runs every payload
//! through the schema codec, and keeps a local cache. The cache is only
//! mutated after the remote call succeeded; a failure leaves it untouched.

use std::marker::PhantomData;
use std::sync::{PoisonError, RwLock};

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use securevault_crypto::crypto;
use securevault_crypto::{SessionKey, SessionKeySlot};
use serde_json::{Map, Value};
use tracing::instrument;

use crate::api::ApiClient;
use crate::codec::{check_required, open_record, seal_record, strip_nulls};
use crate::error::{StoreError, StoreResult};
use crate::normalize::normalize_id;
use crate::records::{VaultEntity, decode};
use crate::schema::{RecordKind, SYSTEM_FIELDS};

/// CRUD access to one record collection.
pub struct Repository<T: VaultEntity> {
    api: ApiClient,
    keys: SessionKeySlot,
    cache: RwLock<Vec<T>>,
    _kind: PhantomData<fn() -> T>,
}

impl<T: VaultEntity> Repository<T> {
    pub fn new(api: ApiClient, keys: SessionKeySlot) -> Self {
        Self {
            api,
            keys,
            cache: RwLock::new(Vec::new()),
            _kind: PhantomData,
        }
    }

    pub fn kind(&self) -> RecordKind {
        T::KIND
    }

    /// Snapshot of the cached records, newest first.
    pub fn cached(&self) -> Vec<T> {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Look up a cached record by id.
    pub fn get(&self, id: &str) -> Option<T> {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|item| item.id() == id)
            .cloned()
    }

    /// Fetch every record and replace the cache.
    pub async fn list(&self) -> StoreResult<Vec<T>> {
        self.refresh().await
    }

    /// Fetch every record and replace the cache.
    #[instrument(skip(self), fields(kind = %T::KIND))]
    pub async fn refresh(&self) -> StoreResult<Vec<T>> {
        let rows: Vec<Value> = self
            .api
            .get(T::KIND.endpoint())
            .await
            .inspect_err(|e| tracing::warn!(error = %e, "failed to fetch records"))?;

        let readers = self.keys.readers();
        let items = rows
            .into_iter()
            .map(|row| self.open(row, &readers))
            .collect::<StoreResult<Vec<T>>>()?;

        *self.cache.write().unwrap_or_else(PoisonError::into_inner) = items.clone();
        tracing::debug!(count = items.len(), "records refreshed");
        Ok(items)
    }

    /// Create a record. The server's canonical copy is prepended to the cache.
    #[instrument(skip(self, item), fields(kind = %T::KIND))]
    pub async fn create(&self, item: &T) -> StoreResult<T> {
        let object = strip_nulls(to_object(item)?);
        check_required(T::KIND, &object)?;

        let key = self.keys.get();
        let body = seal_record(T::KIND, object, key.as_ref())?;
        let saved: Value = self
            .api
            .post(T::KIND.endpoint(), &body)
            .await
            .inspect_err(|e| tracing::warn!(error = %e, "failed to create record"))?;
        let saved = self.open(saved, &self.keys.readers())?;

        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(0, saved.clone());
        tracing::info!(id = saved.id(), "record created");
        Ok(saved)
    }

    /// Apply a partial update. Only fields present in `patch` are sent;
    /// `null` clears a field.
    #[instrument(skip(self, patch), fields(kind = %T::KIND))]
    pub async fn update(&self, id: &str, patch: Map<String, Value>) -> StoreResult<T> {
        if let Some(field) = patch
            .keys()
            .find(|k| SYSTEM_FIELDS.contains(&k.as_str()))
        {
            return Err(StoreError::UnknownField {
                kind: T::KIND.table_name(),
                field: field.clone(),
            });
        }

        let key = self.keys.get();
        let body = seal_record(T::KIND, patch, key.as_ref())?;
        let saved: Value = self
            .api
            .put(&item_path(T::KIND, id), &body)
            .await
            .inspect_err(|e| tracing::warn!(error = %e, "failed to update record"))?;
        let saved = self.open(saved, &self.keys.readers())?;

        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        match cache.iter_mut().find(|item| item.id() == id) {
            Some(slot) => *slot = saved.clone(),
            None => cache.insert(0, saved.clone()),
        }
        tracing::info!(id, "record updated");
        Ok(saved)
    }

    /// Delete remotely, then drop from the cache.
    #[instrument(skip(self), fields(kind = %T::KIND))]
    pub async fn remove(&self, id: &str) -> StoreResult<()> {
        self.api
            .delete(&item_path(T::KIND, id))
            .await
            .inspect_err(|e| tracing::warn!(error = %e, "failed to delete record"))?;

        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|item| item.id() != id);
        tracing::info!(id, "record deleted");
        Ok(())
    }

    /// Re-encrypt every secure field sealed under `previous` with the current
    /// session key. Returns the number of records rewritten.
    ///
    /// `previous` is retired into the key slot first, so records not yet
    /// rewritten stay readable if a write fails. Fields the current key
    /// already opens are skipped, which makes a retry pick up where the last
    /// run stopped. Fields no known key opens are left as they are.
    #[instrument(skip(self, previous), fields(kind = %T::KIND))]
    pub async fn reencrypt(&self, previous: &SessionKey) -> StoreResult<usize> {
        let Some(current) = self.keys.get() else {
            return Err(StoreError::Locked {
                field: "*".to_string(),
            });
        };
        if T::KIND.secure_fields().next().is_none() {
            return Ok(0);
        }
        self.keys.retire(previous.clone());
        let sources = self.keys.retired();

        let rows: Vec<Value> = self.api.get(T::KIND.endpoint()).await?;
        let mut rewritten = 0;

        for row in rows {
            let Value::Object(object) = row else {
                continue;
            };
            let Some(id) = object.get("id").and_then(normalize_id) else {
                continue;
            };

            let mut patch = Map::new();
            for field in T::KIND.secure_fields() {
                let Some(Value::String(sealed)) = object.get(field) else {
                    continue;
                };
                if !crypto::is_encrypted_field(sealed)
                    || crypto::try_decrypt_field(sealed, &current).is_ok()
                {
                    continue;
                }
                match sources
                    .iter()
                    .find_map(|key| crypto::try_decrypt_field(sealed, key).ok())
                {
                    Some(plain) => {
                        patch.insert(field.to_string(), Value::String(plain));
                    }
                    None => tracing::warn!(id, field, "field sealed under an unknown key"),
                }
            }
            if patch.is_empty() {
                continue;
            }

            let body = seal_record(T::KIND, patch, Some(&current))?;
            let _: Value = self
                .api
                .put(&item_path(T::KIND, &id), &body)
                .await
                .inspect_err(|e| {
                    tracing::warn!(id, rewritten, error = %e, "re-encryption interrupted");
                })?;
            rewritten += 1;
        }

        tracing::info!(rewritten, "records re-encrypted");
        self.refresh().await?;
        Ok(rewritten)
    }

    /// Drop the cache (e.g. on lock).
    pub fn clear_cache(&self) {
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn open(&self, row: Value, keys: &[SessionKey]) -> StoreResult<T> {
        let Value::Object(object) = row else {
            return Err(StoreError::MalformedRecord {
                kind: T::KIND.table_name(),
                reason: "expected a JSON object".to_string(),
            });
        };
        decode(Value::Object(open_record(T::KIND, object, keys)))
    }
}

/// Unreserved characters stay as-is in a path segment.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

fn item_path(kind: RecordKind, id: &str) -> String {
    let id = utf8_percent_encode(id, PATH_SEGMENT);
    format!("{}/{id}", kind.endpoint())
}

fn to_object<T: VaultEntity>(item: &T) -> StoreResult<Map<String, Value>> {
    match serde_json::to_value(item)? {
        Value::Object(object) => Ok(object),
        _ => Err(StoreError::MalformedRecord {
            kind: T::KIND.table_name(),
            reason: "record did not serialize to an object".to_string(),
        }),
    }
}

//! Schema-driven conversion between wire objects and local records.
//!
//! [`open_record`] runs on everything read from the API: values are coerced
//! to the shape the schema declares, secure fields are decrypted with the
//! session keys (left as ciphertext without one), ids become text.
//! [`seal_record`] runs on everything written: secure fields are encrypted,
//! server-managed fields are stripped, unknown fields are rejected.

use securevault_crypto::{SessionKey, UNREADABLE_SENTINEL};
use securevault_crypto::crypto;
use serde_json::{Map, Value};

use crate::error::{StoreError, StoreResult};
use crate::normalize::{normalize_document_list, normalize_id, normalize_number};
use crate::schema::{FieldKind, FieldSpec, RecordKind, SYSTEM_FIELDS};

/// Normalize and decrypt a wire object.
///
/// `keys` are tried in order for every secure field; a field none of them
/// opens becomes the `***` sentinel. With no keys ciphertext is kept as is.
pub fn open_record(
    kind: RecordKind,
    mut object: Map<String, Value>,
    keys: &[SessionKey],
) -> Map<String, Value> {
    if let Some(id) = object.remove("id").as_ref().and_then(normalize_id) {
        object.insert("id".into(), Value::String(id));
    }
    for name in ["created_at", "updated_at"] {
        if let Some(value) = object.remove(name).and_then(coerce_text) {
            object.insert(name.into(), value);
        }
    }

    for spec in kind.fields() {
        let Some(value) = object.remove(spec.name) else {
            continue;
        };
        let Some(value) = coerce(spec, value) else {
            tracing::trace!(kind = %kind, field = spec.name, "dropped off-shape value");
            continue;
        };
        let value = match value {
            Value::String(s)
                if spec.secure && !keys.is_empty() && crypto::is_encrypted_field(&s) =>
            {
                Value::String(open_field(&s, keys))
            }
            value => value,
        };
        object.insert(spec.name.into(), value);
    }
    object
}

/// Fit a wire value to its field kind. `None` means "treat as unset".
fn coerce(spec: &FieldSpec, value: Value) -> Option<Value> {
    match spec.kind {
        FieldKind::DocumentList => Some(Value::from(normalize_document_list(&value))),
        FieldKind::Number => Some(normalize_number(&value)).filter(|v| !v.is_null()),
        FieldKind::Text | FieldKind::Date => coerce_text(value),
    }
}

fn coerce_text(value: Value) -> Option<Value> {
    match value {
        Value::String(_) => Some(value),
        Value::Number(n) => Some(Value::String(n.to_string())),
        Value::Bool(b) => Some(Value::String(b.to_string())),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn open_field(sealed: &str, keys: &[SessionKey]) -> String {
    keys.iter()
        .find_map(|key| crypto::try_decrypt_field(sealed, key).ok())
        .unwrap_or_else(|| {
            tracing::debug!("secure field could not be decrypted");
            UNREADABLE_SENTINEL.to_string()
        })
}

/// Validate, normalize and encrypt an outgoing object.
///
/// A secure value that is already a well-formed envelope is sent unchanged,
/// so opaque ciphertext survives an update made without a session key. With
/// `key == None` any other non-empty secure value is refused.
pub fn seal_record(
    kind: RecordKind,
    object: Map<String, Value>,
    key: Option<&SessionKey>,
) -> StoreResult<Map<String, Value>> {
    let mut sealed = Map::with_capacity(object.len());

    for (name, value) in object {
        if SYSTEM_FIELDS.contains(&name.as_str()) {
            continue;
        }
        let spec = kind.field(&name).ok_or_else(|| StoreError::UnknownField {
            kind: kind.table_name(),
            field: name.clone(),
        })?;

        let value = match spec.kind {
            FieldKind::DocumentList if !value.is_null() => {
                Value::from(normalize_document_list(&value))
            }
            FieldKind::Number => normalize_number(&value),
            _ => value,
        };

        let value = match (spec.secure, value) {
            (true, Value::String(s)) if !s.is_empty() && !crypto::is_sealed_envelope(&s) => {
                let key = key.ok_or_else(|| StoreError::Locked { field: name.clone() })?;
                Value::String(crypto::encrypt_field(&s, key)?)
            }
            (true, Value::Number(n)) => {
                let key = key.ok_or_else(|| StoreError::Locked { field: name.clone() })?;
                Value::String(crypto::encrypt_field(&n.to_string(), key)?)
            }
            (_, value) => value,
        };
        sealed.insert(name, value);
    }
    Ok(sealed)
}

/// Check that every required field is present and non-empty.
pub fn check_required(kind: RecordKind, object: &Map<String, Value>) -> StoreResult<()> {
    for spec in kind.fields().iter().filter(|f| f.required) {
        let present = match object.get(spec.name) {
            None | Some(Value::Null) => false,
            Some(Value::String(s)) => !s.trim().is_empty(),
            Some(_) => true,
        };
        if !present {
            return Err(StoreError::MissingField {
                kind: kind.table_name(),
                field: spec.name.to_string(),
            });
        }
    }
    Ok(())
}

/// Drop `null` entries (unset optional fields of a typed record).
pub fn strip_nulls(object: Map<String, Value>) -> Map<String, Value> {
    object.into_iter().filter(|(_, v)| !v.is_null()).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

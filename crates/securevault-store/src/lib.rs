//! # securevault-store
//!
//! Remote data access for SecureVault.
//!
//! Every vault record kind (bank accounts, credit cards, documents,
//! insurance policies, deposits, websites) is described by a static schema.
//! A generic [`Repository`] talks to the kind's REST collection, encrypting
//! secure fields on the way out and decrypting them on the way in with the
//! session key held in a [`securevault_crypto::SessionKeySlot`].
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  Repository<T>  (cache, CRUD, re-encryption)  │
//! ├──────────────────────────────────────────────┤
//! │  codec   (seal / open via schema)             │
//! │  schema  (RecordKind → FieldSpec table)       │
//! ├──────────────────────────────────────────────┤
//! │  ApiClient      (REST envelope)               │
//! │  BackendClient  (PIN reference, buckets)      │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! Alongside sit [`AttachmentStore`], [`ServiceMonitor`] and the expiry
//! scanner in [`expiry`].
//!
//! ## Quick start
//!
//! ```ignore
//! use securevault_crypto::SessionKeySlot;
//! use securevault_store::{ApiClient, Repository, records::Website};
//!
//! let api = ApiClient::new("http://localhost:3000")?;
//! let websites: Repository<Website> = Repository::new(api, SessionKeySlot::new());
//! let all = websites.list().await?;
//! ```

pub mod api;
pub mod attachments;
pub mod backend;
pub mod codec;
pub mod error;
pub mod expiry;
pub mod health;
pub mod normalize;
pub mod records;
pub mod repository;
pub mod schema;

// ── re-exports ───────────────────────────────────────────────────────

pub use api::{ApiClient, DEFAULT_API_URL, Envelope};
pub use attachments::{Attachment, AttachmentStore, Bucket};
pub use backend::{BackendClient, BackendConfig, ObjectStorage};
pub use error::{StoreError, StoreResult};
pub use expiry::{ExpiringItem, collect_expiring};
pub use health::{HealthConfig, ServiceHealth, ServiceMonitor};
pub use records::{
    BankAccount, CreditCard, Deposit, GeneralDocument, InsurancePolicy, VaultEntity, VaultRecord,
    Website,
};
pub use repository::Repository;
pub use schema::{FieldKind, FieldSpec, RecordKind};
